use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub food_id: Uuid,
    pub name: String,
    pub description: String,
    pub price_minor: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub available: bool,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFood {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_minor: i64,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl NewFood {
    /// Shape checks shared by every store implementation.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("food name must not be empty".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("food category must not be empty".to_string());
        }
        if self.price_minor < 0 {
            return Err("price_minor must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Partial update. `None` leaves the field untouched; `image_url: Some(None)`
/// clears the image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_minor: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, with = "double_option")]
    pub image_url: Option<Option<String>>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl FoodPatch {
    pub fn apply(&self, item: &mut FoodItem) {
        if let Some(name) = &self.name {
            item.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(price) = self.price_minor {
            item.price_minor = price;
        }
        if let Some(category) = &self.category {
            item.category = category.trim().to_string();
        }
        if let Some(image_url) = &self.image_url {
            item.image_url = image_url.clone();
        }
        if let Some(available) = self.available {
            item.available = available;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err("food name must not be empty".to_string());
        }
        if matches!(&self.category, Some(c) if c.trim().is_empty()) {
            return Err("food category must not be empty".to_string());
        }
        if matches!(self.price_minor, Some(p) if p < 0) {
            return Err("price_minor must be >= 0".to_string());
        }
        Ok(())
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(v: &Option<Option<String>>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match v {
            Some(inner) => inner.serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Present-but-null must survive as Some(None).
        Option::<String>::deserialize(d).map(Some)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodFilter {
    #[serde(default)]
    pub category: Option<String>,
    /// Case-insensitive substring over name and description.
    #[serde(default, rename = "q")]
    pub query: Option<String>,
    #[serde(default)]
    pub include_unavailable: bool,
}

impl FoodFilter {
    pub fn matches(&self, item: &FoodItem) -> bool {
        if !self.include_unavailable && !item.available {
            return false;
        }
        if let Some(category) = &self.category {
            if &item.category != category {
                return false;
            }
        }
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            if !item.name.to_lowercase().contains(&q)
                && !item.description.to_lowercase().contains(&q)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub item_count: i64,
}
