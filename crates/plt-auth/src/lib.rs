//! Credentials and bearer tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Sessions are HS256 JWTs
//! carrying the user id and role; nothing else about the user is trusted from
//! the token.

use anyhow::{anyhow, Context, Result};

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenIssuer};

/// Normalized registration input.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

const MAX_NAME_LEN: usize = 100;

/// Trim the name, lower-case the email, and enforce the password floor.
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
    min_password_len: usize,
) -> Result<Registration> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(anyhow!("name must be at most {MAX_NAME_LEN} characters"));
    }

    let email = normalize_email(email).context("invalid email")?;

    if password.chars().count() < min_password_len {
        return Err(anyhow!(
            "password must be at least {min_password_len} characters"
        ));
    }

    Ok(Registration {
        name: name.to_string(),
        email,
        password: password.to_string(),
    })
}

/// Lower-cased, trimmed email with a plausible `local@domain.tld` shape.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| anyhow!("email must contain '@'"))?;
    if local.is_empty() || domain.contains('@') {
        return Err(anyhow!("email must have exactly one '@' and a local part"));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(anyhow!("email domain must be dotted"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(anyhow!("email must not contain whitespace"));
    }
    Ok(email)
}
