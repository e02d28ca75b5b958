//! Cart mutations on the in-memory store keep total == sum(line totals).

use plt_db::{MemStore, Store, StoreError};
use plt_schemas::{FoodPatch, NewFood};
use uuid::Uuid;

const MAX_QTY: i32 = 5;

async fn food(store: &MemStore, name: &str, price_minor: i64) -> Uuid {
    store
        .create_food(NewFood {
            name: name.to_string(),
            description: String::new(),
            price_minor,
            category: "Mains".to_string(),
            image_url: None,
            available: true,
        })
        .await
        .expect("create food")
        .food_id
}

#[tokio::test]
async fn add_set_remove_keep_total_consistent() {
    let store = MemStore::new();
    let user = Uuid::new_v4();
    let dosa = food(&store, "Masala Dosa", 12_000).await;
    let lassi = food(&store, "Lassi", 6_000).await;

    let cart = store.add_cart_item(user, dosa, 2, MAX_QTY).await.unwrap();
    assert_eq!(cart.total_minor, 24_000);
    assert!(cart.is_consistent());

    let cart = store.add_cart_item(user, lassi, 1, MAX_QTY).await.unwrap();
    assert_eq!(cart.total_minor, 30_000);

    // Adding an existing line accumulates.
    let cart = store.add_cart_item(user, dosa, 1, MAX_QTY).await.unwrap();
    assert_eq!(cart.line(dosa).unwrap().quantity, 3);
    assert_eq!(cart.total_minor, 42_000);

    let cart = store.set_cart_item(user, lassi, 4, MAX_QTY).await.unwrap();
    assert_eq!(cart.total_minor, 36_000 + 24_000);
    assert!(cart.is_consistent());

    let cart = store.set_cart_item(user, lassi, 0, MAX_QTY).await.unwrap();
    assert!(cart.line(lassi).is_none());
    assert_eq!(cart.total_minor, 36_000);

    let cart = store.remove_cart_item(user, dosa).await.unwrap();
    assert!(cart.is_empty());
    assert_eq!(cart.total_minor, 0);
}

#[tokio::test]
async fn quantity_limits_are_enforced() {
    let store = MemStore::new();
    let user = Uuid::new_v4();
    let dosa = food(&store, "Masala Dosa", 12_000).await;

    let err = store.add_cart_item(user, dosa, 0, MAX_QTY).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "got {err:?}");

    store.add_cart_item(user, dosa, 4, MAX_QTY).await.unwrap();
    let err = store.add_cart_item(user, dosa, 2, MAX_QTY).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "got {err:?}");

    // Rejected add leaves the cart untouched.
    let cart = store.get_cart(user).await.unwrap();
    assert_eq!(cart.line(dosa).unwrap().quantity, 4);
    assert_eq!(cart.total_minor, 48_000);
}

#[tokio::test]
async fn unknown_and_unavailable_foods_are_rejected() {
    let store = MemStore::new();
    let user = Uuid::new_v4();

    let err = store
        .add_cart_item(user, Uuid::new_v4(), 1, MAX_QTY)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound("food")));

    let dosa = food(&store, "Masala Dosa", 12_000).await;
    store
        .update_food(
            dosa,
            FoodPatch {
                available: Some(false),
                ..FoodPatch::default()
            },
        )
        .await
        .unwrap();
    let err = store.add_cart_item(user, dosa, 1, MAX_QTY).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn removing_missing_line_is_not_found() {
    let store = MemStore::new();
    let err = store
        .remove_cart_item(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound("cart item")));
}

#[tokio::test]
async fn deleting_a_food_recomputes_every_cart_holding_it() {
    let store = MemStore::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let dosa = food(&store, "Masala Dosa", 12_000).await;
    let lassi = food(&store, "Lassi", 6_000).await;

    store.add_cart_item(alice, dosa, 1, MAX_QTY).await.unwrap();
    store.add_cart_item(alice, lassi, 2, MAX_QTY).await.unwrap();
    store.add_cart_item(bob, dosa, 3, MAX_QTY).await.unwrap();

    assert!(store.delete_food(dosa).await.unwrap());
    assert!(!store.delete_food(dosa).await.unwrap());

    let a = store.get_cart(alice).await.unwrap();
    assert_eq!(a.lines.len(), 1);
    assert_eq!(a.total_minor, 12_000);
    assert!(a.is_consistent());

    let b = store.get_cart(bob).await.unwrap();
    assert!(b.is_empty());
    assert_eq!(b.total_minor, 0);
}

#[tokio::test]
async fn price_change_is_picked_up_on_next_cart_write() {
    let store = MemStore::new();
    let user = Uuid::new_v4();
    let dosa = food(&store, "Masala Dosa", 12_000).await;

    store.add_cart_item(user, dosa, 2, MAX_QTY).await.unwrap();
    store
        .update_food(
            dosa,
            FoodPatch {
                price_minor: Some(15_000),
                ..FoodPatch::default()
            },
        )
        .await
        .unwrap();

    let cart = store.set_cart_item(user, dosa, 2, MAX_QTY).await.unwrap();
    assert_eq!(cart.line(dosa).unwrap().unit_price_minor, 15_000);
    assert_eq!(cart.total_minor, 30_000);
}
