//! Fixtures shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::identity::Identity;
use crate::lifecycle::SubscriptionManager;
use crate::models::{ListingDraft, PhotoUpload, Registration, User};
use crate::session::SessionResolver;
use crate::store::{encode_record, Collection, Document, MemoryGateway};

pub fn fields(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

pub fn user(uid: &str, name: &str) -> User {
    User::register(
        uid,
        Registration {
            name: name.to_string(),
            email: format!("{}@example.com", uid.to_lowercase()),
            phone_number: format!("98200-{uid}"),
            seller: true,
        },
        Utc::now(),
    )
    .unwrap()
}

/// Store a profile as if another device had registered it.
pub fn seed_user(gateway: &MemoryGateway, uid: &str, name: &str) -> User {
    let user = user(uid, name);
    gateway.apply_remote_set(Collection::Users, uid, encode_record(&user).unwrap());
    user
}

pub async fn signed_in(gateway: &MemoryGateway, uid: &str) -> Arc<SessionResolver> {
    let resolver = Arc::new(SessionResolver::new(Arc::new(gateway.clone())));
    resolver
        .on_session_change(Some(Identity::new(uid, format!("token-{uid}"))))
        .await;
    resolver
}

pub fn manager(gateway: &MemoryGateway) -> Arc<SubscriptionManager> {
    Arc::new(SubscriptionManager::new(Arc::new(gateway.clone())))
}

pub fn draft(name: &str) -> ListingDraft {
    ListingDraft {
        name: name.to_string(),
        photo: PhotoUpload {
            bytes: vec![0xff, 0xd8, 0xff],
            content_type: "image/jpeg".to_string(),
        },
        price_per_unit: Decimal::new(20, 0),
        available_quantity: 50,
        description: "Fresh from the field".to_string(),
        harvested_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        location: "Pune".to_string(),
    }
}

/// Wait until the watched state satisfies `condition` and return a copy.
pub async fn wait_until<T: Clone>(
    receiver: &mut watch::Receiver<T>,
    condition: impl FnMut(&T) -> bool,
) -> T {
    timeout(Duration::from_secs(2), receiver.wait_for(condition))
        .await
        .expect("condition reached in time")
        .expect("state sender alive")
        .clone()
}

/// Poll `condition` until it holds, for state not exposed through a channel.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
