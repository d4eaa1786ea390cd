use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use farmflo_core::identity::{identity_channel, IdentitySender};
use farmflo_core::models::{PhotoUpload, Registration};
use farmflo_core::session::SessionState;
use farmflo_core::storage::MemoryObjectStore;
use farmflo_core::store::MemoryGateway;
use farmflo_core::{Error, Identity, ListingDraft, Marketplace};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::error::CliError;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DemoReport {
    pub seller_uid: String,
    pub buyer_uid: String,
    pub listing_id: String,
    pub listing_name: String,
    pub seller_name: String,
    pub self_interest_rejected: bool,
    pub interests_before_dismiss: usize,
    pub interest_buyer_uid: String,
    pub interests_after_dismiss: usize,
    pub open_subscriptions_after_shutdown: usize,
    pub steps: Vec<String>,
}

pub async fn run_demo(as_json: bool) -> Result<(), CliError> {
    let report = run_scenario().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (index, step) in report.steps.iter().enumerate() {
            println!("{:>2}. {step}", index + 1);
        }
    }

    Ok(())
}

/// Seller lists a crop, buyer expresses interest, seller dismisses it.
pub async fn run_scenario() -> Result<DemoReport, CliError> {
    let gateway = MemoryGateway::new();
    let objects = MemoryObjectStore::new();
    let seller = Marketplace::new(Arc::new(gateway.clone()), Arc::new(objects.clone()));
    let buyer = Marketplace::new(Arc::new(gateway.clone()), Arc::new(objects));
    let (seller_identity, seller_events) = identity_channel();
    let (buyer_identity, buyer_events) = identity_channel();
    seller.start(seller_events);
    buyer.start(buyer_events);
    let mut steps = Vec::new();

    sign_up(&seller, &seller_identity, "S1", "Asha Patil", true).await?;
    sign_up(&buyer, &buyer_identity, "B1", "Ravi Kumar", false).await?;
    steps.push("Registered seller S1 and buyer B1".to_string());

    seller.inventory().activate().await?;
    seller.interests().activate().await?;
    wait_for(&mut seller.interests().watch(), "seller interests", |s| {
        s.status.is_live()
    })
    .await?;

    let listing_id = seller.inventory().create(tomatoes()).await?;
    steps.push(format!("S1 listed Tomatoes as {listing_id}"));

    buyer.directory().activate().await?;
    buyer.directory().set_query("tomato");
    let directory = wait_for(&mut buyer.directory().watch(), "listing in directory", |v| {
        v.visible.iter().any(|listing| listing.id == listing_id)
    })
    .await?;
    let listing = directory
        .find(&listing_id)
        .cloned()
        .ok_or_else(|| CliError::Demo(format!("listing {listing_id} missing from directory")))?;
    steps.push(format!(
        "B1 found {} at {}/unit from {}",
        listing.name, listing.price_per_unit, listing.seller_name
    ));

    let self_interest_rejected = matches!(
        seller.interests().post_interest(&listing).await,
        Err(Error::SelfInterestRejected { .. })
    );
    steps.push("S1 interest in own listing was rejected locally".to_string());

    buyer.interests().post_interest(&listing).await?;
    let inbox = wait_for(&mut seller.interests().watch(), "seller inbox", |s| s.count() == 1).await?;
    let interest = inbox
        .interests
        .first()
        .cloned()
        .ok_or_else(|| CliError::Demo("seller inbox empty".to_string()))?;
    steps.push(format!(
        "S1 received interest from {} ({}) in {}",
        interest.buyer_name, interest.buyer_uid, interest.listing_name
    ));

    seller.interests().dismiss(&interest.id).await?;
    let emptied = wait_for(&mut seller.interests().watch(), "dismissal", |s| {
        s.snapshot.is_empty()
    })
    .await?;
    steps.push("S1 dismissed the interest".to_string());

    seller.shutdown().await;
    buyer.shutdown().await;
    let open_subscriptions_after_shutdown = gateway.active_subscriptions();
    steps.push(format!(
        "Shut down with {open_subscriptions_after_shutdown} open live queries"
    ));

    Ok(DemoReport {
        seller_uid: "S1".to_string(),
        buyer_uid: "B1".to_string(),
        listing_id,
        listing_name: listing.name,
        seller_name: listing.seller_name,
        self_interest_rejected,
        interests_before_dismiss: inbox.count(),
        interest_buyer_uid: interest.buyer_uid,
        interests_after_dismiss: emptied.count(),
        open_subscriptions_after_shutdown,
        steps,
    })
}

async fn sign_up(
    marketplace: &Marketplace,
    identities: &IdentitySender,
    uid: &str,
    name: &str,
    seller: bool,
) -> Result<(), CliError> {
    let identity = Identity::new(uid, format!("demo-token-{uid}"));
    identities.send_replace(Some(identity.clone()));
    wait_for(&mut marketplace.session().watch(), "sign-in", |s| {
        matches!(s, SessionState::Anonymous { .. })
    })
    .await?;

    marketplace
        .register(
            &identity,
            Registration {
                name: name.to_string(),
                email: format!("{}@farmflo.example", uid.to_lowercase()),
                phone_number: "98200 12345".to_string(),
                seller,
            },
        )
        .await?;
    Ok(())
}

fn tomatoes() -> ListingDraft {
    ListingDraft {
        name: "Tomatoes".to_string(),
        photo: PhotoUpload {
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            content_type: "image/jpeg".to_string(),
        },
        price_per_unit: Decimal::new(20, 0),
        available_quantity: 50,
        description: "Vine-ripened, picked this morning".to_string(),
        harvested_date: Utc::now().date_naive(),
        location: "Nashik".to_string(),
    }
}

async fn wait_for<T: Clone>(
    receiver: &mut watch::Receiver<T>,
    what: &str,
    condition: impl FnMut(&T) -> bool,
) -> Result<T, CliError> {
    match timeout(STEP_TIMEOUT, receiver.wait_for(condition)).await {
        Ok(Ok(value)) => Ok(value.clone()),
        Ok(Err(_)) => Err(CliError::Demo(format!("{what}: state channel closed"))),
        Err(_) => Err(CliError::DemoTimeout(what.to_string())),
    }
}
