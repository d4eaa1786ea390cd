use farmflo_core::config::ClientConfig;
use pretty_assertions::assert_eq;

use crate::commands::config::{format_config_report, ConfigReport};
use crate::commands::demo::run_scenario;
use crate::commands::search::{format_listing_line, parse_snapshot, search_snapshot, ListingItem};
use crate::error::CliError;

const SNAPSHOT: &str = r#"[
  {
    "id": "c1",
    "ownerUid": "S1",
    "name": "Cherry Tomatoes",
    "photoUrl": "https://cdn.example.com/images/1.jpg",
    "pricePerUnit": 20.5,
    "availableQuantity": 50,
    "description": "Sweet",
    "harvestedDate": { "seconds": 1717200000, "nanoseconds": 0 },
    "location": "Nashik",
    "sellerName": "Asha",
    "sellerContact": "98200"
  },
  {
    "id": "c2",
    "ownerUid": "S2",
    "name": "Onions",
    "pricePerUnit": 12,
    "availableQuantity": 100,
    "harvestedDate": { "seconds": 1717200000, "nanoseconds": 0 }
  },
  { "id": "bad", "name": "Broken" },
  "not a document"
]"#;

#[test]
fn parse_snapshot_keys_documents_by_id() {
    let snapshot = parse_snapshot(SNAPSHOT).unwrap();
    let ids: Vec<&str> = snapshot.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "bad"]);
    assert!(!snapshot.documents[0].fields.contains_key("id"));
}

#[test]
fn parse_snapshot_rejects_non_array() {
    assert!(matches!(
        parse_snapshot(r#"{"id": "c1"}"#),
        Err(CliError::InvalidSnapshot)
    ));
}

#[test]
fn search_skips_undecodable_and_filters_by_name() {
    let snapshot = parse_snapshot(SNAPSHOT).unwrap();

    let all = search_snapshot(&snapshot, "");
    assert_eq!(all.len(), 2);

    let tomatoes = search_snapshot(&snapshot, "TOMATO");
    assert_eq!(tomatoes.len(), 1);
    assert_eq!(
        format_listing_line(&tomatoes[0]),
        "c1  Cherry Tomatoes  20.5/unit  qty 50  Asha"
    );
}

#[test]
fn listing_item_renders_price_and_missing_seller() {
    let snapshot = parse_snapshot(SNAPSHOT).unwrap();
    let onions = search_snapshot(&snapshot, "onion");

    let item = ListingItem::from(&onions[0]);
    assert_eq!(item.price_per_unit, "12");
    assert_eq!(item.seller_name, "");
    assert!(format_listing_line(&onions[0]).ends_with("qty 100  -"));
}

#[test]
fn config_report_lists_missing_settings() {
    let config = ClientConfig::from_lookup(|name| match name {
        "FARMFLO_PROJECT_ID" => Some("farmflo-dev".to_string()),
        "FARMFLO_API_KEY" => Some("secret".to_string()),
        _ => None,
    })
    .unwrap();

    let report = ConfigReport::from(&config);
    let lines = format_config_report(&report);

    assert_eq!(report.missing, vec!["FARMFLO_MEDIA_API_URL"]);
    assert_eq!(lines[1], "api key:        set");
    assert_eq!(lines[3], "Missing: FARMFLO_MEDIA_API_URL");
    assert!(!lines.iter().any(|line| line.contains("secret")));
}

#[tokio::test]
async fn demo_scenario_round_trips_one_interest() {
    let report = run_scenario().await.unwrap();

    assert_eq!(report.listing_name, "Tomatoes");
    assert_eq!(report.seller_name, "Asha Patil");
    assert!(report.self_interest_rejected);
    assert_eq!(report.interests_before_dismiss, 1);
    assert_eq!(report.interest_buyer_uid, "B1");
    assert_eq!(report.interests_after_dismiss, 0);
    assert_eq!(report.open_subscriptions_after_shutdown, 0);
    assert_eq!(report.steps.len(), 7);
}
