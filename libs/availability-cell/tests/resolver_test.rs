use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::models::{
    AvailabilityError, AvailabilitySource, SaveWeekRequest, TimeRange, WeeklyAvailability,
};
use availability_cell::services::AvailabilityResolver;
use shared_config::AppConfig;
use shared_database::StoreClient;

const TOKEN: &str = "test-token";

fn test_config(store_url: &str) -> AppConfig {
    AppConfig {
        store_url: store_url.to_string(),
        store_anon_key: "test-anon-key".to_string(),
        slot_service_url: "http://unused.invalid".to_string(),
        slot_fetch_timeout_secs: 2,
        availability_check_timeout_secs: 2,
    }
}

fn resolver_for(mock_server: &MockServer) -> AvailabilityResolver {
    let config = test_config(&mock_server.uri());
    AvailabilityResolver::with_default_schedule(
        Arc::new(StoreClient::new(&config)),
        WeeklyAvailability::clinic_default(),
    )
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn week_row(
    provider_id: Uuid,
    year: i32,
    week: u32,
    availability: &WeeklyAvailability,
    source: &str,
    notes: Option<&str>,
) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "provider_id": provider_id,
        "year": year,
        "week": week,
        "availability": availability,
        "source": source,
        "notes": notes,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z",
    })
}

async fn mount_empty(mock_server: &MockServer, table_path: &str) {
    Mock::given(method("GET"))
        .and(path(table_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn resolves_to_default_when_no_record_and_no_template() {
    let mock_server = MockServer::start().await;
    mount_empty(&mock_server, "/rest/v1/weekly_availability").await;
    mount_empty(&mock_server, "/rest/v1/availability_templates").await;

    let resolver = resolver_for(&mock_server);
    let resolved = resolver
        .resolve(Uuid::new_v4(), 2025, 10, TOKEN)
        .await
        .unwrap();

    assert_eq!(resolved.source, AvailabilitySource::Default);
    assert!(!resolved.has_specific_entry);
    assert_eq!(resolved.availability, WeeklyAvailability::clinic_default());
}

#[tokio::test]
async fn specific_record_wins_over_template() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    let mut manual = WeeklyAvailability::all_closed();
    manual.wednesday.enabled = true;
    manual.wednesday.slots = vec![TimeRange::new(t(8, 0), t(13, 0))];

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([week_row(
            provider_id,
            2025,
            10,
            &manual,
            "manual",
            Some("reduced week")
        )])))
        .mount(&mock_server)
        .await;

    let resolver = resolver_for(&mock_server);
    let resolved = resolver.resolve(provider_id, 2025, 10, TOKEN).await.unwrap();

    assert_eq!(resolved.source, AvailabilitySource::Manual);
    assert!(resolved.has_specific_entry);
    assert_eq!(resolved.notes.as_deref(), Some("reduced week"));
    assert_eq!(resolved.availability, manual);
}

#[tokio::test]
async fn falls_back_to_template_when_no_specific_record() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    let mut template = WeeklyAvailability::all_closed();
    template.friday.enabled = true;
    template.friday.slots = vec![TimeRange::new(t(9, 0), t(17, 0))];

    mount_empty(&mock_server, "/rest/v1/weekly_availability").await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "availability": template,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z",
        }])))
        .mount(&mock_server)
        .await;

    let resolver = resolver_for(&mock_server);
    let resolved = resolver.resolve(provider_id, 2025, 10, TOKEN).await.unwrap();

    assert_eq!(resolved.source, AvailabilitySource::Template);
    assert!(!resolved.has_specific_entry);
    assert_eq!(resolved.availability, template);
}

#[tokio::test]
async fn corrupt_specific_record_falls_back_one_level() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    // Specific row exists but its payload is garbage.
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "availability": "not-a-schedule",
        }])))
        .mount(&mock_server)
        .await;
    mount_empty(&mock_server, "/rest/v1/availability_templates").await;

    let resolver = resolver_for(&mock_server);
    let resolved = resolver.resolve(provider_id, 2025, 10, TOKEN).await.unwrap();

    assert_eq!(resolved.source, AvailabilitySource::Default);
}

#[tokio::test]
async fn save_rejects_inverted_range_before_any_persistence() {
    let mock_server = MockServer::start().await;

    // No write may reach the store.
    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_availability"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut schedule = WeeklyAvailability::clinic_default();
    schedule.tuesday.slots = vec![TimeRange::new(t(10, 0), t(9, 0))];

    let resolver = resolver_for(&mock_server);
    let result = resolver
        .save_week(
            Uuid::new_v4(),
            2025,
            10,
            SaveWeekRequest {
                availability: schedule,
                notes: None,
            },
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(AvailabilityError::InvalidTimeRange(_)));
}

#[tokio::test]
async fn copy_from_previous_rolls_back_across_year_boundary() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    let mut source_week = WeeklyAvailability::all_closed();
    source_week.monday.enabled = true;
    source_week.monday.slots = vec![TimeRange::new(t(9, 0), t(12, 0))];

    // Week 1 of 2025 must resolve its source as week 52 of 2024.
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_availability"))
        .and(query_param("year", "eq.2024"))
        .and(query_param("week", "eq.52"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([week_row(
            provider_id,
            2024,
            52,
            &source_week,
            "manual",
            None
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_availability"))
        .and(body_partial_json(json!({
            "year": 2025,
            "week": 1,
            "source": "copied",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([week_row(
            provider_id,
            2025,
            1,
            &source_week,
            "copied",
            None
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let resolver = resolver_for(&mock_server);
    let record = resolver
        .copy_from_previous(provider_id, 2025, 1, TOKEN)
        .await
        .unwrap();

    assert_eq!(record.source, AvailabilitySource::Copied);
    assert_eq!(record.availability, source_week);
}

#[tokio::test]
async fn apply_template_is_idempotent() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    let mut template = WeeklyAvailability::all_closed();
    template.thursday.enabled = true;
    template.thursday.slots = vec![TimeRange::new(t(13, 0), t(19, 0))];

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "availability": template,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z",
        }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_availability"))
        .and(body_partial_json(json!({ "source": "template" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([week_row(
            provider_id,
            2025,
            20,
            &template,
            "template",
            None
        )])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let resolver = resolver_for(&mock_server);
    let first = resolver
        .apply_template(provider_id, 2025, 20, TOKEN)
        .await
        .unwrap();
    let second = resolver
        .apply_template(provider_id, 2025, 20, TOKEN)
        .await
        .unwrap();

    assert_eq!(first.availability, second.availability);
    assert_eq!(first.source, AvailabilitySource::Template);
    assert_eq!(second.source, AvailabilitySource::Template);
}

#[tokio::test]
async fn effective_availability_intersects_with_clinic_hours() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4();

    // Provider resolves to the default Mon-Fri 09-12 / 14-18 schedule.
    mount_empty(&mock_server, "/rest/v1/weekly_availability").await;
    mount_empty(&mock_server, "/rest/v1/availability_templates").await;

    let mut operating = WeeklyAvailability::all_closed();
    operating.monday.enabled = true;
    operating.monday.slots = vec![TimeRange::new(t(10, 0), t(16, 0))];

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinic_hours"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "operating_hours": operating,
        }])))
        .mount(&mock_server)
        .await;

    // 2025-03-10 is a Monday.
    let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

    let resolver = resolver_for(&mock_server);
    let effective = resolver
        .effective_availability(provider_id, monday, TOKEN)
        .await
        .unwrap();

    assert_eq!(
        effective,
        vec![
            TimeRange::new(t(10, 0), t(12, 0)),
            TimeRange::new(t(14, 0), t(16, 0)),
        ]
    );
}

#[tokio::test]
async fn effective_availability_is_empty_on_disabled_day() {
    let mock_server = MockServer::start().await;
    mount_empty(&mock_server, "/rest/v1/weekly_availability").await;
    mount_empty(&mock_server, "/rest/v1/availability_templates").await;

    // 2025-03-15 is a Saturday, closed in the default schedule.
    let saturday = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

    let resolver = resolver_for(&mock_server);
    let effective = resolver
        .effective_availability(Uuid::new_v4(), saturday, TOKEN)
        .await
        .unwrap();

    assert!(effective.is_empty());
}
