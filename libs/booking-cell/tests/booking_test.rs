use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{BookSlotRequest, BookingError};
use booking_cell::services::BookingCoordinator;
use shared_config::AppConfig;
use slot_search_cell::models::SimpleSlot;

const TOKEN: &str = "test-token";

fn test_config(uri: &str) -> AppConfig {
    AppConfig {
        store_url: uri.to_string(),
        store_anon_key: "test-anon-key".to_string(),
        slot_service_url: uri.to_string(),
        slot_fetch_timeout_secs: 2,
        availability_check_timeout_secs: 2,
    }
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn appointment_row(id: Uuid, patient_id: Uuid, machine_id: Option<Uuid>) -> serde_json::Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "date": "2025-03-10",
        "start_time": "09:00",
        "end_time": "09:30",
        "treatment_id": null,
        "machine_id": machine_id,
        "provider_id": null,
        "status": "scheduled",
        "notes": null,
        "priority": null,
        "linked_appointment_id": null,
        "link_sequence": null,
        "created_at": "2025-03-01T08:00:00Z",
        "updated_at": "2025-03-01T08:00:00Z",
    })
}

fn book_request(slot: SimpleSlot) -> BookSlotRequest {
    BookSlotRequest {
        patient_id: Uuid::new_v4(),
        date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        slot,
        treatment_id: Uuid::new_v4(),
        provider_id: None,
        notes: None,
        priority: None,
    }
}

fn slot(start: NaiveTime, end: NaiveTime) -> SimpleSlot {
    SimpleSlot {
        start_time: start,
        end_time: end,
        machine_id: None,
        is_overlappable: false,
        after_hours: false,
    }
}

async fn mount_overlap_check(mock_server: &MockServer, has_overlap: bool) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_patient_overlap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "has_overlap": has_overlap,
            "conflicting_appointment_id": if has_overlap { Some(Uuid::new_v4()) } else { None },
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn patient_overlap_blocks_the_booking_before_any_write() {
    let mock_server = MockServer::start().await;
    mount_overlap_check(&mock_server, true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let coordinator = BookingCoordinator::new(&test_config(&mock_server.uri()));
    let result = coordinator
        .book(&book_request(slot(time(9, 0), time(9, 30))), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::PatientOverlap { .. }));
}

#[tokio::test]
async fn overlappable_machines_are_not_assigned() {
    let mock_server = MockServer::start().await;
    mount_overlap_check(&mock_server, false).await;

    let id = Uuid::new_v4();
    let request = book_request(SimpleSlot {
        start_time: time(10, 0),
        end_time: time(10, 30),
        machine_id: Some(Uuid::new_v4()),
        is_overlappable: true,
        after_hours: false,
    });

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "machine_id": null })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([appointment_row(id, request.patient_id, None)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let coordinator = BookingCoordinator::new(&test_config(&mock_server.uri()));
    let appointment = coordinator.book(&request, TOKEN).await.unwrap();

    assert_eq!(appointment.id, id);
    assert_eq!(appointment.machine_id, None);
}

#[tokio::test]
async fn unavailable_provider_blocks_the_booking() {
    let mock_server = MockServer::start().await;
    mount_overlap_check(&mock_server, false).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_provider_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "is_available": false })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut request = book_request(slot(time(9, 0), time(9, 45)));
    request.provider_id = Some(Uuid::new_v4());

    let coordinator = BookingCoordinator::new(&test_config(&mock_server.uri()));
    let result = coordinator.book(&request, TOKEN).await;

    assert_matches!(result, Err(BookingError::ProviderUnavailable));
}

#[tokio::test]
async fn store_conflict_reads_as_slot_no_longer_available() {
    let mock_server = MockServer::start().await;
    mount_overlap_check(&mock_server, false).await;

    // Exclusion constraint on the appointments table fires with a 409.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "conflicting key value violates exclusion constraint"
        })))
        .mount(&mock_server)
        .await;

    let coordinator = BookingCoordinator::new(&test_config(&mock_server.uri()));
    let result = coordinator
        .book(&book_request(slot(time(11, 0), time(11, 30))), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::SlotNoLongerAvailable));
}

#[tokio::test]
async fn inverted_slot_is_rejected_without_touching_the_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_patient_overlap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "has_overlap": false })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let coordinator = BookingCoordinator::new(&test_config(&mock_server.uri()));
    let result = coordinator
        .book(&book_request(slot(time(10, 0), time(9, 0))), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::InvalidTimeRange(_)));
}

#[test]
fn book_requests_without_a_treatment_fail_to_parse() {
    let body = json!({
        "patient_id": Uuid::new_v4(),
        "date": "2025-03-10",
        "slot": { "start_time": "09:00", "end_time": "09:30" },
    });

    assert!(serde_json::from_value::<BookSlotRequest>(body).is_err());
}
