use assert_matches::assert_matches;
use chrono::{Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{AppointmentSignature, BookingError, RebookRequest};
use booking_cell::services::DuplicationAdapter;
use shared_config::AppConfig;
use slot_search_cell::models::{
    MultiSegmentSlot, SearchPhase, SlotCandidate, SlotSegment, Treatment,
};

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

#[allow(clippy::too_many_arguments)]
fn member_row(
    id: Uuid,
    patient_id: Uuid,
    treatment_id: Option<Uuid>,
    provider_id: Option<Uuid>,
    linked: Uuid,
    sequence: i32,
    start: &str,
    end: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "date": "2025-03-10",
        "start_time": start,
        "end_time": end,
        "treatment_id": treatment_id,
        "machine_id": null,
        "provider_id": provider_id,
        "status": "scheduled",
        "notes": null,
        "priority": null,
        "linked_appointment_id": linked,
        "link_sequence": sequence,
        "created_at": "2025-03-01T08:00:00Z",
        "updated_at": "2025-03-01T08:00:00Z",
    })
}

async fn mount_patient(mock_server: &MockServer, patient_id: Uuid, name: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "full_name": name }])),
        )
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn signature_from_a_middle_member_covers_the_whole_group() {
    let mock_server = MockServer::start().await;

    let patient_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    let group_id = Uuid::new_v4();
    let (m2_id, m3_id) = (Uuid::new_v4(), Uuid::new_v4());
    let (t1, t2, t3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    // Lookup starts from the middle member.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", m2_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([member_row(
            m2_id, patient_id, Some(t2), None, group_id, 2, "09:30", "10:15",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("linked_appointment_id", format!("eq.{}", group_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            member_row(group_id, patient_id, Some(t1), Some(provider_id), group_id, 1, "09:00", "09:30"),
            member_row(m2_id, patient_id, Some(t2), None, group_id, 2, "09:30", "10:15"),
            member_row(m3_id, patient_id, Some(t3), None, group_id, 3, "10:15", "10:30"),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatments"))
        .and(query_param("id", format!("in.({},{},{})", t1, t2, t3)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": t1, "title": "Cleaning" },
            { "id": t2, "title": "Laser" },
            { "id": t3, "title": "Checkup" },
        ])))
        .mount(&mock_server)
        .await;

    mount_patient(&mock_server, patient_id, "Ada Example").await;

    let adapter = DuplicationAdapter::new(&test_config(&mock_server.uri()));
    let signature = adapter.extract_signature(m2_id, TOKEN).await.unwrap();

    assert_eq!(signature.patient_id, patient_id);
    assert_eq!(signature.patient_name, "Ada Example");
    assert_eq!(signature.provider_id, Some(provider_id));

    let ids: Vec<_> = signature.treatments.iter().map(|t| t.treatment_id).collect();
    assert_eq!(ids, vec![t1, t2, t3]);
    let durations: Vec<_> = signature.treatments.iter().map(|t| t.duration_minutes).collect();
    assert_eq!(durations, vec![30, 45, 15]);
    assert_eq!(signature.treatments[1].title, "Laser");
}

#[tokio::test]
async fn members_without_a_treatment_are_left_out_of_the_signature() {
    let mock_server = MockServer::start().await;

    let patient_id = Uuid::new_v4();
    let group_id = Uuid::new_v4();
    let block_id = Uuid::new_v4();
    let t1 = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", group_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([member_row(
            group_id, patient_id, Some(t1), None, group_id, 1, "09:00", "09:30",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("linked_appointment_id", format!("eq.{}", group_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            member_row(group_id, patient_id, Some(t1), None, group_id, 1, "09:00", "09:30"),
            // Administrative buffer block without a treatment.
            member_row(block_id, patient_id, None, None, group_id, 2, "09:30", "09:45"),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": t1, "title": "Cleaning" },
        ])))
        .mount(&mock_server)
        .await;

    mount_patient(&mock_server, patient_id, "Ada Example").await;

    let adapter = DuplicationAdapter::new(&test_config(&mock_server.uri()));
    let signature = adapter.extract_signature(group_id, TOKEN).await.unwrap();

    assert_eq!(signature.treatments.len(), 1);
    assert_eq!(signature.treatments[0].treatment_id, t1);
}

#[tokio::test]
async fn rebooking_search_skips_today_and_sundays() {
    let mock_server = MockServer::start().await;

    // No slots anywhere, so the strict phase escalates once and the relaxed
    // phase comes back empty too.
    Mock::given(method("GET"))
        .and(path("/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let signature = AppointmentSignature {
        treatments: vec![Treatment {
            treatment_id: Uuid::new_v4(),
            duration_minutes: 30,
            title: "Cleaning".into(),
        }],
        patient_id: Uuid::new_v4(),
        patient_name: "Ada Example".into(),
        provider_id: None,
    };

    let adapter = DuplicationAdapter::new(&test_config(&mock_server.uri()));
    let outcome = adapter
        .find_rebooking_slots(&signature, 7, false, TOKEN)
        .await
        .unwrap();

    assert!(outcome.days.is_empty());
    assert_eq!(outcome.phase, SearchPhase::Relaxed);
    assert!(outcome.escalated_from_empty);

    let today = Utc::now().date_naive();
    let requests = mock_server.received_requests().await.unwrap();
    let queried_dates: Vec<NaiveDate> = requests
        .iter()
        .filter(|r| r.url.path() == "/slots")
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "date")
                .and_then(|(_, v)| v.parse().ok())
        })
        .collect();

    // Strict and relaxed phases each cover the 7-workday window.
    assert_eq!(queried_dates.len(), 14);
    assert!(queried_dates.iter().all(|d| *d > today));
    assert!(queried_dates.iter().all(|d| d.weekday() != Weekday::Sun));
}

#[tokio::test]
async fn rebooking_without_treatments_is_rejected() {
    let mock_server = MockServer::start().await;

    let signature = AppointmentSignature {
        treatments: vec![],
        patient_id: Uuid::new_v4(),
        patient_name: "Ada Example".into(),
        provider_id: None,
    };

    let adapter = DuplicationAdapter::new(&test_config(&mock_server.uri()));
    let result = adapter
        .find_rebooking_slots(&signature, 7, false, TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::InvalidRequest(_)));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rebooking_a_multi_candidate_books_a_linked_group() {
    let mock_server = MockServer::start().await;

    let patient_id = Uuid::new_v4();
    let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
    let (parent_id, m2_id) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_patient_overlap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "has_overlap": false })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "treatment_id": t1 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([member_row(
            parent_id, patient_id, Some(t1), None, parent_id, 1, "09:00", "09:30",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", parent_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([member_row(
            parent_id, patient_id, Some(t1), None, parent_id, 1, "09:00", "09:30",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "treatment_id": t2 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([member_row(
            m2_id, patient_id, Some(t2), None, parent_id, 2, "09:30", "10:15",
        )])))
        .mount(&mock_server)
        .await;

    let signature = AppointmentSignature {
        treatments: vec![
            Treatment {
                treatment_id: t1,
                duration_minutes: 30,
                title: "Cleaning".into(),
            },
            Treatment {
                treatment_id: t2,
                duration_minutes: 45,
                title: "Laser".into(),
            },
        ],
        patient_id,
        patient_name: "Ada Example".into(),
        provider_id: None,
    };

    let request = RebookRequest {
        date: NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
        slot: SlotCandidate::Multi(MultiSegmentSlot {
            segments: vec![
                SlotSegment {
                    treatment_id: t1,
                    machine_id: None,
                    start_time: time(9, 0),
                    end_time: time(9, 30),
                    duration_minutes: 30,
                    is_overlappable: false,
                },
                SlotSegment {
                    treatment_id: t2,
                    machine_id: None,
                    start_time: time(9, 30),
                    end_time: time(10, 15),
                    duration_minutes: 45,
                    is_overlappable: false,
                },
            ],
            after_hours: false,
        }),
        notes: Some("rebooked".into()),
    };

    let adapter = DuplicationAdapter::new(&test_config(&mock_server.uri()));
    let group = adapter.rebook(&signature, &request, TOKEN).await.unwrap();

    assert_eq!(group.len(), 2);
    assert_eq!(group[0].id, parent_id);
    assert_eq!(group[1].id, m2_id);
}
