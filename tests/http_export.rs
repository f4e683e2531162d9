mod common;

use attendance_export::models::Status;
use attendance_export::pipeline::ExportOptions;
use attendance_export::server::{AppState, router};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use common::{MemoryStore, StubAuthorizer, student};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const HEADER: &str = "SessionDate,SessionId,StudentName,StudentEmail,Status\r\n";

fn options() -> ExportOptions {
    ExportOptions {
        page_size: 2,
        ..ExportOptions::default()
    }
}

async fn get(store: Arc<MemoryStore>, options: ExportOptions, uri: &str, token: Option<&str>) -> Response {
    let state = AppState::new(
        store,
        Arc::new(StubAuthorizer),
        vec!["admin".to_string(), "faculty".to_string()],
        options,
    );

    let mut request = Request::builder().uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    router(state)
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn json(response: Response) -> Value {
    serde_json::from_str(&text(response).await).unwrap()
}

fn single_day() -> MemoryStore {
    MemoryStore::default()
        .session(
            "s-1",
            "2025-09-01",
            &[student("ada", "Ada Lovelace"), student("alan", "Alan Turing")],
        )
        .record("s-1", "ada", Status::Present)
}

#[tokio::test]
async fn single_day_report_marks_missing_records_unmarked() {
    let store = Arc::new(single_day());
    let response = get(
        store,
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"attendance_2025-09-01_2025-09-01.csv\""
    );
    assert_eq!(
        text(response).await,
        format!(
            "{HEADER}\
             2025-09-01,s-1,Ada Lovelace,ada@campus.edu,present\r\n\
             2025-09-01,s-1,Alan Turing,alan@campus.edu,unmarked\r\n"
        )
    );
}

#[tokio::test]
async fn empty_range_is_header_only() {
    let store = Arc::new(single_day());
    let response = get(
        store,
        options(),
        "/api/attendance/export?startDate=2025-10-01&endDate=2025-10-31",
        Some("admin-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, HEADER);
}

#[tokio::test]
async fn rows_follow_date_then_roster_order_across_pages() {
    let (ada, alan, grace) = (
        student("ada", "Ada Lovelace"),
        student("alan", "Alan Turing"),
        student("grace", "Grace Hopper"),
    );
    let store = MemoryStore::default()
        .session("s-3", "2025-09-03", &[grace.clone()])
        .session("s-1b", "2025-09-01", &[alan.clone(), ada.clone()])
        .session("s-1a", "2025-09-01", &[grace.clone(), ada.clone()])
        .session("s-2", "2025-09-02", &[ada.clone()])
        .session("s-9", "2025-08-31", &[ada.clone()])
        .record("s-2", "ada", Status::Excused);

    let response = get(
        Arc::new(store),
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-03",
        Some("faculty-token"),
    )
    .await;
    let body = text(response).await;

    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let rows: Vec<(String, String, String)> = reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[1].to_string(), r[3].to_string(), r[4].to_string())
        })
        .collect();
    let expected = [
        ("s-1a", "grace@campus.edu", "unmarked"),
        ("s-1a", "ada@campus.edu", "unmarked"),
        ("s-1b", "alan@campus.edu", "unmarked"),
        ("s-1b", "ada@campus.edu", "unmarked"),
        ("s-2", "ada@campus.edu", "excused"),
        ("s-3", "grace@campus.edu", "unmarked"),
    ];
    assert_eq!(rows.len(), expected.len());
    for (row, (session, email, status)) in rows.iter().zip(expected) {
        assert_eq!((row.0.as_str(), row.1.as_str(), row.2.as_str()), (session, email, status));
    }
}

#[tokio::test]
async fn names_with_commas_and_quotes_survive_a_round_trip() {
    let store = MemoryStore::default().session(
        "s-1",
        "2025-09-01",
        &[student("grace", "Hopper, Grace \"Amazing\"")],
    );
    let response = get(
        Arc::new(store),
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;
    let body = text(response).await;

    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let record = reader.records().next().unwrap().unwrap();
    assert_eq!(&record[2], "Hopper, Grace \"Amazing\"");
}

#[tokio::test]
async fn missing_credentials_touch_nothing() {
    let store = Arc::new(single_day());
    let response = get(
        store.clone(),
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let store = Arc::new(single_day());
    let response = get(
        store.clone(),
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("broken-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["error"], "unauthorized");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn students_may_not_export() {
    let store = Arc::new(single_day());
    let response = get(
        store.clone(),
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("student-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn auth_is_checked_before_the_range() {
    let store = Arc::new(single_day());
    let response = get(
        store,
        options(),
        "/api/attendance/export?startDate=garbage",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inverted_range_is_a_bad_request() {
    let store = Arc::new(single_day());
    let response = get(
        store.clone(),
        options(),
        "/api/attendance/export?startDate=2025-09-30&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json(response).await["error"],
        "startDate 2025-09-30 is after endDate 2025-09-01"
    );
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive() {
    let store = Arc::new(single_day());
    let state = AppState::new(
        store,
        Arc::new(StubAuthorizer),
        vec!["faculty".to_string()],
        options(),
    );
    let request = Request::builder()
        .uri("/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01")
        .header(header::AUTHORIZATION, "bearer faculty-token")
        .body(Body::empty())
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_and_unparsable_dates_are_bad_requests() {
    for uri in [
        "/api/attendance/export?startDate=2025-09-01",
        "/api/attendance/export?startDate=2025-09-01&endDate=next-tuesday",
        "/api/attendance/export",
    ] {
        let response = get(Arc::new(single_day()), options(), uri, Some("faculty-token")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert!(json(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn store_outage_before_any_bytes_is_unavailable() {
    let store = Arc::new(single_day().failing_from_page(1));
    let response = get(
        store,
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json(response).await["error"],
        "attendance store unavailable"
    );
}

#[tokio::test]
async fn store_outage_mid_stream_truncates_the_body() {
    let store = single_day()
        .session("s-2", "2025-09-02", &[student("ada", "Ada Lovelace")])
        .failing_from_page(2);
    let options = ExportOptions {
        page_size: 1,
        chunk_size: 16,
        timeout: None,
    };
    let response = get(
        Arc::new(store),
        options,
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-30",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
}

#[tokio::test]
async fn unreachable_attendance_store_is_not_reported_as_unknown() {
    let store = Arc::new(single_day().with_unreachable_lookups());
    let response = get(
        store,
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn worker_panic_mid_stream_truncates_the_body() {
    let store = single_day()
        .session("s-2", "2025-09-02", &[student("ada", "Ada Lovelace")])
        .panicking_from_page(2);
    let options = ExportOptions {
        page_size: 1,
        chunk_size: 16,
        timeout: None,
    };
    let response = get(
        Arc::new(store),
        options,
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-30",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
}

#[tokio::test]
async fn worker_panic_before_streaming_is_a_server_error() {
    let store = Arc::new(single_day().panicking_from_page(1));
    let response = get(
        store,
        options(),
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn dropped_download_stops_the_store_queries() {
    let mut store = MemoryStore::default();
    for d in 1..=30 {
        store = store.session(
            &format!("s-{d:02}"),
            &format!("2025-09-{d:02}"),
            &[student("ada", "Ada Lovelace"), student("alan", "Alan Turing")],
        );
    }
    let store = Arc::new(store);
    let options = ExportOptions {
        page_size: 1,
        chunk_size: 16,
        timeout: None,
    };
    let response = get(
        store.clone(),
        options,
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-30",
        Some("faculty-token"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    assert!(body.next().await.unwrap().is_ok());
    drop(body);

    // Wait for the worker to notice, then make sure it stays stopped.
    let mut settled = store.calls();
    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let now = store.calls();
        if now == settled {
            break;
        }
        settled = now;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.calls(), settled);

    // A full export makes 31 page requests, 30 roster loads and 60 lookups.
    assert!(settled < 120, "store saw {settled} calls");
}

#[tokio::test]
async fn deadline_before_streaming_is_a_gateway_timeout() {
    let options = ExportOptions {
        timeout: Some(Duration::ZERO),
        ..options()
    };
    let response = get(
        Arc::new(single_day()),
        options,
        "/api/attendance/export?startDate=2025-09-01&endDate=2025-09-01",
        Some("faculty-token"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let response = get(Arc::new(MemoryStore::default()), options(), "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "ok");
}
