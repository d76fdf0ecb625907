#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use actix_web::{http::header, test, web, App};
use memhog_agent::{configure, AppState, Metrics, Settings};
use serde_json::{json, Value};
use std::time::Duration;

fn app_state() -> AppState {
    AppState::new(Settings::default(), Metrics::new().unwrap())
}

#[actix_web::test]
async fn allocate_then_free() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/allocate/10").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"message": "Allocating 10MB."}));
    assert_eq!(state.memory.allocated_bytes(), Some(10 * 1024 * 1024));
    assert_eq!(state.metrics.allocated_bytes.get(), 10 * 1024 * 1024);

    let req = test::TestRequest::post().uri("/free").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"message": "Freeing Memory."}));
    assert_eq!(state.memory.allocated_bytes(), None);
}

#[actix_web::test]
async fn bad_megabytes_are_rejected() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(configure),
    )
    .await;

    for uri in ["/allocate/abc", "/allocate/-3", "/demoloop/abc", "/allocate/1.5"] {
        let req = test::TestRequest::post().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400, "{uri}");
        let body: Value = test::read_body_json(resp).await;
        assert!(body.get("msg").and_then(Value::as_str).is_some(), "{uri}: {body}");
    }
}

#[actix_web::test]
async fn free_without_allocation() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/free").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"message": "Freeing Memory."}));
}

#[actix_web::test]
async fn demo_loop_runs_in_background() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/demoloop/5").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .expect("location header");
    assert!(location.starts_with("/demoloop/"));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"message": "Running Demo Memory Allocation Loop."}));

    let mut finished = None;
    for _ in 0..200 {
        let req = test::TestRequest::get().uri(&location).to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let st: Value = test::read_body_json(resp).await;
        if st["running"] == json!(false) {
            finished = Some(st);
            break;
        }
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
    }
    let st = finished.expect("demo loop finished");
    assert_eq!(st["iterations_completed"], json!(5));
    assert_eq!(st["megabytes"], json!(5));
    assert_eq!(state.metrics.allocations_total.get(), 5);
    assert_eq!(state.metrics.frees_total.get(), 5);
}

#[actix_web::test]
async fn unknown_demo_loop() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/demoloop/99/stop").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);

    let req = test::TestRequest::get().uri("/demoloop/99/status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn healthz_and_metrics() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/allocate/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["allocated_bytes"], json!(1024 * 1024));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body = test::read_body(resp).await;
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("memhog_allocated_bytes 1048576"));
}

#[cfg(target_pointer_width = "64")]
#[actix_web::test]
async fn failed_allocation_is_a_server_error() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/allocate/2").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let req = test::TestRequest::post().uri("/allocate/4294967295").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 500);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("error"));
    assert!(body["reason"].as_str().is_some_and(|r| r.contains("4294967295MB")), "{body}");
    assert_eq!(state.memory.allocated_bytes(), Some(2 * 1024 * 1024));
    assert_eq!(state.metrics.allocation_failures_total.get(), 1);
}

#[actix_web::test]
async fn stopping_a_finished_demo_loop_conflicts() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/demoloop/1").to_request();
    let resp = test::call_service(&app, req).await;
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .expect("location header");

    let mut done = false;
    for _ in 0..200 {
        let req = test::TestRequest::get().uri(&location).to_request();
        let st: Value = test::read_body_json(test::call_service(&app, req).await).await;
        if st["running"] == json!(false) {
            done = true;
            break;
        }
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(done, "demo loop finished");

    let stop_uri = location.replace("/status", "/stop");
    let req = test::TestRequest::post().uri(&stop_uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 409);

    let req = test::TestRequest::get().uri(&location).to_request();
    let st: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(st["cancelled"], json!(false));
    assert_eq!(st["iterations_completed"], json!(5));
}
