#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use actix_web::error::InternalError;
use actix_web::http::{header, StatusCode};
use actix_web::{get, post, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result as AnyResult};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{Settings, BIND_ADDR};
use crate::domain::{AppState, CancelOutcome};
use crate::metrics::Metrics;
use crate::service::DemoLoopRunner;

#[post("/allocate/{mb}")]
pub async fn allocate(path: web::Path<u32>, data: web::Data<AppState>) -> HttpResponse {
    let megabytes = path.into_inner();
    info!(megabytes, "allocate request");
    let memory = data.memory.clone();
    match web::block(move || memory.allocate(megabytes)).await {
        Ok(Ok(())) => {
            HttpResponse::Ok().json(json!({"message": format!("Allocating {megabytes}MB.")}))
        }
        Ok(Err(e)) => {
            error!(megabytes, error = %format!("{e:#}"), "allocation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("{e:#}"))
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[post("/demoloop/{mb}")]
pub async fn demo_loop(path: web::Path<u32>, data: web::Data<AppState>) -> HttpResponse {
    let megabytes = path.into_inner();
    let runner = DemoLoopRunner::from_state(&data);
    let (id, _handle) = runner.launch(megabytes);
    HttpResponse::Ok()
        .insert_header((header::LOCATION, format!("/demoloop/{id}/status")))
        .json(json!({"message": "Running Demo Memory Allocation Loop."}))
}

#[post("/free")]
pub async fn free(data: web::Data<AppState>) -> HttpResponse {
    info!("free request");
    let memory = data.memory.clone();
    match web::block(move || memory.free()).await {
        Ok(()) => HttpResponse::Ok().json(json!({"message": "Freeing Memory."})),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[post("/demoloop/{id}/stop")]
pub async fn stop_demo_loop(path: web::Path<u64>, data: web::Data<AppState>) -> HttpResponse {
    let id = path.into_inner();
    let runner = DemoLoopRunner::from_state(&data);
    match runner.stop(id) {
        CancelOutcome::Cancelled => {
            info!(demo_loop = id, "stop demo loop request");
            HttpResponse::Ok().json(json!({"status":"ok"}))
        }
        CancelOutcome::NotRunning => {
            warn!(demo_loop = id, "stop: already finished");
            json_error(StatusCode::CONFLICT, "demo loop not running")
        }
        CancelOutcome::NotFound => {
            warn!(demo_loop = id, "stop: not found");
            json_error(StatusCode::NOT_FOUND, "demo loop not found")
        }
    }
}

#[get("/demoloop/{id}/status")]
pub async fn demo_loop_status(path: web::Path<u64>, data: web::Data<AppState>) -> HttpResponse {
    let id = path.into_inner();
    let runner = DemoLoopRunner::from_state(&data);
    match runner.status(id) {
        Some(st) => HttpResponse::Ok().json(st),
        None => json_error(StatusCode::NOT_FOUND, "demo loop not found"),
    }
}

#[get("/healthz")]
pub async fn healthz(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(DemoLoopRunner::from_state(&data).health())
}

#[get("/metrics")]
pub async fn scrape_metrics(data: web::Data<AppState>) -> HttpResponse {
    let runner = DemoLoopRunner::from_state(&data);
    match runner.encode_metrics() {
        Ok(buf) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buf),
        Err(e) => {
            error!(error=%format!("{e:#}"), "encode metrics failed");
            HttpResponse::InternalServerError().body("encode metrics failed")
        }
    }
}

/// Path extraction failures answer 400 with the extractor message under `msg`.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req: &HttpRequest| {
        let msg = err.to_string();
        let resp = HttpResponse::BadRequest().json(json!({"msg": msg}));
        InternalError::from_response(err, resp).into()
    })
}

/// Registers every route on `cfg`; shared by `serve` and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(path_config())
        .service(allocate)
        .service(demo_loop)
        .service(free)
        .service(stop_demo_loop)
        .service(demo_loop_status)
        .service(healthz)
        .service(scrape_metrics);
}

pub async fn serve(settings: Settings) -> AnyResult<()> {
    let metrics = Metrics::new().context("metrics init")?;
    let state = AppState::new(settings, metrics);
    let primed = state.clone();
    web::block(move || primed.prime())
        .await
        .context("startup allocation task")??;
    let loops = state.loops.clone();
    let data = web::Data::new(state);
    info!(bind = BIND_ADDR, "listening");
    let result = HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .bind(BIND_ADDR)
        .with_context(|| format!("bind {BIND_ADDR}"))?
        .run()
        .await
        .context("http server");
    loops.cancel_all();
    result
}

fn json_error(code: StatusCode, reason: &str) -> HttpResponse {
    HttpResponse::build(code).json(json!({"status":"error","reason":reason}))
}
