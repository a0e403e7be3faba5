// src/handlers.rs

use crate::models::OptimizeRequest;
use crate::pipeline::Pipeline;
use crate::presenter::{render_index, FormDefaults, Report};
use actix_web::{get, post, web, HttpResponse, Responder};
use tokio::sync::Mutex;
use tracing::info;

pub struct AppState {
    pub pipeline: Pipeline,
    // Held for a whole run so two optimizations never interleave
    pub run_gate: Mutex<()>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        AppState {
            pipeline,
            run_gate: Mutex::new(()),
        }
    }
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_index(&FormDefaults::default()))
}

#[get("/tickers")]
pub async fn tickers() -> impl Responder {
    HttpResponse::Ok().json(FormDefaults::default())
}

#[post("/optimize")]
pub async fn optimize(
    state: web::Data<AppState>,
    request: web::Json<OptimizeRequest>,
) -> impl Responder {
    let _gate = state.run_gate.lock().await;
    let request = request.into_inner();
    info!(
        "Optimizing {:?} from {} to {} with ${:.2}",
        request.tickers, request.start, request.end, request.investment_amount
    );

    let run = state.pipeline.run(request).await;
    let report = Report::from(&run);
    match &run.error {
        None => HttpResponse::Ok().json(report),
        Some(err) => HttpResponse::build(err.status_code()).json(report),
    }
}

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}
