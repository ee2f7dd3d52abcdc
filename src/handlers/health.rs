use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::AppState;
use epl_predictor::models::HealthResponse;

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.predictor.is_some(),
        teams: state.predictor.as_ref().map_or(0, |p| p.teams().len()),
    };

    HttpResponse::Ok().json(response)
}
