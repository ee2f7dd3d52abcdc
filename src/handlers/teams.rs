use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use epl_predictor::context;
use epl_predictor::error::PredictError;
use epl_predictor::models::TeamsResponse;

const DEFAULT_FORM_MATCHES: usize = 5;

#[derive(Debug, Deserialize)]
pub struct FormQuery {
    pub n: Option<usize>,
}

/// List teams with historical data
pub async fn list_teams(state: web::Data<Arc<AppState>>) -> Result<HttpResponse, PredictError> {
    let teams = state.predictor()?.teams();

    Ok(HttpResponse::Ok().json(TeamsResponse {
        count: teams.len(),
        teams,
    }))
}

/// Last results of a team, most recent first
pub async fn team_form(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    query: web::Query<FormQuery>,
) -> Result<HttpResponse, PredictError> {
    let team = path.into_inner();
    let n = query.n.unwrap_or(DEFAULT_FORM_MATCHES);
    let form = context::recent_form(state.predictor()?.table(), &team, n)?;

    Ok(HttpResponse::Ok().json(form))
}

/// Record over the team's last season of matches
pub async fn team_summary(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> Result<HttpResponse, PredictError> {
    let team = path.into_inner();
    let summary = context::team_summary(state.predictor()?.table(), &team)?;

    Ok(HttpResponse::Ok().json(summary))
}
