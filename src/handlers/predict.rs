use actix_web::{error::BlockingError, web, HttpResponse};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;
use epl_predictor::error::{PredictError, Result};
use epl_predictor::models::{
    BatchPredictRequest, BatchPredictResponse, ErrorResponse, MatchPrediction, PredictRequest,
};

/// Maximum fixtures accepted by one batch request
const MAX_BATCH_FIXTURES: usize = 50;

fn blocking_failed(e: BlockingError) -> PredictError {
    PredictError::Io(std::io::Error::other(e))
}

/// Predict a single fixture
pub async fn predict_match(
    state: web::Data<Arc<AppState>>,
    req: web::Json<PredictRequest>,
) -> std::result::Result<HttpResponse, PredictError> {
    let state = state.get_ref().clone();
    let req = req.into_inner();

    // Feature assembly and ONNX inference run off the async workers
    let prediction = web::block(move || {
        state
            .predictor()?
            .predict(&req.home_team, &req.away_team, req.use_ensemble)
    })
    .await
    .map_err(blocking_failed)??;

    Ok(HttpResponse::Ok().json(prediction))
}

/// Predict several fixtures; unknown teams are reported per fixture
pub async fn predict_batch(
    state: web::Data<Arc<AppState>>,
    req: web::Json<BatchPredictRequest>,
) -> std::result::Result<HttpResponse, PredictError> {
    if req.fixtures.is_empty() || req.fixtures.len() > MAX_BATCH_FIXTURES {
        return Err(PredictError::Config(format!(
            "Batch must contain 1 to {} fixtures, got {}",
            MAX_BATCH_FIXTURES,
            req.fixtures.len()
        )));
    }
    let state = state.get_ref().clone();
    let req = req.into_inner();

    let fixtures: Vec<(String, String)> = req
        .fixtures
        .into_iter()
        .map(|f| (f.home_team, f.away_team))
        .collect();

    let response = web::block(move || {
        let results = state.predictor()?.predict_many(&fixtures, req.use_ensemble);
        collect_batch(results)
    })
    .await
    .map_err(blocking_failed)??;

    Ok(HttpResponse::Ok().json(response))
}

/// Split batch results; artifact and model failures abort the batch
fn collect_batch(results: Vec<Result<MatchPrediction>>) -> Result<BatchPredictResponse> {
    let mut predictions = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(p) => predictions.push(p),
            Err(e) if e.is_caller_error() || matches!(e, PredictError::Config(_)) => {
                errors.push(ErrorResponse {
                    error: e.code().to_string(),
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!("Batch prediction failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(BatchPredictResponse {
        predictions,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use epl_predictor::config::{EnsembleConfig, PipelineConfig, ServingConfig};
    use epl_predictor::data::{MatchTable, RawMatchRow};
    use epl_predictor::pipeline::FeaturePipeline;
    use epl_predictor::predictor::{EnsemblePredictor, MatchPredictor, ProbabilityModel};
    use std::path::PathBuf;

    struct FixedModel;

    impl ProbabilityModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<[f64; 3]> {
            Ok([0.6, 0.25, 0.15])
        }
    }

    fn raw(date: &str, home: &str, away: &str, hg: u32, ag: u32) -> RawMatchRow {
        let result = match hg.cmp(&ag) {
            std::cmp::Ordering::Greater => "H",
            std::cmp::Ordering::Less => "A",
            std::cmp::Ordering::Equal => "D",
        };
        RawMatchRow {
            date: date.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: Some(hg),
            away_goals: Some(ag),
            result: result.to_string(),
            season: None,
        }
    }

    fn state(loaded: bool) -> web::Data<Arc<AppState>> {
        let predictor = loaded.then(|| {
            let table = MatchTable::prepare(vec![
                raw("05/08/2023", "Arsenal", "Chelsea", 2, 0),
                raw("12/08/2023", "Chelsea", "Arsenal", 1, 1),
            ])
            .unwrap();
            let output = FeaturePipeline::new(PipelineConfig::default())
                .unwrap()
                .run(&table)
                .unwrap();
            let ensemble =
                EnsemblePredictor::new(Box::new(FixedModel), None, EnsembleConfig::default())
                    .unwrap();
            MatchPredictor::new(output.table, output.schema, ensemble, ServingConfig::default())
                .unwrap()
        });
        web::Data::new(Arc::new(AppState {
            predictor,
            model_dir: PathBuf::from("models"),
        }))
    }

    fn request(home: &str, away: &str) -> PredictRequest {
        PredictRequest {
            home_team: home.to_string(),
            away_team: away.to_string(),
            use_ensemble: None,
        }
    }

    #[actix_web::test]
    async fn test_predict_match() {
        let resp = predict_match(state(true), web::Json(request("Arsenal", "Chelsea")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let prediction: MatchPrediction = serde_json::from_slice(&body).unwrap();
        assert_eq!(prediction.home_team, "Arsenal");
        assert!((prediction.confidence - 0.6).abs() < 1e-9);
    }

    #[actix_web::test]
    async fn test_predict_match_errors() {
        let err = predict_match(state(true), web::Json(request("Fulham", "Chelsea")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = predict_match(state(false), web::Json(request("Arsenal", "Chelsea")))
            .await
            .unwrap_err();
        assert!(matches!(err, PredictError::Artifact { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_predict_batch_reports_unknown_teams() {
        let req = BatchPredictRequest {
            fixtures: vec![request("Arsenal", "Chelsea"), request("Arsenal", "Fulham")],
            use_ensemble: None,
        };
        let resp = predict_batch(state(true), web::Json(req)).await.unwrap();

        let body = to_bytes(resp.into_body()).await.unwrap();
        let batch: BatchPredictResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(batch.predictions.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].error, "team_not_found");
    }

    #[actix_web::test]
    async fn test_predict_batch_size_limit() {
        let req = BatchPredictRequest {
            fixtures: Vec::new(),
            use_ensemble: None,
        };
        let err = predict_batch(state(true), web::Json(req)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
