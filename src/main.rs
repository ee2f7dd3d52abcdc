use actix_web::{middleware, web, App, HttpServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod handlers;

use epl_predictor::config::AppConfig;
use epl_predictor::error::{PredictError, Result};
use epl_predictor::predictor::MatchPredictor;
use handlers::{health, predict, teams};

/// Application state shared across handlers
pub struct AppState {
    pub predictor: Option<MatchPredictor>,
    pub model_dir: PathBuf,
}

impl AppState {
    /// The loaded predictor, or an artifact error naming the model directory
    pub fn predictor(&self) -> Result<&MatchPredictor> {
        self.predictor
            .as_ref()
            .ok_or_else(|| PredictError::artifact(&self.model_dir, "models are not loaded"))
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(std::io::Error::other)?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{}:{}", host, port);

    let model_dir = std::env::var("MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"));
    let features_path = std::env::var("FEATURES_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/features.csv"));

    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => AppConfig::from_json_file(&path).map_err(std::io::Error::other)?,
        Err(_) => AppConfig::default(),
    };

    info!("Loading models from {:?}, features from {:?}", model_dir, features_path);

    let predictor = match MatchPredictor::load(&model_dir, &features_path, config.serving) {
        Ok(p) => {
            info!("Models loaded successfully ({} teams)", p.teams().len());
            Some(p)
        }
        Err(e) => {
            warn!("Failed to load models: {}. Prediction endpoints will return errors.", e);
            None
        }
    };

    let app_state = Arc::new(AppState {
        predictor,
        model_dir,
    });

    info!("Starting EPL Predictor API server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/predict", web::post().to(predict::predict_match))
            .route("/predict/batch", web::post().to(predict::predict_batch))
            .route("/teams", web::get().to(teams::list_teams))
            .route("/teams/{team}/form", web::get().to(teams::team_form))
            .route("/teams/{team}/summary", web::get().to(teams::team_summary))
    })
    .bind(&addr)?
    .run()
    .await
}
