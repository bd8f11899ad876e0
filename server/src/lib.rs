use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use boc_core::{ConceptRanker, RankerConfig, SledConceptStore, Tokenizer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct ConceptParams {
    pub q: String,
    pub title: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct ConceptResponse {
    pub query: String,
    pub took_s: f64,
    pub terms: Vec<String>,
    pub results: Vec<ConceptHit>,
}

#[derive(Serialize)]
pub struct ConceptHit {
    pub page_id: u32,
    pub name: String,
    pub weight: f64,
    pub incoming: Option<f64>,
    pub outgoing: Option<f64>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SledConceptStore>,
    pub tokenizer: Tokenizer,
    pub config: RankerConfig,
}

pub fn build_app<P: AsRef<Path>>(store_dir: P, config: RankerConfig) -> Result<Router> {
    let store = SledConceptStore::open(store_dir)?;
    let tokenizer = store.tokenizer()?;
    let app_state = AppState { store: Arc::new(store), tokenizer, config };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/concepts", get(concepts_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

pub async fn concepts_handler(
    State(state): State<AppState>,
    Query(params): Query<ConceptParams>,
) -> Result<Json<ConceptResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);

    let text = params.q.clone();
    let title = params.title.clone();
    // ranking does blocking store reads
    let found = tokio::task::spawn_blocking(move || {
        let ranker = ConceptRanker::new(state.store.as_ref(), state.tokenizer, state.config.clone());
        ranker.word_concepts(&text, title.as_deref())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| {
        tracing::error!(error = %e, "concept ranking failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let (terms, results) = match found {
        Some(found) => {
            let hits = found
                .results
                .into_iter()
                .take(k)
                .map(|r| ConceptHit {
                    page_id: r.page_id,
                    name: r.page_name,
                    weight: r.weight,
                    incoming: r.incoming,
                    outgoing: r.outgoing,
                })
                .collect();
            (found.terms, hits)
        }
        None => (Vec::new(), Vec::new()),
    };

    let elapsed = start.elapsed();
    Ok(Json(ConceptResponse { query: params.q, took_s: elapsed.as_secs_f64(), terms, results }))
}
