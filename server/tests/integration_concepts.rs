use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use boc_core::store::{ConceptCorpusBuilder, PageSource, SledConceptStore};
use boc_core::{CorpusConfig, RankerConfig, Tokenizer};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_store(dir: &std::path::Path) {
    let config = CorpusConfig { min_page_length: 1, min_term_total: 1, ..CorpusConfig::default() };
    let mut builder = ConceptCorpusBuilder::new(config, Tokenizer::plain());
    let pages = [
        ("Rust (programming language)", "rust cargo borrow rust compiler cargo", "[[Cargo (software)]] and [[Rust]]"),
        ("Cargo (software)", "cargo rust package manager", "see [[Rust (programming language)|Rust]]"),
        ("Iron", "iron rust metal oxide", ""),
        ("Tea", "tea leaf brew", ""),
    ];
    for (name, text, markup) in pages {
        let source = PageSource { name: name.into(), text: format!("{text} {markup}"), links: None };
        builder.add_source(&source);
    }
    // store is dropped here so the app can take the lock
    SledConceptStore::import(dir, &builder.build()).unwrap();
}

async fn call(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

fn config() -> RankerConfig {
    RankerConfig { min_tfidf: 0.0, min_counter: 0, ..RankerConfig::default() }
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    build_tiny_store(dir.path());
    let app = boc_server::build_app(dir.path(), config()).unwrap();
    let (status, body) = call(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn concepts_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_store(dir.path());
    let app = boc_server::build_app(dir.path(), config()).unwrap();

    let (status, body) = call(app, "/concepts?q=rust%20cargo&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["query"], "rust cargo");
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert!(arr[0]["weight"].as_f64().unwrap() >= arr[1]["weight"].as_f64().unwrap());
    let names: Vec<&str> = arr.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert!(!names.contains(&"Tea"));
    assert!(json["terms"].as_array().unwrap().len() == 2);
}

#[tokio::test]
async fn stopword_query_is_empty() {
    let dir = tempdir().unwrap();
    build_tiny_store(dir.path());
    let app = boc_server::build_app(dir.path(), config()).unwrap();

    let (status, body) = call(app, "/concepts?q=the").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["results"].as_array().unwrap().is_empty());
    assert!(json["terms"].as_array().unwrap().is_empty());
}
