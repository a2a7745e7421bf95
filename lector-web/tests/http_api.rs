//! Testes do roteador HTTP, sem abrir socket: cada requisição vai direto via `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use lector_core::MemoryStore;
use lector_web::{config::WebConfig, router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const SEED: &str = r#"[
    {"language_id": 1, "surface": "have to", "token_sequence": ["have", "to"], "frequency_rank": 2, "status": 2, "gloss": "must"},
    {"language_id": 1, "surface": "have", "token_sequence": ["have"], "frequency_rank": 1, "status": 1, "gloss": "own"}
]"#;

fn build_test_app() -> axum::Router {
    let store = MemoryStore::from_json(SEED).expect("seed válido");
    let state = AppState::new(Arc::new(store), &WebConfig::default()).expect("idiomas padrão válidos");
    router(Arc::new(state))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn surfaces(sentence: &Value) -> Vec<String> {
    sentence["data"]["words"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["surface"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let app = build_test_app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_annotate_multi_word_expression() {
    let app = build_test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/annotate",
        Some(json!({"text": "I have to go home.", "language_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_units"], 1);

    let sentence = &body["units"][0];
    assert_eq!(sentence["type"], "sentence");
    assert_eq!(sentence["data"]["paragraph_order"], 1);
    assert_eq!(surfaces(sentence), vec!["I", "have to", "go", "home", "."]);
    assert_eq!(sentence["data"]["words"][1]["gloss"], "must");
}

#[tokio::test]
async fn test_annotate_unknown_language() {
    let app = build_test_app();
    let (status, body) = send(&app, "POST", "/annotate", Some(json!({"text": "Hi.", "language_id": 77}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("77"));
}

#[tokio::test]
async fn test_annotate_unsupported_markdown() {
    let app = build_test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/annotate",
        Some(json!({"text": "- item one\n- item two", "language_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_languages_and_parsers() {
    let app = build_test_app();
    let (_, languages) = send(&app, "GET", "/languages", None).await;
    let ids: Vec<i64> = languages.as_array().unwrap().iter().map(|l| l["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let (_, parsers) = send(&app, "GET", "/parsers", None).await;
    let names: Vec<&str> = parsers
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["display_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Chinese", "English", "Japanese"]);
}

#[tokio::test]
async fn test_register_language_with_unknown_parser() {
    let app = build_test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/languages",
        Some(json!({"id": 4, "name": "Klingon", "parser_name": "klingon"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_word_mutations_reach_the_index() {
    let app = build_test_app();
    let annotate = json!({"text": "Look up the word.", "language_id": 1});

    // Constrói o índice antes de qualquer escrita
    let (_, before) = send(&app, "POST", "/annotate", Some(annotate.clone())).await;
    assert_eq!(surfaces(&before["units"][0])[0], "Look");

    let (status, created) = send(
        &app,
        "POST",
        "/words",
        Some(json!({"language_id": 1, "surface": "Look up", "token_sequence": ["Look", "up"], "frequency_rank": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["first_token"], "Look");
    assert_eq!(created["is_multi_token"], true);

    let (_, after) = send(&app, "POST", "/annotate", Some(annotate.clone())).await;
    assert_eq!(surfaces(&after["units"][0])[0], "Look up");

    let id = created["id"].as_i64().unwrap();
    let (status, _) = send(&app, "DELETE", &format!("/words/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, removed) = send(&app, "POST", "/annotate", Some(annotate)).await;
    assert_eq!(surfaces(&removed["units"][0])[0], "Look");
}

#[tokio::test]
async fn test_update_and_missing_words() {
    let app = build_test_app();
    let (status, updated) = send(
        &app,
        "PUT",
        "/words/2",
        Some(json!({"language_id": 1, "surface": "have", "token_sequence": ["have"], "gloss": "possess"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["gloss"], "possess");

    let (status, _) = send(&app, "DELETE", "/words/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/words",
        Some(json!({"language_id": 1, "surface": "nothing", "token_sequence": []})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_upsert_by_surface() {
    let app = build_test_app();
    let (status, body) = send(
        &app,
        "PUT",
        "/words",
        Some(json!({"language_id": 1, "surface": "have to", "token_sequence": ["have", "to"], "status": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["status"], 5);
}
