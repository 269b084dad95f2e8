use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use omnibase_catalog::CatalogError;
use omnibase_catalog::cache::UsageBudgetedCache;
use omnibase_catalog::import::ImportOrchestrator;
use omnibase_catalog::lookup::Catalog;
use omnibase_catalog::provider::CatalogProvider;
use omnibase_core::clock::{Clock, ManualClock};
use omnibase_server::ai::{AiError, CompletionProvider};
use omnibase_server::routes::build_router;
use omnibase_server::state::AppState;
use omnibase_store::repo::settings::SettingsRepo;
use omnibase_store::repo::usage::UsageBudget;
use omnibase_store::{MOVIES, MemoryBackend, Store, TRANSLATIONS};
use serde_json::{Value, json};

/// Catalog answering from a fixed table and counting requests.
#[derive(Default)]
struct StubCatalog {
    answers: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl StubCatalog {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CatalogProvider for StubCatalog {
    fn name(&self) -> &str {
        "stub"
    }

    async fn search(&self, title: &str, _region: &str) -> Result<Value, CatalogError> {
        self.calls.lock().unwrap().push(title.to_string());
        self.answers.get(title).cloned().ok_or(CatalogError::NotFound)
    }
}

/// Completion backend returning a canned answer and keeping the prompts.
struct CannedAi {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl CompletionProvider for CannedAi {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

struct TestApp {
    server: TestServer,
    store: Store,
    catalog: Arc<StubCatalog>,
    ai: Arc<CannedAi>,
}

fn catalog_answers() -> HashMap<String, Value> {
    HashMap::from([
        (
            "Heat".to_string(),
            json!([{ "title": "Heat", "showType": "movie", "releaseYear": 1995, "genres": ["Crime", "Drama"] }]),
        ),
        (
            "Dark".to_string(),
            json!([{ "title": "Dark", "showType": "series", "firstAirYear": 2017, "genres": ["Drama"] }]),
        ),
        (
            "Ronin".to_string(),
            json!({ "results": [{ "title": "Ronin", "type": "movie", "year": 1998 }] }),
        ),
        ("Garbage".to_string(), json!({ "message": "unexpected" })),
    ])
}

fn test_app_with(limit: u64, answer: &str) -> TestApp {
    let backend = Arc::new(MemoryBackend::default());
    let store = Store::new(backend);
    let settings = SettingsRepo::new(store.clone());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000.0, "2025-03"));

    let provider = Arc::new(StubCatalog {
        answers: catalog_answers(),
        ..Default::default()
    });
    let budget = UsageBudget::new(store.clone(), clock.clone(), limit);
    let cache = UsageBudgetedCache::new(store.clone(), budget, clock.clone());
    let catalog = Arc::new(Catalog::new(provider.clone(), cache, "DE".into()));
    let importer = Arc::new(
        ImportOrchestrator::new(catalog.clone(), clock.clone()).with_pace(Duration::ZERO),
    );
    let ai = Arc::new(CannedAi {
        answer: answer.to_string(),
        prompts: Mutex::new(Vec::new()),
    });

    let (events_tx, _) = tokio::sync::broadcast::channel(64);
    let state = AppState {
        store: store.clone(),
        settings,
        catalog,
        importer,
        ai: ai.clone(),
        clock,
        events: events_tx,
    };

    TestApp {
        server: TestServer::new(build_router(state)).unwrap(),
        store,
        catalog: provider,
        ai,
    }
}

fn test_app() -> TestApp {
    test_app_with(1000, "[]")
}

fn upload(csv: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(csv.as_bytes().to_vec())
            .file_name("NetflixViewingHistory.csv")
            .mime_type("text/csv"),
    )
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let app = test_app();
    let resp = app.server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn movie_crud_round() {
    let app = test_app();

    let resp = app
        .server
        .post("/api/movies")
        .json(&json!({ "title": "Alien", "rating": 4, "type": "movie" }))
        .await;
    resp.assert_status(axum::http::StatusCode::CREATED);
    let created: Value = resp.json();
    assert_eq!(created["title"], "Alien");
    assert_eq!(created["id"], 1_700_000_000.0);
    assert!(created["createdAt"].as_str().is_some());

    let id = created["id"].to_string();
    let resp = app
        .server
        .put(&format!("/api/movies/{id}"))
        .json(&json!({ "rating": 5, "notes": "classic" }))
        .await;
    resp.assert_status_ok();
    let updated: Value = resp.json();
    assert_eq!(updated["rating"], 5);
    assert_eq!(updated["notes"], "classic");
    assert_eq!(updated["title"], "Alien");
    assert!(updated["updatedAt"].as_str().is_some());

    let list: Vec<Value> = app.server.get("/api/movies").await.json();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["rating"], 5);

    let resp = app.server.delete(&format!("/api/movies/{id}")).await;
    resp.assert_status_ok();
    let removed: Value = resp.json();
    assert_eq!(removed["title"], "Alien");
    assert!(app.store.load_list(MOVIES).await.unwrap().is_empty());

    app.server
        .delete(&format!("/api/movies/{id}"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn create_requires_title() {
    let app = test_app();
    let resp = app.server.post("/api/movies").json(&json!({ "rating": 3 })).await;
    resp.assert_status_bad_request();
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn create_with_catalog_fills_blank_fields() {
    let app = test_app();
    let resp = app
        .server
        .post("/api/movies")
        .json(&json!({ "title": "Heat", "useApi": true, "genre": "", "rating": 5 }))
        .await;
    resp.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = resp.json();
    assert_eq!(body["title"], "Heat");
    assert_eq!(body["genre"], "Crime, Drama");
    assert_eq!(body["year"], 1995);
    assert_eq!(body["rating"], 5);
    assert!(body.get("useApi").is_none());
}

#[tokio::test]
async fn update_unknown_record_is_not_found() {
    let app = test_app();
    app.server
        .put("/api/movies/42")
        .json(&json!({ "rating": 1 }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn search_outcomes() {
    let app = test_app();

    let resp = app.server.get("/api/movies/search").add_query_param("title", "Ronin").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["title"], "Ronin");
    assert_eq!(body["year"], 1998);
    assert_eq!(body["type"], "movie");

    app.server
        .get("/api/movies/search")
        .add_query_param("title", "")
        .await
        .assert_status_bad_request();
    app.server
        .get("/api/movies/search")
        .add_query_param("title", "Nothing Like It")
        .await
        .assert_status_not_found();
    app.server
        .get("/api/movies/search")
        .add_query_param("title", "Garbage")
        .await
        .assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn search_is_cached_and_counted_once() {
    let app = test_app();
    for _ in 0..3 {
        app.server
            .get("/api/movies/search")
            .add_query_param("title", "Heat")
            .await
            .assert_status_ok();
    }
    assert_eq!(app.catalog.calls(), vec!["Heat"]);

    let usage: Value = app.server.get("/api/api_usage").await.json();
    assert_eq!(usage["usage_count"], 1);
    assert_eq!(usage["limit"], 1000);
    assert_eq!(usage["percentage"], 0.1);
}

#[tokio::test]
async fn search_refused_when_budget_spent() {
    let app = test_app_with(0, "[]");
    let resp = app
        .server
        .get("/api/movies/search")
        .add_query_param("title", "Heat")
        .await;
    resp.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "budget_exhausted");
    assert!(app.catalog.calls().is_empty());
}

const HISTORY: &str = "Title,Date\n\
\"Dark: Staffel 1: Geheimnisse\",\"01.02.2024\"\n\
\"Dark: Staffel 2: Anfänge\",\"02.02.2024\"\n\
\"Heat\",\"03.02.2024\"\n\
\"Obscure Film\",\"04.02.2024\"\n";

#[tokio::test]
async fn netflix_import_stores_enriched_and_placeholder_records() {
    let app = test_app();
    let resp = app
        .server
        .post("/api/import/netflix")
        .multipart(upload(HISTORY))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["imported"], 3);
    assert_eq!(body["skipped"], 0);
    assert_eq!(body["movies"], json!(["Heat", "Obscure Film"]));
    assert_eq!(body["series"], json!(["Dark (Staffel 1, 2)"]));

    assert_eq!(app.catalog.calls(), vec!["Heat", "Obscure Film", "Dark"]);

    let stored = app.store.load_list(MOVIES).await.unwrap();
    let by_title = |t: &str| stored.iter().find(|r| r["title"] == t).cloned().unwrap();
    assert_eq!(by_title("Heat")["year"], 1995);
    assert_eq!(by_title("Obscure Film")["rating"], 0);
    let dark = by_title("Dark (Staffel 1, 2)");
    assert_eq!(dark["type"], "series");
    assert_eq!(dark["source"], "netflix_import");

    // a second import of the same file only skips
    let resp = app
        .server
        .post("/api/import/netflix")
        .multipart(upload(HISTORY))
        .await;
    let body: Value = resp.json();
    assert_eq!(body["imported"], 0);
    assert_eq!(body["skipped"], 3);
    assert_eq!(app.store.load_list(MOVIES).await.unwrap().len(), 3);
}

#[tokio::test]
async fn netflix_import_rejects_bad_uploads() {
    let app = test_app();

    let form = MultipartForm::new().add_text("other", "x");
    app.server
        .post("/api/import/netflix")
        .multipart(form)
        .await
        .assert_status_bad_request();

    let resp = app
        .server
        .post("/api/import/netflix")
        .multipart(upload("Name,Date\nHeat,01.01.2024\n"))
        .await;
    resp.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "malformed_import");
}

#[tokio::test]
async fn netflix_import_aborts_when_batch_exceeds_budget() {
    let app = test_app_with(2, "[]");
    let resp = app
        .server
        .post("/api/import/netflix")
        .multipart(upload(HISTORY))
        .await;
    resp.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert!(app.catalog.calls().is_empty());
    assert!(app.store.load_list(MOVIES).await.unwrap().is_empty());
}

#[tokio::test]
async fn settings_are_masked_and_merged() {
    let app = test_app();

    let defaults: Value = app.server.get("/api/settings").await.json();
    assert_eq!(defaults["ai_provider"], "openai");
    assert_eq!(defaults["openai_api_key"], "");

    app.server
        .post("/api/settings")
        .json(&json!({ "openai_api_key": "sk-secret", "language": "de" }))
        .await
        .assert_status_ok();
    app.server
        .post("/api/settings")
        .json(&json!({ "openai_api_key": "", "ai_provider": "gemini" }))
        .await
        .assert_status_ok();

    let current: Value = app.server.get("/api/settings").await.json();
    assert_eq!(current["openai_api_key"], "********");
    assert_eq!(current["language"], "de");
    assert_eq!(current["ai_provider"], "gemini");
}

#[tokio::test]
async fn settings_reject_wrongly_typed_values() {
    let app = test_app();
    let resp = app
        .server
        .post("/api/settings")
        .json(&json!({ "language": 5 }))
        .await;
    resp.assert_status_bad_request();

    app.server
        .post("/api/settings")
        .json(&json!({ "openai_api_key": null, "api_usage_count": "x" }))
        .await
        .assert_status_ok();

    let current: Value = app.server.get("/api/settings").await.json();
    assert_eq!(current["language"], "en");
    assert_eq!(current["openai_api_key"], "");
    assert!(current.get("api_usage_count").is_none());
}

#[tokio::test]
async fn translations_default_to_empty_and_serve_the_document() {
    let app = test_app();
    let empty: Value = app.server.get("/api/translations").await.json();
    assert_eq!(empty, json!({}));

    let doc = json!({ "de": { "title": "Titel" }, "en": { "title": "Title" } });
    app.store
        .save_map(TRANSLATIONS, doc.as_object().unwrap())
        .await
        .unwrap();
    let resp = app.server.get("/api/translations").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body, doc);
}

#[tokio::test]
async fn ask_ai_requires_a_message() {
    let app = test_app_with(1000, "Try Heat.");
    app.server
        .post("/api/ask_ai")
        .json(&json!({}))
        .await
        .assert_status_bad_request();

    let resp = app
        .server
        .post("/api/ask_ai")
        .json(&json!({ "message": "What should I watch?" }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body, json!({ "success": true, "answer": "Try Heat." }));
}

#[tokio::test]
async fn suggestions_resolve_through_the_catalog() {
    let answer = r#"[{"recomendation_1":"Ronin","recomendation_2":"Unknown Thing"}]"#;
    let app = test_app_with(1000, answer);
    app.store
        .save_list(
            MOVIES,
            &[json!({ "title": "Heat", "rating": 5, "genre": "Crime, Drama", "id": 1.0 })],
        )
        .await
        .unwrap();

    let resp = app
        .server
        .post("/api/ai_suggestions")
        .json(&json!({ "contentType": "movie", "suggestionCount": 2 }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["success"], true);
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 1);
    assert_eq!(recommendations[0]["title"], "Ronin");
    assert_eq!(body["favorites"][0]["title"], "Heat");

    let prompts = app.ai.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("I need recommendations for movies (please suggest exactly 2 titles)."));
    assert!(prompts[0].contains("already seen them: Heat. "));
    assert_eq!(body["prompt"], prompts[0]);
}

#[tokio::test]
async fn suggestions_respect_the_budget() {
    let app = test_app_with(3, "[]");
    let resp = app
        .server
        .post("/api/ai_suggestions")
        .json(&json!({ "suggestionCount": 5 }))
        .await;
    resp.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert!(app.ai.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_suggestion_counts_are_rejected() {
    let app = test_app();
    let resp = app
        .server
        .post("/api/ai_suggestions")
        .json(&json!({ "suggestionCount": u64::MAX }))
        .await;
    resp.assert_status_bad_request();
    assert!(app.ai.prompts.lock().unwrap().is_empty());
    assert!(app.catalog.calls().is_empty());
}
