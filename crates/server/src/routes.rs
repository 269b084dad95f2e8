use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use omnibase_catalog::CanonicalRecord;
use omnibase_catalog::import::{ImportOutcome, candidates_from};
use omnibase_core::error::ApiError;
use omnibase_history::{classify, read_titles};
use omnibase_store::{MOVIES, TRANSLATIONS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::AppError;
use crate::state::{AppState, ServerEvent};
use crate::suggestions::{
    ContentType, DEFAULT_FAVORITES, PromptInput, extract_recommendations, favorite_titles,
    genre_ratings, suggestion_prompt,
};

/// Upper bound for uploaded history exports.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound for one suggestion request.
const MAX_SUGGESTIONS: u64 = 50;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        // Collection
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/search", get(search_movie))
        .route("/movies/{id}", put(update_movie).delete(delete_movie))
        // History import
        .route(
            "/import/netflix",
            post(import_netflix).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Budget and settings
        .route("/api_usage", get(api_usage))
        .route("/settings", get(get_settings).post(update_settings))
        .route("/translations", get(get_translations))
        // Assistant
        .route("/ask_ai", post(ask_ai))
        .route("/ai_suggestions", post(ai_suggestions))
        .route("/events", get(sse_events))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.store.load_list(MOVIES).await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Request key asking for catalog enrichment; never stored.
const USE_API_KEY: &str = "useApi";

fn body_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest("request body must be a JSON object".into())),
    }
}

fn wants_catalog(body: &mut Map<String, Value>) -> bool {
    body.remove(USE_API_KEY)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Values a user leaves unset in the form: null, false, 0 and empty
/// strings, lists and objects.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Copy catalog fields into `target` wherever the user left them blank.
fn fill_blanks(target: &mut Map<String, Value>, found: CanonicalRecord) {
    let Ok(Value::Object(found)) = serde_json::to_value(found) else {
        return;
    };
    for (key, value) in found {
        if target.get(&key).is_none_or(is_blank) {
            target.insert(key, value);
        }
    }
}

/// Path ids are compared against the stored id's JSON text, then numerically.
fn id_matches(stored: Option<&Value>, wanted: &str) -> bool {
    match stored {
        Some(Value::String(s)) => s == wanted,
        Some(Value::Number(n)) => {
            n.to_string() == wanted
                || wanted
                    .parse::<f64>()
                    .is_ok_and(|w| n.as_f64() == Some(w))
        }
        _ => false,
    }
}

async fn list_movies(State(state): State<AppState>) -> Result<Json<Vec<Value>>, AppError> {
    Ok(Json(state.store.load_list(MOVIES).await?))
}

async fn create_movie(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut record = body_object(body)?;
    let title = match record.get("title") {
        Some(Value::String(t)) if !t.trim().is_empty() => t.clone(),
        _ => return Err(ApiError::BadRequest("title is required".into()).into()),
    };

    if wants_catalog(&mut record) {
        match state.catalog.lookup(&title).await {
            Some(found) => fill_blanks(&mut record, found),
            None => warn!(title = %title, "no catalog data for new record"),
        }
    }

    record.insert("id".into(), json!(state.clock.now()));
    record.insert("createdAt".into(), json!(state.clock.now_rfc3339()));
    let record = Value::Object(record);

    let _guard = state.store.lock(MOVIES).await;
    let mut movies = state.store.load_list(MOVIES).await?;
    movies.push(record.clone());
    state.store.save_list(MOVIES, &movies).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let mut patch = body_object(body)?;
    let use_api = wants_catalog(&mut patch);

    let current_title = state
        .store
        .load_list(MOVIES)
        .await?
        .iter()
        .find(|m| id_matches(m.get("id"), &id))
        .map(|m| m.get("title").cloned())
        .ok_or_else(|| ApiError::NotFound(format!("record {id}")))?;

    if use_api {
        let previous = current_title.as_ref().and_then(Value::as_str);
        let renamed = patch
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| previous != Some(*t))
            .map(str::to_string);
        if let Some(title) = renamed {
            match state.catalog.lookup(&title).await {
                Some(found) => fill_blanks(&mut patch, found),
                None => warn!(title = %title, "no catalog data for renamed record"),
            }
        }
    }

    let _guard = state.store.lock(MOVIES).await;
    let mut movies = state.store.load_list(MOVIES).await?;
    let movie = movies
        .iter_mut()
        .find(|m| id_matches(m.get("id"), &id))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ApiError::NotFound(format!("record {id}")))?;
    movie.extend(patch);
    movie.insert("updatedAt".into(), json!(state.clock.now_rfc3339()));
    let updated = Value::Object(movie.clone());
    state.store.save_list(MOVIES, &movies).await?;

    Ok(Json(updated))
}

async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let _guard = state.store.lock(MOVIES).await;
    let mut movies = state.store.load_list(MOVIES).await?;
    let index = movies
        .iter()
        .position(|m| id_matches(m.get("id"), &id))
        .ok_or_else(|| ApiError::NotFound(format!("record {id}")))?;
    let removed = movies.remove(index);
    state.store.save_list(MOVIES, &movies).await?;
    Ok(Json(removed))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    title: String,
}

async fn search_movie(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<CanonicalRecord>, AppError> {
    let title = query.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("no title provided".into()).into());
    }
    if state.catalog.would_exceed(1).await {
        return Err(ApiError::BudgetExhausted(
            "API usage limit reached. Please try again later.".into(),
        )
        .into());
    }
    let payload = state
        .catalog
        .payload(title)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no results for {title}")))?;
    let record = omnibase_catalog::normalize::normalize(&payload)
        .ok_or_else(|| ApiError::Internal("could not process catalog response".into()))?;
    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// History import
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ImportResponse {
    success: bool,
    imported: usize,
    skipped: usize,
    movies: Vec<String>,
    series: Vec<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        ApiError::BadRequest(format!("invalid upload: {e}"))
    };
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        if field.name() != Some("file") {
            continue;
        }
        if field.file_name().is_some_and(str::is_empty) {
            return Err(ApiError::BadRequest("no file selected".into()));
        }
        return Ok(field.bytes().await.map_err(bad)?.to_vec());
    }
    Err(ApiError::BadRequest("no file provided".into()))
}

async fn import_netflix(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportResponse>, AppError> {
    let bytes = read_upload(multipart).await?;
    let titles = read_titles(&bytes)?;
    let classification = classify(&titles);
    let candidates = candidates_from(&classification);
    info!(
        rows = titles.len(),
        movies = classification.movies.len(),
        series = classification.series.len(),
        "history export classified"
    );

    // Fail before taking the collection lock when the batch cannot fit.
    state.importer.preflight(candidates.len()).await?;

    let _guard = state.store.lock(MOVIES).await;
    let mut movies = state.store.load_list(MOVIES).await?;
    let events = &state.events;
    let ImportOutcome {
        imported,
        skipped,
        records,
    } = state
        .importer
        .import_with_progress(&candidates, &movies, |p| {
            let _ = events.send(ServerEvent::ImportProgress {
                processed: p.processed,
                total: p.total,
                title: p.title.to_string(),
                skipped: p.skipped,
            });
        })
        .await?;

    if !records.is_empty() {
        movies.extend(records);
        state.store.save_list(MOVIES, &movies).await?;
    }
    let _ = events.send(ServerEvent::ImportComplete { imported, skipped });

    Ok(Json(ImportResponse {
        success: true,
        imported,
        skipped,
        series: classification.series_labels(),
        movies: classification.movies,
    }))
}

// ---------------------------------------------------------------------------
// Budget and settings
// ---------------------------------------------------------------------------

async fn api_usage(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let usage = state.catalog.usage().await?;
    Ok(Json(json!(usage)))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<Map<String, Value>>, AppError> {
    Ok(Json(state.settings.load_masked().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let patch = body_object(body)?;
    state.settings.merge_non_empty(&patch).await?;
    Ok(Json(json!({ "success": true, "message": "Settings saved" })))
}

async fn get_translations(
    State(state): State<AppState>,
) -> Result<Json<Map<String, Value>>, AppError> {
    Ok(Json(state.store.load_map(TRANSLATIONS).await?))
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    message: String,
}

async fn ask_ai(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Value>, AppError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("no message provided".into()).into());
    }
    let answer = state.ai.complete(&req.message).await?;
    Ok(Json(json!({ "success": true, "answer": answer })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionRequest {
    #[serde(default)]
    selection_mode: String,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default)]
    description: String,
    #[serde(default)]
    favorites: Vec<Value>,
    #[serde(default = "default_suggestion_count")]
    suggestion_count: u64,
}

fn default_suggestion_count() -> u64 {
    5
}

async fn ai_suggestions(
    State(state): State<AppState>,
    Json(req): Json<SuggestionRequest>,
) -> Result<Json<Value>, AppError> {
    if req.suggestion_count == 0 || req.suggestion_count > MAX_SUGGESTIONS {
        return Err(ApiError::BadRequest(format!(
            "suggestionCount must be between 1 and {MAX_SUGGESTIONS}"
        ))
        .into());
    }
    if state.catalog.would_exceed(req.suggestion_count).await {
        return Err(ApiError::BudgetExhausted(
            "API usage limit reached. Try again next month or ask for fewer suggestions.".into(),
        )
        .into());
    }

    let all = state.store.load_list(MOVIES).await?;
    let analysed: Vec<Value> = if req.selection_mode == "rated" {
        all.iter()
            .filter(|r| r.get("rating").and_then(Value::as_f64).unwrap_or(0.0) > 0.0)
            .cloned()
            .collect()
    } else {
        all.clone()
    };
    let genres = genre_ratings(&analysed);
    let favorites = if req.favorites.is_empty() {
        favorite_titles(&all, DEFAULT_FAVORITES)
    } else {
        req.favorites
    };
    let watched: Vec<String> = all
        .iter()
        .map(|r| r.get("title").and_then(Value::as_str).unwrap_or("").to_string())
        .collect();

    let prompt = suggestion_prompt(&PromptInput {
        content_type: req.content_type,
        count: req.suggestion_count,
        description: &req.description,
        genres: &genres,
        favorites: &favorites,
        watched: &watched,
    });
    let answer = state.ai.complete(&prompt).await?;

    let mut recommendations = Vec::new();
    for title in extract_recommendations(&answer) {
        if let Some(found) = state.catalog.lookup(&title).await {
            recommendations.push(found);
        }
    }
    info!(found = recommendations.len(), "suggestions resolved");

    Ok(Json(json!({
        "success": true,
        "recommendations": recommendations,
        "favorites": favorites,
        "prompt": prompt,
        "ai_response": answer,
    })))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

async fn sse_events(
    State(state): State<AppState>,
) -> axum::response::Sse<
    impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    use axum::response::sse::Event;
    use std::time::Duration;

    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(evt) => {
                    if let Ok(data) = serde_json::to_string(&evt) {
                        yield Ok(Event::default().event(evt.name()).data(data));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(format!(r#"{{"lagged":{n}}}"#)));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    axum::response::Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_match_form_semantics() {
        for blank in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(is_blank(&blank), "{blank}");
        }
        for filled in [json!(true), json!(7), json!("x"), json!([1]), json!({ "a": 1 })] {
            assert!(!is_blank(&filled), "{filled}");
        }
    }

    #[test]
    fn ids_match_by_text_or_number() {
        assert!(id_matches(Some(&json!(1700000000.5)), "1700000000.5"));
        assert!(id_matches(Some(&json!(1700000000.0)), "1700000000.0"));
        assert!(id_matches(Some(&json!(1700000000.0)), "1700000000"));
        assert!(id_matches(Some(&json!("abc")), "abc"));
        assert!(!id_matches(Some(&json!(1.5)), "2.5"));
        assert!(!id_matches(None, "1"));
    }

    #[test]
    fn catalog_fields_fill_only_blanks() {
        let mut record = body_object(json!({ "title": "Heat", "genre": "", "rating": 4 })).unwrap();
        let found = omnibase_catalog::normalize::normalize(&json!([{
            "title": "Heat (1995)", "showType": "movie", "releaseYear": 1995, "genres": ["Crime"]
        }]))
        .unwrap();
        fill_blanks(&mut record, found);
        assert_eq!(record["title"], "Heat");
        assert_eq!(record["genre"], "Crime");
        assert_eq!(record["rating"], 4);
        assert_eq!(record["year"], 1995);
    }
}
