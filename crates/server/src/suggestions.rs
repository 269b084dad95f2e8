//! Prompt building and answer parsing for AI-driven recommendations.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

/// Prefix of every recommendation key in the requested answer format.
const RECOMMENDATION_KEY: &str = "recomendation_";

static RE_RECOMMENDATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"recomendation_\d+":\s*"([^"]+)""#).unwrap());

pub const DEFAULT_FAVORITES: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    #[default]
    #[serde(other)]
    Both,
}

impl ContentType {
    fn phrase(self) -> &'static str {
        match self {
            Self::Movie => "movies",
            Self::Series => "TV series",
            Self::Both => "movies or TV series",
        }
    }
}

fn rating_of(record: &Value) -> f64 {
    record.get("rating").and_then(Value::as_f64).unwrap_or(0.0)
}

/// Genre preference on a 0–5 scale, relative to the most frequent genre,
/// in order of first appearance.
pub fn genre_ratings(records: &[Value]) -> Vec<(String, f64)> {
    let mut counts: Vec<(String, u32)> = Vec::new();
    for record in records {
        let genres = record.get("genre").and_then(Value::as_str).unwrap_or("");
        for genre in genres.split(',').map(str::trim).filter(|g| !g.is_empty()) {
            match counts.iter_mut().find(|(name, _)| name == genre) {
                Some((_, count)) => *count += 1,
                None => counts.push((genre.to_string(), 1)),
            }
        }
    }

    let Some(max) = counts.iter().map(|(_, c)| *c).max() else {
        return Vec::new();
    };
    counts
        .into_iter()
        .map(|(genre, count)| {
            let rating = (f64::from(count) / f64::from(max) * 50.0).round() / 10.0;
            (genre, rating)
        })
        .collect()
}

/// The `limit` highest-rated records (rating above zero) as
/// `{title, rating, id, type}` summaries. Ties keep collection order.
pub fn favorite_titles(records: &[Value], limit: usize) -> Vec<Value> {
    let mut rated: Vec<&Value> = records.iter().filter(|r| rating_of(r) > 0.0).collect();
    rated.sort_by(|a, b| rating_of(b).total_cmp(&rating_of(a)));
    rated
        .into_iter()
        .take(limit)
        .map(|r| {
            json!({
                "title": r.get("title").cloned().unwrap_or_else(|| json!("")),
                "rating": r.get("rating").cloned().unwrap_or_else(|| json!(0)),
                "id": r.get("id").cloned().unwrap_or_else(|| json!("")),
                "type": r.get("type").cloned().unwrap_or_else(|| json!("movie")),
            })
        })
        .collect()
}

fn plain(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub struct PromptInput<'a> {
    pub content_type: ContentType,
    pub count: u64,
    pub description: &'a str,
    pub genres: &'a [(String, f64)],
    pub favorites: &'a [Value],
    pub watched: &'a [String],
}

pub fn suggestion_prompt(input: &PromptInput<'_>) -> String {
    let mut prompt = format!(
        "I need recommendations for {} (please suggest exactly {} titles). ",
        input.content_type.phrase(),
        input.count
    );

    if !input.description.is_empty() {
        prompt.push_str(&format!(
            "I'm looking for something about: {}. ",
            input.description
        ));
    }

    if !input.genres.is_empty() {
        let mut genres: Vec<&(String, f64)> = input.genres.iter().collect();
        genres.sort_by(|a, b| b.1.total_cmp(&a.1));
        let items: Vec<String> = genres
            .iter()
            .map(|(genre, rating)| format!("{genre} ({rating:.1}/5)"))
            .collect();
        prompt.push_str(
            "Based on my collection, I seem to prefer these genres (with ratings based on frequency out of 5): ",
        );
        prompt.push_str(&items.join(", "));
        prompt.push_str(". ");
    }

    if !input.favorites.is_empty() {
        let items: Vec<String> = input
            .favorites
            .iter()
            .map(|f| format!("{} ({}/5)", plain(f.get("title")), plain(f.get("rating"))))
            .collect();
        prompt.push_str("My favorite titles are: ");
        prompt.push_str(&items.join(", "));
        prompt.push_str(". ");
    }

    if !input.watched.is_empty() {
        prompt.push_str("Please DO NOT recommend any of these titles as I've already seen them: ");
        prompt.push_str(&input.watched.join(", "));
        prompt.push_str(". ");
    }

    prompt.push_str(
        "Please format your answer ONLY as a JSON object with the following syntax: \
         [{\"recomendation_1\":\"title_of_the_recomendation\", \"recomendation_2\":\"title_of_the_recomendation\"}]. \
         Do not include any other text or explanations in your response, just the JSON array with exactly the recommendations I asked for.",
    );
    prompt
}

fn collect_from_object(obj: &Map<String, Value>, out: &mut Vec<String>) {
    for (key, value) in obj {
        if !key.starts_with(RECOMMENDATION_KEY) {
            continue;
        }
        if let Some(title) = value.as_str().filter(|t| !t.is_empty()) {
            out.push(title.to_string());
        }
    }
}

/// Recommended titles from a completion answer. The JSON between the first
/// `[` and the last `]` is preferred, then the whole answer; when neither
/// parses, the key/value pairs are scraped directly.
pub fn extract_recommendations(answer: &str) -> Vec<String> {
    let candidate = match (answer.find('['), answer.rfind(']')) {
        (Some(start), Some(end)) if end > start => &answer[start..=end],
        _ => answer,
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(parsed) => {
            let mut out = Vec::new();
            match &parsed {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_object)
                    .for_each(|obj| collect_from_object(obj, &mut out)),
                Value::Object(obj) => collect_from_object(obj, &mut out),
                _ => {}
            }
            out
        }
        Err(e) => {
            warn!(error = %e, "completion answer is not JSON, scraping recommendations");
            RE_RECOMMENDATION
                .captures_iter(answer)
                .map(|caps| caps[1].to_string())
                .collect()
        }
    }
}
