//! Movie-versus-series classification of exported viewing history titles.
//!
//! Titles are grouped by the text before their first colon. Each group is
//! reduced to a handful of boolean signals and run through [`RULES`], an
//! ordered decision table where the first matching rule marks the group as
//! a series. Groups no rule claims are movies. A final pass promotes
//! titles with nested colons that grouping alone did not catch.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

// "Staffel 2", "Season 10", "staffel3"
static RE_SEASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Staffel|Season)\s*(\d+)").unwrap());

// S01E02, s1e3
static RE_EPISODE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)S(\d+)E\d+").unwrap());

// "Folge 3", "Episode 12", "Kapitel 1"
static RE_EPISODE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Folge|Episode|Kapitel)\s*\d+").unwrap());

const MINISERIES_MARKER: &str = "miniserie";

/// Post-colon suffixes of an untagged episode list stay within this length spread.
pub const SUFFIX_LENGTH_SPREAD: usize = 20;

/// Season assumed when a series title carries no season number.
pub const DEFAULT_SEASON: &str = "1";

/// Signals computed over every title of a prefix group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSignals {
    pub size: usize,
    pub multi_colon: bool,
    pub season_pattern: bool,
    pub episode_pattern: bool,
    pub miniseries_marker: bool,
    pub episode_word: bool,
    /// Trimmed text after the first colon of each title, present only when
    /// every title in the group has a colon.
    pub suffixes: Option<Vec<String>>,
}

impl GroupSignals {
    pub fn from_titles<S: AsRef<str>>(titles: &[S]) -> Self {
        let mut signals = Self {
            size: titles.len(),
            ..Default::default()
        };
        let mut suffixes = Vec::with_capacity(titles.len());
        let mut all_have_colon = true;

        for title in titles {
            let title = title.as_ref();
            signals.multi_colon |= title.matches(':').count() >= 2;
            signals.season_pattern |= RE_SEASON.is_match(title);
            signals.episode_pattern |= RE_EPISODE_CODE.is_match(title);
            signals.miniseries_marker |= title.to_lowercase().contains(MINISERIES_MARKER);
            signals.episode_word |= RE_EPISODE_WORD.is_match(title);

            match title.split_once(':') {
                Some((_, rest)) => suffixes.push(rest.trim().to_string()),
                None => all_have_colon = false,
            }
        }

        if all_have_colon {
            signals.suffixes = Some(suffixes);
        }
        signals
    }

    fn has_episode_markers(&self) -> bool {
        self.season_pattern || self.episode_pattern || self.miniseries_marker || self.episode_word
    }

    fn suffixes_look_like_episodes(&self) -> bool {
        let Some(suffixes) = &self.suffixes else {
            return false;
        };
        let distinct: HashSet<&String> = suffixes.iter().collect();
        if distinct.len() != suffixes.len() {
            return false;
        }
        let lengths = suffixes.iter().map(|s| s.chars().count());
        match (lengths.clone().max(), lengths.min()) {
            (Some(max), Some(min)) => max - min < SUFFIX_LENGTH_SPREAD,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleId {
    /// Three or more titles share a prefix.
    CrowdedPrefix,
    /// Two titles and at least one structural or episode marker.
    PairWithMarkers,
    /// A lone title carrying an explicit season/episode marker.
    SingleWithMarkers,
    /// Some title nests a second colon.
    NestedColons,
    /// Two or more colon titles whose suffixes are distinct and of similar length.
    EpisodeLikeSuffixes,
}

pub struct Rule {
    pub id: RuleId,
    pub applies: fn(&GroupSignals) -> bool,
}

/// Evaluated top to bottom; the first rule that applies makes the group a series.
pub static RULES: &[Rule] = &[
    Rule {
        id: RuleId::CrowdedPrefix,
        applies: |s| s.size >= 3,
    },
    Rule {
        id: RuleId::PairWithMarkers,
        applies: |s| s.size == 2 && (s.multi_colon || s.has_episode_markers()),
    },
    Rule {
        id: RuleId::SingleWithMarkers,
        applies: |s| s.size == 1 && s.has_episode_markers(),
    },
    Rule {
        id: RuleId::NestedColons,
        applies: |s| s.multi_colon,
    },
    Rule {
        id: RuleId::EpisodeLikeSuffixes,
        applies: |s| s.size >= 2 && s.suffixes_look_like_episodes(),
    },
];

/// The rule that classified a group as a series, or `None` for movies.
pub fn decide(signals: &GroupSignals) -> Option<RuleId> {
    RULES
        .iter()
        .find(|rule| (rule.applies)(signals))
        .map(|rule| rule.id)
}

/// Season numbers mentioned by a title: "Staffel/Season N" first, else "SxxEyy".
pub fn extract_season(title: &str) -> Option<String> {
    RE_SEASON
        .captures(title)
        .or_else(|| RE_EPISODE_CODE.captures(title))
        .map(|caps| caps[1].to_string())
}

/// Group key: trimmed text before the first colon, or the whole title.
pub fn prefix_of(title: &str) -> &str {
    match title.split_once(':') {
        Some((prefix, _)) => prefix.trim(),
        None => title,
    }
}

/// Numeric order for digit strings of any length: fewer significant digits
/// first, then digit by digit. Equal values ("1", "01") fall back to text order.
fn season_order(a: &str, b: &str) -> Ordering {
    let significant = |s: &str| s.trim_start_matches('0').to_string();
    let (sa, sb) = (significant(a), significant(b));
    sa.chars()
        .count()
        .cmp(&sb.chars().count())
        .then_with(|| sa.cmp(&sb))
        .then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesEntry {
    pub name: String,
    /// Season numbers as they appeared, ascending by numeric value.
    pub seasons: Vec<String>,
}

impl SeriesEntry {
    fn new(name: &str, seasons: BTreeSet<String>) -> Self {
        let mut seasons: Vec<String> = seasons.into_iter().collect();
        seasons.sort_by(|a, b| season_order(a, b));
        Self {
            name: name.to_string(),
            seasons,
        }
    }

    /// `"<name> (Staffel 1, 2)"`
    pub fn label(&self) -> String {
        format!("{} (Staffel {})", self.name, self.seasons.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Deduplicated, lexicographically sorted.
    pub movies: Vec<String>,
    /// Sorted by series name.
    pub series: Vec<SeriesEntry>,
}

impl Classification {
    pub fn series_labels(&self) -> Vec<String> {
        self.series.iter().map(SeriesEntry::label).collect()
    }

    /// Number of canonical titles a full import would look up.
    pub fn canonical_count(&self) -> usize {
        self.movies.len() + self.series.len()
    }
}

/// Classify raw history titles into movies and series.
pub fn classify<S: AsRef<str>>(titles: &[S]) -> Classification {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for title in titles {
        let title = title.as_ref();
        groups.entry(prefix_of(title)).or_default().push(title);
    }

    let mut series: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut movies: Vec<&str> = Vec::new();

    for (prefix, members) in &groups {
        let signals = GroupSignals::from_titles(members);
        match decide(&signals) {
            Some(rule) => {
                let mut seasons: BTreeSet<String> =
                    members.iter().filter_map(|t| extract_season(t)).collect();
                if seasons.is_empty() {
                    seasons.insert(DEFAULT_SEASON.to_string());
                }
                debug!(prefix, ?rule, seasons = seasons.len(), "series group");
                series.insert(prefix.to_string(), seasons);
            }
            None => movies.extend(members.iter().copied()),
        }
    }

    // Catch nested-colon titles the grouping did not already attribute to a series.
    for title in titles {
        let title = title.as_ref();
        let absorbed = series
            .keys()
            .any(|prefix| title.starts_with(&format!("{prefix}:")));
        if absorbed {
            movies.retain(|m| *m != title);
            continue;
        }
        if title.matches(':').count() >= 2 {
            series
                .entry(prefix_of(title).to_string())
                .or_insert_with(|| BTreeSet::from([DEFAULT_SEASON.to_string()]));
            movies.retain(|m| *m != title);
        }
    }

    let movies: BTreeSet<String> = movies.into_iter().map(str::to_string).collect();
    Classification {
        movies: movies.into_iter().collect(),
        series: series
            .into_iter()
            .map(|(name, seasons)| SeriesEntry::new(&name, seasons))
            .collect(),
    }
}
