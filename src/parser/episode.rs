//! Episode and season number extraction from link labels
//!
//! Labels are free text in Arabic or English, e.g. `مسلسل X الموسم الثاني الحلقة 12 مترجمة`
//! or `Episode 4.5`. Merged episodes (`الحلقة 12 و 13`) and specials are skipped
//! because they have no single number to key on.

use regex::Regex;
use std::sync::LazyLock;

static EPISODE_MERGED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:الحلقة|Episode)\s*(\d+)\s*(?:و|&|and)\s*(\d+)").expect("valid regex")
});
static EPISODE_SPECIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:الحلقة|Episode)\s*(?:الخاصة|Special)").expect("valid regex")
});
static EPISODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:الحلقة|Episode)\s*(\d+(?:\.\d+)?)").expect("valid regex")
});
static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)").expect("valid regex"));
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("valid regex"));
static SEASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:الموسم|Season)\s*(\d+)").expect("valid regex"));

/// Arabic ordinals, compound forms first so `الثاني عشر` is not read as 2
const ARABIC_ORDINALS: &[(&str, i64)] = &[
    ("الحادي عشر", 11),
    ("الثاني عشر", 12),
    ("الثالث عشر", 13),
    ("الرابع عشر", 14),
    ("الخامس عشر", 15),
    ("الاول", 1),
    ("الثاني", 2),
    ("ثاني", 2),
    ("الثالث", 3),
    ("ثالث", 3),
    ("الرابع", 4),
    ("رابع", 4),
    ("الخامس", 5),
    ("خامس", 5),
    ("السادس", 6),
    ("سادس", 6),
    ("السابع", 7),
    ("سابع", 7),
    ("الثامن", 8),
    ("ثامن", 8),
    ("التاسع", 9),
    ("تاسع", 9),
    ("العاشر", 10),
    ("عاشر", 10),
];

/// Result of reading an episode label
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpisodeNumber {
    Number(f64),
    /// Merged, special, zero or unnumbered episodes
    Skip,
}

impl EpisodeNumber {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Skip => None,
        }
    }
}

/// Reads an episode number from a label
pub fn parse_episode_number(label: &str) -> EpisodeNumber {
    if EPISODE_MERGED_RE.is_match(label) || EPISODE_SPECIAL_RE.is_match(label) {
        return EpisodeNumber::Skip;
    }

    let captured = EPISODE_RE
        .captures(label)
        .or_else(|| DECIMAL_RE.captures(label))
        .or_else(|| NUMBER_RE.captures(label));

    match captured.and_then(|c| c[1].parse::<f64>().ok()) {
        Some(n) if n.is_finite() && n > 0.0 => EpisodeNumber::Number(n),
        _ => EpisodeNumber::Skip,
    }
}

/// Folds alef and yeh variants so ordinals match however the page spells them
fn fold_arabic(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'أ' | 'إ' | 'آ' => 'ا',
            'ى' => 'ي',
            other => other,
        })
        .collect()
}

fn ordinal(text: &str) -> Option<i64> {
    let folded = fold_arabic(text);
    ARABIC_ORDINALS
        .iter()
        .find(|(word, _)| folded.contains(word))
        .map(|(_, n)| *n)
}

/// Reads a season number from a label, digits first, then Arabic ordinals
pub fn parse_season_number(label: &str) -> Option<i64> {
    if let Some(n) = SEASON_RE
        .captures(label)
        .and_then(|c| c[1].parse::<i64>().ok())
    {
        return Some(n);
    }

    // An ordinal right after the season marker beats a stray number elsewhere
    if let Some(pos) = label.find("الموسم") {
        if let Some(n) = ordinal(&label[pos..]) {
            return Some(n);
        }
    }

    NUMBER_RE
        .captures(label)
        .and_then(|c| c[1].parse::<i64>().ok())
        .or_else(|| ordinal(label))
}
