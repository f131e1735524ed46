//! Seed list loading
//!
//! Seed files hold JSON, either a bare array of URLs or an object with a
//! `urls` array. Files and inline lists are merged, movies first.

use crate::config::types::SeedsConfig;
use crate::state::MediaKind;
use crate::storage::SeedItem;
use crate::{HarvestError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Bare(Vec<String>),
    Wrapped { urls: Vec<String> },
}

/// Reads one seed file
///
/// A missing file yields an empty list with a warning. Unreadable or
/// malformed files are errors.
pub fn load_seed_file(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        tracing::warn!("Seed file {} not found, skipping", path.display());
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed: SeedFile = serde_json::from_str(&content)
        .map_err(|e| HarvestError::Seed(format!("{}: {}", path.display(), e)))?;

    Ok(match parsed {
        SeedFile::Bare(urls) => urls,
        SeedFile::Wrapped { urls } => urls,
    })
}

impl SeedsConfig {
    /// Collects every configured seed, trimmed and deduplicated
    ///
    /// A URL listed as both movie and series keeps its first kind.
    pub fn collect(&self) -> Result<Vec<SeedItem>> {
        let mut movies = Vec::new();
        if let Some(path) = &self.movies_file {
            movies.extend(load_seed_file(path)?);
        }
        movies.extend(self.movies.iter().cloned());

        let mut series = Vec::new();
        if let Some(path) = &self.series_file {
            series.extend(load_seed_file(path)?);
        }
        series.extend(self.series.iter().cloned());

        let mut seen = HashSet::new();
        let items = movies
            .into_iter()
            .map(|url| (url, MediaKind::Movie))
            .chain(series.into_iter().map(|url| (url, MediaKind::Series)))
            .filter_map(|(url, kind)| {
                let url = url.trim().to_string();
                if url.is_empty() || !seen.insert(url.clone()) {
                    return None;
                }
                Some(SeedItem { url, kind })
            })
            .collect();

        Ok(items)
    }
}
