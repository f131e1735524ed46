//! Page parsing: HTML in, structured records out
//!
//! The crawler never looks at markup itself. Everything it needs from a page
//! goes through [`PageParser`], so a different site layout is a different
//! implementation of that trait.
//!
//! # Components
//!
//! - `SiteParser`: the default implementation, built on `scraper` selectors
//! - `parse_episode_number` / `parse_season_number`: label readers shared by parsers
//! - `translate_key`: the fixed metadata key table

mod episode;
mod metadata;
mod site;

pub use episode::{parse_episode_number, parse_season_number, EpisodeNumber};
pub use metadata::translate_key;
pub use site::SiteParser;

use std::collections::BTreeMap;
use url::Url;

/// Show-level fields of a movie or series detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPage {
    /// Cleaned title; None when the page has no title element
    pub title: Option<String>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub rating: Option<String>,
    /// Translated metadata key -> values in page order
    pub metadata: BTreeMap<String, Vec<String>>,
    /// Trailer iframe embedded in the page itself
    pub trailer_url: Option<String>,
    /// Season links in page order; empty for movies and single-season series
    pub season_links: Vec<SeasonLink>,
}

/// A link from a series page to one of its seasons
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonLink {
    pub url: String,
    pub label: String,
    /// None when neither the label nor the URL carries a number
    pub season_number: Option<i64>,
}

/// One entry of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildLink {
    pub url: String,
    /// Text the episode number is read from
    pub label: String,
}

/// What a watch page offers for locating servers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchPage {
    /// Id the server endpoint expects
    pub episode_id: Option<String>,
    /// Servers embedded directly in the page
    pub embeds: Vec<ServerLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLink {
    pub server_number: u32,
    pub embed_url: String,
}

/// HTML -> structured record conversions used by the crawl pipeline
///
/// Implementations are pure functions of their input and must not block.
pub trait PageParser: Send + Sync {
    /// Show-level fields and season links of a detail page
    fn parse_detail(&self, html: &str, page_url: &Url) -> DetailPage;

    /// Total page count advertised by a listing's pagination control (>= 1)
    fn parse_listing_pagination(&self, html: &str) -> u32;

    /// Child links of one listing page, in page order
    fn parse_listing_links(&self, html: &str, page_url: &Url) -> Vec<ChildLink>;

    /// Episode number of a listing link label
    fn parse_episode_number(&self, label: &str) -> EpisodeNumber {
        parse_episode_number(label)
    }

    /// Season number of a season link label
    fn parse_season_number(&self, label: &str) -> Option<i64> {
        parse_season_number(label)
    }

    /// Poster of a season page
    fn parse_season_poster(&self, html: &str, page_url: &Url) -> Option<String>;

    /// Server id and inline embeds of a watch page
    fn parse_watch_page(&self, html: &str, page_url: &Url) -> WatchPage;

    /// The iframe source in a server or trailer endpoint response
    fn parse_embed_frame(&self, html: &str, page_url: &Url) -> Option<String>;
}
