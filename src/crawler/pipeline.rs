//! Per-item scrape pipeline
//!
//! One work item becomes one [`ShowSubtree`]:
//!
//! - movie: detail page, then its watch page, stored as season 1 / episode 1
//! - series: detail page, each season page, each season's paginated episode
//!   listing, then every retained episode's watch page
//!
//! Servers come from the watch page's inline embeds, or from the ajax server
//! endpoint when the page only exposes an episode id. Any failed season or
//! episode fetch fails the whole item; a failed trailer lookup does not.

use crate::config::{CrawlerConfig, SiteConfig};
use crate::crawler::fetcher::FetchClient;
use crate::crawler::pagination::PaginationWalker;
use crate::crawler::scheduler::ItemScraper;
use crate::parser::{ChildLink, DetailPage, PageParser, SeasonLink};
use crate::state::MediaKind;
use crate::storage::{EpisodeRecord, SeasonRecord, ServerRecord, ShowSubtree, WorkItem};
use crate::url::{list_url, origin_endpoint, parse_http_url, watch_url};
use crate::{ErrorClass, HarvestError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// A season to traverse, after deduplication
struct SeasonTarget {
    number: i64,
    url: String,
}

/// Fetches and assembles complete show subtrees
pub struct ItemPipeline {
    fetcher: FetchClient,
    parser: Arc<dyn PageParser>,
    crawler: CrawlerConfig,
    site: SiteConfig,
}

impl ItemPipeline {
    pub fn new(
        fetcher: FetchClient,
        parser: Arc<dyn PageParser>,
        crawler: CrawlerConfig,
        site: SiteConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            crawler,
            site,
        }
    }

    /// Scrapes `url` as a show of the given kind
    pub async fn scrape_url(&self, url: &str, kind: MediaKind) -> Result<ShowSubtree> {
        let page = parse_http_url(url)?;
        let (detail, html) = self.fetch_detail(&page).await?;

        let mut subtree = match kind {
            MediaKind::Movie => self.scrape_movie(url, &page, detail).await?,
            MediaKind::Series => self.scrape_series(url, &page, detail, &html).await?,
        };

        subtree
            .validate()
            .map_err(|e| HarvestError::parse(url, e.to_string()))?;
        subtree.sort();
        Ok(subtree)
    }

    async fn fetch_detail(&self, page: &Url) -> Result<(DetailPage, String)> {
        let html = self.fetcher.get(page).await?;
        let detail = self.parser.parse_detail(&html, page);
        if detail.title.is_none() {
            return Err(HarvestError::parse(page.as_str(), "detail page has no title"));
        }
        Ok((detail, html))
    }

    fn new_subtree(&self, url: &str, kind: MediaKind, detail: DetailPage) -> ShowSubtree {
        ShowSubtree {
            source_url: url.to_string(),
            title: detail.title.unwrap_or_default(),
            kind,
            rating: detail.rating,
            poster_url: detail.poster_url,
            synopsis: detail.synopsis,
            trailer_url: detail.trailer_url,
            metadata: detail.metadata,
            seasons: Vec::new(),
        }
    }

    async fn scrape_movie(&self, url: &str, page: &Url, detail: DetailPage) -> Result<ShowSubtree> {
        let servers = self.episode_servers(page.as_str()).await?;

        let mut subtree = self.new_subtree(url, MediaKind::Movie, detail);
        if subtree.trailer_url.is_none() {
            subtree.trailer_url = self.fetch_trailer(page, page.as_str()).await;
        }
        subtree.seasons.push(SeasonRecord {
            season_number: 1,
            poster_url: None,
            episodes: vec![EpisodeRecord {
                episode_number: 1.0,
                servers,
            }],
        });
        Ok(subtree)
    }

    async fn scrape_series(
        &self,
        url: &str,
        page: &Url,
        detail: DetailPage,
        detail_html: &str,
    ) -> Result<ShowSubtree> {
        let targets = season_targets(&detail.season_links, page);
        tracing::debug!(url, seasons = targets.len(), "Season links resolved");

        let mut subtree = self.new_subtree(url, MediaKind::Series, detail);
        // Seasons are visited in ascending order
        let mut first_episode: Option<String> = None;

        for target in targets {
            let season_page = parse_http_url(&target.url)?;
            let poster_url = if season_page == *page {
                self.parser
                    .parse_season_poster(detail_html, page)
                    .or_else(|| subtree.poster_url.clone())
            } else {
                let html = self.fetcher.get(&season_page).await?;
                self.parser.parse_season_poster(&html, &season_page)
            };

            let links = self.season_episodes(&target.url).await?;
            tracing::debug!(url, season = target.number, episodes = links.len(), "Episode listing walked");

            if first_episode.is_none() {
                first_episode = links
                    .iter()
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .map(|(_, link)| link.url.clone());
            }

            let episodes: Vec<EpisodeRecord> = stream::iter(links)
                .map(|(number, link)| async move {
                    let servers = self.episode_servers(&link.url).await?;
                    Ok::<_, HarvestError>(EpisodeRecord {
                        episode_number: number,
                        servers,
                    })
                })
                .buffered(self.crawler.episode_workers.max(1))
                .try_collect()
                .await?;

            subtree.seasons.push(SeasonRecord {
                season_number: target.number,
                poster_url,
                episodes,
            });
        }

        if subtree.trailer_url.is_none() {
            if let Some(episode_url) = &first_episode {
                subtree.trailer_url = self.fetch_trailer(page, episode_url).await;
            }
        }

        Ok(subtree)
    }

    /// Numbered episode links of one season, first-seen number wins
    async fn season_episodes(&self, season_url: &str) -> Result<Vec<(f64, ChildLink)>> {
        let listing = list_url(season_url)?;
        let walker = PaginationWalker::new(
            &self.fetcher,
            self.parser.as_ref(),
            self.crawler.max_listing_pages,
        );
        let links = walker.walk(&listing).await?;

        let mut seen = HashSet::new();
        let mut episodes = Vec::new();
        for link in links {
            let Some(number) = self.parser.parse_episode_number(&link.label).value() else {
                tracing::trace!(label = %link.label, "Skipping unnumbered episode");
                continue;
            };
            if !seen.insert(number.to_bits()) {
                tracing::debug!(url = %link.url, episode = number, "Dropping duplicate episode");
                continue;
            }
            episodes.push((number, link));
        }

        Ok(episodes)
    }

    /// Servers of a movie or episode page
    async fn episode_servers(&self, page_url: &str) -> Result<Vec<ServerRecord>> {
        let watch = watch_url(page_url)?;
        let html = self.fetcher.get(&watch).await?;
        let page = self.parser.parse_watch_page(&html, &watch);

        if !page.embeds.is_empty() {
            return Ok(page
                .embeds
                .into_iter()
                .map(|link| ServerRecord {
                    server_number: link.server_number,
                    embed_url: link.embed_url,
                })
                .collect());
        }

        match (page.episode_id, &self.site.server_endpoint) {
            (Some(id), Some(endpoint)) => {
                let endpoint = origin_endpoint(&watch, endpoint)?;
                self.ajax_servers(&endpoint, &id, &watch).await
            }
            _ => {
                tracing::debug!(url = %watch, "Watch page exposes no servers");
                Ok(Vec::new())
            }
        }
    }

    /// Probes every server slot of the ajax endpoint
    ///
    /// Empty slots and slots answering with a permanent error are absent.
    async fn ajax_servers(&self, endpoint: &Url, id: &str, watch: &Url) -> Result<Vec<ServerRecord>> {
        let slots: Vec<Option<ServerRecord>> = stream::iter(0..self.site.server_slots)
            .map(|slot| async move {
                let index = slot.to_string();
                let form = [("id", id), ("i", index.as_str())];
                match self.fetcher.post_form(endpoint, &form, watch).await {
                    Ok(body) => Ok(self
                        .parser
                        .parse_embed_frame(&body, endpoint)
                        .map(|embed_url| ServerRecord {
                            server_number: slot,
                            embed_url,
                        })),
                    Err(e) if e.class() == ErrorClass::Permanent => {
                        tracing::debug!(slot, error = %e, "Server slot unavailable");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffered(self.crawler.server_workers.max(1))
            .try_collect()
            .await?;

        Ok(slots.into_iter().flatten().collect())
    }

    /// Trailer embed from the trailer endpoint; failures are logged and ignored
    async fn fetch_trailer(&self, page: &Url, form_url: &str) -> Option<String> {
        let endpoint = self.site.trailer_endpoint.as_deref()?;

        let result = async {
            let endpoint = origin_endpoint(page, endpoint)?;
            let body = self
                .fetcher
                .post_form(&endpoint, &[("href", form_url)], page)
                .await?;
            Ok::<_, HarvestError>(self.parser.parse_embed_frame(&body, &endpoint))
        }
        .await;

        match result {
            Ok(trailer) => trailer,
            Err(e) => {
                tracing::warn!(url = %page, error = %e, "Trailer lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ItemScraper for ItemPipeline {
    async fn scrape(&self, item: &WorkItem) -> Result<ShowSubtree> {
        self.scrape_url(&item.url, item.kind).await
    }
}

/// Seasons to traverse, deduplicated by number with the first link winning
///
/// Unnumbered links count as season 1. Without any links the series page is
/// its own single season.
fn season_targets(links: &[SeasonLink], page: &Url) -> Vec<SeasonTarget> {
    let mut seen = HashSet::new();
    let mut targets: Vec<SeasonTarget> = links
        .iter()
        .filter_map(|link| {
            let number = link.season_number.unwrap_or(1);
            seen.insert(number).then(|| SeasonTarget {
                number,
                url: link.url.clone(),
            })
        })
        .collect();

    if targets.is_empty() {
        targets.push(SeasonTarget {
            number: 1,
            url: page.to_string(),
        });
    }

    targets.sort_by_key(|t| t.number);
    targets
}
