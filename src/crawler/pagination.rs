//! Paginated listing traversal
//!
//! Page 1 is the listing URL itself and advertises the total page count;
//! pages 2..N are requested with `?page=n`. Links are yielded lazily, in page
//! order, each URL at most once.

use crate::crawler::fetcher::FetchClient;
use crate::parser::{ChildLink, PageParser};
use crate::url::page_url;
use crate::{HarvestError, Result};
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Walks every page of one listing
pub struct PaginationWalker<'a> {
    fetcher: &'a FetchClient,
    parser: &'a dyn PageParser,
    max_pages: u32,
}

struct WalkState {
    listing: Url,
    next_page: u32,
    /// Known after page 1 is parsed
    last_page: u32,
    seen: HashSet<String>,
    ready: VecDeque<ChildLink>,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(fetcher: &'a FetchClient, parser: &'a dyn PageParser, max_pages: u32) -> Self {
        Self {
            fetcher,
            parser,
            max_pages: max_pages.max(1),
        }
    }

    /// Lazily yields the deduplicated child links of `listing`
    ///
    /// Pages are fetched only as the stream is polled. Each call starts a
    /// fresh walk from page 1.
    pub fn stream(&self, listing: Url) -> impl Stream<Item = Result<ChildLink>> + 'a {
        let fetcher = self.fetcher;
        let parser = self.parser;
        let max_pages = self.max_pages;

        let state = WalkState {
            listing,
            next_page: 1,
            last_page: 1,
            seen: HashSet::new(),
            ready: VecDeque::new(),
        };

        stream::try_unfold(state, move |mut state| async move {
            loop {
                if let Some(link) = state.ready.pop_front() {
                    return Ok::<_, HarvestError>(Some((link, state)));
                }
                if state.next_page > state.last_page {
                    return Ok(None);
                }

                let page = state.next_page;
                let url = page_url(&state.listing, page);
                let html = fetcher.get(&url).await?;

                if page == 1 {
                    let advertised = parser.parse_listing_pagination(&html);
                    if advertised > max_pages {
                        tracing::warn!(
                            listing = %state.listing,
                            advertised,
                            max_pages,
                            "Listing exceeds page cap, truncating"
                        );
                    }
                    state.last_page = advertised.clamp(1, max_pages);
                }

                let links = parser.parse_listing_links(&html, &url);
                tracing::debug!(url = %url, page, links = links.len(), "Listing page parsed");

                for link in links {
                    if state.seen.insert(link.url.clone()) {
                        state.ready.push_back(link);
                    }
                }
                state.next_page += 1;
            }
        })
    }

    /// Collects the whole listing
    pub async fn walk(&self, listing: &Url) -> Result<Vec<ChildLink>> {
        self.stream(listing.clone()).try_collect().await
    }
}
