//! Default parser for the catalog site layout
//!
//! Detail pages carry the title in `h1.post-title`, the poster under
//! `div.image`, and a metadata list in `ul.RightTaxContent`. Series list their
//! seasons as `div.Small--Box.Season` boxes, episode listings live under
//! `.allepcont`, and watch pages expose either a server list with the id the
//! server endpoint expects or the embeds themselves.

use crate::parser::{
    translate_key, ChildLink, DetailPage, PageParser, SeasonLink, ServerLink, WatchPage,
};
use crate::url::resolve_link;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h1.post-title"));
static POSTER: LazyLock<Selector> = LazyLock::new(|| selector("div.image img"));
static SYNOPSIS: LazyLock<Selector> = LazyLock::new(|| selector("div.story p"));
static RATING: LazyLock<Selector> = LazyLock::new(|| selector(".UnderPoster .imdbR span"));
static TAX_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("ul.RightTaxContent li"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static ANCHOR_HREF: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));
static TRAILER: LazyLock<Selector> =
    LazyLock::new(|| selector(".Trailer--Box iframe[src], .trailer iframe[src]"));
static SEASON_BOXES: LazyLock<Selector> = LazyLock::new(|| selector("div.Small--Box.Season"));
static EPNUM: LazyLock<Selector> = LazyLock::new(|| selector(".epnum"));
static EM: LazyLock<Selector> = LazyLock::new(|| selector("em"));
static H2: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static SEASON_POSTER: LazyLock<Selector> =
    LazyLock::new(|| selector(".MainSingle .left .image img"));
static EPISODE_ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector(".allepcont .row > a"));
static PAGINATION: LazyLock<Selector> =
    LazyLock::new(|| selector(".pagination a, .paginate a, .page-numbers"));
static SERVER_ITEM_ID: LazyLock<Selector> =
    LazyLock::new(|| selector(".watch--servers--list li.server--item[data-id]"));
static SERVER_ITEM_EMBED: LazyLock<Selector> =
    LazyLock::new(|| selector(".watch--servers--list li.server--item[data-embed]"));
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script"));
static IFRAME: LazyLock<Selector> = LazyLock::new(|| selector("iframe[src]"));

static TITLE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:فيلم|انمي|مسلسل|anime|film|movie|series)\s+").expect("valid regex")
});
static TITLE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:مترجم|اون\s*لاين|اونلاين|online|مترجمة|مدبلج|مدبلجة)(?:\s+|$)")
        .expect("valid regex")
});
static PAGE_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[?&]page=|/page/)(\d+)").expect("valid regex"));
static EPISODE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""id"\s*:\s*"(\d+)""#).expect("valid regex"));

/// `الموسم` as it appears in percent-encoded hrefs
const SEASON_WORD: &str = "الموسم";
const SEASON_WORD_ENCODED: &str = "%d8%a7%d9%84%d9%85%d9%88%d8%b3%d9%85";
const EPISODE_WORD: &str = "الحلقة";

/// Trailing characters stripped from cleaned titles
const TITLE_TRIM: &[char] = &[' ', '-', '–', '—', '|', ':', '،', '؛'];

/// Parser for the catalog site the seed lists come from
#[derive(Debug, Clone, Default)]
pub struct SiteParser;

impl SiteParser {
    pub fn new() -> Self {
        Self
    }
}

/// Element text with whitespace collapsed
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Image URL, falling back to the lazy-load attribute
fn image_url(element: ElementRef<'_>, base: &Url) -> Option<String> {
    ["src", "data-src"]
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .find_map(|value| resolve_link(base, value))
}

/// Strips kind words and "subtitled/online" suffixes from a page title
pub(crate) fn clean_title(raw: &str) -> String {
    let mut cleaned = TITLE_PREFIX_RE.replace(raw, "").into_owned();

    loop {
        let next = TITLE_SUFFIX_RE.replace_all(&cleaned, " ").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(TITLE_TRIM)
        .to_string()
}

fn parse_metadata(document: &Html) -> std::collections::BTreeMap<String, Vec<String>> {
    let mut metadata = std::collections::BTreeMap::<String, Vec<String>>::new();

    for row in document.select(&TAX_ROWS) {
        let Some(key) = row
            .select(&SPAN)
            .next()
            .and_then(|span| translate_key(&text_of(span)))
        else {
            continue;
        };

        let mut values: Vec<String> = row
            .select(&ANCHOR)
            .map(text_of)
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            values.extend(row.select(&STRONG).next().map(text_of).filter(|v| !v.is_empty()));
        }

        let entry = metadata.entry(key.to_string()).or_default();
        for value in values {
            if !entry.contains(&value) {
                entry.push(value);
            }
        }
    }

    metadata.retain(|_, values| !values.is_empty());
    metadata
}

impl SiteParser {
    fn season_links(&self, document: &Html, page_url: &Url) -> Vec<SeasonLink> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for boxed in document.select(&SEASON_BOXES) {
            let Some(anchor) = boxed.select(&ANCHOR_HREF).next() else {
                continue;
            };
            let Some(url) = anchor
                .value()
                .attr("href")
                .and_then(|href| resolve_link(page_url, href))
            else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            let label = anchor
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| text_of(anchor));

            let season_number = boxed
                .select(&EPNUM)
                .next()
                .and_then(|en| self.parse_season_number(&text_of(en)))
                .or_else(|| self.parse_season_number(&label));

            links.push(SeasonLink {
                url,
                label,
                season_number,
            });
        }

        if !links.is_empty() {
            return links;
        }

        // Older layouts link seasons as plain anchors
        for anchor in document.select(&ANCHOR_HREF) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let lowered = href.to_lowercase();
            if !href.contains("/series/")
                || !(href.contains(SEASON_WORD) || lowered.contains(SEASON_WORD_ENCODED))
            {
                continue;
            }
            let Some(url) = resolve_link(page_url, href) else {
                continue;
            };
            if url == page_url.as_str() || !seen.insert(url.clone()) {
                continue;
            }

            let label = anchor
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| text_of(anchor));
            let season_number = self
                .parse_season_number(&label)
                .or_else(|| self.parse_season_number(href));

            links.push(SeasonLink {
                url,
                label,
                season_number,
            });
        }

        links
    }
}

impl PageParser for SiteParser {
    fn parse_detail(&self, html: &str, page_url: &Url) -> DetailPage {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE)
            .next()
            .map(|h1| clean_title(&text_of(h1)))
            .and_then(non_empty);

        let poster_url = document
            .select(&POSTER)
            .next()
            .and_then(|img| image_url(img, page_url));

        let synopsis = document
            .select(&SYNOPSIS)
            .next()
            .map(text_of)
            .and_then(non_empty);

        let rating = document
            .select(&RATING)
            .next()
            .map(text_of)
            .filter(|r| r.parse::<f64>().is_ok());

        let trailer_url = document
            .select(&TRAILER)
            .next()
            .and_then(|frame| frame.value().attr("src"))
            .and_then(|src| resolve_link(page_url, src));

        DetailPage {
            title,
            poster_url,
            synopsis,
            rating,
            metadata: parse_metadata(&document),
            trailer_url,
            season_links: self.season_links(&document, page_url),
        }
    }

    fn parse_listing_pagination(&self, html: &str) -> u32 {
        let document = Html::parse_document(html);

        document
            .select(&PAGINATION)
            .flat_map(|element| {
                let from_text = text_of(element).parse::<u32>().ok();
                let from_href = element
                    .value()
                    .attr("href")
                    .and_then(|href| PAGE_PARAM_RE.captures(href))
                    .and_then(|c| c[1].parse::<u32>().ok());
                [from_text, from_href]
            })
            .flatten()
            .max()
            .unwrap_or(1)
            .max(1)
    }

    fn parse_listing_links(&self, html: &str, page_url: &Url) -> Vec<ChildLink> {
        let document = Html::parse_document(html);

        let mut anchors: Vec<ElementRef<'_>> = document.select(&EPISODE_ANCHORS).collect();
        if anchors.is_empty() {
            anchors = document
                .select(&ANCHOR_HREF)
                .filter(|a| {
                    a.select(&EPNUM).next().is_some()
                        || a.value()
                            .attr("title")
                            .is_some_and(|t| t.contains(EPISODE_WORD))
                })
                .collect();
        }

        anchors
            .into_iter()
            .filter_map(|anchor| {
                let url = anchor
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(page_url, href))?;

                let title = anchor.value().attr("title").map(str::trim).unwrap_or("");
                // The number badge outranks anything the title says
                let badge = [&*EM, &*EPNUM]
                    .into_iter()
                    .filter_map(|selector| anchor.select(selector).next())
                    .map(text_of)
                    .find(|text| text.chars().any(|c| c.is_ascii_digit()))
                    .map(|text| format!("{} {}", EPISODE_WORD, text))
                    .unwrap_or_default();
                let heading = anchor.select(&H2).next().map(text_of).unwrap_or_default();

                let parts: Vec<&str> = [badge.as_str(), title, heading.as_str()]
                    .into_iter()
                    .filter(|p| !p.is_empty())
                    .collect();
                let label = if parts.is_empty() {
                    text_of(anchor)
                } else {
                    parts.join(" | ")
                };

                Some(ChildLink { url, label })
            })
            .collect()
    }

    fn parse_season_poster(&self, html: &str, page_url: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(&SEASON_POSTER)
            .next()
            .and_then(|img| image_url(img, page_url))
    }

    fn parse_watch_page(&self, html: &str, page_url: &Url) -> WatchPage {
        let document = Html::parse_document(html);

        let episode_id = document
            .select(&SERVER_ITEM_ID)
            .filter_map(|li| li.value().attr("data-id"))
            .map(str::trim)
            .find(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| {
                document.select(&SCRIPT).find_map(|script| {
                    let body = script.text().collect::<String>();
                    EPISODE_ID_RE.captures(&body).map(|c| c[1].to_string())
                })
            });

        let candidates: Vec<(usize, Option<u32>, String)> = document
            .select(&SERVER_ITEM_EMBED)
            .enumerate()
            .filter_map(|(index, li)| {
                let embed_url = li
                    .value()
                    .attr("data-embed")
                    .and_then(|src| resolve_link(page_url, src))?;
                let explicit = li
                    .value()
                    .attr("data-server")
                    .and_then(|n| n.trim().parse::<u32>().ok());
                Some((index, explicit, embed_url))
            })
            .collect();

        let embeds = number_embeds(candidates);

        WatchPage { episode_id, embeds }
    }

    fn parse_embed_frame(&self, html: &str, page_url: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(&IFRAME)
            .filter_map(|frame| frame.value().attr("src"))
            .find_map(|src| resolve_link(page_url, src))
    }
}

/// Assigns unique server numbers to inline embeds
///
/// An explicit `data-server` keeps its number, first entry wins. Unnumbered
/// entries take their list index, or the next number nobody claimed.
fn number_embeds(candidates: Vec<(usize, Option<u32>, String)>) -> Vec<ServerLink> {
    let mut taken: HashSet<u32> = candidates.iter().filter_map(|(_, n, _)| *n).collect();
    let mut seen = HashSet::new();
    let mut embeds = Vec::with_capacity(candidates.len());

    for (index, explicit, embed_url) in candidates {
        let server_number = match explicit {
            Some(n) => {
                if !seen.insert(n) {
                    tracing::debug!(server = n, url = %embed_url, "Dropping duplicate server number");
                    continue;
                }
                n
            }
            None => {
                let mut n = index as u32;
                while taken.contains(&n) {
                    n += 1;
                }
                taken.insert(n);
                n
            }
        };
        embeds.push(ServerLink {
            server_number,
            embed_url,
        });
    }

    embeds
}
