//! URL handling module for Reel-Harvest
//!
//! The catalog site derives every secondary page from the page above it:
//! watch pages and episode listings hang off fixed path suffixes, and listing
//! pages are selected with a `page` query parameter.

use crate::{HarvestError, Result};
use url::Url;

/// Parses a URL that the fetch client is allowed to request
///
/// Malformed URLs and non-HTTP schemes are permanent failures.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| HarvestError::PermanentFetch {
        url: raw.to_string(),
        status: None,
        reason: format!("malformed URL: {}", e),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(HarvestError::PermanentFetch {
            url: raw.to_string(),
            status: None,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(url)
}

/// Resolves an `href` against the page it was found on
///
/// Returns None for empty hrefs, script/mail links, and anything that does
/// not resolve to http(s). The fragment is dropped.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);

    Some(url.to_string())
}

/// URL of page `page` of a listing
///
/// Page 1 is the listing URL itself; later pages carry `page=n`, replacing
/// any `page` parameter already present.
pub fn page_url(listing: &Url, page: u32) -> Url {
    if page <= 1 {
        return listing.clone();
    }

    let retained: Vec<(String, String)> = listing
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = listing.clone();
    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &retained {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("page", &page.to_string());
    }
    url
}

fn with_suffix(base: &str, suffix: &str) -> Result<Url> {
    let url = parse_http_url(base)?;
    let mut path = url.path().trim_end_matches('/').to_string();
    path.push('/');
    path.push_str(suffix);
    path.push('/');

    let mut derived = url;
    derived.set_query(None);
    derived.set_fragment(None);
    derived.set_path(&path);
    Ok(derived)
}

/// Episode listing of a season page (`{season}/list/`)
pub fn list_url(season_url: &str) -> Result<Url> {
    with_suffix(season_url, "list")
}

/// Player page of a movie or episode (`{page}/watch/`)
pub fn watch_url(page_url: &str) -> Result<Url> {
    with_suffix(page_url, "watch")
}

/// Resolves a configured endpoint against the origin of `page`
///
/// Absolute endpoints are used as-is.
pub fn origin_endpoint(page: &Url, endpoint: &str) -> Result<Url> {
    Ok(page.join(endpoint)?)
}
