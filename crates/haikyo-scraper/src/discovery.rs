//! Job target discovery: turns a search term or listing page into the
//! ordered list of detail-page URLs a job will extract.

use std::sync::LazyLock;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Url;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::JobAbortError;
use crate::fetch::FetchCache;
use crate::identity::{is_detail_url, location_id};

const PREFECTURE_SUFFIXES: [char; 4] = ['都', '道', '府', '県'];
const MUNICIPALITY_SUFFIXES: [char; 4] = ['市', '町', '村', '区'];
const NEXT_LINK_TEXTS: [&str; 2] = ["次へ", "next"];

/// Listing-card anchors, most specific first.
static LISTING_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article.spot_panel a[href]", "div.list_title a[href]"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});
static ARTICLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article").expect("valid selector"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static NEXT_PAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"a[rel="next"][href], .pagination .next[href], .pagination .next a[href]"#)
        .expect("valid selector")
});

/// What a job should scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrapeTarget {
    /// Explicit detail-page URLs.
    Urls(Vec<String>),
    /// A listing or search-result page; a detail URL here is its own target.
    Listing { url: String },
    /// A free-form search term (prefecture, municipality, keyword, or URL).
    Search { term: String },
}

impl ScrapeTarget {
    /// Human-readable label used in progress messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            ScrapeTarget::Urls(urls) => format!("{} URLs", urls.len()),
            ScrapeTarget::Listing { url } => url.clone(),
            ScrapeTarget::Search { term } => format!("'{term}'"),
        }
    }
}

/// One discovered target as shown to a caller choosing `selectedIds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredTarget {
    /// Zero-based position; the value to pass back in `selectedIds`.
    pub index: usize,
    pub id: String,
    pub url: String,
}

/// Numbers `urls` in discovery order.
#[must_use]
pub fn index_targets(urls: Vec<String>) -> Vec<DiscoveredTarget> {
    urls.into_iter()
        .enumerate()
        .map(|(index, url)| DiscoveredTarget {
            index,
            id: location_id(&url),
            url,
        })
        .collect()
}

/// Maps a search term to the listing URL that answers it.
///
/// A term ending in 都/道/府/県 goes to the prefecture listing, one ending in
/// 市/町/村/区 to the address listing, an `http` term is used as-is, and
/// anything else becomes a keyword search.
#[must_use]
pub fn search_url(base: &Url, term: &str) -> String {
    let term = term.trim();
    if term.starts_with("http") {
        return term.to_owned();
    }

    let relative = match term.chars().last() {
        Some(c) if PREFECTURE_SUFFIXES.contains(&c) => {
            format!("explorer/list/prefecture/{term}/")
        }
        Some(c) if MUNICIPALITY_SUFFIXES.contains(&c) => format!("explorer/list/address/{term}/"),
        _ => format!(
            "search.php?sw={}",
            utf8_percent_encode(term, NON_ALPHANUMERIC)
        ),
    };
    base.join(&relative)
        .map_or_else(|_| format!("{base}{relative}"), |u| u.to_string())
}

/// Detail links on a listing page, absolutized and deduplicated in order.
///
/// Card anchors (`spot_panel` articles, `list_title` blocks, the first anchor
/// of each `article`) are preferred; only when none exist does any anchor
/// shaped like a detail URL count.
#[must_use]
pub fn extract_location_links(document: &Html, page_url: &Url) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    for selector in LISTING_SELECTORS.iter() {
        for anchor in document.select(selector) {
            if let Some(href) = anchor.value().attr("href") {
                push_link(page_url, href, &mut links);
            }
        }
    }
    for article in document.select(&ARTICLE_SELECTOR) {
        if let Some(href) = article
            .select(&ANCHOR_SELECTOR)
            .next()
            .and_then(|a| a.value().attr("href"))
        {
            push_link(page_url, href, &mut links);
        }
    }

    if links.is_empty() {
        for anchor in document.select(&ANCHOR_SELECTOR) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if page_url.join(href).is_ok_and(|u| is_detail_url(u.as_str())) {
                push_link(page_url, href, &mut links);
            }
        }
    }
    links
}

fn push_link(page_url: &Url, href: &str, links: &mut Vec<String>) {
    if let Ok(absolute) = page_url.join(href.trim()) {
        let absolute = absolute.to_string();
        if absolute != page_url.as_str() && !links.contains(&absolute) {
            links.push(absolute);
        }
    }
}

/// The next listing page, if the page has pagination.
#[must_use]
pub fn next_page_link(document: &Html, page_url: &Url) -> Option<String> {
    let href = document
        .select(&NEXT_PAGE_SELECTOR)
        .find_map(|el| el.value().attr("href"))
        .or_else(|| {
            document
                .select(&ANCHOR_SELECTOR)
                .find(|a| {
                    let text = a.text().collect::<String>().trim().to_lowercase();
                    NEXT_LINK_TEXTS.contains(&text.as_str())
                })
                .and_then(|a| a.value().attr("href"))
        })?;
    let next = page_url.join(href).ok()?;
    (next != *page_url).then(|| next.to_string())
}

fn parse_listing(html: &str, page_url: &Url) -> (Vec<String>, Option<String>) {
    let document = Html::parse_document(html);
    (
        extract_location_links(&document, page_url),
        next_page_link(&document, page_url),
    )
}

/// Resolves `target` into at most `max_locations` detail URLs.
///
/// `selected_ids` are zero-based indices into the discovered list and are
/// applied before truncation. Listing pages are followed through pagination
/// for up to `max_locations / 5 + 1` pages; without a selection the crawl
/// stops early once `max_locations` links are known. The unselected list is
/// always a prefix of the selected crawl, so indices stay stable.
///
/// # Errors
///
/// [`JobAbortError::Discovery`] if the first listing page cannot be fetched,
/// [`JobAbortError::NoTargets`] if nothing is left to scrape.
pub async fn discover_targets(
    fetcher: &FetchCache,
    base_url: &str,
    target: &ScrapeTarget,
    max_locations: usize,
    selected_ids: &[usize],
) -> Result<Vec<String>, JobAbortError> {
    let start_url = match target {
        ScrapeTarget::Urls(urls) => {
            let mut unique: Vec<String> = Vec::new();
            for url in urls.iter().map(String::as_str).map(str::trim).filter(|u| !u.is_empty()) {
                if !unique.iter().any(|seen| seen == url) {
                    unique.push(url.to_owned());
                }
            }
            let targets = select_and_truncate(unique, selected_ids, max_locations);
            if targets.is_empty() {
                return Err(JobAbortError::NoTargets {
                    url: "(explicit list)".to_owned(),
                });
            }
            return Ok(targets);
        }
        ScrapeTarget::Listing { url } => url.trim().to_owned(),
        ScrapeTarget::Search { term } => {
            let base = Url::parse(base_url).map_err(|e| JobAbortError::Discovery {
                url: base_url.to_owned(),
                reason: e.to_string(),
            })?;
            search_url(&base, term)
        }
    };

    if is_detail_url(&start_url) {
        return Ok(vec![start_url]);
    }

    let link_cap = selected_ids.is_empty().then_some(max_locations);
    let links = crawl_listing(fetcher, &start_url, max_locations / 5 + 1, link_cap).await?;
    let targets = select_and_truncate(links, selected_ids, max_locations);
    if targets.is_empty() {
        return Err(JobAbortError::NoTargets { url: start_url });
    }
    tracing::info!(url = %start_url, count = targets.len(), "discovered targets");
    Ok(targets)
}

async fn crawl_listing(
    fetcher: &FetchCache,
    start_url: &str,
    max_pages: usize,
    link_cap: Option<usize>,
) -> Result<Vec<String>, JobAbortError> {
    let mut links: Vec<String> = Vec::new();
    let mut next = Some(start_url.to_owned());
    let mut pages = 0usize;

    while let Some(page) = next.take() {
        if pages >= max_pages || link_cap.is_some_and(|cap| links.len() >= cap) {
            break;
        }
        let page_url = Url::parse(&page).map_err(|e| JobAbortError::Discovery {
            url: page.clone(),
            reason: e.to_string(),
        })?;

        let html = match fetcher.fetch(&page).await {
            Ok(html) => html,
            Err(err) if pages == 0 => {
                return Err(JobAbortError::Discovery {
                    url: page,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                tracing::warn!(url = %page, error = %err, "listing page unavailable; stopping pagination");
                break;
            }
        };
        pages += 1;

        let (found, next_link) = parse_listing(&html, &page_url);
        tracing::debug!(url = %page, found = found.len(), "listing page parsed");
        for link in found {
            if !links.contains(&link) {
                links.push(link);
            }
        }
        next = next_link;
    }
    Ok(links)
}

fn select_and_truncate(links: Vec<String>, selected_ids: &[usize], max: usize) -> Vec<String> {
    let selected: Vec<String> = if selected_ids.is_empty() {
        links
    } else {
        links
            .into_iter()
            .enumerate()
            .filter(|(i, _)| selected_ids.contains(i))
            .map(|(_, link)| link)
            .collect()
    };
    selected.into_iter().take(max).collect()
}

#[cfg(test)]
#[path = "discovery_test.rs"]
mod tests;
