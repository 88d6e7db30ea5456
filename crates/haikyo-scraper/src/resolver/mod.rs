//! Coordinate resolution.
//!
//! Tries extraction strategies in priority order (embedded script data, map
//! widget attributes, labelled table rows, map-service URLs, free text, and
//! finally related blog posts) and returns the first coordinate that passes
//! validation. A later strategy never overrides an earlier hit.
//!
//! Strategies 1–5 are synchronous functions over a parsed scope. Parsed
//! documents are not `Send`, so they are confined to sync helpers and
//! dropped before any `.await`.

mod embedded;
mod free_text;
mod linked;
mod map_embed;
mod map_url;
mod table;

use std::sync::Arc;

use haikyo_core::{Coordinate, CoordinateSource};
use scraper::{ElementRef, Html};

use crate::fetch::FetchCache;

pub use free_text::{dms_to_decimal, parse_dms, Hemisphere};
pub use linked::name_fragment;
pub use map_url::coordinate_from_map_url;

pub(crate) use linked::candidate_links;

/// A validated coordinate and the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub coordinate: Coordinate,
    pub source: CoordinateSource,
}

/// Runs strategies 1–5 over `scope`; first valid hit wins.
#[must_use]
pub fn resolve_scope(scope: ElementRef<'_>) -> Option<Resolution> {
    let strategies: [(CoordinateSource, fn(ElementRef<'_>) -> Option<Coordinate>); 5] = [
        (CoordinateSource::EmbeddedJson, embedded::find),
        (CoordinateSource::MapEmbed, map_embed::find),
        (CoordinateSource::TableRow, table::find),
        (CoordinateSource::MapUrl, map_url::find),
        (CoordinateSource::FreeText, free_text::find),
    ];

    strategies.iter().find_map(|(source, strategy)| {
        strategy(scope).map(|coordinate| Resolution {
            coordinate,
            source: *source,
        })
    })
}

/// Strategies 1–5 over a whole document.
#[must_use]
pub fn resolve_document(document: &Html) -> Option<Resolution> {
    resolve_scope(document.root_element())
}

/// Linked-post traversal over the job's shared [`FetchCache`].
///
/// Strategies 1–5 run synchronously via [`resolve_document`]; this type
/// owns the network-bound last step.
pub struct CoordinateResolver {
    fetcher: Arc<FetchCache>,
    max_linked_posts: usize,
}

impl CoordinateResolver {
    #[must_use]
    pub fn new(fetcher: Arc<FetchCache>, max_linked_posts: usize) -> Self {
        Self {
            fetcher,
            max_linked_posts,
        }
    }

    /// Related-post links on `document` not yet fetched this session.
    pub(crate) fn linked_post_links(&self, document: &Html, page_url: &str) -> Vec<String> {
        candidate_links(document, page_url, self.max_linked_posts, |url| {
            self.fetcher.has_seen(url)
        })
    }

    /// Strategy 6: fetch each link in turn and search the first region that
    /// mentions the location's name. Stops at the first hit.
    ///
    /// Returns `None` when no linked page yields a valid coordinate; that is
    /// a normal outcome, not an error.
    pub async fn resolve_linked(&self, links: &[String], context_name: &str) -> Option<Resolution> {
        let fragment = name_fragment(context_name);
        if fragment.is_empty() {
            return None;
        }

        for link in links.iter().take(self.max_linked_posts) {
            let body = match self.fetcher.fetch(link).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(url = %link, error = %err, "linked post unavailable");
                    continue;
                }
            };
            if let Some(coordinate) = search_linked_page(&body, &fragment) {
                tracing::debug!(url = %link, strategy = "linked_post", "coordinate found in linked post");
                return Some(Resolution {
                    coordinate,
                    source: CoordinateSource::LinkedPost,
                });
            }
        }
        None
    }
}

fn search_linked_page(html: &str, fragment: &str) -> Option<Coordinate> {
    let document = Html::parse_document(html);
    let region = linked::matching_region(&document, fragment)?;
    resolve_scope(region).map(|r| r.coordinate)
}
