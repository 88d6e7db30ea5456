//! Single-page extraction: fetch, parse, resolve, geocode, assemble.

use std::sync::{Arc, LazyLock};

use haikyo_core::{truncate_with_marker, Location, UNKNOWN_NAME};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::fetch::FetchCache;
use crate::geocode::AddressGeocoder;
use crate::identity::location_id;
use crate::resolver::{resolve_document, CoordinateResolver, Resolution};

/// Appended by the site to every page title.
const SITE_TITLE_SUFFIX: &str = " - 廃墟検索地図";
const NAME_SEPARATOR: char = 'は';

const DESCRIPTION_CANDIDATES: [&str; 5] = [".spot_descr", ".spot_body", ".body", ".content", "#main"];
const ADDRESS_LABELS: [&str; 2] = ["住所", "Address"];
const HERO_CLASS_MARKERS: [&str; 3] = ["main", "header", "hero"];
const SKIPPED_IMAGE_EXTENSIONS: [&str; 3] = [".gif", ".svg", ".ico"];
const SKIPPED_IMAGE_MARKERS: [&str; 2] = ["icon", "logo"];

static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid selector"));
static OG_TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static SPOT_ADDRESS_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".spot_address").expect("valid selector"));
static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static HEADER_CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));
static DATA_CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("valid selector"));
static DESCRIPTION_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    DESCRIPTION_CANDIDATES
        .iter()
        .map(|css| Selector::parse(css).expect("valid selector"))
        .collect()
});

/// Everything taken from one parsed page before any further network calls.
#[derive(Debug, Clone, Default)]
pub struct PageDetails {
    pub name: String,
    pub address: Option<String>,
    pub description: String,
    pub images: Vec<String>,
    pub resolution: Option<Resolution>,
    pub linked_posts: Vec<String>,
}

pub struct LocationExtractor {
    fetcher: Arc<FetchCache>,
    resolver: CoordinateResolver,
    geocoder: Arc<AddressGeocoder>,
    description_max_chars: usize,
}

impl LocationExtractor {
    #[must_use]
    pub fn new(
        fetcher: Arc<FetchCache>,
        geocoder: Arc<AddressGeocoder>,
        max_linked_posts: usize,
        description_max_chars: usize,
    ) -> Self {
        Self {
            resolver: CoordinateResolver::new(Arc::clone(&fetcher), max_linked_posts),
            fetcher,
            geocoder,
            description_max_chars,
        }
    }

    #[must_use]
    pub fn fetcher(&self) -> &Arc<FetchCache> {
        &self.fetcher
    }

    /// Extracts one location from the page at `url`.
    ///
    /// Never fails: an unreachable page yields a record with empty fields and
    /// the fetch-error marker in `description`.
    pub async fn extract(&self, url: &str) -> Location {
        let id = location_id(url);

        let html = match self.fetcher.fetch(url).await {
            Ok(html) => html,
            Err(err) => {
                if err.is_skip() {
                    tracing::debug!(url, error = %err, "location page skipped");
                } else {
                    tracing::warn!(url, error = %err, "location page unavailable");
                }
                return Location::fetch_failed(id, url, &err.to_string());
            }
        };

        let page = self.parse_page(&html, url);
        let mut location = Location::new(id, url);
        location.name = page.name;
        location.address = page.address;
        location.description = page.description;
        location.images = page.images;

        let resolution = match page.resolution {
            Some(resolution) => Some(resolution),
            None => self.resolver.resolve_linked(&page.linked_posts, &location.name).await,
        };

        if let Some(resolution) = resolution {
            tracing::debug!(
                url,
                strategy = %resolution.source,
                coordinate = %resolution.coordinate,
                "coordinate resolved from page"
            );
            location.set_coordinate(resolution.coordinate, resolution.source);
        } else if let Some(address) = location.address.as_deref() {
            let outcome = self.geocoder.geocode(&location.name, Some(address)).await;
            tracing::debug!(url, strategy = %outcome.source(), "coordinate from geocoding");
            location.set_coordinate(outcome.coordinate(), outcome.source());
        } else {
            tracing::warn!(url, "no coordinate and no address found");
        }

        location
    }

    /// Synchronous parse of `html`; the document never outlives this call.
    #[must_use]
    pub fn parse_page(&self, html: &str, url: &str) -> PageDetails {
        let document = Html::parse_document(html);
        let resolution = resolve_document(&document);
        let linked_posts = if resolution.is_none() {
            self.resolver.linked_post_links(&document, url)
        } else {
            Vec::new()
        };

        PageDetails {
            name: extract_name(&document),
            address: extract_address(&document),
            description: extract_description(&document, self.description_max_chars),
            images: extract_images(&document, url),
            resolution,
            linked_posts,
        }
    }
}

/// Heading, then `og:title`, then `<title>`; each cut at the topic marker.
#[must_use]
pub fn extract_name(document: &Html) -> String {
    let headings = document
        .select(&HEADING_SELECTOR)
        .map(|el| el.text().collect::<String>());
    let og_title = document
        .select(&OG_TITLE_SELECTOR)
        .filter_map(|el| el.value().attr("content").map(str::to_owned));
    let title = document
        .select(&TITLE_SELECTOR)
        .map(|el| el.text().collect::<String>());

    headings
        .chain(og_title)
        .chain(title)
        .map(|raw| clean_name(&raw))
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_NAME.to_owned())
}

fn clean_name(raw: &str) -> String {
    let without_suffix = raw.split(SITE_TITLE_SUFFIX).next().unwrap_or_default();
    without_suffix
        .split(NAME_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned()
}

#[must_use]
pub fn extract_address(document: &Html) -> Option<String> {
    if let Some(address) = document
        .select(&SPOT_ADDRESS_SELECTOR)
        .map(collapsed_text)
        .find(|t| !t.is_empty())
    {
        return Some(address);
    }

    document.select(&ROW_SELECTOR).find_map(|row| {
        let label = row.select(&HEADER_CELL_SELECTOR).next()?;
        let label_text = label.text().collect::<String>();
        if !ADDRESS_LABELS.iter().any(|l| label_text.contains(l)) {
            return None;
        }
        let value = row
            .select(&DATA_CELL_SELECTOR)
            .filter(|cell| cell.id() != label.id())
            .map(collapsed_text)
            .find(|t| !t.is_empty())?;
        Some(value)
    })
}

#[must_use]
pub fn extract_description(document: &Html, max_chars: usize) -> String {
    DESCRIPTION_SELECTORS
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .map(collapsed_text)
        .find(|t| !t.is_empty())
        .map(|text| truncate_with_marker(&text, max_chars))
        .unwrap_or_default()
}

/// Hero images first, then the remaining raster images in document order.
#[must_use]
pub fn extract_images(document: &Html, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let (hero, rest): (Vec<ElementRef<'_>>, Vec<ElementRef<'_>>) =
        document.select(&IMG_SELECTOR).partition(|img| is_hero(*img));

    let mut images: Vec<String> = Vec::new();
    for img in hero.into_iter().chain(rest) {
        let value = img.value();
        let Some(src) = value.attr("src").or_else(|| value.attr("data-src")) else {
            continue;
        };
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let Ok(absolute) = base.join(src) else {
            continue;
        };
        if !is_content_image(&absolute) {
            continue;
        }
        let absolute = absolute.to_string();
        if !images.contains(&absolute) {
            images.push(absolute);
        }
    }
    images
}

fn is_hero(img: ElementRef<'_>) -> bool {
    img.value()
        .attr("class")
        .is_some_and(|class| HERO_CLASS_MARKERS.iter().any(|m| class.contains(m)))
}

fn is_content_image(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    if SKIPPED_IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    let full = url.as_str().to_ascii_lowercase();
    !SKIPPED_IMAGE_MARKERS.iter().any(|m| full.contains(m))
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
