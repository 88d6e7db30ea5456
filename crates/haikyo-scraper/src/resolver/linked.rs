//! Strategy 6: related blog/article pages.

use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::identity::is_detail_url;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static REGION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article, section, div, p").expect("valid selector"));

const LINK_MARKERS: [&str; 3] = ["記事", "blog", "entry"];
const NAME_FRAGMENT_CHARS: usize = 10;

/// The part of a location name used to find its region on a linked page.
///
/// Cut at the first `は`, trimmed, and limited to ten characters.
#[must_use]
pub fn name_fragment(name: &str) -> String {
    let head = name.split('は').next().unwrap_or_default().trim();
    head.chars().take(NAME_FRAGMENT_CHARS).collect()
}

/// Absolute URLs of related-post links on `document`, in document order.
///
/// Links are kept when their href carries a blog/article marker. Location
/// detail pages are never candidates; they may be targets of the same job.
/// `skip` filters out URLs the caller has already fetched.
pub(crate) fn candidate_links(
    document: &Html,
    page_url: &str,
    limit: usize,
    skip: impl Fn(&str) -> bool,
) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        if links.len() >= limit {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !LINK_MARKERS.iter().any(|m| href.contains(m)) {
            continue;
        }
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") || is_detail_url(absolute.as_str()) {
            continue;
        }
        let absolute = absolute.to_string();
        if absolute == page_url || links.contains(&absolute) || skip(&absolute) {
            continue;
        }
        links.push(absolute);
    }
    links
}

/// First region, in document order, whose text contains `fragment`.
pub(super) fn matching_region<'a>(document: &'a Html, fragment: &str) -> Option<ElementRef<'a>> {
    if fragment.is_empty() {
        return None;
    }
    document
        .select(&REGION_SELECTOR)
        .find(|region| region.text().collect::<String>().contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_cuts_at_topic_marker_and_length() {
        assert_eq!(name_fragment("摩耶観光ホテルは兵庫県の廃墟"), "摩耶観光ホテル");
        assert_eq!(
            name_fragment("とても長い名前の廃墟施設その一その二"),
            "とても長い名前の廃墟"
        );
        assert_eq!(name_fragment("  "), "");
    }

    #[test]
    fn candidate_links_filters_and_absolutizes() {
        let html = r#"
            <a href="/blog/1">one</a>
            <a href="https://other.example/entry/2">two</a>
            <a href="/s/3.html">関連記事</a>
            <a href="/about">記事一覧</a>
            <a href="/blog/1">dup</a>
            <a href="/blog/4">four</a>
            <a href="/blog/5">five</a>"#;
        let doc = Html::parse_document(html);
        let links = candidate_links(&doc, "https://haikyo.info/s/9.html", 3, |_| false);
        assert_eq!(
            links,
            vec![
                "https://haikyo.info/blog/1",
                "https://other.example/entry/2",
                "https://haikyo.info/blog/4",
            ]
        );
    }

    #[test]
    fn detail_pages_are_never_linked_posts() {
        let doc = Html::parse_document(
            r#"<a href="/s/2.html">関連記事</a><a href="/explorer/blog/s/4.html">blog</a>"#,
        );
        let links = candidate_links(&doc, "https://haikyo.info/s/1.html", 3, |_| false);
        assert!(links.is_empty());
    }

    #[test]
    fn candidate_links_skips_seen() {
        let doc = Html::parse_document(r#"<a href="/blog/1">a</a><a href="/blog/2">b</a>"#);
        let links = candidate_links(&doc, "https://haikyo.info/s/9.html", 3, |u| {
            u.ends_with("/blog/1")
        });
        assert_eq!(links, vec!["https://haikyo.info/blog/2"]);
    }

    #[test]
    fn matching_region_finds_first_in_document_order() {
        let doc = Html::parse_document(
            "<body><div id='a'><p>other</p></div><section id='b'><p>摩耶観光ホテル</p></section></body>",
        );
        let region = matching_region(&doc, "摩耶観光ホテル").unwrap();
        assert_eq!(region.value().attr("id"), Some("b"));
    }

    #[test]
    fn empty_fragment_matches_nothing() {
        let doc = Html::parse_document("<div>x</div>");
        assert!(matching_region(&doc, "").is_none());
    }
}
