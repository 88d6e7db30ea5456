//! Strategy 4: coordinates encoded in map-service URLs.

use std::sync::LazyLock;

use haikyo_core::Coordinate;
use percent_encoding::percent_decode_str;
use regex::Regex;
use scraper::{ElementRef, Selector};

/// `(pattern, swapped)`: when `swapped`, the captures are `(lon, lat)`.
const MAP_URL_PATTERNS: [(&str, bool); 6] = [
    (r"!1d(-?\d+(?:\.\d+)?)!2d(-?\d+(?:\.\d+)?)", false),
    (r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)", false),
    (r"!3d(-?\d+(?:\.\d+)?)!4d(-?\d+(?:\.\d+)?)", false),
    (r"[?&]ll=(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)", false),
    (r"[?&]q=(-?\d+(?:\.\d+)?),\s*(-?\d+(?:\.\d+)?)", false),
    (r"!2d(-?\d+(?:\.\d+)?)!3d(-?\d+(?:\.\d+)?)", true),
];

static COMPILED_PATTERNS: LazyLock<Vec<(Regex, bool)>> = LazyLock::new(|| {
    MAP_URL_PATTERNS
        .iter()
        .map(|(pattern, swapped)| (Regex::new(pattern).expect("valid regex"), *swapped))
        .collect()
});

static IFRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").expect("valid selector"));
static GMAP_FRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("gmap-frame, .gmap-frame").expect("valid selector"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

pub(super) fn find(scope: ElementRef<'_>) -> Option<Coordinate> {
    map_urls(scope)
        .iter()
        .find_map(|url| coordinate_from_map_url(url))
}

/// Candidate map URLs in scope: iframes, then `gmap-frame` link lists, then anchors.
fn map_urls(scope: ElementRef<'_>) -> Vec<String> {
    let mut urls: Vec<String> = scope
        .select(&IFRAME_SELECTOR)
        .filter_map(|el| el.value().attr("src"))
        .map(str::to_owned)
        .collect();

    for frame in scope.select(&GMAP_FRAME_SELECTOR) {
        let value = frame.value();
        if let Some(links) = value.attr(":links").or_else(|| value.attr("links")) {
            urls.extend(parse_link_list(links));
        }
    }

    urls.extend(
        scope
            .select(&ANCHOR_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_owned),
    );

    urls.retain(|url| is_map_service_url(url));
    urls
}

/// A `links` attribute holds either a JSON array of URLs or a comma list.
fn parse_link_list(raw: &str) -> Vec<String> {
    let cleaned = raw.replace("\\\"", "\"");
    let cleaned = cleaned.trim().trim_matches('\'');
    if cleaned.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(cleaned) {
            return list;
        }
    }
    cleaned
        .trim_matches(|c| matches!(c, '[' | ']' | '"' | '\''))
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'').to_owned())
        .filter(|part| !part.is_empty())
        .collect()
}

fn is_map_service_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("maps.google")
        || lower.contains("goo.gl/maps")
        || (lower.contains("google.") && lower.contains("/maps"))
}

/// Tries every known encoding in order; the first pair that validates wins.
#[must_use]
pub fn coordinate_from_map_url(url: &str) -> Option<Coordinate> {
    let decoded = percent_decode_str(url).decode_utf8_lossy();
    COMPILED_PATTERNS.iter().find_map(|(re, swapped)| {
        let caps = re.captures(&decoded)?;
        let first = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let second = caps.get(2)?.as_str().parse::<f64>().ok()?;
        if *swapped {
            Coordinate::from_lon_lat(first, second)
        } else {
            Coordinate::new(first, second)
        }
    })
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    fn assert_coord(c: Option<Coordinate>, lat: f64, lon: f64) {
        let c = c.expect("coordinate");
        assert!((c.latitude() - lat).abs() < 1e-9, "lat {}", c.latitude());
        assert!((c.longitude() - lon).abs() < 1e-9, "lon {}", c.longitude());
    }

    #[test]
    fn at_sign_form() {
        assert_coord(
            coordinate_from_map_url("https://www.google.com/maps/place/x/@35.6586,139.7454,17z"),
            35.6586,
            139.7454,
        );
    }

    #[test]
    fn ll_and_q_parameters() {
        assert_coord(
            coordinate_from_map_url("https://maps.google.com/maps?ll=34.1,135.2&z=15"),
            34.1,
            135.2,
        );
        assert_coord(
            coordinate_from_map_url("https://maps.google.com/maps?q=33.5,130.4&output=embed"),
            33.5,
            130.4,
        );
    }

    #[test]
    fn embed_pb_falls_through_to_swapped_pattern() {
        // !1d is a scale here, so the first pattern fails validation.
        let url = "https://www.google.com/maps/embed?pb=!1m18!1m12!1m3!1d3280.5!2d135.2125!3d34.7276!2m3";
        assert_coord(coordinate_from_map_url(url), 34.7276, 135.2125);
    }

    #[test]
    fn data_parameter_form() {
        assert_coord(
            coordinate_from_map_url("https://www.google.com/maps/place/x/data=!4m5!3m4!1s0x0:0x0!8m2!3d35.01!4d135.76"),
            35.01,
            135.76,
        );
    }

    #[test]
    fn percent_encoded_url_is_decoded() {
        assert_coord(
            coordinate_from_map_url("https://maps.google.com/maps?q=35.1%2C139.2"),
            35.1,
            139.2,
        );
    }

    #[test]
    fn no_pattern_means_none() {
        assert!(coordinate_from_map_url("https://www.google.com/maps/place/Tokyo").is_none());
    }

    #[test]
    fn gmap_frame_links_json_attribute() {
        let html = r#"<gmap-frame :links='["https://www.google.com/maps/@36.1,140.1,15z"]'></gmap-frame>"#;
        let doc = Html::parse_document(html);
        assert_coord(find(doc.root_element()), 36.1, 140.1);
    }

    #[test]
    fn non_map_links_are_ignored() {
        let doc = Html::parse_document(r#"<a href="https://example.com/?q=35.1,139.2">x</a>"#);
        assert!(find(doc.root_element()).is_none());
    }

    #[test]
    fn link_list_comma_fallback() {
        assert_eq!(
            parse_link_list("['https://maps.google.com/a', 'https://maps.google.com/b']"),
            vec!["https://maps.google.com/a", "https://maps.google.com/b"]
        );
    }
}
