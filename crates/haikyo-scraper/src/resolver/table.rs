//! Strategy 3: table rows labelled as coordinates.

use std::sync::LazyLock;

use haikyo_core::Coordinate;
use regex::Regex;
use scraper::{ElementRef, Selector};

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid selector"));

/// Two signed decimals separated by a comma (ASCII or full-width), slash, or whitespace.
pub(super) static DECIMAL_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d{1,3}\.\d+)\s*[,、，/\s]\s*(-?\d{1,3}\.\d+)").expect("valid regex")
});

const ROW_MARKERS: [&str; 3] = ["緯度経度", "GPS", "座標"];

pub(super) fn find(scope: ElementRef<'_>) -> Option<Coordinate> {
    scope
        .select(&ROW_SELECTOR)
        .map(|row| row.text().collect::<String>())
        .filter(|text| ROW_MARKERS.iter().any(|m| text.contains(m)))
        .find_map(|text| first_decimal_pair(&text))
}

pub(super) fn first_decimal_pair(text: &str) -> Option<Coordinate> {
    DECIMAL_PAIR_RE.captures_iter(text).find_map(|caps| {
        let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
        Coordinate::new(lat, lon)
    })
}
