//! Strategy 5: coordinates written in running text.
//!
//! Decimal pairs are tried first, then degree-minute-second notation with a
//! hemisphere suffix (`N`/`S`/`E`/`W`) or a Japanese prefix (`北緯`, `南緯`,
//! `東経`, `西経`).

use std::sync::LazyLock;

use haikyo_core::Coordinate;
use regex::Regex;
use scraper::ElementRef;

/// Three or more fractional digits keeps prices and version numbers out.
static PRECISE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d{1,3}\.\d{3,})\s*[,、，/]?\s*(-?\d{1,3}\.\d{3,})").expect("valid regex")
});

static DMS_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(\d{1,3})\s*[°度]\s*(\d{1,2}(?:\.\d+)?)\s*['′’分]\s*(?:(\d{1,2}(?:\.\d+)?)\s*(?:"|″|”|''|秒)?\s*)?([NSEWnsew])\b"#,
    )
    .expect("valid regex")
});

static DMS_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(北緯|南緯|東経|西経)\s*(\d{1,3})\s*[°度]\s*(\d{1,2}(?:\.\d+)?)\s*['′’分]\s*(?:(\d{1,2}(?:\.\d+)?)\s*(?:"|″|”|''|秒)?)?"#,
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    fn from_suffix(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "N" => Some(Hemisphere::North),
            "S" => Some(Hemisphere::South),
            "E" => Some(Hemisphere::East),
            "W" => Some(Hemisphere::West),
            _ => None,
        }
    }

    fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "北緯" => Some(Hemisphere::North),
            "南緯" => Some(Hemisphere::South),
            "東経" => Some(Hemisphere::East),
            "西経" => Some(Hemisphere::West),
            _ => None,
        }
    }

    fn is_latitude(self) -> bool {
        matches!(self, Hemisphere::North | Hemisphere::South)
    }
}

/// `degrees + minutes/60 + seconds/3600`, negated for South and West.
#[must_use]
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, hemisphere: Hemisphere) -> f64 {
    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    match hemisphere {
        Hemisphere::South | Hemisphere::West => -magnitude,
        Hemisphere::North | Hemisphere::East => magnitude,
    }
}

/// Parses one DMS component such as `35°41'23.4"N` or `東経139度45分12秒`.
#[must_use]
pub fn parse_dms(text: &str) -> Option<(f64, Hemisphere)> {
    dms_components(text).into_iter().next().map(|(_, v, h)| (v, h))
}

pub(super) fn find(scope: ElementRef<'_>) -> Option<Coordinate> {
    let text = scope.text().collect::<Vec<_>>().join(" ");
    find_in_text(&text)
}

pub(super) fn find_in_text(text: &str) -> Option<Coordinate> {
    decimal_pair(text).or_else(|| dms_pair(text))
}

fn decimal_pair(text: &str) -> Option<Coordinate> {
    PRECISE_PAIR_RE.captures_iter(text).find_map(|caps| {
        let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
        Coordinate::new(lat, lon)
    })
}

/// Pairs each latitude component with the next longitude component after it.
fn dms_pair(text: &str) -> Option<Coordinate> {
    let components = dms_components(text);
    components
        .iter()
        .enumerate()
        .filter(|(_, (_, _, h))| h.is_latitude())
        .find_map(|(i, (_, lat, _))| {
            let (_, lon, _) = components[i + 1..].iter().find(|(_, _, h)| !h.is_latitude())?;
            Coordinate::new(*lat, *lon)
        })
}

/// Every DMS component in `text` as `(byte offset, decimal, hemisphere)`, in text order.
fn dms_components(text: &str) -> Vec<(usize, f64, Hemisphere)> {
    let mut found: Vec<(usize, f64, Hemisphere)> = DMS_SUFFIX_RE
        .captures_iter(text)
        .filter_map(|caps| suffix_component(&caps))
        .chain(
            DMS_PREFIX_RE
                .captures_iter(text)
                .filter_map(|caps| prefix_component(&caps)),
        )
        .collect();
    found.sort_by_key(|(start, _, _)| *start);
    found
}

fn suffix_component(caps: &regex::Captures<'_>) -> Option<(usize, f64, Hemisphere)> {
    let hemisphere = Hemisphere::from_suffix(caps.get(4)?.as_str())?;
    let value = dms_value(caps, 1, hemisphere)?;
    Some((caps.get(0)?.start(), value, hemisphere))
}

fn prefix_component(caps: &regex::Captures<'_>) -> Option<(usize, f64, Hemisphere)> {
    let hemisphere = Hemisphere::from_prefix(caps.get(1)?.as_str())?;
    let value = dms_value(caps, 2, hemisphere)?;
    Some((caps.get(0)?.start(), value, hemisphere))
}

/// Reads degrees, minutes, and optional seconds from consecutive groups starting at `first`.
fn dms_value(caps: &regex::Captures<'_>, first: usize, hemisphere: Hemisphere) -> Option<f64> {
    let degrees = caps.get(first)?.as_str().parse::<f64>().ok()?;
    let minutes = caps.get(first + 1)?.as_str().parse::<f64>().ok()?;
    let seconds = match caps.get(first + 2) {
        Some(m) => m.as_str().parse::<f64>().ok()?,
        None => 0.0,
    };
    Some(dms_to_decimal(degrees, minutes, seconds, hemisphere))
}
