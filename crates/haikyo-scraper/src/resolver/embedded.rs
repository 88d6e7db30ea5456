//! Strategy 1: coordinates in inline script data.
//!
//! Covers JSON-LD `geo` blocks, `window.spot_info = {...}` style assignments
//! (unquoted keys tolerated), and loose `"lat": x, "lng": y` key pairs.

use std::sync::LazyLock;

use haikyo_core::Coordinate;
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde_json::Value;

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid selector"));

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:spot_info|spotInfo|mapData|map_data|location)\s*=\s*\{").expect("valid regex")
});

static UNQUOTED_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("valid regex")
});

static LOOSE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)["']?(?:lat|latitude)["']?\s*[:=]\s*["']?(-?\d{1,3}(?:\.\d+)?)["']?\s*[,;]\s*["']?(?:lng|lon|long|longitude)["']?\s*[:=]\s*["']?(-?\d{1,3}(?:\.\d+)?)"#,
    )
    .expect("valid regex")
});

const LAT_KEYS: [&str; 2] = ["lat", "latitude"];
const LON_KEYS: [&str; 4] = ["lng", "lon", "long", "longitude"];

pub(super) fn find(scope: ElementRef<'_>) -> Option<Coordinate> {
    let scripts: Vec<String> = scope
        .select(&SCRIPT_SELECTOR)
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect();

    scripts
        .iter()
        .find_map(|text| from_json_document(text))
        .or_else(|| scripts.iter().find_map(|text| from_assignment(text)))
        .or_else(|| scripts.iter().find_map(|text| from_loose_pair(text)))
}

/// Whole-script JSON (JSON-LD and similar).
fn from_json_document(text: &str) -> Option<Coordinate> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    coordinate_in_value(&value)
}

fn from_assignment(text: &str) -> Option<Coordinate> {
    ASSIGNMENT_RE.find_iter(text).find_map(|m| {
        // The match ends on the opening brace.
        let start = m.end() - 1;
        let object = extract_balanced_object(&text[start..])?;
        let value = serde_json::from_str::<Value>(object).ok().or_else(|| {
            let quoted = UNQUOTED_KEY_RE.replace_all(object, r#"$1"$2":"#);
            serde_json::from_str::<Value>(&quoted.replace('\'', "\"")).ok()
        })?;
        coordinate_in_value(&value)
    })
}

fn from_loose_pair(text: &str) -> Option<Coordinate> {
    LOOSE_PAIR_RE.captures_iter(text).find_map(|caps| {
        let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
        Coordinate::new(lat, lon)
    })
}

/// Depth-first search for an object carrying a latitude and a longitude key.
fn coordinate_in_value(value: &Value) -> Option<Coordinate> {
    match value {
        Value::Object(map) => {
            let lat = LAT_KEYS.iter().find_map(|k| map.get(*k).and_then(as_f64));
            let lon = LON_KEYS.iter().find_map(|k| map.get(*k).and_then(as_f64));
            if let (Some(lat), Some(lon)) = (lat, lon) {
                if let Some(c) = Coordinate::new(lat, lon) {
                    return Some(c);
                }
            }
            if let Some(geo) = map.get("geo") {
                if let Some(c) = coordinate_in_value(geo) {
                    return Some(c);
                }
            }
            map.values().find_map(coordinate_in_value)
        }
        Value::Array(items) => items.iter().find_map(coordinate_in_value),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

/// Returns the shortest prefix of `s` that is a brace-balanced `{...}` object.
///
/// String literals (single or double quoted) and escapes are respected, so
/// braces inside strings do not count.
pub(super) fn extract_balanced_object(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escape = false;
    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if let Some(q) = quote {
            match c {
                '\\' => escape = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
