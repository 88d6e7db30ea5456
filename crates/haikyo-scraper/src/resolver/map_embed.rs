//! Strategy 2: map widgets carrying `data-lat` / `data-lng` attributes.

use std::sync::LazyLock;

use haikyo_core::Coordinate;
use scraper::{ElementRef, Selector};

static DATA_LAT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-lat]").expect("valid selector"));

const LON_ATTRS: [&str; 3] = ["data-lng", "data-lon", "data-long"];

pub(super) fn find(scope: ElementRef<'_>) -> Option<Coordinate> {
    scope.select(&DATA_LAT_SELECTOR).find_map(|el| {
        let value = el.value();
        let lat = value.attr("data-lat")?.trim().parse::<f64>().ok()?;
        let lon = LON_ATTRS
            .iter()
            .find_map(|attr| value.attr(attr))?
            .trim()
            .parse::<f64>()
            .ok()?;
        Coordinate::new(lat, lon)
    })
}
