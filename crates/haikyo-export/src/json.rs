use haikyo_core::Location;

use crate::{is_exportable, ExportError, ExportOptions};

/// Pretty-printed JSON array of the exportable locations, in input order.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn to_json(locations: &[Location], options: &ExportOptions) -> Result<String, ExportError> {
    let kept: Vec<&Location> = locations
        .iter()
        .filter(|loc| is_exportable(loc, options))
        .collect();
    Ok(serde_json::to_string_pretty(&kept)?)
}
