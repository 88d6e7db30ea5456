use std::io::Cursor;

use haikyo_core::{truncate_with_marker, Location};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::{is_exportable, ExportError, ExportOptions};

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
const PLACEMARK_DESCRIPTION_CHARS: usize = 200;
const MAX_PLACEMARK_IMAGES: usize = 3;

type KmlWriter = Writer<Cursor<Vec<u8>>>;

/// Renders the exportable subset of `locations` as a KML document.
///
/// Placemarks follow input order. Coordinates are written `lon,lat,0`.
///
/// # Errors
///
/// Returns [`ExportError::Xml`] if the writer fails.
pub fn to_kml(locations: &[Location], options: &ExportOptions) -> Result<String, ExportError> {
    let kept: Vec<&Location> = locations
        .iter()
        .filter(|loc| is_exportable(loc, options))
        .collect();

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    emit(
        &mut writer,
        Event::Start(BytesStart::new("kml").with_attributes([("xmlns", KML_NAMESPACE)])),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new("Document")))?;
    text_element(&mut writer, "name", &options.document_name)?;
    text_element(
        &mut writer,
        "description",
        &format!("{} locations exported", kept.len()),
    )?;

    for location in kept {
        write_placemark(&mut writer, location)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("Document")))?;
    emit(&mut writer, Event::End(BytesEnd::new("kml")))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| ExportError::Xml(e.to_string()))
}

fn write_placemark(writer: &mut KmlWriter, location: &Location) -> Result<(), ExportError> {
    let Some(coordinate) = location.coordinate else {
        return Ok(());
    };

    emit(writer, Event::Start(BytesStart::new("Placemark")))?;
    text_element(writer, "name", &location.name)?;

    emit(writer, Event::Start(BytesStart::new("description")))?;
    // every interpolated value is escaped, so `]]>` cannot appear here
    let html = placemark_html(location);
    emit(writer, Event::CData(BytesCData::new(html.as_str())))?;
    emit(writer, Event::End(BytesEnd::new("description")))?;

    emit(writer, Event::Start(BytesStart::new("Point")))?;
    text_element(
        writer,
        "coordinates",
        &format!("{},{},0", coordinate.longitude(), coordinate.latitude()),
    )?;
    emit(writer, Event::End(BytesEnd::new("Point")))?;

    emit(writer, Event::End(BytesEnd::new("Placemark")))?;
    Ok(())
}

fn placemark_html(location: &Location) -> String {
    let mut html = format!("<h3>{}</h3>", escape_html(&location.name));

    if let Some(address) = location.address.as_deref().filter(|a| !a.is_empty()) {
        html.push_str(&format!("<p><strong>Address:</strong> {}</p>", escape_html(address)));
    }

    if !location.description.is_empty() {
        let short = truncate_with_marker(&location.description, PLACEMARK_DESCRIPTION_CHARS);
        html.push_str(&format!("<p>{}</p>", escape_html(&short)));
    }

    for image in location.images.iter().take(MAX_PLACEMARK_IMAGES) {
        html.push_str(&format!(
            "<img src=\"{}\" width=\"300\"/><br/>",
            escape_attr(image)
        ));
    }

    html.push_str(&format!(
        "<p><a href=\"{}\" target=\"_blank\">{}</a></p>",
        escape_attr(&location.source_url),
        escape_html(&location.source_url)
    ));
    html
}

fn text_element(writer: &mut KmlWriter, tag: &str, text: &str) -> Result<(), ExportError> {
    emit(writer, Event::Start(BytesStart::new(tag)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(tag)))
}

fn emit(writer: &mut KmlWriter, event: Event<'_>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::Xml(e.to_string()))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}
