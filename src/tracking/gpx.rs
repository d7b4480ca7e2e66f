//! GPX 1.1 export.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use std::fmt::Write;

use crate::core::geo::GeoFix;
use crate::tracking::types::{Track, Waypoint};

const GPX_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="fieldmap" xmlns="http://www.topografix.com/GPX/1/1" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd">
"#;

/// ISO-8601 UTC with milliseconds, e.g. `2024-05-01T06:30:00.000Z`
fn iso_time(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn elevation(fix: &GeoFix) -> f64 {
    fix.altitude.unwrap_or(0.0)
}

fn write_waypoint(out: &mut String, waypoint: &Waypoint) -> std::fmt::Result {
    let fix = &waypoint.fix;
    writeln!(out, r#"  <wpt lat="{}" lon="{}">"#, fix.latitude, fix.longitude)?;
    writeln!(out, "    <ele>{}</ele>", elevation(fix))?;
    writeln!(out, "    <time>{}</time>", iso_time(fix.timestamp_ms))?;
    writeln!(out, "    <name>{}</name>", escape(waypoint.name.as_str()))?;
    if let Some(description) = &waypoint.description {
        writeln!(out, "    <desc>{}</desc>", escape(description.as_str()))?;
    }
    writeln!(out, "    <type>{}</type>", waypoint.category)?;
    writeln!(out, "  </wpt>")
}

fn write_document(out: &mut String, track: &Track) -> std::fmt::Result {
    out.push_str(GPX_HEADER);
    let name = escape(track.name.as_str());

    writeln!(out, "  <metadata>")?;
    writeln!(out, "    <name>{}</name>", name)?;
    writeln!(out, "    <time>{}</time>", iso_time(track.start_time_ms))?;
    writeln!(out, "  </metadata>")?;

    for waypoint in &track.waypoints {
        write_waypoint(out, waypoint)?;
    }

    writeln!(out, "  <trk>")?;
    writeln!(out, "    <name>{}</name>", name)?;
    writeln!(out, "    <trkseg>")?;
    for fix in &track.fixes {
        writeln!(out, r#"      <trkpt lat="{}" lon="{}">"#, fix.latitude, fix.longitude)?;
        writeln!(out, "        <ele>{}</ele>", elevation(fix))?;
        writeln!(out, "        <time>{}</time>", iso_time(fix.timestamp_ms))?;
        writeln!(out, "      </trkpt>")?;
    }
    writeln!(out, "    </trkseg>")?;
    writeln!(out, "  </trk>")?;
    out.push_str("</gpx>\n");
    Ok(())
}

/// Render a track as a GPX 1.1 document.
///
/// The output depends only on the track, so exporting the same track twice
/// yields identical bytes. Missing altitudes are written as `0`.
pub fn export_gpx(track: &Track) -> String {
    let mut out = String::with_capacity(512 + track.fixes.len() * 128);
    // Writing into a String cannot fail
    let _ = write_document(&mut out, track);
    out
}

/// Download file name: whitespace runs in the name become `_`, then the id
pub fn gpx_file_name(track: &Track) -> String {
    let mut name = String::with_capacity(track.name.len() + track.id.len() + 5);
    let mut in_whitespace = false;
    for c in track.name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                name.push('_');
            }
            in_whitespace = true;
        } else {
            name.push(c);
            in_whitespace = false;
        }
    }
    format!("{}_{}.gpx", name, track.id)
}
