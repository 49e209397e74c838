//! Per-photo metadata extraction.
//!
//! [`extract`] reads one image file and produces a [`PhotoRecord`]: the
//! intrinsic dimensions from the image header plus a handful of EXIF tags.
//! Only header and tag structures are decoded, never pixel data.
//!
//! ## Tags
//!
//! | Field | EXIF tag | Transform |
//! |---|---|---|
//! | `manufacturer` | Make (`0x010F`) | text |
//! | `model` | Model (`0x0110`) | text |
//! | `software` | Software (`0x0131`) | text |
//! | `iso` | PhotographicSensitivity (`0x8827`) | integer |
//! | `focal_length` | FocalLength (`0x920A`) | ratio as float |
//! | `f_number` | ApertureValue (`0x9202`) | APEX: `2^(Av/2)`, 1 decimal |
//! | `shutter_speed` | ShutterSpeedValue (`0x9201`) | APEX: `2^Tv`, 0 decimals |
//! | `date_taken` | DateTimeOriginal (`0x9003`), else DateTime (`0x0132`) | `yyyy:MM:d H:m:s` |
//!
//! A missing or malformed tag leaves its field `None`; it never fails the
//! extraction. A file that cannot be read as an image at all is an error for
//! that file only.

use crate::imaging::backend::{BackendError, read_dimensions};
use crate::imaging::long_side;
use crate::paths::store_key;
use chrono::NaiveDateTime;
use exif::{Exif, In, Tag, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a readable image: {0}")]
    Image(#[from] BackendError),
}

/// Metadata for one source photo. `full_path` is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub full_path: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<NaiveDateTime>,
}

impl PhotoRecord {
    /// Larger of width and height. Derived, never stored.
    pub fn long_side(&self) -> u32 {
        long_side(self.width, self.height)
    }
}

/// Date pattern used by EXIF date tags. `%d`/`%H`/`%M`/`%S` accept one or
/// two digits when parsing.
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Convert an APEX aperture value to an f-number, rounded to 1 decimal.
pub fn f_number_from_apex(av: f64) -> f64 {
    round_to(2f64.powf(av / 2.0), 1)
}

/// Convert an APEX shutter value to a speed in seconds, rounded to a whole number.
pub fn shutter_speed_from_apex(tv: f64) -> f64 {
    2f64.powf(tv).round()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Parse an EXIF date string. Returns `None` on any mismatch.
pub fn parse_exif_date(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(trimmed, EXIF_DATE_FORMAT).ok()
}

/// Read metadata from a single image file.
pub fn extract(path: &Path) -> Result<PhotoRecord, MetadataError> {
    let dims = read_dimensions(path)?;

    let mut record = PhotoRecord {
        full_path: store_key(path),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        width: dims.width,
        height: dims.height,
        manufacturer: None,
        model: None,
        software: None,
        focal_length: None,
        f_number: None,
        iso: None,
        shutter_speed: None,
        date_taken: None,
    };

    let exif = match read_exif(path)? {
        Some(exif) => exif,
        None => return Ok(record),
    };

    record.manufacturer = text_tag(&exif, Tag::Make);
    record.model = text_tag(&exif, Tag::Model);
    record.software = text_tag(&exif, Tag::Software);
    record.iso = exif
        .get_field(Tag::PhotographicSensitivity, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0));
    record.focal_length = ratio_tag(&exif, Tag::FocalLength);
    record.f_number = ratio_tag(&exif, Tag::ApertureValue).map(f_number_from_apex);
    record.shutter_speed = ratio_tag(&exif, Tag::ShutterSpeedValue).map(shutter_speed_from_apex);
    record.date_taken = text_tag(&exif, Tag::DateTimeOriginal)
        .and_then(|s| parse_exif_date(&s))
        .or_else(|| text_tag(&exif, Tag::DateTime).and_then(|s| parse_exif_date(&s)));

    Ok(record)
}

/// Parse the EXIF block, if the file has one.
fn read_exif(path: &Path) -> Result<Option<Exif>, MetadataError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(Some(exif)),
        Err(e) => {
            debug!("No EXIF in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

fn text_tag(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .to_string()
            })
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Read a RATIONAL or SRATIONAL tag as a float. A zero denominator is
/// treated as missing.
fn ratio_tag(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(v) => v.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        Value::SRational(v) => v.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        _ => None,
    }
}
