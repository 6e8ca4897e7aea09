//! Typed parsing of exiftool JSON output.
//!
//! exiftool reports a value as a number, a string, a boolean or a list
//! depending on the tag, the file and the print-conversion flags. Each
//! field of [`ToolRecord`] is therefore a [`LooseValue`] that is coerced
//! only when the record is converted.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Deserialize;

use super::record::{ColorLabel, FlagStatus, GpsCoordinate, MetadataRecord};
use crate::decode::Orientation;
use crate::error::{PipelineError, Result};

/// Bumped whenever [`TOOL_TAGS`] changes.
pub const TOOL_TAG_LIST_VERSION: u32 = 2;

/// Tags requested from the tool, with whether the numeric (`#`) form is wanted.
pub const TOOL_TAGS: &[(&str, bool)] = &[
    ("Make", false),
    ("Model", false),
    ("LensModel", false),
    ("FocalLength", true),
    ("FNumber", true),
    ("ExposureTime", true),
    ("ISO", true),
    ("DateTimeOriginal", false),
    ("CreateDate", false),
    ("ImageWidth", true),
    ("ImageHeight", true),
    ("Orientation", true),
    ("Rating", true),
    ("Label", false),
    ("Urgency", true),
    ("Favorite", false),
    ("XMP-xmpDM:Good", false),
    ("MeteringMode", false),
    ("Flash", false),
    ("WhiteBalance", false),
    ("ExposureProgram", false),
    ("ExposureCompensation", true),
    ("GPSLatitude", true),
    ("GPSLatitudeRef", true),
    ("GPSLongitude", true),
    ("GPSLongitudeRef", true),
    ("GPSAltitude", true),
    ("Title", false),
    ("Description", false),
    ("ImageDescription", false),
];

/// Command-line arguments selecting [`TOOL_TAGS`].
pub fn tag_args() -> Vec<String> {
    let mut args = vec!["-json".to_string(), "-q".to_string()];
    args.extend(TOOL_TAGS.iter().map(|(tag, numeric)| {
        if *numeric {
            format!("-{}#", tag)
        } else {
            format!("-{}", tag)
        }
    }));
    args
}

/// A tool value before coercion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<LooseValue>),
    Other(serde_json::Value),
}

impl LooseValue {
    /// Numeric reading; strings such as `"1/250"` or `"24.0 mm"` are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LooseValue::Int(v) => Some(*v as f64),
            LooseValue::Float(v) => Some(*v),
            LooseValue::Text(s) => parse_number(s),
            LooseValue::List(items) => items.first().and_then(LooseValue::as_f64),
            LooseValue::Bool(_) | LooseValue::Other(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LooseValue::Int(v) => Some(*v),
            other => other.as_f64().map(|v| v.round() as i64),
        }
    }

    /// Non-empty text; numbers are rendered, lists joined.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            LooseValue::Text(s) => s.trim().to_string(),
            LooseValue::Int(v) => v.to_string(),
            LooseValue::Float(v) => v.to_string(),
            LooseValue::Bool(v) => v.to_string(),
            LooseValue::List(items) => items
                .iter()
                .filter_map(LooseValue::as_text)
                .collect::<Vec<_>>()
                .join(", "),
            LooseValue::Other(_) => String::new(),
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LooseValue::Bool(v) => Some(*v),
            LooseValue::Int(v) => Some(*v != 0),
            LooseValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Parse a plain number, a fraction, or the leading number of a string with a unit.
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<f64>() {
        return Some(v);
    }
    if let Some((num, den)) = text.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// One file's entry in the tool's JSON array.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolRecord {
    #[serde(rename = "SourceFile")]
    pub source_file: Option<String>,
    #[serde(rename = "Make")]
    make: Option<LooseValue>,
    #[serde(rename = "Model")]
    model: Option<LooseValue>,
    #[serde(rename = "LensModel")]
    lens_model: Option<LooseValue>,
    #[serde(rename = "FocalLength")]
    focal_length: Option<LooseValue>,
    #[serde(rename = "FNumber")]
    f_number: Option<LooseValue>,
    #[serde(rename = "ExposureTime")]
    exposure_time: Option<LooseValue>,
    #[serde(rename = "ISO")]
    iso: Option<LooseValue>,
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<LooseValue>,
    #[serde(rename = "CreateDate")]
    create_date: Option<LooseValue>,
    #[serde(rename = "ImageWidth")]
    image_width: Option<LooseValue>,
    #[serde(rename = "ImageHeight")]
    image_height: Option<LooseValue>,
    #[serde(rename = "Orientation")]
    orientation: Option<LooseValue>,
    #[serde(rename = "Rating")]
    rating: Option<LooseValue>,
    #[serde(rename = "Label")]
    label: Option<LooseValue>,
    #[serde(rename = "Urgency")]
    urgency: Option<LooseValue>,
    #[serde(rename = "Favorite")]
    favorite: Option<LooseValue>,
    #[serde(rename = "Good")]
    good: Option<LooseValue>,
    #[serde(rename = "MeteringMode")]
    metering_mode: Option<LooseValue>,
    #[serde(rename = "Flash")]
    flash: Option<LooseValue>,
    #[serde(rename = "WhiteBalance")]
    white_balance: Option<LooseValue>,
    #[serde(rename = "ExposureProgram")]
    exposure_program: Option<LooseValue>,
    #[serde(rename = "ExposureCompensation")]
    exposure_compensation: Option<LooseValue>,
    #[serde(rename = "GPSLatitude")]
    gps_latitude: Option<LooseValue>,
    #[serde(rename = "GPSLatitudeRef")]
    gps_latitude_ref: Option<LooseValue>,
    #[serde(rename = "GPSLongitude")]
    gps_longitude: Option<LooseValue>,
    #[serde(rename = "GPSLongitudeRef")]
    gps_longitude_ref: Option<LooseValue>,
    #[serde(rename = "GPSAltitude")]
    gps_altitude: Option<LooseValue>,
    #[serde(rename = "Title")]
    title: Option<LooseValue>,
    #[serde(rename = "Description")]
    description: Option<LooseValue>,
    #[serde(rename = "ImageDescription")]
    image_description: Option<LooseValue>,
}

/// Parse the tool's JSON array into typed records paired with their raw dictionaries.
pub fn parse_output(output: &[u8]) -> Result<Vec<(ToolRecord, BTreeMap<String, serde_json::Value>)>> {
    if output.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::ExternalToolFailed("empty output".to_string()));
    }
    let entries: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_slice(output)
        .map_err(|e| PipelineError::ExternalToolFailed(format!("malformed JSON: {}", e)))?;

    entries
        .into_iter()
        .map(|entry| {
            let typed: ToolRecord = serde_json::from_value(serde_json::Value::Object(entry.clone()))
                .map_err(|e| PipelineError::ExternalToolFailed(format!("unexpected record: {}", e)))?;
            Ok((typed, entry.into_iter().collect()))
        })
        .collect()
}

fn text(value: &Option<LooseValue>) -> Option<String> {
    value.as_ref().and_then(LooseValue::as_text)
}

fn number(value: &Option<LooseValue>) -> Option<f64> {
    value.as_ref().and_then(LooseValue::as_f64)
}

fn integer(value: &Option<LooseValue>) -> Option<i64> {
    value.as_ref().and_then(LooseValue::as_i64)
}

/// Capture timestamps use the EXIF `YYYY:MM:DD HH:MM:SS` layout, optionally
/// followed by sub-seconds or a zone offset that is ignored here.
pub(crate) fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value.get(..19)?, "%Y:%m:%d %H:%M:%S").ok()
}

/// Apply the hemisphere reference unless the value already carries a sign.
fn signed(value: f64, reference: Option<String>, negative: char) -> f64 {
    let flips = reference
        .and_then(|r| r.chars().next())
        .map(|c| c.eq_ignore_ascii_case(&negative))
        .unwrap_or(false);
    if flips && value > 0.0 {
        -value
    } else {
        value
    }
}

impl ToolRecord {
    /// Convert into a record. `finish` is left to the caller.
    pub fn into_record(self, raw: BTreeMap<String, serde_json::Value>) -> MetadataRecord {
        let rating = integer(&self.rating);
        let flag_status = if rating == Some(-1) {
            Some(FlagStatus::Reject)
        } else if self.good.as_ref().and_then(LooseValue::as_bool) == Some(true) {
            Some(FlagStatus::Pick)
        } else {
            None
        };

        let color_label = text(&self.label)
            .and_then(|l| ColorLabel::parse(&l))
            .or_else(|| integer(&self.urgency).and_then(ColorLabel::from_urgency));

        let gps = match (number(&self.gps_latitude), number(&self.gps_longitude)) {
            (Some(lat), Some(lon)) => Some(GpsCoordinate {
                latitude: signed(lat, text(&self.gps_latitude_ref), 'S'),
                longitude: signed(lon, text(&self.gps_longitude_ref), 'W'),
                altitude: number(&self.gps_altitude),
            }),
            _ => None,
        };

        let captured_at = text(&self.date_time_original)
            .or_else(|| text(&self.create_date))
            .and_then(|s| parse_exif_datetime(&s));

        MetadataRecord {
            make: text(&self.make),
            model: text(&self.model),
            lens_model: text(&self.lens_model),
            focal_length: number(&self.focal_length).map(|v| v as f32),
            aperture: number(&self.f_number).map(|v| v as f32),
            shutter_speed: number(&self.exposure_time).filter(|v| *v > 0.0),
            shutter_speed_display: None,
            iso: integer(&self.iso).and_then(|v| u32::try_from(v).ok()),
            captured_at,
            width: integer(&self.image_width).and_then(|v| u32::try_from(v).ok()),
            height: integer(&self.image_height).and_then(|v| u32::try_from(v).ok()),
            orientation: integer(&self.orientation)
                .and_then(|v| u32::try_from(v).ok())
                .and_then(Orientation::from_code)
                .unwrap_or_default(),
            rating: rating.and_then(|v| u8::try_from(v).ok()),
            color_label,
            favorite: self.favorite.as_ref().and_then(LooseValue::as_bool),
            flag_status,
            metering_mode: text(&self.metering_mode),
            flash: text(&self.flash),
            white_balance: text(&self.white_balance),
            exposure_program: text(&self.exposure_program),
            exposure_compensation: number(&self.exposure_compensation).map(|v| v as f32),
            gps,
            title: text(&self.title),
            caption: text(&self.description).or_else(|| text(&self.image_description)),
            source: format!("exiftool/tags-v{}", TOOL_TAG_LIST_VERSION),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(json: &str) -> MetadataRecord {
        let mut records = parse_output(json.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let (typed, raw) = records.remove(0);
        typed.into_record(raw)
    }

    #[test]
    fn test_loose_value_coercion() {
        assert_eq!(LooseValue::Text("1/250".into()).as_f64(), Some(0.004));
        assert_eq!(LooseValue::Text("24.0 mm".into()).as_f64(), Some(24.0));
        assert_eq!(LooseValue::Text("-0.7".into()).as_f64(), Some(-0.7));
        assert_eq!(LooseValue::Text("1/0".into()).as_f64(), None);
        assert_eq!(LooseValue::Text("Auto".into()).as_f64(), None);
        assert_eq!(LooseValue::Float(399.6).as_i64(), Some(400));
        assert_eq!(LooseValue::Int(5).as_text().as_deref(), Some("5"));
        assert_eq!(LooseValue::Text("  ".into()).as_text(), None);
        assert_eq!(LooseValue::Text("True".into()).as_bool(), Some(true));
        assert_eq!(
            LooseValue::List(vec![LooseValue::Int(100), LooseValue::Int(200)]).as_f64(),
            Some(100.0)
        );
    }

    #[test]
    fn test_tag_args_mark_numeric_tags() {
        let args = tag_args();
        assert_eq!(&args[..2], &["-json".to_string(), "-q".to_string()]);
        assert!(args.contains(&"-Orientation#".to_string()));
        assert!(args.contains(&"-Make".to_string()));
        assert_eq!(args.len(), TOOL_TAGS.len() + 2);
    }

    #[test]
    fn test_full_record() {
        let record = parse_one(
            r#"[{
                "SourceFile": "/photos/IMG_0001.CR2",
                "Make": "Canon",
                "Model": "Canon EOS R5",
                "LensModel": "RF24-70mm F2.8 L IS USM",
                "FocalLength": 35,
                "FNumber": "2.8",
                "ExposureTime": 0.004,
                "ISO": 400,
                "DateTimeOriginal": "2024:03:15 10:22:33.45+02:00",
                "ImageWidth": 8192,
                "ImageHeight": 5464,
                "Orientation": 6,
                "Rating": 4,
                "Urgency": 3,
                "MeteringMode": "Evaluative",
                "ExposureCompensation": "-1/3",
                "GPSLatitude": 48.8584,
                "GPSLatitudeRef": "S",
                "GPSLongitude": 2.2945,
                "GPSLongitudeRef": "E",
                "Title": "Tower"
            }]"#,
        )
        .finish();

        assert_eq!(record.make.as_deref(), Some("Canon"));
        assert_eq!(record.focal_length, Some(35.0));
        assert_eq!(record.aperture, Some(2.8));
        assert_eq!(record.iso, Some(400));
        assert_eq!(record.shutter_speed_display.as_deref(), Some("1/250"));
        assert_eq!(
            record.captured_at.map(|t| t.to_string()).as_deref(),
            Some("2024-03-15 10:22:33")
        );
        assert_eq!(record.orientation, Orientation::Rotate90CW);
        assert_eq!(record.dimensions(), Some((5464, 8192)));
        assert_eq!(record.rating, Some(4));
        assert_eq!(record.color_label, Some(ColorLabel::Yellow));
        assert!((record.exposure_compensation.unwrap() + 0.333).abs() < 0.01);
        let gps = record.gps.unwrap();
        assert!(gps.latitude < 0.0 && gps.longitude > 0.0);
        assert_eq!(record.title.as_deref(), Some("Tower"));
        assert_eq!(record.raw.get("Make"), Some(&serde_json::json!("Canon")));
        assert!(record.source.starts_with("exiftool"));
    }

    #[test]
    fn test_label_wins_over_urgency() {
        let record = parse_one(r#"[{"SourceFile": "a.jpg", "Label": "Green", "Urgency": 1}]"#);
        assert_eq!(record.color_label, Some(ColorLabel::Green));
    }

    #[test]
    fn test_reject_and_pick() {
        let rejected = parse_one(r#"[{"SourceFile": "a.nef", "Rating": -1}]"#);
        assert_eq!(rejected.flag_status, Some(FlagStatus::Reject));
        assert_eq!(rejected.rating, None);

        let picked = parse_one(r#"[{"SourceFile": "a.nef", "Good": true, "Favorite": "yes"}]"#);
        assert_eq!(picked.flag_status, Some(FlagStatus::Pick));
        assert_eq!(picked.favorite, Some(true));
    }

    #[test]
    fn test_signed_gps_is_not_flipped_twice() {
        let record = parse_one(
            r#"[{"SourceFile": "a.jpg", "GPSLatitude": -33.9, "GPSLatitudeRef": "S",
                 "GPSLongitude": -70.6, "GPSLongitudeRef": "W"}]"#,
        );
        let gps = record.gps.unwrap();
        assert_eq!(gps.latitude, -33.9);
        assert_eq!(gps.longitude, -70.6);
    }

    #[test]
    fn test_missing_orientation_defaults_to_normal() {
        let record = parse_one(r#"[{"SourceFile": "a.jpg", "Orientation": 0}]"#);
        assert_eq!(record.orientation, Orientation::Normal);
    }

    #[test]
    fn test_malformed_output() {
        assert!(matches!(
            parse_output(b""),
            Err(PipelineError::ExternalToolFailed(_))
        ));
        assert!(matches!(
            parse_output(b"Error: File not found"),
            Err(PipelineError::ExternalToolFailed(_))
        ));
        assert!(parse_output(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_exif_datetime() {
        assert!(parse_exif_datetime("2023:12:31 23:59:59").is_some());
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("2023:12").is_none());
    }
}
