//! The normalized metadata record and its small value types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogRecord;
use crate::decode::Orientation;

/// Normalized metadata for one file.
///
/// `width` and `height` describe the image as displayed: for the
/// quarter-turn orientations (5-8) they are swapped relative to the stored
/// pixel buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens_model: Option<String>,
    /// Focal length in millimetres.
    pub focal_length: Option<f32>,
    /// F-number.
    pub aperture: Option<f32>,
    /// Exposure time in seconds.
    pub shutter_speed: Option<f64>,
    /// `1/250` below one second, `2.0"` above.
    pub shutter_speed_display: Option<String>,
    pub iso: Option<u32>,
    pub captured_at: Option<NaiveDateTime>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Orientation,
    /// Star rating, 0-5.
    pub rating: Option<u8>,
    pub color_label: Option<ColorLabel>,
    pub favorite: Option<bool>,
    pub flag_status: Option<FlagStatus>,
    pub metering_mode: Option<String>,
    pub flash: Option<String>,
    pub white_balance: Option<String>,
    pub exposure_program: Option<String>,
    /// Exposure compensation in EV.
    pub exposure_compensation: Option<f32>,
    pub gps: Option<GpsCoordinate>,
    pub title: Option<String>,
    pub caption: Option<String>,
    /// Which source produced the record.
    pub source: String,
    /// Source dictionary as read, for diagnostics.
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl MetadataRecord {
    /// Shared post-processing for every source.
    ///
    /// Sources fill `width`/`height` with stored pixel dimensions; this
    /// turns them into display dimensions and derives the shutter display
    /// string. Call exactly once per record.
    pub(crate) fn finish(mut self) -> Self {
        if let (Some(w), Some(h)) = (self.width, self.height) {
            let (w, h) = self.orientation.oriented_dimensions(w, h);
            self.width = Some(w);
            self.height = Some(h);
        }
        self.shutter_speed_display = self.shutter_speed.and_then(format_shutter_speed);
        if let Some(rating) = self.rating {
            self.rating = Some(rating.min(5));
        }
        self
    }

    /// Overlay an existing catalog record.
    ///
    /// Rating, favorite and flag come from the catalog even when it has no
    /// value for them; file values only count for files the catalog has
    /// never seen. A catalog color label replaces the file's.
    pub fn apply_catalog(&mut self, catalog: &CatalogRecord) {
        self.rating = catalog.rating;
        self.favorite = catalog.favorite;
        self.flag_status = catalog.flag_status;
        if let Some(label) = catalog.color_label {
            self.color_label = Some(label);
        }
    }

    /// Display dimensions when both are known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}

/// Format an exposure time for display.
///
/// One second and longer keeps one decimal with a seconds mark (`2.5"`);
/// shorter exposures become a reciprocal (`1/250`).
pub fn format_shutter_speed(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    if seconds >= 1.0 {
        Some(format!("{:.1}\"", seconds))
    } else {
        Some(format!("1/{}", (1.0 / seconds).round() as u64))
    }
}

/// The fixed seven-value color label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorLabel {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Gray,
}

impl ColorLabel {
    pub const ALL: [ColorLabel; 7] = [
        ColorLabel::Red,
        ColorLabel::Orange,
        ColorLabel::Yellow,
        ColorLabel::Green,
        ColorLabel::Blue,
        ColorLabel::Purple,
        ColorLabel::Gray,
    ];

    /// Legacy IPTC urgency (1-7) to label.
    pub fn from_urgency(urgency: i64) -> Option<Self> {
        match urgency {
            1..=7 => Some(Self::ALL[(urgency - 1) as usize]),
            _ => None,
        }
    }

    /// Case-insensitive label name; `grey` is accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "red" => Some(ColorLabel::Red),
            "orange" => Some(ColorLabel::Orange),
            "yellow" => Some(ColorLabel::Yellow),
            "green" => Some(ColorLabel::Green),
            "blue" => Some(ColorLabel::Blue),
            "purple" => Some(ColorLabel::Purple),
            "gray" | "grey" => Some(ColorLabel::Gray),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorLabel::Red => "Red",
            ColorLabel::Orange => "Orange",
            ColorLabel::Yellow => "Yellow",
            ColorLabel::Green => "Green",
            ColorLabel::Blue => "Blue",
            ColorLabel::Purple => "Purple",
            ColorLabel::Gray => "Gray",
        }
    }
}

impl fmt::Display for ColorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick / reject workflow marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlagStatus {
    Pick,
    #[default]
    Unflagged,
    Reject,
}

impl FlagStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pick" | "picked" => Some(FlagStatus::Pick),
            "none" | "unflagged" => Some(FlagStatus::Unflagged),
            "reject" | "rejected" => Some(FlagStatus::Reject),
            _ => None,
        }
    }
}

/// Decimal degrees, negative south and west.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level.
    pub altitude: Option<f64>,
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: sub-second exposures render as a reciprocal, longer ones in seconds.
        #[test]
        fn prop_shutter_format_shape(seconds in 0.000_01f64..120.0) {
            let text = format_shutter_speed(seconds).unwrap();
            if seconds >= 1.0 {
                prop_assert!(text.ends_with('"'));
            } else {
                prop_assert!(text.starts_with("1/"));
                let denominator: u64 = text[2..].parse().unwrap();
                prop_assert!(denominator >= 1);
            }
        }
    }
}
