//! Metadata sources, tried in a fixed priority order.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use exif::{Context, Exif, In, Tag, Value};
use tracing::debug;

use super::record::{GpsCoordinate, MetadataRecord};
use super::tool_record::{parse_exif_datetime, parse_output, tag_args};
use crate::catalog::LabelUpdate;
use crate::decode::Orientation;
use crate::error::{PipelineError, Result};
use crate::identity::FileIdentity;
use crate::tool::ToolRunner;

/// XMP rating tag as stored in the TIFF IFD by Windows and Lightroom.
const TAG_RATING: Tag = Tag(Context::Tiff, 0x4746);

/// One way of producing a [`MetadataRecord`].
///
/// Records returned by a source are finished: display dimensions and the
/// shutter display string are already derived.
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, identity: &FileIdentity) -> Result<MetadataRecord>;

    /// Whether the source can be skipped outright right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Whether [`MetadataSource::extract_batch`] does better than a loop.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Records for many files in one go, keyed by normalized path.
    ///
    /// Files the source could not handle are simply absent from the map.
    fn extract_batch(&self, identities: &[FileIdentity]) -> Result<HashMap<PathBuf, MetadataRecord>> {
        Ok(identities
            .iter()
            .filter_map(|id| {
                self.extract(id)
                    .ok()
                    .map(|record| (id.path().to_path_buf(), record))
            })
            .collect())
    }
}

/// Metadata from the external tool, using the versioned tag list.
pub struct ToolBackedSource {
    tool: Arc<dyn ToolRunner>,
}

impl ToolBackedSource {
    pub fn new(tool: Arc<dyn ToolRunner>) -> Self {
        Self { tool }
    }

    fn run(&self, identities: &[FileIdentity]) -> Result<Vec<(PathBuf, MetadataRecord)>> {
        let mut args: Vec<OsString> = tag_args().into_iter().map(OsString::from).collect();
        args.extend(identities.iter().map(|id| id.path().as_os_str().to_owned()));

        let output = self.tool.run(&args)?;
        let records = parse_output(&output)?;
        Ok(records
            .into_iter()
            .map(|(typed, raw)| {
                let path = typed
                    .source_file
                    .as_deref()
                    .map(|s| FileIdentity::new(s).path().to_path_buf())
                    .unwrap_or_default();
                (path, typed.into_record(raw).finish())
            })
            .collect())
    }

    /// Write rating and color label into the file's XMP.
    ///
    /// Updates with neither are a no-op.
    pub fn write_labels(&self, identity: &FileIdentity, update: &LabelUpdate) -> Result<()> {
        let mut args = vec![OsString::from("-overwrite_original")];
        if let Some(rating) = update.rating {
            args.push(OsString::from(format!("-XMP:Rating={}", rating.min(5))));
        }
        if let Some(label) = update.color_label {
            let value = label.map(|l| l.as_str()).unwrap_or_default();
            args.push(OsString::from(format!("-XMP:Label={}", value)));
        }
        if args.len() == 1 {
            return Ok(());
        }
        args.push(identity.path().as_os_str().to_owned());
        self.tool.run(&args).map(|_| ())
    }
}

impl MetadataSource for ToolBackedSource {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn extract(&self, identity: &FileIdentity) -> Result<MetadataRecord> {
        self.run(std::slice::from_ref(identity))?
            .into_iter()
            .next()
            .map(|(_, record)| record)
            .ok_or_else(|| PipelineError::ExternalToolFailed(format!("no record for {}", identity)))
    }

    fn is_available(&self) -> bool {
        self.tool.is_available()
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn extract_batch(&self, identities: &[FileIdentity]) -> Result<HashMap<PathBuf, MetadataRecord>> {
        Ok(self.run(identities)?.into_iter().collect())
    }
}

/// Metadata read directly from the file's embedded EXIF.
#[derive(Debug, Default)]
pub struct ContainerPropertiesSource;

impl ContainerPropertiesSource {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataSource for ContainerPropertiesSource {
    fn name(&self) -> &'static str {
        "container"
    }

    fn extract(&self, identity: &FileIdentity) -> Result<MetadataRecord> {
        let file = File::open(identity.path()).map_err(|e| PipelineError::not_readable(identity.path(), e))?;

        match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => Ok(record_from_exif(&exif, identity).finish()),
            Err(e) => {
                debug!(path = %identity, error = %e, "No EXIF block, reading dimensions only");
                let (width, height) = image::image_dimensions(identity.path())
                    .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;
                Ok(MetadataRecord {
                    width: Some(width),
                    height: Some(height),
                    source: "container".to_string(),
                    ..Default::default()
                }
                .finish())
            }
        }
    }
}

fn record_from_exif(exif: &Exif, identity: &FileIdentity) -> MetadataRecord {
    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY);
    let text = |tag: Tag| field(tag).and_then(|f| ascii(&f.value));
    let display = |tag: Tag| {
        field(tag)
            .map(|f| f.display_value().to_string())
            .filter(|s| !s.is_empty())
    };
    let number = |tag: Tag| field(tag).and_then(|f| real(&f.value));
    let uint = |tag: Tag| field(tag).and_then(|f| f.value.get_uint(0));

    let width = uint(Tag::PixelXDimension).or_else(|| uint(Tag::ImageWidth));
    let height = uint(Tag::PixelYDimension).or_else(|| uint(Tag::ImageLength));
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) => (Some(w), Some(h)),
        _ => match image::image_dimensions(identity.path()) {
            Ok((w, h)) => (Some(w), Some(h)),
            Err(_) => (None, None),
        },
    };

    let raw: BTreeMap<String, serde_json::Value> = exif
        .fields()
        .filter(|f| f.ifd_num == In::PRIMARY)
        .map(|f| {
            (
                f.tag.to_string(),
                serde_json::Value::String(f.display_value().to_string()),
            )
        })
        .collect();

    MetadataRecord {
        make: text(Tag::Make),
        model: text(Tag::Model),
        lens_model: text(Tag::LensModel),
        focal_length: number(Tag::FocalLength).map(|v| v as f32),
        aperture: number(Tag::FNumber).map(|v| v as f32),
        shutter_speed: number(Tag::ExposureTime).filter(|v| *v > 0.0),
        iso: uint(Tag::PhotographicSensitivity),
        captured_at: text(Tag::DateTimeOriginal)
            .or_else(|| text(Tag::DateTime))
            .and_then(|s| parse_exif_datetime(&s)),
        width,
        height,
        orientation: uint(Tag::Orientation)
            .and_then(Orientation::from_code)
            .unwrap_or_default(),
        rating: uint(TAG_RATING).and_then(|v| u8::try_from(v).ok()),
        metering_mode: display(Tag::MeteringMode),
        flash: display(Tag::Flash),
        white_balance: display(Tag::WhiteBalance),
        exposure_program: display(Tag::ExposureProgram),
        exposure_compensation: number(Tag::ExposureBiasValue).map(|v| v as f32),
        gps: gps(exif),
        caption: text(Tag::ImageDescription),
        source: "container".to_string(),
        raw,
        ..Default::default()
    }
}

fn ascii(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn real(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(v) => v.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        Value::SRational(v) => v.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        other => other.get_uint(0).map(f64::from),
    }
}

fn gps(exif: &Exif) -> Option<GpsCoordinate> {
    let degrees = |tag: Tag| match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(parts) if parts.len() >= 3 && parts.iter().all(|r| r.denom != 0) => {
            Some(parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0)
        }
        _ => None,
    };
    let reference = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|f| ascii(&f.value))
            .unwrap_or_default()
    };

    let mut latitude = degrees(Tag::GPSLatitude)?;
    let mut longitude = degrees(Tag::GPSLongitude)?;
    if reference(Tag::GPSLatitudeRef).eq_ignore_ascii_case("S") {
        latitude = -latitude;
    }
    if reference(Tag::GPSLongitudeRef).eq_ignore_ascii_case("W") {
        longitude = -longitude;
    }

    let altitude = exif
        .get_field(Tag::GPSAltitude, In::PRIMARY)
        .and_then(|f| real(&f.value))
        .map(|alt| {
            let below = exif
                .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
                == Some(1);
            if below {
                -alt
            } else {
                alt
            }
        });

    Some(GpsCoordinate {
        latitude,
        longitude,
        altitude,
    })
}
