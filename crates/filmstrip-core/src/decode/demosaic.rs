//! Sensor-data decoding through `rawloader`.
//!
//! This is a preview-grade renderer, not a RAW developer: each 2x2 CFA
//! block becomes one RGB pixel (greens averaged), blocks are skipped to
//! respect the maximum output dimension, and the result gets black/white
//! level scaling, as-shot white balance and a plain 2.2 gamma.

use std::path::Path;

use rawloader::{RawImage, RawImageData};

use super::{Bitmap, Orientation};
use crate::error::{PipelineError, Result};
use crate::transform::apply_orientation;

const GAMMA: f32 = 1.0 / 2.2;

/// Decode the sensor data of `path` into a display-oriented bitmap.
///
/// The longest edge of the result is at most `max_dimension`.
///
/// # Errors
///
/// Returns `PipelineError::DecodeFailed` when rawloader does not support the
/// camera or the sensor layout.
pub fn decode_sensor(path: &Path, max_dimension: u32) -> Result<Bitmap> {
    let raw = rawloader::decode_file(path)
        .map_err(|e| PipelineError::DecodeFailed(format!("rawloader: {:?}", e)))?;

    let bitmap = render(&raw, max_dimension.max(1) as usize)?;
    Ok(match orientation_of(&raw) {
        Some(o) => apply_orientation(&bitmap, o),
        None => bitmap,
    })
}

fn render(raw: &RawImage, max_dimension: usize) -> Result<Bitmap> {
    let [top, right, bottom, left] = raw.crops;
    let area_w = raw.width.saturating_sub(left + right);
    let area_h = raw.height.saturating_sub(top + bottom);

    let levels = Levels::new(raw);
    let sample = |row: usize, col: usize| -> f32 {
        let idx = row * raw.width * raw.cpp + col * raw.cpp;
        match &raw.data {
            RawImageData::Integer(values) => values.get(idx).copied().unwrap_or(0) as f32,
            RawImageData::Float(values) => values.get(idx).copied().unwrap_or(0.0),
        }
    };

    match raw.cpp {
        1 => {
            // One RGB pixel per 2x2 block, skipping blocks to fit
            let blocks_w = area_w / 2;
            let blocks_h = area_h / 2;
            let step = step_for(blocks_w.max(blocks_h), max_dimension);
            let (out_w, out_h) = (blocks_w / step, blocks_h / step);
            if out_w == 0 || out_h == 0 {
                return Err(PipelineError::DecodeFailed("Sensor area too small".into()));
            }

            let mut pixels = Vec::with_capacity(out_w * out_h * 3);
            for oy in 0..out_h {
                let row = top + oy * step * 2;
                for ox in 0..out_w {
                    let col = left + ox * step * 2;
                    let mut sums = [0f32; 3];
                    let mut counts = [0u32; 3];
                    for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                        let color = raw.cfa.color_at(row + dy, col + dx);
                        let channel = if color == 3 { 1 } else { color.min(2) };
                        sums[channel] += levels.normalize(sample(row + dy, col + dx), color);
                        counts[channel] += 1;
                    }
                    for c in 0..3 {
                        let v = if counts[c] > 0 { sums[c] / counts[c] as f32 } else { 0.0 };
                        pixels.push(levels.encode(v, c));
                    }
                }
            }
            Ok(Bitmap::new(out_w as u32, out_h as u32, pixels))
        }
        3 => {
            // Already-demosaiced linear data (linear DNG)
            let step = step_for(area_w.max(area_h), max_dimension);
            let (out_w, out_h) = (area_w / step, area_h / step);
            if out_w == 0 || out_h == 0 {
                return Err(PipelineError::DecodeFailed("Sensor area too small".into()));
            }

            let mut pixels = Vec::with_capacity(out_w * out_h * 3);
            for oy in 0..out_h {
                let row = top + oy * step;
                for ox in 0..out_w {
                    let base = (row * raw.width + left + ox * step) * 3;
                    for c in 0..3 {
                        let value = match &raw.data {
                            RawImageData::Integer(values) => {
                                values.get(base + c).copied().unwrap_or(0) as f32
                            }
                            RawImageData::Float(values) => {
                                values.get(base + c).copied().unwrap_or(0.0)
                            }
                        };
                        pixels.push(levels.encode(levels.normalize(value, c), c));
                    }
                }
            }
            Ok(Bitmap::new(out_w as u32, out_h as u32, pixels))
        }
        cpp => Err(PipelineError::DecodeFailed(format!(
            "Unsupported components per pixel: {}",
            cpp
        ))),
    }
}

/// Smallest block step that keeps `extent / step` within `max`.
fn step_for(extent: usize, max: usize) -> usize {
    extent.div_ceil(max.max(1)).max(1)
}

/// Per-channel level scaling and white balance.
struct Levels {
    black: [f32; 4],
    range: [f32; 4],
    wb: [f32; 3],
    float_data: bool,
}

impl Levels {
    fn new(raw: &RawImage) -> Self {
        let mut black = [0f32; 4];
        let mut range = [1f32; 4];
        for c in 0..4 {
            black[c] = raw.blacklevels[c] as f32;
            range[c] = (raw.whitelevels[c] as f32 - black[c]).max(1.0);
        }

        // Normalize as-shot multipliers to green; NaN or zero means neutral
        let coeff = |i: usize| {
            let v = raw.wb_coeffs[i];
            if v.is_finite() && v > 0.0 {
                v
            } else {
                1.0
            }
        };
        let green = coeff(1);
        let wb = [coeff(0) / green, 1.0, coeff(2) / green];

        Self {
            black,
            range,
            wb,
            float_data: matches!(raw.data, RawImageData::Float(_)),
        }
    }

    fn normalize(&self, value: f32, color: usize) -> f32 {
        if self.float_data {
            return value;
        }
        let c = color.min(3);
        (value - self.black[c]) / self.range[c]
    }

    fn encode(&self, linear: f32, channel: usize) -> u8 {
        let balanced = (linear * self.wb[channel.min(2)]).clamp(0.0, 1.0);
        (balanced.powf(GAMMA) * 255.0).round() as u8
    }
}

fn orientation_of(raw: &RawImage) -> Option<Orientation> {
    use rawloader::Orientation as RawOrientation;

    match raw.orientation {
        RawOrientation::Normal | RawOrientation::Unknown => None,
        RawOrientation::HorizontalFlip => Some(Orientation::FlipHorizontal),
        RawOrientation::Rotate180 => Some(Orientation::Rotate180),
        RawOrientation::VerticalFlip => Some(Orientation::FlipVertical),
        RawOrientation::Transpose => Some(Orientation::Transpose),
        RawOrientation::Rotate90 => Some(Orientation::Rotate90CW),
        RawOrientation::Transverse => Some(Orientation::Transverse),
        RawOrientation::Rotate270 => Some(Orientation::Rotate270CW),
    }
}
