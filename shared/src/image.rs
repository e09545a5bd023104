/*!
Peak image reconstruction.

For every channel the peak is the mean of the samples after the right edge
minus the mean of the samples before the left edge. The decoder matrix places
bank-A peaks on a 16x16 grid, which is then mirrored left to right. An open
beam image can be divided out to correct per-channel gain.
*/

use crate::decoder::DecoderMatrix;
use crate::device::{IMAGE_SIZE, MAX_EDGE_INDEX};
use crate::error::{Result, SharedError};
use crate::trace::{mean, Bank, ChannelLabel, TraceRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Colour scale bounds for an image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayRange {
    pub low: f64,
    pub high: f64,
}

impl DisplayRange {
    /// Range used whenever the data range is not finite
    pub const UNIT: DisplayRange = DisplayRange { low: 0.0, high: 1.0 };
}

/// 16x16 grid of peak values or ratios
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakImage {
    pixels: [[f64; IMAGE_SIZE]; IMAGE_SIZE],
}

impl PeakImage {
    /// All-zero image, substituted when a build fails
    pub fn zeros() -> Self {
        Self {
            pixels: [[0.0; IMAGE_SIZE]; IMAGE_SIZE],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pixels[row][col]
    }

    pub fn rows(&self) -> &[[f64; IMAGE_SIZE]; IMAGE_SIZE] {
        &self.pixels
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.pixels.iter().flat_map(|row| row.iter().copied())
    }

    /// Smallest value; NaN if any cell is NaN
    pub fn min(&self) -> f64 {
        self.values().fold(f64::INFINITY, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.min(v)
            }
        })
    }

    /// Largest value; NaN if any cell is NaN
    pub fn max(&self) -> f64 {
        self.values().fold(f64::NEG_INFINITY, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        })
    }

    /// Data range, or [0, 1] if either bound is not finite
    pub fn display_range(&self) -> DisplayRange {
        let (low, high) = (self.min(), self.max());
        if low.is_finite() && high.is_finite() {
            DisplayRange { low, high }
        } else {
            DisplayRange::UNIT
        }
    }

    /// Mirror column order
    pub fn flip_horizontal(&mut self) {
        for row in self.pixels.iter_mut() {
            row.reverse();
        }
    }

    /// Elementwise ratio; a zero denominator yields NaN
    pub fn ratio(&self, denominator: &PeakImage) -> PeakImage {
        let mut out = PeakImage::zeros();
        for r in 0..IMAGE_SIZE {
            for c in 0..IMAGE_SIZE {
                let d = denominator.pixels[r][c];
                out.pixels[r][c] = if d == 0.0 {
                    f64::NAN
                } else {
                    self.pixels[r][c] / d
                };
            }
        }
        out
    }

    /// Clamp every value above 1 down to 1
    pub fn clamp_to_one(&mut self) {
        for v in self.pixels.iter_mut().flat_map(|row| row.iter_mut()) {
            if *v > 1.0 {
                *v = 1.0;
            }
        }
    }
}

impl Default for PeakImage {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Builds peak images for a validated edge window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageReconstructor {
    edge_left: usize,
    edge_right: usize,
}

impl ImageReconstructor {
    /// Validate `0 <= edge_left < edge_right <= 512`
    pub fn new(edge_left: usize, edge_right: usize) -> Result<Self> {
        if edge_left >= edge_right || edge_right > MAX_EDGE_INDEX {
            return Err(SharedError::InvalidEdgeWindow {
                left: edge_left,
                right: edge_right,
            });
        }
        Ok(Self {
            edge_left,
            edge_right,
        })
    }

    pub fn edge_left(&self) -> usize {
        self.edge_left
    }

    pub fn edge_right(&self) -> usize {
        self.edge_right
    }

    /// Baseline-subtracted peak of one channel. Empty windows give NaN.
    pub fn peak(&self, samples: &[f64]) -> f64 {
        let tail = samples.get(self.edge_right..).unwrap_or(&[]);
        let head = &samples[..self.edge_left.min(samples.len())];
        mean(tail) - mean(head)
    }

    /// Peaks of every label in the trace
    pub fn peaks(&self, trace: &TraceRecord) -> HashMap<String, f64> {
        trace
            .labels()
            .iter()
            .filter_map(|label| trace.get(label).map(|s| (label.clone(), self.peak(s))))
            .collect()
    }

    /// Place bank-A peaks by decoder matrix and mirror the grid
    pub fn build_peak_image(
        &self,
        trace: &TraceRecord,
        matrix: &DecoderMatrix,
    ) -> Result<PeakImage> {
        let peaks = self.peaks(trace);
        let mut image = PeakImage::zeros();

        for row in 0..IMAGE_SIZE {
            for col in 0..IMAGE_SIZE {
                let label = ChannelLabel::new(matrix.channel(row, col), Bank::A).to_string();
                let peak = peaks
                    .get(&label)
                    .ok_or_else(|| SharedError::MissingChannel(label.clone()))?;
                image.pixels[row][col] = *peak;
            }
        }

        image.flip_horizontal();
        debug!(
            "Built peak image (edges {}..{}), range {:?}",
            self.edge_left,
            self.edge_right,
            image.display_range()
        );
        Ok(image)
    }

    /// Divide the sample image by the open beam image
    pub fn build_normalized_image(
        &self,
        image_trace: &TraceRecord,
        open_beam_trace: &TraceRecord,
        matrix: &DecoderMatrix,
        clamp_to_one: bool,
    ) -> Result<PeakImage> {
        let image = self.build_peak_image(image_trace, matrix)?;
        let open_beam = self.build_peak_image(open_beam_trace, matrix)?;
        let mut normalized = image.ratio(&open_beam);
        if clamp_to_one {
            normalized.clamp_to_one();
        }
        Ok(normalized)
    }
}

/// Result of a build request: always an image, plus the failure if one occurred
#[derive(Debug)]
pub struct ImageOutcome {
    pub image: PeakImage,
    pub error: Option<SharedError>,
}

impl ImageOutcome {
    /// Substitute the all-zero image on failure
    pub fn from_result(result: Result<PeakImage>) -> Self {
        match result {
            Ok(image) => Self { image, error: None },
            Err(e) => {
                warn!("⚠️ Image build failed, showing empty image: {}", e);
                Self {
                    image: PeakImage::zeros(),
                    error: Some(e),
                }
            }
        }
    }

    pub fn display_range(&self) -> DisplayRange {
        self.image.display_range()
    }
}

/// Which trace file an input path feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Sample,
    OpenBeam,
}

/// Trace files selected for image building
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInputs {
    pub sample: Option<PathBuf>,
    pub open_beam: Option<PathBuf>,
}

impl ImageInputs {
    pub fn set(&mut self, slot: ImageSlot, path: impl Into<PathBuf>) {
        let path = Some(path.into());
        match slot {
            ImageSlot::Sample => self.sample = path,
            ImageSlot::OpenBeam => self.open_beam = path,
        }
    }

    pub fn get(&self, slot: ImageSlot) -> Option<&Path> {
        match slot {
            ImageSlot::Sample => self.sample.as_deref(),
            ImageSlot::OpenBeam => self.open_beam.as_deref(),
        }
    }

    /// Load the selected traces and build the requested image.
    /// Any failure yields the all-zero image with the error attached.
    pub fn build(
        &self,
        matrix: &DecoderMatrix,
        edge_left: usize,
        edge_right: usize,
        normalize: bool,
        clamp_to_one: bool,
    ) -> ImageOutcome {
        let result = self.try_build(matrix, edge_left, edge_right, normalize, clamp_to_one);
        ImageOutcome::from_result(result)
    }

    fn try_build(
        &self,
        matrix: &DecoderMatrix,
        edge_left: usize,
        edge_right: usize,
        normalize: bool,
        clamp_to_one: bool,
    ) -> Result<PeakImage> {
        let reconstructor = ImageReconstructor::new(edge_left, edge_right)?;
        if normalize {
            let (Some(sample), Some(open_beam)) = (&self.sample, &self.open_beam) else {
                return Err(SharedError::invalid_config(
                    "Please select both image and open beam files",
                ));
            };
            let sample = TraceRecord::from_file(sample)?;
            let open_beam = TraceRecord::from_file(open_beam)?;
            reconstructor.build_normalized_image(&sample, &open_beam, matrix, clamp_to_one)
        } else {
            let sample = self
                .sample
                .as_ref()
                .ok_or_else(|| SharedError::invalid_config("Please select image file"))?;
            reconstructor.build_peak_image(&TraceRecord::from_file(sample)?, matrix)
        }
    }
}
