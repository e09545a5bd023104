/*!
ADC count conversion.

A raw count maps linearly onto the configured full-scale range:
`physical = raw / (2^bits - 1) * range * range_scale`.
*/

use crate::config::{AdcRange, BitDepth};
use crate::error::{Result, SharedError};
use num_traits::ToPrimitive;

/// Converts raw device counts to physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcConverter {
    bit_depth: BitDepth,
    adc_range: AdcRange,
    range_scale: f64,
}

impl AdcConverter {
    pub fn new(bit_depth: BitDepth, adc_range: AdcRange, range_scale: f64) -> Self {
        Self {
            bit_depth,
            adc_range,
            range_scale,
        }
    }

    /// Build a converter from the encoded configuration bits
    pub fn from_codes(bit_depth_code: u8, range_bits: (u8, u8), range_scale: f64) -> Result<Self> {
        let bit_depth = BitDepth::from_code(bit_depth_code).ok_or_else(|| {
            SharedError::invalid_config(format!("undefined bit depth code {bit_depth_code}"))
        })?;
        let adc_range = AdcRange::from_bits(range_bits.0, range_bits.1).ok_or_else(|| {
            SharedError::invalid_config(format!("undefined ADC range bits {range_bits:?}"))
        })?;
        Ok(Self::new(bit_depth, adc_range, range_scale))
    }

    pub fn bits_per_sample(&self) -> u32 {
        self.bit_depth.bits_per_sample()
    }

    /// Largest representable count
    pub fn full_scale_count(&self) -> f64 {
        ((1u64 << self.bits_per_sample()) - 1) as f64
    }

    /// Physical value of a full-scale count
    pub fn full_scale(&self) -> f64 {
        self.adc_range.full_scale() * self.range_scale
    }

    /// Convert a raw count. Values that cannot be represented as f64 yield NaN.
    pub fn convert<T: ToPrimitive>(&self, raw: T) -> f64 {
        let raw = raw.to_f64().unwrap_or(f64::NAN);
        raw / self.full_scale_count() * self.full_scale()
    }

    /// Convert a slice of raw counts
    pub fn convert_all(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|&v| self.convert(v)).collect()
    }
}
