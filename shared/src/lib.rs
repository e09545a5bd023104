/*!
# Shared Types and Utilities

This crate contains the acquisition and reconstruction core shared between the
DDC264 front-end tools.

## Core Types

- [`AcquisitionConfig`] - Validated instrument parameters
- [`RegisterMap`] - Encoded register bitmap for one acquisition
- [`AdcConverter`] - Raw count to physical unit conversion
- [`TraceRecord`] - Per-channel sample sequences from a trace file
- [`DecoderMatrix`] - Grid position to channel mapping
- [`PeakImage`] - Reconstructed 16x16 image

## Modules

- [`config`] - Instrument settings, enum tables and validation
- [`registers`] - Register bit layout and encoder
- [`adc`] - ADC count conversion
- [`hardware`] - Hardware collaborator contract
- [`trace`] - Trace file codec
- [`decoder`] - Decoder matrix loading
- [`image`] - Peak image reconstruction
- [`file_index`] - Resumable output file numbering
- [`error`] - Common error types
*/

pub mod adc;
pub mod config;
pub mod decoder;
pub mod error;
pub mod file_index;
pub mod hardware;
pub mod image;
pub mod registers;
pub mod trace;

// Re-export commonly used types
pub use adc::AdcConverter;
pub use config::{AcquisitionConfig, InstrumentSettings, SettingsField};
pub use decoder::DecoderMatrix;
pub use error::{Result, SharedError};
pub use file_index::FileIndexer;
pub use hardware::{DeviceStatus, HardwareInterface, RawCaptureBuffer};
pub use image::{DisplayRange, ImageInputs, ImageOutcome, ImageReconstructor, ImageSlot, PeakImage};
pub use registers::{RegisterEncoder, RegisterMap};
pub use trace::{Bank, ChannelLabel, TraceRecord};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Device constants
pub mod device {
    /// Number of addressable registers (0x00..=0xFE)
    pub const REGISTER_COUNT: usize = 255;

    /// Channels captured per bank in one sweep
    pub const CHANNELS_PER_BANK: usize = 256;

    /// Samples captured per bank and channel unless configured otherwise
    pub const DEFAULT_SAMPLES_PER_BANK: usize = 512;

    /// Hardware minimum for a conversion interval, in MCLK cycles
    pub const MIN_CONV_INTERVAL_CYCLES: u32 = 1600;

    /// Conversion wait written for both the low and the high phase
    pub const CONV_WAIT_CYCLES: u16 = 1550;

    /// Clock delay around conversion
    pub const CLOCK_DELAY_AROUND_CONV: u8 = 0;

    /// Default master clock frequency in MHz
    pub const DEFAULT_MCLK_MHZ: f64 = 80.0;

    /// Upper bound of the edge window, in samples
    pub const MAX_EDGE_INDEX: usize = 512;

    /// Side length of the reconstructed image
    pub const IMAGE_SIZE: usize = 16;
}
