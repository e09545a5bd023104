/*!
Instrument parameters for the DDC264 front-end.

[`InstrumentSettings`] holds the values as an operator enters them (and as they
are stored in a configuration file). [`InstrumentSettings::to_acquisition_config`]
validates them up front and produces an immutable [`AcquisitionConfig`], which
is the only input the register encoder accepts.
*/

use crate::adc::AdcConverter;
use crate::device::{DEFAULT_MCLK_MHZ, MIN_CONV_INTERVAL_CYCLES};
use crate::error::{Result, SharedError};
use serde::{Deserialize, Serialize};

/// Conversion trigger mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvMode {
    FreeRun,
    Low,
    High,
}

impl ConvMode {
    /// Register code written to 0x57
    pub fn code(self) -> u8 {
        match self {
            Self::FreeRun => 0,
            Self::Low => 2,
            Self::High => 3,
        }
    }

    /// Inverse of [`ConvMode::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::FreeRun),
            2 => Some(Self::Low),
            3 => Some(Self::High),
            _ => None,
        }
    }

    /// Parse a front panel label (case-insensitive)
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free run" | "free_run" | "freerun" => Some(Self::FreeRun),
            "low" => Some(Self::Low),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FreeRun => "Free run",
            Self::Low => "Low",
            Self::High => "High",
        }
    }
}

/// Idle state of a clock line (DDC clock and DCLK share the encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    Running,
    Low,
}

impl ClockMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Running => 1,
            Self::Low => 0,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Running),
            0 => Some(Self::Low),
            _ => None,
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Low => "Low",
        }
    }
}

/// Hardware trigger input. Carried with the configuration but not encoded
/// into any register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareTrigger {
    Disabled,
    Enabled,
}

impl HardwareTrigger {
    pub fn code(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Some(Self::Disabled),
            "enabled" => Some(Self::Enabled),
            _ => None,
        }
    }
}

/// ADC full-scale range, in pC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdcRange {
    #[serde(rename = "12.5")]
    R12_5,
    #[serde(rename = "50.0")]
    R50,
    #[serde(rename = "100.0")]
    R100,
    #[serde(rename = "150.0")]
    R150,
}

impl AdcRange {
    /// Configuration bits (bit 10, bit 9) of the DDC configuration word
    pub fn bits(self) -> (u8, u8) {
        match self {
            Self::R12_5 => (0, 0),
            Self::R50 => (0, 1),
            Self::R100 => (1, 0),
            Self::R150 => (1, 1),
        }
    }

    /// Inverse of [`AdcRange::bits`]
    pub fn from_bits(bit10: u8, bit9: u8) -> Option<Self> {
        match (bit10, bit9) {
            (0, 0) => Some(Self::R12_5),
            (0, 1) => Some(Self::R50),
            (1, 0) => Some(Self::R100),
            (1, 1) => Some(Self::R150),
            _ => None,
        }
    }

    pub fn full_scale(self) -> f64 {
        match self {
            Self::R12_5 => 12.5,
            Self::R50 => 50.0,
            Self::R100 => 100.0,
            Self::R150 => 150.0,
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "12.5" => Some(Self::R12_5),
            "50" | "50.0" => Some(Self::R50),
            "100" | "100.0" => Some(Self::R100),
            "150" | "150.0" => Some(Self::R150),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::R12_5 => "12.5",
            Self::R50 => "50.0",
            Self::R100 => "100.0",
            Self::R150 => "150.0",
        }
    }
}

/// Bits-per-sample selection. The code is bit 8 of the configuration word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitDepth {
    Bits10,
    Bits20,
}

impl BitDepth {
    pub fn code(self) -> u8 {
        match self {
            Self::Bits10 => 0,
            Self::Bits20 => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Bits10),
            1 => Some(Self::Bits20),
            _ => None,
        }
    }

    pub fn bits_per_sample(self) -> u32 {
        match self {
            Self::Bits10 => 10,
            Self::Bits20 => 20,
        }
    }
}

impl TryFrom<u32> for BitDepth {
    type Error = String;

    fn try_from(bits: u32) -> std::result::Result<Self, Self::Error> {
        match bits {
            10 => Ok(Self::Bits10),
            20 => Ok(Self::Bits20),
            other => Err(format!("unsupported bit depth {other}, expected 10 or 20")),
        }
    }
}

impl From<BitDepth> for u32 {
    fn from(depth: BitDepth) -> Self {
        depth.bits_per_sample()
    }
}

/// Channel count to register code table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCodeTable {
    /// {16, 32, ..., 1024}, code = log2(count) capped at 8
    Capped,
    /// {1, 2, 4, ..., 1024} -> 0..=10 and 0 -> 11
    Extended,
}

impl ChannelCodeTable {
    /// Look up the register code for a channel count
    pub fn code(self, channel_count: u32) -> Result<u8> {
        match self {
            Self::Capped => {
                if (16..=1024).contains(&channel_count) && channel_count.is_power_of_two() {
                    Ok(channel_count.trailing_zeros().min(8) as u8)
                } else {
                    Err(SharedError::invalid_config(format!(
                        "channel count {channel_count} not in {{16, 32, ..., 1024}}"
                    )))
                }
            }
            Self::Extended => match channel_count {
                0 => Ok(11),
                n if n <= 1024 && n.is_power_of_two() => Ok(n.trailing_zeros() as u8),
                n => Err(SharedError::invalid_config(format!(
                    "channel count {n} not in {{0, 1, 2, ..., 1024}}"
                ))),
            },
        }
    }
}

/// Instrument parameters as entered by an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    /// Low-phase conversion interval, in entry units
    pub conv_low_interval: u32,

    /// High-phase conversion interval, in entry units
    pub conv_high_interval: u32,

    /// MCLK cycles per entry unit (1 = intervals are entered as cycles)
    pub interval_multiplier: u32,

    pub conv_mode: ConvMode,
    pub clk_high: u8,
    pub clk_low: u8,
    pub ddc_clk_mode: ClockMode,
    pub channel_count: u32,
    pub channel_table: ChannelCodeTable,
    /// Only the low byte reaches the register
    pub ndvalid_ignore: u32,
    pub ndvalid_read: u32,
    pub dclk_high: u8,
    pub dclk_low: u8,
    pub dclk_mode: ClockMode,
    pub dclk_wait: u16,
    pub hardware_trigger: HardwareTrigger,
    pub clk_cfg_high: u8,
    pub clk_cfg_low: u8,
    pub adc_range: AdcRange,
    pub bit_depth: BitDepth,

    /// Multiplier applied to the range value during conversion
    pub range_scale: f64,

    /// Master clock in MHz, used for interval durations only
    pub mclk_mhz: f64,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            conv_low_interval: 10000,
            conv_high_interval: 10000,
            interval_multiplier: 5,
            conv_mode: ConvMode::FreeRun,
            clk_high: 7,
            clk_low: 7,
            ddc_clk_mode: ClockMode::Running,
            channel_count: 256,
            channel_table: ChannelCodeTable::Capped,
            ndvalid_ignore: 255,
            ndvalid_read: 1024,
            dclk_high: 0,
            dclk_low: 0,
            dclk_mode: ClockMode::Running,
            dclk_wait: 13000,
            hardware_trigger: HardwareTrigger::Disabled,
            clk_cfg_high: 3,
            clk_cfg_low: 3,
            adc_range: AdcRange::R150,
            bit_depth: BitDepth::Bits20,
            range_scale: 1.0,
            mclk_mhz: DEFAULT_MCLK_MHZ,
        }
    }
}

/// Selector for a single settings field, so text input can be routed to a
/// field without naming it at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    ConvLowInterval,
    ConvHighInterval,
    IntervalMultiplier,
    ConvMode,
    ClkHigh,
    ClkLow,
    DdcClkMode,
    ChannelCount,
    NdvalidIgnore,
    NdvalidRead,
    DclkHigh,
    DclkLow,
    DclkMode,
    DclkWait,
    HardwareTrigger,
    ClkCfgHigh,
    ClkCfgLow,
    AdcRange,
    BitDepth,
}

impl SettingsField {
    pub const ALL: [SettingsField; 19] = [
        Self::ConvLowInterval,
        Self::ConvHighInterval,
        Self::IntervalMultiplier,
        Self::ConvMode,
        Self::ClkHigh,
        Self::ClkLow,
        Self::DdcClkMode,
        Self::ChannelCount,
        Self::NdvalidIgnore,
        Self::NdvalidRead,
        Self::DclkHigh,
        Self::DclkLow,
        Self::DclkMode,
        Self::DclkWait,
        Self::HardwareTrigger,
        Self::ClkCfgHigh,
        Self::ClkCfgLow,
        Self::AdcRange,
        Self::BitDepth,
    ];

    /// Parse a field name (case-insensitive)
    pub fn from_name(s: &str) -> Option<Self> {
        let name = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ConvLowInterval => "conv_low_interval",
            Self::ConvHighInterval => "conv_high_interval",
            Self::IntervalMultiplier => "interval_multiplier",
            Self::ConvMode => "conv_mode",
            Self::ClkHigh => "clk_high",
            Self::ClkLow => "clk_low",
            Self::DdcClkMode => "ddc_clk_mode",
            Self::ChannelCount => "channel_count",
            Self::NdvalidIgnore => "ndvalid_ignore",
            Self::NdvalidRead => "ndvalid_read",
            Self::DclkHigh => "dclk_high",
            Self::DclkLow => "dclk_low",
            Self::DclkMode => "dclk_mode",
            Self::DclkWait => "dclk_wait",
            Self::HardwareTrigger => "hardware_trigger",
            Self::ClkCfgHigh => "clk_cfg_high",
            Self::ClkCfgLow => "clk_cfg_low",
            Self::AdcRange => "adc_range",
            Self::BitDepth => "bit_depth",
        }
    }
}

fn parse_number<T: std::str::FromStr>(field: SettingsField, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        SharedError::invalid_config(format!("{}: '{}' is not a valid number", field.name(), value))
    })
}

fn parse_label<T>(field: SettingsField, value: &str, parsed: Option<T>) -> Result<T> {
    parsed.ok_or_else(|| {
        SharedError::invalid_config(format!("{}: unknown value '{}'", field.name(), value))
    })
}

impl InstrumentSettings {
    /// Set one field from its text form
    pub fn set(&mut self, field: SettingsField, value: &str) -> Result<()> {
        match field {
            SettingsField::ConvLowInterval => self.conv_low_interval = parse_number(field, value)?,
            SettingsField::ConvHighInterval => {
                self.conv_high_interval = parse_number(field, value)?
            }
            SettingsField::IntervalMultiplier => {
                self.interval_multiplier = parse_number(field, value)?
            }
            SettingsField::ConvMode => {
                self.conv_mode = parse_label(field, value, ConvMode::from_label(value))?
            }
            SettingsField::ClkHigh => self.clk_high = parse_number(field, value)?,
            SettingsField::ClkLow => self.clk_low = parse_number(field, value)?,
            SettingsField::DdcClkMode => {
                self.ddc_clk_mode = parse_label(field, value, ClockMode::from_label(value))?
            }
            SettingsField::ChannelCount => self.channel_count = parse_number(field, value)?,
            SettingsField::NdvalidIgnore => self.ndvalid_ignore = parse_number(field, value)?,
            SettingsField::NdvalidRead => self.ndvalid_read = parse_number(field, value)?,
            SettingsField::DclkHigh => self.dclk_high = parse_number(field, value)?,
            SettingsField::DclkLow => self.dclk_low = parse_number(field, value)?,
            SettingsField::DclkMode => {
                self.dclk_mode = parse_label(field, value, ClockMode::from_label(value))?
            }
            SettingsField::DclkWait => self.dclk_wait = parse_number(field, value)?,
            SettingsField::HardwareTrigger => {
                self.hardware_trigger =
                    parse_label(field, value, HardwareTrigger::from_label(value))?
            }
            SettingsField::ClkCfgHigh => self.clk_cfg_high = parse_number(field, value)?,
            SettingsField::ClkCfgLow => self.clk_cfg_low = parse_number(field, value)?,
            SettingsField::AdcRange => {
                self.adc_range = parse_label(field, value, AdcRange::from_label(value))?
            }
            SettingsField::BitDepth => {
                // Accept "20" as well as the panel label "20 bit"
                let digits = value.trim().trim_end_matches("bit").trim();
                let bits: u32 = parse_number(field, digits)?;
                self.bit_depth = BitDepth::try_from(bits).map_err(SharedError::invalid_config)?;
            }
        }
        Ok(())
    }

    /// Apply a `name=value` assignment
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            SharedError::invalid_config(format!("expected name=value, got '{assignment}'"))
        })?;
        let field = SettingsField::from_name(name).ok_or_else(|| {
            SharedError::invalid_config(format!("unknown field '{}'", name.trim()))
        })?;
        self.set(field, value)
    }

    /// Validate every field and build the immutable acquisition configuration
    pub fn to_acquisition_config(&self) -> Result<AcquisitionConfig> {
        if self.interval_multiplier == 0 {
            return Err(SharedError::invalid_config("interval_multiplier must be at least 1"));
        }
        let conv_low_interval = self.interval_cycles("conv_low_interval", self.conv_low_interval)?;
        let conv_high_interval =
            self.interval_cycles("conv_high_interval", self.conv_high_interval)?;

        for (name, value) in [
            ("clk_high", self.clk_high),
            ("clk_low", self.clk_low),
            ("dclk_high", self.dclk_high),
            ("dclk_low", self.dclk_low),
            ("clk_cfg_high", self.clk_cfg_high),
            ("clk_cfg_low", self.clk_cfg_low),
        ] {
            if value > 0xF {
                return Err(SharedError::invalid_config(format!(
                    "{name} must fit in 4 bits, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("ndvalid_ignore", self.ndvalid_ignore),
            ("ndvalid_read", self.ndvalid_read),
        ] {
            if value > 0xFF_FFFF {
                return Err(SharedError::invalid_config(format!(
                    "{name} must fit in 24 bits, got {value}"
                )));
            }
        }

        let channel_code = self.channel_table.code(self.channel_count)?;

        if !self.range_scale.is_finite() || self.range_scale <= 0.0 {
            return Err(SharedError::invalid_config(format!(
                "range_scale must be a positive number, got {}",
                self.range_scale
            )));
        }
        if !self.mclk_mhz.is_finite() || self.mclk_mhz <= 0.0 {
            return Err(SharedError::invalid_config(format!(
                "mclk_mhz must be a positive number, got {}",
                self.mclk_mhz
            )));
        }

        Ok(AcquisitionConfig {
            conv_low_interval,
            conv_high_interval,
            conv_mode: self.conv_mode,
            clk_high: self.clk_high,
            clk_low: self.clk_low,
            ddc_clk_mode: self.ddc_clk_mode,
            channel_count: self.channel_count,
            channel_code,
            ndvalid_ignore: self.ndvalid_ignore,
            ndvalid_read: self.ndvalid_read,
            dclk_high: self.dclk_high,
            dclk_low: self.dclk_low,
            dclk_mode: self.dclk_mode,
            dclk_wait: self.dclk_wait,
            hardware_trigger: self.hardware_trigger,
            clk_cfg_high: self.clk_cfg_high,
            clk_cfg_low: self.clk_cfg_low,
            adc_range: self.adc_range,
            bit_depth: self.bit_depth,
            range_scale: self.range_scale,
            mclk_mhz: self.mclk_mhz,
        })
    }

    fn interval_cycles(&self, name: &str, value: u32) -> Result<u32> {
        let cycles = value.checked_mul(self.interval_multiplier).ok_or_else(|| {
            SharedError::invalid_config(format!("{name} overflows: {value}"))
        })?;
        if cycles < MIN_CONV_INTERVAL_CYCLES {
            return Err(SharedError::invalid_config(format!(
                "{name} of {cycles} cycles is below the hardware minimum of \
                 {MIN_CONV_INTERVAL_CYCLES}"
            )));
        }
        // The interval is encoded as cycles - 1 in 24 bits
        if cycles - 1 > 0xFF_FFFF {
            return Err(SharedError::invalid_config(format!(
                "{name} of {cycles} cycles does not fit in 24 bits"
            )));
        }
        Ok(cycles)
    }
}

/// Validated, immutable instrument parameters. Interval values are in MCLK cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    conv_low_interval: u32,
    conv_high_interval: u32,
    conv_mode: ConvMode,
    clk_high: u8,
    clk_low: u8,
    ddc_clk_mode: ClockMode,
    channel_count: u32,
    channel_code: u8,
    ndvalid_ignore: u32,
    ndvalid_read: u32,
    dclk_high: u8,
    dclk_low: u8,
    dclk_mode: ClockMode,
    dclk_wait: u16,
    hardware_trigger: HardwareTrigger,
    clk_cfg_high: u8,
    clk_cfg_low: u8,
    adc_range: AdcRange,
    bit_depth: BitDepth,
    range_scale: f64,
    mclk_mhz: f64,
}

impl AcquisitionConfig {
    pub fn conv_low_interval(&self) -> u32 {
        self.conv_low_interval
    }

    pub fn conv_high_interval(&self) -> u32 {
        self.conv_high_interval
    }

    pub fn conv_mode(&self) -> ConvMode {
        self.conv_mode
    }

    pub fn clk_high(&self) -> u8 {
        self.clk_high
    }

    pub fn clk_low(&self) -> u8 {
        self.clk_low
    }

    pub fn ddc_clk_mode(&self) -> ClockMode {
        self.ddc_clk_mode
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Channel count code resolved through the configured table
    pub fn channel_code(&self) -> u8 {
        self.channel_code
    }

    pub fn ndvalid_ignore(&self) -> u32 {
        self.ndvalid_ignore
    }

    pub fn ndvalid_read(&self) -> u32 {
        self.ndvalid_read
    }

    pub fn dclk_high(&self) -> u8 {
        self.dclk_high
    }

    pub fn dclk_low(&self) -> u8 {
        self.dclk_low
    }

    pub fn dclk_mode(&self) -> ClockMode {
        self.dclk_mode
    }

    pub fn dclk_wait(&self) -> u16 {
        self.dclk_wait
    }

    pub fn hardware_trigger(&self) -> HardwareTrigger {
        self.hardware_trigger
    }

    pub fn clk_cfg_high(&self) -> u8 {
        self.clk_cfg_high
    }

    pub fn clk_cfg_low(&self) -> u8 {
        self.clk_cfg_low
    }

    pub fn adc_range(&self) -> AdcRange {
        self.adc_range
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn range_scale(&self) -> f64 {
        self.range_scale
    }

    /// Low-phase interval duration in microseconds
    pub fn conv_low_duration_us(&self) -> f64 {
        self.conv_low_interval as f64 / self.mclk_mhz
    }

    /// High-phase interval duration in microseconds
    pub fn conv_high_duration_us(&self) -> f64 {
        self.conv_high_interval as f64 / self.mclk_mhz
    }

    /// Converter for samples captured with this configuration
    pub fn adc_converter(&self) -> AdcConverter {
        AdcConverter::new(self.bit_depth, self.adc_range, self.range_scale)
    }
}
