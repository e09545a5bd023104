/*!
DDC264 register bit layout and encoder.

[`RegisterEncoder::encode`] is a pure function from an [`AcquisitionConfig`] to
a fresh [`RegisterMap`]. Addresses not written by the encoder stay disabled.
*/

use crate::config::AcquisitionConfig;
use crate::device::{CLOCK_DELAY_AROUND_CONV, CONV_WAIT_CYCLES, REGISTER_COUNT};
use std::fmt;
use tracing::warn;

/// Register addresses
pub mod addr {
    pub const CONV_LOW_INT: [u8; 3] = [0x01, 0x02, 0x03];
    pub const CONV_HIGH_INT: [u8; 3] = [0x04, 0x05, 0x06];
    pub const CLK: u8 = 0x07;
    pub const DDC_CLK_CONFIG: u8 = 0x08;
    pub const FORMAT_CHANNELS: u8 = 0x09;
    pub const DCLK: u8 = 0x0A;
    pub const DCLK_CONFIG: u8 = 0x0B;
    pub const NDVALID_IGNORE: u8 = 0x0C;
    /// Low, mid, high byte
    pub const NDVALID_READ: [u8; 3] = [0x0D, 0x0E, 0x0F];
    pub const DCLK_WAIT: [u8; 2] = [0x13, 0x14];
    pub const FORMAT: u8 = 0x1F;
    pub const CLK_CFG: u8 = 0x20;
    pub const CONV_WAIT_LOW: [u8; 2] = [0x51, 0x52];
    pub const CONV_WAIT_HIGH: [u8; 2] = [0x53, 0x54];
    pub const CONV_CONFIG: u8 = 0x57;
    pub const CLKDELAY_AROUND_CONV: u8 = 0xEB;
}

/// Ordered register address -> (value, enabled) table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    values: [u8; REGISTER_COUNT],
    enabled: [bool; REGISTER_COUNT],
}

impl RegisterMap {
    /// Create a map with every register disabled
    pub fn new() -> Self {
        Self {
            values: [0; REGISTER_COUNT],
            enabled: [false; REGISTER_COUNT],
        }
    }

    /// Write a register, keeping only the low 8 bits of `value`.
    /// Returns false (and writes nothing) for an address past the register file.
    pub fn set(&mut self, address: u8, value: u32) -> bool {
        let idx = address as usize;
        if idx >= REGISTER_COUNT {
            warn!("Register 0x{:02X} is outside the register file, not written", address);
            return false;
        }
        self.values[idx] = (value & 0xFF) as u8;
        self.enabled[idx] = true;
        true
    }

    /// Value of an enabled register
    pub fn get(&self, address: u8) -> Option<u8> {
        let idx = address as usize;
        if idx < REGISTER_COUNT && self.enabled[idx] {
            Some(self.values[idx])
        } else {
            None
        }
    }

    pub fn is_enabled(&self, address: u8) -> bool {
        self.get(address).is_some()
    }

    /// Enabled registers in address order
    pub fn entries(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.enabled
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(idx, _)| (idx as u8, self.values[idx]))
    }

    /// Number of enabled registers
    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|&&on| on).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reassemble consecutive registers as a big-endian value
    pub fn read_be(&self, addresses: &[u8]) -> Option<u32> {
        addresses
            .iter()
            .try_fold(0u32, |acc, &a| self.get(a).map(|b| (acc << 8) | b as u32))
    }

    /// Value and enable arrays in the layout a register-write primitive takes
    pub fn to_driver_arrays(&self) -> (Vec<i32>, Vec<i32>) {
        let values = self.values.iter().map(|&v| v as i32).collect();
        let enable = self.enabled.iter().map(|&on| on as i32).collect();
        (values, enable)
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegisterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (address, value) in self.entries() {
            writeln!(f, "0x{address:02X} = 0x{value:02X}")?;
        }
        Ok(())
    }
}

/// DDC264 configuration word. Only the range and bit-depth bits are variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdcConfigWord {
    pub clkdiv: u8,
    pub range_hi: u8,
    pub range_lo: u8,
    pub bit_depth: u8,
    pub speed: u8,
    pub slew: u8,
    pub test: u8,
}

impl DdcConfigWord {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        let (range_hi, range_lo) = config.adc_range().bits();
        Self {
            clkdiv: 0,
            range_hi,
            range_lo,
            bit_depth: config.bit_depth().code(),
            speed: 0,
            slew: 0,
            test: 0,
        }
    }

    /// Bits 15:8
    pub fn high(&self) -> u8 {
        (self.clkdiv << 5) | (self.range_hi << 2) | (self.range_lo << 1) | self.bit_depth
    }

    /// Bits 7:0
    pub fn low(&self) -> u8 {
        (self.speed << 7) | (self.slew << 4) | self.test
    }

    /// Format bit written to 0x09 and 0x1F
    pub fn format(&self) -> u8 {
        self.high() & 1
    }
}

fn nibbles(high: u8, low: u8) -> u32 {
    ((high as u32) << 4) | (low as u32 & 0x0F)
}

/// Builds register maps from acquisition configurations
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterEncoder;

impl RegisterEncoder {
    /// Encode a configuration into a fresh register map
    pub fn encode(config: &AcquisitionConfig) -> RegisterMap {
        let mut map = RegisterMap::new();

        let conv_low = config.conv_low_interval() - 1;
        map.set(addr::CONV_LOW_INT[0], conv_low >> 16);
        map.set(addr::CONV_LOW_INT[1], conv_low >> 8);
        map.set(addr::CONV_LOW_INT[2], conv_low);

        let conv_high = config.conv_high_interval() - 1;
        map.set(addr::CONV_HIGH_INT[0], conv_high >> 16);
        map.set(addr::CONV_HIGH_INT[1], conv_high >> 8);
        map.set(addr::CONV_HIGH_INT[2], conv_high);

        map.set(addr::CLK, nibbles(config.clk_high(), config.clk_low()));
        map.set(addr::DDC_CLK_CONFIG, config.ddc_clk_mode().code() as u32);

        let format = DdcConfigWord::from_config(config).format() as u32;
        map.set(
            addr::FORMAT_CHANNELS,
            (format << 4) | (config.channel_code() as u32 & 0x0F),
        );

        map.set(addr::DCLK, nibbles(config.dclk_high(), config.dclk_low()));
        map.set(addr::DCLK_CONFIG, config.dclk_mode().code() as u32);

        map.set(addr::NDVALID_IGNORE, config.ndvalid_ignore());
        let ndvalid_read = config.ndvalid_read();
        map.set(addr::NDVALID_READ[0], ndvalid_read);
        map.set(addr::NDVALID_READ[1], ndvalid_read >> 8);
        map.set(addr::NDVALID_READ[2], ndvalid_read >> 16);

        let dclk_wait = config.dclk_wait() as u32;
        map.set(addr::DCLK_WAIT[0], dclk_wait >> 8);
        map.set(addr::DCLK_WAIT[1], dclk_wait);

        map.set(addr::FORMAT, format);
        map.set(addr::CLK_CFG, nibbles(config.clk_cfg_high(), config.clk_cfg_low()));

        let conv_wait = CONV_WAIT_CYCLES as u32;
        map.set(addr::CONV_WAIT_LOW[0], conv_wait >> 8);
        map.set(addr::CONV_WAIT_LOW[1], conv_wait);
        map.set(addr::CONV_WAIT_HIGH[0], conv_wait >> 8);
        map.set(addr::CONV_WAIT_HIGH[1], conv_wait);

        map.set(addr::CONV_CONFIG, config.conv_mode().code() as u32);
        map.set(addr::CLKDELAY_AROUND_CONV, CLOCK_DELAY_AROUND_CONV as u32);

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AdcRange, BitDepth, ChannelCodeTable, ClockMode, ConvMode, InstrumentSettings,
    };

    fn plain_settings() -> InstrumentSettings {
        InstrumentSettings {
            interval_multiplier: 1,
            conv_low_interval: 1601,
            conv_high_interval: 2000,
            ..InstrumentSettings::default()
        }
    }

    fn encode(settings: &InstrumentSettings) -> RegisterMap {
        RegisterEncoder::encode(&settings.to_acquisition_config().unwrap())
    }

    /// Addresses whose enabled value differs between two maps
    fn changed(a: &RegisterMap, b: &RegisterMap) -> Vec<u8> {
        (0..REGISTER_COUNT as u8)
            .filter(|&address| a.get(address) != b.get(address))
            .collect()
    }

    #[test]
    fn test_conv_interval_big_endian() {
        let map = encode(&plain_settings());
        assert_eq!(map.read_be(&addr::CONV_LOW_INT), Some(1600));
        assert_eq!(map.read_be(&addr::CONV_HIGH_INT), Some(1999));
        assert_eq!(map.get(0x01), Some(0x00));
        assert_eq!(map.get(0x02), Some(0x06));
        assert_eq!(map.get(0x03), Some(0x40));
    }

    #[test]
    fn test_default_layout() {
        let map = encode(&InstrumentSettings::default());

        assert_eq!(map.get(addr::CLK), Some(0x77));
        assert_eq!(map.get(addr::DDC_CLK_CONFIG), Some(1));
        // 20 bit -> format 1, 256 channels -> code 8
        assert_eq!(map.get(addr::FORMAT_CHANNELS), Some(0x18));
        assert_eq!(map.get(addr::DCLK), Some(0x00));
        assert_eq!(map.get(addr::DCLK_CONFIG), Some(1));
        assert_eq!(map.get(addr::NDVALID_IGNORE), Some(255));
        // 1024 = 0x000400, written low byte first
        assert_eq!(map.get(0x0D), Some(0x00));
        assert_eq!(map.get(0x0E), Some(0x04));
        assert_eq!(map.get(0x0F), Some(0x00));
        assert_eq!(map.read_be(&addr::DCLK_WAIT), Some(13000));
        assert_eq!(map.get(addr::FORMAT), Some(1));
        assert_eq!(map.get(addr::CLK_CFG), Some(0x33));
        assert_eq!(map.read_be(&addr::CONV_WAIT_LOW), Some(1550));
        assert_eq!(map.read_be(&addr::CONV_WAIT_HIGH), Some(1550));
        assert_eq!(map.get(addr::CONV_CONFIG), Some(0));
        assert_eq!(map.get(addr::CLKDELAY_AROUND_CONV), Some(0));

        assert_eq!(map.len(), 25);
        assert!(!map.is_enabled(0x00));
        assert!(!map.is_enabled(0x10));
        assert!(!map.is_enabled(0xFE));
    }

    #[test]
    fn test_encode_is_idempotent() {
        let config = InstrumentSettings::default().to_acquisition_config().unwrap();
        assert_eq!(RegisterEncoder::encode(&config), RegisterEncoder::encode(&config));
    }

    #[test]
    fn test_single_field_changes_only_its_registers() {
        let base = plain_settings();
        let base_map = encode(&base);

        let mut s = base.clone();
        s.conv_low_interval = 70000;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x01, 0x02, 0x03]);

        let mut s = base.clone();
        s.conv_high_interval = 70000;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x04, 0x05, 0x06]);

        let mut s = base.clone();
        s.clk_low = 2;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x07]);

        let mut s = base.clone();
        s.channel_count = 64;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x09]);

        let mut s = base.clone();
        s.bit_depth = BitDepth::Bits10;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x09, 0x1F]);

        let mut s = base.clone();
        s.ndvalid_read = 0x123456;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x0D, 0x0E, 0x0F]);

        let mut s = base.clone();
        s.dclk_wait = 1;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x13, 0x14]);

        let mut s = base.clone();
        s.conv_mode = ConvMode::High;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x57]);

        let mut s = base.clone();
        s.clk_cfg_high = 1;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x20]);

        let mut s = base.clone();
        s.clk_cfg_low = 9;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x20]);

        let mut s = base.clone();
        s.ddc_clk_mode = ClockMode::Low;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x08]);

        let mut s = base.clone();
        s.dclk_high = 4;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x0A]);

        let mut s = base.clone();
        s.dclk_low = 6;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x0A]);

        let mut s = base.clone();
        s.dclk_mode = ClockMode::Low;
        assert_eq!(changed(&base_map, &encode(&s)), vec![0x0B]);

        // Only the low byte of 1000 (0x3E8) is written
        let mut s = base.clone();
        s.ndvalid_ignore = 1000;
        let map = encode(&s);
        assert_eq!(map.get(addr::NDVALID_IGNORE), Some(0xE8));
        assert_eq!(changed(&base_map, &map), vec![0x0C]);

        // Range bits do not reach the format bit
        let mut s = base.clone();
        s.adc_range = AdcRange::R12_5;
        assert!(changed(&base_map, &encode(&s)).is_empty());
    }

    #[test]
    fn test_extended_channel_table() {
        let mut s = plain_settings();
        s.channel_table = ChannelCodeTable::Extended;
        s.channel_count = 0;
        let map = encode(&s);
        assert_eq!(map.get(addr::FORMAT_CHANNELS), Some(0x1B));
    }

    #[test]
    fn test_values_masked_to_byte() {
        let mut map = RegisterMap::new();
        assert!(map.set(0x10, 0x1234));
        assert_eq!(map.get(0x10), Some(0x34));
        assert!(!map.set(0xFF, 1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_address_constants_inside_register_file() {
        let mut addresses = vec![
            addr::CLK,
            addr::DDC_CLK_CONFIG,
            addr::FORMAT_CHANNELS,
            addr::DCLK,
            addr::DCLK_CONFIG,
            addr::NDVALID_IGNORE,
            addr::FORMAT,
            addr::CLK_CFG,
            addr::CONV_CONFIG,
            addr::CLKDELAY_AROUND_CONV,
        ];
        addresses.extend(addr::CONV_LOW_INT);
        addresses.extend(addr::CONV_HIGH_INT);
        addresses.extend(addr::NDVALID_READ);
        addresses.extend(addr::DCLK_WAIT);
        addresses.extend(addr::CONV_WAIT_LOW);
        addresses.extend(addr::CONV_WAIT_HIGH);

        let mut map = RegisterMap::new();
        for address in &addresses {
            assert!(map.set(*address, 0), "0x{address:02X} rejected");
        }
        assert_eq!(map.len(), encode(&InstrumentSettings::default()).len());
    }

    #[test]
    fn test_config_word() {
        let config = InstrumentSettings::default().to_acquisition_config().unwrap();
        let word = DdcConfigWord::from_config(&config);
        assert_eq!(word.high(), 0b0000_0111);
        assert_eq!(word.low(), 0);
        assert_eq!(word.format(), 1);
    }

    #[test]
    fn test_driver_arrays() {
        let map = encode(&InstrumentSettings::default());
        let (values, enable) = map.to_driver_arrays();
        assert_eq!(values.len(), REGISTER_COUNT);
        assert_eq!(enable.len(), REGISTER_COUNT);
        assert_eq!(values[0x07], 0x77);
        assert_eq!(enable[0x07], 1);
        assert_eq!(enable[0x00], 0);
    }
}
