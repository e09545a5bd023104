/*!
Trace file codec.

A trace file holds one line per (bank, channel, sample):

```text
07A, 0, 1.25, 0, 0, 20
```

The first field is the channel label (zero-padded channel number plus bank
suffix), the third the physical value and the sixth the bits per sample. Lines
are grouped by label in file order when read back.
*/

use crate::adc::AdcConverter;
use crate::error::{Result, SharedError};
use crate::hardware::RawCaptureBuffer;
use std::collections::HashMap;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Capture bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bank {
    A,
    B,
}

impl Bank {
    pub const ALL: [Bank; 2] = [Bank::A, Bank::B];

    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
        }
    }

    pub fn from_suffix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            _ => None,
        }
    }
}

/// Channel number plus bank, printed as at least two digits and the bank suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLabel {
    pub channel: u16,
    pub bank: Bank,
}

impl ChannelLabel {
    pub fn new(channel: u16, bank: Bank) -> Self {
        Self { channel, bank }
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{}", self.channel, self.bank.suffix())
    }
}

impl FromStr for ChannelLabel {
    type Err = SharedError;

    /// Accepts padded and unpadded labels ("07A", "7A", "256B")
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bank = s
            .chars()
            .last()
            .and_then(Bank::from_suffix)
            .ok_or_else(|| SharedError::file_format(format!("invalid channel label '{s}'")))?;
        let channel = s[..s.len() - 1]
            .parse::<u16>()
            .map_err(|_| SharedError::file_format(format!("invalid channel label '{s}'")))?;
        Ok(Self { channel, bank })
    }
}

/// Per-label ordered samples in physical units
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceRecord {
    labels: Vec<String>,
    samples: HashMap<String, Vec<f64>>,
    bits_per_sample: Option<u32>,
}

impl TraceRecord {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to a label, creating the label on first use
    pub fn push(&mut self, label: &str, value: f64) {
        match self.samples.get_mut(label) {
            Some(values) => values.push(value),
            None => {
                self.labels.push(label.to_string());
                self.samples.insert(label.to_string(), vec![value]);
            }
        }
    }

    /// Convert a capture buffer: banks A then B, channels descending, samples ascending
    pub fn from_capture(buffer: &RawCaptureBuffer, converter: &AdcConverter) -> Self {
        let mut record = Self {
            bits_per_sample: Some(converter.bits_per_sample()),
            ..Self::default()
        };
        for bank in Bank::ALL {
            for channel in (1..=buffer.channels()).rev() {
                let label = ChannelLabel::new(channel as u16, bank).to_string();
                let values = converter.convert_all(buffer.samples(bank, channel));
                record.labels.push(label.clone());
                record.samples.insert(label, values);
            }
        }
        record
    }

    /// Parse trace text
    pub fn parse(text: &str) -> Result<Self> {
        let mut record = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 3 || fields[0].is_empty() {
                return Err(SharedError::file_format(format!(
                    "line {}: expected at least 3 comma-separated fields",
                    line_no + 1
                )));
            }
            let value = fields[2].parse::<f64>().map_err(|_| {
                SharedError::file_format(format!(
                    "line {}: '{}' is not a number",
                    line_no + 1,
                    fields[2]
                ))
            })?;
            if record.bits_per_sample.is_none() {
                record.bits_per_sample = fields.get(5).and_then(|b| b.parse().ok());
            }
            record.push(fields[0], value);
        }
        Ok(record)
    }

    /// Load a trace file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Write the record in trace format, labels in record order
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        let bits = self.bits_per_sample.unwrap_or(0);
        for label in &self.labels {
            for value in &self.samples[label] {
                writeln!(writer, "{label}, 0, {value}, 0, 0, {bits}")?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the record to a file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_to(std::fs::File::create(path)?)
    }

    /// Labels in first-seen order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Samples stored under an exact label
    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.samples.get(label).map(Vec::as_slice)
    }

    /// Samples for a user label, padding the channel number ("7A" finds "07A")
    pub fn channel(&self, label: &str) -> Option<&[f64]> {
        if let Some(values) = self.get(label.trim()) {
            return Some(values);
        }
        let normalized = label.parse::<ChannelLabel>().ok()?.to_string();
        self.get(&normalized)
    }

    pub fn bits_per_sample(&self) -> Option<u32> {
        self.bits_per_sample
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Mean of every channel ordered by bank, then channel number.
    /// Labels that do not parse as channel labels are skipped.
    pub fn channel_means(&self) -> Vec<(ChannelLabel, f64)> {
        let mut means: Vec<(ChannelLabel, f64)> = self
            .labels
            .iter()
            .filter_map(|label| {
                let parsed = label.parse::<ChannelLabel>().ok()?;
                Some((parsed, mean(&self.samples[label])))
            })
            .collect();
        means.sort_by_key(|(label, _)| (label.bank, label.channel));
        means
    }
}

/// Arithmetic mean; NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdcRange, BitDepth};
    use tempfile::tempdir;

    #[test]
    fn test_label_format() {
        assert_eq!(ChannelLabel::new(7, Bank::A).to_string(), "07A");
        assert_eq!(ChannelLabel::new(42, Bank::B).to_string(), "42B");
        assert_eq!(ChannelLabel::new(256, Bank::A).to_string(), "256A");

        assert_eq!("7A".parse::<ChannelLabel>().unwrap(), ChannelLabel::new(7, Bank::A));
        assert_eq!("07b".parse::<ChannelLabel>().unwrap(), ChannelLabel::new(7, Bank::B));
        assert!("07C".parse::<ChannelLabel>().is_err());
        assert!("A".parse::<ChannelLabel>().is_err());
    }

    #[test]
    fn test_parse_groups_by_label() {
        let text = "02A, 0, 1.5, 0, 0, 20\n01A, 0, 2.0, 0, 0, 20\n02A, 0, 3.5, 0, 0, 20\n\n";
        let record = TraceRecord::parse(text).unwrap();

        assert_eq!(record.labels(), &["02A".to_string(), "01A".to_string()]);
        assert_eq!(record.get("02A"), Some(&[1.5, 3.5][..]));
        assert_eq!(record.get("01A"), Some(&[2.0][..]));
        assert_eq!(record.bits_per_sample(), Some(20));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(matches!(
            TraceRecord::parse("01A, 0, abc, 0, 0, 20"),
            Err(SharedError::FileFormat(_))
        ));
        assert!(matches!(
            TraceRecord::parse("01A 0 1.0"),
            Err(SharedError::FileFormat(_))
        ));
    }

    #[test]
    fn test_from_capture_order_and_conversion() {
        let mut buffer = RawCaptureBuffer::new(3, 2);
        buffer.samples_mut(Bank::A, 3).copy_from_slice(&[0.0, 1023.0]);
        let adc = AdcConverter::new(BitDepth::Bits10, AdcRange::R50, 1.0);

        let record = TraceRecord::from_capture(&buffer, &adc);
        let labels: Vec<&str> = record.labels().iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["03A", "02A", "01A", "03B", "02B", "01B"]);
        assert_eq!(record.get("03A"), Some(&[0.0, 50.0][..]));
        assert_eq!(record.bits_per_sample(), Some(10));
    }

    #[test]
    fn test_write_line_format() {
        let mut record = TraceRecord::new();
        record.bits_per_sample = Some(20);
        record.push("07A", 1.25);

        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "07A, 0, 1.25, 0, 0, 20\n");
    }

    #[test]
    fn test_file_roundtrip() {
        let mut buffer = RawCaptureBuffer::new(4, 5);
        for (i, bank) in Bank::ALL.into_iter().enumerate() {
            for channel in 1..=4 {
                for (s, v) in buffer.samples_mut(bank, channel).iter_mut().enumerate() {
                    *v = (i * 1000 + channel * 10 + s) as f64 * 0.7;
                }
            }
        }
        let adc = AdcConverter::new(BitDepth::Bits20, AdcRange::R150, 1e-12);
        let record = TraceRecord::from_capture(&buffer, &adc);

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("run_1.txt");
        record.save(&path).unwrap();
        let loaded = TraceRecord::from_file(&path).unwrap();

        assert_eq!(loaded.labels(), record.labels());
        for label in record.labels() {
            assert_eq!(loaded.get(label), record.get(label));
        }
    }

    #[test]
    fn test_channel_lookup_and_means() {
        let text = "10B, 0, 4.0, 0, 0, 20\n\
                    02A, 0, 1.0, 0, 0, 20\n\
                    02A, 0, 3.0, 0, 0, 20\n\
                    10A, 0, 5.0, 0, 0, 20\n";
        let record = TraceRecord::parse(text).unwrap();

        assert_eq!(record.channel("2A"), Some(&[1.0, 3.0][..]));
        assert_eq!(record.channel("10B"), Some(&[4.0][..]));
        assert_eq!(record.channel("3A"), None);

        let means = record.channel_means();
        let order: Vec<String> = means.iter().map(|(l, _)| l.to_string()).collect();
        assert_eq!(order, vec!["02A", "10A", "10B"]);
        assert_eq!(means[0].1, 2.0);
    }

    #[test]
    fn test_mean_of_empty_is_nan() {
        assert!(mean(&[]).is_nan());
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }
}
