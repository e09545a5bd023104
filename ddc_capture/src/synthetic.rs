/*!
Synthetic DDC264 device.

Stands in for the vendor driver: register writes are recorded and every
capture returns a step-shaped sweep, so the whole acquire, persist and image
pipeline can run without hardware attached.
*/

use shared::{Bank, DeviceStatus, HardwareInterface, RawCaptureBuffer, RegisterMap};
use std::collections::HashSet;
use tracing::debug;

/// Status code reported for an injected failure
pub const INJECTED_FAILURE_STATUS: i32 = -1;

/// Fake device producing a baseline then a plateau per channel
#[derive(Debug, Clone)]
pub struct SyntheticDevice {
    /// Sample index where the plateau starts
    step_at: usize,
    /// Plateau height per channel number, in raw counts
    counts_per_channel: f64,
    baseline: f64,
    ripple: f64,
    fail_writes: HashSet<u32>,
    fail_captures: HashSet<u32>,
    write_calls: u32,
    capture_calls: u32,
    last_registers: Option<RegisterMap>,
}

impl SyntheticDevice {
    pub fn new() -> Self {
        Self {
            step_at: 256,
            counts_per_channel: 1000.0,
            baseline: 500.0,
            ripple: 25.0,
            fail_writes: HashSet::new(),
            fail_captures: HashSet::new(),
            write_calls: 0,
            capture_calls: 0,
            last_registers: None,
        }
    }

    /// Move the plateau start
    pub fn with_step_at(mut self, sample: usize) -> Self {
        self.step_at = sample;
        self
    }

    /// Amplitude of the deterministic ripple (0 for flat levels)
    pub fn with_ripple(mut self, ripple: f64) -> Self {
        self.ripple = ripple;
        self
    }

    /// Fail the given 1-based register write calls
    pub fn fail_writes(mut self, calls: impl IntoIterator<Item = u32>) -> Self {
        self.fail_writes.extend(calls);
        self
    }

    /// Fail the given 1-based capture calls
    pub fn fail_captures(mut self, calls: impl IntoIterator<Item = u32>) -> Self {
        self.fail_captures.extend(calls);
        self
    }

    pub fn write_calls(&self) -> u32 {
        self.write_calls
    }

    pub fn capture_calls(&self) -> u32 {
        self.capture_calls
    }

    pub fn last_registers(&self) -> Option<&RegisterMap> {
        self.last_registers.as_ref()
    }

    fn sample(&self, bank: Bank, channel: usize, index: usize) -> f64 {
        let level = if index < self.step_at {
            self.baseline
        } else {
            self.baseline + self.counts_per_channel * channel as f64
        };
        let phase = (index * 7 + channel * 13 + bank.index() * 29) as f64 * 0.1;
        level + self.ripple * phase.sin()
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareInterface for SyntheticDevice {
    fn write_registers(&mut self, registers: &RegisterMap) -> Result<(), DeviceStatus> {
        self.write_calls += 1;
        if self.fail_writes.contains(&self.write_calls) {
            return Err(DeviceStatus(INJECTED_FAILURE_STATUS));
        }
        debug!("🧪 Synthetic device accepted {} registers", registers.len());
        self.last_registers = Some(registers.clone());
        Ok(())
    }

    fn capture(
        &mut self,
        channels: usize,
        samples_per_bank: usize,
    ) -> Result<RawCaptureBuffer, DeviceStatus> {
        self.capture_calls += 1;
        if self.fail_captures.contains(&self.capture_calls) {
            return Err(DeviceStatus(INJECTED_FAILURE_STATUS));
        }

        let mut buffer = RawCaptureBuffer::new(channels, samples_per_bank);
        for bank in Bank::ALL {
            for channel in 1..=channels {
                for (i, value) in buffer.samples_mut(bank, channel).iter_mut().enumerate() {
                    *value = self.sample(bank, channel, i);
                }
            }
        }
        debug!(
            "🧪 Generated synthetic sweep {} ({} channels x {} samples)",
            self.capture_calls, channels, samples_per_bank
        );
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_shape() {
        let mut device = SyntheticDevice::new().with_step_at(4).with_ripple(0.0);
        let buffer = device.capture(3, 8).unwrap();

        assert_eq!(
            buffer.samples(Bank::A, 2),
            &[500.0, 500.0, 500.0, 500.0, 2500.0, 2500.0, 2500.0, 2500.0]
        );
        assert_eq!(buffer.samples(Bank::B, 3)[7], 3500.0);
    }

    #[test]
    fn test_deterministic() {
        let mut a = SyntheticDevice::new();
        let mut b = SyntheticDevice::new();
        assert_eq!(a.capture(4, 16).unwrap(), b.capture(4, 16).unwrap());
    }

    #[test]
    fn test_injected_failures() {
        let mut device = SyntheticDevice::new().fail_writes([2]).fail_captures([1]);
        let registers = RegisterMap::new();

        assert!(device.write_registers(&registers).is_ok());
        assert_eq!(
            device.write_registers(&registers),
            Err(DeviceStatus(INJECTED_FAILURE_STATUS))
        );
        assert!(device.write_registers(&registers).is_ok());
        assert_eq!(device.write_calls(), 3);

        assert!(device.capture(2, 2).is_err());
        assert!(device.capture(2, 2).is_ok());
        assert_eq!(device.capture_calls(), 2);
    }
}
