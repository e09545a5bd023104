/*!
Contract of the hardware collaborator.

The vendor driver itself is not part of this crate. Anything that can write a
[`RegisterMap`] and return a two-bank sweep can drive an acquisition session.
*/

use crate::registers::RegisterMap;
use crate::trace::Bank;
use std::fmt;

/// Non-zero status code returned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus(pub i32);

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Blocking register-write and capture primitives
pub trait HardwareInterface: Send {
    /// Write every enabled register of `registers`
    fn write_registers(&mut self, registers: &RegisterMap) -> Result<(), DeviceStatus>;

    /// Capture one sweep of `channels` channels per bank
    fn capture(
        &mut self,
        channels: usize,
        samples_per_bank: usize,
    ) -> Result<RawCaptureBuffer, DeviceStatus>;
}

/// Raw counts of one sweep: two banks x channels x samples, bank-major
#[derive(Debug, Clone, PartialEq)]
pub struct RawCaptureBuffer {
    channels: usize,
    samples_per_bank: usize,
    data: Vec<f64>,
}

impl RawCaptureBuffer {
    /// Create a zero-filled buffer
    pub fn new(channels: usize, samples_per_bank: usize) -> Self {
        Self {
            channels,
            samples_per_bank,
            data: vec![0.0; 2 * channels * samples_per_bank],
        }
    }

    /// Wrap existing counts; `None` if the length does not match the shape
    pub fn from_vec(channels: usize, samples_per_bank: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != 2 * channels * samples_per_bank {
            return None;
        }
        Some(Self {
            channels,
            samples_per_bank,
            data,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples_per_bank(&self) -> usize {
        self.samples_per_bank
    }

    fn offset(&self, bank: Bank, channel: usize) -> usize {
        (bank.index() * self.channels + (channel - 1)) * self.samples_per_bank
    }

    /// Samples of a 1-based channel
    pub fn samples(&self, bank: Bank, channel: usize) -> &[f64] {
        let start = self.offset(bank, channel);
        &self.data[start..start + self.samples_per_bank]
    }

    /// Mutable samples of a 1-based channel
    pub fn samples_mut(&mut self, bank: Bank, channel: usize) -> &mut [f64] {
        let start = self.offset(bank, channel);
        let len = self.samples_per_bank;
        &mut self.data[start..start + len]
    }
}
