/*!
Decoder matrix: grid position to device channel number.

The file is 16 lines of 16 whitespace-separated integers, row-major. Channel
numbers are not checked against any trace here; a channel absent from the
trace is reported when an image is built.
*/

use crate::device::IMAGE_SIZE;
use crate::error::{Result, SharedError};
use std::path::Path;

/// Fixed 16x16 grid of channel numbers (0 is the unused sentinel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderMatrix {
    grid: [[u16; IMAGE_SIZE]; IMAGE_SIZE],
}

impl DecoderMatrix {
    /// Build a matrix from an explicit grid
    pub fn from_grid(grid: [[u16; IMAGE_SIZE]; IMAGE_SIZE]) -> Self {
        Self { grid }
    }

    /// Parse decoder matrix text. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut grid = [[0u16; IMAGE_SIZE]; IMAGE_SIZE];
        let mut rows = 0;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if rows == IMAGE_SIZE {
                return Err(SharedError::file_format(format!(
                    "decoder matrix has more than {IMAGE_SIZE} rows"
                )));
            }
            let values = line
                .split_whitespace()
                .map(|v| {
                    v.parse::<u16>().map_err(|_| {
                        SharedError::file_format(format!(
                            "decoder matrix row {}: '{}' is not a channel number",
                            rows + 1,
                            v
                        ))
                    })
                })
                .collect::<Result<Vec<u16>>>()?;
            if values.len() != IMAGE_SIZE {
                return Err(SharedError::file_format(format!(
                    "decoder matrix row {} has {} values, expected {IMAGE_SIZE}",
                    rows + 1,
                    values.len()
                )));
            }
            grid[rows].copy_from_slice(&values);
            rows += 1;
        }

        if rows != IMAGE_SIZE {
            return Err(SharedError::file_format(format!(
                "decoder matrix has {rows} rows, expected {IMAGE_SIZE}"
            )));
        }
        Ok(Self { grid })
    }

    /// Load a decoder matrix file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Channel number at (row, column)
    pub fn channel(&self, row: usize, col: usize) -> u16 {
        self.grid[row][col]
    }

    pub fn rows(&self) -> &[[u16; IMAGE_SIZE]; IMAGE_SIZE] {
        &self.grid
    }
}
