/*!
# DDC Capture Application

Command-line front end for DDC264 charge-integrating ADC boards: encodes the
instrument settings into a register map, runs multi-file acquisitions and
rebuilds 16x16 peak images from the resulting trace files.

## Usage

### Generate a configuration file
```bash
ddc_capture config --output ddc_capture.toml
```

### Inspect the register map for the current settings
```bash
ddc_capture registers --set conv_low_interval=400 --set adc_range=50.0
```

### Acquire three files and build an image from the last one
```bash
ddc_capture acquire --files 3 --output-dir ./data --base-name run --build-image
```

### Rebuild an image, normalized by an open beam run
```bash
ddc_capture image ./data/run_3.txt --open-beam ./data/run_1.txt --normalize --json
```

Logging goes to stderr and follows `RUST_LOG` (default `info`).
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::registers::DdcConfigWord;
use shared::{
    AcquisitionConfig, DecoderMatrix, DisplayRange, ImageInputs, ImageOutcome, ImageSlot,
    PeakImage, RegisterEncoder, TraceRecord,
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod session;
mod synthetic;

use config::{AppConfig, ImageSettings};
use session::{AcquisitionSession, SessionEvent, SessionRequest};
use synthetic::SyntheticDevice;

#[derive(Parser)]
#[command(name = "ddc_capture")]
#[command(about = "DDC264 register configuration, acquisition and peak image reconstruction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults are used if it does not exist)
    #[arg(short, long, default_value = "ddc_capture.toml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "ddc_capture.toml")]
        output: PathBuf,
    },

    /// Print the register map for the configured instrument settings
    Registers {
        /// Override a setting, e.g. `--set clk_high=5`
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
    },

    /// Run an acquisition session against the synthetic device
    Acquire {
        /// Output directory for trace files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// File name prefix
        #[arg(short, long)]
        base_name: Option<String>,

        /// Number of files to acquire
        #[arg(short = 'n', long)]
        files: Option<u32>,

        /// Samples per bank and channel
        #[arg(long)]
        samples: Option<usize>,

        /// Override a setting, e.g. `--set adc_range=12.5`
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Build a peak image from the last file written
        #[arg(long)]
        build_image: bool,

        /// Make the synthetic device reject the given register write calls (1-based)
        #[arg(long, value_name = "CALL")]
        fail_write: Vec<u32>,

        /// Make the synthetic device fail the given capture calls (1-based)
        #[arg(long, value_name = "CALL")]
        fail_capture: Vec<u32>,
    },

    /// Inspect a trace file
    Trace {
        /// Trace file to read
        file: PathBuf,

        /// Print the samples of one channel (e.g. `7A`) instead of all means
        #[arg(long)]
        channel: Option<String>,
    },

    /// Build a peak image from a trace file
    Image {
        /// Sample trace file
        file: PathBuf,

        /// Open beam trace file
        #[arg(long)]
        open_beam: Option<PathBuf>,

        /// Divide by the open beam image
        #[arg(long)]
        normalize: bool,

        /// Clamp normalized values above 1
        #[arg(long)]
        clamp: bool,

        /// Decoder matrix file
        #[arg(short, long)]
        decoder: Option<PathBuf>,

        #[arg(long)]
        edge_left: Option<usize>,

        #[arg(long)]
        edge_right: Option<usize>,

        /// Print JSON instead of a text grid
        #[arg(long)]
        json: bool,
    },
}

/// JSON form of an image build
#[derive(Serialize)]
struct ImageReport<'a> {
    image: &'a PeakImage,
    display_range: DisplayRange,
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stderr keeps stdout clean for JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Config { output } => generate_config_file(output),

        Commands::Registers { overrides } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            print_registers(&config, &overrides)
        }

        Commands::Acquire {
            output_dir,
            base_name,
            files,
            samples,
            overrides,
            build_image,
            fail_write,
            fail_capture,
        } => {
            let mut config = AppConfig::load_or_default(&cli.config)?;
            if let Some(dir) = output_dir {
                config.acquisition.output_directory = dir;
            }
            if let Some(name) = base_name {
                config.acquisition.base_name = name;
            }
            if let Some(count) = files {
                config.acquisition.file_count = count;
            }
            if let Some(samples) = samples {
                config.acquisition.samples_per_bank = samples;
            }
            let device = SyntheticDevice::new()
                .fail_writes(fail_write)
                .fail_captures(fail_capture);
            run_acquisition(device, &config, &overrides, build_image)
        }

        Commands::Trace { file, channel } => inspect_trace(&file, channel.as_deref()),

        Commands::Image {
            file,
            open_beam,
            normalize,
            clamp,
            decoder,
            edge_left,
            edge_right,
            json,
        } => {
            let mut image = AppConfig::load_or_default(&cli.config)?.image;
            if open_beam.is_some() {
                image.open_beam_file = open_beam;
            }
            if let Some(path) = decoder {
                image.decoder_matrix = path;
            }
            image.edge_left = edge_left.unwrap_or(image.edge_left);
            image.edge_right = edge_right.unwrap_or(image.edge_right);
            image.normalize |= normalize;
            image.clamp_to_one |= clamp;

            let outcome = build_image(&image, &file);
            print_image(&outcome, json)
        }
    }
}

/// Validated acquisition configuration after applying `name=value` overrides
fn acquisition_config(config: &AppConfig, overrides: &[String]) -> Result<AcquisitionConfig> {
    let mut settings = config.instrument.clone();
    for assignment in overrides {
        settings
            .apply_assignment(assignment)
            .with_context(|| format!("Invalid setting override: {assignment}"))?;
    }
    Ok(settings.to_acquisition_config()?)
}

fn print_registers(config: &AppConfig, overrides: &[String]) -> Result<()> {
    let acquisition = acquisition_config(config, overrides)?;
    let registers = RegisterEncoder::encode(&acquisition);

    let bytes: Vec<u8> = registers.entries().map(|(_, value)| value).collect();
    debug!("Register bytes (address order): {}", hex::encode(&bytes));

    let word = DdcConfigWord::from_config(&acquisition);
    println!(
        "# DDC config word 0x{:02X}{:02X}, conv low {:.1} us, conv high {:.1} us",
        word.high(),
        word.low(),
        acquisition.conv_low_duration_us(),
        acquisition.conv_high_duration_us()
    );
    print!("{registers}");
    Ok(())
}

fn run_acquisition(
    device: SyntheticDevice,
    config: &AppConfig,
    overrides: &[String],
    build_image_after: bool,
) -> Result<()> {
    let acquisition = acquisition_config(config, overrides)?;
    let request = SessionRequest {
        output_directory: config.acquisition.output_directory.clone(),
        base_name: config.acquisition.base_name.clone(),
        file_count: config.acquisition.file_count,
        samples_per_bank: config.acquisition.samples_per_bank,
    };

    println!("🚀 Starting acquisition (synthetic device)");
    println!("💾 Output directory: {}", request.output_directory.display());

    let handle = AcquisitionSession::new(device, acquisition, request)?.spawn();

    let mut last_file = None;
    for event in handle.events().iter() {
        match event {
            SessionEvent::Status(status) => println!("{status}"),
            SessionEvent::Progress { completed, total } => {
                println!("📊 {completed}/{total}");
            }
            SessionEvent::Finished { last_file: file } => last_file = file,
        }
    }

    let (device, report) = handle.join()?;
    info!(
        "Session {} wrote {} file(s), {} failure(s), {} register write(s)",
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        report.written.len(),
        report.failures,
        device.write_calls()
    );
    if let Some(registers) = device.last_registers() {
        let (values, enable) = registers.to_driver_arrays();
        let written: Vec<u8> = values
            .iter()
            .zip(&enable)
            .filter(|(_, on)| **on != 0)
            .map(|(value, _)| *value as u8)
            .collect();
        debug!("Last register write: {}", hex::encode(&written));
    }

    if build_image_after {
        match last_file {
            Some(path) => {
                let outcome = build_image(&config.image, &path);
                print_image(&outcome, false)?;
            }
            None => warn!("⚠️ No trace file was written, skipping image"),
        }
    }

    println!("✅ Acquisition completed");
    Ok(())
}

fn inspect_trace(path: &Path, channel: Option<&str>) -> Result<()> {
    let trace = TraceRecord::from_file(path)
        .with_context(|| format!("Failed to read trace file: {}", path.display()))?;
    info!("📁 Loaded {} channel(s) from {}", trace.len(), path.display());

    match channel {
        Some(label) => {
            let samples = trace
                .channel(label)
                .with_context(|| format!("Channel {label} not found in {}", path.display()))?;
            for (i, value) in samples.iter().enumerate() {
                println!("{i}\t{value}");
            }
        }
        None => {
            for (label, mean) in trace.channel_means() {
                println!("{label}\t{mean}");
            }
        }
    }
    Ok(())
}

/// Load the decoder matrix and build the configured image; failures give the zero image
fn build_image(settings: &ImageSettings, sample: &Path) -> ImageOutcome {
    let matrix = match DecoderMatrix::from_file(&settings.decoder_matrix) {
        Ok(matrix) => matrix,
        Err(e) => {
            error!(
                "Failed to load decoder matrix {}: {}",
                settings.decoder_matrix.display(),
                e
            );
            return ImageOutcome::from_result(Err(e));
        }
    };

    let mut inputs = ImageInputs::default();
    inputs.set(ImageSlot::Sample, sample);
    if let Some(open_beam) = &settings.open_beam_file {
        inputs.set(ImageSlot::OpenBeam, open_beam);
    }

    inputs.build(
        &matrix,
        settings.edge_left,
        settings.edge_right,
        settings.normalize,
        settings.clamp_to_one,
    )
}

fn print_image(outcome: &ImageOutcome, json: bool) -> Result<()> {
    let range = outcome.display_range();

    if json {
        let report = ImageReport {
            image: &outcome.image,
            display_range: range,
            error: outcome.error.as_ref().map(ToString::to_string),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(e) = &outcome.error {
        println!("⚠️ {e}");
    }
    println!("# display range [{}, {}]", range.low, range.high);
    for row in outcome.image.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:>10.4}")).collect();
        println!("{}", line.join(" "));
    }
    Ok(())
}

/// Write a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   ddc_capture --config {} acquire", output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_sequential_matrix(path: &Path) {
        let text: Vec<String> = (0..16)
            .map(|r| {
                (0..16)
                    .map(|c| (r * 16 + c + 1).to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        std::fs::write(path, text.join("\n")).unwrap();
    }

    #[test]
    fn test_overrides_are_validated() {
        let config = AppConfig::new();
        assert!(acquisition_config(&config, &["clk_high=5".to_string()]).is_ok());
        assert!(acquisition_config(&config, &["clk_high=16".to_string()]).is_err());
        assert!(acquisition_config(&config, &["no_such_field=1".to_string()]).is_err());
    }

    #[test]
    fn test_synthetic_acquisition_builds_image() {
        let dir = tempdir().unwrap();
        let matrix_path = dir.path().join("decoder_matrix.txt");
        write_sequential_matrix(&matrix_path);

        let mut config = AppConfig::new();
        config.acquisition.output_directory = dir.path().join("data");
        config.acquisition.file_count = 2;
        config.image.decoder_matrix = matrix_path;

        let acquisition = acquisition_config(&config, &[]).unwrap();
        let request = SessionRequest {
            output_directory: config.acquisition.output_directory.clone(),
            base_name: config.acquisition.base_name.clone(),
            file_count: config.acquisition.file_count,
            samples_per_bank: config.acquisition.samples_per_bank,
        };
        let device = SyntheticDevice::new().with_ripple(0.0);
        let session = AcquisitionSession::new(device, acquisition, request).unwrap();
        let (_, report) = session.run();
        let last = report.last_file().unwrap().clone();
        assert_eq!(last, dir.path().join("data").join("file_2.txt"));

        let outcome = build_image(&config.image, &last);
        assert!(outcome.error.is_none());
        // Plateau grows with channel number; channel 1 lands at (0, 15)
        assert!(outcome.image.get(0, 15) > 0.0);
        assert!(outcome.image.get(0, 14) > outcome.image.get(0, 15));
        assert!(outcome.image.get(15, 0) > outcome.image.get(0, 0));
    }

    #[test]
    fn test_missing_decoder_gives_zero_image() {
        let dir = tempdir().unwrap();
        let mut settings = ImageSettings::default();
        settings.decoder_matrix = dir.path().join("absent.txt");

        let outcome = build_image(&settings, &dir.path().join("sample.txt"));
        assert!(outcome.error.is_some());
        assert_eq!(outcome.image, PeakImage::zeros());
        assert_eq!(outcome.display_range(), DisplayRange { low: 0.0, high: 0.0 });
    }
}
