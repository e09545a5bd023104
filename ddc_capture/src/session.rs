/*!
Acquisition session.

A session owns the hardware handle for its whole run. For each requested file
it encodes the registers, writes them, captures one sweep, converts it and
writes `<base>_<n>.txt`. A failing step is reported and the session moves on to
the next file; the number of iterations always equals the requested count.

[`AcquisitionSession::spawn`] runs the same loop on a background thread and
streams [`SessionEvent`]s back over a channel.
*/

use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver};
use shared::device::CHANNELS_PER_BANK;
use shared::{
    AcquisitionConfig, FileIndexer, HardwareInterface, RegisterEncoder, SharedError, TraceRecord,
};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Status emitted after the last file
pub const SESSION_COMPLETE: &str = "Data read successfully";

/// Where and how much to acquire
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub output_directory: PathBuf,
    pub base_name: String,
    pub file_count: u32,
    pub samples_per_bank: usize,
}

/// Progress reported while a session runs
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One per completed or failed step, plus the final completion message
    Status(String),
    Progress { completed: u32, total: u32 },
    /// Terminal event; the last file written, if any
    Finished { last_file: Option<PathBuf> },
}

/// Summary returned when a session ends
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub statuses: Vec<String>,
    pub written: Vec<PathBuf>,
    pub failures: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl SessionReport {
    pub fn last_file(&self) -> Option<&PathBuf> {
        self.written.last()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Sequential acquire-and-persist loop over one device
pub struct AcquisitionSession<D: HardwareInterface> {
    device: D,
    config: AcquisitionConfig,
    request: SessionRequest,
    indexer: FileIndexer,
    start_index: u32,
}

impl<D: HardwareInterface + 'static> AcquisitionSession<D> {
    /// Validate the request and reserve its file indices before touching the device
    pub fn new(
        device: D,
        config: AcquisitionConfig,
        request: SessionRequest,
    ) -> shared::Result<Self> {
        if request.file_count == 0 {
            return Err(SharedError::invalid_config("Invalid number of files"));
        }
        if request.samples_per_bank == 0 {
            return Err(SharedError::invalid_config("samples per bank must be positive"));
        }
        let indexer = FileIndexer::new(&request.base_name)?;
        let start_index = indexer.reserve(&request.output_directory, request.file_count)?;
        Ok(Self {
            device,
            config,
            request,
            indexer,
            start_index,
        })
    }

    /// Run to completion on the calling thread
    pub fn run(mut self) -> (D, SessionReport) {
        let report = self.execute(|_| {});
        (self.device, report)
    }

    /// Run on a background thread
    pub fn spawn(mut self) -> SessionHandle<D> {
        let (event_tx, event_rx) = unbounded();

        let handle = thread::spawn(move || {
            let report = self.execute(|event| {
                if event_tx.send(event).is_err() {
                    debug!("Session event receiver dropped");
                }
            });
            (self.device, report)
        });

        SessionHandle {
            events: event_rx,
            handle,
        }
    }

    fn execute(&mut self, mut emit: impl FnMut(SessionEvent)) -> SessionReport {
        let started_at = Local::now();
        let total = self.request.file_count;
        let start_index = self.start_index;

        info!(
            "🚀 Starting acquisition: {} file(s) into {} from index {}",
            total,
            self.request.output_directory.display(),
            start_index
        );

        let mut statuses = Vec::new();
        let mut written = Vec::new();
        let mut failures = 0u32;

        for step in 0..total {
            let index = start_index + step;
            let status = match self.acquire_one(index) {
                Ok(path) => {
                    let status = format!("Saved {}", path.display());
                    info!("💾 {}", status);
                    written.push(path);
                    status
                }
                Err(e) => {
                    failures += 1;
                    let status = format!("File {}: {}", self.indexer.file_name(index), e);
                    error!("{}", status);
                    status
                }
            };
            emit(SessionEvent::Status(status.clone()));
            statuses.push(status);
            emit(SessionEvent::Progress {
                completed: step + 1,
                total,
            });
        }

        statuses.push(SESSION_COMPLETE.to_string());
        emit(SessionEvent::Status(SESSION_COMPLETE.to_string()));
        emit(SessionEvent::Finished {
            last_file: written.last().cloned(),
        });

        let report = SessionReport {
            statuses,
            written,
            failures,
            started_at,
            finished_at: Local::now(),
        };
        if failures > 0 {
            warn!("⚠️ {} of {} step(s) failed", failures, total);
        }
        info!(
            "✅ Acquisition finished: {} file(s) written in {:.1}s",
            report.written.len(),
            report.duration_secs()
        );
        report
    }

    /// Encode, write, capture, convert and persist one file
    fn acquire_one(&mut self, index: u32) -> shared::Result<PathBuf> {
        let registers = RegisterEncoder::encode(&self.config);
        debug!("Register map for file {}:\n{}", index, registers);

        self.device
            .write_registers(&registers)
            .map_err(|status| SharedError::RegisterWriteFailure { code: status.0 })?;

        let buffer = self
            .device
            .capture(CHANNELS_PER_BANK, self.request.samples_per_bank)
            .map_err(|status| SharedError::DataCaptureFailure { code: status.0 })?;

        let record = TraceRecord::from_capture(&buffer, &self.config.adc_converter());
        let path = self.indexer.path_in(&self.request.output_directory, index);
        record.save(&path)?;
        Ok(path)
    }
}

/// Background session: event stream plus the thread handle
pub struct SessionHandle<D> {
    events: Receiver<SessionEvent>,
    handle: JoinHandle<(D, SessionReport)>,
}

impl<D> SessionHandle<D> {
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Wait for the session and take the device back
    pub fn join(self) -> anyhow::Result<(D, SessionReport)> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("Acquisition thread panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DeviceStatus, InstrumentSettings, RawCaptureBuffer, RegisterMap};
    use std::fs;
    use tempfile::tempdir;

    /// Device answering from scripted status lists; missing entries succeed
    struct ScriptedDevice {
        write_results: Vec<i32>,
        capture_results: Vec<i32>,
        writes: usize,
        captures: usize,
        requested: Vec<(usize, usize)>,
    }

    impl ScriptedDevice {
        fn new(write_results: Vec<i32>, capture_results: Vec<i32>) -> Self {
            Self {
                write_results,
                capture_results,
                writes: 0,
                captures: 0,
                requested: Vec::new(),
            }
        }
    }

    impl HardwareInterface for ScriptedDevice {
        fn write_registers(&mut self, _registers: &RegisterMap) -> Result<(), DeviceStatus> {
            let status = self.write_results.get(self.writes).copied().unwrap_or(0);
            self.writes += 1;
            if status == 0 { Ok(()) } else { Err(DeviceStatus(status)) }
        }

        fn capture(
            &mut self,
            channels: usize,
            samples: usize,
        ) -> Result<RawCaptureBuffer, DeviceStatus> {
            let status = self.capture_results.get(self.captures).copied().unwrap_or(0);
            self.captures += 1;
            self.requested.push((channels, samples));
            if status == 0 {
                Ok(RawCaptureBuffer::new(channels, samples))
            } else {
                Err(DeviceStatus(status))
            }
        }
    }

    fn config() -> AcquisitionConfig {
        InstrumentSettings::default().to_acquisition_config().unwrap()
    }

    fn request(dir: &std::path::Path, file_count: u32) -> SessionRequest {
        SessionRequest {
            output_directory: dir.to_path_buf(),
            base_name: "run".to_string(),
            file_count,
            samples_per_bank: 4,
        }
    }

    #[test]
    fn test_rejects_zero_files() {
        let dir = tempdir().unwrap();
        let device = ScriptedDevice::new(vec![], vec![]);
        let result = AcquisitionSession::new(device, config(), request(dir.path(), 0));
        assert!(matches!(
            result,
            Err(SharedError::InvalidConfig(msg)) if msg == "Invalid number of files"
        ));
    }

    #[test]
    fn test_resumes_numbering() {
        let dir = tempdir().unwrap();
        for i in 1..=5 {
            fs::write(dir.path().join(format!("run_{i}.txt")), "").unwrap();
        }

        let device = ScriptedDevice::new(vec![], vec![]);
        let session = AcquisitionSession::new(device, config(), request(dir.path(), 2)).unwrap();
        let (device, report) = session.run();

        assert_eq!(
            report.written,
            vec![dir.path().join("run_6.txt"), dir.path().join("run_7.txt")]
        );
        assert!(dir.path().join("run_7.txt").exists());
        assert!(!dir.path().join("run_8.txt").exists());
        assert_eq!(device.requested, vec![(256, 4), (256, 4)]);

        let trace = TraceRecord::from_file(dir.path().join("run_6.txt")).unwrap();
        assert_eq!(trace.len(), 512);
        assert_eq!(trace.labels()[0], "256A");
        assert_eq!(trace.get("01B"), Some(&[0.0; 4][..]));
    }

    #[test]
    fn test_refuses_exhausted_index_space() {
        let dir = tempdir().unwrap();
        let last = dir.path().join("run_4294967295.txt");
        fs::write(&last, "KEEP").unwrap();

        let device = ScriptedDevice::new(vec![], vec![]);
        let result = AcquisitionSession::new(device, config(), request(dir.path(), 2));
        assert!(matches!(result, Err(SharedError::InvalidConfig(_))));
        assert_eq!(fs::read_to_string(&last).unwrap(), "KEEP");
    }

    #[test]
    fn test_run_must_fit_below_highest_index() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("run_4294967294.txt"), "").unwrap();

        let device = ScriptedDevice::new(vec![], vec![]);
        let result = AcquisitionSession::new(device, config(), request(dir.path(), 2));
        assert!(matches!(result, Err(SharedError::InvalidConfig(_))));

        let device = ScriptedDevice::new(vec![], vec![]);
        let session = AcquisitionSession::new(device, config(), request(dir.path(), 1)).unwrap();
        let (device, report) = session.run();
        assert_eq!(device.writes, 1);
        assert_eq!(report.written, vec![dir.path().join("run_4294967295.txt")]);
    }

    #[test]
    fn test_continues_after_failures() {
        let dir = tempdir().unwrap();
        // File 1: write fails; file 2: capture fails; file 3: succeeds
        let device = ScriptedDevice::new(vec![0, -3, 0], vec![-7, 0]);
        let session = AcquisitionSession::new(device, config(), request(dir.path(), 3)).unwrap();
        let (device, report) = session.run();

        assert_eq!(device.writes, 3);
        assert_eq!(device.captures, 2);
        assert_eq!(report.failures, 2);
        assert_eq!(report.written, vec![dir.path().join("run_3.txt")]);

        assert_eq!(report.statuses.len(), 4);
        assert!(report.statuses[0].contains("Data capture failed with status -7"));
        assert!(report.statuses[1].contains("Register write failed with status -3"));
        assert!(report.statuses[2].starts_with("Saved"));
        assert_eq!(report.statuses[3], SESSION_COMPLETE);
    }

    #[test]
    fn test_spawn_streams_events() {
        let dir = tempdir().unwrap();
        let device = ScriptedDevice::new(vec![0, -1], vec![]);
        let handle = AcquisitionSession::new(device, config(), request(dir.path(), 2))
            .unwrap()
            .spawn();

        let events: Vec<SessionEvent> = handle.events().iter().collect();
        let (_, report) = handle.join().unwrap();

        let progress: Vec<(u32, u32)> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Progress { completed, total } => Some((*completed, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(1, 2), (2, 2)]);

        assert_eq!(
            events.last(),
            Some(&SessionEvent::Finished {
                last_file: Some(dir.path().join("run_1.txt"))
            })
        );
        assert_eq!(
            events[events.len() - 2],
            SessionEvent::Status(SESSION_COMPLETE.to_string())
        );
        assert_eq!(report.written.len(), 1);
    }

    #[test]
    fn test_all_failed_has_no_last_file() {
        let dir = tempdir().unwrap();
        let device = ScriptedDevice::new(vec![-1, -1], vec![]);
        let handle = AcquisitionSession::new(device, config(), request(dir.path(), 2))
            .unwrap()
            .spawn();

        let last = handle.events().iter().last();
        assert_eq!(last, Some(SessionEvent::Finished { last_file: None }));
        let (device, report) = handle.join().unwrap();
        assert_eq!(device.captures, 0);
        assert!(report.last_file().is_none());
    }
}
