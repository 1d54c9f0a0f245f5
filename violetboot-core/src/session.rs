//! One complete flash-and-optionally-verify operation.
//!
//! A [`Session`] owns its image, target and settings, and walks the state
//! machine described on [`Phase`]. While it runs it sends [`FlashEvent`]s to
//! an optional channel; a front-end drains that channel on whatever thread owns
//! its presentation state.
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::FlashConfig;
use crate::error::Result;
use crate::hash::SourceHash;
use crate::image::ImageSource;
use crate::progress::{FlashEvent, Phase, ProgressEvent};
use crate::release::DeviceReleaser;
use crate::verify::{ReadBack, Verifier};
use crate::write::{CopyOutcome, StreamingWriter};

/// Summary of a session that reached [`Phase::Success`].
#[derive(Clone, Debug)]
pub struct FlashReport {
    pub source: ImageSource,
    pub target: PathBuf,
    pub bytes_written: u64,
    /// Hash of the image, present when verification ran.
    pub source_hash: Option<SourceHash>,
    pub verified: bool,
    pub elapsed: Duration,
}

/// A single flashing operation. Consumed by [`Session::run`].
pub struct Session {
    source: ImageSource,
    target: PathBuf,
    config: FlashConfig,
    phase: Phase,
    bytes_written: u64,
    releaser: DeviceReleaser,
    verifier: Verifier,
    events: Option<Sender<FlashEvent>>,
}

impl Session {
    /// Prepares a session, reading the image size once.
    pub fn new(image: impl AsRef<Path>, device: impl AsRef<Path>, config: FlashConfig) -> Result<Self> {
        config.validate()?;
        let source = ImageSource::open(image)?;
        let verifier = Verifier::new(config.chunk_size);
        Ok(Self {
            source,
            target: device.as_ref().to_path_buf(),
            config,
            phase: Phase::Idle,
            bytes_written: 0,
            releaser: DeviceReleaser::default(),
            verifier,
            events: None,
        })
    }

    pub fn with_events(mut self, events: Sender<FlashEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Replaces the mount backend used during [`Phase::Releasing`].
    pub fn with_releaser(mut self, releaser: DeviceReleaser) -> Self {
        self.releaser = releaser;
        self
    }

    /// Replaces how the device is read back during [`Phase::Verifying`].
    pub fn with_read_back(mut self, read_back: impl ReadBack + Send + 'static) -> Self {
        self.verifier = self.verifier.with_read_back(read_back);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Runs release, write and (if enabled) verify to a terminal phase.
    ///
    /// A verification mismatch comes back as [`FlashError::HashMismatch`]; every
    /// other error is an I/O failure of the write or verify pass.
    pub fn run(mut self) -> Result<FlashReport> {
        let started = Instant::now();
        info!(
            "Flashing {} ({} bytes) to {}",
            self.source.path.display(),
            self.source.size_bytes,
            self.target.display()
        );

        match self.drive() {
            Ok(outcome) => {
                self.enter(Phase::Success);
                let elapsed = started.elapsed();
                info!("Flash finished in {:.1}s", elapsed.as_secs_f64());
                Ok(FlashReport {
                    source: self.source,
                    target: self.target,
                    bytes_written: outcome.bytes_written,
                    verified: self.config.verify,
                    source_hash: outcome.source_hash,
                    elapsed,
                })
            }
            Err(e) => {
                error!("{e}");
                self.enter(Phase::Failed);
                Err(e)
            }
        }
    }

    fn drive(&mut self) -> Result<CopyOutcome> {
        self.release_phase();
        let outcome = self.write_phase()?;
        if let (true, Some(expected)) = (self.config.verify, outcome.source_hash) {
            self.verify_phase(&expected)?;
        }
        Ok(outcome)
    }

    fn release_phase(&mut self) {
        self.enter(Phase::Releasing);
        if !self.releaser.release(&self.target) {
            // Devices without a mount also land here; the write goes ahead.
            warn!(
                "{} may not be fully released, writing anyway",
                self.target.display()
            );
        }
    }

    fn write_phase(&mut self) -> Result<CopyOutcome> {
        self.enter(Phase::Writing);
        let writer = StreamingWriter::new(self.config.chunk_size, self.config.verify);
        let total_bytes = self.source.size_bytes;
        let events = self.events.as_ref();
        let bytes_written = &mut self.bytes_written;

        let outcome = writer.copy(&self.source, &self.target, |bytes_done| {
            *bytes_written = bytes_done;
            send(
                events,
                FlashEvent::Progress(ProgressEvent {
                    phase: Phase::Writing,
                    bytes_done,
                    total_bytes,
                }),
            );
        })?;

        Ok(outcome)
    }

    fn verify_phase(&mut self, expected: &SourceHash) -> Result<()> {
        self.enter(Phase::Verifying);
        let total_bytes = self.source.size_bytes;
        let events = self.events.as_ref();

        self.verifier
            .check(&self.target, total_bytes, expected, |bytes_done| {
                send(
                    events,
                    FlashEvent::Progress(ProgressEvent {
                        phase: Phase::Verifying,
                        bytes_done,
                        total_bytes,
                    }),
                );
            })?
            .into_result()
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid session transition {:?} -> {:?}",
            self.phase,
            next
        );
        self.phase = next;
        send(self.events.as_ref(), FlashEvent::Status(next));
    }
}

/// A closed receiver only means nobody is watching.
fn send(events: Option<&Sender<FlashEvent>>, event: FlashEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Runs `session` on a worker thread and dispatches its events to the
/// callbacks on the calling thread, in order. Returns `true` on success.
pub fn flash_session<P, S>(session: Session, mut on_progress: P, mut on_status: S) -> bool
where
    P: FnMut(f64),
    S: FnMut(&str),
{
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || session.with_events(tx).run());

    for event in rx {
        match event {
            FlashEvent::Status(phase) => on_status(&phase.to_string()),
            FlashEvent::Progress(progress) => on_progress(progress.fraction()),
        }
    }

    match worker.join() {
        Ok(result) => result.is_ok(),
        Err(_) => {
            error!("Flash worker panicked");
            false
        }
    }
}

/// Flashes `source_path` onto `device_path`, reporting progress fractions and
/// status lines through the callbacks.
///
/// Returns `true` only if the image was written (and, with `verify`, read back
/// identically). Failures are logged.
pub fn flash_image<P, S>(
    source_path: impl AsRef<Path>,
    device_path: impl AsRef<Path>,
    verify: bool,
    on_progress: P,
    mut on_status: S,
) -> bool
where
    P: FnMut(f64),
    S: FnMut(&str),
{
    let config = FlashConfig::new().verify(verify);
    match Session::new(source_path, device_path, config) {
        Ok(session) => flash_session(session, on_progress, on_status),
        Err(e) => {
            error!("{e}");
            on_status(&Phase::Failed.to_string());
            false
        }
    }
}
