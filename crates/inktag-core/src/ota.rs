//! Streamed firmware upload into the inactive application slot.

use core::fmt::Debug;

use log::{info, warn};

pub const SUCCESS_MESSAGE: &str = "OTA successful! Restarting now...";
pub const FAILURE_SUFFIX: &str = " Restarting now...";

/// Delays applied after an upload, whatever its outcome.
pub const OTA_CLEANUP_DELAY_MS: u32 = 1_000;
pub const OTA_RESTART_DELAY_MS: u32 = 1_000;

/// Destination of an image upload.
pub trait FirmwareSink {
    type Error: Debug;

    /// Prepares the target slot; returns its capacity in bytes.
    fn prepare(&mut self) -> Result<u32, Self::Error>;
    fn write(&mut self, offset: u32, chunk: &[u8]) -> Result<(), Self::Error>;
    /// Marks the written image as the next boot target.
    fn activate(&mut self, len: u32) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OtaError {
    NotStarted,
    Empty,
    TooLarge,
    /// Fewer or more bytes arrived than announced.
    Incomplete,
    /// The sink failed earlier in this session.
    Aborted,
    Sink,
}

impl OtaError {
    pub const fn describe(self) -> &'static str {
        match self {
            Self::NotStarted => "No update in progress.",
            Self::Empty => "Empty firmware image.",
            Self::TooLarge => "Firmware image too large.",
            Self::Incomplete => "Firmware upload incomplete.",
            Self::Aborted => "Update aborted.",
            Self::Sink => "Flash write failed.",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    Receiving { capacity: u32, expected: u32 },
    Failed(OtaError),
}

pub struct OtaSession<S> {
    sink: S,
    phase: Phase,
    written: u32,
}

impl<S> OtaSession<S>
where
    S: FirmwareSink,
{
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            phase: Phase::Idle,
            written: 0,
        }
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    /// Starts a fresh upload of `expected` bytes, dropping whatever came
    /// before.
    pub fn begin(&mut self, expected: u32) -> Result<(), OtaError> {
        self.written = 0;
        match self.sink.prepare() {
            Ok(capacity) => {
                if expected > capacity {
                    warn!("ota: {} byte image exceeds {} byte slot", expected, capacity);
                    self.phase = Phase::Failed(OtaError::TooLarge);
                    return Err(OtaError::TooLarge);
                }
                info!("ota: receiving {} bytes, slot holds {}", expected, capacity);
                self.phase = Phase::Receiving { capacity, expected };
                Ok(())
            }
            Err(err) => {
                warn!("ota: prepare failed: {:?}", err);
                self.phase = Phase::Failed(OtaError::Sink);
                Err(OtaError::Sink)
            }
        }
    }

    /// Appends `chunk`. After the first error the rest of the upload is
    /// drained without touching flash.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError> {
        let capacity = match self.phase {
            Phase::Receiving { capacity, .. } => capacity,
            Phase::Failed(_) => return Err(OtaError::Aborted),
            Phase::Idle => return Err(OtaError::NotStarted),
        };

        let end = self.written as u64 + chunk.len() as u64;
        if end > capacity as u64 {
            self.phase = Phase::Failed(OtaError::TooLarge);
            return Err(OtaError::TooLarge);
        }

        if let Err(err) = self.sink.write(self.written, chunk) {
            warn!("ota: write at {} failed: {:?}", self.written, err);
            self.phase = Phase::Failed(OtaError::Sink);
            return Err(OtaError::Sink);
        }
        self.written = end as u32;
        Ok(())
    }

    /// Completes the upload; returns the image size.
    pub fn finish(&mut self) -> Result<u32, OtaError> {
        let phase = core::mem::replace(&mut self.phase, Phase::Idle);
        match phase {
            Phase::Idle => Err(OtaError::NotStarted),
            Phase::Failed(err) => Err(err),
            Phase::Receiving { .. } if self.written == 0 => Err(OtaError::Empty),
            Phase::Receiving { expected, .. } if self.written != expected => {
                warn!("ota: got {} of {} bytes, not activating", self.written, expected);
                Err(OtaError::Incomplete)
            }
            Phase::Receiving { .. } => {
                self.sink.activate(self.written).map_err(|err| {
                    warn!("ota: activation failed: {:?}", err);
                    OtaError::Sink
                })?;
                info!("ota: update of {} bytes applied", self.written);
                Ok(self.written)
            }
        }
    }
}

/// Response text for a finished upload.
pub fn outcome_message<W: core::fmt::Write>(
    out: &mut W,
    result: Result<u32, OtaError>,
) -> core::fmt::Result {
    match result {
        Ok(_) => out.write_str(SUCCESS_MESSAGE),
        Err(err) => {
            out.write_str(err.describe())?;
            out.write_str(FAILURE_SUFFIX)
        }
    }
}
