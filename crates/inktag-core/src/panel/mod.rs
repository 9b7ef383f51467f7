//! Panel commands and the worker that executes them on the job context.

mod worker;

use core::fmt::Debug;

use gdey0154z90::{FrameBuffer, protocol::BUFFER_SIZE};
use heapless::String;

use crate::bitmap::MAX_NAME_LEN;

pub use worker::{JobOutcome, PanelWorker, WorkerConfig};

pub type ImageName = String<MAX_NAME_LEN>;

/// Name tag variants. Each one is rendered on its own; none falls through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagStyle {
    /// White screen without text.
    Blank,
    /// Text in black.
    Black,
    /// Text in red.
    Red,
}

impl TagStyle {
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Blank),
            1 => Some(Self::Black),
            2 => Some(Self::Red),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "blank" => Some(Self::Blank),
            "black" => Some(Self::Black),
            "red" => Some(Self::Red),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PanelCommand {
    /// Bring-up: white frame, then power off.
    Initialize,
    /// White frame.
    Wipe,
    PrintTag(TagStyle),
    /// Bitmap pair `<name>.b.bmp` / `<name>.r.bmp`.
    ShowImage(ImageName),
    PowerOff,
    Hibernate,
}

/// Blocking panel operations used by [`PanelWorker`].
pub trait EpaperPanel {
    type Error: Debug;

    fn is_asleep(&self) -> bool;
    fn init(&mut self) -> Result<(), Self::Error>;
    /// Writes ink buffers (set bit = ink) to both RAM planes.
    fn write_frames(&mut self, black: &FrameBuffer, red: &FrameBuffer) -> Result<(), Self::Error>;
    /// Writes decoded bitmap planes (cleared bit = ink) to both RAM planes.
    fn write_bitmap_planes(
        &mut self,
        black: &[u8; BUFFER_SIZE],
        red: &[u8; BUFFER_SIZE],
    ) -> Result<(), Self::Error>;
    /// White on both planes plus a full refresh.
    fn clear(&mut self) -> Result<(), Self::Error>;
    fn refresh(&mut self) -> Result<(), Self::Error>;
    fn power_off(&mut self) -> Result<(), Self::Error>;
    fn hibernate(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests;
