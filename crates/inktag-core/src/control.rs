//! Requests posted by the HTTP tasks to the control loop.

use crate::{
    panel::{ImageName, TagStyle},
    settings::StoredConnection,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ControlRequest {
    Wipe,
    PrintTag(TagStyle),
    ShowImage(ImageName),
    Restart,
    /// Forget the stored network and restart into the access point.
    ClearWifi,
    SaveWifi(StoredConnection),
    /// An upload chunk arrived.
    UpdateActivity,
    UpdateFinished { success: bool },
}

/// Non-blocking receive side of the request queue.
pub trait ControlInbox {
    fn next_request(&mut self) -> Option<ControlRequest>;
}

