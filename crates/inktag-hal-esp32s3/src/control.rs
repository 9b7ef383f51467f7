//! Request queue from the HTTP task to the control loop.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use inktag_core::control::{ControlInbox, ControlRequest};
use log::warn;

const QUEUE_DEPTH: usize = 8;

pub type ControlQueue = Channel<CriticalSectionRawMutex, ControlRequest, QUEUE_DEPTH>;

/// Posts `request`; returns `false` when the control loop is behind.
pub fn post(queue: &ControlQueue, request: ControlRequest) -> bool {
    match queue.try_send(request) {
        Ok(()) => true,
        Err(_) => {
            warn!("control: queue full, request dropped");
            false
        }
    }
}

/// [`ControlInbox`] over a [`ControlQueue`].
#[derive(Clone, Copy)]
pub struct QueueInbox(pub &'static ControlQueue);

impl ControlInbox for QueueInbox {
    fn next_request(&mut self) -> Option<ControlRequest> {
        self.0.try_receive().ok()
    }
}
