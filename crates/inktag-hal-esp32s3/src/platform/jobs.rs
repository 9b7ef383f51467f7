//! Hand-off of panel jobs to the executor on the second core.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use inktag_core::job::{JobRejected, JobSpawner, PanelJob};

/// Single-slot queue: at most one job waits while another runs.
pub type JobQueue = Channel<CriticalSectionRawMutex, PanelJob, 1>;

/// [`JobSpawner`] for the control core.
#[derive(Clone, Copy)]
pub struct JobSender(pub &'static JobQueue);

impl JobSpawner for JobSender {
    fn spawn(&mut self, job: PanelJob) -> Result<(), JobRejected> {
        self.0.try_send(job).map_err(|_| JobRejected)
    }
}
