//! Delayed restart with an orderly cleanup phase.
//!
//! A request schedules the cleanup task after `cleanup_ms`. The composition
//! root stops its services from that task and calls [`RestartService::arm_reset`],
//! which fires the reset `restart_ms` later, once the panel has gone to sleep.

use log::{info, warn};

use super::TaskKind;
use crate::{
    scheduler::{Scheduler, SchedulerError, TaskId, TaskSpec},
    signal::CompletionSignal,
};

pub const DEFAULT_CLEANUP_DELAY_MS: u32 = 500;
pub const DEFAULT_RESTART_DELAY_MS: u32 = 500;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestartReason {
    Plain = 0,
    ResetWifi = 1,
    ResetAll = 2,
    UpdateApplied = 3,
    UpdateFailed = 4,
    Fatal = 5,
    OtaIdle = 6,
}

impl RestartReason {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Plain),
            1 => Some(Self::ResetWifi),
            2 => Some(Self::ResetAll),
            3 => Some(Self::UpdateApplied),
            4 => Some(Self::UpdateFailed),
            5 => Some(Self::Fatal),
            6 => Some(Self::OtaIdle),
            _ => None,
        }
    }

    /// Banner text for the home page.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Plain => "Restarting",
            Self::ResetWifi => "WiFi settings cleared, restarting",
            Self::ResetAll => "All settings cleared, restarting",
            Self::UpdateApplied => "Update applied, restarting",
            Self::UpdateFailed => "Update failed, restarting",
            Self::Fatal => "Network bring-up stalled, restarting",
            Self::OtaIdle => "No update received, restarting",
        }
    }
}

/// Chip reset. Does not return on hardware.
pub trait SystemReset {
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    reason: RestartReason,
    restart_ms: u32,
}

pub struct RestartService<R> {
    reset: R,
    cleanup: Option<TaskId>,
    fire: Option<TaskId>,
    pending: Option<Pending>,
}

impl<R> RestartService<R>
where
    R: SystemReset,
{
    pub const fn new(reset: R) -> Self {
        Self {
            reset,
            cleanup: None,
            fire: None,
            pending: None,
        }
    }

    pub fn begin(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Result<(), SchedulerError> {
        if self.cleanup.is_none() {
            self.cleanup = Some(scheduler.add(TaskSpec::once(TaskKind::RestartCleanup))?);
        }
        if self.fire.is_none() {
            self.fire = Some(scheduler.add(TaskSpec::once(TaskKind::RestartReset))?);
        }
        Ok(())
    }

    /// Reason of the scheduled restart, if any.
    pub fn reason(&self) -> Option<RestartReason> {
        self.pending.map(|pending| pending.reason)
    }

    /// Schedules cleanup in `cleanup_ms` and the reset `restart_ms` after it.
    ///
    /// The first request wins; later ones return `false`.
    pub fn restart_delayed(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        cleanup_ms: u32,
        restart_ms: u32,
        reason: RestartReason,
    ) -> bool {
        if let Some(pending) = self.pending {
            warn!(
                "restart: {:?} ignored, {:?} already scheduled",
                reason, pending.reason
            );
            return false;
        }
        let Some(cleanup) = self.cleanup else {
            warn!("restart: service not started");
            return false;
        };

        info!(
            "restart: {:?} in {} + {} ms",
            reason, cleanup_ms, restart_ms
        );
        self.pending = Some(Pending { reason, restart_ms });
        scheduler.enable_delayed(cleanup, cleanup_ms);
        true
    }

    /// Restart with the default delays.
    pub fn restart(&mut self, scheduler: &mut Scheduler<TaskKind>, reason: RestartReason) -> bool {
        self.restart_delayed(
            scheduler,
            DEFAULT_CLEANUP_DELAY_MS,
            DEFAULT_RESTART_DELAY_MS,
            reason,
        )
    }

    /// Called from the cleanup task once services are stopped. The reset
    /// waits for `wait` (the panel's last job) when given.
    pub fn arm_reset(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        wait: Option<&'static CompletionSignal>,
    ) {
        let (Some(fire), Some(pending)) = (self.fire, self.pending) else {
            return;
        };
        scheduler.set_wait(fire, wait);
        scheduler.enable_delayed(fire, pending.restart_ms);
    }

    /// Pushes the reset back until `wait` completes, for a panel job started
    /// from the reset task itself.
    pub fn defer_reset(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        wait: &'static CompletionSignal,
    ) {
        let Some(fire) = self.fire else {
            return;
        };
        info!("restart: reset deferred for the panel");
        scheduler.enable_after(fire, wait);
    }

    pub fn fire(&mut self) {
        let reason = self.reason().unwrap_or(RestartReason::Plain);
        info!("restart: resetting ({})", reason.label());
        self.reset.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::scheduler::TaskHandler;

    #[derive(Clone, Default)]
    struct CountingReset(Rc<Cell<u32>>);

    impl SystemReset for CountingReset {
        fn reset(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct Harness {
        service: RestartService<CountingReset>,
        wait: Option<&'static CompletionSignal>,
        late_job: Option<&'static CompletionSignal>,
        cleaned_at: Option<u64>,
    }

    impl TaskHandler<TaskKind> for Harness {
        fn run(&mut self, scheduler: &mut Scheduler<TaskKind>, _id: TaskId, kind: TaskKind) {
            match kind {
                TaskKind::RestartCleanup => {
                    self.cleaned_at = Some(scheduler.now_ms());
                    self.service.arm_reset(scheduler, self.wait);
                }
                TaskKind::RestartReset => match self.late_job.take() {
                    Some(wait) => self.service.defer_reset(scheduler, wait),
                    None => self.service.fire(),
                },
                _ => {}
            }
        }
    }

    fn harness(wait: Option<&'static CompletionSignal>) -> (Scheduler<TaskKind>, Harness, CountingReset) {
        let resets = CountingReset::default();
        let mut scheduler = Scheduler::new();
        let mut service = RestartService::new(resets.clone());
        service.begin(&mut scheduler).unwrap();
        (
            scheduler,
            Harness {
                service,
                wait,
                late_job: None,
                cleaned_at: None,
            },
            resets,
        )
    }

    #[test]
    fn cleanup_then_reset_after_both_delays() {
        let (mut scheduler, mut harness, resets) = harness(None);
        assert!(harness.service.restart_delayed(&mut scheduler, 200, 300, RestartReason::ResetWifi));

        scheduler.execute(199, &mut harness);
        assert_eq!(harness.cleaned_at, None);

        scheduler.execute(200, &mut harness);
        assert_eq!(harness.cleaned_at, Some(200));

        scheduler.execute(499, &mut harness);
        assert_eq!(resets.0.get(), 0);
        scheduler.execute(500, &mut harness);
        assert_eq!(resets.0.get(), 1);
    }

    #[test]
    fn first_request_wins() {
        let (mut scheduler, mut harness, _) = harness(None);
        assert!(harness.service.restart(&mut scheduler, RestartReason::OtaIdle));
        assert!(!harness.service.restart(&mut scheduler, RestartReason::Plain));
        assert_eq!(harness.service.reason(), Some(RestartReason::OtaIdle));
    }

    #[test]
    fn reset_waits_for_the_panel() {
        let hibernate: &'static CompletionSignal = std::boxed::Box::leak(std::boxed::Box::new(
            CompletionSignal::new(),
        ));
        let (mut scheduler, mut harness, resets) = harness(Some(hibernate));
        harness.service.restart_delayed(&mut scheduler, 0, 0, RestartReason::Plain);

        scheduler.execute(0, &mut harness);
        scheduler.execute(10, &mut harness);
        scheduler.execute(5_000, &mut harness);
        assert_eq!(resets.0.get(), 0);

        hibernate.signal_complete();
        scheduler.execute(5_001, &mut harness);
        assert_eq!(resets.0.get(), 1);
    }

    #[test]
    fn deferred_reset_waits_for_the_late_job() {
        let late: &'static CompletionSignal = std::boxed::Box::leak(std::boxed::Box::new(
            CompletionSignal::new(),
        ));
        let (mut scheduler, mut harness, resets) = harness(None);
        harness.late_job = Some(late);
        harness.service.restart_delayed(&mut scheduler, 0, 0, RestartReason::Plain);

        scheduler.execute(0, &mut harness);
        scheduler.execute(10, &mut harness);
        scheduler.execute(20, &mut harness);
        assert!(harness.late_job.is_none());
        assert_eq!(resets.0.get(), 0);

        late.signal_complete();
        scheduler.execute(30, &mut harness);
        assert_eq!(resets.0.get(), 1);
    }

    #[test]
    fn reason_codes_round_trip() {
        for code in 0..=6 {
            let reason = RestartReason::from_u8(code).unwrap();
            assert_eq!(reason.as_u8(), code);
        }
        assert_eq!(RestartReason::from_u8(7), None);
    }
}
