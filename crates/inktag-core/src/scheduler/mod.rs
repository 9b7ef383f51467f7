//! Run-to-completion task scheduler for the single control loop.
//!
//! Tasks live in a fixed slot table and are dispatched through a
//! [`TaskHandler`], so callbacks get `&mut Scheduler` back and can enable,
//! disable, add or remove tasks (including themselves) while a pass runs.

use heapless::Vec;

use crate::signal::CompletionSignal;

/// Upper bound of registered tasks per scheduler.
pub const MAX_TASKS: usize = 16;

/// Stable task handle. Ids are never reused by one scheduler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u16);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Repeat {
    /// Runs once per enable, then disables itself.
    Once,
    /// Runs every `interval_ms` while enabled.
    Forever,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskSpec<K> {
    pub kind: K,
    pub interval_ms: u32,
    pub repeat: Repeat,
    /// Ask [`TaskHandler::on_enable`] before the first run after each enable.
    pub guarded: bool,
}

impl<K> TaskSpec<K> {
    pub const fn once(kind: K) -> Self {
        Self {
            kind,
            interval_ms: 0,
            repeat: Repeat::Once,
            guarded: false,
        }
    }

    pub const fn forever(kind: K, interval_ms: u32) -> Self {
        Self {
            kind,
            interval_ms,
            repeat: Repeat::Forever,
            guarded: false,
        }
    }

    pub const fn with_interval(mut self, interval_ms: u32) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub const fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerError {
    Full,
    IdsExhausted,
}

/// Callbacks invoked by [`Scheduler::execute`].
pub trait TaskHandler<K> {
    /// Called the first time a guarded task is due after being enabled.
    ///
    /// Returning `false` leaves the task disabled without running it.
    fn on_enable(&mut self, scheduler: &mut Scheduler<K>, id: TaskId, kind: K) -> bool {
        let _ = (scheduler, id, kind);
        true
    }

    fn run(&mut self, scheduler: &mut Scheduler<K>, id: TaskId, kind: K);
}

struct Slot<K> {
    id: TaskId,
    spec: TaskSpec<K>,
    enabled: bool,
    check_on_enable: bool,
    wait: Option<&'static CompletionSignal>,
    due_ms: u64,
    armed_pass: u32,
}

pub struct Scheduler<K> {
    slots: Vec<Slot<K>, MAX_TASKS>,
    next_id: u16,
    pass: u32,
    now_ms: u64,
}

impl<K: Copy> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy> Scheduler<K> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
            pass: 0,
            now_ms: 0,
        }
    }

    /// Time handed to the current (or last) [`Self::execute`] pass.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registers a disabled task at the end of the dispatch order.
    pub fn add(&mut self, spec: TaskSpec<K>) -> Result<TaskId, SchedulerError> {
        if self.slots.is_full() {
            return Err(SchedulerError::Full);
        }
        let id = TaskId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(SchedulerError::IdsExhausted)?;

        self.slots
            .push(Slot {
                id,
                spec,
                enabled: false,
                check_on_enable: false,
                wait: None,
                due_ms: 0,
                armed_pass: self.pass,
            })
            .map_err(|_| SchedulerError::Full)?;
        Ok(id)
    }

    /// Unregisters a task. Returns `false` for unknown ids.
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.slots.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn kind(&self, id: TaskId) -> Option<K> {
        self.index_of(id).map(|index| self.slots[index].spec.kind)
    }

    /// Enables (or restarts) a task; it is first due immediately.
    pub fn enable(&mut self, id: TaskId) -> bool {
        self.arm(id, self.now_ms)
    }

    /// Enables (or restarts) a task; it is first due after `delay_ms`.
    pub fn enable_delayed(&mut self, id: TaskId, delay_ms: u32) -> bool {
        self.arm(id, self.now_ms.saturating_add(delay_ms as u64))
    }

    /// Enables a task that stays skipped while `signal` is pending.
    pub fn enable_after(&mut self, id: TaskId, signal: &'static CompletionSignal) -> bool {
        if !self.set_wait(id, Some(signal)) {
            return false;
        }
        self.enable(id)
    }

    /// Replaces the wait gate of a task without changing its enabled state.
    pub fn set_wait(&mut self, id: TaskId, signal: Option<&'static CompletionSignal>) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.wait = signal;
                true
            }
            None => false,
        }
    }

    pub fn disable(&mut self, id: TaskId) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.enabled = false;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, id: TaskId) -> bool {
        self.index_of(id)
            .is_some_and(|index| self.slots[index].enabled)
    }

    pub fn set_interval(&mut self, id: TaskId, interval_ms: u32) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.spec.interval_ms = interval_ms;
                true
            }
            None => false,
        }
    }

    /// Runs one pass: every enabled, released and due task once, in
    /// registration order. Returns the number of callbacks run.
    pub fn execute<H>(&mut self, now_ms: u64, handler: &mut H) -> usize
    where
        H: TaskHandler<K>,
    {
        self.pass = self.pass.wrapping_add(1);
        self.now_ms = now_ms;

        let order: Vec<TaskId, MAX_TASKS> = self.slots.iter().map(|slot| slot.id).collect();
        let mut ran = 0;

        for id in order {
            if !self.is_due(id, now_ms) {
                continue;
            }

            let Some(index) = self.index_of(id) else {
                continue;
            };
            let kind = self.slots[index].spec.kind;

            if self.slots[index].check_on_enable {
                self.slots[index].check_on_enable = false;
                if !handler.on_enable(self, id, kind) {
                    self.disable(id);
                    continue;
                }
                // The guard may have touched the task.
                if !self.is_due(id, now_ms) {
                    continue;
                }
            }

            let Some(index) = self.index_of(id) else {
                continue;
            };
            let slot = &mut self.slots[index];
            slot.due_ms = now_ms.saturating_add(slot.spec.interval_ms as u64);
            if slot.spec.repeat == Repeat::Once {
                slot.enabled = false;
            }

            handler.run(self, id, kind);
            ran += 1;
        }

        ran
    }

    fn is_due(&self, id: TaskId, now_ms: u64) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let slot = &self.slots[index];

        slot.enabled
            && slot.armed_pass != self.pass
            && !slot.wait.is_some_and(|signal| signal.pending())
            && now_ms >= slot.due_ms
    }

    fn arm(&mut self, id: TaskId, due_ms: u64) -> bool {
        let pass = self.pass;
        match self.slot_mut(id) {
            Some(slot) => {
                slot.enabled = true;
                slot.check_on_enable = slot.spec.guarded;
                slot.due_ms = due_ms;
                slot.armed_pass = pass;
                true
            }
            None => false,
        }
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }

    fn slot_mut(&mut self, id: TaskId) -> Option<&mut Slot<K>> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }
}

#[cfg(test)]
mod tests;
