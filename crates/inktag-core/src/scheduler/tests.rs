use std::vec::Vec;

use super::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Kind {
    Tick,
    Boot,
    Late,
    Probe,
}

#[derive(Default)]
struct Recorder {
    runs: Vec<(u64, Kind)>,
    /// Task enabled from the callback of the matching kind.
    chain: Option<(Kind, TaskId)>,
    /// Re-enable `Once` tasks from inside their own callback.
    rearm_self: bool,
    /// Task removed from the callback of the matching kind.
    remove: Option<(Kind, TaskId)>,
    allow_probe: bool,
    probes: usize,
}

impl TaskHandler<Kind> for Recorder {
    fn on_enable(&mut self, _scheduler: &mut Scheduler<Kind>, _id: TaskId, kind: Kind) -> bool {
        if kind == Kind::Probe {
            self.probes += 1;
            return self.allow_probe;
        }
        true
    }

    fn run(&mut self, scheduler: &mut Scheduler<Kind>, id: TaskId, kind: Kind) {
        self.runs.push((scheduler.now_ms(), kind));

        if let Some((trigger, target)) = self.chain
            && trigger == kind
        {
            scheduler.enable(target);
        }
        if let Some((trigger, target)) = self.remove
            && trigger == kind
        {
            scheduler.remove(target);
        }
        if self.rearm_self && kind == Kind::Boot {
            scheduler.enable(id);
        }
    }
}

fn kinds(recorder: &Recorder) -> Vec<Kind> {
    recorder.runs.iter().map(|(_, kind)| *kind).collect()
}

#[test]
fn forever_task_runs_on_its_interval() {
    let mut scheduler = Scheduler::new();
    let tick = scheduler.add(TaskSpec::forever(Kind::Tick, 100)).unwrap();
    scheduler.enable(tick);

    let mut recorder = Recorder::default();
    for now in [0, 50, 99, 100, 150, 200, 250] {
        scheduler.execute(now, &mut recorder);
    }

    assert_eq!(
        recorder.runs,
        vec![(0, Kind::Tick), (100, Kind::Tick), (200, Kind::Tick)]
    );
}

#[test]
fn once_task_disables_itself() {
    let mut scheduler = Scheduler::new();
    let boot = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    scheduler.enable(boot);

    let mut recorder = Recorder::default();
    for now in 0..5 {
        scheduler.execute(now, &mut recorder);
    }

    assert_eq!(kinds(&recorder), vec![Kind::Boot]);
    assert!(!scheduler.is_enabled(boot));
    assert!(scheduler.contains(boot));
}

#[test]
fn once_task_may_rearm_itself_for_the_next_pass() {
    let mut scheduler = Scheduler::new();
    let boot = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    scheduler.enable(boot);

    let mut recorder = Recorder {
        rearm_self: true,
        ..Recorder::default()
    };
    assert_eq!(scheduler.execute(0, &mut recorder), 1);
    assert!(scheduler.is_enabled(boot));
    assert_eq!(scheduler.execute(1, &mut recorder), 1);
    assert_eq!(recorder.runs, vec![(0, Kind::Boot), (1, Kind::Boot)]);
}

#[test]
fn gated_task_never_runs_while_signal_pending() {
    static GATE: CompletionSignal = CompletionSignal::new();

    let mut scheduler = Scheduler::new();
    let late = scheduler.add(TaskSpec::once(Kind::Late)).unwrap();
    scheduler.enable_after(late, &GATE);

    let mut recorder = Recorder::default();
    for now in 0..10 {
        scheduler.execute(now * 1_000, &mut recorder);
    }
    assert!(recorder.runs.is_empty());
    assert!(scheduler.is_enabled(late));

    GATE.signal_complete();
    scheduler.execute(10_000, &mut recorder);
    assert_eq!(recorder.runs, vec![(10_000, Kind::Late)]);
}

#[test]
fn periodic_gate_is_rechecked_every_pass() {
    static GATE: CompletionSignal = CompletionSignal::completed_new();

    let mut scheduler = Scheduler::new();
    let tick = scheduler.add(TaskSpec::forever(Kind::Tick, 0)).unwrap();
    scheduler.enable_after(tick, &GATE);

    let mut recorder = Recorder::default();
    scheduler.execute(0, &mut recorder);
    GATE.set_waiting();
    scheduler.execute(1, &mut recorder);
    scheduler.execute(2, &mut recorder);
    GATE.signal_complete();
    scheduler.execute(3, &mut recorder);

    assert_eq!(recorder.runs, vec![(0, Kind::Tick), (3, Kind::Tick)]);
}

#[test]
fn task_enabled_during_a_pass_waits_for_the_next_pass() {
    let mut scheduler = Scheduler::new();
    let boot = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    let late = scheduler.add(TaskSpec::once(Kind::Late)).unwrap();
    scheduler.enable(boot);

    let mut recorder = Recorder {
        chain: Some((Kind::Boot, late)),
        ..Recorder::default()
    };

    assert_eq!(scheduler.execute(0, &mut recorder), 1);
    assert_eq!(kinds(&recorder), vec![Kind::Boot]);
    assert!(scheduler.is_enabled(late));

    assert_eq!(scheduler.execute(0, &mut recorder), 1);
    assert_eq!(kinds(&recorder), vec![Kind::Boot, Kind::Late]);
}

#[test]
fn tasks_run_in_registration_order() {
    let mut scheduler = Scheduler::new();
    let late = scheduler.add(TaskSpec::once(Kind::Late)).unwrap();
    let tick = scheduler.add(TaskSpec::forever(Kind::Tick, 10)).unwrap();
    let boot = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    scheduler.enable(boot);
    scheduler.enable(tick);
    scheduler.enable(late);

    let mut recorder = Recorder::default();
    scheduler.execute(0, &mut recorder);

    assert_eq!(kinds(&recorder), vec![Kind::Late, Kind::Tick, Kind::Boot]);
}

#[test]
fn removed_task_is_skipped_in_the_same_pass() {
    let mut scheduler = Scheduler::new();
    let boot = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    let tick = scheduler.add(TaskSpec::forever(Kind::Tick, 10)).unwrap();
    scheduler.enable(boot);
    scheduler.enable(tick);

    let mut recorder = Recorder {
        remove: Some((Kind::Boot, tick)),
        ..Recorder::default()
    };
    scheduler.execute(0, &mut recorder);

    assert_eq!(kinds(&recorder), vec![Kind::Boot]);
    assert!(!scheduler.contains(tick));
    assert_eq!(scheduler.len(), 1);
}

#[test]
fn rejected_guard_leaves_task_disabled() {
    let mut scheduler = Scheduler::new();
    let probe = scheduler.add(TaskSpec::once(Kind::Probe).guarded()).unwrap();
    scheduler.enable(probe);

    let mut recorder = Recorder::default();
    scheduler.execute(0, &mut recorder);
    scheduler.execute(1, &mut recorder);

    assert!(recorder.runs.is_empty());
    assert_eq!(recorder.probes, 1);
    assert!(!scheduler.is_enabled(probe));

    recorder.allow_probe = true;
    scheduler.enable(probe);
    scheduler.execute(2, &mut recorder);
    assert_eq!(recorder.probes, 2);
    assert_eq!(kinds(&recorder), vec![Kind::Probe]);
}

#[test]
fn delayed_enable_waits_for_the_delay() {
    let mut scheduler = Scheduler::new();
    let late = scheduler.add(TaskSpec::once(Kind::Late)).unwrap();

    let mut recorder = Recorder::default();
    scheduler.execute(1_000, &mut recorder);
    scheduler.enable_delayed(late, 500);

    scheduler.execute(1_200, &mut recorder);
    scheduler.execute(1_499, &mut recorder);
    assert!(recorder.runs.is_empty());

    scheduler.execute(1_500, &mut recorder);
    assert_eq!(recorder.runs, vec![(1_500, Kind::Late)]);
}

#[test]
fn ids_are_not_reused_and_capacity_is_bounded() {
    let mut scheduler = Scheduler::new();
    let first = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    assert!(scheduler.remove(first));
    let second = scheduler.add(TaskSpec::once(Kind::Boot)).unwrap();
    assert_ne!(first, second);
    assert!(!scheduler.enable(first));

    for _ in 1..MAX_TASKS {
        scheduler.add(TaskSpec::once(Kind::Tick)).unwrap();
    }
    assert_eq!(
        scheduler.add(TaskSpec::once(Kind::Tick)),
        Err(SchedulerError::Full)
    );
}
