//! Tick scheduler
//!
//! Game servers run a cooperative main loop at 20 ticks per second and hand out
//! delayed and repeating tasks against that clock. This module models that
//! contract behind [`TaskScheduler`] and provides:
//!
//! * [`TickScheduler`], a deterministic implementation advanced explicitly by the
//!   caller (tests, simulations, or an embedding host loop).
//! * [`CancellationScope`], a one-shot owner of every handle a plan schedules.
//! * [`start_realtime_driver`], a tokio task that advances a [`TickScheduler`]
//!   every 50 ms for wall-clock runs.
//!
//! Design notes:
//! * Tasks due on the same tick run in scheduling order.
//! * A task scheduled while a tick is being processed never runs in that same
//!   tick, even with a zero delay; it runs on the next one.
//! * No lock is held while a task body runs, so tasks may schedule or cancel
//!   other tasks freely.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

/// Ticks per second on the host clock.
pub const TICKS_PER_SECOND: u64 = 20;

/// Wall-clock length of one tick.
pub const TICK: Duration = Duration::from_millis(50);

pub type Task = Box<dyn FnMut() + Send + 'static>;

/// Host-style cooperative scheduler.
pub trait TaskScheduler: Send + Sync {
    fn current_tick(&self) -> u64;

    /// Run `task` once, `delay` ticks from now (a zero delay means the next tick).
    fn run_later(&self, delay: u64, task: Task) -> TaskHandle;

    /// Run `task` after `delay` ticks, then every `period` ticks until cancelled.
    fn run_timer(&self, delay: u64, period: u64, task: Task) -> TaskHandle;
}

#[derive(Debug, Default)]
struct HandleState {
    cancelled: AtomicBool,
    finished: AtomicBool,
}

/// Shared handle to a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    state: Arc<HandleState>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the task. Returns `true` only if this call stopped a pending task.
    pub fn cancel(&self) -> bool {
        if self.state.finished.load(AtomicOrdering::SeqCst) {
            return false;
        }
        !self.state.cancelled.swap(true, AtomicOrdering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(AtomicOrdering::SeqCst)
    }

    /// Neither cancelled nor done.
    pub fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.state.finished.load(AtomicOrdering::SeqCst)
    }

    fn mark_finished(&self) {
        self.state.finished.store(true, AtomicOrdering::SeqCst);
    }
}

/// Owns every handle scheduled for one plan; cancelling it cancels them all, once.
#[derive(Debug, Default)]
pub struct CancellationScope {
    cancelled: AtomicBool,
    handles: Mutex<Vec<TaskHandle>>,
}

impl CancellationScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle`. A handle adopted after the scope was cancelled is cancelled
    /// immediately.
    pub fn adopt(&self, handle: TaskHandle) -> TaskHandle {
        let mut handles = lock(&self.handles);
        if self.cancelled.load(AtomicOrdering::SeqCst) {
            handle.cancel();
            return handle;
        }
        handles.retain(TaskHandle::is_pending);
        handles.push(handle.clone());
        handle
    }

    /// Cancel every tracked handle. Only the first call has any effect; it returns
    /// how many pending tasks were stopped.
    pub fn cancel(&self) -> usize {
        let mut handles = lock(&self.handles);
        if self.cancelled.swap(true, AtomicOrdering::SeqCst) {
            return 0;
        }
        handles.drain(..).filter(|h| h.cancel()).count()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }

    /// Number of tracked tasks still pending.
    pub fn pending(&self) -> usize {
        lock(&self.handles).iter().filter(|h| h.is_pending()).count()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Entry {
    due: u64,
    seq: u64,
    period: Option<u64>,
    handle: TaskHandle,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the BinaryHeap pops the earliest (due, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct Queue {
    now: u64,
    next_seq: u64,
    heap: BinaryHeap<Entry>,
}

impl Queue {
    fn push(&mut self, due: u64, period: Option<u64>, handle: TaskHandle, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            due,
            seq,
            period,
            handle,
            task,
        });
    }
}

/// Deterministic tick scheduler advanced by [`TickScheduler::advance`].
#[derive(Default)]
pub struct TickScheduler {
    queue: Mutex<Queue>,
    executed: AtomicU64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by one tick and run every task now due. Returns the
    /// number of task bodies executed.
    pub fn advance(&self) -> usize {
        let (now, batch) = {
            let mut queue = lock(&self.queue);
            queue.now += 1;
            let now = queue.now;
            let mut batch = Vec::new();
            while queue.heap.peek().is_some_and(|e| e.due <= now) {
                if let Some(entry) = queue.heap.pop() {
                    batch.push(entry);
                }
            }
            (now, batch)
        };

        let mut ran = 0;
        for mut entry in batch {
            if entry.handle.is_cancelled() {
                continue;
            }
            (entry.task)();
            ran += 1;
            match entry.period {
                Some(period) if !entry.handle.is_cancelled() => {
                    lock(&self.queue).push(now + period, Some(period), entry.handle, entry.task);
                }
                _ => entry.handle.mark_finished(),
            }
        }
        self.executed.fetch_add(ran as u64, AtomicOrdering::Relaxed);
        ran
    }

    /// Advance `ticks` times; returns the total number of task bodies executed.
    pub fn advance_by(&self, ticks: u64) -> usize {
        (0..ticks).map(|_| self.advance()).sum()
    }

    /// Tasks still queued and not cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.queue)
            .heap
            .iter()
            .filter(|e| !e.handle.is_cancelled())
            .count()
    }

    /// Drop cancelled entries from the queue. Returns how many were removed.
    pub fn purge_cancelled(&self) -> usize {
        let mut queue = lock(&self.queue);
        let before = queue.heap.len();
        queue.heap.retain(|e| !e.handle.is_cancelled());
        before - queue.heap.len()
    }

    /// Total task bodies executed since creation.
    pub fn executed(&self) -> u64 {
        self.executed.load(AtomicOrdering::Relaxed)
    }

    fn schedule(&self, delay: u64, period: Option<u64>, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut queue = lock(&self.queue);
        let due = queue.now + delay;
        queue.push(due, period, handle.clone(), task);
        handle
    }
}

impl TaskScheduler for TickScheduler {
    fn current_tick(&self) -> u64 {
        lock(&self.queue).now
    }

    fn run_later(&self, delay: u64, task: Task) -> TaskHandle {
        self.schedule(delay, None, task)
    }

    fn run_timer(&self, delay: u64, period: u64, task: Task) -> TaskHandle {
        self.schedule(delay, Some(period.max(1)), task)
    }
}

enum DriverCommand {
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running realtime driver.
#[derive(Clone, Debug)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<DriverCommand>,
}

impl DriverHandle {
    /// Stop the driver and wait until its loop has exited.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(DriverCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Spawn a tokio task that advances `scheduler` once every [`TICK`].
pub fn start_realtime_driver(scheduler: Arc<TickScheduler>) -> DriverHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<DriverCommand>();
    let handle = DriverHandle { tx };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        // First tick of a tokio interval completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                Some(cmd) = rx.recv() => {
                    match cmd {
                        DriverCommand::Shutdown(done) => { let _ = done.send(()); break; }
                    }
                }
                _ = interval.tick() => {
                    let ran = scheduler.advance();
                    if ran > 0 {
                        log::trace!("tick {} ran {} task(s)", scheduler.current_tick(), ran);
                    }
                }
            }
        }
        log::debug!("tick driver loop terminated");
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&str) -> Task) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |label: &str| -> Task {
                let log = log.clone();
                let label = label.to_string();
                Box::new(move || log.lock().unwrap().push(label.clone()))
            }
        };
        (log, make)
    }

    #[test]
    fn run_later_fires_on_due_tick_in_order() {
        let sched = TickScheduler::new();
        let (log, task) = recorder();
        sched.run_later(2, task("b"));
        sched.run_later(1, task("a"));
        sched.run_later(2, task("c"));

        assert_eq!(sched.advance(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(sched.advance(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn zero_delay_runs_next_tick() {
        let sched = TickScheduler::new();
        let (log, task) = recorder();
        sched.run_later(0, task("now"));
        assert!(log.lock().unwrap().is_empty());
        sched.advance();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn timers_repeat_until_cancelled() {
        let sched = TickScheduler::new();
        let (log, task) = recorder();
        let handle = sched.run_timer(0, 2, task("t"));
        sched.advance_by(5);
        assert_eq!(log.lock().unwrap().len(), 3);
        assert!(handle.cancel());
        assert!(!handle.cancel());
        sched.advance_by(5);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let sched = TickScheduler::new();
        let (log, task) = recorder();
        let handle = sched.run_later(3, task("x"));
        assert!(handle.is_pending());
        handle.cancel();
        sched.advance_by(5);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(sched.purge_cancelled(), 1);
    }

    #[test]
    fn finished_handles_do_not_report_cancellation() {
        let sched = TickScheduler::new();
        let (_log, task) = recorder();
        let handle = sched.run_later(1, task("x"));
        sched.advance();
        assert!(!handle.is_pending());
        assert!(!handle.cancel());
    }

    #[test]
    fn scope_cancels_once_and_poisons_late_adopts() {
        let sched = TickScheduler::new();
        let (log, task) = recorder();
        let scope = CancellationScope::new();
        scope.adopt(sched.run_later(1, task("a")));
        scope.adopt(sched.run_timer(1, 1, task("b")));
        assert_eq!(scope.pending(), 2);

        assert_eq!(scope.cancel(), 2);
        assert_eq!(scope.cancel(), 0);

        let late = scope.adopt(sched.run_later(1, task("late")));
        assert!(late.is_cancelled());

        sched.advance_by(3);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn tasks_may_schedule_from_inside_a_tick() {
        let sched = Arc::new(TickScheduler::new());
        let (log, task) = recorder();
        let inner = {
            let sched = sched.clone();
            let follow = task("follow");
            let mut follow = Some(follow);
            Box::new(move || {
                if let Some(t) = follow.take() {
                    sched.run_later(0, t);
                }
            })
        };
        sched.run_later(1, inner);
        sched.advance();
        assert!(log.lock().unwrap().is_empty());
        sched.advance();
        assert_eq!(*log.lock().unwrap(), vec!["follow"]);
    }

    #[tokio::test]
    async fn realtime_driver_advances_and_stops() {
        let sched = Arc::new(TickScheduler::new());
        let driver = start_realtime_driver(sched.clone());
        tokio::time::sleep(Duration::from_millis(180)).await;
        driver.shutdown().await;
        let reached = sched.current_tick();
        assert!(reached >= 1, "driver should have advanced, got {}", reached);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(sched.current_tick(), reached);
    }
}
