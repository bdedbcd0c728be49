//! The state machine engine.
//!
//! One mutex per machine serializes the transition check, the history
//! append and deadline arming. Notifications are sent after the lock is
//! released and never block.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{FsmError, FsmResult};

/// A lifecycle state. Equality decides whether a transition matches the
/// table, so a state type may define its own notion of "same state".
pub trait State: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> State for T where T: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// The legal transition graph for a state type.
pub trait TransitionTable<S>: Send + Sync + 'static {
    /// States reachable from `from`, or `None` if the table does not know
    /// `from`. An unknown state allows no transitions.
    fn next(&self, from: &S) -> Option<Vec<S>>;
}

impl<S, F> TransitionTable<S> for F
where
    F: Fn(&S) -> Option<Vec<S>> + Send + Sync + 'static,
{
    fn next(&self, from: &S) -> Option<Vec<S>> {
        self(from)
    }
}

/// An error observed by the embedding application and attached to a record.
pub type ObservedError = Arc<dyn std::error::Error + Send + Sync>;

/// Distinguishes machines so a record is only accepted by its own machine.
static NEXT_MACHINE: AtomicU64 = AtomicU64::new(0);

/// One entry in a machine's history.
#[derive(Debug, Clone)]
pub struct FsmRecord<S> {
    /// Position in the history, starting at 0.
    pub id: u64,
    pub state: S,
    pub started_at: SystemTime,
    /// Deadline for leaving this state, if one was set.
    pub expires_at: Option<SystemTime>,
    pub message: String,
    pub error: Option<ObservedError>,
    machine: u64,
}

impl<S> FsmRecord<S> {
    fn is_same_record(&self, other: &FsmRecord<S>) -> bool {
        self.machine == other.machine && self.id == other.id
    }
}

/// Receivers for a machine's notifications.
///
/// Delivery is buffered, not a rendezvous. Each channel keeps one unread
/// notification even when nobody is receiving, so a consumer that starts
/// receiving late is handed that buffered record first, however stale it
/// has become. Notifications sent while it is still unread are dropped.
/// Check a record's `id` against [`Fsm::current`] before acting on it.
pub struct FsmSignals<S> {
    /// Records whose deadline lapsed while they were current.
    pub expired: mpsc::Receiver<FsmRecord<S>>,
    /// Records that were superseded by a transition.
    pub completed: mpsc::Receiver<FsmRecord<S>>,
}

struct PendingDeadline {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Slots<S> {
    past: Vec<FsmRecord<S>>,
    current: FsmRecord<S>,
    deadline: Option<PendingDeadline>,
    generation: u64,
}

struct Inner<S> {
    machine: u64,
    table: Box<dyn TransitionTable<S>>,
    slots: Mutex<Slots<S>>,
    expired_tx: mpsc::Sender<FsmRecord<S>>,
    completed_tx: mpsc::Sender<FsmRecord<S>>,
}

/// A timed state machine. Cloning yields another handle to the same machine.
pub struct Fsm<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Fsm<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: State> Fsm<S> {
    /// Create a machine in `initial`, with a history of one record (id 0).
    pub fn new(table: impl TransitionTable<S>, initial: S) -> (Self, FsmSignals<S>) {
        let machine = NEXT_MACHINE.fetch_add(1, Ordering::Relaxed);
        let (expired_tx, expired) = mpsc::channel(1);
        let (completed_tx, completed) = mpsc::channel(1);

        let current = FsmRecord {
            id: 0,
            state: initial,
            started_at: SystemTime::now(),
            expires_at: None,
            message: String::new(),
            error: None,
            machine,
        };

        let inner = Inner {
            machine,
            table: Box::new(table),
            slots: Mutex::new(Slots {
                past: Vec::new(),
                current,
                deadline: None,
                generation: 0,
            }),
            expired_tx,
            completed_tx,
        };

        let fsm = Self {
            inner: Arc::new(inner),
        };
        (fsm, FsmSignals { expired, completed })
    }

    /// The latest record.
    pub fn current(&self) -> FsmRecord<S> {
        let slots = self.inner.slots.lock().expect("fsm lock");
        slots.current.clone()
    }

    /// Snapshot of the full history, oldest first.
    pub fn history(&self) -> Vec<FsmRecord<S>> {
        let slots = self.inner.slots.lock().expect("fsm lock");
        let mut history = slots.past.clone();
        history.push(slots.current.clone());
        history
    }

    /// Transition to `state`.
    ///
    /// Fails with [`FsmError::StateNotAllowed`] if the table has no edge from
    /// the current state to `state`. On success any pending deadline is
    /// cancelled and the outgoing record is offered on the completion signal.
    pub fn next(
        &self,
        state: S,
        message: impl Into<String>,
        error: Option<ObservedError>,
    ) -> FsmResult<FsmRecord<S>> {
        let (outgoing, record) = {
            let mut slots = self.inner.slots.lock().expect("fsm lock");

            let allowed = self
                .inner
                .table
                .next(&slots.current.state)
                .is_some_and(|targets| targets.contains(&state));
            if !allowed {
                return Err(FsmError::StateNotAllowed {
                    from: slots.current.state.to_string(),
                    to: state.to_string(),
                });
            }

            if let Some(pending) = slots.deadline.take() {
                pending.handle.abort();
            }

            let record = FsmRecord {
                id: slots.past.len() as u64 + 1,
                state,
                started_at: SystemTime::now(),
                expires_at: None,
                message: message.into(),
                error,
                machine: self.inner.machine,
            };
            let outgoing = std::mem::replace(&mut slots.current, record.clone());
            slots.past.push(outgoing.clone());
            (outgoing, record)
        };

        debug!(
            id = record.id,
            from = %outgoing.state,
            to = %record.state,
            "state transition"
        );
        offer(&self.inner.completed_tx, outgoing, "completed");
        Ok(record)
    }

    /// Arm a deadline of `duration` on `record`, which must be the current
    /// record of this machine. Replaces any deadline already armed.
    ///
    /// The record's `started_at` is reset to now. When the deadline lapses
    /// before the next transition, the record is offered on the expiration
    /// signal; the state itself does not change.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn set_deadline(&self, record: &FsmRecord<S>, duration: Duration) -> FsmResult<FsmRecord<S>> {
        let mut slots = self.inner.slots.lock().expect("fsm lock");
        if !slots.current.is_same_record(record) {
            return Err(FsmError::InvalidState {
                record: record.id,
                current: slots.current.id,
            });
        }

        let now = SystemTime::now();
        slots.current.started_at = now;
        slots.current.expires_at = Some(now + duration);

        if let Some(pending) = slots.deadline.take() {
            pending.handle.abort();
        }
        slots.generation += 1;
        let generation = slots.generation;

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            fire_deadline(weak, generation);
        });
        slots.deadline = Some(PendingDeadline { generation, handle });

        debug!(id = slots.current.id, ?duration, "deadline armed");
        Ok(slots.current.clone())
    }
}

/// Timer body: clears the pending deadline and raises the expiration, unless
/// the deadline was superseded while the timer was waking up.
fn fire_deadline<S: State>(inner: Weak<Inner<S>>, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let expired = {
        let mut slots = inner.slots.lock().expect("fsm lock");
        match &slots.deadline {
            Some(pending) if pending.generation == generation => {
                slots.deadline = None;
                Some(slots.current.clone())
            }
            _ => None,
        }
    };

    if let Some(record) = expired {
        debug!(id = record.id, state = %record.state, "deadline expired");
        offer(&inner.expired_tx, record, "expired");
    }
}

fn offer<S>(tx: &mpsc::Sender<FsmRecord<S>>, record: FsmRecord<S>, signal: &'static str) {
    match tx.try_send(record) {
        Ok(()) => {}
        Err(TrySendError::Full(record)) => {
            debug!(id = record.id, signal, "notification dropped, receiver not ready");
        }
        Err(TrySendError::Closed(record)) => {
            debug!(id = record.id, signal, "notification dropped, no receiver");
        }
    }
}
