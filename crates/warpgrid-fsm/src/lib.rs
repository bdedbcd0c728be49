//! warpgrid-fsm: timed finite-state machines for workload lifecycles.
//!
//! An [`Fsm`] keeps an append-only history of [`FsmRecord`]s. Transitions
//! are checked against a [`TransitionTable`]; a record can carry a deadline
//! that raises a notification when it lapses without a transition.
//!
//! # Signals
//!
//! ```text
//! Fsm::next()          ── outgoing record ──▶ FsmSignals::completed
//! Fsm::set_deadline()  ── timer fires    ──▶ FsmSignals::expired
//! ```
//!
//! Both signals are fire-and-forget. A consumer that is not draining its
//! receiver misses notifications; transitions never wait on a consumer.
//!
//! The platform's own workload lifecycle lives in [`container`].

pub mod container;
pub mod error;
pub mod fsm;

pub use container::{container_transitions, ContainerState};
pub use error::{FsmError, FsmResult};
pub use fsm::{Fsm, FsmRecord, FsmSignals, ObservedError, State, TransitionTable};
