//! Session runtime over the deterministic interpreter.
//!
//! `nodeforge-runtime` wraps the pure core in a stateful [`Session`]: it
//! owns the scheduler and the clock, routes player and script actions
//! through the interpreter, and turns listener faults and cancelled
//! continuations into diagnostics instead of crashes. Network transport and
//! rendering live above this crate; everything below it is replayable from
//! a seed and an action log.
pub mod scheduler;
pub mod session;

pub use scheduler::Scheduler;
pub use session::{Session, SessionError, SessionEvent, bind_object};

// Embedders typically load packs and open a session in one breath.
pub use nodeforge_content::{LoadError, load_packs};
