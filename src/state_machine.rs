//! Core chat state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.
//! The controller owns the state and executes the returned effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{AdmissionPolicy, ChatContext, ChatState};
pub use transition::{transition, TransitionError};
