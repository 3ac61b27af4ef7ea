//! The search session state machine.

mod controller;
mod state;


pub use controller::{Completion, SearchSession};
pub use state::{Handled, SessionState};
