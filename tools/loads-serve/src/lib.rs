//! A short-lived HTTP origin that serves an assembled loads bundle out of
//! an ephemeral workspace, terminating on its own idle-timeout lifecycle.

pub mod engine;
pub mod error;

pub use engine::{Listening, Outcome, ServeEngine};
pub use error::{Error, Result};
