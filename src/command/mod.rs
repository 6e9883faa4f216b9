//! Bounded execution of external programs
//!
//! Every capability probe and device listing goes through a [`CommandRunner`]
//! so that probing can be faked in tests and never outlives its timeout.

mod runner;

pub use runner::{CommandOutput, CommandRunner, RunError, SystemRunner};
