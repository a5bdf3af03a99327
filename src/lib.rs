//! A tick-driven interpreter for compiled narrative programs.
//!
//! A [`Program`] is a set of blocks, each a flat list of commands. The
//! [`Scheduler`] is stepped once per frame; it advances every running
//! block's current command and leaves presentation to the host through
//! [`Services`].

pub mod command;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod input;
pub mod logic;
pub mod program;
pub mod runner;
pub mod scheduler;
pub mod services;
pub mod value;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{EvalError, LoadError};
pub use evaluate::{Evaluator, VariableEvaluator};
pub use logic::{Checkpoint, Logic};
pub use program::Program;
pub use runner::Waiting;
pub use scheduler::Scheduler;
pub use services::Services;
pub use value::Value;
