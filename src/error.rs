//! Error types.
//!
//! Only loading can fail outright. Once a program is running, problems are
//! reported as diagnostics and the interpreter keeps ticking.

use thiserror::Error;

/// Failure to read a program image or a config file.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed json: {0}")]
  Json(#[from] serde_json::Error),

  /// A command's recorded identity disagrees with where it sits.
  #[error("command at {block_id}[{position}] claims to be {claimed_block_id}[{claimed_index}]")]
  CommandMismatch {
    block_id: String,
    position: usize,
    claimed_block_id: String,
    claimed_index: usize,
  },

  #[error("block {block_id} names unknown parent {parent}")]
  UnknownParent { block_id: String, parent: String },

  /// Two blocks under the same parent answer to the same name.
  #[error("blocks {first} and {second} share the name {name}")]
  DuplicateName {
    name: String,
    first: String,
    second: String,
  },

  #[error("entry block not found: {0}")]
  MissingEntry(String),
}

/// Failure inside the expression service.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot evaluate `{expression}`: {message}")]
pub struct EvalError {
  pub expression: String,
  pub message: String,
}

impl EvalError {
  pub fn new(expression: &str, message: impl Into<String>) -> Self {
    EvalError {
      expression: expression.to_string(),
      message: message.into(),
    }
  }
}
