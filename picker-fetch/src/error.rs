use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("{name} is not set")]
  MissingVariable { name: &'static str },
  #[error("{name} has an invalid value {value:?}")]
  InvalidVariable { name: &'static str, value: String },
  #[error("no runs available for {station}")]
  NoRuns { station: String },
  #[error("line {line}: {reason}")]
  Malformed { line: usize, reason: String },
  #[error("profile {index} requested but the file holds {available}")]
  MissingProfile { index: usize, available: usize },
}
