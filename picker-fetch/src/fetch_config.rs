use std::env;

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct FetchConfig {
  // Directory holding `<station>_<run>.txt` sounding files.
  pub data_directory: String,
  pub station: String,
  // Profile indexes to load from the chosen run; empty loads every profile.
  pub profiles: Vec<usize>,
  // Read size used while streaming a file.
  pub chunk_size: usize,
}

impl FetchConfig {
  pub const DEFAULT_STATION: &'static str = "OUN";
  pub const DEFAULT_CHUNK_SIZE: usize = 4096;

  pub fn from_env() -> Result<Self, FetchError> {
    Self::from_lookup(|name| env::var(name).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FetchError> {
    let data_directory = lookup("DATA_DIRECTORY").ok_or(FetchError::MissingVariable {
      name: "DATA_DIRECTORY",
    })?;
    let station = lookup("STATION").unwrap_or_else(|| Self::DEFAULT_STATION.to_string());
    let profiles = match lookup("PROFILES") {
      Some(value) => parse_profiles(&value).ok_or(FetchError::InvalidVariable {
        name: "PROFILES",
        value,
      })?,
      None => vec![],
    };

    Ok(Self {
      data_directory,
      station: station.to_uppercase(),
      profiles,
      chunk_size: Self::DEFAULT_CHUNK_SIZE,
    })
  }
}

// "0,3,6" -> [0, 3, 6]; blank means every profile.
fn parse_profiles(value: &str) -> Option<Vec<usize>> {
  if value.trim().is_empty() {
    return Some(vec![]);
  }
  value
    .split(',')
    .map(|part| part.trim().parse::<usize>().ok())
    .collect()
}
