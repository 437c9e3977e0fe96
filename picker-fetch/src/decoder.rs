//! A minimal text decoder for sounding files.
//!
//! ```text
//! %STATION OUN
//! %TIME 2024061200
//! 1000.0,110,25.0,20.0
//! 925.0,800,20.1,15.0
//! %TIME 2024061203
//! ...
//! ```
//!
//! Each level is `pressure,height,temperature,dewpoint`. Blank lines and
//! lines starting with `#` are ignored.

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub struct Level {
  pub pressure: f64,
  pub height: f64,
  pub temperature: f64,
  pub dewpoint: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
  pub time: String,
  pub levels: Vec<Level>,
}

#[derive(Debug)]
pub struct Decoder {
  station: Option<String>,
  sections: Vec<Profile>,
}

impl Decoder {
  pub fn parse(text: &str) -> Result<Self, FetchError> {
    let mut station = None;
    let mut sections: Vec<Profile> = vec![];

    for (index, line) in text.lines().enumerate() {
      let line_number = index + 1;
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      if let Some(name) = line.strip_prefix("%STATION") {
        station = Some(name.trim().to_string());
      } else if let Some(time) = line.strip_prefix("%TIME") {
        sections.push(Profile {
          time: time.trim().to_string(),
          levels: vec![],
        });
      } else {
        let level = parse_level(line).map_err(|reason| FetchError::Malformed {
          line: line_number,
          reason,
        })?;
        match sections.last_mut() {
          Some(profile) => profile.levels.push(level),
          None => {
            return Err(FetchError::Malformed {
              line: line_number,
              reason: "level before the first %TIME".to_string(),
            })
          }
        }
      }
    }

    Ok(Self { station, sections })
  }

  pub fn station(&self) -> Option<&str> {
    self.station.as_deref()
  }

  pub fn len(&self) -> usize {
    self.sections.len()
  }

  pub fn profile_times(&self, indexes: &[usize]) -> Result<Vec<String>, FetchError> {
    self
      .select(indexes)?
      .into_iter()
      .map(|index| Ok(self.sections[index].time.clone()))
      .collect()
  }

  /// Builds the requested profiles, calling `progress(done, total)` after
  /// each one.
  pub fn profiles(
    &self,
    indexes: &[usize],
    progress: impl Fn(i64, i64),
  ) -> Result<Vec<Profile>, FetchError> {
    let selected = self.select(indexes)?;
    let total = selected.len() as i64;

    let mut profiles = Vec::with_capacity(selected.len());
    for (done, index) in selected.into_iter().enumerate() {
      profiles.push(self.sections[index].clone());
      progress(done as i64 + 1, total);
    }
    Ok(profiles)
  }

  // Empty `indexes` selects everything.
  fn select(&self, indexes: &[usize]) -> Result<Vec<usize>, FetchError> {
    if indexes.is_empty() {
      return Ok((0..self.sections.len()).collect());
    }
    indexes
      .iter()
      .map(|&index| {
        if index < self.sections.len() {
          Ok(index)
        } else {
          Err(FetchError::MissingProfile {
            index,
            available: self.sections.len(),
          })
        }
      })
      .collect()
  }
}

fn parse_level(line: &str) -> Result<Level, String> {
  let values = line
    .split(',')
    .map(|field| {
      field
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("{:?} is not a number", field.trim()))
    })
    .collect::<Result<Vec<_>, _>>()?;

  match values.as_slice() {
    &[pressure, height, temperature, dewpoint] => Ok(Level {
      pressure,
      height,
      temperature,
      dewpoint,
    }),
    other => Err(format!("expected 4 fields, found {}", other.len())),
  }
}
