//! The work that runs on worker threads: listing runs, and downloading plus
//! decoding one file while reporting progress.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use picker_core::ProgressReporter;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::{
  decoder::{Decoder, Profile},
  error::FetchError,
  source::{Download, SoundingSource},
};

#[derive(Debug, Clone)]
pub struct LoadedSoundings {
  pub station: String,
  pub run: String,
  pub times: Vec<String>,
  pub profiles: Vec<Profile>,
}

// Each worker drives its own I/O; the coordinating thread never enters it.
fn worker_runtime() -> Result<Runtime, FetchError> {
  Ok(Builder::new_current_thread().enable_all().build()?)
}

pub fn available_runs<S: SoundingSource>(source: &S, station: &str) -> Result<Vec<String>, FetchError> {
  let runs = worker_runtime()?.block_on(source.available_runs(station))?;
  if runs.is_empty() {
    return Err(FetchError::NoRuns {
      station: station.to_string(),
    });
  }
  debug!("{} runs available for {}", runs.len(), station);
  Ok(runs)
}

pub fn load_data<S: SoundingSource>(
  source: &S,
  station: &str,
  run: &str,
  indexes: &[usize],
  reporter: &ProgressReporter,
) -> Result<LoadedSoundings, FetchError> {
  reporter.text("Decoding File");
  let bytes = worker_runtime()?.block_on(download(source, station, run, reporter))?;
  let decoder = Decoder::parse(&String::from_utf8_lossy(&bytes))?;
  debug!("Decoded {} profile section(s)", decoder.len());

  reporter.text("Creating Profiles");
  let times = decoder.profile_times(indexes)?;
  let profiles = decoder.profiles(indexes, reporter.progress_sink())?;

  info!(
    "Loaded {} profile(s) for {} run {}",
    profiles.len(),
    station,
    run
  );

  Ok(LoadedSoundings {
    station: decoder.station().unwrap_or(station).to_string(),
    run: run.to_string(),
    times,
    profiles,
  })
}

async fn download<S: SoundingSource>(
  source: &S,
  station: &str,
  run: &str,
  reporter: &ProgressReporter,
) -> Result<Bytes, FetchError> {
  let Download { length, mut body } = source.open(station, run).await?;
  // Unknown length shows as an indeterminate indicator.
  let maximum = length.map_or(0, |length| length as i64);
  let mut buffer = BytesMut::with_capacity(length.unwrap_or(0) as usize);

  reporter.progress(0, maximum);
  while let Some(chunk) = body.next().await {
    buffer.extend_from_slice(&chunk?);
    reporter.progress(buffer.len() as i64, maximum);
  }

  debug!("Downloaded {} bytes for {} run {}", buffer.len(), station, run);
  Ok(buffer.freeze())
}
