use std::{future::Future, io, path::PathBuf, pin::Pin, sync::Arc};

use tokio::fs::File;
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<bytes::Bytes>> + Send>>;

/// An opened sounding file: its size, when known, and its contents.
pub struct Download {
  pub length: Option<u64>,
  pub body: ByteStream,
}

/// Where sounding files come from.
pub trait SoundingSource {
  /// Runs available for a station, oldest first.
  fn available_runs(&self, station: &str) -> impl Future<Output = io::Result<Vec<String>>> + Send;

  fn open(&self, station: &str, run: &str) -> impl Future<Output = io::Result<Download>> + Send;
}

/// A directory of `<station>_<run>.txt` files.
#[derive(Debug, Clone)]
pub struct LocalArchive {
  directory: Arc<str>,
  chunk_size: usize,
}

impl LocalArchive {
  pub fn new(directory: &str, chunk_size: usize) -> LocalArchive {
    LocalArchive {
      directory: Arc::from(directory),
      chunk_size,
    }
  }

  fn path(&self, station: &str, run: &str) -> PathBuf {
    PathBuf::from(self.directory.as_ref()).join(format!("{}_{}.txt", station, run))
  }

  // "OUN_2024061200.txt" -> Some("2024061200") for station OUN.
  fn run_from_file_name<'a>(station: &str, name: &'a str) -> Option<&'a str> {
    name
      .strip_prefix(station)
      .and_then(|rest| rest.strip_prefix('_'))
      .and_then(|rest| rest.strip_suffix(".txt"))
      .filter(|run| !run.is_empty() && run.chars().all(|c| c.is_ascii_digit()))
  }
}

impl SoundingSource for LocalArchive {
  async fn available_runs(&self, station: &str) -> io::Result<Vec<String>> {
    let mut read_dir = tokio::fs::read_dir(self.directory.as_ref()).await?;

    let mut runs = vec![];

    while let Some(entry) = read_dir.next_entry().await? {
      if !entry.file_type().await?.is_file() {
        continue;
      }
      let name = entry.file_name();
      if let Some(run) = name
        .to_str()
        .and_then(|name| Self::run_from_file_name(station, name))
      {
        runs.push(run.to_string());
      }
    }

    // Run names are fixed-width timestamps, so text order is time order.
    runs.sort();
    Ok(runs)
  }

  async fn open(&self, station: &str, run: &str) -> io::Result<Download> {
    let file = File::open(self.path(station, run)).await?;
    let length = file.metadata().await.ok().map(|metadata| metadata.len());
    let body = ReaderStream::with_capacity(file, self.chunk_size);

    Ok(Download {
      length,
      body: Box::pin(body),
    })
  }
}
