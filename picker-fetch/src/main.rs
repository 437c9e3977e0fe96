use picker_dispatcher::{pump::shared_event_loop, Dispatcher, DispatcherConfig, EventLoopConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fetch_config::FetchConfig;
use picker::{report_failure, Picker};
use source::LocalArchive;

mod decoder;
mod error;
mod fetch_config;
mod load;
mod log_indicator;
mod picker;
mod source;

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let subscriber = FmtSubscriber::builder()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .finish();

  tracing::subscriber::set_global_default(subscriber)?;

  let config = FetchConfig::from_env()?;
  info!("Starting picker fetch with config: {:?}", config);

  // This thread is the coordinating thread from here on.
  let event_loop = shared_event_loop(EventLoopConfig::default())?;
  let dispatcher = Dispatcher::new(event_loop, DispatcherConfig::default());
  let source = LocalArchive::new(&config.data_directory, config.chunk_size);
  let picker = Picker::new(config, dispatcher, source);

  picker.select_station();
  {
    let selection = picker.selection();
    info!(
      "{} run(s) available, selected {:?}",
      selection.runs.len(),
      selection.run
    );
  }

  match picker.load_selected() {
    Ok(loaded) => {
      info!(
        "{} run {}: {} profile(s)",
        loaded.station,
        loaded.run,
        loaded.profiles.len()
      );
      for (time, profile) in loaded.times.iter().zip(&loaded.profiles) {
        let surface = profile.levels.first();
        info!(
          "  {} with {} level(s), surface {:?}",
          time,
          profile.levels.len(),
          surface.map(|level| (level.pressure, level.temperature, level.dewpoint))
        );
      }
      Ok(())
    }
    Err(task_error) => {
      report_failure(&task_error);
      std::process::exit(1);
    }
  }
}
