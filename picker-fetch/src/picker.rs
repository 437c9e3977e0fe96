use std::{cell::RefCell, rc::Rc, sync::Arc};

use picker_core::{TaskError, TaskId, TaskResult};
use picker_dispatcher::{BlockingProgress, Dispatcher};
use tracing::{error, info, warn};

use crate::{
  error::FetchError,
  fetch_config::FetchConfig,
  load::{self, LoadedSoundings},
  log_indicator::LogIndicator,
  source::SoundingSource,
};

#[derive(Debug, Default)]
pub struct Selection {
  pub runs: Vec<String>,
  pub run: Option<String>,
}

/// Drives the fetch flow on the coordinating thread: refresh the run list,
/// wait for it, then load the chosen run behind a progress display.
pub struct Picker<S> {
  config: FetchConfig,
  dispatcher: Dispatcher,
  source: Arc<S>,
  selection: Rc<RefCell<Selection>>,
}

impl<S: SoundingSource + Send + Sync + 'static> Picker<S> {
  pub fn new(config: FetchConfig, dispatcher: Dispatcher, source: S) -> Self {
    Self {
      config,
      dispatcher,
      source: Arc::new(source),
      selection: Rc::new(RefCell::new(Selection::default())),
    }
  }

  pub fn selection(&self) -> std::cell::Ref<'_, Selection> {
    self.selection.borrow()
  }

  /// Starts fetching the station's runs. The newest run becomes the
  /// selection once the list arrives.
  pub fn refresh_runs(&self) -> TaskId {
    let source = self.source.clone();
    let station = self.config.station.clone();
    let selection = self.selection.clone();

    self.dispatcher.post(
      move || load::available_runs(source.as_ref(), &station),
      move |result| {
        let mut selection = selection.borrow_mut();
        match result {
          Ok(runs) => {
            selection.run = runs.last().cloned();
            selection.runs = runs;
            info!("Selected run {:?}", selection.run);
          }
          Err(task_error) => {
            warn!("Could not list runs: {}", task_error);
            selection.runs.clear();
            selection.run = None;
          }
        }
      },
    )
  }

  /// Refreshes the run list and waits for it, so the selection is current
  /// when this returns.
  pub fn select_station(&self) {
    let id = self.refresh_runs();
    self.dispatcher.join(id);
  }

  /// Downloads and decodes the selected run, blocking until done while the
  /// pump keeps running.
  pub fn load_selected(&self) -> TaskResult<LoadedSoundings> {
    let source = self.source.clone();
    let station = self.config.station.clone();
    let run = self.selection.borrow().run.clone();
    let indexes = self.config.profiles.clone();

    let progress = BlockingProgress::new(self.dispatcher.clone(), || LogIndicator::new("Loading soundings"));
    progress.call(move |reporter| {
      let run = run.ok_or(FetchError::NoRuns {
        station: station.clone(),
      })?;
      load::load_data(source.as_ref(), &station, &run, &indexes, &reporter)
    })
  }
}

/// Tells the user a load failed, with the detail underneath.
pub fn report_failure(task_error: &TaskError) {
  error!("An error has occurred while retrieving the data.");
  error!(
    "This probably means the data are missing for some reason. Try another station or run, or try again later."
  );
  error!("Details: {}", task_error);
}
