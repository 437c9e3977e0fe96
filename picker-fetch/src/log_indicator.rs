use picker_dispatcher::ProgressIndicator;
use tracing::{debug, info};

/// Progress "dialog" for a headless run: every change goes to the log.
#[derive(Debug)]
pub struct LogIndicator {
  title: String,
  minimum: i64,
  maximum: i64,
  value: i64,
  label: String,
  visible: bool,
}

impl LogIndicator {
  pub fn new(title: &str) -> Self {
    Self {
      title: title.to_string(),
      minimum: 0,
      maximum: 0,
      value: 0,
      label: String::new(),
      visible: false,
    }
  }

  pub fn is_indeterminate(&self) -> bool {
    self.maximum <= self.minimum
  }
}

impl ProgressIndicator for LogIndicator {
  fn set_range(&mut self, minimum: i64, maximum: i64) {
    self.minimum = minimum;
    self.maximum = maximum;
  }

  fn set_value(&mut self, value: i64) {
    self.value = value;
  }

  fn set_label(&mut self, text: &str) {
    if self.label == text {
      return;
    }
    self.label = text.to_string();
    if self.is_indeterminate() {
      info!("[{}] {}", self.title, self.label);
    } else {
      debug!("[{}] {}", self.title, self.label);
    }
  }

  fn open(&mut self) {
    self.visible = true;
    info!("[{}] started", self.title);
  }

  fn close(&mut self) {
    self.visible = false;
    info!("[{}] finished", self.title);
  }
}
