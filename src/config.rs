use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::LoadError;

/// Host-tunable timing and layout settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
  #[serde(default = "default_frame_rate")]
  pub frame_rate: u32,
  /// How long an auto-advancing display lingers after typing completes.
  #[serde(default = "default_auto_delay_seconds")]
  pub auto_delay_seconds: f64,
  /// How long a display stays up after the press that dismisses it.
  #[serde(default = "default_press_grace_seconds")]
  pub press_grace_seconds: f64,
  #[serde(default = "default_letter_delay_seconds")]
  pub letter_delay_seconds: f64,
  #[serde(default = "default_max_steps_per_tick")]
  pub max_steps_per_tick: usize,
  /// Layers a new display leaves untouched.
  #[serde(default)]
  pub preserve_layers: Vec<String>,
}

fn default_frame_rate() -> u32 {
  30
}

fn default_auto_delay_seconds() -> f64 {
  0.5
}

fn default_press_grace_seconds() -> f64 {
  0.03
}

fn default_letter_delay_seconds() -> f64 {
  0.025
}

fn default_max_steps_per_tick() -> usize {
  10_000
}

impl Default for Config {
  fn default() -> Self {
    Config {
      frame_rate: default_frame_rate(),
      auto_delay_seconds: default_auto_delay_seconds(),
      press_grace_seconds: default_press_grace_seconds(),
      letter_delay_seconds: default_letter_delay_seconds(),
      max_steps_per_tick: default_max_steps_per_tick(),
      preserve_layers: Vec::new(),
    }
  }
}

impl Config {
  pub fn load(path: impl AsRef<Path>) -> Result<Config, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
  }

  pub fn frame_ms(&self) -> f64 {
    1000. / self.frame_rate.max(1) as f64
  }

  /// Commands a block may run in one tick; always at least one.
  pub fn max_steps(&self) -> usize {
    self.max_steps_per_tick.max(1)
  }
}
