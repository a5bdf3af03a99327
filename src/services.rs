//! Side-effecting collaborators the interpreter drives but does not own.

use derivative::Derivative;
use log::{error, info, warn};

use crate::command::{Content, Severity, SourceRef};

/// A clickable choice as handed to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
  pub id: String,
  pub text: String,
}

pub trait Ui {
  fn write_text(&mut self, layer: &str, text: &str, instant: bool);
  fn write_image(&mut self, layer: &str, image: &str, instant: bool);
  /// Clears every text layer not listed in `preserve`.
  fn clear_text(&mut self, preserve: &[String]);
  /// Clears every image layer not listed in `preserve`.
  fn clear_images(&mut self, preserve: &[String]);
  fn clear_layer(&mut self, layer: &str);
  fn show_choices(&mut self, buttons: &[Button]);
  fn hide_choices(&mut self);
  fn spawn(&mut self, _entity: &str) {}
  fn destroy(&mut self, _entity: &str) {}
  fn is_ready(&self) -> bool {
    true
  }
  /// Skips every pending reveal animation to its end state.
  fn trigger_all(&mut self);
}

pub trait Audio {
  fn queue(&mut self, channel: &str, asset: &str);
  fn stop_channel(&mut self, channel: &str);
  fn is_ready(&self) -> bool {
    true
  }
  fn trigger_all(&mut self);
}

/// Lays out content for a timed reveal.
pub trait Writer {
  /// Returns how long the reveal takes, in milliseconds.
  fn write(&mut self, content: &[Content], instant: bool) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
  pub severity: Severity,
  pub message: String,
  pub block_id: String,
  pub index: usize,
  pub source: Option<SourceRef>,
}

pub trait Diagnostics {
  fn log(&mut self, entry: LogEntry);
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Services {
  #[derivative(Debug = "ignore")]
  pub ui: Box<dyn Ui>,
  #[derivative(Debug = "ignore")]
  pub audio: Box<dyn Audio>,
  #[derivative(Debug = "ignore")]
  pub writer: Box<dyn Writer>,
  #[derivative(Debug = "ignore")]
  pub diagnostics: Box<dyn Diagnostics>,
}

impl Services {
  /// True once the UI and audio have finished loading their assets.
  pub fn is_ready(&self) -> bool {
    self.ui.is_ready() && self.audio.is_ready()
  }
}

/// Reveals text one letter at a time at a fixed rate.
#[derive(Debug, Clone, Copy)]
pub struct TypewriterWriter {
  pub letter_delay_seconds: f64,
}

impl Writer for TypewriterWriter {
  fn write(&mut self, content: &[Content], instant: bool) -> f64 {
    if instant {
      return 0.;
    }
    let letters: usize = content
      .iter()
      .map(|item| match item {
        Content::Text { text, .. } => text.chars().filter(|c| !c.is_whitespace()).count(),
        _ => 0,
      })
      .sum();
    letters as f64 * self.letter_delay_seconds * 1000.
  }
}

#[derive(Debug, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
  fn log(&mut self, entry: LogEntry) {
    let LogEntry {
      severity,
      message,
      block_id,
      index,
      ..
    } = entry;
    match severity {
      Severity::Info => info!("{block_id}[{index}]: {message}"),
      Severity::Warning => warn!("{block_id}[{index}]: {message}"),
      Severity::Error => error!("{block_id}[{index}]: {message}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_typewriter_counts_visible_letters() {
    let mut writer = TypewriterWriter {
      letter_delay_seconds: 0.01,
    };
    let content = vec![
      Content::Text {
        text: "Hi you".to_string(),
        layer: "dialogue".to_string(),
      },
      Content::Image {
        image: "ann.png".to_string(),
        layer: "portrait".to_string(),
      },
    ];

    assert!((writer.write(&content, false) - 50.).abs() < 1e-9);
    assert_eq!(writer.write(&content, true), 0.);
  }
}
