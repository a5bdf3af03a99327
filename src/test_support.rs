//! Recording service doubles and command builders for tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::command::{
  BranchParams, Check, CommandKind, Content, ContentItem, DisplayParams, JumpParams, LogParams,
  ReturnParams, Severity, WaitParams,
};
use crate::config::Config;
use crate::evaluate::VariableEvaluator;
use crate::program::{Block, Program};
use crate::scheduler::Scheduler;
use crate::services::{Audio, Button, Diagnostics, LogEntry, Services, Ui, Writer};

/// Everything the doubles saw, in call order.
#[derive(Debug, Default)]
pub struct Record {
  pub texts: Vec<(String, String)>,
  pub images: Vec<(String, String)>,
  pub preserved: Vec<Vec<String>>,
  pub cleared_layers: Vec<String>,
  pub shown_choices: Vec<Vec<Button>>,
  pub hidden_choices: usize,
  pub spawned: Vec<String>,
  pub destroyed: Vec<String>,
  pub triggered: usize,
  pub queued: Vec<(String, String)>,
  pub stopped: Vec<String>,
  pub logs: Vec<LogEntry>,
  /// While set, the UI reports that its assets are still loading.
  pub loading: bool,
}

pub type Shared = Rc<RefCell<Record>>;

#[derive(Debug, Clone)]
pub struct RecordingUi(pub Shared);

impl Ui for RecordingUi {
  fn write_text(&mut self, layer: &str, text: &str, _instant: bool) {
    self.0.borrow_mut().texts.push((layer.to_string(), text.to_string()));
  }

  fn write_image(&mut self, layer: &str, image: &str, _instant: bool) {
    self.0.borrow_mut().images.push((layer.to_string(), image.to_string()));
  }

  fn clear_text(&mut self, preserve: &[String]) {
    self.0.borrow_mut().preserved.push(preserve.to_vec());
  }

  fn clear_images(&mut self, preserve: &[String]) {
    self.0.borrow_mut().preserved.push(preserve.to_vec());
  }

  fn clear_layer(&mut self, layer: &str) {
    self.0.borrow_mut().cleared_layers.push(layer.to_string());
  }

  fn show_choices(&mut self, buttons: &[Button]) {
    self.0.borrow_mut().shown_choices.push(buttons.to_vec());
  }

  fn hide_choices(&mut self) {
    self.0.borrow_mut().hidden_choices += 1;
  }

  fn spawn(&mut self, entity: &str) {
    self.0.borrow_mut().spawned.push(entity.to_string());
  }

  fn destroy(&mut self, entity: &str) {
    self.0.borrow_mut().destroyed.push(entity.to_string());
  }

  fn is_ready(&self) -> bool {
    !self.0.borrow().loading
  }

  fn trigger_all(&mut self) {
    self.0.borrow_mut().triggered += 1;
  }
}

#[derive(Debug, Clone)]
pub struct RecordingAudio(pub Shared);

impl Audio for RecordingAudio {
  fn queue(&mut self, channel: &str, asset: &str) {
    self.0.borrow_mut().queued.push((channel.to_string(), asset.to_string()));
  }

  fn stop_channel(&mut self, channel: &str) {
    self.0.borrow_mut().stopped.push(channel.to_string());
  }

  fn trigger_all(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct RecordingDiagnostics(pub Shared);

impl Diagnostics for RecordingDiagnostics {
  fn log(&mut self, entry: LogEntry) {
    self.0.borrow_mut().logs.push(entry);
  }
}

/// A writer whose every reveal takes the same time.
#[derive(Debug, Clone, Copy)]
pub struct FixedWriter(pub f64);

impl Writer for FixedWriter {
  fn write(&mut self, _content: &[Content], instant: bool) -> f64 {
    if instant {
      0.
    } else {
      self.0
    }
  }
}

pub fn recording_services(reveal_ms: f64) -> (Services, Shared) {
  let record = Shared::default();
  let services = Services {
    ui: Box::new(RecordingUi(record.clone())),
    audio: Box::new(RecordingAudio(record.clone())),
    writer: Box::new(FixedWriter(reveal_ms)),
    diagnostics: Box::new(RecordingDiagnostics(record.clone())),
  };
  (services, record)
}

/// A scheduler over `blocks` with `main` as entry and instant reveals.
pub fn scheduler(blocks: Vec<Block>) -> (Scheduler, Shared) {
  scheduler_with(blocks, VariableEvaluator::new(), 0.)
}

pub fn scheduler_with(blocks: Vec<Block>, evaluator: VariableEvaluator, reveal_ms: f64) -> (Scheduler, Shared) {
  let program = Program::new("main", blocks, HashMap::new()).unwrap();
  let (services, record) = recording_services(reveal_ms);
  let scheduler = Scheduler::new(program, Box::new(evaluator), services, Config::default());
  (scheduler, record)
}

fn logged(record: &Shared, severity: Severity) -> Vec<String> {
  record
    .borrow()
    .logs
    .iter()
    .filter(|entry| entry.severity == severity)
    .map(|entry| entry.message.clone())
    .collect()
}

/// Messages of `info` log entries, which tests use as body markers.
pub fn messages(record: &Shared) -> Vec<String> {
  logged(record, Severity::Info)
}

pub fn warnings(record: &Shared) -> Vec<String> {
  logged(record, Severity::Warning)
}

pub fn branch(check: Check, condition: &str) -> CommandKind {
  CommandKind::Branch(BranchParams {
    check,
    condition: condition.to_string(),
  })
}

pub fn log(message: &str) -> CommandKind {
  CommandKind::Log(LogParams {
    severity: Severity::Info,
    message: message.to_string(),
  })
}

pub fn jump(value: &str, return_when_finished: bool) -> CommandKind {
  CommandKind::Jump(JumpParams {
    value: value.to_string(),
    return_when_finished,
    reentrant: false,
  })
}

pub fn ret(value: &str) -> CommandKind {
  CommandKind::Return(ReturnParams {
    value: value.to_string(),
  })
}

pub fn wait(seconds: Option<f64>) -> CommandKind {
  CommandKind::Wait(WaitParams { seconds })
}

pub fn text_item(text: &str, layer: &str, prerequisite: Option<&str>) -> ContentItem {
  ContentItem {
    prerequisite: prerequisite.map(str::to_string),
    content: Content::Text {
      text: text.to_string(),
      layer: layer.to_string(),
    },
  }
}

pub fn display_params(text: &str) -> DisplayParams {
  DisplayParams {
    content: vec![text_item(text, "dialogue", None)],
    ..DisplayParams::default()
  }
}

pub fn display(text: &str) -> CommandKind {
  CommandKind::Display(display_params(text))
}

/// A display asking a question with one button per `(id, target)`.
pub fn choice(buttons: &[(&str, &str)]) -> CommandKind {
  let mut params = display_params("Which way?");
  for (button, target) in buttons {
    params.content.push(ContentItem {
      prerequisite: None,
      content: Content::Button {
        button: button.to_string(),
        text: button.to_string(),
        target: target.to_string(),
      },
    });
  }
  CommandKind::Display(params)
}
