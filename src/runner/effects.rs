//! Instant commands that only poke the host.

use crate::command::{ClearParams, Command, EntityParams, LogParams, Severity};
use crate::services::LogEntry;

use super::{CommandRunner, Context};

pub struct LogRunner;

impl CommandRunner for LogRunner {
  type Params = LogParams;
  type State = ();

  fn on_execute(&self, command: &Command, params: &LogParams, _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    let message = ctx.logic.format(&command.block_id, &params.message);
    ctx.services.diagnostics.log(LogEntry {
      severity: params.severity,
      message,
      block_id: command.block_id.clone(),
      index: command.index,
      source: command.source.clone(),
    });
    Vec::new()
  }
}

fn entity_names(command: &Command, params: &EntityParams, ctx: &mut Context) -> Vec<String> {
  let mut names = Vec::with_capacity(params.entities.len());
  for entity in &params.entities {
    let name = ctx.logic.format(&command.block_id, entity);
    if name.is_empty() {
      ctx.report(command, Severity::Warning, format!("entity `{entity}` names nothing"));
    } else {
      names.push(name);
    }
  }
  names
}

pub struct SpawnRunner;

impl CommandRunner for SpawnRunner {
  type Params = EntityParams;
  type State = ();

  fn on_execute(&self, command: &Command, params: &EntityParams, _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    for name in entity_names(command, params, ctx) {
      ctx.services.ui.spawn(&name);
    }
    Vec::new()
  }
}

pub struct DestroyRunner;

impl CommandRunner for DestroyRunner {
  type Params = EntityParams;
  type State = ();

  fn on_execute(&self, command: &Command, params: &EntityParams, _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    for name in entity_names(command, params, ctx) {
      ctx.services.ui.destroy(&name);
    }
    Vec::new()
  }
}

pub struct ClearRunner;

impl CommandRunner for ClearRunner {
  type Params = ClearParams;
  type State = ();

  fn on_execute(&self, _command: &Command, params: &ClearParams, _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    if params.layers.is_empty() {
      let config = ctx.config;
      ctx.services.ui.clear_text(&config.preserve_layers);
      ctx.services.ui.clear_images(&config.preserve_layers);
    } else {
      for layer in &params.layers {
        ctx.services.ui.clear_layer(layer);
      }
    }
    for channel in &params.channels {
      ctx.services.audio.stop_channel(channel);
    }
    Vec::new()
  }
}

pub struct EndRunner;

impl CommandRunner for EndRunner {
  type Params = ();
  type State = ();

  fn on_execute(&self, _command: &Command, _params: &(), _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    ctx.logic.end();
    Vec::new()
  }
}

pub struct NoopRunner;

impl CommandRunner for NoopRunner {
  type Params = ();
  type State = ();
}
