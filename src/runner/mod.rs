//! Command runners.
//!
//! Every command kind has a runner implementing [`CommandRunner`]. Runners
//! are stateless; whatever a command needs to remember while it is the
//! current command lives in its [`Activation`], which the scheduler creates
//! when the command starts and destroys when the block moves on.

mod branch;
mod display;
mod effects;
mod jump;
mod wait;

pub use branch::{chain_end, next_chain_member, BranchRunner};
pub use display::{DisplayPhase, DisplayRunner, DisplayState};
pub use effects::{ClearRunner, DestroyRunner, EndRunner, LogRunner, NoopRunner, SpawnRunner};
pub use jump::{JumpRunner, JumpState, ReturnRunner};
pub use wait::{WaitRunner, WaitState};

use crate::command::{Command, CommandKind, Severity};
use crate::config::Config;
use crate::input::{ActivationKey, InputEvents};
use crate::logic::Logic;
use crate::services::{Button, LogEntry, Services};

/// Everything a runner may touch while it runs.
pub struct Context<'a> {
  pub logic: &'a mut Logic,
  pub services: &'a mut Services,
  pub input: &'a mut InputEvents,
  pub config: &'a Config,
}

impl Context<'_> {
  /// Sends a diagnostic about `command` to the host.
  pub fn report(&mut self, command: &Command, severity: Severity, message: impl Into<String>) {
    self.services.diagnostics.log(LogEntry {
      severity,
      message: message.into(),
      block_id: command.block_id.clone(),
      index: command.index,
      source: command.source.clone(),
    });
  }
}

/// What a block's current command is holding out for.
#[derive(Debug, Clone, PartialEq)]
pub enum Waiting {
  Nothing,
  Time,
  Forever,
  Press,
  Choice(Vec<Button>),
  Call(String),
}

pub trait CommandRunner {
  type Params;
  type State: Default;

  fn on_init(&self, _command: &Command, _params: &Self::Params, _state: &mut Self::State) {}

  /// Starts the command. An empty result falls through to the next index;
  /// otherwise execution resumes at the first index returned.
  fn on_execute(
    &self,
    _command: &Command,
    _params: &Self::Params,
    _state: &mut Self::State,
    _ctx: &mut Context,
  ) -> Vec<usize> {
    Vec::new()
  }

  fn on_update(
    &self,
    _command: &Command,
    _params: &Self::Params,
    _state: &mut Self::State,
    _delta_ms: f64,
    _ctx: &mut Context,
  ) {
  }

  fn is_finished(
    &self,
    _command: &Command,
    _params: &Self::Params,
    _state: &mut Self::State,
    _ctx: &mut Context,
  ) -> bool {
    true
  }

  fn is_choicepoint(&self, _command: &Command, _params: &Self::Params) -> bool {
    false
  }

  fn is_savepoint(&self, _command: &Command, _params: &Self::Params) -> bool {
    false
  }

  /// Renders the command's visible effect at once, without suspending.
  fn on_preview(&self, _command: &Command, _params: &Self::Params, _ctx: &mut Context) -> bool {
    false
  }

  fn on_destroy(
    &self,
    _command: &Command,
    _params: &Self::Params,
    _state: &mut Self::State,
    _ctx: &mut Context,
  ) {
  }

  fn waiting(&self, _command: &Command, _params: &Self::Params, _state: &Self::State) -> Waiting {
    Waiting::Nothing
  }
}

#[derive(Debug)]
enum RunnerState {
  Stateless(()),
  Jump(JumpState),
  Wait(WaitState),
  Display(DisplayState),
}

impl RunnerState {
  fn for_command(command: &Command) -> RunnerState {
    match command.kind {
      CommandKind::Jump(_) => RunnerState::Jump(JumpState::default()),
      CommandKind::Wait(_) => RunnerState::Wait(WaitState::default()),
      CommandKind::Display(_) => RunnerState::Display(DisplayState::default()),
      _ => RunnerState::Stateless(()),
    }
  }
}

/// Calls `$body` with the runner, params and state matching `$command`.
macro_rules! dispatch {
  ($command:expr, $state:expr, |$runner:ident, $params:ident, $slot:ident| $body:expr) => {
    match (&$command.kind, $state) {
      (CommandKind::Branch($params), RunnerState::Stateless($slot)) => {
        let $runner = BranchRunner;
        $body
      }
      (CommandKind::Jump($params), RunnerState::Jump($slot)) => {
        let $runner = JumpRunner;
        $body
      }
      (CommandKind::Return($params), RunnerState::Stateless($slot)) => {
        let $runner = ReturnRunner;
        $body
      }
      (CommandKind::Wait($params), RunnerState::Wait($slot)) => {
        let $runner = WaitRunner;
        $body
      }
      (CommandKind::Display($params), RunnerState::Display($slot)) => {
        let $runner = DisplayRunner;
        $body
      }
      (CommandKind::Log($params), RunnerState::Stateless($slot)) => {
        let $runner = LogRunner;
        $body
      }
      (CommandKind::Spawn($params), RunnerState::Stateless($slot)) => {
        let $runner = SpawnRunner;
        $body
      }
      (CommandKind::Destroy($params), RunnerState::Stateless($slot)) => {
        let $runner = DestroyRunner;
        $body
      }
      (CommandKind::Clear($params), RunnerState::Stateless($slot)) => {
        let $runner = ClearRunner;
        $body
      }
      (CommandKind::End, RunnerState::Stateless($slot)) => {
        let $runner = EndRunner;
        let $params = &();
        $body
      }
      (CommandKind::Noop, RunnerState::Stateless($slot)) => {
        let $runner = NoopRunner;
        let $params = &();
        $body
      }
      (kind, _) => unreachable!("activation state does not fit a {} command", kind.name()),
    }
  };
}

/// Transient state of the command a block is currently running.
#[derive(Debug)]
pub struct Activation {
  pub key: ActivationKey,
  /// Generation of the block state this activation belongs to.
  pub generation: u32,
  /// Indices requested by `on_execute`.
  pub next: Vec<usize>,
  finished: bool,
  destroyed: bool,
  state: RunnerState,
}

impl Activation {
  /// Creates the activation and runs `on_init`.
  pub fn new(command: &Command, generation: u32) -> Activation {
    let mut activation = Activation {
      key: ActivationKey::of(command),
      generation,
      next: Vec::new(),
      finished: false,
      destroyed: false,
      state: RunnerState::for_command(command),
    };
    dispatch!(command, &mut activation.state, |runner, params, state| {
      runner.on_init(command, params, state)
    });
    activation
  }

  pub fn execute(&mut self, command: &Command, ctx: &mut Context) {
    self.next = dispatch!(command, &mut self.state, |runner, params, state| {
      runner.on_execute(command, params, state, ctx)
    });
  }

  pub fn update(&mut self, command: &Command, delta_ms: f64, ctx: &mut Context) {
    if self.finished {
      return;
    }
    dispatch!(command, &mut self.state, |runner, params, state| {
      runner.on_update(command, params, state, delta_ms, ctx)
    });
  }

  pub fn is_finished(&mut self, command: &Command, ctx: &mut Context) -> bool {
    if !self.finished {
      self.finished = dispatch!(command, &mut self.state, |runner, params, state| {
        runner.is_finished(command, params, state, ctx)
      });
    }
    self.finished
  }

  /// Runs `on_destroy`; later calls do nothing.
  pub fn destroy(&mut self, command: &Command, ctx: &mut Context) {
    if self.destroyed {
      return;
    }
    self.destroyed = true;
    dispatch!(command, &mut self.state, |runner, params, state| {
      runner.on_destroy(command, params, state, ctx)
    });
  }

  pub fn is_destroyed(&self) -> bool {
    self.destroyed
  }

  pub fn waiting(&mut self, command: &Command) -> Waiting {
    if self.finished {
      return Waiting::Nothing;
    }
    dispatch!(command, &mut self.state, |runner, params, state| {
      runner.waiting(command, params, state)
    })
  }

  /// Hands a clicked button to a display waiting on a choice.
  pub fn click(&mut self, button_id: &str) -> bool {
    match &mut self.state {
      RunnerState::Display(state) => state.click(button_id),
      _ => false,
    }
  }
}

pub fn is_choicepoint(command: &Command) -> bool {
  dispatch!(command, &mut RunnerState::for_command(command), |runner, params, _state| {
    runner.is_choicepoint(command, params)
  })
}

pub fn is_savepoint(command: &Command) -> bool {
  dispatch!(command, &mut RunnerState::for_command(command), |runner, params, _state| {
    runner.is_savepoint(command, params)
  })
}

pub fn preview(command: &Command, ctx: &mut Context) -> bool {
  dispatch!(command, &mut RunnerState::for_command(command), |runner, params, _state| {
    runner.on_preview(command, params, ctx)
  })
}
