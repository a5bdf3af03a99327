use crate::command::{Command, JumpParams, ReturnParams, Severity};
use crate::logic::{CallStatus, JumpOutcome, ReturnOutcome};

use super::{CommandRunner, Context, Waiting};

pub struct JumpRunner;

#[derive(Debug, Default)]
pub struct JumpState {
  pub target: Option<String>,
  /// Flow stack entry this jump waits on.
  pub call: Option<u64>,
}

impl CommandRunner for JumpRunner {
  type Params = JumpParams;
  type State = JumpState;

  fn on_execute(&self, command: &Command, params: &JumpParams, state: &mut JumpState, ctx: &mut Context) -> Vec<usize> {
    let Some(target) = ctx.logic.resolve_target(&command.block_id, &params.value) else {
      ctx.report(
        command,
        Severity::Warning,
        format!("cannot resolve jump target `{}`", params.value),
      );
      return Vec::new();
    };
    if params.return_when_finished {
      if let Some(id) = ctx.logic.outstanding_call(&command.block_id, command.index) {
        state.call = Some(id);
        state.target = Some(target);
        return Vec::new();
      }
    }
    match ctx.logic.jump(
      &command.block_id,
      command.index,
      &target,
      params.return_when_finished,
      params.reentrant,
    ) {
      JumpOutcome::Called(id) => state.call = Some(id),
      JumpOutcome::Swapped => {}
      JumpOutcome::Refused => {
        ctx.report(command, Severity::Warning, format!("refused to re-enter {target}"));
        return Vec::new();
      }
    }
    state.target = Some(target);
    Vec::new()
  }

  fn is_finished(&self, _command: &Command, _params: &JumpParams, state: &mut JumpState, ctx: &mut Context) -> bool {
    match state.call {
      Some(id) => ctx.logic.call_status(id) != CallStatus::Pending,
      None => true,
    }
  }

  fn on_destroy(&self, _command: &Command, _params: &JumpParams, state: &mut JumpState, ctx: &mut Context) {
    if let Some(id) = state.call.take() {
      ctx.logic.forget_call(id);
    }
  }

  fn waiting(&self, _command: &Command, _params: &JumpParams, state: &JumpState) -> Waiting {
    match (&state.call, &state.target) {
      (Some(_), Some(target)) => Waiting::Call(target.clone()),
      _ => Waiting::Nothing,
    }
  }
}

pub struct ReturnRunner;

impl CommandRunner for ReturnRunner {
  type Params = ReturnParams;
  type State = ();

  fn on_execute(&self, command: &Command, params: &ReturnParams, _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    let value = if params.value.trim().is_empty() {
      None
    } else {
      match ctx.logic.try_evaluate(&command.block_id, &params.value) {
        Ok(value) => Some(value),
        Err(error) => {
          ctx.report(command, Severity::Warning, error.to_string());
          None
        }
      }
    };
    if ctx.logic.return_from_block(&command.block_id, value) == ReturnOutcome::Underflow {
      ctx.report(command, Severity::Warning, "return with no caller waiting");
    }
    vec![ctx.logic.commands(&command.block_id).len()]
  }
}
