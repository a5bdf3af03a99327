use crate::command::{Command, WaitParams};

use super::{CommandRunner, Context, Waiting};

pub struct WaitRunner;

#[derive(Debug, Default)]
pub struct WaitState {
  pub elapsed_ms: f64,
}

impl CommandRunner for WaitRunner {
  type Params = WaitParams;
  type State = WaitState;

  fn on_execute(&self, _command: &Command, _params: &WaitParams, state: &mut WaitState, _ctx: &mut Context) -> Vec<usize> {
    state.elapsed_ms = 0.;
    Vec::new()
  }

  fn on_update(&self, _command: &Command, _params: &WaitParams, state: &mut WaitState, delta_ms: f64, _ctx: &mut Context) {
    state.elapsed_ms += delta_ms;
  }

  fn is_finished(&self, _command: &Command, params: &WaitParams, state: &mut WaitState, _ctx: &mut Context) -> bool {
    match params.seconds {
      None => true,
      Some(seconds) if seconds == 0. || seconds.is_nan() => true,
      Some(seconds) if seconds < 0. => false,
      Some(seconds) => state.elapsed_ms / 1000. >= seconds,
    }
  }

  fn waiting(&self, _command: &Command, params: &WaitParams, _state: &WaitState) -> Waiting {
    match params.seconds {
      Some(seconds) if seconds < 0. => Waiting::Forever,
      Some(seconds) if seconds > 0. => Waiting::Time,
      _ => Waiting::Nothing,
    }
  }
}
