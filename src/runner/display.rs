use crate::command::{Command, Content, DisplayParams, Severity, CHARACTER_NAME_LAYER};
use crate::input::ActivationKey;
use crate::logic::JumpOutcome;
use crate::services::Button;

use super::{CommandRunner, Context, Waiting};

/// Shows a line of content and holds until the player moves on.
pub struct DisplayRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayPhase {
  #[default]
  Typing,
  WaitingForPress,
  WaitingForChoice,
  /// Dismissed; lingering for the press grace period.
  Releasing,
  Finished,
}

#[derive(Debug, Clone, PartialEq)]
struct Choice {
  button: Button,
  target: String,
}

#[derive(Debug, Default)]
pub struct DisplayState {
  pub phase: DisplayPhase,
  pub elapsed_ms: f64,
  /// How long the writer needs to reveal everything.
  pub reveal_ms: f64,
  pub typed_at_ms: Option<f64>,
  pub released_at_ms: Option<f64>,
  pub chosen: Option<String>,
  choices: Vec<Choice>,
}

impl DisplayState {
  /// Accepts a click on one of this display's buttons, once.
  pub fn click(&mut self, button_id: &str) -> bool {
    if self.phase != DisplayPhase::WaitingForChoice || self.chosen.is_some() {
      return false;
    }
    if !self.choices.iter().any(|choice| choice.button.id == button_id) {
      return false;
    }
    self.chosen = Some(button_id.to_string());
    true
  }

  fn buttons(&self) -> Vec<Button> {
    self.choices.iter().map(|choice| choice.button.clone()).collect()
  }

  fn mark_typed(&mut self, ctx: &mut Context) {
    self.typed_at_ms = Some(self.elapsed_ms);
    self.phase = if self.choices.is_empty() {
      DisplayPhase::WaitingForPress
    } else {
      ctx.services.ui.show_choices(&self.buttons());
      DisplayPhase::WaitingForChoice
    };
  }
}

impl DisplayRunner {
  /// Content that passes its prerequisites, with names and variables filled in.
  fn prepare(&self, command: &Command, params: &DisplayParams, ctx: &mut Context) -> Vec<Content> {
    let program = ctx.logic.program().clone();
    let block_id = command.block_id.as_str();
    let mut named = false;
    let mut prepared = Vec::with_capacity(params.content.len());
    for item in &params.content {
      if let Some(prerequisite) = &item.prerequisite {
        if !ctx.logic.evaluate(block_id, prerequisite).is_truthy() {
          continue;
        }
      }
      prepared.push(match &item.content {
        Content::Text { text, layer } if layer == CHARACTER_NAME_LAYER && !named => {
          named = true;
          let text = match &params.character_key {
            Some(key) => program.character_name(key).to_string(),
            None => ctx.logic.format(block_id, text),
          };
          Content::Text {
            text,
            layer: layer.clone(),
          }
        }
        Content::Text { text, layer } => Content::Text {
          text: ctx.logic.format(block_id, text),
          layer: layer.clone(),
        },
        Content::Button {
          button,
          text,
          target,
        } => Content::Button {
          button: button.clone(),
          text: ctx.logic.format(block_id, text),
          target: target.clone(),
        },
        other => other.clone(),
      });
    }
    prepared
  }

  fn present(&self, content: &[Content], instant: bool, ctx: &mut Context) {
    let config = ctx.config;
    let preserve = &config.preserve_layers;
    ctx.services.ui.clear_text(preserve);
    ctx.services.ui.clear_images(preserve);
    ctx.services.ui.hide_choices();
    for item in content {
      match item {
        Content::Text { text, layer } => ctx.services.ui.write_text(layer, text, instant),
        Content::Image { image, layer } => ctx.services.ui.write_image(layer, image, instant),
        Content::Audio { audio, channel } if !instant => ctx.services.audio.queue(channel, audio),
        _ => {}
      }
    }
  }
}

fn choices(content: &[Content]) -> Vec<Choice> {
  content
    .iter()
    .filter_map(|item| match item {
      Content::Button {
        button,
        text,
        target,
      } => Some(Choice {
        button: Button {
          id: button.clone(),
          text: text.clone(),
        },
        target: target.clone(),
      }),
      _ => None,
    })
    .collect()
}

impl CommandRunner for DisplayRunner {
  type Params = DisplayParams;
  type State = DisplayState;

  fn on_execute(&self, command: &Command, params: &DisplayParams, state: &mut DisplayState, ctx: &mut Context) -> Vec<usize> {
    let content = self.prepare(command, params, ctx);
    self.present(&content, false, ctx);
    *state = DisplayState {
      reveal_ms: ctx.services.writer.write(&content, false),
      choices: choices(&content),
      ..DisplayState::default()
    };
    ctx.input.add_listener(ActivationKey::of(command));
    if state.reveal_ms <= 0. && ctx.services.is_ready() {
      state.mark_typed(ctx);
    }
    Vec::new()
  }

  fn on_update(&self, _command: &Command, _params: &DisplayParams, state: &mut DisplayState, delta_ms: f64, ctx: &mut Context) {
    // The reveal clock starts once the host has its assets loaded.
    if state.phase == DisplayPhase::Typing && !ctx.services.is_ready() {
      return;
    }
    state.elapsed_ms += delta_ms;
    if state.phase == DisplayPhase::Typing && state.elapsed_ms >= state.reveal_ms {
      state.mark_typed(ctx);
    }
  }

  fn is_finished(&self, command: &Command, params: &DisplayParams, state: &mut DisplayState, ctx: &mut Context) -> bool {
    let pressed = ctx.input.take_press(&ActivationKey::of(command));
    let grace_ms = ctx.config.press_grace_seconds * 1000.;
    match state.phase {
      DisplayPhase::Typing => {
        if pressed {
          ctx.services.ui.trigger_all();
          ctx.services.audio.trigger_all();
          state.mark_typed(ctx);
        }
      }
      DisplayPhase::WaitingForPress => {
        let typed_at = state.typed_at_ms.unwrap_or(state.elapsed_ms);
        if params.auto_advance && state.elapsed_ms - typed_at >= ctx.config.auto_delay_seconds * 1000. {
          state.phase = DisplayPhase::Finished;
        } else if pressed {
          state.released_at_ms = Some(state.elapsed_ms);
          state.phase = if grace_ms <= 0. {
            DisplayPhase::Finished
          } else {
            DisplayPhase::Releasing
          };
        }
      }
      DisplayPhase::Releasing => {
        let released_at = state.released_at_ms.unwrap_or(state.elapsed_ms);
        if state.elapsed_ms - released_at >= grace_ms {
          state.phase = DisplayPhase::Finished;
        }
      }
      DisplayPhase::WaitingForChoice => {
        if let Some(button_id) = state.chosen.clone() {
          let target = state
            .choices
            .iter()
            .find(|choice| choice.button.id == button_id)
            .map(|choice| choice.target.clone())
            .unwrap_or_default();
          ctx.services.ui.hide_choices();
          let chosen = ctx
            .logic
            .choose(&command.block_id, &button_id, &target, command.source.clone());
          if let Some(block_id) = chosen {
            let outcome = ctx.logic.jump_to_block(&command.block_id, command.index, &block_id, false);
            if outcome == JumpOutcome::Refused {
              ctx.report(command, Severity::Warning, format!("refused to re-enter {block_id}"));
            }
          }
          state.phase = DisplayPhase::Finished;
        }
      }
      DisplayPhase::Finished => {}
    }
    state.phase == DisplayPhase::Finished
  }

  fn is_choicepoint(&self, _command: &Command, params: &DisplayParams) -> bool {
    params
      .content
      .iter()
      .any(|item| matches!(item.content, Content::Button { .. }))
  }

  fn is_savepoint(&self, _command: &Command, _params: &DisplayParams) -> bool {
    true
  }

  fn on_preview(&self, command: &Command, params: &DisplayParams, ctx: &mut Context) -> bool {
    let content = self.prepare(command, params, ctx);
    ctx.services.writer.write(&content, true);
    self.present(&content, true, ctx);
    let buttons: Vec<Button> = choices(&content).into_iter().map(|choice| choice.button).collect();
    if !buttons.is_empty() {
      ctx.services.ui.show_choices(&buttons);
    }
    true
  }

  fn on_destroy(&self, command: &Command, _params: &DisplayParams, state: &mut DisplayState, ctx: &mut Context) {
    ctx.input.remove_listener(&ActivationKey::of(command));
    if state.phase == DisplayPhase::WaitingForChoice {
      ctx.services.ui.hide_choices();
    }
  }

  fn waiting(&self, _command: &Command, _params: &DisplayParams, state: &DisplayState) -> Waiting {
    match state.phase {
      DisplayPhase::Typing | DisplayPhase::Releasing => Waiting::Time,
      DisplayPhase::WaitingForPress => Waiting::Press,
      DisplayPhase::WaitingForChoice => Waiting::Choice(state.buttons()),
      DisplayPhase::Finished => Waiting::Nothing,
    }
  }
}
