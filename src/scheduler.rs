//! The tick loop.
//!
//! Once per frame every active block's current command is driven through
//! execute, update and finish polling. A block keeps advancing within a
//! tick until its current command holds or it runs out of commands.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

use crate::command::Command;
use crate::config::Config;
use crate::evaluate::Evaluator;
use crate::input::{ActivationKey, InputEvents};
use crate::logic::{Checkpoint, Logic};
use crate::program::Program;
use crate::runner::{self, Activation, Context, Waiting};
use crate::services::Services;

#[derive(Debug)]
pub struct Scheduler {
  logic: Logic,
  services: Services,
  input: InputEvents,
  config: Config,
  activations: HashMap<ActivationKey, Activation>,
}

impl Scheduler {
  pub fn new(program: Program, evaluator: Box<dyn Evaluator>, services: Services, config: Config) -> Scheduler {
    Scheduler {
      logic: Logic::new(Rc::new(program), evaluator),
      services,
      input: InputEvents::default(),
      config,
      activations: HashMap::new(),
    }
  }

  pub fn logic(&self) -> &Logic {
    &self.logic
  }

  pub fn logic_mut(&mut self) -> &mut Logic {
    &mut self.logic
  }

  /// Loads the entry block; it starts running on the next tick.
  pub fn start(&mut self) {
    let entry = self.logic.program().entry.clone();
    self.logic.load_block(&entry);
  }

  /// True once no block is left running.
  pub fn is_finished(&self) -> bool {
    self.logic.active_blocks().is_empty()
  }

  pub fn is_ended(&self) -> bool {
    self.logic.state.ended
  }

  fn context(&mut self) -> Context {
    Context {
      logic: &mut self.logic,
      services: &mut self.services,
      input: &mut self.input,
      config: &self.config,
    }
  }

  pub fn tick(&mut self, delta_ms: f64) {
    let program = self.logic.program().clone();
    if !self.logic.state.ended {
      self.logic.begin_tick();
      for block_id in self.logic.active_blocks() {
        self.step_block(&program, &block_id, delta_ms);
        if self.logic.state.ended {
          break;
        }
      }
    }
    self.sweep(&program);
  }

  fn step_block(&mut self, program: &Program, block_id: &str, delta_ms: f64) {
    let commands = program.commands(block_id);
    let mut steps = 0;
    loop {
      let Some(block) = self.logic.block_state(block_id) else {
        return;
      };
      if block.finished || block.pending {
        return;
      }
      let (index, generation) = (block.current_index, block.generation);
      if index >= commands.len() {
        debug!("{block_id} ran past its last command");
        self.logic.finish_block(block_id);
        return;
      }
      if steps == self.config.max_steps() {
        warn!("{block_id}: gave up after {steps} commands in one tick");
        return;
      }
      steps += 1;

      let command = &commands[index];
      let key = ActivationKey::of(command);
      self.retire_stale(program, &key, generation);

      let mut ctx = Context {
        logic: &mut self.logic,
        services: &mut self.services,
        input: &mut self.input,
        config: &self.config,
      };
      let activation = match self.activations.entry(key.clone()) {
        Entry::Occupied(entry) => {
          let activation = entry.into_mut();
          activation.update(command, delta_ms, &mut ctx);
          activation
        }
        Entry::Vacant(entry) => {
          let activation = entry.insert(Activation::new(command, generation));
          activation.execute(command, &mut ctx);
          activation
        }
      };
      if !activation.is_finished(command, &mut ctx) {
        return;
      }
      let next = activation
        .next
        .first()
        .copied()
        .unwrap_or(index + 1)
        .min(commands.len());
      activation.destroy(command, &mut ctx);
      self.activations.remove(&key);

      let Some(block) = self.logic.block_state(block_id) else {
        return;
      };
      if block.generation != generation || block.pending {
        return;
      }
      self.logic.advance(block_id, index, next);
    }
  }

  /// Destroys activations of `current`'s block that no longer match it.
  fn retire_stale(&mut self, program: &Program, current: &ActivationKey, generation: u32) {
    let stale: Vec<ActivationKey> = self
      .activations
      .iter()
      .filter(|(key, activation)| {
        key.block_id == current.block_id && (*key != current || activation.generation != generation)
      })
      .map(|(key, _)| key.clone())
      .collect();
    for key in stale {
      self.retire(program, &key);
    }
  }

  /// Destroys activations whose block finished, moved on, or went away.
  fn sweep(&mut self, program: &Program) {
    let stale: Vec<ActivationKey> = self
      .activations
      .iter()
      .filter(|(key, activation)| match self.logic.block_state(&key.block_id) {
        Some(block) => {
          block.finished || block.generation != activation.generation || block.current_index != key.index
        }
        None => true,
      })
      .map(|(key, _)| key.clone())
      .collect();
    for key in stale {
      self.retire(program, &key);
    }
  }

  fn retire(&mut self, program: &Program, key: &ActivationKey) {
    let Some(mut activation) = self.activations.remove(key) else {
      return;
    };
    if let Some(command) = program.command_at(&key.block_id, key.index) {
      activation.destroy(command, &mut self.context());
    }
  }

  /// The activation holding each active block's current command.
  fn current(&self) -> Vec<ActivationKey> {
    self
      .logic
      .active_blocks()
      .into_iter()
      .filter_map(|block_id| {
        let index = self.logic.block_state(&block_id)?.current_index;
        Some(ActivationKey { block_id, index })
      })
      .collect()
  }

  /// Delivers a pointer-down to every listening command.
  pub fn press(&mut self) {
    self.input.press();
  }

  /// Hands a clicked button to the display offering it.
  pub fn click(&mut self, button_id: &str) -> bool {
    for key in self.current() {
      if let Some(activation) = self.activations.get_mut(&key) {
        if activation.click(button_id) {
          return true;
        }
      }
    }
    false
  }

  /// What each active block is waiting on, in activation order.
  pub fn waiting(&mut self) -> Vec<Waiting> {
    let program = self.logic.program().clone();
    self
      .current()
      .into_iter()
      .map(|key| {
        let command = program.command_at(&key.block_id, key.index);
        match (command, self.activations.get_mut(&key)) {
          (Some(command), Some(activation)) => activation.waiting(command),
          _ => Waiting::Nothing,
        }
      })
      .collect()
  }

  /// Cancels a block: its activation is destroyed and its state dropped.
  pub fn unload(&mut self, block_id: &str) {
    let program = self.logic.program().clone();
    let keys: Vec<ActivationKey> = self
      .activations
      .keys()
      .filter(|key| key.block_id == block_id)
      .cloned()
      .collect();
    for key in keys {
      self.retire(&program, &key);
    }
    self.logic.unload_block(block_id);
  }

  pub fn checkpoint(&self) -> Checkpoint {
    self.logic.checkpoint()
  }

  /// Replaces the logic state. Current commands re-execute on the next tick.
  pub fn restore(&mut self, checkpoint: Checkpoint) {
    let program = self.logic.program().clone();
    let keys: Vec<ActivationKey> = self.activations.keys().cloned().collect();
    for key in keys {
      self.retire(&program, &key);
    }
    self.input.clear();
    self.logic.restore(checkpoint);
  }

  pub fn is_savepoint(&self) -> bool {
    self.current_commands().any(runner::is_savepoint)
  }

  pub fn is_choicepoint(&self) -> bool {
    self.current_commands().any(runner::is_choicepoint)
  }

  fn current_commands(&self) -> impl Iterator<Item = &Command> + '_ {
    self
      .current()
      .into_iter()
      .filter_map(move |key| self.logic.command_at(&key.block_id, key.index))
  }

  /// Renders a command's visible effect at once.
  pub fn preview(&mut self, block_id: &str, index: usize) -> bool {
    let program = self.logic.program().clone();
    let Some(command) = program.command_at(block_id, index) else {
      return false;
    };
    runner::preview(command, &mut self.context())
  }
}
