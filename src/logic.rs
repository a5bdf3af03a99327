//! Flow control: block states, the call/return flow stack, and choices.

use std::collections::HashMap;
use std::rc::Rc;

use derivative::Derivative;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::command::{Command, SourceRef};
use crate::error::EvalError;
use crate::evaluate::{Evaluator, Scope};
use crate::program::Program;
use crate::value::Value;

/// Runtime progress of one loaded block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
  pub current_index: usize,
  /// Index of the command that completed last.
  pub previous_index: Option<usize>,
  pub finished: bool,
  /// What this block returned when it finished.
  pub return_value: Option<Value>,
  /// What the last call made by this block returned.
  pub resumed_with: Option<Value>,
  /// The flow stack entry that is waiting on this block, if any.
  pub caller: Option<u64>,
  /// Index and outcome of the last branch condition evaluated here.
  pub last_condition: Option<(usize, bool)>,
  /// Bumped every time the block is (re)loaded.
  pub generation: u32,
  /// Loaded during the current tick; starts running on the next one.
  #[serde(default)]
  pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStackEntry {
  pub id: u64,
  pub caller_block_id: String,
  pub caller_command_index: usize,
  pub callee_block_id: String,
  pub return_when_finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
  Pending,
  Returned,
  /// The callee was unloaded or the session ended before it finished.
  Abandoned,
}

/// A call that left the flow stack, kept until its caller moves on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCall {
  pub status: CallStatus,
  pub caller_block_id: String,
  pub caller_command_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpOutcome {
  /// The target runs while the caller waits on the given flow stack entry.
  Called(u64),
  /// The target replaced the caller, which is now finished.
  Swapped,
  /// The jump would re-enter a block already on the flow stack.
  Refused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
  Popped,
  /// Nobody was waiting on the block.
  Underflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceRecord {
  pub block_id: String,
  pub choice_id: String,
  pub target: Option<String>,
  pub source: Option<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicState {
  pub blocks: HashMap<String, BlockState>,
  /// Loaded block ids in activation order.
  pub order: Vec<String>,
  pub flow_stack: Vec<FlowStackEntry>,
  pub resolved_calls: HashMap<u64, ResolvedCall>,
  pub choices: Vec<ChoiceRecord>,
  pub ended: bool,
  next_call_id: u64,
}

/// Serializable snapshot of everything `Logic` tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub state: LogicState,
}

impl Checkpoint {
  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }

  pub fn from_json(json: &str) -> serde_json::Result<Checkpoint> {
    serde_json::from_str(json)
  }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Logic {
  program: Rc<Program>,
  pub state: LogicState,
  #[derivative(Debug = "ignore")]
  evaluator: Box<dyn Evaluator>,
}

fn scope<'a>(program: &'a Program, state: &'a LogicState, block_id: &'a str) -> Scope<'a> {
  Scope {
    block_id,
    locals: program
      .ancestry(block_id)
      .into_iter()
      .map(|block| &block.variables)
      .collect(),
    returned: state
      .blocks
      .get(block_id)
      .and_then(|block| block.resumed_with.as_ref()),
  }
}

impl Logic {
  pub fn new(program: Rc<Program>, evaluator: Box<dyn Evaluator>) -> Logic {
    Logic {
      program,
      state: LogicState::default(),
      evaluator,
    }
  }

  pub fn program(&self) -> &Rc<Program> {
    &self.program
  }

  pub fn commands(&self, block_id: &str) -> &[Command] {
    self.program.commands(block_id)
  }

  pub fn command_at(&self, block_id: &str, index: usize) -> Option<&Command> {
    self.program.command_at(block_id, index)
  }

  pub fn block_state(&self, block_id: &str) -> Option<&BlockState> {
    self.state.blocks.get(block_id)
  }

  pub fn is_finished(&self, block_id: &str) -> bool {
    self
      .state
      .blocks
      .get(block_id)
      .map(|block| block.finished)
      .unwrap_or(true)
  }

  /// Loaded, unfinished blocks in activation order.
  pub fn active_blocks(&self) -> Vec<String> {
    self
      .state
      .order
      .iter()
      .filter(|id| !self.is_finished(id))
      .cloned()
      .collect()
  }

  pub fn try_evaluate(&mut self, block_id: &str, expression: &str) -> Result<Value, EvalError> {
    let scope = scope(&self.program, &self.state, block_id);
    self.evaluator.evaluate(&scope, expression)
  }

  /// Evaluates an expression, yielding `Null` if the service fails.
  pub fn evaluate(&mut self, block_id: &str, expression: &str) -> Value {
    self.try_evaluate(block_id, expression).unwrap_or_else(|error| {
      warn!("{block_id}: {error}");
      Value::Null
    })
  }

  pub fn try_format(&mut self, block_id: &str, template: &str) -> Result<String, EvalError> {
    let scope = scope(&self.program, &self.state, block_id);
    self.evaluator.format(&scope, template)
  }

  /// Formats a template, yielding an empty string if the service fails.
  pub fn format(&mut self, block_id: &str, template: &str) -> String {
    self.try_format(block_id, template).unwrap_or_else(|error| {
      warn!("{block_id}: {error}");
      String::new()
    })
  }

  /// Evaluates a block reference expression and resolves it from `block_id`.
  pub fn resolve_target(&mut self, block_id: &str, expression: &str) -> Option<String> {
    if expression.trim().is_empty() {
      return None;
    }
    let name = self.evaluate(block_id, expression).to_string();
    self
      .program
      .resolve_block(block_id, &name)
      .map(str::to_string)
  }

  /// Activates a block at its first command, resetting it if already loaded.
  pub fn load_block(&mut self, block_id: &str) -> bool {
    if self.program.block(block_id).is_none() {
      warn!("cannot load unknown block {block_id}");
      return false;
    }
    let block = self.state.blocks.entry(block_id.to_string()).or_default();
    *block = BlockState {
      generation: block.generation + 1,
      pending: true,
      ..BlockState::default()
    };
    self.state.order.retain(|id| id != block_id);
    self.state.order.push(block_id.to_string());
    debug!("loaded {block_id}");
    true
  }

  /// Drops a block's state. Calls waiting on it resolve as abandoned.
  pub fn unload_block(&mut self, block_id: &str) -> Option<BlockState> {
    let removed = self.state.blocks.remove(block_id);
    self.state.order.retain(|id| id != block_id);
    let abandoned: Vec<u64> = self
      .state
      .flow_stack
      .iter()
      .filter(|entry| entry.callee_block_id == block_id)
      .map(|entry| entry.id)
      .collect();
    for id in abandoned {
      self.resolve_call(id, CallStatus::Abandoned);
    }
    debug!("unloaded {block_id}");
    removed
  }

  fn on_flow_stack(&self, block_id: &str) -> bool {
    self
      .state
      .flow_stack
      .iter()
      .any(|entry| entry.caller_block_id == block_id || entry.callee_block_id == block_id)
  }

  pub fn jump_to_block(
    &mut self,
    caller_block_id: &str,
    caller_index: usize,
    target_block_id: &str,
    return_when_finished: bool,
  ) -> JumpOutcome {
    self.jump(caller_block_id, caller_index, target_block_id, return_when_finished, false)
  }

  /// Jumps from `caller_block_id` to `target_block_id`.
  ///
  /// With `return_when_finished` a flow stack entry is pushed and the caller
  /// keeps its place. Otherwise the target takes over the caller: the caller
  /// finishes, and whoever was waiting on the caller now waits on the target.
  pub fn jump(
    &mut self,
    caller_block_id: &str,
    caller_index: usize,
    target_block_id: &str,
    return_when_finished: bool,
    reentrant: bool,
  ) -> JumpOutcome {
    if self.program.block(target_block_id).is_none() {
      warn!("{caller_block_id}[{caller_index}]: unknown jump target {target_block_id}");
      return JumpOutcome::Refused;
    }
    if return_when_finished && target_block_id == caller_block_id {
      warn!("{caller_block_id}[{caller_index}]: a block cannot wait on itself");
      return JumpOutcome::Refused;
    }
    let swapping_self = !return_when_finished && target_block_id == caller_block_id;
    if !reentrant && !swapping_self && self.on_flow_stack(target_block_id) {
      warn!("{caller_block_id}[{caller_index}]: {target_block_id} is already on the flow stack");
      return JumpOutcome::Refused;
    }

    if return_when_finished {
      let id = self.state.next_call_id;
      self.state.next_call_id += 1;
      self.state.flow_stack.push(FlowStackEntry {
        id,
        caller_block_id: caller_block_id.to_string(),
        caller_command_index: caller_index,
        callee_block_id: target_block_id.to_string(),
        return_when_finished,
      });
      self.load_block(target_block_id);
      if let Some(target) = self.state.blocks.get_mut(target_block_id) {
        target.caller = Some(id);
      }
      debug!("{caller_block_id}[{caller_index}] calls {target_block_id} as #{id}");
      return JumpOutcome::Called(id);
    }

    let inherited = self
      .state
      .blocks
      .get(caller_block_id)
      .and_then(|caller| caller.caller);
    self.load_block(target_block_id);
    if swapping_self {
      if let Some(block) = self.state.blocks.get_mut(caller_block_id) {
        block.caller = inherited;
      }
      return JumpOutcome::Swapped;
    }
    if let Some(id) = inherited {
      if let Some(entry) = self.state.flow_stack.iter_mut().find(|entry| entry.id == id) {
        entry.callee_block_id = target_block_id.to_string();
        if let Some(target) = self.state.blocks.get_mut(target_block_id) {
          target.caller = Some(id);
        }
      }
    }
    if let Some(caller) = self.state.blocks.get_mut(caller_block_id) {
      caller.finished = true;
      caller.caller = None;
    }
    debug!("{caller_block_id}[{caller_index}] hands over to {target_block_id}");
    JumpOutcome::Swapped
  }

  /// Finishes a block on an explicit return, handing `value` to its caller.
  pub fn return_from_block(&mut self, block_id: &str, value: Option<Value>) -> ReturnOutcome {
    self.complete(block_id, value, true)
  }

  /// Finishes a block that ran past its last command.
  pub fn finish_block(&mut self, block_id: &str) {
    self.complete(block_id, None, false);
  }

  fn complete(&mut self, block_id: &str, value: Option<Value>, explicit: bool) -> ReturnOutcome {
    let position = self
      .state
      .flow_stack
      .iter()
      .rposition(|entry| entry.callee_block_id == block_id && entry.return_when_finished);
    if let Some(block) = self.state.blocks.get_mut(block_id) {
      block.finished = true;
      block.return_value = value.clone();
      block.caller = None;
    }
    let Some(position) = position else {
      if explicit {
        warn!("{block_id}: return with nobody waiting");
      }
      return ReturnOutcome::Underflow;
    };
    if position + 1 != self.state.flow_stack.len() {
      warn!("{block_id}: returning past calls that never finished");
      let above: Vec<u64> = self.state.flow_stack[position + 1..]
        .iter()
        .map(|entry| entry.id)
        .collect();
      for id in above {
        self.resolve_call(id, CallStatus::Abandoned);
      }
    }
    let entry = self.state.flow_stack.remove(position);
    self.record_resolved(&entry, CallStatus::Returned);
    if let Some(caller) = self.state.blocks.get_mut(&entry.caller_block_id) {
      caller.resumed_with = value;
    }
    debug!("{block_id} returns to {}[{}]", entry.caller_block_id, entry.caller_command_index);
    ReturnOutcome::Popped
  }

  fn record_resolved(&mut self, entry: &FlowStackEntry, status: CallStatus) {
    self.state.resolved_calls.insert(
      entry.id,
      ResolvedCall {
        status,
        caller_block_id: entry.caller_block_id.clone(),
        caller_command_index: entry.caller_command_index,
      },
    );
  }

  fn resolve_call(&mut self, id: u64, status: CallStatus) {
    let Some(position) = self.state.flow_stack.iter().position(|entry| entry.id == id) else {
      return;
    };
    let entry = self.state.flow_stack.remove(position);
    if let Some(callee) = self.state.blocks.get_mut(&entry.callee_block_id) {
      if callee.caller == Some(id) {
        callee.caller = None;
      }
    }
    self.record_resolved(&entry, status);
  }

  pub fn call_status(&self, id: u64) -> CallStatus {
    if self.state.flow_stack.iter().any(|entry| entry.id == id) {
      return CallStatus::Pending;
    }
    self
      .state
      .resolved_calls
      .get(&id)
      .map(|call| call.status)
      .unwrap_or(CallStatus::Abandoned)
  }

  /// The call made by the command at `caller_index` that has not been
  /// collected yet, pending or resolved. Lets a re-executed jump pick up
  /// its call after a restore instead of making it again.
  pub fn outstanding_call(&self, caller_block_id: &str, caller_index: usize) -> Option<u64> {
    let pending = self.state.flow_stack.iter().find(|entry| {
      entry.return_when_finished
        && entry.caller_block_id == caller_block_id
        && entry.caller_command_index == caller_index
    });
    if let Some(entry) = pending {
      return Some(entry.id);
    }
    self
      .state
      .resolved_calls
      .iter()
      .find(|(_, call)| call.caller_block_id == caller_block_id && call.caller_command_index == caller_index)
      .map(|(id, _)| *id)
  }

  /// Drops a call its caller no longer waits on. A pending call is
  /// abandoned; the callee keeps running on its own.
  pub fn forget_call(&mut self, id: u64) {
    self.resolve_call(id, CallStatus::Abandoned);
    self.state.resolved_calls.remove(&id);
  }

  /// Records a resolved choice and returns the block it leads to, if any.
  pub fn choose(
    &mut self,
    block_id: &str,
    choice_id: &str,
    target: &str,
    source: Option<SourceRef>,
  ) -> Option<String> {
    let target = self.resolve_target(block_id, target);
    debug!("{block_id}: chose {choice_id} -> {target:?}");
    self.state.choices.push(ChoiceRecord {
      block_id: block_id.to_string(),
      choice_id: choice_id.to_string(),
      target: target.clone(),
      source,
    });
    target
  }

  /// Records a branch outcome for later chain members to inspect.
  pub fn record_condition(&mut self, block_id: &str, index: usize, passed: bool) {
    if let Some(block) = self.state.blocks.get_mut(block_id) {
      block.last_condition = Some((index, passed));
    }
  }

  /// Moves a block past a completed command.
  pub fn advance(&mut self, block_id: &str, completed: usize, next: usize) {
    if let Some(block) = self.state.blocks.get_mut(block_id) {
      block.previous_index = Some(completed);
      block.current_index = next;
    }
  }

  pub fn begin_tick(&mut self) {
    for block in self.state.blocks.values_mut() {
      block.pending = false;
    }
  }

  /// Ends the session: everything finishes and pending calls are abandoned.
  pub fn end(&mut self) {
    let pending: Vec<u64> = self.state.flow_stack.iter().map(|entry| entry.id).collect();
    for id in pending {
      self.resolve_call(id, CallStatus::Abandoned);
    }
    for block in self.state.blocks.values_mut() {
      block.finished = true;
    }
    self.state.ended = true;
    debug!("session ended");
  }

  pub fn checkpoint(&self) -> Checkpoint {
    Checkpoint {
      state: self.state.clone(),
    }
  }

  pub fn restore(&mut self, checkpoint: Checkpoint) {
    self.state = checkpoint.state;
  }
}
