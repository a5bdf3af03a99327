use crate::command::{BranchParams, Check, Command, Severity};
use crate::logic::BlockState;

use super::{CommandRunner, Context};

/// `if` / `elseif` / `else` / `end`.
pub struct BranchRunner;

/// The next member of the chain that the branch at `index` belongs to.
///
/// Nested chains are skipped by counting `if`s against `end`s, so only
/// siblings at the same depth are returned. `None` means the chain is never
/// closed.
pub fn next_chain_member(commands: &[Command], index: usize) -> Option<(usize, Check)> {
  let mut depth = 0usize;
  for command in commands.iter().skip(index + 1) {
    let Some(branch) = command.as_branch() else {
      continue;
    };
    match branch.check {
      Check::If => depth += 1,
      Check::End if depth > 0 => depth -= 1,
      check if depth == 0 => return Some((command.index, check)),
      _ => {}
    }
  }
  None
}

/// Index of the `end` closing the chain, or the block length if unclosed.
pub fn chain_end(commands: &[Command], index: usize) -> usize {
  let mut member = index;
  while let Some((next, check)) = next_chain_member(commands, member) {
    if check == Check::End {
      return next;
    }
    member = next;
  }
  commands.len()
}

/// True when the block arrived here because the previous chain member's
/// condition failed, rather than by running off the end of a taken body.
fn reached_by_failure(commands: &[Command], block: &BlockState, index: usize) -> bool {
  let (Some(previous), Some((tested, passed))) = (block.previous_index, block.last_condition) else {
    return false;
  };
  previous == tested
    && !passed
    && next_chain_member(commands, previous).map(|(member, _)| member) == Some(index)
}

impl BranchRunner {
  fn test(&self, command: &Command, params: &BranchParams, ctx: &mut Context, commands: &[Command]) -> Vec<usize> {
    let passed = match ctx.logic.try_evaluate(&command.block_id, &params.condition) {
      Ok(value) => value.is_truthy(),
      Err(error) => {
        ctx.report(command, Severity::Warning, error.to_string());
        false
      }
    };
    ctx.logic.record_condition(&command.block_id, command.index, passed);
    if passed {
      return Vec::new();
    }
    match next_chain_member(commands, command.index) {
      Some((member, Check::Else)) => vec![member + 1],
      Some((member, _)) => vec![member],
      None => {
        ctx.report(command, Severity::Warning, "branch chain is never closed");
        vec![commands.len()]
      }
    }
  }
}

impl CommandRunner for BranchRunner {
  type Params = BranchParams;
  type State = ();

  fn on_execute(&self, command: &Command, params: &BranchParams, _state: &mut (), ctx: &mut Context) -> Vec<usize> {
    let program = ctx.logic.program().clone();
    let commands = program.commands(&command.block_id);
    let by_failure = ctx
      .logic
      .block_state(&command.block_id)
      .map(|block| reached_by_failure(commands, block, command.index))
      .unwrap_or(false);
    match params.check {
      Check::If => self.test(command, params, ctx, commands),
      Check::Elseif if by_failure => self.test(command, params, ctx, commands),
      Check::Else if by_failure => Vec::new(),
      Check::Elseif | Check::Else => vec![chain_end(commands, command.index)],
      Check::End => Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::{CommandKind, LogParams};
  use crate::program::Block;

  fn branch(check: Check, condition: &str) -> CommandKind {
    CommandKind::Branch(BranchParams {
      check,
      condition: condition.to_string(),
    })
  }

  fn body(message: &str) -> CommandKind {
    CommandKind::Log(LogParams {
      message: message.to_string(),
      ..LogParams::default()
    })
  }

  #[test]
  fn test_scan_skips_nested_chains() {
    let block = Block::new(
      "main",
      None,
      vec![
        branch(Check::If, "a"),
        branch(Check::If, "b"),
        branch(Check::Else, ""),
        body("inner else"),
        branch(Check::End, ""),
        branch(Check::Elseif, "c"),
        body("outer elseif"),
        branch(Check::Else, ""),
        body("outer else"),
        branch(Check::End, ""),
      ],
    );

    assert_eq!(next_chain_member(&block.commands, 0), Some((5, Check::Elseif)));
    assert_eq!(next_chain_member(&block.commands, 1), Some((2, Check::Else)));
    assert_eq!(next_chain_member(&block.commands, 5), Some((7, Check::Else)));
    assert_eq!(chain_end(&block.commands, 0), 9);
    assert_eq!(chain_end(&block.commands, 2), 4);
  }

  #[test]
  fn test_unclosed_chain_ends_at_block_length() {
    let block = Block::new("main", None, vec![branch(Check::If, "a"), body("x")]);

    assert_eq!(next_chain_member(&block.commands, 0), None);
    assert_eq!(chain_end(&block.commands, 0), 2);
  }

  #[test]
  fn test_failure_is_recognised_only_from_the_failed_sibling() {
    let block = Block::new(
      "main",
      None,
      vec![branch(Check::If, "a"), body("x"), branch(Check::Elseif, "b"), branch(Check::End, "")],
    );
    let failed = BlockState {
      previous_index: Some(0),
      last_condition: Some((0, false)),
      ..BlockState::default()
    };
    let ran_body = BlockState {
      previous_index: Some(1),
      last_condition: Some((0, true)),
      ..BlockState::default()
    };
    let passed_with_empty_body = BlockState {
      previous_index: Some(0),
      last_condition: Some((0, true)),
      ..BlockState::default()
    };

    assert!(reached_by_failure(&block.commands, &failed, 2));
    assert!(!reached_by_failure(&block.commands, &ran_body, 2));
    assert!(!reached_by_failure(&block.commands, &passed_with_empty_body, 2));
  }
}
