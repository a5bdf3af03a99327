use std::collections::HashSet;

use crate::command::Command;

/// Identifies one command activation: the command at `index` in `block_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivationKey {
  pub block_id: String,
  pub index: usize,
}

impl ActivationKey {
  pub fn of(command: &Command) -> ActivationKey {
    ActivationKey {
      block_id: command.block_id.clone(),
      index: command.index,
    }
  }
}

/// Pointer-down listeners registered by running commands.
#[derive(Debug, Default)]
pub struct InputEvents {
  listeners: Vec<ActivationKey>,
  pressed: HashSet<ActivationKey>,
}

impl InputEvents {
  pub fn add_listener(&mut self, key: ActivationKey) {
    if !self.listeners.contains(&key) {
      self.listeners.push(key);
    }
  }

  pub fn remove_listener(&mut self, key: &ActivationKey) {
    self.listeners.retain(|listener| listener != key);
    self.pressed.remove(key);
  }

  pub fn listener_count(&self) -> usize {
    self.listeners.len()
  }

  /// Delivers a pointer-down to every current listener.
  pub fn press(&mut self) {
    self.pressed.extend(self.listeners.iter().cloned());
  }

  /// Consumes a press delivered to `key`.
  pub fn take_press(&mut self, key: &ActivationKey) -> bool {
    self.pressed.remove(key)
  }

  pub fn clear(&mut self) {
    self.listeners.clear();
    self.pressed.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(index: usize) -> ActivationKey {
    ActivationKey {
      block_id: "main".to_string(),
      index,
    }
  }

  #[test]
  fn test_press_reaches_only_registered_listeners_once() {
    let mut input = InputEvents::default();
    input.add_listener(key(0));

    input.press();

    assert!(input.take_press(&key(0)));
    assert!(!input.take_press(&key(0)));
    assert!(!input.take_press(&key(1)));
  }

  #[test]
  fn test_removed_listener_drops_pending_press() {
    let mut input = InputEvents::default();
    input.add_listener(key(0));
    input.press();

    input.remove_listener(&key(0));

    assert!(!input.take_press(&key(0)));
    assert_eq!(input.listener_count(), 0);
  }
}
