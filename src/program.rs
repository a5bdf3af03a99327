//! The compiled program image: blocks, their commands, and characters.
//!
//! Loading goes through raw serde structs that mirror the compiler's JSON and
//! are then converted into the runtime structs.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::command::{Command, CommandKind, SourceRef};
use crate::error::LoadError;
use crate::value::Value;

#[derive(Debug)]
pub struct Program {
  pub entry: String,
  pub blocks: HashMap<String, Block>,
  pub characters: HashMap<String, Character>,
  scope_name_to_id: HashMap<(Option<String>, String), String>,
}

/// A callable scene or function.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
  pub id: String,
  pub name: String,
  pub parent: Option<String>,
  pub variables: HashMap<String, Value>,
  pub commands: Vec<Command>,
}

impl Block {
  /// Builds a block from bare command kinds, numbering them in order.
  pub fn new(id: &str, parent: Option<&str>, kinds: Vec<CommandKind>) -> Block {
    let commands = kinds
      .into_iter()
      .enumerate()
      .map(|(index, kind)| Command {
        block_id: id.to_string(),
        index,
        parent: parent.map(str::to_string),
        kind,
        source: None,
      })
      .collect();
    Block {
      id: id.to_string(),
      name: id.rsplit('.').next().unwrap_or(id).to_string(),
      parent: parent.map(str::to_string),
      variables: HashMap::new(),
      commands,
    }
  }

  pub fn with_variable(mut self, name: &str, value: Value) -> Block {
    self.variables.insert(name.to_string(), value);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Character {
  pub name: String,
}

impl Program {
  pub fn new(
    entry: &str,
    blocks: Vec<Block>,
    characters: HashMap<String, Character>,
  ) -> Result<Program, LoadError> {
    let blocks: HashMap<String, Block> = blocks
      .into_iter()
      .map(|block| (block.id.clone(), block))
      .collect();
    let mut scope_name_to_id = HashMap::with_capacity(blocks.len());
    for block in blocks.values() {
      if let Some(parent) = &block.parent {
        if !blocks.contains_key(parent) {
          return Err(LoadError::UnknownParent {
            block_id: block.id.clone(),
            parent: parent.clone(),
          });
        }
      }
      for (position, command) in block.commands.iter().enumerate() {
        if command.block_id != block.id || command.index != position {
          return Err(LoadError::CommandMismatch {
            block_id: block.id.clone(),
            position,
            claimed_block_id: command.block_id.clone(),
            claimed_index: command.index,
          });
        }
      }
      match scope_name_to_id.entry((block.parent.clone(), block.name.clone())) {
        Entry::Vacant(slot) => {
          slot.insert(block.id.clone());
        }
        Entry::Occupied(slot) => {
          let mut ids = [slot.get().clone(), block.id.clone()];
          ids.sort();
          let [first, second] = ids;
          return Err(LoadError::DuplicateName {
            name: block.name.clone(),
            first,
            second,
          });
        }
      }
    }
    if !blocks.contains_key(entry) {
      return Err(LoadError::MissingEntry(entry.to_string()));
    }
    Ok(Program {
      entry: entry.to_string(),
      blocks,
      characters,
      scope_name_to_id,
    })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Program, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let raw: RawProgram = serde_json::from_reader(BufReader::new(file))?;
    raw.into_program()
  }

  pub fn from_json(json: &str) -> Result<Program, LoadError> {
    let raw: RawProgram = serde_json::from_str(json)?;
    raw.into_program()
  }

  pub fn block(&self, block_id: &str) -> Option<&Block> {
    self.blocks.get(block_id)
  }

  pub fn commands(&self, block_id: &str) -> &[Command] {
    self
      .blocks
      .get(block_id)
      .map(|block| block.commands.as_slice())
      .unwrap_or(&[])
  }

  pub fn command_at(&self, block_id: &str, index: usize) -> Option<&Command> {
    self.commands(block_id).get(index)
  }

  /// The block itself followed by its ancestors, innermost first.
  pub fn ancestry(&self, block_id: &str) -> Vec<&Block> {
    let mut chain = Vec::new();
    let mut next = self.blocks.get(block_id);
    while let Some(block) = next {
      chain.push(block);
      next = block.parent.as_deref().and_then(|parent| self.blocks.get(parent));
    }
    chain
  }

  /// Resolves a block reference as seen from `from`: an exact id first, then
  /// a child of `from` or of one of its ancestors, then a root block.
  pub fn resolve_block(&self, from: &str, target: &str) -> Option<&str> {
    let target = target.trim();
    if target.is_empty() {
      return None;
    }
    if let Some(block) = self.blocks.get(target) {
      return Some(block.id.as_str());
    }
    for scope in self.ancestry(from) {
      if let Some(id) = self
        .scope_name_to_id
        .get(&(Some(scope.id.clone()), target.to_string()))
      {
        return Some(id.as_str());
      }
    }
    self
      .scope_name_to_id
      .get(&(None, target.to_string()))
      .map(String::as_str)
  }

  pub fn character_name<'a>(&'a self, key: &'a str) -> &'a str {
    self
      .characters
      .get(key)
      .map(|character| character.name.as_str())
      .unwrap_or(key)
  }
}

#[derive(Deserialize)]
struct RawProgram {
  #[serde(default = "default_entry")]
  entry: String,
  blocks: HashMap<String, RawBlock>,
  #[serde(default)]
  characters: HashMap<String, Character>,
}

fn default_entry() -> String {
  format!("main")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  parent: Option<String>,
  #[serde(default)]
  variables: HashMap<String, Value>,
  #[serde(default)]
  commands: Vec<RawCommand>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommand {
  block_id: String,
  index: usize,
  kind: String,
  #[serde(default)]
  parent: Option<String>,
  #[serde(default)]
  params: serde_json::Value,
  #[serde(default)]
  source: Option<SourceRef>,
}

impl RawProgram {
  fn into_program(self) -> Result<Program, LoadError> {
    let blocks = self
      .blocks
      .into_iter()
      .map(|(id, raw)| Block {
        name: raw
          .name
          .unwrap_or_else(|| id.rsplit('.').next().unwrap_or(&id).to_string()),
        parent: raw.parent,
        variables: raw.variables,
        commands: raw.commands.into_iter().map(RawCommand::into_command).collect(),
        id,
      })
      .collect();
    Program::new(&self.entry, blocks, self.characters)
  }
}

impl RawCommand {
  fn into_command(self) -> Command {
    let kind = self.convert_kind();
    debug!("loaded {}[{}] as {}", self.block_id, self.index, kind.name());
    Command {
      block_id: self.block_id,
      index: self.index,
      parent: self.parent,
      kind,
      source: self.source,
    }
  }

  fn convert_kind(&self) -> CommandKind {
    match self.kind.as_str() {
      "branch" => self.params().map(CommandKind::Branch),
      "jump" => self.params().map(CommandKind::Jump),
      "return" => self.params().map(CommandKind::Return),
      "wait" => self.params().map(CommandKind::Wait),
      "display" => self.params().map(CommandKind::Display),
      "log" => self.params().map(CommandKind::Log),
      "spawn" => self.params().map(CommandKind::Spawn),
      "destroy" => self.params().map(CommandKind::Destroy),
      "clear" => self.params().map(CommandKind::Clear),
      "end" => Some(CommandKind::End),
      other => {
        warn!("{}[{}]: unknown command kind {other:?}", self.block_id, self.index);
        Some(CommandKind::Noop)
      }
    }
    .unwrap_or(CommandKind::Noop)
  }

  fn params<T: DeserializeOwned>(&self) -> Option<T> {
    let params = match &self.params {
      serde_json::Value::Null => serde_json::Value::Object(Default::default()),
      params => params.clone(),
    };
    serde_json::from_value(params)
      .map_err(|error| {
        warn!(
          "{}[{}]: malformed {} params, treating as no-op: {error}",
          self.block_id, self.index, self.kind
        )
      })
      .ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::{BranchParams, Check, WaitParams};

  const STORY: &str = r#"{
    "entry": "main",
    "characters": {"ann": {"name": "Ann Bell"}},
    "blocks": {
      "main": {
        "variables": {"gold": 3},
        "commands": [
          {"blockId": "main", "index": 0, "kind": "wait", "params": {"seconds": 1.5}},
          {"blockId": "main", "index": 1, "kind": "branch", "params": {"check": "if", "condition": "gold"}},
          {"blockId": "main", "index": 2, "kind": "teleport", "params": {}},
          {"blockId": "main", "index": 3, "kind": "wait", "params": {"seconds": "soon"}}
        ]
      },
      "main.cave": {"name": "cave", "parent": "main", "commands": []},
      "main.cave.pool": {"name": "pool", "parent": "main.cave", "commands": []},
      "town": {"commands": []}
    }
  }"#;

  #[test]
  fn test_load_converts_commands() {
    let program = Program::from_json(STORY).unwrap();
    let commands = program.commands("main");

    assert_eq!(commands.len(), 4);
    assert_eq!(commands[0].kind, CommandKind::Wait(WaitParams { seconds: Some(1.5) }));
    assert_eq!(
      commands[1].kind,
      CommandKind::Branch(BranchParams {
        check: Check::If,
        condition: "gold".to_string()
      })
    );
    assert_eq!(program.block("main").unwrap().variables["gold"], Value::Number(3.));
  }

  #[test]
  fn test_unknown_kind_and_malformed_params_become_noops() {
    let program = Program::from_json(STORY).unwrap();

    assert_eq!(program.commands("main")[2].kind, CommandKind::Noop);
    assert_eq!(program.commands("main")[3].kind, CommandKind::Noop);
  }

  #[test]
  fn test_mismatched_index_is_rejected() {
    let json = r#"{"blocks": {"main": {"commands": [
      {"blockId": "main", "index": 1, "kind": "end"}
    ]}}}"#;

    let error = Program::from_json(json).unwrap_err();

    assert!(matches!(error, LoadError::CommandMismatch { position: 0, claimed_index: 1, .. }));
  }

  #[test]
  fn test_sibling_blocks_sharing_a_name_are_rejected() {
    let json = r#"{"blocks": {
      "main": {"commands": []},
      "main.a": {"name": "cave", "parent": "main", "commands": []},
      "main.b": {"name": "cave", "parent": "main", "commands": []},
      "town.cave": {"name": "cave", "commands": []}
    }}"#;

    let error = Program::from_json(json).unwrap_err();

    assert!(matches!(
      error,
      LoadError::DuplicateName { name, first, second }
        if name == "cave" && first == "main.a" && second == "main.b"
    ));
  }

  #[test]
  fn test_missing_entry_is_rejected() {
    let error = Program::from_json(r#"{"entry": "start", "blocks": {}}"#).unwrap_err();
    assert!(matches!(error, LoadError::MissingEntry(entry) if entry == "start"));
  }

  #[test]
  fn test_resolve_block_walks_outward_from_caller() {
    let program = Program::from_json(STORY).unwrap();

    assert_eq!(program.resolve_block("main.cave.pool", "cave"), Some("main.cave"));
    assert_eq!(program.resolve_block("main.cave", "pool"), Some("main.cave.pool"));
    assert_eq!(program.resolve_block("main.cave.pool", "town"), Some("town"));
    assert_eq!(program.resolve_block("main", "main.cave"), Some("main.cave"));
    assert_eq!(program.resolve_block("town", "pool"), None);
    assert_eq!(program.resolve_block("main", "  "), None);
  }

  #[test]
  fn test_character_name_falls_back_to_key() {
    let program = Program::from_json(STORY).unwrap();

    assert_eq!(program.character_name("ann"), "Ann Bell");
    assert_eq!(program.character_name("bob"), "bob");
  }
}
