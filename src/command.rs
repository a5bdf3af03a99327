use serde::{Deserialize, Serialize};

/// Where a command came from in the authored script.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
  #[serde(default)]
  pub file: String,
  #[serde(default)]
  pub line: usize,
  #[serde(default)]
  pub from: usize,
  #[serde(default)]
  pub to: usize,
}

/// One compiled instruction. Never mutated after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
  pub block_id: String,
  pub index: usize,
  pub parent: Option<String>,
  pub kind: CommandKind,
  pub source: Option<SourceRef>,
}

impl Command {
  pub fn as_branch(&self) -> Option<&BranchParams> {
    match &self.kind {
      CommandKind::Branch(params) => Some(params),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
  Branch(BranchParams),
  Jump(JumpParams),
  Return(ReturnParams),
  Wait(WaitParams),
  Display(DisplayParams),
  Log(LogParams),
  Spawn(EntityParams),
  Destroy(EntityParams),
  Clear(ClearParams),
  End,
  Noop,
}

impl CommandKind {
  pub fn name(&self) -> &'static str {
    match self {
      CommandKind::Branch(_) => "branch",
      CommandKind::Jump(_) => "jump",
      CommandKind::Return(_) => "return",
      CommandKind::Wait(_) => "wait",
      CommandKind::Display(_) => "display",
      CommandKind::Log(_) => "log",
      CommandKind::Spawn(_) => "spawn",
      CommandKind::Destroy(_) => "destroy",
      CommandKind::Clear(_) => "clear",
      CommandKind::End => "end",
      CommandKind::Noop => "noop",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
  If,
  Elseif,
  Else,
  End,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BranchParams {
  pub check: Check,
  #[serde(default)]
  pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JumpParams {
  pub value: String,
  pub return_when_finished: bool,
  /// Allows jumping into a block that is already waiting on the flow stack.
  pub reentrant: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReturnParams {
  pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitParams {
  pub seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayParams {
  pub content: Vec<ContentItem>,
  pub auto_advance: bool,
  pub character_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentItem {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prerequisite: Option<String>,
  #[serde(flatten)]
  pub content: Content,
}

pub const CHARACTER_NAME_LAYER: &str = "character_name";

fn default_text_layer() -> String {
  format!("dialogue")
}

fn default_image_layer() -> String {
  format!("portrait")
}

fn default_audio_channel() -> String {
  format!("sound")
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum Content {
  Text {
    text: String,
    #[serde(default = "default_text_layer")]
    layer: String,
  },
  Image {
    image: String,
    #[serde(default = "default_image_layer")]
    layer: String,
  },
  Audio {
    audio: String,
    #[serde(default = "default_audio_channel")]
    channel: String,
  },
  Button {
    button: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    target: String,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  #[default]
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogParams {
  pub severity: Severity,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EntityParams {
  pub entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClearParams {
  pub layers: Vec<String>,
  pub channels: Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_content_items_read_tag_and_prerequisite() {
    let items: Vec<ContentItem> = serde_json::from_str(
      r#"[
        {"tag": "text", "text": "Hello"},
        {"tag": "button", "button": "b1", "text": "Go", "target": "\"cave\"", "prerequisite": "has_key"}
      ]"#,
    )
    .unwrap();

    assert_eq!(
      items[0].content,
      Content::Text {
        text: "Hello".to_string(),
        layer: "dialogue".to_string()
      }
    );
    assert_eq!(items[1].prerequisite.as_deref(), Some("has_key"));
    assert!(matches!(&items[1].content, Content::Button { button, .. } if button == "b1"));
  }

  #[test]
  fn test_wait_without_seconds_defaults_to_none() {
    let params: WaitParams = serde_json::from_str("{}").unwrap();
    assert_eq!(params.seconds, None);
  }
}
