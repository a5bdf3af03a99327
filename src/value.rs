use std::fmt;

use serde::{Deserialize, Serialize};

/// A runtime value produced by the expression service.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
  #[default]
  Null,
  Bool(bool),
  Number(f64),
  String(String),
}

impl Value {
  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(boolean) => *boolean,
      Value::Number(number) => *number != 0. && !number.is_nan(),
      Value::String(string) => !string.is_empty(),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => Ok(()),
      Value::Bool(boolean) => write!(f, "{boolean}"),
      Value::Number(number) if number.fract() == 0. && number.abs() < 1e15 => {
        write!(f, "{}", *number as i64)
      }
      Value::Number(number) => write!(f, "{number}"),
      Value::String(string) => f.write_str(string),
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truthiness_follows_value_kind() {
    assert!(!Value::Null.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(!Value::Number(0.).is_truthy());
    assert!(!Value::String(String::new()).is_truthy());
    assert!(Value::Number(2.).is_truthy());
    assert!(Value::from("x").is_truthy());
  }

  #[test]
  fn test_whole_numbers_display_without_fraction() {
    assert_eq!(Value::Number(3.).to_string(), "3");
    assert_eq!(Value::Number(2.5).to_string(), "2.5");
    assert_eq!(Value::Null.to_string(), "");
  }

  #[test]
  fn test_untagged_json_maps_to_variants() {
    let values: Vec<Value> = serde_json::from_str(r#"[null, true, 4, "four"]"#).unwrap();
    assert_eq!(
      values,
      vec![Value::Null, Value::Bool(true), Value::Number(4.), Value::from("four")]
    );
  }
}
