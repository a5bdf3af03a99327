//! Expression service seam.
//!
//! The interpreter treats expressions as opaque strings. `VariableEvaluator`
//! is a deliberately small implementation for headless runs and tests:
//! literals, variable lookups, `!`, `==` and `!=`.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::value::Value;

/// Identifier under which a finished call's return value is visible.
pub const RETURN_VARIABLE: &str = "$return";

/// Variables visible to an expression evaluated on behalf of a block.
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
  pub block_id: &'a str,
  /// Declared variables of the block and then of each ancestor.
  pub locals: Vec<&'a HashMap<String, Value>>,
  /// Value handed back by the last call this block made.
  pub returned: Option<&'a Value>,
}

impl<'a> Scope<'a> {
  pub fn lookup(&self, name: &str) -> Option<&'a Value> {
    if name == RETURN_VARIABLE {
      return self.returned;
    }
    self.locals.iter().find_map(|&variables| variables.get(name))
  }
}

pub trait Evaluator {
  fn evaluate(&mut self, scope: &Scope, expression: &str) -> Result<Value, EvalError>;
  fn format(&mut self, scope: &Scope, template: &str) -> Result<String, EvalError>;
}

#[derive(Debug, Clone, Default)]
pub struct VariableEvaluator {
  pub globals: HashMap<String, Value>,
}

impl VariableEvaluator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, name: &str, value: impl Into<Value>) {
    self.globals.insert(name.to_string(), value.into());
  }

  fn term(&self, scope: &Scope, term: &str, expression: &str) -> Result<Value, EvalError> {
    let term = term.trim();
    if let Some(rest) = term.strip_prefix('!') {
      return Ok(Value::Bool(!self.term(scope, rest, expression)?.is_truthy()));
    }
    match term {
      "" | "null" => return Ok(Value::Null),
      "true" => return Ok(Value::Bool(true)),
      "false" => return Ok(Value::Bool(false)),
      _ => {}
    }
    if let Some(quoted) = unquote(term) {
      return Ok(Value::String(quoted.to_string()));
    }
    if let Ok(number) = term.parse::<f64>() {
      return Ok(Value::Number(number));
    }
    if !term
      .chars()
      .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$')
    {
      return Err(EvalError::new(expression, format!("unexpected `{term}`")));
    }
    scope
      .lookup(term)
      .or_else(|| self.globals.get(term))
      .cloned()
      .ok_or_else(|| EvalError::new(expression, format!("undefined variable `{term}`")))
  }
}

fn unquote(term: &str) -> Option<&str> {
  ['"', '\''].iter().find_map(|quote| {
    term
      .strip_prefix(*quote)
      .and_then(|rest| rest.strip_suffix(*quote))
  })
}

impl Evaluator for VariableEvaluator {
  fn evaluate(&mut self, scope: &Scope, expression: &str) -> Result<Value, EvalError> {
    if let Some((left, right)) = expression.split_once("!=") {
      let equal = self.term(scope, left, expression)? == self.term(scope, right, expression)?;
      return Ok(Value::Bool(!equal));
    }
    if let Some((left, right)) = expression.split_once("==") {
      let equal = self.term(scope, left, expression)? == self.term(scope, right, expression)?;
      return Ok(Value::Bool(equal));
    }
    self.term(scope, expression, expression)
  }

  fn format(&mut self, scope: &Scope, template: &str) -> Result<String, EvalError> {
    let mut formatted = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
      formatted.push_str(&rest[..open]);
      let Some(close) = rest[open..].find('}') else {
        return Err(EvalError::new(template, "unterminated `{`"));
      };
      let inner = &rest[open + 1..open + close];
      formatted.push_str(&self.evaluate(scope, inner)?.to_string());
      rest = &rest[open + close + 1..];
    }
    formatted.push_str(rest);
    Ok(formatted)
  }
}
