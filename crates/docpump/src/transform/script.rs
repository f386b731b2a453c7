//! Declarative inline transform language.
//!
//! Replaces dynamic expression evaluation with a fixed statement set that
//! can only touch the document it is given:
//!
//! ```text
//! set <path> = <json>   assign a JSON literal at a key path
//! unset <path>          remove a key path (no-op when absent)
//! rename <path> <path>  move a value between key paths (no-op when absent)
//! copy <path> <path>    duplicate a value between key paths (no-op when absent)
//! ```
//!
//! Statements are separated by `;` (ignored inside string literals) and
//! execute in order. Paths are dot-separated keys into nested objects.
//! Parse errors surface at compile time, before any I/O.

use serde_json::Value;

use crate::core::Document;
use crate::error::{PumpError, Result};

/// Dot-separated key path into nested objects.
type KeyPath = Vec<String>;

/// One compiled script statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Assign a JSON literal at a key path.
    Set { path: KeyPath, value: Value },

    /// Remove a key path.
    Unset { path: KeyPath },

    /// Move a value from one key path to another.
    Rename { from: KeyPath, to: KeyPath },

    /// Duplicate a value from one key path to another.
    Copy { from: KeyPath, to: KeyPath },
}

impl Statement {
    /// Execute this statement against a document, mutating it in place.
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            Statement::Set { path, value } => doc.set_path(path, value.clone()),
            Statement::Unset { path } => {
                doc.remove_path(path);
                Ok(())
            }
            Statement::Rename { from, to } => {
                if let Some(value) = doc.remove_path(from) {
                    doc.set_path(to, value)?;
                }
                Ok(())
            }
            Statement::Copy { from, to } => {
                if let Some(value) = doc.get_path(from).cloned() {
                    doc.set_path(to, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Compile an inline script into its statement list.
pub fn parse(source: &str) -> Result<Vec<Statement>> {
    split_statements(source)
        .into_iter()
        .map(|statement| parse_statement(&statement))
        .collect()
}

/// Split on `;`, honoring double-quoted string literals with `\` escapes.
fn split_statements(source: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in source.chars() {
        if in_string {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            ';' => {
                statements.push(std::mem::take(&mut current));
                continue;
            }
            '"' => in_string = true,
            _ => {}
        }
        current.push(ch);
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_statement(statement: &str) -> Result<Statement> {
    let (keyword, rest) = statement
        .split_once(char::is_whitespace)
        .unwrap_or((statement, ""));
    let rest = rest.trim();

    match keyword {
        "set" => parse_set(statement, rest),
        "unset" => Ok(Statement::Unset {
            path: parse_path(single_token(statement, rest)?)?,
        }),
        "rename" => {
            let (from, to) = two_tokens(statement, rest)?;
            Ok(Statement::Rename {
                from: parse_path(from)?,
                to: parse_path(to)?,
            })
        }
        "copy" => {
            let (from, to) = two_tokens(statement, rest)?;
            Ok(Statement::Copy {
                from: parse_path(from)?,
                to: parse_path(to)?,
            })
        }
        other => Err(syntax_error(
            statement,
            format!("unknown keyword `{}`", other),
        )),
    }
}

fn parse_set(statement: &str, rest: &str) -> Result<Statement> {
    let Some((path, literal)) = rest.split_once('=') else {
        return Err(syntax_error(statement, "expected `set <path> = <json>`"));
    };
    let literal = literal.trim();
    if literal.is_empty() {
        return Err(syntax_error(statement, "missing JSON literal after `=`"));
    }
    let value: Value = serde_json::from_str(literal)
        .map_err(|err| syntax_error(statement, format!("bad JSON literal: {}", err)))?;
    Ok(Statement::Set {
        path: parse_path(path.trim())?,
        value,
    })
}

fn single_token<'a>(statement: &str, rest: &'a str) -> Result<&'a str> {
    let mut tokens = rest.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(token), None) => Ok(token),
        _ => Err(syntax_error(statement, "expected exactly one key path")),
    }
}

fn two_tokens<'a>(statement: &str, rest: &'a str) -> Result<(&'a str, &'a str)> {
    let mut tokens = rest.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(from), Some(to), None) => Ok((from, to)),
        _ => Err(syntax_error(statement, "expected exactly two key paths")),
    }
}

fn parse_path(token: &str) -> Result<KeyPath> {
    if token.is_empty() {
        return Err(PumpError::Config("empty key path in transform".to_string()));
    }
    let path: KeyPath = token.split('.').map(str::to_string).collect();
    if path.iter().any(String::is_empty) {
        return Err(PumpError::Config(format!(
            "key path `{}` has an empty segment",
            token
        )));
    }
    Ok(path)
}

fn syntax_error(statement: &str, message: impl AsRef<str>) -> PumpError {
    PumpError::Config(format!(
        "bad transform statement `{}`: {}",
        statement,
        message.as_ref()
    ))
}
