//! Modifier compilation: turns transform specifications into an ordered
//! list of in-place document mutators.
//!
//! A specification entry is either a plugin reference `@<name>?<query>`,
//! resolved against a [`TransformRegistry`] of pre-registered typed
//! functions, or an inline script in a small declarative language (see
//! [`script`]). Compiled modifiers are pure with respect to everything
//! except the document they receive; nothing is cached across compile
//! calls and there is no hot reload.
//!
//! A modifier that fails at run time aborts the run: it signals a defect
//! in caller-supplied logic, not a transient condition.

mod script;

pub use script::Statement;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::core::Document;
use crate::error::{PumpError, Result};

/// A registered plugin transform: mutates the document in place using the
/// key/value parameters from the reference's query string.
pub type TransformFn =
    Arc<dyn Fn(&mut Document, &BTreeMap<String, String>) -> Result<()> + Send + Sync>;

/// Registry of named plugin transforms.
///
/// Plugins are registered ahead of the run and looked up at compile time;
/// an unknown name is a configuration error, not a runtime one.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    plugins: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin transform under the given name.
    pub fn register<F>(&mut self, name: impl Into<String>, plugin: F)
    where
        F: Fn(&mut Document, &BTreeMap<String, String>) -> Result<()> + Send + Sync + 'static,
    {
        self.plugins.insert(name.into(), Arc::new(plugin));
    }

    fn get(&self, name: &str) -> Option<&TransformFn> {
        self.plugins.get(name)
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.plugins.keys().collect();
        names.sort();
        f.debug_struct("TransformRegistry")
            .field("plugins", &names)
            .finish()
    }
}

/// A compiled document mutator.
pub enum Modifier {
    /// A registry plugin bound to its parsed query parameters.
    Plugin {
        name: String,
        params: BTreeMap<String, String>,
        func: TransformFn,
    },

    /// A compiled inline script.
    Script {
        source: String,
        statements: Vec<Statement>,
    },
}

impl Modifier {
    /// Apply this modifier to a document, mutating it in place.
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            Modifier::Plugin { name, params, func } => func(doc, params).map_err(|err| {
                PumpError::transform(format!("plugin `{}` failed: {}", name, err))
            }),
            Modifier::Script { statements, .. } => {
                for statement in statements {
                    statement.apply(doc)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Plugin { name, params, .. } => f
                .debug_struct("Plugin")
                .field("name", name)
                .field("params", params)
                .finish(),
            Modifier::Script { source, .. } => {
                f.debug_struct("Script").field("source", source).finish()
            }
        }
    }
}

/// Compile transform specifications into an ordered modifier list.
pub fn compile(specs: &[String], registry: &TransformRegistry) -> Result<Vec<Modifier>> {
    specs
        .iter()
        .map(|spec| {
            if let Some(reference) = spec.strip_prefix('@') {
                compile_plugin(reference, registry)
            } else {
                let statements = script::parse(spec)?;
                Ok(Modifier::Script {
                    source: spec.clone(),
                    statements,
                })
            }
        })
        .collect()
}

fn compile_plugin(reference: &str, registry: &TransformRegistry) -> Result<Modifier> {
    let (name, query) = match reference.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (reference, None),
    };
    if name.is_empty() {
        return Err(PumpError::Config(
            "transform plugin reference has no name".to_string(),
        ));
    }
    let func = registry.get(name).ok_or_else(|| {
        PumpError::Config(format!("transform plugin `{}` is not registered", name))
    })?;
    Ok(Modifier::Plugin {
        name: name.to_string(),
        params: parse_params(query.unwrap_or("")),
        func: Arc::clone(func),
    })
}

/// Parse a query string into key/value parameters using form-encoding
/// rules: `+` decodes to a space and percent-decoding applies to values
/// only; keys are taken verbatim. A key without `=` maps to the empty
/// string.
pub fn parse_params(query: &str) -> BTreeMap<String, String> {
    let query = query.strip_prefix(['?', '#']).unwrap_or(query);

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), form_decode(value)),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn form_decode(value: &str) -> String {
    let bytes = value.replace('+', " ").into_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
