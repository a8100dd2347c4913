// Session context handling.
//
// Callers hand in request-scoped variables (`$user.id`, `$valid.from`, ...).
// A static alias table mirrors canonical variables under the names older
// SQL still refers to, and the result is merged into the connection's
// session context until the connection is released.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::models::{RemoteConnection, SessionContext};

/// Alias name to canonical variable name. Read-only after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAliases {
    aliases: BTreeMap<String, String>,
}

impl SessionAliases {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Load a JSON object of `"ALIAS": "$canonical"` pairs.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Configuration(format!("Failed to read session aliases {}: {}", path.display(), e))
        })?;
        let aliases: BTreeMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            ServiceError::Configuration(format!("Invalid session aliases {}: {}", path.display(), e))
        })?;
        Ok(Self::new(aliases))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, c)| (a.as_str(), c.as_str()))
    }

    /// Copy each present canonical value onto its alias key.
    ///
    /// An alias the caller supplied explicitly is kept as given.
    pub fn enrich(&self, variables: &mut Map<String, Value>) {
        for (alias, canonical) in &self.aliases {
            if variables.contains_key(alias) {
                continue;
            }
            let value = match variables.get(canonical) {
                Some(value) if is_present(value) => value.clone(),
                _ => continue,
            };
            variables.insert(alias.clone(), value);
        }
    }
}

impl Default for SessionAliases {
    fn default() -> Self {
        let aliases = [
            ("APPLICATIONUSER", "$user.id"),
            ("LOCALE", "$user.locale"),
            ("VALID-FROM", "$valid.from"),
            ("VALID-TO", "$valid.to"),
        ]
        .into_iter()
        .map(|(a, c)| (a.to_string(), c.to_string()))
        .collect();
        Self::new(aliases)
    }
}

// Empty and false values are treated as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Applies session variables to connections.
#[derive(Debug, Clone, Default)]
pub struct SessionContextManager {
    aliases: SessionAliases,
}

impl SessionContextManager {
    pub fn new(aliases: SessionAliases) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &SessionAliases {
        &self.aliases
    }

    /// Enrich `variables` with aliases and merge them over the connection's
    /// session context.
    pub fn set(&self, connection: Option<&mut RemoteConnection>, mut variables: Map<String, Value>) -> Result<()> {
        let connection = connection.ok_or_else(|| {
            ServiceError::Session("Cannot set session context: No database connection".to_string())
        })?;

        self.aliases.enrich(&mut variables);
        debug!(
            "Setting {} session variables on connection {}",
            variables.len(),
            connection.id
        );

        connection
            .session
            .get_or_insert_with(SessionContext::new)
            .extend(variables);
        Ok(())
    }

    /// Drop the session context so the next request starts empty.
    pub fn clear(&self, connection: &mut RemoteConnection) {
        connection.session = None;
    }
}
