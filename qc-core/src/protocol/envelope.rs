//! Command envelope written to the control characteristic.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::TestDefinition;

/// Session-unique command identifier of the form `<tag>_<unixMillis>`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    /// Builds an identifier from a command tag and a wall-clock timestamp.
    #[must_use]
    pub fn new(tag: &str, unix_millis: u64) -> Self {
        Self(format!("{tag}_{unix_millis}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{"id": ..., "type": ..., "payload": {...}}` command frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    #[serde(rename = "type")]
    pub command: String,
    pub payload: Map<String, Value>,
}

impl CommandEnvelope {
    /// Wraps a test definition's command and parameters under `id`.
    #[must_use]
    pub fn for_test(test: &TestDefinition, id: CommandId) -> Self {
        Self {
            id,
            command: test.command.clone(),
            payload: test.payload.clone(),
        }
    }

    /// Serializes the envelope into the text form sent over the air.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures; these cannot occur for payloads built
    /// from JSON maps but are surfaced rather than ignored.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
