use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// An intent to change the system (command abstraction).
///
/// Commands represent **intent** - a request to perform an action. They are
/// **transient** (never written to the event log) and, when accepted, turn into
/// events (which are).
///
/// ## Routing
///
/// `COMMAND_TYPE` is the routing key: the command bus resolves exactly one
/// handler per command type. Because commands may cross a queue, they must be
/// serializable; `to_serialized()` produces the transport form.
///
/// ## Design Constraints
///
/// - **Cloneable**: commands may be copied for retries and logging
/// - **Send + Sync + 'static**: commands cross thread boundaries (consumers)
pub trait Command: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, unique command name (e.g. "building.check_in_user").
    const COMMAND_TYPE: &'static str;

    /// Serialize into the transport form used by the command bus and queues.
    fn to_serialized(&self) -> Result<SerializedCommand, serde_json::Error> {
        Ok(SerializedCommand {
            command_type: Self::COMMAND_TYPE.to_string(),
            payload: serde_json::to_value(self)?,
            issued_at: Utc::now(),
        })
    }
}

#[derive(Debug, Error)]
pub enum CommandDecodeError {
    #[error("expected command type '{expected}', found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("malformed command payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A command in transport form: `{type, payload}` plus the time it was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedCommand {
    pub command_type: String,
    pub payload: JsonValue,
    pub issued_at: DateTime<Utc>,
}

impl SerializedCommand {
    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    /// Decode into a concrete command, checking the type tag first.
    pub fn decode<C: Command>(&self) -> Result<C, CommandDecodeError> {
        if self.command_type != C::COMMAND_TYPE {
            return Err(CommandDecodeError::TypeMismatch {
                expected: C::COMMAND_TYPE,
                found: self.command_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
