//! Positional command arguments and bridge errors

use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::CallId;
use serde_json::Value;
use thiserror::Error;

/// One-shot error result of a bridge command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Missing argument {index} ({name})")]
    MissingArgument { index: usize, name: &'static str },

    #[error("Argument {index} ({name}) must be a {expected}")]
    InvalidArgument {
        index: usize,
        name: &'static str,
        expected: &'static str,
    },

    #[error("Invalid call identifier: {0}")]
    InvalidCallId(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Positional arguments as sent by the app's scripting layer
#[derive(Debug, Clone, Copy)]
pub struct CommandArgs<'a> {
    args: &'a [Value],
}

impl<'a> CommandArgs<'a> {
    pub fn new(args: &'a [Value]) -> Self {
        Self { args }
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index).filter(|value| !value.is_null())
    }

    /// String argument; missing or non-string values read as empty
    pub fn string_or_default(&self, index: usize) -> String {
        self.get(index)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Boolean argument; missing or non-boolean values read as `default`
    pub fn bool_or(&self, index: usize, default: bool) -> bool {
        self.get(index).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn required_bool(&self, index: usize, name: &'static str) -> Result<bool, BridgeError> {
        let value = self
            .get(index)
            .ok_or(BridgeError::MissingArgument { index, name })?;
        value.as_bool().ok_or(BridgeError::InvalidArgument {
            index,
            name,
            expected: "boolean",
        })
    }

    pub fn call_id(&self, index: usize) -> Result<CallId, BridgeError> {
        let text = self.string_or_default(index);
        text.parse()
            .map_err(|_| BridgeError::InvalidCallId(text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_accessors() {
        let values = vec![json!("Alice"), json!(true), json!(null), json!(3)];
        let args = CommandArgs::new(&values);

        assert_eq!(args.string_or_default(0), "Alice");
        assert_eq!(args.string_or_default(1), "");
        assert_eq!(args.string_or_default(9), "");
        assert!(args.bool_or(1, false));
        assert!(!args.bool_or(2, false));
        assert!(args.bool_or(3, true));
    }

    #[test]
    fn test_required_bool() {
        let values = vec![json!("Bob"), json!("yes")];
        let args = CommandArgs::new(&values);

        assert_eq!(
            args.required_bool(1, "isVideo"),
            Err(BridgeError::InvalidArgument {
                index: 1,
                name: "isVideo",
                expected: "boolean"
            })
        );
        assert_eq!(
            args.required_bool(2, "isVideo"),
            Err(BridgeError::MissingArgument {
                index: 2,
                name: "isVideo"
            })
        );
    }

    #[test]
    fn test_call_id() {
        let id = CallId::new();
        let values = vec![json!(id.to_string()), json!("not-a-uuid")];
        let args = CommandArgs::new(&values);

        assert_eq!(args.call_id(0), Ok(id));
        assert_eq!(
            args.call_id(1),
            Err(BridgeError::InvalidCallId("not-a-uuid".to_string()))
        );
    }
}
