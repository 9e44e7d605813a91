pub mod config;
pub mod doctor;
pub mod migrate;

use serde::Serialize;

/// Why an operator command failed. Each class maps to its own exit code so
/// deploy scripts can tell a bad config from an unreachable database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    ConfigValidation,
    RuntimeInit,
    DbConnectivity,
    Migration,
}

impl FailureClass {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation => 2,
            Self::RuntimeInit => 3,
            Self::DbConnectivity => 4,
            Self::Migration => 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<FailureClass>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(command: &str, class: FailureClass, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(class),
            message: message.into(),
        };
        Self { exit_code: class.exit_code(), output: serialize_payload(&payload) }
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        serde_json::json!({
            "command": payload.command,
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{CommandResult, FailureClass};

    #[test]
    fn failures_carry_their_class_and_exit_code() {
        let result = CommandResult::failure("migrate", FailureClass::DbConnectivity, "refused");

        assert_eq!(result.exit_code, 4);
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["error_class"], "db_connectivity");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["message"], "refused");
    }

    #[test]
    fn success_has_no_error_class() {
        let result = CommandResult::success("migrate", "done");

        assert_eq!(result.exit_code, 0);
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["error_class"], Value::Null);
    }
}
