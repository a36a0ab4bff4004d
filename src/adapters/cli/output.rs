//! JSON rendering for command results

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::domain::trade::ExecutionStatus;

/// Attach `status` to a result. Objects keep their own `status` when they
/// carry one; anything else is nested under `result`.
pub fn with_status<T: Serialize>(status: ExecutionStatus, body: &T) -> Value {
    match serde_json::to_value(body) {
        Ok(Value::Object(mut map)) => {
            map.entry("status").or_insert_with(|| json!(status));
            Value::Object(map)
        }
        Ok(Value::Null) => json!({ "status": status }),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("status".to_string(), json!(status));
            map.insert("result".to_string(), other);
            Value::Object(map)
        }
        Err(e) => failure(&format!("Could not serialize result: {}", e)),
    }
}

pub fn success<T: Serialize>(body: &T) -> Value {
    with_status(ExecutionStatus::Success, body)
}

pub fn failure(message: &str) -> Value {
    json!({ "status": ExecutionStatus::Failed, "error": message })
}

/// Status carried by a rendered report; missing or unknown counts as FAILED
pub fn status_of(report: &Value) -> ExecutionStatus {
    report
        .get("status")
        .cloned()
        .and_then(|s| serde_json::from_value(s).ok())
        .unwrap_or(ExecutionStatus::Failed)
}

pub fn exit_code(status: ExecutionStatus) -> i32 {
    match status {
        ExecutionStatus::Success => 0,
        ExecutionStatus::Failed => 1,
        ExecutionStatus::Blocked => 2,
    }
}

pub fn pretty(report: &Value) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| report.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Balance {
        sol: f64,
    }

    #[test]
    fn test_object_gets_status() {
        let v = success(&Balance { sol: 1.5 });
        assert_eq!(v["status"], "SUCCESS");
        assert_eq!(v["sol"], 1.5);
    }

    #[test]
    fn test_existing_status_wins() {
        let v = success(&json!({ "status": "BLOCKED", "risks": ["Honeypot"] }));
        assert_eq!(status_of(&v), ExecutionStatus::Blocked);
        assert_eq!(exit_code(status_of(&v)), 2);
    }

    #[test]
    fn test_list_is_nested() {
        let v = success(&vec![1, 2, 3]);
        assert_eq!(v["status"], "SUCCESS");
        assert_eq!(v["result"].as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_failure_exit_code() {
        let v = failure("No wallet for user bob");
        assert_eq!(status_of(&v), ExecutionStatus::Failed);
        assert_ne!(exit_code(status_of(&v)), 0);
        assert_eq!(status_of(&json!({})), ExecutionStatus::Failed);
    }
}
