use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OsikatuError, Result};
use crate::utils::{get_env_list, get_env_parsed};

pub const REDACTED: &str = "[REDACTED]";
pub const TRUNCATED: &str = "[TRUNCATED]";

/// Rules applied to operation-log metadata before it is stored
///
/// Keys are matched case-insensitively by substring, so `user_email` and
/// `AccessToken` are both caught by the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionPolicy {
    #[serde(default = "default_sensitive_keys")]
    pub sensitive_keys: Vec<String>,
    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,
    #[serde(default = "default_max_array_len")]
    pub max_array_len: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            sensitive_keys: default_sensitive_keys(),
            max_string_len: default_max_string_len(),
            max_array_len: default_max_array_len(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_sensitive_keys() -> Vec<String> {
    [
        "password", "token", "secret", "email", "phone", "card", "body", "memo", "address",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

fn default_max_string_len() -> usize {
    200
}

fn default_max_array_len() -> usize {
    50
}

fn default_max_depth() -> usize {
    8
}

impl RedactionPolicy {
    /// Defaults plus `OPLOG_SENSITIVE_KEYS` (appended) and the size limits.
    pub fn from_env() -> Self {
        let mut policy = Self::default();

        if let Some(extra) = get_env_list("OPLOG_SENSITIVE_KEYS") {
            for key in extra {
                let key = key.to_lowercase();
                if !policy.sensitive_keys.contains(&key) {
                    policy.sensitive_keys.push(key);
                }
            }
        }
        if let Some(len) = get_env_parsed("OPLOG_MAX_STRING_LEN") {
            policy.max_string_len = len;
        }
        if let Some(len) = get_env_parsed("OPLOG_MAX_ARRAY_LEN") {
            policy.max_array_len = len;
        }
        if let Some(depth) = get_env_parsed("OPLOG_MAX_DEPTH") {
            policy.max_depth = depth;
        }

        policy
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_string_len == 0 || self.max_array_len == 0 || self.max_depth == 0 {
            return Err(OsikatuError::bad_request(
                "Operation log limits must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_keys
            .iter()
            .any(|fragment| key.contains(&fragment.to_lowercase()))
    }

    /// Return a redacted copy of `value`.
    pub fn apply(&self, value: &Value) -> Value {
        self.redact(value, 0)
    }

    fn redact(&self, value: &Value, depth: usize) -> Value {
        if depth > self.max_depth {
            return Value::String(TRUNCATED.to_string());
        }

        match value {
            Value::Object(map) => {
                let redacted: Map<String, Value> = map
                    .iter()
                    .map(|(key, v)| {
                        let v = if self.is_sensitive(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.redact(v, depth + 1)
                        };
                        (key.clone(), v)
                    })
                    .collect();
                Value::Object(redacted)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .take(self.max_array_len)
                    .map(|v| self.redact(v, depth + 1))
                    .collect(),
            ),
            Value::String(s) => Value::String(self.truncate(s)),
            other => other.clone(),
        }
    }

    fn truncate(&self, s: &str) -> String {
        if s.chars().count() <= self.max_string_len {
            return s.to_string();
        }
        let mut truncated: String = s.chars().take(self.max_string_len).collect();
        truncated.push('…');
        truncated
    }
}
