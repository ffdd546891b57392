// ABOUTME: Backend selection for a configured agent, parsed from a TOML table.
// ABOUTME: The "type" key picks the factory; every other key is handed to it as JSON.

use serde::{Deserialize, Serialize};

/// Backend configuration with type discriminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type: "llm", "direct", "mock"
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,

    /// Remaining fields passed to backend factory
    #[serde(flatten)]
    pub config: toml::Table,
}

fn default_backend_type() -> String {
    "llm".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            config: toml::Table::new(),
        }
    }
}

impl BackendConfig {
    /// Config for the given backend type with no extra keys
    pub fn of_type(backend_type: &str) -> Self {
        Self {
            backend_type: backend_type.to_string(),
            config: toml::Table::new(),
        }
    }

    /// Get backend type name
    pub fn backend_type(&self) -> &str {
        &self.backend_type
    }

    /// Convert config table to serde_json::Value for registry
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        backend: BackendConfig,
    }

    #[test]
    fn test_parse_direct_backend() {
        let toml = r#"
[backend]
type = "direct"
binary = "fortune"
args = ["-s"]
timeout_secs = 30
"#;
        let parsed: Wrapper = toml::from_str(toml).unwrap();
        assert_eq!(parsed.backend.backend_type(), "direct");

        let json = parsed.backend.to_json_value();
        assert_eq!(json["binary"], "fortune");
        assert_eq!(json["args"], serde_json::json!(["-s"]));
        assert_eq!(json["timeout_secs"], 30);
    }

    #[test]
    fn test_type_defaults_to_llm() {
        let parsed: Wrapper = toml::from_str("[backend]\ntemperature = 0.2\n").unwrap();
        assert_eq!(parsed.backend.backend_type(), "llm");
        assert_eq!(parsed.backend.to_json_value()["temperature"], 0.2);
    }

    #[test]
    fn test_empty_table_is_empty_object() {
        let config = BackendConfig::of_type("mock");
        assert_eq!(config.to_json_value(), serde_json::json!({}));
    }
}
