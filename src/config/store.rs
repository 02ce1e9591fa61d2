use std::path::Path;

use super::ClientConfig;
use crate::error::{KvmError, Result};

/// Environment variable holding the local login password
pub const PASSWORD_ENV: &str = "JETKVM_PASSWORD";

impl ClientConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KvmError::Config(e.to_string()))
    }

    /// Fill in the password from the environment when none is configured
    pub fn apply_env(&mut self) {
        if self.has_password() {
            return;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.password = Some(password);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_NATIVE_PORT, DEFAULT_SENSOR_PORT};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jetkvm.json");
        tokio::fs::write(
            &path,
            r#"{"host": "192.168.1.178", "password": "secret", "signaling": {"http_max_attempts": 5}}"#,
        )
        .await
        .unwrap();

        let config = ClientConfig::load(&path).await.unwrap();
        assert_eq!(config.host, "192.168.1.178");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.native_port, DEFAULT_NATIVE_PORT);
        assert_eq!(config.sensor_port, DEFAULT_SENSOR_PORT);
        assert_eq!(config.signaling.http_max_attempts, 5);
        assert_eq!(config.signaling.ws_max_receive_attempts, 30);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = ClientConfig::load(&dir.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, KvmError::Io(_)));
    }

    #[test]
    fn test_invalid_json() {
        let err = ClientConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, KvmError::Config(_)));
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_err());

        let mut config = ClientConfig::new("10.0.0.2");
        assert!(config.validate().is_ok());

        config.signaling.http_max_attempts = 0;
        assert!(matches!(config.validate(), Err(KvmError::Config(_))));
    }

    #[test]
    fn test_password_gate() {
        let config = ClientConfig::new("10.0.0.2");
        assert!(!config.has_password());
        assert!(!config.clone().with_password("").has_password());
        assert!(config.with_password("pw").has_password());
    }

    #[test]
    fn test_urls() {
        let config = ClientConfig::new("192.168.1.178/");
        assert_eq!(config.native_base_url(), "http://192.168.1.178");
        assert_eq!(
            config.signaling_ws_url(),
            "ws://192.168.1.178/webrtc/signaling/client"
        );
        assert_eq!(config.sensor_base_url(), "http://192.168.1.178:8800");

        let config = config.with_native_port(8080);
        assert_eq!(config.native_base_url(), "http://192.168.1.178:8080");
        assert_eq!(
            config.signaling_ws_url(),
            "ws://192.168.1.178:8080/webrtc/signaling/client"
        );
    }
}
