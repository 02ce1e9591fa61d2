use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KvmError, Result};

/// Default port of the sensor API (BusyBox httpd installed by api-setup.sh)
pub const DEFAULT_SENSOR_PORT: u16 = 8800;

/// Default port of the appliance's native web API
pub const DEFAULT_NATIVE_PORT: u16 = 80;

/// Endpoint configuration for one appliance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Appliance host name or IP address
    pub host: String,
    /// Sensor API port (used by the surrounding integration only)
    pub sensor_port: u16,
    /// Native API port (login and WebRTC signaling)
    pub native_port: u16,
    /// Local login password. Video is disabled when absent.
    pub password: Option<String>,
    /// Signaling timeouts and retry budget
    pub signaling: SignalingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            sensor_port: DEFAULT_SENSOR_PORT,
            native_port: DEFAULT_NATIVE_PORT,
            password: None,
            signaling: SignalingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_native_port(mut self, port: u16) -> Self {
        self.native_port = port;
        self
    }

    /// Password presence gates the video capability
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Host with any trailing slash removed
    pub fn host(&self) -> &str {
        self.host.trim().trim_end_matches('/')
    }

    /// Base URL of the native API, e.g. `http://192.168.1.178`
    pub fn native_base_url(&self) -> String {
        if self.native_port == DEFAULT_NATIVE_PORT {
            format!("http://{}", self.host())
        } else {
            format!("http://{}:{}", self.host(), self.native_port)
        }
    }

    /// Signaling socket URL
    pub fn signaling_ws_url(&self) -> String {
        if self.native_port == DEFAULT_NATIVE_PORT {
            format!("ws://{}/webrtc/signaling/client", self.host())
        } else {
            format!(
                "ws://{}:{}/webrtc/signaling/client",
                self.host(),
                self.native_port
            )
        }
    }

    /// Base URL of the sensor API
    pub fn sensor_base_url(&self) -> String {
        format!("http://{}:{}", self.host(), self.sensor_port)
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.host().is_empty() {
            return Err(KvmError::Config("host must not be empty".to_string()));
        }
        if self.native_port == 0 {
            return Err(KvmError::Config("native_port must not be 0".to_string()));
        }
        self.signaling.validate()
    }
}

/// Signaling timeouts and retry budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket connect (handshake) timeout
    pub ws_connect_timeout_ms: u64,
    /// Timeout of a single receive while waiting for the answer
    pub ws_receive_timeout_ms: u64,
    /// Receive attempts before the answer wait is abandoned
    pub ws_max_receive_attempts: u32,
    /// Total attempts against the legacy HTTP endpoint
    pub http_max_attempts: u32,
    /// Delay between legacy HTTP attempts
    pub retry_delay_ms: u64,
    /// Timeout for login and legacy HTTP requests
    pub request_timeout_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            ws_connect_timeout_ms: 5000,
            ws_receive_timeout_ms: 2000,
            ws_max_receive_attempts: 30,
            http_max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 10_000,
        }
    }
}

impl SignalingConfig {
    pub fn ws_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_connect_timeout_ms)
    }

    pub fn ws_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_receive_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.ws_max_receive_attempts == 0 {
            return Err(KvmError::Config(
                "ws_max_receive_attempts must be at least 1".to_string(),
            ));
        }
        if self.http_max_attempts == 0 {
            return Err(KvmError::Config(
                "http_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.ws_receive_timeout_ms == 0 || self.ws_connect_timeout_ms == 0 {
            return Err(KvmError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}
