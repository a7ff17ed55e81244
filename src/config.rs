//! Device configuration and identity.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{DurationSecondsWithFrac, serde_as};

use crate::errors::Error;
use crate::request::DeviceAddress;

type Result<T> = std::result::Result<T, Error>;

/// How the end of a reply is found on the TCP stream.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// A single read; whatever it returns is the reply.
    SingleRead,
    /// Read until the bytes after the prefix form one complete JSON value.
    #[default]
    UntilComplete,
    /// Read until the lamp closes the connection.
    UntilClose,
}

/// Socket-level settings for the TCP transport.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransportOptions {
    /// Bound on connect, send, and the whole receive phase.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(rename = "timeout_secs")]
    pub timeout: Duration,
    pub framing: Framing,
    /// Bytes discarded from the start of every reply.
    pub response_prefix_len: usize,
    pub max_response_size: usize,
}

impl TransportOptions {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_PREFIX_LEN: usize = 4;
    pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 8 * 1024;
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            framing: Framing::default(),
            response_prefix_len: Self::DEFAULT_PREFIX_LEN,
            max_response_size: Self::DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

/// Everything needed to talk to one lamp, as stored by the host.
///
/// # Examples
///
/// ```
/// use dlight_rs::DeviceConfig;
///
/// let config: DeviceConfig =
///     serde_json::from_str(r#"{"host": "192.168.1.40", "device_id": "abc123"}"#).unwrap();
/// assert_eq!(config.port, 3333);
/// assert_eq!(config.poll_interval.as_secs(), 30);
/// assert_eq!(config.transport.timeout.as_secs(), 5);
/// ```
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "DeviceConfig::default_port")]
    pub port: u16,
    pub device_id: String,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(
        rename = "poll_interval_secs",
        default = "DeviceConfig::default_poll_interval"
    )]
    pub poll_interval: Duration,
    #[serde(default)]
    pub transport: TransportOptions,
}

impl DeviceConfig {
    pub const DEFAULT_PORT: u16 = 3333;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(host: &str, device_id: &str) -> Self {
        DeviceConfig {
            host: host.to_string(),
            port: Self::DEFAULT_PORT,
            device_id: device_id.to_string(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            transport: TransportOptions::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.timeout = timeout;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.transport.framing = framing;
        self
    }

    pub fn address(&self) -> DeviceAddress {
        DeviceAddress::new(&self.host, self.port, &self.device_id)
    }

    /// Reject settings no lamp could be reached with.
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::DeviceConfig;
    ///
    /// assert!(DeviceConfig::new("10.0.0.2", "lamp").validate().is_ok());
    /// assert!(DeviceConfig::new("", "lamp").validate().is_err());
    /// assert!(DeviceConfig::new("10.0.0.2", "lamp").with_port(0).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host is empty".into()));
        }
        if self.device_id.trim().is_empty() {
            return Err(Error::InvalidConfig("device id is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.transport.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be non-zero".into()));
        }
        if self.transport.max_response_size <= self.transport.response_prefix_len {
            return Err(Error::InvalidConfig(format!(
                "max response size {} leaves no room after the {}-byte prefix",
                self.transport.max_response_size, self.transport.response_prefix_len
            )));
        }
        Ok(())
    }

    fn default_port() -> u16 {
        Self::DEFAULT_PORT
    }

    fn default_poll_interval() -> Duration {
        Self::DEFAULT_POLL_INTERVAL
    }
}

/// Reply to a `QUERY_DEVICE_INFO` request.
///
/// The lamp decides what goes in here, so the fields are kept as-is.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct DeviceInfo {
    fields: Map<String, Value>,
}

impl DeviceInfo {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A string field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Value> for DeviceInfo {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(DeviceInfo { fields }),
            other => Err(Error::InvalidResponse(format!(
                "device info is not an object: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_defaults() {
        let options = TransportOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.response_prefix_len, 4);
        assert_eq!(options.max_response_size, 8192);
        assert_eq!(options.framing, Framing::UntilComplete);
    }

    #[test]
    fn test_config_from_json_with_overrides() {
        let config: DeviceConfig = serde_json::from_value(json!({
            "host": "lamp.local",
            "port": 4444,
            "device_id": "d1",
            "poll_interval_secs": 2.5,
            "transport": {"timeout_secs": 0.25, "framing": "single_read"},
        }))
        .unwrap();

        assert_eq!(config.port, 4444);
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.transport.timeout, Duration::from_millis(250));
        assert_eq!(config.transport.framing, Framing::SingleRead);
        assert_eq!(config.transport.response_prefix_len, 4);
        assert_eq!(config.address().to_string(), "lamp.local:4444");
    }

    #[test]
    fn test_persisted_keys() {
        let value = serde_json::to_value(DeviceConfig::new("lamp.local", "d1")).unwrap();
        assert_eq!(
            value,
            json!({
                "host": "lamp.local",
                "port": 3333,
                "device_id": "d1",
                "poll_interval_secs": 30.0,
                "transport": {
                    "timeout_secs": 5.0,
                    "framing": "until_complete",
                    "response_prefix_len": 4,
                    "max_response_size": 8192,
                },
            })
        );
        let back: DeviceConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, DeviceConfig::new("lamp.local", "d1"));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = DeviceConfig::new("h", "d").with_poll_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = DeviceConfig::new("h", "d").with_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_device_info_requires_object() {
        let info = DeviceInfo::try_from(json!({"deviceModel": "dLight", "swVersion": "1.2"})).unwrap();
        assert_eq!(info.get_str("deviceModel"), Some("dLight"));
        assert!(DeviceInfo::try_from(json!([1, 2])).is_err());
    }
}
