//! Request envelopes sent to a dLight.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::command::Command;

/// Where a lamp lives and which device id it answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    host: String,
    port: u16,
    device_id: String,
}

impl DeviceAddress {
    pub fn new(host: &str, port: u16, device_id: &str) -> Self {
        DeviceAddress {
            host: host.to_string(),
            port,
            device_id: device_id.to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// `host:port`, suitable for connecting.
impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The three operations the lamp understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    QueryDeviceInfo,
    QueryDeviceStates,
    Execute,
}

impl CommandType {
    /// The sequence label the lamp's own app uses for this operation.
    pub fn command_id(&self) -> &'static str {
        match self {
            CommandType::QueryDeviceInfo => "1",
            CommandType::QueryDeviceStates => "2",
            CommandType::Execute => "3",
        }
    }
}

/// One request frame.
///
/// # Examples
///
/// ```
/// use dlight_rs::{DeviceAddress, Request};
///
/// let address = DeviceAddress::new("10.0.0.9", 3333, "lamp-1");
/// let json = serde_json::to_string(&Request::query_states(&address)).unwrap();
/// assert_eq!(
///     json,
///     r#"{"commandId":"2","deviceId":"lamp-1","commandType":"QUERY_DEVICE_STATES"}"#
/// );
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    command_id: String,
    device_id: String,
    command_type: CommandType,
    commands: Option<Vec<Command>>,
}

impl Request {
    fn new(address: &DeviceAddress, command_type: CommandType) -> Self {
        Request {
            command_id: command_type.command_id().to_string(),
            device_id: address.device_id.clone(),
            command_type,
            commands: None,
        }
    }

    pub fn query_info(address: &DeviceAddress) -> Self {
        Self::new(address, CommandType::QueryDeviceInfo)
    }

    pub fn query_states(address: &DeviceAddress) -> Self {
        Self::new(address, CommandType::QueryDeviceStates)
    }

    pub fn execute(address: &DeviceAddress, commands: Vec<Command>) -> Self {
        Request {
            commands: Some(commands),
            ..Self::new(address, CommandType::Execute)
        }
    }

    /// Replace the sequence label.
    pub fn with_command_id(mut self, command_id: &str) -> Self {
        self.command_id = command_id.to_string();
        self
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn commands(&self) -> Option<&[Command]> {
        self.commands.as_deref()
    }
}
