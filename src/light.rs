//! Presentation-scale view of a coordinated lamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Command;
use crate::coordinator::Coordinator;
use crate::errors::Error;
use crate::transport::{TcpTransport, Transport};
use crate::types::{Brightness, Kelvin};

type Result<T> = std::result::Result<T, Error>;

/// Static description of the physical device behind a [`LightEntity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightMetadata {
    pub unique_id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// A lamp as a host application sees it.
///
/// Reads come from the coordinator's cache and are on the host's scales:
/// brightness 0-255 and color temperature in mireds. Writes go through
/// [`Coordinator::send_command`], so the cache is refreshed afterwards.
///
/// Every getter returns `None` while the coordinator has no snapshot.
pub struct LightEntity<T: Transport = TcpTransport> {
    coordinator: Coordinator<T>,
}

impl<T: Transport> Clone for LightEntity<T> {
    fn clone(&self) -> Self {
        LightEntity {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<T: Transport> LightEntity<T> {
    pub const MIN_MIREDS: u16 = 167;
    pub const MAX_MIREDS: u16 = 385;

    pub fn new(coordinator: Coordinator<T>) -> Self {
        LightEntity { coordinator }
    }

    pub fn coordinator(&self) -> &Coordinator<T> {
        &self.coordinator
    }

    pub fn unique_id(&self) -> &str {
        self.coordinator.address().device_id()
    }

    pub fn metadata(&self) -> LightMetadata {
        let id = self.unique_id();
        LightMetadata {
            unique_id: id.to_string(),
            name: format!("dLight {id}"),
            manufacturer: "Google".to_string(),
            model: "dLight".to_string(),
        }
    }

    pub fn available(&self) -> bool {
        self.coordinator.is_available()
    }

    pub fn is_on(&self) -> Option<bool> {
        self.coordinator.state().map(|s| s.is_on())
    }

    /// Brightness on the 0-255 scale; a lamp that omits it reads as 0.
    pub fn brightness(&self) -> Option<u8> {
        self.coordinator
            .state()
            .map(|s| s.brightness().unwrap_or_default().to_presentation())
    }

    /// Color temperature in mireds, assuming 3800K when the lamp omits it.
    pub fn color_temp(&self) -> Option<u16> {
        self.coordinator
            .state()
            .map(|s| s.temperature().unwrap_or_default().to_mireds())
    }

    /// Switch on, optionally setting brightness (0-255) and color
    /// temperature (mireds) in the same command.
    pub async fn turn_on(&self, brightness: Option<u8>, color_temp: Option<u16>) -> Result<Value> {
        let mut command = Command::new();
        command.on(true);
        if let Some(level) = brightness {
            command.brightness(&Brightness::from_presentation(level));
        }
        if let Some(mireds) = color_temp {
            let kelvin = Kelvin::from_mireds(mireds)
                .ok_or_else(|| Error::InvalidConfig(format!("color temperature of {mireds} mireds")))?;
            command.temperature(&kelvin);
        }
        self.coordinator.send_command(vec![command]).await
    }

    pub async fn turn_off(&self) -> Result<Value> {
        let mut command = Command::new();
        command.on(false);
        self.coordinator.send_command(vec![command]).await
    }
}
