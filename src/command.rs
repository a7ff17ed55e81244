//! Partial state changes sent in an `EXECUTE` request.

use serde::{Deserialize, Serialize};

use crate::types::{Brightness, Kelvin, PowerMode};

/// Color settings within a [`Command`].
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColorCommand {
    pub(crate) temperature: Option<u16>,
}

/// A partial state change for a dLight.
///
/// Commands can combine power, brightness and color temperature; attributes
/// left unset are not sent and the lamp keeps its current value for them.
///
/// # Creating Commands
///
/// 1. **From a single attribute** using the [`From`] trait:
///    ```
///    use dlight_rs::{Command, PowerMode};
///    let command = Command::from(&PowerMode::Off);
///    ```
///
/// 2. **Builder pattern** for combining multiple attributes:
///    ```
///    use dlight_rs::{Command, Brightness, Kelvin};
///    let mut command = Command::new();
///    command
///        .on(true)
///        .brightness(&Brightness::create(80).unwrap())
///        .temperature(&Kelvin::create(3000).unwrap());
///    assert!(command.is_valid());
///    ```
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Command {
    pub(crate) on: Option<bool>,
    pub(crate) brightness: Option<u8>,
    pub(crate) color: Option<ColorCommand>,
}

impl Command {
    /// Create a new empty command.
    ///
    /// At least one attribute must be set for the command to be valid.
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Command;
    ///
    /// assert_eq!(Command::new().is_valid(), false);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if this command contains at least one attribute.
    pub fn is_valid(&self) -> bool {
        self.on.is_some()
            || self.brightness.is_some()
            || self.color.as_ref().is_some_and(|c| c.temperature.is_some())
    }

    pub fn on(&mut self, on: bool) -> &mut Self {
        self.on = Some(on);
        self
    }

    pub fn power(&mut self, power: &PowerMode) -> &mut Self {
        self.on(power.is_on())
    }

    pub fn brightness(&mut self, brightness: &Brightness) -> &mut Self {
        self.brightness = Some(brightness.value);
        self
    }

    /// Set the color temperature.
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::{Command, Kelvin};
    ///
    /// let mut command = Command::new();
    /// command.temperature(&Kelvin::create(4000).unwrap());
    /// assert_eq!(
    ///     serde_json::to_string(&command).unwrap(),
    ///     r#"{"color":{"temperature":4000}}"#
    /// );
    /// ```
    pub fn temperature(&mut self, temperature: &Kelvin) -> &mut Self {
        self.color = Some(ColorCommand {
            temperature: Some(temperature.kelvin),
        });
        self
    }

    pub fn get_on(&self) -> Option<bool> {
        self.on
    }

    pub fn get_brightness(&self) -> Option<Brightness> {
        self.brightness.and_then(Brightness::create)
    }

    pub fn get_temperature(&self) -> Option<Kelvin> {
        self.color
            .as_ref()
            .and_then(|c| c.temperature)
            .map(Kelvin::reported)
    }
}

impl From<&PowerMode> for Command {
    fn from(power: &PowerMode) -> Self {
        let mut command = Command::new();
        command.power(power);
        command
    }
}

impl From<&Brightness> for Command {
    fn from(brightness: &Brightness) -> Self {
        let mut command = Command::new();
        command.brightness(brightness);
        command
    }
}

impl From<&Kelvin> for Command {
    fn from(temperature: &Kelvin) -> Self {
        let mut command = Command::new();
        command.temperature(temperature);
        command
    }
}
