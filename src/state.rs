//! Snapshot of a lamp's reported state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Error;
use crate::types::{Brightness, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

/// The `color` object of a state report.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ColorState {
    #[serde(default, with = "::serde_with::rust::double_option")]
    temperature: Option<Option<u16>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// The `states` map of a `QUERY_DEVICE_STATES` reply.
///
/// Attributes this crate does not know about are kept, and an attribute
/// reported as `null` stays `null` rather than disappearing, so serializing a
/// snapshot gives back exactly what the lamp reported.
///
/// # Examples
///
/// ```
/// use dlight_rs::DeviceState;
/// use serde_json::json;
///
/// let state = DeviceState::from_response(json!({
///     "states": {"on": true, "brightness": 50, "color": {"temperature": 4000}}
/// }))
/// .unwrap();
/// assert!(state.is_on());
/// assert_eq!(state.brightness().unwrap().value(), 50);
/// assert_eq!(state.temperature().unwrap().kelvin(), 4000);
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct DeviceState {
    #[serde(default, with = "::serde_with::rust::double_option")]
    on: Option<Option<bool>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    brightness: Option<Option<u8>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    color: Option<Option<ColorState>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl DeviceState {
    /// Extract the snapshot from a full state-query reply.
    ///
    /// A reply without `states`, or whose `states` has the wrong shape, is an
    /// [`Error::InvalidResponse`].
    pub fn from_response(mut response: Value) -> Result<Self> {
        let states = response
            .get_mut("states")
            .map(Value::take)
            .ok_or_else(|| Error::InvalidResponse("reply has no `states`".into()))?;
        serde_json::from_value(states)
            .map_err(|e| Error::InvalidResponse(format!("unusable `states`: {e}")))
    }

    /// Whether the lamp is emitting. Missing means off.
    pub fn is_on(&self) -> bool {
        self.on.flatten().unwrap_or(false)
    }

    pub fn power(&self) -> PowerMode {
        PowerMode::from(self.is_on())
    }

    pub fn brightness(&self) -> Option<Brightness> {
        self.brightness.flatten().and_then(Brightness::create)
    }

    pub fn temperature(&self) -> Option<Kelvin> {
        self.color
            .as_ref()
            .and_then(Option::as_ref)
            .and_then(|c| c.temperature.flatten())
            .map(Kelvin::reported)
    }

    /// Attributes other than `on`, `brightness` and `color`.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// The snapshot as the JSON the lamp sent.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
