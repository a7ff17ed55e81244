//! Color temperature control.

use serde::{Deserialize, Serialize};

const MIREDS_PER_KELVIN: u32 = 1_000_000;

/// Color temperature in Kelvin, with valid values from 2600K to 6000K.
///
/// Lower values produce warmer light, while higher values produce cooler light.
/// Hosts that work in mireds convert with [`Kelvin::to_mireds`] and
/// [`Kelvin::from_mireds`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct Kelvin {
    pub(crate) kelvin: u16,
}

impl Default for Kelvin {
    fn default() -> Self {
        Self::new()
    }
}

impl Kelvin {
    pub const MIN: u16 = 2600;
    pub const MAX: u16 = 6000;
    /// Reported when the lamp omits its temperature.
    pub const FALLBACK: u16 = 3800;

    /// Create a new Kelvin with the fallback value (3800K).
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Kelvin;
    ///
    /// assert_eq!(Kelvin::new().kelvin(), 3800);
    /// ```
    pub fn new() -> Self {
        Kelvin {
            kelvin: Self::FALLBACK,
        }
    }

    /// Get the kelvin value.
    pub fn kelvin(&self) -> u16 {
        self.kelvin
    }

    /// Create a new Kelvin with the given value.
    ///
    /// Returns `None` if value is outside the valid range (2600-6000).
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Kelvin;
    ///
    /// assert!(Kelvin::create(2599).is_none());
    /// assert!(Kelvin::create(2600).is_some());
    /// assert!(Kelvin::create(6000).is_some());
    /// assert!(Kelvin::create(6001).is_none());
    /// ```
    pub fn create(kelvin: u16) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&kelvin)
            .then_some(Kelvin { kelvin })
    }

    /// Wrap a value reported by the lamp without range checks.
    pub(crate) fn reported(kelvin: u16) -> Self {
        Kelvin { kelvin }
    }

    /// Convert to mireds (`1_000_000 / kelvin`, truncating).
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Kelvin;
    ///
    /// assert_eq!(Kelvin::create(4000).unwrap().to_mireds(), 250);
    /// ```
    pub fn to_mireds(&self) -> u16 {
        match self.kelvin {
            0 => u16::MAX,
            k => (MIREDS_PER_KELVIN / u32::from(k)).min(u32::from(u16::MAX)) as u16,
        }
    }

    /// Convert from mireds, clamping into the lamp's range.
    ///
    /// Returns `None` for zero mireds.
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Kelvin;
    ///
    /// assert_eq!(Kelvin::from_mireds(250).unwrap().kelvin(), 4000);
    /// assert_eq!(Kelvin::from_mireds(1000).unwrap().kelvin(), 2600);
    /// assert!(Kelvin::from_mireds(0).is_none());
    /// ```
    pub fn from_mireds(mireds: u16) -> Option<Self> {
        if mireds == 0 {
            return None;
        }
        let kelvin = (MIREDS_PER_KELVIN / u32::from(mireds))
            .clamp(u32::from(Self::MIN), u32::from(Self::MAX));
        Some(Kelvin {
            kelvin: kelvin as u16,
        })
    }

    /// Coolest supported temperature, in mireds (rounded up into range).
    pub fn min_mireds() -> u16 {
        MIREDS_PER_KELVIN.div_ceil(u32::from(Self::MAX)) as u16
    }

    /// Warmest supported temperature, in mireds (rounded up).
    pub fn max_mireds() -> u16 {
        MIREDS_PER_KELVIN.div_ceil(u32::from(Self::MIN)) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mired_bounds() {
        assert_eq!(Kelvin::min_mireds(), 167);
        assert_eq!(Kelvin::max_mireds(), 385);
    }

    #[test]
    fn test_mired_round_trip_drifts_at_most_one() {
        for mireds in Kelvin::min_mireds()..=Kelvin::max_mireds() {
            let back = Kelvin::from_mireds(mireds).unwrap().to_mireds();
            assert!(back.abs_diff(mireds) <= 1, "{mireds} came back as {back}");
        }
    }

    #[test]
    fn test_reported_is_not_range_checked() {
        assert_eq!(Kelvin::reported(9000).kelvin(), 9000);
        assert_eq!(Kelvin::reported(0).to_mireds(), u16::MAX);
    }
}
