//! Brightness control for dLights.

use serde::{Deserialize, Serialize};

/// Brightness level from 0 to 100 percent, as the lamp reports and accepts it.
///
/// Hosts that present brightness on a 0-255 scale convert with
/// [`Brightness::from_presentation`] and [`Brightness::to_presentation`].
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Brightness {
    const MAX: u8 = 100;
    const PRESENTATION_MAX: u16 = 255;

    /// Full brightness.
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is outside valid range (0-100).
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Brightness;
    ///
    /// assert!(Brightness::create(0).is_some());
    /// assert!(Brightness::create(100).is_some());
    /// assert!(Brightness::create(101).is_none());
    /// ```
    pub fn create(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Brightness { value })
    }

    /// Convert from the 0-255 presentation scale, truncating.
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Brightness;
    ///
    /// assert_eq!(Brightness::from_presentation(255).value(), 100);
    /// assert_eq!(Brightness::from_presentation(0).value(), 0);
    /// ```
    pub fn from_presentation(level: u8) -> Self {
        let value = u16::from(level) * u16::from(Self::MAX) / Self::PRESENTATION_MAX;
        Brightness { value: value as u8 }
    }

    /// Convert to the 0-255 presentation scale, truncating.
    ///
    /// # Examples
    ///
    /// ```
    /// use dlight_rs::Brightness;
    ///
    /// assert_eq!(Brightness::create(50).unwrap().to_presentation(), 127);
    /// assert_eq!(Brightness::create(100).unwrap().to_presentation(), 255);
    /// ```
    pub fn to_presentation(&self) -> u8 {
        (u16::from(self.value) * Self::PRESENTATION_MAX / u16::from(Self::MAX)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_round_trip_drifts_at_most_one() {
        for value in 0..=100u8 {
            let brightness = Brightness::create(value).unwrap();
            let back = Brightness::from_presentation(brightness.to_presentation());
            assert!(
                value.abs_diff(back.value()) <= 1,
                "{value} came back as {}",
                back.value()
            );
        }
    }
}
