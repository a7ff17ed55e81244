//! Value types for light control parameters.

mod brightness;
mod kelvin;
mod power;

pub use brightness::Brightness;
pub use kelvin::Kelvin;
pub use power::PowerMode;
