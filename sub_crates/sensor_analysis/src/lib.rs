//! A crate for computing various things about camera sensors.
//!
//! Currently that's recovering the response curve of a sensor from a
//! bracketed stack of 8-bit images, reading response curves from
//! polynomial descriptions, and histogram utilities used by the image
//! processing code that consumes those curves.

mod calibrate;
mod error;
mod histogram;
mod response;

pub use calibrate::{calibrate_debevec, CalibrationSettings};
pub use error::{CalibrationError, CurveParseError};
pub use histogram::Histogram;
pub use response::{hat_weight, ResponseCurve, LEVELS};
