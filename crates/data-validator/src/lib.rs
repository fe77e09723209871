//! Submission Coercion
//!
//! Turns the string fields posted by a sensor node into a typed reading.
//! Only type coercion happens here; plausible sensor ranges are not checked.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{parse_float, parse_int, RawSubmission};
