//! Form Field Coercion

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use storage::NewMeasurement;
use tracing::debug;

/// A submission exactly as it arrives on the wire.
///
/// Every field is optional here so that a missing value becomes a
/// [`ValidationError::MissingField`] instead of an opaque decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubmission {
    pub temperatura: Option<String>,
    pub humedad: Option<String>,
    pub pm1_0: Option<String>,
    pub pm2_5: Option<String>,
    pub pm10: Option<String>,
}

impl RawSubmission {
    /// Coerce all five fields, failing on the first bad one
    pub fn validate(&self) -> Result<NewMeasurement, ValidationError> {
        let reading = NewMeasurement {
            temperatura: parse_float("temperatura", self.temperatura.as_deref())?,
            humedad: parse_float("humedad", self.humedad.as_deref())?,
            pm1_0: parse_int("pm1_0", self.pm1_0.as_deref())?,
            pm2_5: parse_int("pm2_5", self.pm2_5.as_deref())?,
            pm10: parse_int("pm10", self.pm10.as_deref())?,
        };
        debug!("Coerced submission: {:?}", reading);
        Ok(reading)
    }
}

fn present<'a>(field: &'static str, raw: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Parse a finite floating point field
pub fn parse_float(field: &'static str, raw: Option<&str>) -> Result<f64, ValidationError> {
    let value = present(field, raw)?;
    let parsed: f64 = value.parse().map_err(|_| ValidationError::InvalidFormat {
        field,
        expected: "number",
        value: value.to_string(),
    })?;

    if !parsed.is_finite() {
        return Err(ValidationError::NonFinite {
            field,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

/// Parse an integer field
pub fn parse_int(field: &'static str, raw: Option<&str>) -> Result<i64, ValidationError> {
    let value = present(field, raw)?;
    value.parse().map_err(|_| ValidationError::InvalidFormat {
        field,
        expected: "integer",
        value: value.to_string(),
    })
}
