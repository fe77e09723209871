//! Measurement Routes
//!
//! `ingest` stores one form-encoded reading from a sensor node; `recent`
//! returns the latest readings for the dashboard.

use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};
use data_validator::RawSubmission;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::Measurement;
use tracing::{error, info, warn};

use crate::error::{IngestError, QueryError, INGEST_OK};
use crate::AppState;

/// One reading in the dashboard feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementView {
    pub id: i64,
    pub temperatura: f64,
    pub humedad: f64,
    pub pm1_0: i64,
    pub pm2_5: i64,
    /// Same value as `pm2_5`, kept for older dashboards
    pub pm25: i64,
    pub pm10: i64,
    /// No radiation sensor is fitted; always 0
    pub radiacion: i64,
    pub fecha_hora: String,
}

impl From<Measurement> for MeasurementView {
    fn from(row: Measurement) -> Self {
        let pm2_5 = row.pm2_5.unwrap_or(0);
        Self {
            id: row.id,
            temperatura: row.temperatura.unwrap_or(0.0),
            humedad: row.humedad.unwrap_or(0.0),
            pm1_0: row.pm1_0.unwrap_or(0),
            pm2_5,
            pm25: pm2_5,
            pm10: row.pm10.unwrap_or(0),
            radiacion: 0,
            fecha_hora: row.fecha,
        }
    }
}

/// Store one reading
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    form: Result<Form<RawSubmission>, FormRejection>,
) -> Result<&'static str, IngestError> {
    match store(&state, form).await {
        Ok(id) => {
            metrics::counter!("datalog_ingest_total", "outcome" => "stored").increment(1);
            info!(id, "Stored measurement");
            Ok(INGEST_OK)
        }
        Err(err) => {
            metrics::counter!("datalog_ingest_total", "outcome" => err.outcome()).increment(1);
            match &err {
                IngestError::Rejected(_) | IngestError::Invalid(_) => {
                    warn!("Rejected submission: {}", err)
                }
                _ => error!("Failed to store measurement: {}", err),
            }
            Err(err)
        }
    }
}

async fn store(
    state: &AppState,
    form: Result<Form<RawSubmission>, FormRejection>,
) -> Result<i64, IngestError> {
    let Form(raw) = form.map_err(|rejection| IngestError::Rejected(rejection.body_text()))?;
    let reading = raw.validate()?;
    Ok(state.repository.insert_measurement(&reading).await?)
}

/// Latest readings, newest first
pub async fn recent(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MeasurementView>>, QueryError> {
    match state.repository.recent_measurements(state.query_limit).await {
        Ok(rows) => {
            metrics::counter!("datalog_query_total", "outcome" => "ok").increment(1);
            metrics::histogram!("datalog_query_rows").record(rows.len() as f64);
            Ok(Json(rows.into_iter().map(MeasurementView::from).collect()))
        }
        Err(err) => {
            let err = QueryError::from(err);
            metrics::counter!("datalog_query_total", "outcome" => err.outcome()).increment(1);
            error!("Failed to read measurements: {}", err);
            Err(err)
        }
    }
}
