//! Scheduled job status bookkeeping.
//!
//! Each run writes its outcome to the `scheduled-jobs` record named after the
//! job so operators can see when discovery last ran and whether it worked.

use crate::catalogue::{CatalogueClient, Collection};
use crate::error::Result;
use crate::types::JobStatus;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// Build the status payload for a run finished at `now`.
#[must_use]
pub fn job_payload(status: JobStatus, errors: &[String], now: DateTime<Utc>) -> Value {
    let timestamp = now.to_rfc3339();
    let mut data = json!({
        "last_scheduled_run": timestamp,
        "result": status.as_str(),
        "error_details": errors,
    });
    if status == JobStatus::Succeeded {
        data["last_successful_run"] = Value::from(timestamp);
    }
    data
}

/// Record the outcome of a run on the job's catalogue record.
///
/// Returns `false` when no record with the job's name exists.
///
/// # Errors
///
/// Returns an error if the catalogue cannot be listed or updated.
pub async fn record_job_status(
    catalogue: &dyn CatalogueClient,
    job_name: &str,
    status: JobStatus,
    errors: &[String],
) -> Result<bool> {
    let jobs = catalogue.get_all(Collection::ScheduledJobs).await?;
    let Some(job) = jobs.into_iter().find(|job| job.name() == Some(job_name)) else {
        tracing::error!(job = %job_name, "Job not found in the catalogue");
        return Ok(false);
    };

    let data = job_payload(status, errors, Utc::now());
    catalogue.update(Collection::ScheduledJobs, &job.id, &data).await?;
    tracing::info!(job = %job_name, status = %status, errors = errors.len(), "Job status recorded");
    Ok(true)
}
