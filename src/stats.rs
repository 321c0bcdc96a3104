//! Execution statistics for Quarry.
//!
//! Derives byte counts, timing breakdown, and an estimated query cost
//! from the metadata the execution service reports.

use serde::{Deserialize, Serialize};

use crate::service::ExecutionMetadata;

/// Price charged per terabyte scanned, in USD.
const PRICE_PER_TB_USD: f64 = 5.0;

/// Bytes per terabyte, as billed by the service (decimal TB).
const BYTES_PER_TB: f64 = 1_000_000_000_000.0;

/// Decimal places the cost estimate is rounded to.
const COST_DECIMALS: u32 = 6;

/// Statistics for one completed execution.
///
/// Derived once from service metadata, never mutated afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Bytes of data the execution scanned.
    pub bytes_scanned: u64,

    /// Estimated cost of the scan, in USD.
    pub cost_estimate_usd: f64,

    /// Wall-clock time from submission to terminal status.
    pub total_elapsed_ms: u64,

    /// Time spent queued before the engine picked the query up.
    pub queue_time_ms: u64,

    /// Time the engine spent planning.
    pub planning_time_ms: u64,

    /// Time the engine spent executing.
    pub execution_time_ms: u64,

    /// Time the service spent post-processing the finished query.
    pub service_processing_time_ms: u64,
}

impl QueryStats {
    /// Derives stats from execution metadata.
    ///
    /// Pure: missing metadata fields are treated as zero.
    pub fn collect(metadata: &ExecutionMetadata) -> Self {
        let bytes_scanned = metadata.bytes_scanned.unwrap_or(0);
        Self {
            bytes_scanned,
            cost_estimate_usd: estimate_cost_usd(bytes_scanned),
            total_elapsed_ms: metadata.total_elapsed_ms.unwrap_or(0),
            queue_time_ms: metadata.queue_time_ms.unwrap_or(0),
            planning_time_ms: metadata.planning_time_ms.unwrap_or(0),
            execution_time_ms: metadata.execution_time_ms.unwrap_or(0),
            service_processing_time_ms: metadata.service_processing_time_ms.unwrap_or(0),
        }
    }

    /// Bytes scanned expressed in megabytes, rounded to the nearest MB.
    pub fn bytes_scanned_mb(&self) -> u64 {
        (self.bytes_scanned as f64 / 1_000_000.0).round() as u64
    }
}

/// Estimates the scan cost in USD, rounded to a fixed number of decimals.
fn estimate_cost_usd(bytes_scanned: u64) -> f64 {
    let raw = bytes_scanned as f64 / BYTES_PER_TB * PRICE_PER_TB_USD;
    let scale = 10f64.powi(COST_DECIMALS as i32);
    (raw * scale).round() / scale
}
