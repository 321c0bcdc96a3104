//! Service abstraction layer for Quarry.
//!
//! Provides trait-based interfaces for the two external collaborators,
//! the query-execution service and the object-storage service, allowing
//! different backends (or mocks) to be used interchangeably.

mod mock;

pub use mock::{
    FailingExecutionService, FailureKind, MockExecutionService, MockStorageService,
    MOCK_EXECUTION_ID,
};

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Lifecycle status of a remote query execution.
///
/// Transitions: `Queued` → `Running` → one of the terminal states;
/// `Queued` may also jump straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true if no further status transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns the status as the upstream wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status from the upstream wire string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Queued
    }
}

/// Everything the execution service needs to start a new execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSpec {
    /// Final SQL text, with any positional values already bound.
    pub sql: String,
    /// Database to run against.
    pub database: String,
    /// Data catalog name; the service default applies when unset.
    pub catalog: Option<String>,
    /// Workgroup the execution is billed to.
    pub workgroup: String,
    /// Object-storage location where output should be written.
    pub output_location: String,
    /// Whether the service may reuse a prior execution's cached output.
    pub result_reuse: bool,
    /// Maximum age of a reusable result, in minutes.
    pub result_reuse_max_age_minutes: u32,
}

/// Handle to a submitted (or adopted) execution.
///
/// Immutable; owned by the orchestrator for the duration of one call.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    /// Service-assigned execution id.
    pub execution_id: String,
    /// Where the service writes the output object, when known at submit time.
    pub output_location: Option<Url>,
}

/// Status poll response: current status plus whatever metadata the
/// service has accumulated so far.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub status: ExecutionStatus,
    /// Upstream state-change reason, populated for FAILED/CANCELLED.
    pub reason: Option<String>,
    pub metadata: ExecutionMetadata,
}

/// Execution metadata as reported by the service.
///
/// Fields are optional because the service fills them in progressively;
/// missing values are treated as zero by the stats collector.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetadata {
    pub bytes_scanned: Option<u64>,
    pub total_elapsed_ms: Option<u64>,
    pub queue_time_ms: Option<u64>,
    pub planning_time_ms: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub service_processing_time_ms: Option<u64>,
    /// Output object location, available once the execution starts.
    pub output_location: Option<Url>,
}

/// Declared type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl ColumnType {
    /// Maps an upstream declared-type name onto a coercion type.
    ///
    /// Unknown names fall back to `String`, which never fails coercion.
    pub fn from_declared(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "tinyint" | "smallint" | "int" | "integer" | "bigint" => Self::Integer,
            "float" | "real" | "double" | "decimal" => Self::Float,
            "boolean" => Self::Boolean,
            "timestamp" | "datetime" => Self::Timestamp,
            _ => Self::String,
        }
    }
}

/// Name and declared type of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One page of raw, uncoerced results from the execution service.
///
/// Cells are text as returned by the service; `None` marks an absent
/// (null) cell. On the first page of a text-backed result set the first
/// row is the header row.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Continuation token for the next page; `None` on the final page.
    pub next_token: Option<String>,
}

/// Trait defining the interface to the query-execution service.
///
/// Implementations must be safely reentrant (Send + Sync): many
/// orchestrated queries may be in flight over one shared client.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Starts a new execution and returns its handle.
    async fn submit(&self, spec: &SubmissionSpec) -> Result<ExecutionHandle>;

    /// Reports the current status and metadata of an execution.
    async fn get_status(&self, execution_id: &str) -> Result<StatusReport>;

    /// Fetches one page of results. `page_size` of zero requests the
    /// service's default page size.
    async fn get_results_page(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
        page_size: u32,
    ) -> Result<RawPage>;

    /// Cancels a running execution.
    async fn cancel(&self, execution_id: &str) -> Result<()>;
}

/// Trait defining the interface to the object-storage service holding
/// query output.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Reads an entire object as a stream of byte chunks.
    async fn get_object(&self, location: &Url) -> Result<BoxStream<'static, Result<Vec<u8>>>>;

    /// Reads a byte range of an object.
    async fn get_object_range(&self, location: &Url, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Deletes an object.
    async fn delete_object(&self, location: &Url) -> Result<()>;
}
