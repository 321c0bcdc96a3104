//! Quarry - an async client-side orchestrator for distributed SQL query
//! services.
//!
//! A [`QueryClient`] turns one SQL statement (or a previously issued
//! execution id) into a completed, paginated, cost-annotated result
//! set, coordinating an injected execution service and object-storage
//! service.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use quarry::{ClientConfig, QueryClient};
//! # async fn example(
//! #     execution: Arc<dyn quarry::ExecutionService>,
//! #     storage: Arc<dyn quarry::StorageService>,
//! # ) -> quarry::Result<()> {
//! let client = QueryClient::new(
//!     execution,
//!     storage,
//!     ClientConfig::new("s3://my-bucket/results/").with_stats(),
//! )?;
//!
//! let envelope = client.query("SELECT * FROM events LIMIT 10").await?;
//! println!("{} rows, {:?}", envelope.count, envelope.stats);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod request;
pub mod results;
pub mod service;
pub mod stats;

pub use config::{ClientConfig, QueryOptions, RetryConfig};
pub use error::{QuarryError, Result};
pub use orchestrator::QueryClient;
pub use request::{QueryInput, QueryRequest};
pub use results::{ResultEnvelope, ResultPage, Row, Value};
pub use service::{
    ColumnDef, ColumnType, ExecutionHandle, ExecutionMetadata, ExecutionService, ExecutionStatus,
    RawPage, StatusReport, StorageService, SubmissionSpec,
};
pub use stats::QueryStats;
