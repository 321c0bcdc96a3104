//! Query lifecycle orchestration.
//!
//! [`QueryClient`] is the crate's entry point: it submits (or adopts) an
//! execution, polls it to a terminal status with bounded backoff,
//! retrieves and parses the output, and returns a cost-annotated
//! envelope. Service clients are injected at construction so every call
//! is testable against mocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, QueryOptions, RetryConfig};
use crate::cursor::PageCursor;
use crate::error::{QuarryError, Result};
use crate::parser;
use crate::request::{self, QueryInput, ResolvedRequest};
use crate::results::{ResultEnvelope, ResultPage, Row};
use crate::service::{
    ExecutionHandle, ExecutionService, ExecutionStatus, StatusReport, StorageService,
    SubmissionSpec,
};
use crate::stats::QueryStats;

/// Client-side orchestrator for a distributed SQL query service.
///
/// One client may serve any number of concurrent [`query`](Self::query)
/// calls; the injected services are shared, reentrant collaborators and
/// each call keeps its own poll loop, backoff timer, and retry counter.
pub struct QueryClient {
    execution: Arc<dyn ExecutionService>,
    storage: Arc<dyn StorageService>,
    config: ClientConfig,
}

impl QueryClient {
    /// Creates a client over the given services.
    ///
    /// Fails without any network call when the configuration cannot
    /// back a client (missing or unparseable output bucket).
    pub fn new(
        execution: Arc<dyn ExecutionService>,
        storage: Arc<dyn StorageService>,
        config: ClientConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            execution,
            storage,
            config,
        })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs a query to completion and returns its envelope.
    ///
    /// The input may be a SQL string, an execution id to adopt, or a
    /// structured [`QueryRequest`](crate::QueryRequest).
    pub async fn query(&self, input: impl Into<QueryInput>) -> Result<ResultEnvelope> {
        self.query_with_options(input, &QueryOptions::default())
            .await
    }

    /// Runs a query with per-call option overrides.
    pub async fn query_with_options(
        &self,
        input: impl Into<QueryInput>,
        options: &QueryOptions,
    ) -> Result<ResultEnvelope> {
        self.execute(input.into(), options, &CancellationToken::new())
            .await
    }

    /// Runs a query that stops polling promptly when `cancel` fires.
    ///
    /// Cancelling the poll loop does not cancel the remote execution;
    /// use [`cancel`](Self::cancel) for that.
    pub async fn query_with_cancellation(
        &self,
        input: impl Into<QueryInput>,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<ResultEnvelope> {
        self.execute(input.into(), options, cancel).await
    }

    /// Cancels a remote execution.
    pub async fn cancel(&self, execution_id: &str) -> Result<()> {
        info!(execution_id, "cancelling execution");
        self.execution.cancel(execution_id).await
    }

    async fn execute(
        &self,
        input: QueryInput,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<ResultEnvelope> {
        let config = self.config.merged(options);
        let resolved = request::resolve(input, &config)?;
        let start = Instant::now();
        let mut attempts = 0u32;

        // Phase 1: obtain an execution handle, by submission or adoption.
        let (handle, next_token, page_size) = match resolved {
            ResolvedRequest::Submit {
                sql,
                db,
                catalog,
                next_token,
                page_size,
            } => {
                let spec = SubmissionSpec {
                    sql,
                    database: db,
                    catalog,
                    workgroup: config.workgroup.clone(),
                    output_location: config.output_bucket.clone(),
                    result_reuse: config.result_reuse,
                    result_reuse_max_age_minutes: config.result_reuse_max_age_minutes,
                };
                let handle = self.submit(&spec, &config.retry, &mut attempts, cancel).await?;
                info!(execution_id = %handle.execution_id, "query submitted");
                (handle, next_token, page_size)
            }
            ResolvedRequest::Adopt {
                execution_id,
                next_token,
                page_size,
            } => {
                debug!(%execution_id, "adopting existing execution");
                let handle = ExecutionHandle {
                    execution_id,
                    output_location: None,
                };
                (handle, next_token, page_size)
            }
        };
        let page_size = page_size.unwrap_or(config.page_size);

        if !config.wait_for_results {
            return Ok(ResultEnvelope {
                execution_id: handle.execution_id,
                output_location: handle.output_location,
                ..Default::default()
            });
        }

        // Phase 2: poll to a terminal status.
        let report = self
            .poll_until_terminal(&handle.execution_id, &config.retry, &mut attempts, cancel)
            .await?;
        info!(
            execution_id = %handle.execution_id,
            status = %report.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "execution reached terminal status"
        );

        match report.status {
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => {
                return Err(QuarryError::ExecutionFailed {
                    execution_id: handle.execution_id,
                    status: report.status,
                    reason: report
                        .reason
                        .unwrap_or_else(|| "no reason reported".to_string()),
                });
            }
            ExecutionStatus::Succeeded => {}
            // poll_until_terminal only returns terminal reports.
            other => {
                return Err(QuarryError::RetryExhausted {
                    execution_id: handle.execution_id,
                    attempts,
                    last_status: other,
                });
            }
        }

        let output_location = report
            .metadata
            .output_location
            .clone()
            .or(handle.output_location);
        let stats = config.get_stats.then(|| QueryStats::collect(&report.metadata));

        // Phase 3: retrieve and parse output.
        if config.skip_results {
            return Ok(ResultEnvelope {
                execution_id: handle.execution_id,
                items: None,
                stats,
                output_location,
                next_token: None,
                count: 0,
            });
        }

        let page = self
            .fetch_rows(
                &handle.execution_id,
                &config,
                output_location.as_ref(),
                next_token.as_deref(),
                page_size,
                &mut attempts,
                cancel,
            )
            .await?;
        let ResultPage {
            rows,
            next_token,
            row_count: count,
        } = page;

        if next_token.is_none() && config.delete_output_after_read {
            if let Some(location) = &output_location {
                if let Err(e) = self.storage.delete_object(location).await {
                    warn!(%location, error = %e, "failed to delete output object");
                }
            }
        }

        let items = if rows.is_empty() && config.ignore_empty {
            None
        } else {
            Some(rows)
        };

        Ok(ResultEnvelope {
            execution_id: handle.execution_id,
            items,
            stats,
            output_location,
            next_token,
            count,
        })
    }

    /// Submits a new execution, retrying transient failures within the
    /// shared attempt budget.
    async fn submit(
        &self,
        spec: &SubmissionSpec,
        retry: &RetryConfig,
        attempts: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<ExecutionHandle> {
        loop {
            match self.execution.submit(spec).await {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_retryable() && *attempts < retry.max_attempts => {
                    warn!(error = %e, attempt = *attempts, "submit failed, retrying");
                    let delay = retry.delay_for_attempt(*attempts);
                    *attempts += 1;
                    sleep_or_cancel(delay, cancel, "<unsubmitted>").await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Polls the execution until a terminal status, consuming one
    /// attempt per non-terminal poll (or transient poll error).
    async fn poll_until_terminal(
        &self,
        execution_id: &str,
        retry: &RetryConfig,
        attempts: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<StatusReport> {
        let mut last_status = ExecutionStatus::Queued;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(execution_id));
            }

            match self.execution.get_status(execution_id).await {
                Ok(report) => {
                    debug!(
                        execution_id,
                        status = %report.status,
                        attempt = *attempts,
                        "polled execution status"
                    );
                    if report.status.is_terminal() {
                        return Ok(report);
                    }
                    last_status = report.status;
                }
                Err(e) if e.is_retryable() => {
                    warn!(execution_id, error = %e, attempt = *attempts, "transient poll error");
                }
                Err(e) => return Err(e),
            }

            let delay = retry.delay_for_attempt(*attempts);
            *attempts += 1;
            if *attempts >= retry.max_attempts {
                return Err(QuarryError::RetryExhausted {
                    execution_id: execution_id.to_string(),
                    attempts: *attempts,
                    last_status,
                });
            }
            sleep_or_cancel(delay, cancel, execution_id).await?;
        }
    }

    /// Fetches and parses output rows for a SUCCEEDED execution.
    async fn fetch_rows(
        &self,
        execution_id: &str,
        config: &ClientConfig,
        output_location: Option<&url::Url>,
        token: Option<&str>,
        page_size: u32,
        attempts: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<ResultPage> {
        loop {
            let fetched = if config.format_json {
                self.fetch_structured(execution_id, config, token, page_size)
                    .await
            } else {
                self.fetch_raw(execution_id, config, output_location).await
            };

            match fetched {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && *attempts < config.retry.max_attempts => {
                    warn!(execution_id, error = %e, attempt = *attempts, "fetch failed, retrying");
                    let delay = config.retry.delay_for_attempt(*attempts);
                    *attempts += 1;
                    sleep_or_cancel(delay, cancel, execution_id).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Structured path: pages from the execution service. The first
    /// page of a fresh read carries the header row.
    async fn fetch_structured(
        &self,
        execution_id: &str,
        config: &ClientConfig,
        token: Option<&str>,
        page_size: u32,
    ) -> Result<ResultPage> {
        let cursor = PageCursor::new(self.execution.as_ref(), execution_id, page_size);
        let skip_header = token.is_none();
        let raw = if page_size > 0 {
            cursor.next_page(token).await?
        } else {
            cursor.drain(token).await?
        };

        let next_token = raw.next_token.clone();
        let rows: Vec<Row> = parser::parse_raw_page(
            raw.rows,
            raw.columns,
            skip_header,
            config.null_sentinel.clone(),
        )
        .collect::<Result<_>>()?;
        Ok(ResultPage::new(rows, next_token))
    }

    /// Raw path: download the whole output object from storage and
    /// parse it as CSV, using a one-row metadata fetch for the declared
    /// column schema. Always returns a final page. Reads from the
    /// location the service reported, falling back to the conventional
    /// address under the configured bucket.
    async fn fetch_raw(
        &self,
        execution_id: &str,
        config: &ClientConfig,
        output_location: Option<&url::Url>,
    ) -> Result<ResultPage> {
        let schema_page = self
            .execution
            .get_results_page(execution_id, None, 1)
            .await?;

        let location = match output_location {
            Some(location) => location.clone(),
            None => self.output_object_location(execution_id)?,
        };
        let mut stream = self.storage.get_object(&location).await?;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk?);
        }
        debug!(execution_id, bytes = bytes.len(), "downloaded raw output object");

        let rows: Vec<Row> = parser::parse_csv(
            bytes,
            &schema_page.columns,
            config.null_sentinel.clone(),
        )?
        .collect::<Result<_>>()?;
        Ok(ResultPage::new(rows, None))
    }

    /// The conventional location of an execution's output object under
    /// the configured bucket.
    fn output_object_location(&self, execution_id: &str) -> Result<url::Url> {
        let base = self.config.output_location()?;
        base.join(&format!("{execution_id}.csv")).map_err(|e| {
            QuarryError::storage(format!(
                "cannot derive output location for {execution_id}: {e}"
            ))
        })
    }
}

fn cancelled(execution_id: &str) -> QuarryError {
    QuarryError::transient(format!(
        "polling cancelled by caller; execution {execution_id} may still be running"
    ))
}

/// Sleeps for `delay`, waking early with an error if `cancel` fires.
async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancellationToken,
    execution_id: &str,
) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(cancelled(execution_id)),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
