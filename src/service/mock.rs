//! Mock service clients for testing.
//!
//! Provide scripted, in-memory implementations of the execution and
//! storage services so the orchestrator can be exercised without a
//! network.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

use super::{
    ColumnDef, ExecutionHandle, ExecutionMetadata, ExecutionService, ExecutionStatus, RawPage,
    StatusReport, StorageService, SubmissionSpec,
};
use crate::error::{QuarryError, Result};

/// Execution id handed out by [`MockExecutionService::submit`].
pub const MOCK_EXECUTION_ID: &str = "00000000-0000-4000-8000-000000000001";

struct MockState {
    /// Status script; the last entry repeats once the script runs out.
    statuses: Vec<StatusReport>,
    status_cursor: usize,
    /// Pages served by `get_results_page`, in order.
    pages: Vec<(Vec<ColumnDef>, Vec<Vec<Option<String>>>)>,
    /// Polls that should fail transiently before the script resumes.
    transient_poll_failures: u32,
    submitted: Vec<SubmissionSpec>,
    poll_count: u32,
    fetch_count: u32,
    last_page_size: Option<u32>,
    cancelled: Vec<String>,
}

/// A mock execution service driven by a scripted status sequence.
pub struct MockExecutionService {
    state: Mutex<MockState>,
}

impl MockExecutionService {
    /// Creates a mock that reports SUCCEEDED immediately and has no output.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                statuses: vec![StatusReport {
                    status: ExecutionStatus::Succeeded,
                    reason: None,
                    metadata: ExecutionMetadata::default(),
                }],
                status_cursor: 0,
                pages: Vec::new(),
                transient_poll_failures: 0,
                submitted: Vec::new(),
                poll_count: 0,
                fetch_count: 0,
                last_page_size: None,
                cancelled: Vec::new(),
            }),
        }
    }

    /// Scripts the status sequence returned by successive polls. The
    /// last status repeats forever.
    pub fn with_statuses(self, statuses: Vec<ExecutionStatus>) -> Self {
        {
            let mut state = self.lock();
            state.statuses = statuses
                .into_iter()
                .map(|status| StatusReport {
                    status,
                    reason: None,
                    metadata: ExecutionMetadata::default(),
                })
                .collect();
        }
        self
    }

    /// Scripts full status reports (statuses plus reasons/metadata).
    pub fn with_status_reports(self, statuses: Vec<StatusReport>) -> Self {
        self.lock().statuses = statuses;
        self
    }

    /// Attaches metadata to the final scripted status report.
    pub fn with_final_metadata(self, metadata: ExecutionMetadata) -> Self {
        {
            let mut state = self.lock();
            if let Some(last) = state.statuses.last_mut() {
                last.metadata = metadata;
            }
        }
        self
    }

    /// Adds one page of results. Pages are chained with generated
    /// continuation tokens; the last page's token is absent.
    pub fn with_page(self, columns: Vec<ColumnDef>, rows: Vec<Vec<Option<String>>>) -> Self {
        self.lock().pages.push((columns, rows));
        self
    }

    /// Makes the next `count` polls fail with a transient error before
    /// the status script resumes.
    pub fn with_transient_poll_failures(self, count: u32) -> Self {
        self.lock().transient_poll_failures = count;
        self
    }

    /// Returns the submission specs received so far.
    pub fn submissions(&self) -> Vec<SubmissionSpec> {
        self.lock().submitted.clone()
    }

    /// Returns how many status polls were issued.
    pub fn poll_count(&self) -> u32 {
        self.lock().poll_count
    }

    /// Returns how many result pages were fetched.
    pub fn fetch_count(&self) -> u32 {
        self.lock().fetch_count
    }

    /// Returns the page size of the most recent results fetch.
    pub fn last_page_size(&self) -> Option<u32> {
        self.lock().last_page_size
    }

    /// Returns the execution ids cancelled so far.
    pub fn cancelled(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockExecutionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionService for MockExecutionService {
    async fn submit(&self, spec: &SubmissionSpec) -> Result<ExecutionHandle> {
        let mut state = self.lock();
        state.submitted.push(spec.clone());
        let output = format!("{}{}.csv", spec.output_location, MOCK_EXECUTION_ID);
        Ok(ExecutionHandle {
            execution_id: MOCK_EXECUTION_ID.to_string(),
            output_location: Url::parse(&output).ok(),
        })
    }

    async fn get_status(&self, _execution_id: &str) -> Result<StatusReport> {
        let mut state = self.lock();
        state.poll_count += 1;
        if state.transient_poll_failures > 0 {
            state.transient_poll_failures -= 1;
            return Err(QuarryError::transient("service unavailable"));
        }
        let report = state
            .statuses
            .get(state.status_cursor)
            .or_else(|| state.statuses.last())
            .cloned()
            .unwrap_or_default();
        if state.status_cursor < state.statuses.len() {
            state.status_cursor += 1;
        }
        Ok(report)
    }

    async fn get_results_page(
        &self,
        _execution_id: &str,
        next_token: Option<&str>,
        page_size: u32,
    ) -> Result<RawPage> {
        let mut state = self.lock();
        state.fetch_count += 1;
        state.last_page_size = Some(page_size);

        let index = match next_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| QuarryError::transient(format!("unknown token '{token}'")))?,
        };
        let (columns, rows) = state
            .pages
            .get(index)
            .cloned()
            .unwrap_or((Vec::new(), Vec::new()));
        let next_token = if index + 1 < state.pages.len() {
            Some((index + 1).to_string())
        } else {
            None
        };

        Ok(RawPage {
            columns,
            rows,
            next_token,
        })
    }

    async fn cancel(&self, execution_id: &str) -> Result<()> {
        self.lock().cancelled.push(execution_id.to_string());
        Ok(())
    }
}

/// Which error a [`FailingExecutionService`] returns from every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Authorization,
}

/// An execution service whose every call fails with one error kind.
pub struct FailingExecutionService {
    kind: FailureKind,
}

impl FailingExecutionService {
    /// Creates a service that always fails with the given kind.
    pub fn new(kind: FailureKind) -> Self {
        Self { kind }
    }

    fn error(&self) -> QuarryError {
        match self.kind {
            FailureKind::Transient => QuarryError::transient("service unavailable"),
            FailureKind::Authorization => {
                QuarryError::authorization("access denied for caller")
            }
        }
    }
}

#[async_trait]
impl ExecutionService for FailingExecutionService {
    async fn submit(&self, _spec: &SubmissionSpec) -> Result<ExecutionHandle> {
        Err(self.error())
    }

    async fn get_status(&self, _execution_id: &str) -> Result<StatusReport> {
        Err(self.error())
    }

    async fn get_results_page(
        &self,
        _execution_id: &str,
        _next_token: Option<&str>,
        _page_size: u32,
    ) -> Result<RawPage> {
        Err(self.error())
    }

    async fn cancel(&self, _execution_id: &str) -> Result<()> {
        Err(self.error())
    }
}

/// An in-memory object store keyed by location URL.
pub struct MockStorageService {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
}

impl MockStorageService {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Stores an object at the given location.
    pub fn put(&self, location: &Url, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(location.to_string(), bytes);
    }

    /// Returns the locations deleted so far.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn get(&self, location: &Url) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| QuarryError::storage(format!("no such object: {location}")))
    }
}

impl Default for MockStorageService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn get_object(&self, location: &Url) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let bytes = self.get(location)?;
        // Serve in two chunks so consumers exercise real stream handling.
        let mid = bytes.len() / 2;
        let chunks = vec![Ok(bytes[..mid].to_vec()), Ok(bytes[mid..].to_vec())];
        Ok(stream::iter(chunks).boxed())
    }

    async fn get_object_range(&self, location: &Url, offset: u64, length: u64) -> Result<Vec<u8>> {
        let bytes = self.get(location)?;
        let start = (offset as usize).min(bytes.len());
        let end = (start + length as usize).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    async fn delete_object(&self, location: &Url) -> Result<()> {
        let removed = self
            .objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(location.as_str());
        if removed.is_none() {
            return Err(QuarryError::storage(format!("no such object: {location}")));
        }
        self.deleted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(location.to_string());
        Ok(())
    }
}
