//! Query request types for Quarry.
//!
//! The caller may pass raw SQL, a bare execution id, or a structured
//! request; the variant is resolved once here, before the orchestrator
//! ever touches the network.

use crate::config::ClientConfig;
use crate::error::{QuarryError, Result};

/// What the caller handed to [`QueryClient::query`](crate::QueryClient::query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryInput {
    /// A SQL statement to submit as a new execution.
    Sql(String),
    /// An existing execution id to adopt; no submission call is made.
    Execution(String),
    /// A fully structured request.
    Request(QueryRequest),
}

impl From<&str> for QueryInput {
    /// A bare string that has the shape of an execution id adopts that
    /// execution; anything else is treated as SQL.
    fn from(s: &str) -> Self {
        if is_execution_id(s) {
            Self::Execution(s.to_string())
        } else {
            Self::Sql(s.to_string())
        }
    }
}

impl From<String> for QueryInput {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<QueryRequest> for QueryInput {
    fn from(request: QueryRequest) -> Self {
        Self::Request(request)
    }
}

/// A structured query request.
///
/// Exactly one of `sql` and `execution_id` must be set: `sql` starts a
/// new execution, `execution_id` adopts an existing one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub sql: Option<String>,
    pub execution_id: Option<String>,
    /// Database override for this query.
    pub db: Option<String>,
    /// Catalog override for this query.
    pub catalog: Option<String>,
    /// Page size override for this query.
    pub page_size: Option<u32>,
    /// Continuation token from a previous page.
    pub next_token: Option<String>,
    /// Positional values bound to `?` placeholders in the SQL.
    pub values: Vec<String>,
}

impl QueryRequest {
    /// Creates a request that submits the given SQL.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            ..Default::default()
        }
    }

    /// Creates a request that adopts an existing execution.
    pub fn execution(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: Some(execution_id.into()),
            ..Default::default()
        }
    }

    /// Sets positional values for `?` placeholders.
    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    /// Sets the continuation token.
    pub fn with_next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    /// Sets the database for this query.
    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    /// Sets the page size for this query.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// A request after validation: either a statement to submit or an
/// execution to adopt, plus the pagination position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolvedRequest {
    Submit {
        sql: String,
        db: String,
        catalog: Option<String>,
        next_token: Option<String>,
        page_size: Option<u32>,
    },
    Adopt {
        execution_id: String,
        next_token: Option<String>,
        page_size: Option<u32>,
    },
}

/// Resolves caller input into a validated request.
///
/// Enforces the sql/execution-id invariant and binds positional values,
/// all before any service call.
pub(crate) fn resolve(input: QueryInput, config: &ClientConfig) -> Result<ResolvedRequest> {
    let request = match input {
        QueryInput::Sql(sql) => QueryRequest::sql(sql),
        QueryInput::Execution(id) => QueryRequest::execution(id),
        QueryInput::Request(request) => request,
    };

    match (&request.sql, &request.execution_id) {
        (Some(_), Some(_)) => Err(QuarryError::validation(
            "request must carry either sql or an execution id, not both",
        )),
        (None, None) => Err(QuarryError::validation(
            "request must carry either sql or an execution id",
        )),
        (Some(sql), None) => {
            let sql = sql.trim();
            if sql.is_empty() {
                return Err(QuarryError::validation("sql statement is empty"));
            }
            Ok(ResolvedRequest::Submit {
                sql: bind_values(sql, &request.values)?,
                db: request.db.unwrap_or_else(|| config.db.clone()),
                catalog: request.catalog.or_else(|| config.catalog.clone()),
                next_token: request.next_token,
                page_size: request.page_size,
            })
        }
        (None, Some(execution_id)) => Ok(ResolvedRequest::Adopt {
            execution_id: execution_id.clone(),
            next_token: request.next_token,
            page_size: request.page_size,
        }),
    }
}

/// Returns true if `s` has the 8-4-4-4-12 hex shape of an execution id.
fn is_execution_id(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == 5
        && [8, 4, 4, 4, 12]
            .iter()
            .zip(&parts)
            .all(|(len, part)| part.len() == *len && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Substitutes positional `?` placeholders with the given values.
///
/// Values that parse as numbers are inserted bare; everything else is
/// single-quoted with embedded quotes doubled. Placeholders inside
/// string literals are left alone. The placeholder and value counts
/// must match exactly.
fn bind_values(sql: &str, values: &[String]) -> Result<String> {
    let mut bound = String::with_capacity(sql.len());
    let mut next_value = values.iter();
    let mut used = 0usize;
    let mut in_string = false;

    for c in sql.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                bound.push(c);
            }
            '?' if !in_string => {
                let value = next_value.next().ok_or_else(|| {
                    QuarryError::validation(format!(
                        "sql has more than {} placeholders but {} values were given",
                        used,
                        values.len()
                    ))
                })?;
                used += 1;
                bound.push_str(&render_value(value));
            }
            _ => bound.push(c),
        }
    }

    if used < values.len() {
        return Err(QuarryError::validation(format!(
            "sql has {used} placeholders but {} values were given",
            values.len()
        )));
    }

    Ok(bound)
}

/// Renders one bound value as a SQL literal.
fn render_value(value: &str) -> String {
    if value.parse::<i64>().is_ok() || value.parse::<f64>().is_ok() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}
