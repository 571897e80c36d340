//! Tracing setup plus the correlation id that follows a request or a
//! background sync job through every log line it produces.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter,
    filter::{Directive, ParseError},
    fmt,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};
use uuid::Uuid;

use crate::config::AppConfig;

/// Header a caller can use to supply its own correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_TRACE_ID_LEN: usize = 128;

/// SQLx logs every statement at info; keep it at warn unless RUST_LOG says otherwise.
const QUIET_DIRECTIVES: [&str; 3] = ["sqlx=warn", "sea_orm_migration=info", "hyper_util=info"];

/// Correlation data scoped to one request or one background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub job_id: Option<Uuid>,
}

impl TraceContext {
    /// Uses the caller's id when it is usable, otherwise mints `req-<uuid>`.
    pub fn for_request(supplied: Option<&str>) -> Self {
        let trace_id = supplied
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_TRACE_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()));
        Self {
            trace_id,
            job_id: None,
        }
    }

    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            trace_id: format!("job-{job_id}"),
            job_id: Some(job_id),
        }
    }
}

task_local! {
    static CURRENT: TraceContext;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber once; later calls are no-ops.
///
/// `RUST_LOG` wins over the configured level. Output is json unless the
/// config asks for `pretty`.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let result = install(config);
    if result.is_err() {
        INSTALLED.store(false, Ordering::SeqCst);
    }
    result
}

fn install(config: &AppConfig) -> Result<(), TelemetryInitError> {
    let filter = build_filter(&config.log_level)?;
    let output = if config.log_format == "pretty" {
        fmt::layer().pretty().with_target(true).boxed()
    } else {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()?;

    // Route `log` records (SQLx, sea-orm) into the subscriber. A bridge
    // installed earlier by a test harness is fine.
    if let Err(err) = LogTracer::init() {
        tracing::debug!(error = %err, "log bridge already installed");
    }

    tracing::debug!(
        profile = %config.profile,
        level = %config.log_level,
        format = %config.log_format,
        "Tracing initialized"
    );
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter, TelemetryInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level).map_err(|err| TelemetryInitError::Filter {
        directive: level.to_string(),
        message: err.to_string(),
    })?;
    for directive in QUIET_DIRECTIVES {
        let parsed: Directive = directive.parse().map_err(|err: ParseError| {
            TelemetryInitError::Filter {
                directive: directive.to_string(),
                message: err.to_string(),
            }
        })?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Runs `future` with `context` visible to [`current_trace_id`].
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    CURRENT.scope(context, future).await
}

pub fn current_trace_id() -> Option<String> {
    CURRENT.try_with(|ctx| ctx.trace_id.clone()).ok()
}

/// The ledger job the current task is running, if any.
pub fn current_job_id() -> Option<Uuid> {
    CURRENT.try_with(|ctx| ctx.job_id).ok().flatten()
}
