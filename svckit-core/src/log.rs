//! Logging setup and request-scoped log context.
//!
//! [`init`] installs a global `tracing` subscriber writing to the console and
//! to daily-rotated files. [`LogContext`] carries key/value fields that are
//! attached to every event logged through it, and [`intercept`] wraps an
//! inbound call with a correlation id and a completion record.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    future::Future,
    path::PathBuf,
    time::Instant,
};

use serde::Deserialize;
use tracing::Instrument;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Section, error::LogError, funcs::root_dir, status::StatusCode, unique};

/// Metadata key carrying the correlation id of an inbound request.
pub const REQUEST_ID_HEADER: &str = "Req-Id";

/// Logging options, read from `log.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Write to stdout.
    pub console: bool,
    /// Write to rotated files.
    pub file: bool,
    /// Directory of the log files. Defaults to the executable's directory.
    pub dir: Option<PathBuf>,
    /// File name prefix. Files are named `<prefix>.<date>.log`, or `<date>.log` without one.
    pub file_prefix: String,
    /// Number of daily files kept.
    pub max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            console: true,
            file: true,
            dir: None,
            file_prefix: String::new(),
            max_files: 7,
        }
    }
}

impl Section for LogSettings {
    const NODE: &'static str = "log";
    const KEY: &'static str = "";
}

/// Installs the global subscriber.
///
/// Keep the returned guard alive for as long as file output is wanted;
/// dropping it flushes and stops the background writer.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>, LogError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let console = settings.console.then(|| tfmt::layer().with_target(true));

    let (file, guard) = if settings.file {
        let dir = settings.dir.clone().unwrap_or_else(root_dir);
        let mut builder = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_suffix("log")
            .max_log_files(settings.max_files.max(1));
        if !settings.file_prefix.is_empty() {
            builder = builder.filename_prefix(&settings.file_prefix);
        }

        let appender = builder
            .build(&dir)
            .map_err(|err| LogError::Appender(err.to_string()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        (
            Some(tfmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| LogError::AlreadyInitialized(err.to_string()))?;

    Ok(guard)
}

/// Key/value fields attached to every event logged through the context.
///
/// The root context has no fields. Derived contexts are cheap to clone and
/// are meant to be passed down a request's call chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    fields: BTreeMap<String, String>,
}

impl LogContext {
    /// The context without fields.
    pub fn root() -> Self {
        Self::default()
    }

    /// Resolves an optional context, falling back to the root one.
    pub fn or_root(ctx: Option<&LogContext>) -> Self {
        ctx.cloned().unwrap_or_default()
    }

    /// Derives a context carrying these fields in addition to the current ones.
    ///
    /// A field that already exists takes the new value.
    pub fn with_fields<K, V>(&self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.fields.clone();
        merged.extend(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );

        Self { fields: merged }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn debug(&self, message: impl Display) {
        tracing::debug!(ctx = %self, "{message}");
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(ctx = %self, "{message}");
    }

    pub fn warn(&self, message: impl Display) {
        tracing::warn!(ctx = %self, "{message}");
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(ctx = %self, "{message}");
    }
}

impl Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }

        Ok(())
    }
}

/// Wraps an inbound call.
///
/// Reuses `request_id` when non-empty or generates one, hands the handler a
/// context carrying `method` and `req-id`, and logs the outcome's status code
/// and the elapsed time once the handler completes. The handler runs inside a
/// `request` span, so plain `tracing` events it emits carry the same fields.
pub async fn intercept<F, Fut, T>(
    ctx: Option<&LogContext>,
    method: &str,
    request_id: Option<&str>,
    handler: F,
) -> T
where
    F: FnOnce(LogContext) -> Fut,
    Fut: Future<Output = T>,
    T: StatusCode,
{
    let started = Instant::now();
    let request_id = request_id
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(unique::uuid);

    let parent = LogContext::or_root(ctx);
    let span = tracing::info_span!(
        "request",
        method = %method,
        req_id = %request_id,
        ctx = %parent,
    );
    let ctx = parent.with_fields([("method", method), ("req-id", request_id.as_str())]);

    let outcome = handler(ctx).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::info!(
            code = outcome.status_code(),
            duration = ?started.elapsed(),
            "request served"
        )
    });

    outcome
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{error::DocumentStoreError, status};

    #[test]
    fn fields_merge_and_override() {
        let root = LogContext::root();
        let ctx = root
            .with_fields([("user", "42"), ("method", "get")])
            .with_fields([("method", "put")]);

        assert!(root.is_empty());
        assert_eq!(ctx.get("user"), Some("42"));
        assert_eq!(ctx.get("method"), Some("put"));
        assert_eq!(ctx.to_string(), "method=put user=42");
    }

    #[test]
    fn missing_context_falls_back_to_root() {
        assert_eq!(LogContext::or_root(None), LogContext::root());
    }

    #[tokio::test]
    async fn intercept_keeps_request_id() {
        let outcome: Result<String, DocumentStoreError> =
            intercept(None, "/user.Profile/Get", Some("abc"), |ctx| async move {
                Ok(ctx.get("req-id").unwrap_or_default().to_string())
            })
            .await;

        assert_eq!(outcome.unwrap(), "abc");
    }

    #[tokio::test]
    async fn intercept_generates_request_id() {
        let parent = LogContext::root().with_fields([("tenant", "t1")]);
        let outcome: Result<LogContext, DocumentStoreError> =
            intercept(Some(&parent), "/user.Profile/Get", Some(""), |ctx| async move {
                Ok(ctx)
            })
            .await;

        let ctx = outcome.unwrap();
        assert_eq!(ctx.get("tenant"), Some("t1"));
        assert_eq!(ctx.get("method"), Some("/user.Profile/Get"));
        assert_eq!(ctx.get("req-id").map(str::len), Some(36));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn handler_events_carry_request_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(
            tfmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        );
        let _default = tracing::subscriber::set_default(subscriber);

        let outcome: Result<(), DocumentStoreError> =
            intercept(None, "/user.Profile/Get", Some("abc"), |_| async {
                tracing::info!("loading profile");
                Ok(())
            })
            .await;

        assert!(outcome.is_ok());
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|line| line.contains("loading profile"))
            .unwrap();
        assert!(line.contains("method=/user.Profile/Get"));
        assert!(line.contains("req_id=abc"));
        assert!(output.lines().any(|line| line.contains("request served") && line.contains("req_id=abc")));
    }

    #[tokio::test]
    async fn intercept_passes_failures_through() {
        let outcome: Result<(), DocumentStoreError> =
            intercept(None, "/user.Profile/Delete", None, |_| async {
                Err(DocumentStoreError::UnfilteredDelete("users".into()))
            })
            .await;

        assert_eq!(outcome.status_code(), status::WRONG_REQ);
    }

    #[test]
    fn settings_default_to_daily_files_kept_a_week() {
        let settings: LogSettings = toml::from_str("level = \"info\"").unwrap();

        assert_eq!(settings.level, "info");
        assert_eq!(settings.max_files, 7);
        assert!(settings.console && settings.file);
    }
}
