//! Error types and result definitions for flowkit operations.
//!
//! [`FlowError`] is cheap to clone: the originating error and the captured backtrace are shared
//! behind [`Arc`]s. Components that deliver one outcome to many callers (single-flight waiters,
//! promise readers, error group members) hand out clones of the same error.

use std::any::Any;
use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

use flowkit_config::shared::ValidationError;
use tokio::task::JoinError;

/// Convenient result type for flowkit operations using [`FlowError`] as the error type.
pub type FlowResult<T> = Result<T, FlowError>;

/// Main error type for flowkit operations.
#[derive(Debug, Clone)]
pub struct FlowError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of errors produced by flowkit components.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Task Errors
    TaskFailed,
    TaskPanicked,
    TaskAborted,

    // Coordination Errors
    Cancelled,
    PromiseDropped,
    FlightAbandoned,

    // Worker Errors
    WorkerPanic,

    // Configuration & State Errors
    ConfigError,
    InvalidState,

    // Unknown / Uncategorized
    Unknown,
}

impl FlowError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Returns `true` if this error reports a cancelled operation.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a [`FlowError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        FlowError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for FlowError {
    fn eq(&self, other: &FlowError) -> bool {
        self.kind == other.kind
    }
}

impl Hash for FlowError {
    /// Hashes the error using only its kind and static description.
    ///
    /// Location, detail, source and backtrace are excluded so that errors of the same category
    /// group together.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.description.hash(state);
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        write_detail(self.detail.as_deref(), f, 1)?;
        write_backtrace(self.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for FlowError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

/// Renders a panic payload as text.
///
/// Panics raised with `panic!("...")` carry a `&str` or a `String`; anything else is reported
/// as an opaque payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_string();
    }

    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }

    "<non-string panic payload>".to_string()
}

/// Creates a [`FlowError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for FlowError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> FlowError {
        FlowError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`FlowError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for FlowError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> FlowError {
        FlowError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts a failed [`JoinError`] into [`ErrorKind::TaskPanicked`] or
/// [`ErrorKind::TaskAborted`].
impl From<JoinError> for FlowError {
    #[track_caller]
    fn from(err: JoinError) -> FlowError {
        if err.is_cancelled() {
            return FlowError::from_components(
                ErrorKind::TaskAborted,
                Cow::Borrowed("Task was aborted"),
                Some(Cow::Owned(err.to_string())),
                None,
            );
        }

        let detail = match err.try_into_panic() {
            Ok(payload) => panic_message(payload.as_ref()),
            Err(err) => err.to_string(),
        };

        FlowError::from_components(
            ErrorKind::TaskPanicked,
            Cow::Borrowed("Task panicked"),
            Some(Cow::Owned(detail)),
            None,
        )
    }
}

/// Converts [`ValidationError`] to [`FlowError`] with [`ErrorKind::ConfigError`].
impl From<ValidationError> for FlowError {
    #[track_caller]
    fn from(err: ValidationError) -> FlowError {
        let detail = err.to_string();
        let source = Arc::new(err);
        FlowError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid configuration"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::io;

    use super::*;
    use crate::flow_error;

    fn hash_of(err: &FlowError) -> u64 {
        let mut hasher = DefaultHasher::new();
        err.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn display_includes_kind_description_and_detail() {
        let err = flow_error!(ErrorKind::TaskFailed, "Task failed", "step 3\nretry later");
        let rendered = err.to_string();

        assert!(rendered.starts_with("[TaskFailed] Task failed @ "));
        assert!(rendered.contains("src/error.rs"));
        assert!(rendered.contains("\n  Detail:\n    step 3\n    retry later"));
    }

    #[test]
    fn empty_detail_is_marked() {
        let err = flow_error!(ErrorKind::Unknown, "Something happened", detail = String::new());
        assert!(err.to_string().contains("Detail: <empty>"));
    }

    #[test]
    fn clones_share_source_and_compare_by_kind() {
        let err = flow_error!(
            ErrorKind::TaskFailed,
            "Task failed",
            source: io::Error::other("disk full")
        );
        let clone = err.clone();

        assert_eq!(err, clone);
        assert_eq!(
            error::Error::source(&clone).map(|source| source.to_string()),
            Some("disk full".to_string())
        );
        assert_ne!(err, flow_error!(ErrorKind::Cancelled, "Task failed"));
    }

    #[test]
    fn hash_ignores_detail_and_location() {
        let first = flow_error!(ErrorKind::TaskFailed, "Task failed", "first");
        let second = flow_error!(ErrorKind::TaskFailed, "Task failed", "second");
        let other = flow_error!(ErrorKind::TaskFailed, "Other description");

        assert_eq!(hash_of(&first), hash_of(&second));
        assert_ne!(hash_of(&first), hash_of(&other));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let static_payload: Box<dyn Any + Send> = Box::new("boom");
        let owned_payload: Box<dyn Any + Send> = Box::new(format!("boom {}", 2));
        let opaque_payload: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(static_payload.as_ref()), "boom");
        assert_eq!(panic_message(owned_payload.as_ref()), "boom 2");
        assert_eq!(
            panic_message(opaque_payload.as_ref()),
            "<non-string panic payload>"
        );
    }

    async fn explode() {
        panic!("worker exploded");
    }

    #[tokio::test]
    async fn join_errors_map_to_task_kinds() {
        let panicked = tokio::spawn(explode()).await.unwrap_err();
        let err = FlowError::from(panicked);
        assert_eq!(err.kind(), ErrorKind::TaskPanicked);
        assert_eq!(err.detail(), Some("worker exploded"));

        let handle = tokio::spawn(futures::future::pending::<()>());
        handle.abort();
        let err = FlowError::from(handle.await.unwrap_err());
        assert_eq!(err.kind(), ErrorKind::TaskAborted);
    }

    #[test]
    fn validation_errors_become_config_errors() {
        let err = FlowError::from(ValidationError::InvalidFieldValue {
            field: "stream.capacity".to_string(),
            constraint: "must be greater than 0".to_string(),
        });

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.detail().is_some_and(|detail| detail.contains("stream.capacity")));
    }
}
