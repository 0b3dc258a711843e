use std::fmt;
use std::panic::Location;

pub type Result<T> = std::result::Result<T, PipelineError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which stage of the pipeline an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    NotFound,
    Data,
    Ingestion,
    Preprocessing,
    Training,
    Tracking,
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::NotFound => "not found",
            Self::Data => "data",
            Self::Ingestion => "ingestion",
            Self::Preprocessing => "preprocessing",
            Self::Training => "training",
            Self::Tracking => "tracking",
            Self::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

/// The single error type every stage raises. Carries the source location
/// where it was constructed, so a failure deep in a stage still points at
/// the offending line.
#[derive(Debug, thiserror::Error)]
#[error("{kind} error: {message} ({file}:{line})")]
pub struct PipelineError {
    kind: ErrorKind,
    message: String,
    file: &'static str,
    line: u32,
    #[source]
    source: Option<BoxedSource>,
}

impl PipelineError {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::at(Location::caller(), kind, message.into(), None)
    }

    #[track_caller]
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxedSource>,
    ) -> Self {
        Self::at(Location::caller(), kind, message.into(), Some(source.into()))
    }

    fn at(
        location: &'static Location<'static>,
        kind: ErrorKind,
        message: String,
        source: Option<BoxedSource>,
    ) -> Self {
        Self {
            kind,
            message,
            file: location.file(),
            line: location.line(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// File and line where the error was raised.
    pub fn location(&self) -> (&'static str, u32) {
        (self.file, self.line)
    }
}

/// Converts any underlying error into a [`PipelineError`] tagged with the
/// stage it surfaced in, keeping the call site as the recorded location.
pub trait ErrorContext<T> {
    #[track_caller]
    fn wrap(self, kind: ErrorKind, message: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<BoxedSource>,
{
    #[track_caller]
    fn wrap(self, kind: ErrorKind, message: &str) -> Result<T> {
        let location = Location::caller();
        self.map_err(|err| {
            PipelineError::at(location, kind, message.to_string(), Some(err.into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_message_and_location() {
        let err = PipelineError::new(ErrorKind::Ingestion, "failed to download object");
        let rendered = err.to_string();
        assert!(rendered.contains("ingestion error"));
        assert!(rendered.contains("failed to download object"));
        assert!(rendered.contains("error.rs:"));
    }

    #[test]
    fn wrap_preserves_source_and_kind() {
        let io_err: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = io_err.wrap(ErrorKind::Data, "failed to read file").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.location().0.ends_with("error.rs"));
    }

    #[test]
    fn location_points_at_the_throw_site() {
        let err = PipelineError::new(ErrorKind::Config, "bad config");
        let (file, line) = err.location();
        assert!(file.ends_with("error.rs"));
        assert!(line > 0);
    }
}
