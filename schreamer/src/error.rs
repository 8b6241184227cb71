use std::path::PathBuf;

/// Error type returned by user callbacks (custom codecs).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad classes of failure. None of them are retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The schema or the options are malformed.
    Configuration,
    /// No usable value could be resolved for a field.
    Value,
    /// The sink or the source failed.
    Io,
    /// The source ended before the declared bytes were read.
    UnexpectedEof,
    /// A user-supplied callback failed.
    Callback,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{path}: node `{kind}` must have a name")]
    MissingName { kind: &'static str, path: String },

    #[error(
        "{path}: `{kind}` string must be the payload of a U8, U16, U32, or U64 node to specify the length of the string"
    )]
    MisplacedString { kind: &'static str, path: String },

    #[error("{path}: node `{kind}` cannot carry a {payload} payload")]
    InvalidPayload {
        kind: &'static str,
        payload: &'static str,
        path: String,
    },

    #[error("{path}: sequence element schema is empty")]
    EmptySequence { path: String },

    #[error("{path}: attempting to open a file within a file")]
    NestedFile { path: String },

    #[error("{path}: endianness not specified, it can not be implicit and must be defined")]
    MissingEndianness { path: String },

    #[error("{path}: node `{kind}` is outside of any file scope")]
    NoFileScope { kind: &'static str, path: String },

    #[error("{path}: node `{kind}` can not be visited on its own")]
    UnexpectedNode { kind: &'static str, path: String },

    #[error("invalid target path `{}`", .0.display())]
    InvalidTarget(PathBuf),

    #[error("{path}: invalid value provided ({reason})")]
    InvalidValue { path: String, reason: String },

    #[error("{path}: I/O failure")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: stream closed but {needed} more bytes were still expected")]
    UnexpectedEof { path: String, needed: usize },

    #[error("{path}: stream already failed")]
    Poisoned { path: String },

    #[error("{path}: custom codec failed")]
    Custom {
        path: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MissingName { .. }
            | Error::MisplacedString { .. }
            | Error::InvalidPayload { .. }
            | Error::EmptySequence { .. }
            | Error::NestedFile { .. }
            | Error::MissingEndianness { .. }
            | Error::NoFileScope { .. }
            | Error::UnexpectedNode { .. }
            | Error::InvalidTarget(_) => ErrorCategory::Configuration,
            Error::InvalidValue { .. } => ErrorCategory::Value,
            Error::Io { .. } | Error::Poisoned { .. } => ErrorCategory::Io,
            Error::UnexpectedEof { .. } => ErrorCategory::UnexpectedEof,
            Error::Custom { .. } => ErrorCategory::Callback,
        }
    }

    pub(crate) fn invalid_value(path: &str, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Wraps a callback failure, unless the callback just passed one of ours along.
    pub(crate) fn from_callback(path: &str, source: BoxError) -> Self {
        match source.downcast::<Error>() {
            Ok(err) => *err,
            Err(source) => Error::Custom {
                path: path.to_string(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_errors_keep_their_category() {
        let inner: BoxError = Box::new(Error::UnexpectedEof {
            path: "a.bin/data".into(),
            needed: 4,
        });
        let err = Error::from_callback("a.bin/data", inner);
        assert_eq!(err.category(), ErrorCategory::UnexpectedEof);

        let foreign: BoxError = "bad payload".into();
        let err = Error::from_callback("a.bin/data", foreign);
        assert_eq!(err.category(), ErrorCategory::Callback);
        assert_eq!(err.to_string(), "a.bin/data: custom codec failed");
    }

    #[test]
    fn messages_are_path_qualified() {
        let err = Error::invalid_value("out.bin/version", "no value provided");
        assert_eq!(
            err.to_string(),
            "out.bin/version: invalid value provided (no value provided)"
        );
    }
}
