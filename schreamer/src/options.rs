use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::stream::{BoxSink, BoxSource};

pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2 * 1024;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;
/// Smallest buffer either engine runs with. Smaller requests are raised to it.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Opens the sink of a file scope, given its resolved path.
pub type SinkFactory = Arc<dyn Fn(&Path) -> BoxFuture<'static, io::Result<BoxSink>> + Send + Sync>;
/// Opens the source of a file scope, given its resolved path.
pub type SourceFactory =
    Arc<dyn Fn(&Path) -> BoxFuture<'static, io::Result<BoxSource>> + Send + Sync>;

#[derive(Clone)]
pub struct WriterOptions {
    /// Base directory of the pass. For a schema without any `file` node, the
    /// path of the single output file.
    pub path: PathBuf,
    /// Capacity of the write buffer of each file scope.
    pub write_buffer_size: usize,
    /// Replaces file creation. Parent directories are not created either.
    pub create_writable_stream: Option<SinkFactory>,
    /// Emits a `debug` event for every field written.
    pub debug: bool,
    /// Handed to every callback of the pass.
    pub user_context: Value,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            create_writable_stream: None,
            debug: false,
            user_context: Value::Null,
        }
    }
}

impl WriterOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_sink<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&Path) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<BoxSink>> + Send + 'static,
    {
        let factory: SinkFactory = Arc::new(move |path: &Path| f(path).boxed());
        self.create_writable_stream = Some(factory);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_user_context(mut self, user: impl Into<Value>) -> Self {
        self.user_context = user.into();
        self
    }

    pub(crate) fn clamped(mut self) -> Self {
        self.write_buffer_size = clamp("write", self.write_buffer_size);
        self
    }
}

impl fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterOptions")
            .field("path", &self.path)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("create_writable_stream", &self.create_writable_stream.is_some())
            .field("debug", &self.debug)
            .field("user_context", &self.user_context)
            .finish()
    }
}

#[derive(Clone)]
pub struct ReaderOptions {
    /// Base directory of the pass. For a schema without any `file` node, the
    /// path of the single input file.
    pub path: PathBuf,
    /// Most bytes requested from a source at once.
    pub read_buffer_size: usize,
    /// Replaces opening files.
    pub create_readable_stream: Option<SourceFactory>,
    /// Emits a `debug` event for every field read.
    pub debug: bool,
    /// Handed to every callback of the pass.
    pub user_context: Value,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            create_readable_stream: None,
            debug: false,
            user_context: Value::Null,
        }
    }
}

impl ReaderOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_source<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&Path) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<BoxSource>> + Send + 'static,
    {
        let factory: SourceFactory = Arc::new(move |path: &Path| f(path).boxed());
        self.create_readable_stream = Some(factory);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_user_context(mut self, user: impl Into<Value>) -> Self {
        self.user_context = user.into();
        self
    }

    pub(crate) fn clamped(mut self) -> Self {
        self.read_buffer_size = clamp("read", self.read_buffer_size);
        self
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("path", &self.path)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("create_readable_stream", &self.create_readable_stream.is_some())
            .field("debug", &self.debug)
            .field("user_context", &self.user_context)
            .finish()
    }
}

fn clamp(side: &str, size: usize) -> usize {
    if size < MIN_BUFFER_SIZE {
        tracing::warn!(
            requested = size,
            minimum = MIN_BUFFER_SIZE,
            "{} buffer size raised to the minimum",
            side
        );
        return MIN_BUFFER_SIZE;
    }
    size
}

macro_rules! options_from_path {
    ($options:ty) => {
        impl From<&str> for $options {
            fn from(path: &str) -> Self {
                <$options>::new(path)
            }
        }

        impl From<String> for $options {
            fn from(path: String) -> Self {
                <$options>::new(path)
            }
        }

        impl From<&Path> for $options {
            fn from(path: &Path) -> Self {
                <$options>::new(path)
            }
        }

        impl From<PathBuf> for $options {
            fn from(path: PathBuf) -> Self {
                <$options>::new(path)
            }
        }
    };
}

options_from_path!(WriterOptions);
options_from_path!(ReaderOptions);
