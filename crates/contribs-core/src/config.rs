//! Execution configuration shared by the strategies.

/// Capacity of the bounded fan-in hand-off queue.
pub const HANDOFF_CAPACITY: usize = 1;

/// Default buffer between producers and the consumer of buffered streaming.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Environment variable overriding [`ExecutionConfig::stream_buffer`].
pub const STREAM_BUFFER_ENV: &str = "CONTRIBS_STREAM_BUFFER";

/// Tunables for the execution strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Results buffered between fetch completion and the merge stage of
    /// buffered streaming. Always at least 1.
    pub stream_buffer: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl ExecutionConfig {
    /// Read overrides from the environment.
    ///
    /// Reads:
    /// - CONTRIBS_STREAM_BUFFER (optional, default: 64)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let config = Self::default();
        let Some(raw) = lookup(STREAM_BUFFER_ENV) else {
            return config;
        };
        match raw.trim().parse::<usize>() {
            Ok(size) => config.with_stream_buffer(size),
            Err(_) => {
                tracing::warn!(value = %raw, "ignoring invalid {STREAM_BUFFER_ENV}");
                config
            }
        }
    }

    /// Set the buffered-streaming capacity; zero is raised to one.
    pub fn with_stream_buffer(mut self, size: usize) -> Self {
        self.stream_buffer = size.max(1);
        self
    }
}
