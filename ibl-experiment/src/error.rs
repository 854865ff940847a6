use thiserror::Error;

/// Invalid task configuration. Fatal: surfaced when a trial is generated or a
/// config is validated, never defaulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("difficulty level {level} is outside the {table} table (len {len})")]
    LevelOutOfRange {
        level: usize,
        table: &'static str,
        len: usize,
    },
    #[error("{name} probability {value} is outside [0, 1]")]
    Probability { name: &'static str, value: f64 },
    #[error("{name} range [{min}, {max}] is empty or inverted")]
    Range {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be non-negative and finite, got {value}")]
    Negative { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityKind {
    /// A parallel array ran out before its timestamp array, or an index has
    /// no backing entity.
    Overrun,
    /// A timestamp smaller than the one before it.
    NonMonotonic,
}

/// Corrupt or truncated replay data. Local to one stream: the stream stops
/// dispatching, the rest of the session carries on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{channel}: {kind:?} at index {index}")]
pub struct DataIntegrityError {
    pub channel: String,
    pub kind: IntegrityKind,
    pub index: usize,
}

impl DataIntegrityError {
    pub fn overrun(channel: impl Into<String>, index: usize) -> Self {
        Self {
            channel: channel.into(),
            kind: IntegrityKind::Overrun,
            index,
        }
    }

    pub fn non_monotonic(channel: impl Into<String>, index: usize) -> Self {
        Self {
            channel: channel.into(),
            kind: IntegrityKind::NonMonotonic,
            index,
        }
    }

    /// Same error reported against another channel name.
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("no session loaded")]
    NotLoaded,
    #[error("{0} is not supported by this task")]
    NotSupported(&'static str),
}
