//! Error type for the feature extractor

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the extractor module
pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Everything that can go wrong while building, running or persisting an extractor
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// A required configuration key is absent
    #[error("missing configuration key `{0}`")]
    MissingKey(String),

    /// A configuration key is present but has the wrong type or range
    #[error("invalid value for configuration key `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The configuration is well-formed but describes an unusable network
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The optimizer name is not one of the supported strategies
    #[error("unavailable optimizer selected: `{0}`")]
    UnknownOptimizer(String),

    /// `set_weights` received the wrong number of arrays
    #[error("expected {expected} weight arrays, got {actual}")]
    WeightCount { expected: usize, actual: usize },

    /// `set_weights` received an array of the wrong shape
    #[error("weight array {index} has shape {actual:?}, expected {expected:?}")]
    WeightShape {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// An input batch does not match `[batch, height, width, history_length]`
    #[error("input batch has shape {actual:?}, expected [batch, {height}, {width}, {channels}]")]
    InputShape {
        actual: [usize; 4],
        height: usize,
        width: usize,
        channels: usize,
    },

    /// A target batch does not match its input batch
    #[error("target batch has shape {target:?}, input batch has {input:?}")]
    TargetShape { input: [usize; 4], target: [usize; 4] },

    /// A persisted checkpoint does not describe the network rebuilt from its schema
    #[error("checkpoint at {path:?} does not match its schema: {reason}")]
    SchemaMismatch { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Burn's recorder failed to write or read a record
    #[error("record error at {path:?}: {reason}")]
    Record { path: PathBuf, reason: String },
}
