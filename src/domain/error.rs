//! Error types for the label codec, data pipeline and metric engine.
//!
//! The application layer wraps these in `anyhow::Error`; the variants
//! stay typed so tests can match on them.

use thiserror::Error;

/// Errors raised while loading or applying the label mapping.
#[derive(Debug, Error)]
pub enum LabelError {
    /// A label string is not part of the mapping.
    #[error("Unknown label '{0}': not present in the label mapping")]
    UnknownLabel(String),

    /// An index is outside `0..len`.
    #[error("Label index {index} out of range (mapping has {len} labels)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Two labels share the same index, or indices are not dense.
    #[error("Invalid label mapping: {0}")]
    InvalidMapping(String),

    #[error("Cannot read label mapping '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse label mapping '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while reading, splitting or tokenising relation data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in '{path}' line {line}: {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// An entity column could not be parsed.
    #[error("Malformed entity '{raw}': {reason}")]
    MalformedEntity { raw: String, reason: String },

    /// The stratified split cannot be built for this label distribution.
    #[error("Cannot split dataset: {0}")]
    Split(String),

    /// Features and labels have different lengths.
    #[error("Length mismatch: {features} features vs {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    /// Tokenizer is missing a required special token or failed to encode.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

/// Errors raised while resolving a data pipeline by name.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown data module '{name}' (registered: {known})")]
    UnknownModule { name: String, known: String },

    #[error("Data module '{module}' has no {kind} named '{name}'")]
    UnknownFunction {
        module: String,
        kind: &'static str,
        name: String,
    },
}

/// Errors raised by the metric engine on malformed inputs.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Length mismatch: {predictions} predictions vs {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },

    #[error("Score matrix has {len} values, not a multiple of {num_classes} classes")]
    RaggedScores { len: usize, num_classes: usize },

    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),
}
