use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable error category reported alongside every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: unknown names, out-of-range values, malformed requests.
    Validation,
    /// Models or distributions that cannot be combined.
    Composition,
    /// Failures while the optimizer runs or while interpreting its output.
    Execution,
    /// Input data and workspace file problems.
    Io,
    /// Broken invariants inside the engine itself.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Composition => "composition",
            ErrorKind::Execution => "execution",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error types for the sasfit-rs library.
#[derive(Error, Debug)]
pub enum SasFitError {
    /// An override named a parameter the model does not declare.
    #[error("Unknown parameter '{name}' for model '{model}'")]
    UnknownParameter { model: String, name: String },

    /// A parameter value lies outside its bounds.
    #[error("Parameter '{name}' value {value} is outside bounds [{min}, {max}]")]
    OutOfBounds {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Bounds that cannot describe a valid parameter.
    #[error("Invalid bounds for parameter '{name}': {reason}")]
    InvalidBounds { name: String, reason: String },

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Unknown analysis '{0}'")]
    UnknownAnalysis(String),

    #[error("Unknown fitting engine '{0}'")]
    UnknownEngine(String),

    #[error("Engine '{engine}' does not provide method '{method}'")]
    UnknownMethod { engine: String, method: String },

    /// The request object itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Two models that cannot form a product.
    #[error("Incompatible models: {0}")]
    IncompatibleModels(String),

    /// A size distribution was requested for a parameter that does not allow one.
    #[error("Model '{model}' does not support polydispersity on parameter '{parameter}'")]
    UnsupportedPolydispersity { model: String, parameter: String },

    #[error("Invalid polydispersity settings for '{parameter}': {reason}")]
    InvalidPolydispersity { parameter: String, reason: String },

    /// The optimizer gave up or reported an internal failure.
    #[error("Optimizer failure: {0}")]
    OptimizerFailure(String),

    /// Model evaluation produced values the fit cannot use.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    #[error("Non-positive degrees of freedom: {points} points, {free} free parameters")]
    NonPositiveDof { points: usize, free: usize },

    /// Optimizer output that cannot be mapped onto a fit result.
    #[error("Unrecognized engine output: {0}")]
    AmbiguousOutput(String),

    #[error("Run exceeded the {limit:?} time limit")]
    Timeout { limit: Duration },

    #[error("Run was cancelled")]
    Cancelled,

    /// Matrix dimension mismatch inside the numerics.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Missing, ambiguous or unparsable input data.
    #[error("Data file error: {0}")]
    DataFile(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid run state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SasFitError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        use SasFitError::*;
        match self {
            UnknownParameter { .. }
            | OutOfBounds { .. }
            | InvalidBounds { .. }
            | UnknownModel(_)
            | UnknownAnalysis(_)
            | UnknownEngine(_)
            | UnknownMethod { .. }
            | InvalidRequest(_) => ErrorKind::Validation,
            IncompatibleModels(_)
            | UnsupportedPolydispersity { .. }
            | InvalidPolydispersity { .. } => ErrorKind::Composition,
            OptimizerFailure(_)
            | FunctionEvaluation(_)
            | NonPositiveDof { .. }
            | AmbiguousOutput(_)
            | Timeout { .. }
            | Cancelled
            | DimensionMismatch(_) => ErrorKind::Execution,
            DataFile(_) | IoError(_) | JsonError(_) => ErrorKind::Io,
            InvalidTransition { .. } | Config(_) => ErrorKind::Internal,
        }
    }

    /// Stable snake_case code identifying the variant.
    pub fn code(&self) -> &'static str {
        use SasFitError::*;
        match self {
            UnknownParameter { .. } => "unknown_parameter",
            OutOfBounds { .. } => "out_of_bounds",
            InvalidBounds { .. } => "invalid_bounds",
            UnknownModel(_) => "unknown_model",
            UnknownAnalysis(_) => "unknown_analysis",
            UnknownEngine(_) => "unknown_engine",
            UnknownMethod { .. } => "unknown_method",
            InvalidRequest(_) => "invalid_request",
            IncompatibleModels(_) => "incompatible_models",
            UnsupportedPolydispersity { .. } => "unsupported_polydispersity",
            InvalidPolydispersity { .. } => "invalid_polydispersity",
            OptimizerFailure(_) => "optimizer_failure",
            FunctionEvaluation(_) => "evaluation_failure",
            NonPositiveDof { .. } => "non_positive_dof",
            AmbiguousOutput(_) => "ambiguous_output",
            Timeout { .. } => "timeout",
            Cancelled => "cancelled",
            DimensionMismatch(_) => "dimension_mismatch",
            DataFile(_) => "data_file",
            IoError(_) => "io",
            JsonError(_) => "json",
            InvalidTransition { .. } => "invalid_transition",
            Config(_) => "config",
        }
    }
}

// Parameter-layer errors always describe a bad parameter definition.
impl From<crate::parameters::ParameterError> for SasFitError {
    fn from(err: crate::parameters::ParameterError) -> Self {
        use crate::parameters::ParameterError;
        match err {
            ParameterError::OutOfBounds {
                name,
                value,
                min,
                max,
            } => SasFitError::OutOfBounds {
                name,
                value,
                min,
                max,
            },
            ParameterError::InvalidBounds { name, reason } => {
                SasFitError::InvalidBounds { name, reason }
            }
            ParameterError::NonFinite { name, value } => SasFitError::OutOfBounds {
                name,
                value,
                min: f64::NEG_INFINITY,
                max: f64::INFINITY,
            },
        }
    }
}

/// Result type alias for sasfit-rs operations.
pub type Result<T> = std::result::Result<T, SasFitError>;
