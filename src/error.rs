//! Engine Errors
//!
//! One taxonomy for every per-record and dataset failure the engine can raise.
//! Loaders that touch the filesystem wrap these in `anyhow` at the edge.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::factors::Method;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no emission factor for {category_id}/{subcategory_id} using method {method}")]
    FactorNotFound {
        category_id: String,
        subcategory_id: String,
        method: String,
    },

    #[error("unit mismatch: activity is in {from}, factor expects {to}")]
    UnitMismatch { from: String, to: String },

    #[error("unsupported unit conversion from '{from}' to '{to}'")]
    UnsupportedUnit { from: String, to: String },

    #[error("method {method} is not available for {category_id}/{subcategory_id}")]
    MethodUnavailable {
        category_id: String,
        subcategory_id: String,
        method: Method,
    },

    #[error("calculation failed for record '{record_id}': {reason}")]
    Calculation { record_id: String, reason: String },

    #[error("invalid activity record '{record_id}': {reason}")]
    InvalidActivity { record_id: String, reason: String },

    #[error("invalid uncertainty contribution '{component}': {reason}")]
    InvalidContribution { component: String, reason: String },

    #[error("invalid factor registry: {0}")]
    Registry(String),

    #[error("invalid engine configuration: {0}")]
    Config(String),
}

/// Closed classification of [`EngineError`], stable across serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FactorNotFound,
    UnitMismatch,
    UnsupportedUnit,
    MethodUnavailable,
    Calculation,
    InvalidActivity,
    InvalidContribution,
    Registry,
    Config,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::FactorNotFound { .. } => ErrorKind::FactorNotFound,
            EngineError::UnitMismatch { .. } => ErrorKind::UnitMismatch,
            EngineError::UnsupportedUnit { .. } => ErrorKind::UnsupportedUnit,
            EngineError::MethodUnavailable { .. } => ErrorKind::MethodUnavailable,
            EngineError::Calculation { .. } => ErrorKind::Calculation,
            EngineError::InvalidActivity { .. } => ErrorKind::InvalidActivity,
            EngineError::InvalidContribution { .. } => ErrorKind::InvalidContribution,
            EngineError::Registry(_) => ErrorKind::Registry,
            EngineError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_unit_error(&self) -> bool {
        matches!(self, EngineError::UnitMismatch { .. } | EngineError::UnsupportedUnit { .. })
    }

    pub(crate) fn unsupported_unit(from: impl Into<String>, to: impl Into<String>) -> Self {
        EngineError::UnsupportedUnit {
            from: from.into(),
            to: to.into(),
        }
    }
}
