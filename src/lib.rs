//! GHG Ledger
//!
//! Emissions quantification and uncertainty propagation for GHG Protocol
//! inventories:
//! - Versioned emission-factor registry with method fallback
//! - Unit normalization across mass, energy, volume, freight and currency
//! - GUM combination of uncertainties with Welch–Satterthwaite dof
//! - Scope 1/2/3 aggregation with an ordered audit trail
//! - Compliance scoring and ranked recommendations

pub mod activities;
pub mod compliance;
pub mod config;
pub mod engine;
pub mod error;
pub mod factors;
pub mod persistence;
pub mod report;
pub mod telemetry;
pub mod units;

// Re-exports for convenience
pub use compliance::{ComplianceScorer, RiskLevel, VerificationLevel};
pub use config::{ConfigLoader, EngineConfig};
pub use engine::{ActivityRecord, CalculationResult, Engine, EngineRun};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use factors::{FactorCatalog, FactorRegistry, Method, MethodUsed, Scope};
pub use report::ComplianceReport;
pub use units::Unit;
