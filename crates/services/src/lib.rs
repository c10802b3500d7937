#![forbid(unsafe_code)]

pub mod engine;
pub mod error;

pub use study_core::Clock;

pub use engine::{
    DashboardSnapshot, Engine, EngineEvent, EngineOutcome, FamilyVersions, PlanReport,
    ReplanReason, Versioned,
};
pub use error::EngineError;
