//! Risk Management Bounded Context
//!
//! Runtime-adjustable limits and the outcome types produced by risk checks.
//!
//! # Key Concepts
//!
//! - **Risk Settings**: The single active row of limits and control flags
//! - **Check Outcome**: Pass, or fail with a human-readable reason
//! - **Risk Verdict**: Result of a whole check chain for one order

pub mod value_objects;

pub use value_objects::{
    CheckOutcome, RiskSettings, RiskSettingsPatch, RiskVerdict, SettingsError,
};
