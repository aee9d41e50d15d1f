//! Cloud posture evidence ledger.
//!
//! This crate provides:
//! - Resource inventory and posture collection (`inventory`, `collector`)
//! - Rule-table mapping of posture facts to framework controls (`controls`)
//! - Canonical, content-hashed evidence records (`evidence`)
//! - Append-only blob + index storage (`store`)
//! - Listing and signed manifest export (`export`)
//! - Layered service configuration (`config`)

pub mod collector;
pub mod config;
pub mod controls;
pub mod error;
pub mod evidence;
pub mod export;
pub mod inventory;
pub mod store;

pub use error::{ComplianceError, ComplianceResult};
