//! `supplysight-core`: identifiers and error primitives shared by the analytics crates.
//!
//! This crate contains no I/O and no statistics; it only names things.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{AnomalyId, ItemId, OrganizationId, SupplierId};
