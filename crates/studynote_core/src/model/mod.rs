//! Domain model for the notes and project schemas.
//!
//! # Responsibility
//! - Define canonical records used by repositories and services.
//! - Keep field validation close to the data it guards.
//!
//! # Invariants
//! - Every record is identified by a random UUID v4.
//! - Password material is only ever held as salted digests.

pub mod project;
pub mod subject;
