//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Enforce input policy and session capabilities before persistence.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod export_service;
pub mod note_service;
pub mod project_service;
pub mod task_service;
