//! Flutter-facing bindings for StudyNote core.

pub mod api;
