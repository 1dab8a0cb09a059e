//! # Handlers
//!
//! Thin translation between HTTP and the engine. No rules live here.

pub mod images;
pub mod moderation;
pub mod potholes;
pub mod reports;
