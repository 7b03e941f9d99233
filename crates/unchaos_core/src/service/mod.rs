//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the CLI decoupled from storage details.

pub mod capture;
pub mod location_service;
pub mod note_service;
pub mod queue_service;
