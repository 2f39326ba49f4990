//! Data access for websites and their status history. Callers work with the
//! entity models and never build queries themselves.

pub mod website_service;

pub use website_service::*;
