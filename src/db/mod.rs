//! Persistence for monitored websites and their incident history.

pub mod entities;
pub mod schema;
pub mod services;
pub mod store;
