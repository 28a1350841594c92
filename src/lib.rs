pub mod api;
pub mod banking;
pub mod config;
pub mod domain;
pub mod error;
pub mod notifications;
pub mod payments;
pub mod repository;
pub mod service;

#[cfg(feature = "test-utils")]
pub mod testing;
