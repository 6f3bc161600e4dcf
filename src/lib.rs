//! Foglio blog platform backend.
//!
//! Layering, outermost first:
//!
//! - [`infra`]: HTTP surface, Postgres repositories, telemetry, file storage.
//! - [`application`]: services orchestrating domain rules over repository
//!   traits, plus the cache maintenance job queue.
//! - [`cache`]: key-value store abstraction and the post snapshot codec.
//! - [`domain`]: entities, enumerations, validation, and domain errors.
//! - [`config`]: layered settings (file, environment, CLI).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
