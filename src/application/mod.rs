//! Application services: use cases wired from repository traits, the
//! cache store, and the background job queue.

pub mod auth;
pub mod comments;
pub mod error;
pub mod favorites;
pub mod jobs;
pub mod notifications;
pub mod pagination;
pub mod posts;
pub mod repos;
pub mod taxonomy;
pub mod tokens;
pub mod users;
