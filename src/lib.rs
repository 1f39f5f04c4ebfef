// Library exports for agora
// This allows integration tests and the binary to share the forum core

pub mod auth;
pub mod clock;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod extractors;
pub mod reactions;
pub mod routes;
pub mod state;
pub mod users;
