pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repository;
pub mod routes;
mod shutdown;
pub mod state;
mod tracing;
