//! Composable authentication and authorization guard for service endpoints.
//!
//! A guarded call runs through a [`pipeline::Pipeline`] of interceptors: token
//! verification ([`middleware::AuthnInterceptor`]) followed by policy
//! authorization ([`middleware::AuthzInterceptor`]), evaluated either
//! in-process or by a remote decision service. The axum binary in `main.rs`
//! is one transport for it; the pipeline itself never sees HTTP types.

pub mod api;
pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod services;
pub mod state;
