//! Service runtime: configuration, serving, discovery and lifecycle.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration and the [`config::ConfigProvider`] seam.
//! - [`protocol`] - HTTP and gRPC server plans.
//! - [`discovery`] - Consul and Eureka registration.
//! - [`runtime`] - bootstrap, serve, drain and reload.
//! - [`view`] - what route factories see of the configuration.
//! - [`telemetry`] - logging setup and the lifecycle log sink.
//! - [`error`] - the crate's error type.

pub mod config;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod telemetry;
pub mod view;
