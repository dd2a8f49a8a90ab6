//! Inbound HTTP surface for the relay and the process that hosts the drain
//! worker next to it.

pub mod app;
pub mod auth;
pub mod config;
pub mod metrics;
