//! atelier console client.
//!
//! This crate drives the atelier session lifecycle from a terminal against a
//! remote OAuth2 authorization server.

pub mod config;
pub mod navigator;
pub mod provider;
