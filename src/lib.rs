//! Frontgate: rendering cache and asset-delivery layer in front of a server-side renderer.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
