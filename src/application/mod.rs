//! Application services: rendering, page dispatch, themes and admin operations.

pub mod admin;
pub mod document;
pub mod error;
pub mod pages;
pub mod render;
pub mod settings;
pub mod themes;
