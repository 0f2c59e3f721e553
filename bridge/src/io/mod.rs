//! Filesystem helpers.

pub mod config;
