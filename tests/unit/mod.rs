//! Unit tests for individual components

pub mod messages;
