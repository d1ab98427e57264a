//! Common test utilities and helper modules
//!
//! This module provides shared functionality for all test files,
//! including mock streams and test data creation utilities.

#![allow(dead_code)]

pub mod test_data;
