//! Test suite for formstash
//!
//! This module organizes all tests

pub mod common;
pub mod integration;
