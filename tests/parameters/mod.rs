//! Integration tests for the parameter system
//!
//! These tests verify that the parameter system behaves correctly in various scenarios.

// Tests for the Parameter struct and its initializers
mod parameter_tests;

// Tests for the Expression parsing and evaluation
mod expression_tests;

// Tests for dependency resolution
mod resolver_tests;
