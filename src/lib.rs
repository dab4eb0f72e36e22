// xPulse Trade Optimizer Library

#![allow(dead_code)]

pub mod adapters;
pub mod common;
pub mod config;
pub mod core;
pub mod errors;
pub mod mocks;

// Core types
pub mod constants;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use core::{OptimizerEngine, OptimizationCoordinator};
pub use errors::OptimizerError;

// Re-export common helpers
pub use common::math::*;
