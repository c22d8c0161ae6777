//! `stellar-grids` library crate.
//!
//! Dartmouth stellar-evolution grids as interpolated models, and Bayesian
//! fitting of stellar parameters against them. The `starfit` binary is a thin
//! wrapper around this library.

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod grid;
pub mod interp;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod report;
