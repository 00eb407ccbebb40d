//! # xc_app
//!
//! Command-line glue for the exchange client

pub mod cli;
pub mod tracing_setup;
