//! Script session engine for a categorized PowerShell script library.
//!
//! A script declares its parameters in a leading metadata block; the engine
//! parses that block into typed argument definitions, validates user input
//! against them, runs the script through `pwsh` with live output, error,
//! and progress streaming, and supports cooperative cancellation. The
//! [`controller::SessionController`] is the usual entry point.

pub mod argument;
pub mod cli;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod errorlog;
pub mod library;
pub mod session;
pub mod store;
