//! MCP tool inputs for Lookout.
//!
//! This module contains the parameter types of the MCP tools that expose
//! Help Scout operations.

mod inputs;

pub use inputs::*;
