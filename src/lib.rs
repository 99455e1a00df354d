//! Agile Planner: turns a structured backlog into a cross-linked tree of
//! markdown documents and serves that capability over MCP stdio.

pub mod backlog;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
