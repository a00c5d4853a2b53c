//! An interactive command interpreter.
//!
//! A line goes through [`parser::parse`] into a [`types::Pipeline`], then
//! [`eval::eval`] either runs a built-in in-process or forks one process per
//! stage, wiring neighbours with pipes and applying `<`/`>` redirections in the
//! children. Background jobs are kept by [`job::JobTracker`], which reaps them
//! from the read loop after SIGCHLD.

pub mod builtin;
pub mod config;
pub mod eval;
pub mod global;
pub mod job;
pub mod logging;
pub mod parser;
pub mod redirect;
pub mod types;
