//! # CLI Command Implementations
//!
//! Each subcommand of `datavol` lives in its own file with:
//! - an `Args` struct derived with `clap`;
//! - an `execute` function that builds a [`datavol::manager::DataManager`]
//!   from the loaded settings and calls into the library.
//!
//! Commands return the process exit status so `exists` can report absence
//! without treating it as an error.

pub mod completions;
pub mod exec;
pub mod exists;
pub mod export;
pub mod import;
