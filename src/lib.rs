//! Parses the OpenGL XML API registry and generates a lazily loading C++
//! binding library: per-version header/source pairs that declare every api
//! entry point and resolve it through a platform function-pointer resolver
//! at run time, plus consumer-facing headers that pull in everything up to a
//! chosen version.
//!
//! The entry points are [parse::parse_file] (or [parse::parse_stream]),
//! which turn one registry document into a [types::Registry] plus any
//! ownership diagnostics, and [generate::generate], which renders the
//! registry according to a [config::Config].

#[macro_use]
mod util;

pub mod clean;
pub mod config;
pub mod fetch;
pub mod generate;
pub mod parse;
pub mod types;
pub mod widths;

pub use config::Config;
pub use parse::{parse_file, parse_stream};
pub use types::{Diagnostic, FatalError, Registry};
