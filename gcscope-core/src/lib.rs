//! # gcscope-core
//!
//! Core library for gcscope - a JVM garbage collection log analyzer.
//!
//! This library provides:
//! - Format detection and parsers for Serial, Parallel, CMS, G1 and ZGC logs
//!   in both the legacy and the unified logging styles
//! - An immutable event model with derived pauses, intervals and memory
//! - Statistics, metric samples and rule-based diagnosis
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Parse:** log lines become raw events in a [`ModelBuilder`]
//! - **Derive:** the [`pipeline`] repairs, links and aggregates them into a [`GcModel`]
//! - **Analyze:** [`analytics`] queries the finished model
//!
//! ## Example
//!
//! ```rust,no_run
//! use gcscope_core::{analyze, Config, ParseOptions};
//!
//! let config = Config::load().expect("failed to load config");
//! let text = std::fs::read_to_string("gc.log").expect("failed to read log");
//!
//! let model = analyze(&text, &ParseOptions::default()).expect("failed to analyze");
//! let pauses = model.pause_statistics(model.time_range());
//! let diagnoses = gcscope_core::analytics::create_default_diagnoser(config.diagnoser).run(&model);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use model::{
    CollectorFamily, EventKind, EventRef, GcCause, GcEvent, GcModel, Generation, LogFormat,
    LogStyle, ModelBuilder,
};
pub use parser::{ParseOptions, ParseStats};
pub use vmoption::VmOptions;

// Public modules
pub mod analytics;
pub mod config;
pub mod error;
pub mod format;
pub mod fragment;
pub mod logging;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod vmoption;

/// Parse a whole log and derive its model.
pub fn analyze(text: &str, options: &ParseOptions) -> Result<GcModel> {
    let builder = parser::parse(text, options)?;
    pipeline::run(builder)
}
