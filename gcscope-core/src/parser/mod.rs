//! Parser trait abstraction
//!
//! Every log generation/collector combination has a parser implementing
//! [`GcLogParser`]. Parsers are line-oriented state machines that feed a
//! [`ModelBuilder`]; they never fail on individual lines.
//!
//! ## Design Principles
//!
//! 1. **Resilience**: a line matching no grammar is counted and skipped
//! 2. **Unknown over wrong**: a field that cannot be read stays `None`
//! 3. **One fatal case**: only an unrecognizable log is rejected

pub mod detector;
pub mod grammar;
pub mod parsers;

use crate::error::{Error, Result};
use crate::model::{CollectorFamily, LogFormat, LogStyle, ModelBuilder};
use crate::vmoption::VmOptions;
use serde::Serialize;

/// Default number of non-empty lines examined when sniffing the format.
pub const DEFAULT_SNIFF_LINES: usize = 200;

/// Options for a single parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Collector family; sniffed when `None`
    pub family: Option<CollectorFamily>,
    /// Log generation; sniffed when `None`
    pub style: Option<LogStyle>,
    /// Caller-supplied VM options, merged over any found in the log
    pub vm_options: Option<String>,
    pub sniff_lines: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            family: None,
            style: None,
            vm_options: None,
            sniff_lines: DEFAULT_SNIFF_LINES,
        }
    }
}

impl ParseOptions {
    pub fn with_format(format: LogFormat) -> Self {
        Self {
            family: Some(format.family),
            style: Some(format.style),
            ..Self::default()
        }
    }
}

/// Line accounting for one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Non-empty lines seen
    pub lines: usize,
    /// Lines that contributed to the model
    pub recognized: usize,
    /// Known lines carrying nothing the model uses
    pub ignored: usize,
    /// Lines matching no grammar
    pub unrecognized: usize,
    /// Fields dropped to unknown because their value was impossible
    pub downgraded: usize,
}

impl ParseStats {
    pub fn absorb(&mut self, other: &ParseStats) {
        self.lines += other.lines;
        self.recognized += other.recognized;
        self.ignored += other.ignored;
        self.unrecognized += other.unrecognized;
        self.downgraded += other.downgraded;
    }
}

/// What a parser did with one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Recognized,
    Ignored,
    Unrecognized,
}

/// Trait implemented by every GC log parser.
pub trait GcLogParser: Send + Sync {
    /// Which format this parser handles
    fn format(&self) -> LogFormat;

    /// Feed every line of `text` into `builder`.
    ///
    /// Individual lines never fail: anything that cannot be read is
    /// counted in the builder's [`ParseStats`].
    fn parse_into(&self, text: &str, builder: &mut ModelBuilder);
}

/// Drive `handle` over each non-empty line, keeping the statistics.
/// Line numbers are 1-based.
pub(crate) fn scan_lines<F>(text: &str, builder: &mut ModelBuilder, mut handle: F)
where
    F: FnMut(&mut ModelBuilder, usize, &str) -> LineOutcome,
{
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        builder.stats_mut().lines += 1;
        match handle(builder, index + 1, line) {
            LineOutcome::Recognized => builder.stats_mut().recognized += 1,
            LineOutcome::Ignored => builder.stats_mut().ignored += 1,
            LineOutcome::Unrecognized => {
                builder.stats_mut().unrecognized += 1;
                tracing::debug!(line = index + 1, text = line, "unrecognized line");
            }
        }
    }
}

/// Parse a whole log into a builder, sniffing the format if needed.
pub fn parse(text: &str, options: &ParseOptions) -> Result<ModelBuilder> {
    let format = detector::resolve_format(text, options)?;
    let mut builder = parse_as(text, format, options)?;

    if builder.stats().recognized == 0 && builder.stats().lines > 0 {
        return Err(Error::MalformedInput {
            format: format.to_string(),
            message: format!(
                "none of {} lines matched a known {} line",
                builder.stats().lines,
                format
            ),
        });
    }

    tracing::info!(
        format = %format,
        events = builder.events().len(),
        lines = builder.stats().lines,
        unrecognized = builder.stats().unrecognized,
        "parsed log"
    );
    builder.sort_events();
    Ok(builder)
}

/// Parse text whose format is already known. Used for whole logs and for
/// individual line groups alike.
pub fn parse_as(text: &str, format: LogFormat, options: &ParseOptions) -> Result<ModelBuilder> {
    let parser = parsers::parser_for(format)?;
    let mut builder = ModelBuilder::new(format)?;
    if let Some(vm_options) = &options.vm_options {
        builder
            .vm_options_mut()
            .extend(VmOptions::parse(vm_options)?);
    }
    parser.parse_into(text, &mut builder);
    Ok(builder)
}
