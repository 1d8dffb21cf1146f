//! Fragmented mode
//!
//! Analyzes a log delivered as an unordered bag of line groups. Each group
//! holds the lines of one event in their original order; groups arrive in
//! any order. Every group is parsed on its own into a partial builder, the
//! partial builders are merged, and the merged builder goes through the
//! same pipeline as a sequential parse.
//!
//! ## Architecture
//!
//! ```text
//! groups ──round robin──▶ worker 1 ─┐
//!                         worker 2 ─┼─▶ sync_channel ─▶ merge ─▶ pipeline
//!                         worker N ─┘
//! ```

use crate::error::Result;
use crate::model::{GcEvent, GcModel, LogFormat, LogStyle, ModelBuilder};
use crate::parser::{self, detector, grammar, ParseOptions};
use crate::pipeline;
use std::collections::HashMap;
use std::sync::mpsc;

/// Lines that belong together, each with its 1-based line number in the
/// original log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineGroup {
    pub lines: Vec<(usize, String)>,
}

impl LineGroup {
    pub fn push(&mut self, line_no: usize, line: &str) {
        self.lines.push((line_no, line.to_string()));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The group's lines joined as log text.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for (_, line) in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Original line number of the group's `n`th line (1-based).
    fn original_line(&self, n: usize) -> Option<usize> {
        n.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(|(line_no, _)| *line_no)
    }
}

/// Split an ordered log into line groups.
///
/// Unified logs group by `GC(n)` id; consecutive lines without an id form
/// their own group. Legacy logs start a group at each collection line,
/// send concurrent cycle lines to the group of the open cycle, and append
/// any other line to the group touched last.
pub fn split_groups(text: &str, format: LogFormat) -> Vec<LineGroup> {
    let lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, line));
    match format.style {
        LogStyle::Unified => split_unified(lines),
        LogStyle::Legacy => split_legacy(lines),
    }
}

fn split_unified<'a>(lines: impl Iterator<Item = (usize, &'a str)>) -> Vec<LineGroup> {
    let mut groups: Vec<LineGroup> = Vec::new();
    let mut by_id: HashMap<u64, usize> = HashMap::new();
    let mut loose: Option<usize> = None;

    for (line_no, line) in lines {
        let index = match grammar::unified_gc_id(line) {
            Some(id) => {
                loose = None;
                *by_id.entry(id).or_insert_with(|| open(&mut groups))
            }
            None => *loose.get_or_insert_with(|| open(&mut groups)),
        };
        groups[index].push(line_no, line);
    }
    groups
}

/// How a legacy line relates to the groups around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyRole {
    /// Starts a stop-the-world collection
    Collection,
    /// Starts a concurrent cycle
    CycleOpen,
    /// Belongs to the open concurrent cycle
    Cycle,
    /// Last line of the open concurrent cycle
    CycleClose,
    /// Belongs with whatever came just before
    Continuation,
}

fn legacy_role(rest: &str) -> LegacyRole {
    let rest = rest.trim();
    if rest.contains("CMS-initial-mark")
        || rest.starts_with("[GC concurrent-root-region-scan-start")
    {
        LegacyRole::CycleOpen
    } else if rest.starts_with("[CMS-concurrent-reset:")
        || rest.starts_with("[GC concurrent-cleanup-end")
        || rest.starts_with("[GC concurrent-mark-abort")
    {
        LegacyRole::CycleClose
    } else if rest.starts_with("[CMS-concurrent-")
        || rest.starts_with("CMS: abort preclean")
        || rest.starts_with("[GC concurrent-")
        || rest.starts_with("[GC remark")
        || rest.starts_with("[GC cleanup")
        || (rest.starts_with("[GC")
            && (rest.contains("CMS-remark") || rest.contains("CMS Final Remark")))
    {
        LegacyRole::Cycle
    } else if rest.starts_with("[GC") || rest.starts_with("[Full GC") {
        LegacyRole::Collection
    } else {
        LegacyRole::Continuation
    }
}

fn open(groups: &mut Vec<LineGroup>) -> usize {
    groups.push(LineGroup::default());
    groups.len() - 1
}

fn split_legacy<'a>(lines: impl Iterator<Item = (usize, &'a str)>) -> Vec<LineGroup> {
    let mut groups: Vec<LineGroup> = Vec::new();
    let mut cycle: Option<usize> = None;
    let mut touched: Option<usize> = None;

    for (line_no, line) in lines {
        let role = legacy_role(grammar::legacy_line(line).rest);
        let index = match role {
            LegacyRole::Collection => open(&mut groups),
            LegacyRole::CycleOpen => {
                let index = open(&mut groups);
                cycle = Some(index);
                index
            }
            LegacyRole::Cycle | LegacyRole::CycleClose => match cycle {
                Some(index) => index,
                None => {
                    let index = open(&mut groups);
                    cycle = Some(index);
                    index
                }
            },
            LegacyRole::Continuation => match touched {
                Some(index) => index,
                None => open(&mut groups),
            },
        };
        if role == LegacyRole::CycleClose {
            cycle = None;
        }
        groups[index].push(line_no, line);
        touched = Some(index);
    }
    groups
}

fn renumber(event: &mut GcEvent, group: &LineGroup) {
    event.line = event.line.and_then(|n| group.original_line(n));
    for phase in &mut event.phases {
        renumber(phase, group);
    }
}

/// Parse one group into a partial builder whose line numbers refer to the
/// original log.
pub fn parse_group(
    group: &LineGroup,
    format: LogFormat,
    options: &ParseOptions,
) -> Result<ModelBuilder> {
    let mut builder = parser::parse_as(&group.text(), format, options)?;
    for event in builder
        .events
        .iter_mut()
        .chain(builder.safepoints.iter_mut())
        .chain(builder.stalls.iter_mut())
    {
        renumber(event, group);
    }
    Ok(builder)
}

/// Parse groups in parallel, merge the partial builders and run the
/// pipeline.
///
/// Groups are dealt round robin to at most `workers` scoped threads.
/// Partial builders travel back over a bounded channel; the merge and the
/// pipeline run on the calling thread once every group is parsed.
pub fn analyze_fragments(
    groups: Vec<LineGroup>,
    format: LogFormat,
    options: &ParseOptions,
    workers: usize,
) -> Result<GcModel> {
    let group_count = groups.len();
    let workers = workers.clamp(1, group_count.max(1));
    let mut buckets: Vec<Vec<LineGroup>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, group) in groups.into_iter().enumerate() {
        buckets[i % workers].push(group);
    }

    let results: Vec<Result<ModelBuilder>> = std::thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel(workers);
        for bucket in buckets {
            let tx = tx.clone();
            scope.spawn(move || {
                for group in &bucket {
                    if tx.send(parse_group(group, format, options)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(tx);
        rx.into_iter().collect()
    });
    let parts = results.into_iter().collect::<Result<Vec<_>>>()?;

    tracing::info!(groups = group_count, workers, "parsed line groups");
    let merged = ModelBuilder::merge(format, parts)?;
    pipeline::run(merged)
}

/// Split `text` with [`split_groups`] and analyze the groups.
pub fn analyze_fragmented(text: &str, options: &ParseOptions, workers: usize) -> Result<GcModel> {
    let format = detector::resolve_format(text, options)?;
    analyze_fragments(split_groups(text, format), format, options, workers)
}
