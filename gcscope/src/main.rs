//! gcscope - analyze JVM garbage collection logs
//!
//! Parses a GC log, derives the event model and prints a summary, the
//! event list, metric samples or diagnoses.

use anyhow::{Context, Result};
use clap::Parser;
use gcscope_core::analytics::stats::TimeRange;
use gcscope_core::analytics::{create_default_diagnoser, list_metrics, Diagnosis};
use gcscope_core::format::{format_bytes, format_ms, format_ms_opt, format_percent, format_uptime};
use gcscope_core::{fragment, CollectorFamily, Config, GcModel, LogStyle, ParseOptions};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gcscope")]
#[command(about = "Analyze JVM garbage collection logs")]
#[command(version)]
struct Args {
    /// GC log file to analyze
    #[arg(required_unless_present_any = ["list_rules", "list_metrics"])]
    file: Option<PathBuf>,

    /// Collector family (serial, parallel, cms, g1, zgc); sniffed if omitted
    #[arg(short, long)]
    collector: Option<CollectorFamily>,

    /// Log style (legacy, unified); sniffed if omitted
    #[arg(short, long)]
    style: Option<LogStyle>,

    /// Extra VM options, e.g. "-XX:MaxMetaspaceSize=256m -XX:+UseG1GC"
    #[arg(long, allow_hyphen_values = true)]
    vm_options: Option<String>,

    /// Parse line groups in parallel
    #[arg(long)]
    fragmented: bool,

    /// Worker count for --fragmented (defaults to config)
    #[arg(long)]
    workers: Option<usize>,

    /// Only consider events starting at or after this uptime (seconds)
    #[arg(long)]
    from: Option<f64>,

    /// Only consider events starting at or before this uptime (seconds)
    #[arg(long)]
    to: Option<f64>,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// List every event and phase
    #[arg(short, long)]
    events: bool,

    /// Run the diagnosis rules
    #[arg(short, long)]
    diagnose: bool,

    /// Emit metric samples
    #[arg(short, long)]
    metrics: bool,

    /// List available diagnosis rules without analyzing
    #[arg(long)]
    list_rules: bool,

    /// List available metrics without analyzing
    #[arg(long)]
    list_metrics: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        gcscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("gcscope starting");

    if args.format != "text" && args.format != "json" {
        anyhow::bail!("unknown output format '{}', expected text or json", args.format);
    }

    let diagnoser = create_default_diagnoser(config.diagnoser.clone());

    // List modes
    if args.list_rules {
        println!("Available rules:");
        for name in diagnoser.rule_names() {
            println!("  - {}", name);
        }
        return Ok(());
    }
    if args.list_metrics {
        println!("Available metrics:");
        for metric in list_metrics() {
            println!("  - {} [{}]: {}", metric.name, metric.labels.join(", "), metric.summary);
        }
        return Ok(());
    }

    let Some(path) = args.file.as_ref() else {
        anyhow::bail!("no log file given");
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let options = ParseOptions {
        family: args.collector,
        style: args.style,
        vm_options: args.vm_options.clone(),
        sniff_lines: config.parser.sniff_lines,
    };

    tracing::info!(path = %path.display(), bytes = text.len(), "Analyzing log");
    let model = if args.fragmented {
        let workers = args.workers.unwrap_or(config.fragment.workers);
        fragment::analyze_fragmented(&text, &options, workers)
    } else {
        gcscope_core::analyze(&text, &options)
    }
    .with_context(|| format!("failed to analyze {}", path.display()))?;

    tracing::info!(
        collector = %model.format(),
        events = model.events().len(),
        "Analysis complete"
    );

    let range = requested_range(&args, &model);
    let diagnoses = if args.diagnose {
        diagnoser.run(&model)
    } else {
        Vec::new()
    };

    if args.format == "json" {
        print_json(&args, &model, range, &diagnoses)
    } else {
        print_text(&args, &model, range, &diagnoses);
        Ok(())
    }
}

fn requested_range(args: &Args, model: &GcModel) -> TimeRange {
    let full = model.time_range();
    TimeRange::new(
        args.from.map_or(full.start, |s| s * 1000.0),
        args.to.map_or(full.end, |s| s * 1000.0),
    )
}

fn print_json(
    args: &Args,
    model: &GcModel,
    range: TimeRange,
    diagnoses: &[Diagnosis],
) -> Result<()> {
    let mut report = json!({
        "metadata": model.metadata(),
        "parse_stats": model.parse_stats(),
        "range": range,
        "pauses": model.pause_statistics(range),
        "phases": model.phase_statistics(range),
        "memory": model.memory_statistics(range),
        "objects": model.object_statistics(range),
        "overview": model.overview(),
    });
    if args.events {
        report["events"] = serde_json::to_value(model.events())?;
        report["safepoints"] = serde_json::to_value(model.safepoints())?;
        report["stalls"] = serde_json::to_value(model.stalls())?;
    }
    if args.metrics {
        report["metrics"] = serde_json::to_value(model.metrics(range))?;
    }
    if args.diagnose {
        report["diagnoses"] = serde_json::to_value(diagnoses)?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_text(args: &Args, model: &GcModel, range: TimeRange, diagnoses: &[Diagnosis]) {
    let metadata = model.metadata();
    println!("Collector: {} ({})", metadata.collector, metadata.style);
    println!(
        "Time range: {} - {}",
        format_uptime(range.start),
        format_uptime(range.end)
    );
    println!(
        "Events: {} ({} phases, {} safepoints, {} stalls)",
        metadata.event_count, metadata.phase_count, metadata.safepoint_count, metadata.stall_count
    );
    if let Some(threads) = metadata.parallel_threads {
        println!("Parallel threads: {}", threads);
    }
    if let Some(threads) = metadata.concurrent_threads {
        println!("Concurrent threads: {}", threads);
    }
    if let Some(bytes) = metadata.region_size {
        println!("Region size: {}", format_bytes(bytes));
    }
    let stats = model.parse_stats();
    if stats.unrecognized > 0 {
        println!(
            "Unrecognized lines: {} of {}",
            stats.unrecognized, stats.lines
        );
    }

    println!();
    match model.pause_statistics(range) {
        Some(pauses) => {
            println!("Pauses: {}", pauses.count);
            println!("  Total:      {}", format_ms(pauses.total));
            println!("  Mean:       {}", format_ms(pauses.mean));
            println!("  Median:     {}", format_ms(pauses.median));
            println!("  P99:        {}", format_ms(pauses.p99));
            println!("  Max:        {}", format_ms(pauses.max));
            println!("  Pause time: {}", format_percent(pauses.pause_percent));
            println!("  Throughput: {}", format_percent(pauses.throughput));
        }
        None => println!("Pauses: none"),
    }

    let objects = model.object_statistics(range);
    if let Some(total) = objects.allocation_total {
        println!("Allocated: {}", format_bytes(total));
    }
    if let Some(total) = objects.promotion_total {
        println!("Promoted: {}", format_bytes(total));
    }

    let overview = model.overview();
    if !overview.causes.is_empty() {
        println!("\nCauses:");
        for (cause, count) in &overview.causes {
            println!("  {:<40} {}", cause.as_str(), count);
        }
    }

    let phases = model.phase_statistics(range);
    if !phases.is_empty() {
        println!("\nPhases:");
        for parent in &phases {
            println!(
                "  {} x{} avg {}",
                parent.parent,
                parent.duration.count,
                format_ms_opt(parent.duration.average)
            );
            for phase in &parent.phases {
                println!(
                    "    {:<36} x{} avg {} max {}",
                    phase.kind.name(),
                    phase.duration.count,
                    format_ms_opt(phase.duration.average),
                    format_ms_opt(phase.duration.max)
                );
            }
        }
    }

    if args.events {
        println!("\nEvents:");
        for (r, event) in model.iter_all() {
            if !range.contains(event.start) {
                continue;
            }
            let indent = if r.is_phase() { "    " } else { "  " };
            println!("{}{}", indent, event.text);
        }
        for event in model.safepoints().iter().chain(model.stalls()) {
            if range.contains(event.start) {
                println!("  {}", event.text);
            }
        }
    }

    if args.metrics {
        println!("\nMetrics:");
        for sample in model.metrics(range) {
            let labels: Vec<String> = sample
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect();
            println!(
                "  {}{{{}}} {} {}",
                sample.name,
                labels.join(","),
                sample.uptime,
                sample.value
            );
        }
    }

    if args.diagnose {
        println!();
        if diagnoses.is_empty() {
            println!("No problems found.");
        }
        for diagnosis in diagnoses {
            println!(
                "[{}] {}: {}",
                diagnosis.severity.as_str(),
                diagnosis.rule,
                diagnosis.problem
            );
            if let Some(first) = diagnosis.first_event {
                println!(
                    "  first at {}, {} occurrence(s)",
                    format_uptime(first),
                    diagnosis.occurrences
                );
            }
            for suggestion in &diagnosis.suggestions {
                println!("  - {}", suggestion);
            }
        }
    }
}
