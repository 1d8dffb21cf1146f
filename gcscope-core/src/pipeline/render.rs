//! One-line text rendering of an event.
//!
//! The rendering is built from the finished event's fields only, so
//! rendering the same event again always gives the same text.

use crate::format::{
    format_bytes, format_bytes_opt, format_ms, format_ms_opt, format_timestamp, format_uptime,
};
use crate::model::{GcEvent, Generation, Level, MemoryItem, PauseClass};
use std::fmt::Write;

const GENERATION_ORDER: &[Generation] = &[
    Generation::Young,
    Generation::Eden,
    Generation::Survivor,
    Generation::Old,
    Generation::Humongous,
    Generation::Archive,
    Generation::Total,
    Generation::Metaspace,
];

fn memory_item(out: &mut String, item: &MemoryItem) {
    let _ = write!(
        out,
        " {}: {}->{}",
        item.generation,
        format_bytes_opt(item.pre_used),
        format_bytes_opt(item.post_used)
    );
    if let Some(capacity) = item.post_capacity {
        let _ = write!(out, "({})", format_bytes(capacity));
    }
}

pub fn render(event: &GcEvent) -> String {
    let mut out = String::new();
    if let Some(id) = event.id {
        let _ = write!(out, "GC({id}) ");
    }
    match event.timestamp {
        Some(ts) => out.push_str(&format_timestamp(ts)),
        None => out.push_str(&format_uptime(event.start)),
    }
    let _ = write!(out, " {}", event.kind);
    if let Some(cause) = &event.cause {
        let _ = write!(out, " ({cause})");
    }
    for situation in &event.special_situations {
        let _ = write!(out, " [{}]", situation.name());
    }
    let _ = write!(out, " {}", format_ms_opt(event.duration));

    for generation in GENERATION_ORDER {
        if let Some(item) = event.memory.get(*generation) {
            memory_item(&mut out, item);
        }
    }
    if let Some(promotion) = event.promotion {
        let _ = write!(out, " promotion={}", format_bytes(promotion));
    }
    if let Some(interval) = event.interval {
        let _ = write!(out, " interval={}", format_ms(interval));
    }
    if let Some(cpu) = event.cpu {
        let _ = write!(
            out,
            " [user={:.2}ms sys={:.2}ms real={:.2}ms]",
            cpu.user, cpu.sys, cpu.real
        );
    }
    if event.kind.pause_class() == PauseClass::Partial {
        for phase in event.phases.iter().filter(|p| {
            p.kind.level() == Level::Phase && p.kind.pause_class() == PauseClass::Pause
        }) {
            let _ = write!(out, ", {} {}", phase.kind, format_ms_opt(phase.pause));
        }
    }
    out
}
