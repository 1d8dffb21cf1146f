//! Fragmented analysis must produce the same model as a sequential parse,
//! whatever the worker count and whatever order the line groups arrive in.

use gcscope_core::fragment::{analyze_fragments, analyze_fragmented, split_groups, LineGroup};
use gcscope_core::parser::detector;
use gcscope_core::{analyze, GcModel, LogFormat, ParseOptions};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;

const FIXTURES: &[&str] = &[
    "cms_legacy_truncated.log",
    "cms_legacy_cut_mid_cycle.log",
    "g1_legacy.log",
    "parallel_legacy.log",
    "g1_unified.log",
    "zgc_unified.log",
];

const WORKERS: [usize; 3] = [1, 3, 8];

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(path).expect("fixture should be readable")
}

fn groups_of(text: &str) -> (LogFormat, Vec<LineGroup>) {
    let format = detector::resolve_format(text, &ParseOptions::default())
        .expect("fixture format should be detected");
    (format, split_groups(text, format))
}

/// Odd-indexed groups reversed, then woven between the even ones.
fn interleave(groups: &[LineGroup]) -> Vec<LineGroup> {
    let mut evens = groups.iter().step_by(2);
    let mut odds = groups.iter().skip(1).step_by(2).rev();
    let mut out = Vec::with_capacity(groups.len());
    loop {
        match (odds.next(), evens.next()) {
            (None, None) => break,
            (odd, even) => out.extend(odd.into_iter().chain(even).cloned()),
        }
    }
    out
}

fn assert_same(name: &str, sequential: &GcModel, fragmented: &GcModel) {
    assert_eq!(
        sequential.events().len(),
        fragmented.events().len(),
        "{name}: top-level count"
    );
    assert_eq!(
        sequential.all_events(),
        fragmented.all_events(),
        "{name}: flat order differs"
    );
    for (r, expected) in sequential.iter_all() {
        let actual = fragmented.resolve(r);
        assert_eq!(expected.kind, actual.kind, "{name}: kind at {r:?}");
        assert_eq!(expected.cause, actual.cause, "{name}: cause at {r:?}");
        assert_eq!(expected.start, actual.start, "{name}: start at {r:?}");
        assert_eq!(expected.duration, actual.duration, "{name}: duration at {r:?}");
        assert_eq!(expected.pause, actual.pause, "{name}: pause at {r:?}");
        assert_eq!(expected.promotion, actual.promotion, "{name}: promotion at {r:?}");
        assert_eq!(expected.interval, actual.interval, "{name}: interval at {r:?}");
        assert_eq!(expected.memory, actual.memory, "{name}: memory at {r:?}");
        assert_eq!(expected.cpu, actual.cpu, "{name}: cpu at {r:?}");
        assert_eq!(expected.line, actual.line, "{name}: line at {r:?}");
        assert_eq!(expected.text, actual.text, "{name}: text at {r:?}");
    }
    assert_eq!(sequential.stalls(), fragmented.stalls(), "{name}: stalls");
    assert_eq!(sequential.region_size(), fragmented.region_size());
    assert_eq!(sequential.parallel_threads(), fragmented.parallel_threads());
    assert_eq!(sequential.metadata().causes, fragmented.metadata().causes);
    assert_eq!(
        sequential.pause_statistics(sequential.time_range()),
        fragmented.pause_statistics(fragmented.time_range()),
        "{name}: pause statistics"
    );
}

#[test]
fn test_fragmented_matches_sequential() {
    let options = ParseOptions::default();
    for name in FIXTURES {
        let text = fixture(name);
        let sequential = analyze(&text, &options).expect("sequential analyze");
        for workers in WORKERS {
            let fragmented =
                analyze_fragmented(&text, &options, workers).expect("fragmented analyze");
            assert_same(name, &sequential, &fragmented);
        }
    }
}

#[test]
fn test_reversed_and_interleaved_groups() {
    let options = ParseOptions::default();
    for name in FIXTURES {
        let text = fixture(name);
        let sequential = analyze(&text, &options).unwrap();
        let (format, groups) = groups_of(&text);

        let mut reversed = groups.clone();
        reversed.reverse();
        for order in [reversed, interleave(&groups)] {
            for workers in WORKERS {
                let model = analyze_fragments(order.clone(), format, &options, workers).unwrap();
                assert_same(name, &sequential, &model);
            }
        }
    }
}

#[test]
fn test_shuffled_groups() {
    let options = ParseOptions::default();
    for name in FIXTURES {
        let text = fixture(name);
        let sequential = analyze(&text, &options).unwrap();
        let (format, groups) = groups_of(&text);

        for seed in [7, 42, 1234, 99_991] {
            let mut shuffled = groups.clone();
            shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
            for workers in WORKERS {
                let model =
                    analyze_fragments(shuffled.clone(), format, &options, workers).unwrap();
                assert_same(&format!("{name} (seed {seed})"), &sequential, &model);
            }
        }
    }
}

#[test]
fn test_legacy_cycles_keep_their_lines_together() {
    let (_, groups) = groups_of(&fixture("g1_legacy.log"));
    let cycle = groups
        .iter()
        .find(|g| g.lines[0].1.contains("concurrent-root-region-scan-start"))
        .expect("cycle group");
    // the young pause inside the cycle gets its own group
    assert!(cycle.lines.iter().all(|(_, l)| !l.contains("GC pause")));
    assert!(cycle.lines.iter().any(|(_, l)| l.contains("GC remark")));
    assert!(cycle.lines.last().unwrap().1.contains("concurrent-cleanup-end"));
}
