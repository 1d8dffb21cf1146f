use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) {
        let path = self.xdg_config.join("gcscope/config.toml");
        fs::create_dir_all(path.parent().expect("missing config parent"))
            .expect("failed to create config directory");
        fs::write(path, contents).expect("failed to write config");
    }

    fn log_dir(&self) -> PathBuf {
        self.xdg_state.join("gcscope")
    }
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../gcscope-core/tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("gcscope"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute gcscope: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "gcscope {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn summary_of_legacy_cms_log() {
    let env = CliTestEnv::new();
    let log = fixture("cms_legacy_truncated.log");
    let args = [log.as_str()];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Collector: CMS (legacy)"), "got:\n{stdout}");
    assert!(stdout.contains("Pauses: 3"));
    assert!(stdout.contains("Allocation Failure"));

    let logs: Vec<_> = fs::read_dir(env.log_dir())
        .expect("log directory should exist")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("gcscope.log"))
        .collect();
    assert!(!logs.is_empty(), "expected a log file in {}", env.log_dir().display());
}

#[test]
fn json_report_with_events_and_metrics() {
    let env = CliTestEnv::new();
    let log = fixture("g1_unified.log");
    let args = [log.as_str(), "--format", "json", "--events", "--metrics"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["metadata"]["collector"], "g1");
    assert_eq!(report["metadata"]["region_size"], 1024 * 1024);
    assert_eq!(report["pauses"]["count"], 7);
    assert_eq!(report["events"].as_array().map(Vec::len), Some(6));
    assert!(report["metrics"]
        .as_array()
        .is_some_and(|samples| samples.iter().any(|s| s["name"] == "gc_pause_ms")));
}

#[test]
fn diagnose_and_fragmented_mode() {
    let env = CliTestEnv::new();
    let log = fixture("g1_unified.log");
    let args = [log.as_str(), "--diagnose", "--fragmented", "--workers", "3"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pauses: 7"));
    assert!(stdout.contains("explicit_gc"));
    assert!(stdout.contains("humongous_allocation"));
}

#[test]
fn config_disables_rules() {
    let env = CliTestEnv::new();
    env.write_config("[diagnoser]\ndisabled_rules = [\"explicit_gc\"]\n");
    let log = fixture("g1_unified.log");
    let args = [log.as_str(), "--diagnose"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("explicit_gc"));
    assert!(stdout.contains("humongous_allocation"));
}

#[test]
fn list_rules_without_a_log() {
    let env = CliTestEnv::new();
    let args = ["--list-rules"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().filter(|l| l.starts_with("  - ")).count(), 12);
    assert!(stdout.contains("metaspace_full_gc_run"));
}

#[test]
fn failures_are_reported() {
    let env = CliTestEnv::new();

    let missing = run_bin(&env, &["/nonexistent/gc.log"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("failed to read"));

    let log = fixture("cms_legacy_truncated.log");
    let bad_format = run_bin(&env, &[log.as_str(), "--format", "yaml"]);
    assert!(!bad_format.status.success());

    let forced = run_bin(&env, &[log.as_str(), "--collector", "shenandoah"]);
    assert!(!forced.status.success());
    assert!(String::from_utf8_lossy(&forced.stderr).contains("unsupported log format"));
}
