//! Rule-based diagnosis of a finished model.
//!
//! Each rule looks at the model for one known problem pattern and, when it
//! finds it, reports a [`Diagnosis`] with the problem and what to try.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        DIAGNOSER                         │
//! │                                                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
//! │  │ long_pause   │  │ explicit_gc  │  │ ...          │    │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘    │
//! │         ▼                 ▼                 ▼            │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │ Diagnoser::run()                                   │  │
//! │  │  - skips rules disabled in config                  │  │
//! │  │  - calls rule.diagnose() with the shared context   │  │
//! │  │  - collects the diagnoses in registration order    │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gcscope_core::analytics::create_default_diagnoser;
//!
//! let diagnoser = create_default_diagnoser(config.diagnoser.clone());
//! for diagnosis in diagnoser.run(&model) {
//!     println!("{}: {}", diagnosis.rule, diagnosis.problem);
//! }
//! ```

use crate::config::DiagnoserConfig;
use crate::error::{Error, Result};
use crate::model::GcModel;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A problem found in the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    /// Name of the rule that produced it
    pub rule: String,
    pub severity: Severity,
    pub problem: String,
    pub suggestions: Vec<String>,
    /// Start (ms since JVM start) of the first event showing the problem
    pub first_event: Option<f64>,
    pub occurrences: usize,
}

impl Diagnosis {
    pub fn new(rule: &str, severity: Severity, problem: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity,
            problem: problem.into(),
            suggestions: Vec::new(),
            first_event: None,
            occurrences: 0,
        }
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn at(mut self, first_event: Option<f64>, occurrences: usize) -> Self {
        self.first_event = first_event;
        self.occurrences = occurrences;
        self
    }
}

/// What a rule gets to look at.
pub struct DiagnosisContext<'a> {
    pub model: &'a GcModel,
    pub config: &'a DiagnoserConfig,
}

/// A single problem pattern.
///
/// Rules are stateless: the same model and thresholds always give the
/// same answer. A rule that finds nothing returns `None`.
pub trait DiagnosisRule: Send + Sync {
    /// Unique name, used in config to disable the rule.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis>;
}

/// Holds the registered rules and runs them against a model.
pub struct Diagnoser {
    rules: Vec<Box<dyn DiagnosisRule>>,
    config: DiagnoserConfig,
}

impl Diagnoser {
    /// Create a diagnoser with no rules.
    pub fn new(config: DiagnoserConfig) -> Self {
        Self {
            rules: Vec::new(),
            config,
        }
    }

    pub fn register(&mut self, rule: Box<dyn DiagnosisRule>) {
        tracing::debug!(rule = rule.name(), "Registered diagnosis rule");
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name() == name)
    }

    pub fn config(&self) -> &DiagnoserConfig {
        &self.config
    }

    fn is_disabled(&self, name: &str) -> bool {
        self.config.disabled_rules.iter().any(|d| d == name)
    }

    fn run_one(&self, rule: &dyn DiagnosisRule, model: &GcModel) -> Option<Diagnosis> {
        let ctx = DiagnosisContext {
            model,
            config: &self.config,
        };
        let start = Instant::now();
        let diagnosis = rule.diagnose(&ctx);
        tracing::debug!(
            rule = rule.name(),
            found = diagnosis.is_some(),
            duration_us = start.elapsed().as_micros() as u64,
            "Ran diagnosis rule"
        );
        diagnosis
    }

    /// Run a specific rule, even if config disables it.
    pub fn run_rule(&self, name: &str, model: &GcModel) -> Result<Option<Diagnosis>> {
        let rule = self
            .rules
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| Error::Config(format!("Diagnosis rule not found: {name}")))?;
        Ok(self.run_one(rule.as_ref(), model))
    }

    /// Run every enabled rule and collect what they find.
    pub fn run(&self, model: &GcModel) -> Vec<Diagnosis> {
        let mut found = Vec::new();
        for rule in &self.rules {
            if self.is_disabled(rule.name()) {
                tracing::debug!(rule = rule.name(), "Skipping disabled diagnosis rule");
                continue;
            }
            found.extend(self.run_one(rule.as_ref(), model));
        }
        tracing::info!(
            rules = self.rules.len(),
            diagnoses = found.len(),
            "Diagnosis complete"
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CollectorFamily, LogFormat, LogStyle, ModelBuilder};
    use crate::pipeline;

    struct Always;

    impl DiagnosisRule for Always {
        fn name(&self) -> &str {
            "test.always"
        }

        fn description(&self) -> &str {
            "Always reports"
        }

        fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
            Some(
                Diagnosis::new(self.name(), Severity::Info, "always")
                    .at(Some(ctx.model.start_time()), 1),
            )
        }
    }

    struct Never;

    impl DiagnosisRule for Never {
        fn name(&self) -> &str {
            "test.never"
        }

        fn description(&self) -> &str {
            "Never reports"
        }

        fn diagnose(&self, _ctx: &DiagnosisContext) -> Option<Diagnosis> {
            None
        }
    }

    fn empty_model() -> GcModel {
        let format = LogFormat::new(CollectorFamily::Serial, LogStyle::Legacy);
        let mut b = ModelBuilder::new(format).unwrap();
        b.observe(10.0);
        pipeline::run(b).unwrap()
    }

    #[test]
    fn test_register_and_run() {
        let mut diagnoser = Diagnoser::new(DiagnoserConfig::default());
        diagnoser.register(Box::new(Always));
        diagnoser.register(Box::new(Never));

        assert_eq!(diagnoser.rule_names(), vec!["test.always", "test.never"]);
        assert!(diagnoser.has_rule("test.never"));

        let found = diagnoser.run(&empty_model());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "test.always");
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let config = DiagnoserConfig {
            disabled_rules: vec!["test.always".to_string()],
            ..DiagnoserConfig::default()
        };
        let mut diagnoser = Diagnoser::new(config);
        diagnoser.register(Box::new(Always));
        let model = empty_model();

        assert!(diagnoser.run(&model).is_empty());
        // explicit runs ignore the disabled list
        assert!(diagnoser.run_rule("test.always", &model).unwrap().is_some());
    }

    #[test]
    fn test_unknown_rule_is_error() {
        let diagnoser = Diagnoser::new(DiagnoserConfig::default());
        let err = diagnoser.run_rule("missing", &empty_model()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
