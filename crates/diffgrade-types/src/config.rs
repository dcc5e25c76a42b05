//! Run arguments and run configuration.
//!
//! Arguments come from three layers that are merged with [`RunArguments::apply_over`]:
//! the explicit configuration, the `RunArguments` role declared on the reference's
//! solution, and the built-in defaults. [`RunArguments::resolve`] then fills every
//! remaining gap.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default number of trials per run.
pub const DEFAULT_NUM_TESTS: u32 = 1024;
/// Default bound on precondition rejections across a run.
pub const DEFAULT_MAX_DISCARDS: u32 = 1024;
/// Default ceiling for the complexity schedule.
pub const DEFAULT_MAX_COMPLEXITY: u32 = 100;

/// Optional per-run arguments. `None` means "inherit from the next layer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArguments {
    /// Trials per run, before the injected-case floor is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_tests: Option<u32>,
    /// Precondition rejections tolerated before the run stops generating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discards: Option<u32>,
    /// Cap on trials built purely from edge cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_only_edge_case_tests: Option<u32>,
    /// Cap on trials built purely from simple cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_only_simple_case_tests: Option<u32>,
    /// Trials whose arguments mix edge and simple cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simple_edge_mixed_tests: Option<u32>,
    /// Trials whose arguments are all freshly generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_all_generated_tests: Option<u32>,
    /// Regression trials spread across the generated part of the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_regression_tests: Option<u32>,
    /// Ceiling for the complexity schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_complexity: Option<u32>,
}

impl RunArguments {
    pub fn with_num_tests(mut self, n: u32) -> Self {
        self.num_tests = Some(n);
        self
    }

    pub fn with_max_discards(mut self, n: u32) -> Self {
        self.max_discards = Some(n);
        self
    }

    pub fn with_max_only_edge_case_tests(mut self, n: u32) -> Self {
        self.max_only_edge_case_tests = Some(n);
        self
    }

    pub fn with_max_only_simple_case_tests(mut self, n: u32) -> Self {
        self.max_only_simple_case_tests = Some(n);
        self
    }

    pub fn with_num_simple_edge_mixed_tests(mut self, n: u32) -> Self {
        self.num_simple_edge_mixed_tests = Some(n);
        self
    }

    pub fn with_num_all_generated_tests(mut self, n: u32) -> Self {
        self.num_all_generated_tests = Some(n);
        self
    }

    pub fn with_num_regression_tests(mut self, n: u32) -> Self {
        self.num_regression_tests = Some(n);
        self
    }

    pub fn with_max_complexity(mut self, n: u32) -> Self {
        self.max_complexity = Some(n);
        self
    }

    /// Merge `self` over `base`: every value set here wins.
    pub fn apply_over(&self, base: &RunArguments) -> RunArguments {
        RunArguments {
            num_tests: self.num_tests.or(base.num_tests),
            max_discards: self.max_discards.or(base.max_discards),
            max_only_edge_case_tests: self
                .max_only_edge_case_tests
                .or(base.max_only_edge_case_tests),
            max_only_simple_case_tests: self
                .max_only_simple_case_tests
                .or(base.max_only_simple_case_tests),
            num_simple_edge_mixed_tests: self
                .num_simple_edge_mixed_tests
                .or(base.num_simple_edge_mixed_tests),
            num_all_generated_tests: self
                .num_all_generated_tests
                .or(base.num_all_generated_tests),
            num_regression_tests: self.num_regression_tests.or(base.num_regression_tests),
            max_complexity: self.max_complexity.or(base.max_complexity),
        }
    }

    /// Fill unset values with defaults. Proportional caps are derived from the
    /// effective trial count.
    pub fn resolve(&self) -> ResolvedArguments {
        let num_tests = self.num_tests.unwrap_or(DEFAULT_NUM_TESTS);
        let sixteenth = num_tests / 16;
        ResolvedArguments {
            num_tests,
            max_discards: self.max_discards.unwrap_or(DEFAULT_MAX_DISCARDS),
            max_only_edge_case_tests: self.max_only_edge_case_tests.unwrap_or(sixteenth),
            max_only_simple_case_tests: self.max_only_simple_case_tests.unwrap_or(sixteenth),
            num_simple_edge_mixed_tests: self.num_simple_edge_mixed_tests.unwrap_or(sixteenth),
            num_all_generated_tests: self.num_all_generated_tests.unwrap_or(num_tests / 2),
            num_regression_tests: self.num_regression_tests.unwrap_or(sixteenth),
            max_complexity: self.max_complexity.unwrap_or(DEFAULT_MAX_COMPLEXITY),
        }
    }
}

/// Fully resolved arguments used by a run. Fields mean what they do on
/// [`RunArguments`], with every default filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArguments {
    pub num_tests: u32,
    pub max_discards: u32,
    pub max_only_edge_case_tests: u32,
    pub max_only_simple_case_tests: u32,
    pub num_simple_edge_mixed_tests: u32,
    pub num_all_generated_tests: u32,
    pub num_regression_tests: u32,
    pub max_complexity: u32,
}

impl Default for ResolvedArguments {
    fn default() -> Self {
        RunArguments::default().resolve()
    }
}

/// How complexity grows across the generated trials of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexitySchedule {
    #[default]
    Linear,
    Logarithmic,
}

impl ComplexitySchedule {
    /// Complexity for generated trial `index` out of `total`, never above `max`.
    ///
    /// Both schedules start at 0 and are non-decreasing in `index`.
    pub fn complexity_at(self, index: u32, total: u32, max: u32) -> u32 {
        if total <= 1 || max == 0 {
            return 0;
        }
        let last = f64::from(total - 1);
        let i = f64::from(index.min(total - 1));
        let fraction = match self {
            ComplexitySchedule::Linear => i / last,
            ComplexitySchedule::Logarithmic => (1.0 + i).ln() / (1.0 + last).ln(),
        };
        ((fraction * f64::from(max)).floor() as u32).min(max)
    }
}

/// Seeding policy for a run's random sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    /// Seed once at the start of the run; streams advance across trials.
    #[default]
    PerRun,
    /// Reseed every trial from the run seed mixed with the trial index.
    PerTrial,
}

impl SeedPolicy {
    /// Seed for a given trial under this policy.
    pub fn trial_seed(self, run_seed: u64, trial: u32) -> Option<u64> {
        match self {
            SeedPolicy::PerRun => None,
            SeedPolicy::PerTrial => Some(
                run_seed ^ (u64::from(trial) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15),
            ),
        }
    }
}

/// Configuration for one `run_tests` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Name of the solution under test.
    pub solution: String,
    /// Explicit run arguments; these override the solution's declared arguments.
    pub arguments: RunArguments,
    /// Complexity growth across generated trials.
    pub schedule: ComplexitySchedule,
    /// Stop at the first failing trial instead of running to completion.
    pub stop_on_first_failure: bool,
    /// Fixed seed for reproducibility (derived from the clock when absent).
    pub seed: Option<u64>,
    /// Whether streams are seeded once per run or once per trial.
    pub seed_policy: SeedPolicy,
    /// Run the reference against itself when a question is loaded.
    pub self_check: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            solution: String::new(),
            arguments: RunArguments::default(),
            schedule: ComplexitySchedule::default(),
            stop_on_first_failure: false,
            seed: None,
            seed_policy: SeedPolicy::default(),
            self_check: true,
        }
    }
}

impl RunConfig {
    /// Create a configuration targeting the named solution.
    pub fn new(solution: impl Into<String>) -> Self {
        Self {
            solution: solution.into(),
            ..Default::default()
        }
    }

    pub fn with_arguments(mut self, arguments: RunArguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_num_tests(mut self, n: u32) -> Self {
        self.arguments.num_tests = Some(n);
        self
    }

    pub fn with_schedule(mut self, schedule: ComplexitySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.seed_policy = policy;
        self
    }

    pub fn with_self_check(mut self, enabled: bool) -> Self {
        self.self_check = enabled;
        self
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse run config {}", path.display()))
    }
}
