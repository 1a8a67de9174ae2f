//! Accumulated per-sample verdicts and the statistics derived from them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::stats::{Alternative, BinomialInterval, ClopperPearson};

/// Outcome of verifying one sampled scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Valid,
    Rejected,
    AssumptionViolated,
    GuaranteeViolated,
}

impl TestResult {
    pub fn description(self) -> &'static str {
        match self {
            TestResult::Valid => "Valid: The contract was successfully validated",
            TestResult::Rejected => "Rejected: The scenario was rejected or a guard was violated",
            TestResult::AssumptionViolated => "Assumptions: An assumption was violated",
            TestResult::GuaranteeViolated => "Guarantees: A guarantee was violated",
        }
    }
}

/// Opaque bytes sufficient to replay a sample. Stored and forwarded as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayPayload {
    pub scene: Vec<u8>,
    pub simulation: Vec<u8>,
}

/// One verified sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    pub result: TestResult,
    /// Indices of the violated assumptions or guarantees.
    pub violations: Vec<usize>,
    pub elapsed_secs: f64,
    pub replay: ReplayPayload,
}

/// Where the samples came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub scenario: String,
    pub hash: u64,
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scenario '{}' (Hash={})", self.scenario, self.hash)
    }
}

/// Probabilistic evidence for a contract.
#[derive(Debug, Clone)]
pub struct Evidence {
    confidence: f64,
    source: SourceInfo,
    samples: Vec<TestData>,
    elapsed_secs: f64,
    valid: u64,
    rejected: u64,
    assumption_violated: u64,
    guarantee_violated: u64,
    pub requirements_met: Option<bool>,
    interval: Arc<dyn BinomialInterval>,
}

/// Serializable snapshot of an [`Evidence`]'s counts and statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub source: SourceInfo,
    pub confidence: f64,
    pub samples: usize,
    pub elapsed_secs: f64,
    pub valid: u64,
    pub rejected: u64,
    pub assumption_violated: u64,
    pub guarantee_violated: u64,
    pub correctness: f64,
    pub mean_correctness: f64,
    pub confidence_gap: f64,
    pub requirements_met: Option<bool>,
}

impl Evidence {
    pub fn new(confidence: f64, source: SourceInfo) -> Self {
        Self {
            confidence,
            source,
            samples: Vec::new(),
            elapsed_secs: 0.0,
            valid: 0,
            rejected: 0,
            assumption_violated: 0,
            guarantee_violated: 0,
            requirements_met: None,
            interval: Arc::new(ClopperPearson),
        }
    }

    pub fn with_interval(mut self, interval: Arc<dyn BinomialInterval>) -> Self {
        self.interval = interval;
        self
    }

    pub fn add_tests(&mut self, tests: Vec<TestData>) {
        for test in &tests {
            self.elapsed_secs += test.elapsed_secs;
            match test.result {
                TestResult::Valid => self.valid += 1,
                TestResult::Rejected => self.rejected += 1,
                TestResult::AssumptionViolated => self.assumption_violated += 1,
                TestResult::GuaranteeViolated => self.guarantee_violated += 1,
            }
        }
        self.samples.extend(tests);
    }

    /// Samples that count as trials: valid or guarantee-violated.
    fn trials(&self) -> u64 {
        self.valid + self.guarantee_violated
    }

    /// Fraction of trials that were valid; NaN before any trial.
    pub fn mean_correctness(&self) -> f64 {
        match self.trials() {
            0 => f64::NAN,
            n => self.valid as f64 / n as f64,
        }
    }

    /// One-sided lower confidence bound on the correctness.
    pub fn correctness(&self) -> f64 {
        match self.trials() {
            0 => 0.0,
            n => {
                self.interval
                    .interval(self.valid, n, self.confidence, Alternative::Greater)
                    .0
            }
        }
    }

    /// Width of the two-sided confidence interval.
    pub fn confidence_gap(&self) -> f64 {
        match self.trials() {
            0 => 1.0,
            n => {
                let (low, high) =
                    self.interval
                        .interval(self.valid, n, self.confidence, Alternative::TwoSided);
                high - low
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TestData] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestData> {
        self.samples.iter()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn count(&self, result: TestResult) -> u64 {
        match result {
            TestResult::Valid => self.valid,
            TestResult::Rejected => self.rejected,
            TestResult::AssumptionViolated => self.assumption_violated,
            TestResult::GuaranteeViolated => self.guarantee_violated,
        }
    }

    /// Share of `kind` samples attributable to proposition `index`.
    ///
    /// A sample citing several propositions splits its weight evenly.
    pub fn violation_share(&self, kind: TestResult, index: usize) -> f64 {
        let total = self.count(kind);
        if total == 0 {
            return 0.0;
        }
        let weight: f64 = self
            .samples
            .iter()
            .filter(|t| t.result == kind && t.violations.contains(&index))
            .map(|t| 1.0 / t.violations.len() as f64)
            .sum();
        weight / total as f64
    }

    pub fn summary(&self) -> EvidenceSummary {
        EvidenceSummary {
            source: self.source.clone(),
            confidence: self.confidence,
            samples: self.samples.len(),
            elapsed_secs: self.elapsed_secs,
            valid: self.valid,
            rejected: self.rejected,
            assumption_violated: self.assumption_violated,
            guarantee_violated: self.guarantee_violated,
            correctness: self.correctness(),
            mean_correctness: self.mean_correctness(),
            confidence_gap: self.confidence_gap(),
            requirements_met: self.requirements_met,
        }
    }
}

impl<'a> IntoIterator for &'a Evidence {
    type Item = &'a TestData;
    type IntoIter = std::slice::Iter<'a, TestData>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Probabilistic Evidence")?;
        writeln!(
            f,
            "{:.2}% Correctness with {:.2}% Confidence",
            100.0 * self.correctness(),
            100.0 * self.confidence
        )?;
        writeln!(f, "Sampled from {}", self.source)?;
        writeln!(
            f,
            "{} Verified,  {} Rejected,  {} A-Violated,  {} G-Violated",
            self.valid, self.rejected, self.assumption_violated, self.guarantee_violated
        )?;
        writeln!(
            f,
            "{} Samples, {:.2} Seconds",
            self.samples.len(),
            self.elapsed_secs
        )?;
        writeln!(f, "Mean Correctness: {:.2}%", 100.0 * self.mean_correctness())?;
        write!(f, "Confidence Gap: {:.4}", self.confidence_gap())
    }
}
