use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evidence::Evidence;

/// Termination or requirement predicate over accumulated evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Total simulated wall-clock seconds reached.
    TimeTermination(f64),
    /// Number of samples reached.
    CountTermination(usize),
    /// Two-sided confidence interval at most this wide.
    GapTermination(f64),
    /// Lower correctness bound at least this high.
    CorrectnessRequirement(f64),
}

impl Condition {
    pub fn check(&self, evidence: &Evidence) -> bool {
        match *self {
            Condition::TimeTermination(secs) => evidence.elapsed_secs() >= secs,
            Condition::CountTermination(count) => evidence.len() >= count,
            Condition::GapTermination(gap) => evidence.confidence_gap() <= gap,
            Condition::CorrectnessRequirement(correctness) => {
                evidence.correctness() >= correctness
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::TimeTermination(secs) => write!(f, "TimeTerminationCondition({secs})"),
            Condition::CountTermination(count) => write!(f, "CountTerminationCondition({count})"),
            Condition::GapTermination(gap) => write!(f, "GapTerminationCondition({gap})"),
            Condition::CorrectnessRequirement(c) => {
                write!(f, "CorrectnessRequirementCondition({c})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{ReplayPayload, SourceInfo, TestData, TestResult};

    fn evidence_with(valid: usize, violated: usize) -> Evidence {
        let mut ev = Evidence::new(
            0.95,
            SourceInfo {
                scenario: "test".to_string(),
                hash: 0,
            },
        );
        let make = |result: TestResult| TestData {
            result,
            violations: if result == TestResult::Valid { vec![] } else { vec![0] },
            elapsed_secs: 1.0,
            replay: ReplayPayload::default(),
        };
        ev.add_tests((0..valid).map(|_| make(TestResult::Valid)).collect());
        ev.add_tests(
            (0..violated)
                .map(|_| make(TestResult::GuaranteeViolated))
                .collect(),
        );
        ev
    }

    #[test]
    fn test_count_and_time() {
        let ev = evidence_with(3, 1);
        assert!(Condition::CountTermination(4).check(&ev));
        assert!(!Condition::CountTermination(5).check(&ev));
        assert!(Condition::TimeTermination(4.0).check(&ev));
        assert!(!Condition::TimeTermination(4.5).check(&ev));
    }

    #[test]
    fn test_gap_and_correctness() {
        let empty = evidence_with(0, 0);
        assert!(!Condition::GapTermination(0.5).check(&empty));
        assert!(Condition::GapTermination(1.0).check(&empty));
        assert!(!Condition::CorrectnessRequirement(0.1).check(&empty));

        let strong = evidence_with(200, 0);
        assert!(Condition::GapTermination(0.05).check(&strong));
        assert!(Condition::CorrectnessRequirement(0.95).check(&strong));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Condition::CountTermination(10).to_string(),
            "CountTerminationCondition(10)"
        );
        assert_eq!(
            Condition::TimeTermination(30.0).to_string(),
            "TimeTerminationCondition(30)"
        );
        assert_eq!(
            Condition::GapTermination(0.05).to_string(),
            "GapTerminationCondition(0.05)"
        );
    }

    #[test]
    fn test_deserialize() {
        let conds: Vec<Condition> =
            serde_json::from_str(r#"[{"count_termination": 10}, {"correctness_requirement": 0.9}]"#)
                .unwrap();
        assert_eq!(
            conds,
            vec![
                Condition::CountTermination(10),
                Condition::CorrectnessRequirement(0.9)
            ]
        );
    }
}
