//! Human-readable verification reports.

use std::fmt;

use contrail_ir::expr::Expr;
use contrail_spec::spec::SpecNode;

use crate::evidence::{Evidence, EvidenceSummary, TestResult};

/// Borrowed view rendering a contract's propositions next to its evidence.
pub struct Report<'a> {
    assumptions: &'a [SpecNode<Expr>],
    guarantees: &'a [SpecNode<Expr>],
    evidence: &'a Evidence,
}

impl<'a> Report<'a> {
    pub fn new(
        assumptions: &'a [SpecNode<Expr>],
        guarantees: &'a [SpecNode<Expr>],
        evidence: &'a Evidence,
    ) -> Self {
        Self {
            assumptions,
            guarantees,
            evidence,
        }
    }

    fn section(
        &self,
        f: &mut fmt::Formatter<'_>,
        title: &str,
        nodes: &[SpecNode<Expr>],
        kind: TestResult,
    ) -> fmt::Result {
        writeln!(f, "  {title}:")?;
        for (index, node) in nodes.iter().enumerate() {
            let share = self.evidence.violation_share(kind, index);
            writeln!(f, "    ({:6.2}%) {node}", share * 100.0)?;
        }
        Ok(())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ContractResult:")?;
        self.section(f, "Assumptions", self.assumptions, TestResult::AssumptionViolated)?;
        self.section(f, "Guarantees", self.guarantees, TestResult::GuaranteeViolated)?;
        writeln!(f, "  Evidence: ")?;
        let evidence = self.evidence.to_string();
        write!(f, "    {}", evidence.replace('\n', "\n    "))
    }
}

/// Final outcome of a verification run.
#[derive(Debug, Clone)]
pub struct ContractResult {
    pub assumptions: Vec<SpecNode<Expr>>,
    pub guarantees: Vec<SpecNode<Expr>>,
    pub evidence: Evidence,
}

impl ContractResult {
    pub fn new(
        assumptions: Vec<SpecNode<Expr>>,
        guarantees: Vec<SpecNode<Expr>>,
        evidence: Evidence,
    ) -> Self {
        Self {
            assumptions,
            guarantees,
            evidence,
        }
    }

    /// Whether every requirement condition held. `None` before the run
    /// finished.
    pub fn requirements_met(&self) -> Option<bool> {
        self.evidence.requirements_met
    }

    pub fn summary(&self) -> EvidenceSummary {
        self.evidence.summary()
    }

    pub fn report(&self) -> Report<'_> {
        Report::new(&self.assumptions, &self.guarantees, &self.evidence)
    }
}

impl fmt::Display for ContractResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report())
    }
}
