//! Incremental four-valued monitors.

use std::fmt;

use tracing::trace;

use crate::eval::{EvalError, Evaluate};
use crate::spec::SpecNode;
use crate::window::WindowSet;

/// RV-LTL verdict, ordered `False < PresumablyFalse < PresumablyTrue < True`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    False,
    PresumablyFalse,
    PresumablyTrue,
    True,
}

impl Verdict {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Verdict::True
        } else {
            Verdict::False
        }
    }

    /// `False` or `PresumablyFalse`.
    pub fn is_violation(self) -> bool {
        self <= Verdict::PresumablyFalse
    }

    pub fn negate(self) -> Self {
        match self {
            Verdict::False => Verdict::True,
            Verdict::PresumablyFalse => Verdict::PresumablyTrue,
            Verdict::PresumablyTrue => Verdict::PresumablyFalse,
            Verdict::True => Verdict::False,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::False => "False",
            Verdict::PresumablyFalse => "PresumablyFalse",
            Verdict::PresumablyTrue => "PresumablyTrue",
            Verdict::True => "True",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    /// A value the monitor needs at `time` has not been observed yet.
    #[error("Value at time {time} is not available yet")]
    NotAvailable { time: usize },

    #[error("Failed to evaluate atomic proposition at time {time}: {source}")]
    Evaluation { time: usize, source: EvalError },
}

/// Incremental evaluator for one proposition over a growing trace.
pub trait Monitor: Send {
    /// Extend the observed trace through `time` and return the verdict on
    /// the prefix seen so far.
    fn update(&mut self, time: usize, windows: &WindowSet) -> Result<Verdict, MonitorError>;
}

/// Creates a fresh monitor for a proposition tree.
pub trait MonitorFactory<F>: Send + Sync {
    fn create(&self, node: &SpecNode<F>) -> Box<dyn Monitor>;
}

/// Factory for [`PrefixMonitor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixMonitorFactory;

impl<F: Evaluate + 'static> MonitorFactory<F> for PrefixMonitorFactory {
    fn create(&self, node: &SpecNode<F>) -> Box<dyn Monitor> {
        Box::new(PrefixMonitor::new(node))
    }
}

/// Proposition tree with atomics replaced by indices into the monitor's
/// deduplicated atom list.
#[derive(Debug, Clone)]
enum Node {
    Atom(usize),
    Not(Box<Node>),
    Always(Box<Node>),
    Eventually(Box<Node>),
    Next(Box<Node>),
    Until(Box<Node>, Box<Node>),
    Implies(Box<Node>, Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

/// Finite-prefix RV-LTL monitor.
///
/// Every atomic is evaluated once per time index and stored; the verdict is
/// recomputed over the stored prefix. Temporal operators that the prefix
/// cannot settle yield presumptive verdicts.
#[derive(Debug)]
pub struct PrefixMonitor<F> {
    root: Node,
    atoms: Vec<F>,
    rows: Vec<Vec<bool>>,
}

impl<F: Evaluate> PrefixMonitor<F> {
    pub fn new(node: &SpecNode<F>) -> Self {
        let mut atoms = Vec::new();
        let root = Self::lower(node, &mut atoms);
        Self {
            root,
            atoms,
            rows: Vec::new(),
        }
    }

    fn lower(node: &SpecNode<F>, atoms: &mut Vec<F>) -> Node {
        let boxed = |n: &SpecNode<F>, atoms: &mut Vec<F>| Box::new(Self::lower(n, atoms));
        match node {
            SpecNode::Atomic { fragment, .. } => {
                let id = match atoms.iter().position(|a| a.equivalent(fragment)) {
                    Some(id) => id,
                    None => {
                        atoms.push(fragment.clone());
                        atoms.len() - 1
                    }
                };
                Node::Atom(id)
            }
            SpecNode::Not(req) => Node::Not(boxed(req.as_ref(), atoms)),
            SpecNode::Always(req) => Node::Always(boxed(req.as_ref(), atoms)),
            SpecNode::Eventually(req) => Node::Eventually(boxed(req.as_ref(), atoms)),
            SpecNode::Next(req) => Node::Next(boxed(req.as_ref(), atoms)),
            SpecNode::Until(lhs, rhs) => {
                let lhs = boxed(lhs.as_ref(), atoms);
                Node::Until(lhs, boxed(rhs.as_ref(), atoms))
            }
            SpecNode::Implies(lhs, rhs) => {
                let lhs = boxed(lhs.as_ref(), atoms);
                Node::Implies(lhs, boxed(rhs.as_ref(), atoms))
            }
            SpecNode::And(reqs) => Node::And(reqs.iter().map(|r| Self::lower(r, atoms)).collect()),
            SpecNode::Or(reqs) => Node::Or(reqs.iter().map(|r| Self::lower(r, atoms)).collect()),
        }
    }

    /// Number of time indices observed so far.
    pub fn observed(&self) -> usize {
        self.rows.len()
    }

    fn eval(&self, node: &Node, i: usize) -> Verdict {
        let n = self.rows.len();
        match node {
            Node::Atom(id) => Verdict::from_bool(self.rows[i][*id]),
            Node::Not(req) => self.eval(req, i).negate(),
            Node::And(reqs) => reqs
                .iter()
                .map(|r| self.eval(r, i))
                .min()
                .unwrap_or(Verdict::True),
            Node::Or(reqs) => reqs
                .iter()
                .map(|r| self.eval(r, i))
                .max()
                .unwrap_or(Verdict::False),
            Node::Implies(lhs, rhs) => self.eval(lhs, i).negate().max(self.eval(rhs, i)),
            Node::Next(req) => {
                if i + 1 < n {
                    self.eval(req, i + 1)
                } else {
                    Verdict::PresumablyTrue
                }
            }
            Node::Always(req) => (i..n)
                .map(|j| self.eval(req, j))
                .fold(Verdict::PresumablyTrue, Verdict::min),
            Node::Eventually(req) => (i..n)
                .map(|j| self.eval(req, j))
                .fold(Verdict::PresumablyFalse, Verdict::max),
            Node::Until(lhs, rhs) => {
                let mut best = Verdict::False;
                let mut lhs_so_far = Verdict::True;
                for k in i..n {
                    best = best.max(self.eval(rhs, k).min(lhs_so_far));
                    lhs_so_far = lhs_so_far.min(self.eval(lhs, k));
                }
                best.max(lhs_so_far.min(Verdict::PresumablyFalse))
            }
        }
    }
}

impl<F: Evaluate> Monitor for PrefixMonitor<F> {
    fn update(&mut self, time: usize, windows: &WindowSet) -> Result<Verdict, MonitorError> {
        while self.rows.len() <= time {
            let t = self.rows.len();
            let row = self
                .atoms
                .iter()
                .map(|atom| atom.holds(t, windows))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| match err.unavailable_time() {
                    Some(time) => MonitorError::NotAvailable { time },
                    None => MonitorError::Evaluation { time: t, source: err },
                })?;
            self.rows.push(row);
        }

        let verdict = self.eval(&self.root, 0);
        trace!(time, observed = self.rows.len(), %verdict, "monitor update");
        Ok(verdict)
    }
}
