//! Immutable temporal-logic proposition trees.
//!
//! A [`SpecNode`] is generic over its atomic [`Fragment`] type so the tree
//! never looks inside the expressions it carries: it only clones them and
//! compares them for equivalence.

use std::fmt;

use contrail_ir::expr::Expr;
use contrail_ir::prop::Proposition;

/// An opaque atomic expression carried by a [`SpecNode::Atomic`] leaf.
pub trait Fragment: Clone + fmt::Debug + Send + Sync {
    /// Structural equality ignoring position metadata.
    fn equivalent(&self, other: &Self) -> bool;
}

/// Fragments that may read stream values ahead of the evaluation time.
pub trait Lookahead {
    fn lookahead(&self) -> usize;
}

impl Fragment for Expr {
    fn equivalent(&self, other: &Self) -> bool {
        Expr::equivalent(self, other)
    }
}

impl Lookahead for Expr {
    fn lookahead(&self) -> usize {
        self.max_offset()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    #[error("Atomic proposition refers to fragment {id}, but the table has {len} fragments")]
    UnknownFragment { id: usize, len: usize },
}

/// Node of a proposition tree.
#[derive(Debug, Clone)]
pub enum SpecNode<F> {
    Atomic { fragment: F, text: Option<String> },
    Not(Box<SpecNode<F>>),
    Always(Box<SpecNode<F>>),
    Eventually(Box<SpecNode<F>>),
    Next(Box<SpecNode<F>>),
    Until(Box<SpecNode<F>>, Box<SpecNode<F>>),
    Implies(Box<SpecNode<F>>, Box<SpecNode<F>>),
    And(Vec<SpecNode<F>>),
    Or(Vec<SpecNode<F>>),
}

impl<F: Fragment> SpecNode<F> {
    pub fn atomic(fragment: F, text: Option<&str>) -> Self {
        SpecNode::Atomic {
            fragment,
            text: text.map(str::to_string),
        }
    }

    /// Build a tree from a skeleton, cloning each referenced fragment out of
    /// `fragments` so no two trees share a fragment.
    pub fn from_proposition(prop: &Proposition, fragments: &[F]) -> Result<Self, SpecError> {
        let build = |req: &Proposition| Self::from_proposition(req, fragments).map(Box::new);
        let node = match prop {
            Proposition::Atomic { syntax_id, source } => {
                let fragment = fragments
                    .get(*syntax_id)
                    .ok_or(SpecError::UnknownFragment {
                        id: *syntax_id,
                        len: fragments.len(),
                    })?;
                SpecNode::Atomic {
                    fragment: fragment.clone(),
                    text: source.clone(),
                }
            }
            Proposition::Not { req } => SpecNode::Not(build(req.as_ref())?),
            Proposition::Always { req } => SpecNode::Always(build(req.as_ref())?),
            Proposition::Eventually { req } => SpecNode::Eventually(build(req.as_ref())?),
            Proposition::Next { req } => SpecNode::Next(build(req.as_ref())?),
            Proposition::Until { lhs, rhs } => SpecNode::Until(build(lhs.as_ref())?, build(rhs.as_ref())?),
            Proposition::Implies { lhs, rhs } => SpecNode::Implies(build(lhs.as_ref())?, build(rhs.as_ref())?),
            Proposition::And { reqs } => SpecNode::And(
                reqs.iter()
                    .map(|r| Self::from_proposition(r, fragments))
                    .collect::<Result<_, _>>()?,
            ),
            Proposition::Or { reqs } => SpecNode::Or(
                reqs.iter()
                    .map(|r| Self::from_proposition(r, fragments))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(node)
    }

    /// Rebuild the tree with every atomic fragment passed through `f`.
    pub fn apply_atomic_transformer<G, T>(&self, f: &mut T) -> SpecNode<G>
    where
        G: Fragment,
        T: FnMut(&F) -> G,
    {
        match self {
            SpecNode::Atomic { fragment, text } => SpecNode::Atomic {
                fragment: f(fragment),
                text: text.clone(),
            },
            SpecNode::Not(req) => SpecNode::Not(Box::new(req.apply_atomic_transformer(f))),
            SpecNode::Always(req) => SpecNode::Always(Box::new(req.apply_atomic_transformer(f))),
            SpecNode::Eventually(req) => {
                SpecNode::Eventually(Box::new(req.apply_atomic_transformer(f)))
            }
            SpecNode::Next(req) => SpecNode::Next(Box::new(req.apply_atomic_transformer(f))),
            SpecNode::Until(lhs, rhs) => SpecNode::Until(
                Box::new(lhs.apply_atomic_transformer(f)),
                Box::new(rhs.apply_atomic_transformer(f)),
            ),
            SpecNode::Implies(lhs, rhs) => SpecNode::Implies(
                Box::new(lhs.apply_atomic_transformer(f)),
                Box::new(rhs.apply_atomic_transformer(f)),
            ),
            SpecNode::And(reqs) => SpecNode::And(
                reqs.iter()
                    .map(|r| r.apply_atomic_transformer(f))
                    .collect(),
            ),
            SpecNode::Or(reqs) => SpecNode::Or(
                reqs.iter()
                    .map(|r| r.apply_atomic_transformer(f))
                    .collect(),
            ),
        }
    }

    /// Atomic fragments in depth-first, left-to-right order.
    pub fn atomics(&self) -> Vec<&F> {
        let mut out = Vec::new();
        self.collect_atomics(&mut out);
        out
    }

    fn collect_atomics<'a>(&'a self, out: &mut Vec<&'a F>) {
        match self {
            SpecNode::Atomic { fragment, .. } => out.push(fragment),
            SpecNode::Not(req)
            | SpecNode::Always(req)
            | SpecNode::Eventually(req)
            | SpecNode::Next(req) => req.collect_atomics(out),
            SpecNode::Until(lhs, rhs) | SpecNode::Implies(lhs, rhs) => {
                lhs.collect_atomics(out);
                rhs.collect_atomics(out);
            }
            SpecNode::And(reqs) | SpecNode::Or(reqs) => {
                for req in reqs {
                    req.collect_atomics(out);
                }
            }
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            SpecNode::Atomic { .. } => "atomic",
            SpecNode::Not(_) => "not",
            SpecNode::Always(_) => "always",
            SpecNode::Eventually(_) => "eventually",
            SpecNode::Next(_) => "next",
            SpecNode::Until(..) => "until",
            SpecNode::Implies(..) => "implies",
            SpecNode::And(_) => "and",
            SpecNode::Or(_) => "or",
        }
    }
}

impl<F: Fragment + Lookahead> SpecNode<F> {
    /// Largest number of steps any atomic reads ahead of its evaluation time.
    pub fn max_lookahead(&self) -> usize {
        self.atomics()
            .into_iter()
            .map(Lookahead::lookahead)
            .max()
            .unwrap_or(0)
    }
}

impl<F: Fragment> PartialEq for SpecNode<F> {
    fn eq(&self, other: &Self) -> bool {
        if self.tag() != other.tag() {
            return false;
        }
        match (self, other) {
            (SpecNode::Atomic { fragment: a, .. }, SpecNode::Atomic { fragment: b, .. }) => {
                a.equivalent(b)
            }
            (SpecNode::Not(a), SpecNode::Not(b))
            | (SpecNode::Always(a), SpecNode::Always(b))
            | (SpecNode::Eventually(a), SpecNode::Eventually(b))
            | (SpecNode::Next(a), SpecNode::Next(b)) => a == b,
            (SpecNode::Until(l1, r1), SpecNode::Until(l2, r2))
            | (SpecNode::Implies(l1, r1), SpecNode::Implies(l2, r2)) => l1 == l2 && r1 == r2,
            (SpecNode::And(a), SpecNode::And(b)) | (SpecNode::Or(a), SpecNode::Or(b)) => a == b,
            _ => false,
        }
    }
}

impl<F: Fragment> fmt::Display for SpecNode<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecNode::Atomic { text, .. } => write!(f, "{}", text.as_deref().unwrap_or("Atomic")),
            SpecNode::Not(req) => write!(f, "not ({req})"),
            SpecNode::Always(req) => write!(f, "always ({req})"),
            SpecNode::Eventually(req) => write!(f, "eventually ({req})"),
            SpecNode::Next(req) => write!(f, "next ({req})"),
            SpecNode::Until(lhs, rhs) => write!(f, "({lhs}) until ({rhs})"),
            SpecNode::Implies(lhs, rhs) => write!(f, "({lhs}) implies ({rhs})"),
            SpecNode::And(reqs) => write_joined(f, reqs, " and "),
            SpecNode::Or(reqs) => write_joined(f, reqs, " or "),
        }
    }
}

fn write_joined<F: Fragment>(
    f: &mut fmt::Formatter<'_>,
    reqs: &[SpecNode<F>],
    sep: &str,
) -> fmt::Result {
    for (i, req) in reqs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({req})")?;
    }
    Ok(())
}

/// Deduplicating store of atomic fragments, addressed by syntax id.
#[derive(Debug, Clone)]
pub struct FragmentTable<F> {
    slots: Vec<F>,
}

impl<F: Fragment> FragmentTable<F> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Id of an equivalent stored fragment, or of `fragment` newly appended.
    pub fn intern(&mut self, fragment: F) -> usize {
        if let Some(id) = self.slots.iter().position(|f| f.equivalent(&fragment)) {
            return id;
        }
        self.slots.push(fragment);
        self.slots.len() - 1
    }

    pub fn get(&self, id: usize) -> Option<&F> {
        self.slots.get(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn as_slice(&self) -> &[F] {
        &self.slots
    }
}

impl<F: Fragment> Default for FragmentTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contrail_ir::expr::{Literal, OpKind, Span};

    fn speed_below(limit: i64) -> Expr {
        Expr::op(
            OpKind::Lt,
            vec![Expr::stream("speed"), Expr::literal(Literal::Int(limit))],
        )
    }

    #[test]
    fn test_equality_ignores_spans() {
        let a = SpecNode::atomic(speed_below(30), Some("speed < 30"));
        let b = SpecNode::atomic(
            speed_below(30).with_span(Span::new(4, 2, 4, 12)),
            Some("other text"),
        );
        assert_eq!(a, b);
        assert_ne!(a, SpecNode::atomic(speed_below(31), None));
    }

    #[test]
    fn test_equality_checks_tags() {
        let inner = SpecNode::atomic(speed_below(30), None);
        let always = SpecNode::Always(Box::new(inner.clone()));
        let eventually = SpecNode::Eventually(Box::new(inner));
        assert_ne!(always, eventually);
        assert_eq!(always, always.clone());
    }

    #[test]
    fn test_intern_dedupes_equivalent_fragments() {
        let mut table = FragmentTable::new();
        assert_eq!(table.intern(speed_below(30)), 0);
        assert_eq!(table.intern(speed_below(40)), 1);
        assert_eq!(
            table.intern(speed_below(30).with_span(Span::new(9, 9, 9, 20))),
            0
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unknown_fragment_rejected() {
        let prop = Proposition::always(Proposition::atomic(3, None));
        let err = SpecNode::<Expr>::from_proposition(&prop, &[speed_below(30)]).unwrap_err();
        assert_eq!(err, SpecError::UnknownFragment { id: 3, len: 1 });
    }

    #[test]
    fn test_max_lookahead() {
        let next_speed = Expr::op(
            OpKind::Gt,
            vec![Expr::stream_at("speed", 2), Expr::stream("speed")],
        );
        let node = SpecNode::And(vec![
            SpecNode::atomic(speed_below(30), None),
            SpecNode::Always(Box::new(SpecNode::atomic(next_speed, None))),
        ]);
        assert_eq!(node.max_lookahead(), 2);
    }
}
