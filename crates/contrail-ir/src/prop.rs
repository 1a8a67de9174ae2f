use serde::{Deserialize, Serialize};

/// Proposition skeleton as produced by a front end.
///
/// Atomic leaves refer to a shared fragment table by index instead of owning
/// their expression; the table travels alongside the skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Proposition {
    Atomic {
        syntax_id: usize,
        #[serde(default)]
        source: Option<String>,
    },
    Not {
        req: Box<Proposition>,
    },
    Always {
        req: Box<Proposition>,
    },
    Eventually {
        req: Box<Proposition>,
    },
    Next {
        req: Box<Proposition>,
    },
    Until {
        lhs: Box<Proposition>,
        rhs: Box<Proposition>,
    },
    Implies {
        lhs: Box<Proposition>,
        rhs: Box<Proposition>,
    },
    And {
        reqs: Vec<Proposition>,
    },
    Or {
        reqs: Vec<Proposition>,
    },
}

impl Proposition {
    pub fn atomic(syntax_id: usize, source: Option<&str>) -> Self {
        Proposition::Atomic {
            syntax_id,
            source: source.map(str::to_string),
        }
    }

    pub fn not(req: Proposition) -> Self {
        Proposition::Not { req: Box::new(req) }
    }

    pub fn always(req: Proposition) -> Self {
        Proposition::Always { req: Box::new(req) }
    }

    pub fn eventually(req: Proposition) -> Self {
        Proposition::Eventually { req: Box::new(req) }
    }

    pub fn next(req: Proposition) -> Self {
        Proposition::Next { req: Box::new(req) }
    }

    pub fn until(lhs: Proposition, rhs: Proposition) -> Self {
        Proposition::Until {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn implies(lhs: Proposition, rhs: Proposition) -> Self {
        Proposition::Implies {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(reqs: Vec<Proposition>) -> Self {
        Proposition::And { reqs }
    }

    pub fn or(reqs: Vec<Proposition>) -> Self {
        Proposition::Or { reqs }
    }

    /// All fragment ids referenced by atomic leaves, in traversal order.
    pub fn syntax_ids(&self) -> Vec<usize> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<usize>) {
        match self {
            Proposition::Atomic { syntax_id, .. } => ids.push(*syntax_id),
            Proposition::Not { req }
            | Proposition::Always { req }
            | Proposition::Eventually { req }
            | Proposition::Next { req } => req.collect_ids(ids),
            Proposition::Until { lhs, rhs } | Proposition::Implies { lhs, rhs } => {
                lhs.collect_ids(ids);
                rhs.collect_ids(ids);
            }
            Proposition::And { reqs } | Proposition::Or { reqs } => {
                for req in reqs {
                    req.collect_ids(ids);
                }
            }
        }
    }
}
