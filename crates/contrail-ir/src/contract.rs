use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::prop::Proposition;
use crate::types::ValueType;

/// Declarative form of an assume/guarantee contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDecl {
    pub name: String,
    /// Stream names bound to the component's linked object. Exactly one.
    pub objects: Vec<String>,
    /// World globals exposed as streams (`objects`, `workspace`).
    #[serde(default)]
    pub globals: Vec<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, ValueType>,
    #[serde(default)]
    pub outputs: IndexMap<String, ValueType>,
    /// Derived streams, evaluated lazily in declaration order.
    #[serde(default)]
    pub definitions: IndexMap<String, Expr>,
    /// Deduplicated atomic fragments referenced by `syntax_id`.
    #[serde(default)]
    pub fragments: Vec<Expr>,
    #[serde(default)]
    pub assumptions: Vec<Proposition>,
    #[serde(default)]
    pub guarantees: Vec<Proposition>,
    /// Overrides the lookahead derived from stream offsets.
    #[serde(default)]
    pub max_lookahead: Option<usize>,
}
