pub mod contract;
pub mod expr;
pub mod parse;
pub mod prop;
pub mod types;

pub use contract::ContractDecl;
pub use expr::{Expr, Literal, OpKind, Span};
pub use parse::parse_contract;
pub use prop::Proposition;
pub use types::{Action, SceneObject, Value, ValueType};
