use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Source position of an expression node.
///
/// Purely informational: two expressions that differ only in spans are
/// [`Expr::equivalent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub end_col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            line,
            col,
            end_line,
            end_col,
        }
    }
}

/// A boolean or value-producing expression over named value streams.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Literal {
        value: Literal,
        span: Span,
    },
    /// Stream `name` sampled at `t + offset` for the evaluation time `t`.
    Stream {
        name: String,
        offset: i64,
        span: Span,
    },
    Field {
        base: Box<Expr>,
        field: String,
        span: Span,
    },
    Op {
        op: OpKind,
        args: Vec<Expr>,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Not,
    Implies,
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
}

impl OpKind {
    fn from_tag(tag: &str) -> Option<Self> {
        let op = match tag {
            "eq" => OpKind::Eq,
            "neq" => OpKind::Neq,
            "lt" => OpKind::Lt,
            "lte" => OpKind::Lte,
            "gt" => OpKind::Gt,
            "gte" => OpKind::Gte,
            "and" => OpKind::And,
            "or" => OpKind::Or,
            "not" => OpKind::Not,
            "implies" => OpKind::Implies,
            "add" => OpKind::Add,
            "sub" => OpKind::Sub,
            "mul" => OpKind::Mul,
            "div" => OpKind::Div,
            "neg" => OpKind::Neg,
            "abs" => OpKind::Abs,
            _ => return None,
        };
        Some(op)
    }
}

impl Expr {
    pub fn literal(value: Literal) -> Self {
        Expr::Literal {
            value,
            span: Span::default(),
        }
    }

    pub fn stream(name: impl Into<String>) -> Self {
        Self::stream_at(name, 0)
    }

    pub fn stream_at(name: impl Into<String>, offset: i64) -> Self {
        Expr::Stream {
            name: name.into(),
            offset,
            span: Span::default(),
        }
    }

    pub fn field(base: Expr, field: impl Into<String>) -> Self {
        Expr::Field {
            base: Box::new(base),
            field: field.into(),
            span: Span::default(),
        }
    }

    pub fn op(op: OpKind, args: Vec<Expr>) -> Self {
        Expr::Op {
            op,
            args,
            span: Span::default(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Stream { span, .. }
            | Expr::Field { span, .. }
            | Expr::Op { span, .. } => *span,
        }
    }

    pub fn with_span(mut self, new_span: Span) -> Self {
        match &mut self {
            Expr::Literal { span, .. }
            | Expr::Stream { span, .. }
            | Expr::Field { span, .. }
            | Expr::Op { span, .. } => *span = new_span,
        }
        self
    }

    /// Structural equality that ignores source spans.
    pub fn equivalent(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Literal { value: a, .. }, Expr::Literal { value: b, .. }) => a == b,
            (
                Expr::Stream {
                    name: n1,
                    offset: o1,
                    ..
                },
                Expr::Stream {
                    name: n2,
                    offset: o2,
                    ..
                },
            ) => n1 == n2 && o1 == o2,
            (
                Expr::Field {
                    base: b1,
                    field: f1,
                    ..
                },
                Expr::Field {
                    base: b2,
                    field: f2,
                    ..
                },
            ) => f1 == f2 && b1.equivalent(b2),
            (
                Expr::Op {
                    op: op1, args: a1, ..
                },
                Expr::Op {
                    op: op2, args: a2, ..
                },
            ) => {
                op1 == op2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| x.equivalent(y))
            }
            _ => false,
        }
    }

    /// Largest non-negative stream offset read by this expression.
    pub fn max_offset(&self) -> usize {
        match self {
            Expr::Literal { .. } => 0,
            Expr::Stream { offset, .. } => (*offset).max(0) as usize,
            Expr::Field { base, .. } => base.max_offset(),
            Expr::Op { args, .. } => args.iter().map(Expr::max_offset).max().unwrap_or(0),
        }
    }

    /// Names of all streams the expression reads.
    pub fn streams(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_streams(&mut names);
        names
    }

    fn collect_streams(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Literal { .. } => {}
            Expr::Stream { name, .. } => {
                names.insert(name.clone());
            }
            Expr::Field { base, .. } => base.collect_streams(names),
            Expr::Op { args, .. } => {
                for arg in args {
                    arg.collect_streams(names);
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        parse_expr(&value).map_err(serde::de::Error::custom)
    }
}

fn parse_expr(value: &serde_json::Value) -> Result<Expr, String> {
    match value {
        serde_json::Value::Bool(b) => Ok(Expr::literal(Literal::Bool(*b))),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Expr::literal(Literal::Int(i)))
            } else {
                let f = n.as_f64().ok_or_else(|| format!("unsupported number: {n}"))?;
                Ok(Expr::literal(Literal::Float(f)))
            }
        }
        serde_json::Value::String(s) => Ok(Expr::literal(Literal::Str(s.clone()))),

        // Span wrapper: {"expr": ..., "span": {...}}
        serde_json::Value::Object(obj) => {
            let inner = obj
                .get("expr")
                .ok_or("expression object must have an 'expr' key")?;
            let expr = parse_expr(inner)?;
            match obj.get("span") {
                Some(span) => {
                    let span: Span = serde_json::from_value(span.clone())
                        .map_err(|e| format!("invalid span: {e}"))?;
                    Ok(expr.with_span(span))
                }
                None => Ok(expr),
            }
        }

        // Array forms: ["tag", ...args]
        serde_json::Value::Array(arr) => {
            if arr.is_empty() {
                return Err("empty expression array".to_string());
            }
            let tag = arr[0].as_str().ok_or_else(|| {
                format!(
                    "first element of expression array must be a string, got: {:?}",
                    arr[0]
                )
            })?;

            match tag {
                // ["stream", name] or ["stream", name, offset]
                "stream" => {
                    if arr.len() < 2 || arr.len() > 3 {
                        return Err(format!(
                            "stream expression requires 2-3 elements, got {}",
                            arr.len()
                        ));
                    }
                    let name = arr[1].as_str().ok_or("stream name must be a string")?;
                    let offset = match arr.get(2) {
                        Some(v) => v.as_i64().ok_or("stream offset must be an integer")?,
                        None => 0,
                    };
                    Ok(Expr::stream_at(name, offset))
                }

                // ["field", base, field_name]
                "field" => {
                    if arr.len() != 3 {
                        return Err(format!(
                            "field expression requires 3 elements, got {}",
                            arr.len()
                        ));
                    }
                    let base = parse_expr(&arr[1])?;
                    let field = arr[2].as_str().ok_or("field name must be a string")?;
                    Ok(Expr::field(base, field))
                }

                _ => {
                    let op = OpKind::from_tag(tag)
                        .ok_or_else(|| format!("unknown expression operator: {tag}"))?;
                    let args = arr[1..]
                        .iter()
                        .map(parse_expr)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Expr::op(op, args))
                }
            }
        }

        other => Err(format!("unsupported expression value: {other}")),
    }
}
