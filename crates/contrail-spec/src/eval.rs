//! Evaluation of [`Expr`] fragments against value windows.

use contrail_ir::expr::{Expr, Literal, OpKind};
use contrail_ir::types::Value;

use crate::spec::Fragment;
use crate::window::{LazyFn, StreamSource, WindowError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("Operator {op:?} expects {expected} operands, got {actual}")]
    Arity {
        op: OpKind,
        expected: usize,
        actual: usize,
    },

    #[error("Operator {op:?} cannot be applied to {operands}")]
    Type { op: OpKind, operands: String },

    #[error("Value {value} has no field '{field}'")]
    NoField { value: String, field: String },

    #[error("Integer overflow in {op:?}")]
    Overflow { op: OpKind },

    #[error("Expression evaluated to {value}, not a boolean")]
    NotBoolean { value: String },
}

impl EvalError {
    /// Time of a not-yet-available window read, if this is one.
    pub fn unavailable_time(&self) -> Option<usize> {
        match self {
            EvalError::Window(err) => err.unavailable_time(),
            _ => None,
        }
    }
}

/// Fragments a monitor can decide at a time index.
pub trait Evaluate: Fragment {
    fn holds(&self, time: usize, source: &dyn StreamSource) -> Result<bool, EvalError>;
}

impl Evaluate for Expr {
    fn holds(&self, time: usize, source: &dyn StreamSource) -> Result<bool, EvalError> {
        match evaluate(self, time, source)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean {
                value: other.to_string(),
            }),
        }
    }
}

/// Evaluate `expr` with stream reads anchored at `time`.
///
/// A read before the start of the trace sees the first sample.
pub fn evaluate(expr: &Expr, time: usize, source: &dyn StreamSource) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal { value, .. } => Ok(literal_value(value)),
        Expr::Stream { name, offset, .. } => {
            let at = (time as i64).saturating_add(*offset).max(0);
            Ok(source.sample(name, at as usize)?)
        }
        Expr::Field { base, field, .. } => {
            let base = evaluate(base, time, source)?;
            field_value(&base, field)
        }
        Expr::Op { op, args, .. } => apply(*op, args, time, source),
    }
}

/// A lazy window computing a derived stream from the windows bound before it.
///
/// Window errors pass through unchanged so an unavailable read stays
/// distinguishable; any other failure becomes a sampling error of `name`.
pub fn lazy_definition(name: &str, expr: Expr) -> LazyFn {
    let name = name.to_string();
    Box::new(move |time, view| match evaluate(&expr, time, view) {
        Ok(value) => Ok(value),
        Err(EvalError::Window(err)) => Err(err),
        Err(err) => Err(WindowError::Sample {
            name: name.clone(),
            message: err.to_string(),
        }),
    })
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn field_value(base: &Value, field: &str) -> Result<Value, EvalError> {
    let missing = || EvalError::NoField {
        value: base.to_string(),
        field: field.to_string(),
    };
    match base {
        Value::Object(obj) => obj.get_field(field).cloned().ok_or_else(missing),
        Value::Vector { x, .. } if field == "x" => Ok(Value::Float(*x)),
        Value::Vector { y, .. } if field == "y" => Ok(Value::Float(*y)),
        Value::Action(action) if field == "kind" => Ok(Value::Str(action.kind.clone())),
        Value::List(items) if field == "len" => Ok(Value::Int(items.len() as i64)),
        _ => Err(missing()),
    }
}

fn apply(
    op: OpKind,
    args: &[Expr],
    time: usize,
    source: &dyn StreamSource,
) -> Result<Value, EvalError> {
    match op {
        // Short-circuit so a guard can protect an unavailable read.
        OpKind::And | OpKind::Or => {
            let stop_on = op == OpKind::Or;
            for arg in args {
                if as_bool(op, &evaluate(arg, time, source)?)? == stop_on {
                    return Ok(Value::Bool(stop_on));
                }
            }
            Ok(Value::Bool(!stop_on))
        }
        OpKind::Implies => {
            let [lhs, rhs] = binary(op, args)?;
            if !as_bool(op, &evaluate(lhs, time, source)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(as_bool(op, &evaluate(rhs, time, source)?)?))
        }
        OpKind::Not => {
            let [arg] = unary(op, args)?;
            Ok(Value::Bool(!as_bool(op, &evaluate(arg, time, source)?)?))
        }
        OpKind::Neg | OpKind::Abs => {
            let [arg] = unary(op, args)?;
            match evaluate(arg, time, source)? {
                Value::Int(i) => {
                    let out = if op == OpKind::Neg {
                        i.checked_neg()
                    } else {
                        i.checked_abs()
                    };
                    out.map(Value::Int).ok_or(EvalError::Overflow { op })
                }
                Value::Float(f) => Ok(Value::Float(if op == OpKind::Neg { -f } else { f.abs() })),
                other => Err(type_error(op, &[other])),
            }
        }
        OpKind::Eq | OpKind::Neq => {
            let [lhs, rhs] = binary(op, args)?;
            let lhs = evaluate(lhs, time, source)?;
            let rhs = evaluate(rhs, time, source)?;
            let equal = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => lhs == rhs,
            };
            Ok(Value::Bool(equal == (op == OpKind::Eq)))
        }
        OpKind::Lt | OpKind::Lte | OpKind::Gt | OpKind::Gte => {
            let [lhs, rhs] = binary(op, args)?;
            let lhs = evaluate(lhs, time, source)?;
            let rhs = evaluate(rhs, time, source)?;
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(type_error(op, &[lhs, rhs])),
            };
            let result = match op {
                OpKind::Lt => a < b,
                OpKind::Lte => a <= b,
                OpKind::Gt => a > b,
                _ => a >= b,
            };
            Ok(Value::Bool(result))
        }
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => {
            let [lhs, rhs] = binary(op, args)?;
            let lhs = evaluate(lhs, time, source)?;
            let rhs = evaluate(rhs, time, source)?;
            arithmetic(op, lhs, rhs)
        }
    }
}

fn arithmetic(op: OpKind, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) if op != OpKind::Div => {
            let out = match op {
                OpKind::Add => a.checked_add(*b),
                OpKind::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            out.map(Value::Int).ok_or(EvalError::Overflow { op })
        }
        (Value::Vector { x: x1, y: y1 }, Value::Vector { x: x2, y: y2 })
            if matches!(op, OpKind::Add | OpKind::Sub) =>
        {
            let sign = if op == OpKind::Add { 1.0 } else { -1.0 };
            Ok(Value::Vector {
                x: x1 + sign * x2,
                y: y1 + sign * y2,
            })
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                OpKind::Add => a + b,
                OpKind::Sub => a - b,
                OpKind::Mul => a * b,
                _ => a / b,
            })),
            _ => Err(type_error(op, &[lhs, rhs])),
        },
    }
}

fn as_bool(op: OpKind, value: &Value) -> Result<bool, EvalError> {
    value
        .as_bool()
        .ok_or_else(|| type_error(op, std::slice::from_ref(value)))
}

fn type_error(op: OpKind, operands: &[Value]) -> EvalError {
    let operands = operands
        .iter()
        .map(Value::type_name)
        .collect::<Vec<_>>()
        .join(", ");
    EvalError::Type { op, operands }
}

fn unary(op: OpKind, args: &[Expr]) -> Result<[&Expr; 1], EvalError> {
    match args {
        [arg] => Ok([arg]),
        _ => Err(EvalError::Arity {
            op,
            expected: 1,
            actual: args.len(),
        }),
    }
}

fn binary(op: OpKind, args: &[Expr]) -> Result<[&Expr; 2], EvalError> {
    match args {
        [lhs, rhs] => Ok([lhs, rhs]),
        _ => Err(EvalError::Arity {
            op,
            expected: 2,
            actual: args.len(),
        }),
    }
}
