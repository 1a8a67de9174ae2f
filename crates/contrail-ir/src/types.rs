use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Runtime values flowing through components, windows and expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vector { x: f64, y: f64 },
    Action(Action),
    Object(SceneObject),
    List(Vec<Value>),
}

impl Value {
    /// Name of the value's runtime type, for error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Vector { .. } => "vector".to_string(),
            Value::Action(a) => format!("action:{}", a.kind),
            Value::Object(_) => "object".to_string(),
            Value::List(_) => "list".to_string(),
        }
    }

    /// Numeric view used by arithmetic and ordering. Ints widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Vector { x, y } => write!(f, "({x}, {y})"),
            Value::Action(a) => write!(f, "{a}"),
            Value::Object(o) => match &o.name {
                Some(name) => write!(f, "{}<{}>", o.class, name),
                None => write!(f, "{}", o.class),
            },
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A command emitted towards the simulator, e.g. `Brake(0.5)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// An object of the simulated world with named, typed fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneObject {
    #[serde(default)]
    pub name: Option<String>,
    pub class: String,
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
}

impl SceneObject {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            name: None,
            class: class.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn get_field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set_field(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }
}

/// Declared type of a port, sensor or state variable.
///
/// Every variant is concrete; placeholder names are rejected when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Vector,
    /// An action of the named kind.
    Action(String),
    Object,
    List,
}

impl ValueType {
    /// Runtime type check, the analogue of an `isinstance` test.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Bool, Value::Bool(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Float, Value::Float(_))
            | (ValueType::Str, Value::Str(_))
            | (ValueType::Vector, Value::Vector { .. })
            | (ValueType::Object, Value::Object(_))
            | (ValueType::List, Value::List(_)) => true,
            (ValueType::Action(kind), Value::Action(action)) => *kind == action.kind,
            _ => false,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, ValueType::Action(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::Str => write!(f, "str"),
            ValueType::Vector => write!(f, "vector"),
            ValueType::Action(kind) => write!(f, "action:{kind}"),
            ValueType::Object => write!(f, "object"),
            ValueType::List => write!(f, "list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeParseError {
    #[error("'{name}' is a placeholder, not a concrete type")]
    Placeholder { name: String },

    #[error("Unknown type name '{name}'")]
    Unknown { name: String },

    #[error("Action type '{name}' is missing its kind")]
    MissingActionKind { name: String },
}

impl FromStr for ValueType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        match name {
            "bool" => Ok(ValueType::Bool),
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "str" => Ok(ValueType::Str),
            "vector" => Ok(ValueType::Vector),
            "object" => Ok(ValueType::Object),
            "list" => Ok(ValueType::List),
            "_" | "any" | "" => Err(TypeParseError::Placeholder {
                name: name.to_string(),
            }),
            other => match other.strip_prefix("action:") {
                Some(kind) if !kind.trim().is_empty() => {
                    Ok(ValueType::Action(kind.trim().to_string()))
                }
                Some(_) => Err(TypeParseError::MissingActionKind {
                    name: other.to_string(),
                }),
                None => Err(TypeParseError::Unknown {
                    name: other.to_string(),
                }),
            },
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
