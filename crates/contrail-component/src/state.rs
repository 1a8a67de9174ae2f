use indexmap::IndexMap;

use contrail_ir::types::{Value, ValueType};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("Attempted to access non-existent state variable '{name}'")]
    Undeclared { name: String },

    #[error("State variable '{name}' has not been initialized")]
    Unset { name: String },

    #[error("Attempted to set state variable '{name}' of type {expected} to {value} of type {actual}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        actual: String,
        value: String,
    },
}

/// Persistent memory of a leaf component.
///
/// The key set and the type of every key are fixed at construction; all
/// reads and writes are checked against that schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentState {
    types: IndexMap<String, ValueType>,
    values: IndexMap<String, Value>,
}

impl ComponentState {
    pub fn new(types: IndexMap<String, ValueType>) -> Self {
        Self {
            types,
            values: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Value, StateError> {
        if !self.types.contains_key(name) {
            return Err(StateError::Undeclared {
                name: name.to_string(),
            });
        }
        self.values.get(name).ok_or_else(|| StateError::Unset {
            name: name.to_string(),
        })
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), StateError> {
        let expected = self.types.get(name).ok_or_else(|| StateError::Undeclared {
            name: name.to_string(),
        })?;
        if !expected.matches(&value) {
            return Err(StateError::TypeMismatch {
                name: name.to_string(),
                expected: expected.clone(),
                actual: value.type_name(),
                value: value.to_string(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Convenience accessor for numeric state.
    pub fn get_f64(&self, name: &str) -> Result<f64, StateError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| StateError::TypeMismatch {
            name: name.to_string(),
            expected: ValueType::Float,
            actual: value.type_name(),
            value: value.to_string(),
        })
    }

    pub fn declared(&self) -> impl Iterator<Item = (&String, &ValueType)> {
        self.types.iter()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_state() -> ComponentState {
        let mut types = IndexMap::new();
        types.insert("count".to_string(), ValueType::Int);
        ComponentState::new(types)
    }

    #[test]
    fn test_set_and_get_declared() {
        let mut state = counter_state();
        state.set("count", Value::Int(3)).unwrap();
        assert_eq!(state.get("count").unwrap(), &Value::Int(3));
        assert_eq!(state.get_f64("count").unwrap(), 3.0);
    }

    #[test]
    fn test_undeclared_access_fails() {
        let mut state = counter_state();
        assert!(matches!(
            state.get("missing"),
            Err(StateError::Undeclared { .. })
        ));
        assert!(matches!(
            state.set("missing", Value::Int(1)),
            Err(StateError::Undeclared { .. })
        ));
    }

    #[test]
    fn test_write_is_type_checked() {
        let mut state = counter_state();
        let err = state.set("count", Value::Float(1.5)).unwrap_err();
        assert!(matches!(err, StateError::TypeMismatch { .. }));
        assert!(matches!(state.get("count"), Err(StateError::Unset { .. })));
    }
}
