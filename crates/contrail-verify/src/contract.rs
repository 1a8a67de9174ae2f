//! Compiled assume/guarantee contracts.

use indexmap::IndexMap;

use contrail_component::component::{Component, PortMap};
use contrail_ir::contract::ContractDecl;
use contrail_ir::expr::Expr;
use contrail_ir::parse::{parse_contract, ParseError};
use contrail_ir::types::ValueType;
use contrail_spec::spec::{SpecError, SpecNode};

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("Contract '{contract}' must bind exactly one object, found {count}")]
    ObjectCount { contract: String, count: usize },

    #[error("Unrecognized global value '{name}'")]
    UnknownGlobal { name: String },

    #[error("Stream '{name}' is bound more than once")]
    DuplicateStream { name: String },

    #[error("Contract {kind} '{port}' is not declared by component '{component}'")]
    UnknownPort {
        kind: &'static str,
        port: String,
        component: String,
    },

    #[error("Contract {kind} '{port}' has type {expected}, component '{component}' declares {actual}")]
    PortType {
        kind: &'static str,
        port: String,
        component: String,
        expected: ValueType,
        actual: ValueType,
    },
}

/// A world global exposed to a contract as a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Global {
    /// Every object of the scene.
    Objects,
    /// The scene's workspace region.
    Workspace,
}

impl Global {
    pub fn parse(name: &str) -> Result<Self, ContractError> {
        match name {
            "objects" => Ok(Global::Objects),
            "workspace" => Ok(Global::Workspace),
            other => Err(ContractError::UnknownGlobal {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Global::Objects => "objects",
            Global::Workspace => "workspace",
        }
    }
}

/// A contract ready to be checked against simulations.
#[derive(Debug, Clone)]
pub struct Contract {
    pub name: String,
    /// Stream name bound to the component's linked object.
    pub object: String,
    pub globals: Vec<Global>,
    pub inputs: PortMap,
    pub outputs: PortMap,
    /// Derived streams in declaration order.
    pub definitions: IndexMap<String, Expr>,
    pub assumptions: Vec<SpecNode<Expr>>,
    pub guarantees: Vec<SpecNode<Expr>>,
    lookahead_override: Option<usize>,
}

impl Contract {
    pub fn new(name: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object: object.into(),
            globals: Vec::new(),
            inputs: PortMap::new(),
            outputs: PortMap::new(),
            definitions: IndexMap::new(),
            assumptions: Vec::new(),
            guarantees: Vec::new(),
            lookahead_override: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ContractError> {
        Self::from_decl(&parse_contract(json)?)
    }

    pub fn from_decl(decl: &ContractDecl) -> Result<Self, ContractError> {
        let object = match decl.objects.as_slice() {
            [object] => object.clone(),
            objects => {
                return Err(ContractError::ObjectCount {
                    contract: decl.name.clone(),
                    count: objects.len(),
                })
            }
        };

        let globals = decl
            .globals
            .iter()
            .map(|name| Global::parse(name))
            .collect::<Result<Vec<_>, _>>()?;

        let build = |props: &[contrail_ir::prop::Proposition]| {
            props
                .iter()
                .map(|p| SpecNode::from_proposition(p, &decl.fragments))
                .collect::<Result<Vec<_>, _>>()
        };

        let contract = Contract {
            name: decl.name.clone(),
            object,
            globals,
            inputs: decl.inputs.clone(),
            outputs: decl.outputs.clone(),
            definitions: decl.definitions.clone(),
            assumptions: build(&decl.assumptions)?,
            guarantees: build(&decl.guarantees)?,
            lookahead_override: decl.max_lookahead,
        };
        contract.check_stream_names()?;
        Ok(contract)
    }

    pub fn with_global(mut self, global: Global) -> Self {
        self.globals.push(global);
        self
    }

    pub fn with_input(mut self, name: &str, ty: ValueType) -> Self {
        self.inputs.insert(name.to_string(), ty);
        self
    }

    pub fn with_output(mut self, name: &str, ty: ValueType) -> Self {
        self.outputs.insert(name.to_string(), ty);
        self
    }

    pub fn with_definition(mut self, name: &str, expr: Expr) -> Self {
        self.definitions.insert(name.to_string(), expr);
        self
    }

    pub fn assume(mut self, node: SpecNode<Expr>) -> Self {
        self.assumptions.push(node);
        self
    }

    pub fn guarantee(mut self, node: SpecNode<Expr>) -> Self {
        self.guarantees.push(node);
        self
    }

    pub fn with_max_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead_override = Some(lookahead);
        self
    }

    /// Stream names in binding order: object, globals, inputs, outputs,
    /// definitions.
    pub fn stream_names(&self) -> Vec<&str> {
        std::iter::once(self.object.as_str())
            .chain(self.globals.iter().map(|g| g.name()))
            .chain(self.inputs.keys().map(String::as_str))
            .chain(self.outputs.keys().map(String::as_str))
            .chain(self.definitions.keys().map(String::as_str))
            .collect()
    }

    pub fn check_stream_names(&self) -> Result<(), ContractError> {
        let mut seen = std::collections::HashSet::new();
        for name in self.stream_names() {
            if !seen.insert(name) {
                return Err(ContractError::DuplicateStream {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Steps a monitor may need to look ahead of the step it judges.
    ///
    /// Reads of a derived stream count that stream's own lookahead.
    pub fn max_lookahead(&self) -> usize {
        if let Some(lookahead) = self.lookahead_override {
            return lookahead;
        }
        let mut derived: IndexMap<&str, usize> = IndexMap::new();
        for (name, expr) in &self.definitions {
            let lookahead = expr_lookahead(expr, &derived);
            derived.insert(name.as_str(), lookahead);
        }
        self.assumptions
            .iter()
            .chain(&self.guarantees)
            .flat_map(|node| node.atomics())
            .map(|expr| expr_lookahead(expr, &derived))
            .max()
            .unwrap_or(0)
    }

    /// Check that every contract input and output is a port of `component`
    /// with the same type.
    pub fn check_component(&self, component: &Component) -> Result<(), ContractError> {
        let sides: [(&'static str, &PortMap, &PortMap); 2] = [
            ("input", &self.inputs, component.inputs()),
            ("output", &self.outputs, component.outputs()),
        ];
        for (kind, wanted, declared) in sides {
            for (port, expected) in wanted {
                let actual = declared.get(port).ok_or_else(|| ContractError::UnknownPort {
                    kind,
                    port: port.clone(),
                    component: component.name().to_string(),
                })?;
                if actual != expected {
                    return Err(ContractError::PortType {
                        kind,
                        port: port.clone(),
                        component: component.name().to_string(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn expr_lookahead(expr: &Expr, derived: &IndexMap<&str, usize>) -> usize {
    match expr {
        Expr::Literal { .. } => 0,
        Expr::Stream { name, offset, .. } => {
            (*offset).max(0) as usize + derived.get(name.as_str()).copied().unwrap_or(0)
        }
        Expr::Field { base, .. } => expr_lookahead(base, derived),
        Expr::Op { args, .. } => args
            .iter()
            .map(|arg| expr_lookahead(arg, derived))
            .max()
            .unwrap_or(0),
    }
}
