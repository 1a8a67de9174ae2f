//! Typed dataflow components.
//!
//! A component computes one discrete control step. Leaves either transform
//! inputs and sensor readings into outputs ([`BaseLeaf`]) or surface actions
//! to the simulator ([`ActionLeaf`]); a [`Composite`] wires subcomponents
//! together and runs them in a fixed topological order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use tracing::{trace, warn};

use contrail_ir::types::{Action, TypeParseError, Value, ValueType};

use crate::graph::{DataflowGraph, GraphError, SELF_INPUT, SELF_OUTPUT};
use crate::scene::{lookup_linked_object, LinkError, ObjectHandle, Scene};
use crate::state::{ComponentState, StateError};

/// Declared ports (or state variables) in declaration order.
pub type PortMap = IndexMap<String, ValueType>;
/// Concrete values keyed by port name.
pub type Values = IndexMap<String, Value>;
/// Constant parameters fixed at construction.
pub type Params = IndexMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("{message}")]
    Failed { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("Invalid type declaration: {0}")]
    TypeParse(#[from] TypeParseError),

    #[error("Component '{component}': input '{port}' of an action component must be an action type, got {declared}")]
    NonActionInput {
        component: String,
        port: String,
        declared: ValueType,
    },

    #[error("Component '{component}': expected inputs {expected:?}, got {actual:?}")]
    InputMismatch {
        component: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Component '{component}': undeclared input '{port}'")]
    UndeclaredInput { component: String, port: String },

    #[error("Component '{component}': input '{port}' expects {expected}, got {actual}")]
    InputType {
        component: String,
        port: String,
        expected: ValueType,
        actual: String,
    },

    #[error("Component '{component}': expected outputs {expected:?}, got {actual:?}")]
    OutputMismatch {
        component: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Component '{component}': output '{port}' expects {expected}, got {actual}")]
    OutputType {
        component: String,
        port: String,
        expected: ValueType,
        actual: String,
    },

    #[error("Component '{component}': sensor '{sensor}' read before the component was linked")]
    SensorUnbound { component: String, sensor: String },

    #[error("Component '{component}': linked object has no field '{field}' for sensor '{sensor}'")]
    MissingSensorField {
        component: String,
        sensor: String,
        field: String,
    },

    #[error("Component '{component}': sensor '{sensor}' expects {expected}, got {actual}")]
    SensorType {
        component: String,
        sensor: String,
        expected: ValueType,
        actual: String,
    },

    #[error("Component '{component}' has no transition function")]
    MissingTransition { component: String },

    #[error("Component '{component}': transition failed: {source}")]
    Transition {
        component: String,
        source: TransitionError,
    },

    #[error("Component '{component}': invalid initial state: {source}")]
    InitialState {
        component: String,
        source: StateError,
    },

    #[error("Component '{component}': '{name}' is a reserved dataflow node name")]
    ReservedName { component: String, name: String },

    #[error("Component '{component}': unknown subcomponent '{name}'")]
    UnknownSubcomponent { component: String, name: String },

    #[error("Component '{component}': unknown port {port}")]
    UnknownPort { component: String, port: Port },

    #[error("Component '{component}': cannot connect {source_port} ({source_type}) to {target_port} ({target_type})")]
    PortTypeMismatch {
        component: String,
        source_port: Port,
        target_port: Port,
        source_type: ValueType,
        target_type: ValueType,
    },

    #[error("Component '{component}': port {port} has more than one source")]
    DuplicateSource { component: String, port: Port },

    #[error("Component '{component}': port {port} has no source")]
    MissingSource { component: String, port: Port },

    #[error("Component '{component}': {source}")]
    Graph {
        component: String,
        source: GraphError,
    },

    #[error("Component '{component}': {source}")]
    Link {
        component: String,
        source: LinkError,
    },

    #[error("Behavior component '{component}' must not declare inputs, found {inputs:?}")]
    BehaviorInputs {
        component: String,
        inputs: Vec<String>,
    },
}

/// Result of running a component for one step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutput {
    pub outputs: Values,
    pub actions: Vec<Action>,
}

/// The transition function of a [`BaseLeaf`].
///
/// Receives the leaf's state, its inputs and sensor readings in declaration
/// order, and its constant parameters. May mutate `state`.
pub trait Transition: Send + Sync {
    fn step(
        &self,
        state: &mut ComponentState,
        inputs: &[Value],
        sensors: &[Value],
        params: &Params,
    ) -> Result<Values, TransitionError>;
}

impl<F> Transition for F
where
    F: Fn(&mut ComponentState, &[Value], &[Value], &Params) -> Result<Values, TransitionError>
        + Send
        + Sync,
{
    fn step(
        &self,
        state: &mut ComponentState,
        inputs: &[Value],
        sensors: &[Value],
        params: &Params,
    ) -> Result<Values, TransitionError> {
        self(state, inputs, sensors, params)
    }
}

/// Build a [`PortMap`] from `(name, type name)` pairs.
pub fn ports(decls: &[(&str, &str)]) -> Result<PortMap, ComponentError> {
    decls
        .iter()
        .map(|(name, ty)| Ok((name.to_string(), ty.parse::<ValueType>()?)))
        .collect()
}

// ── Contract checks ──────────────────────────────────────────────────

fn check_inputs(component: &str, declared: &PortMap, inputs: &Values) -> Result<(), ComponentError> {
    let same_keys =
        declared.len() == inputs.len() && declared.keys().all(|k| inputs.contains_key(k));
    if !same_keys {
        return Err(ComponentError::InputMismatch {
            component: component.to_string(),
            expected: declared.keys().cloned().collect(),
            actual: inputs.keys().cloned().collect(),
        });
    }
    for (port, value) in inputs {
        let expected = &declared[port.as_str()];
        if !expected.matches(value) {
            return Err(ComponentError::InputType {
                component: component.to_string(),
                port: port.clone(),
                expected: expected.clone(),
                actual: value.type_name(),
            });
        }
    }
    Ok(())
}

fn check_outputs(
    component: &str,
    declared: &PortMap,
    outputs: &Values,
) -> Result<(), ComponentError> {
    let same_keys =
        declared.len() == outputs.len() && declared.keys().all(|k| outputs.contains_key(k));
    if !same_keys {
        return Err(ComponentError::OutputMismatch {
            component: component.to_string(),
            expected: declared.keys().cloned().collect(),
            actual: outputs.keys().cloned().collect(),
        });
    }
    for (port, value) in outputs {
        let expected = &declared[port.as_str()];
        if !expected.matches(value) {
            return Err(ComponentError::OutputType {
                component: component.to_string(),
                port: port.clone(),
                expected: expected.clone(),
                actual: value.type_name(),
            });
        }
    }
    Ok(())
}

fn link_object(
    component: &str,
    linked_name: &Option<String>,
    scene: &Scene,
) -> Result<Option<ObjectHandle>, ComponentError> {
    match linked_name {
        Some(name) => lookup_linked_object(scene, name)
            .map(Some)
            .map_err(|source| ComponentError::Link {
                component: component.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

// ── Component ────────────────────────────────────────────────────────

/// A dataflow unit: one of the three component variants.
#[derive(Debug, Clone)]
pub enum Component {
    Action(ActionLeaf),
    Base(BaseLeaf),
    Composite(Composite),
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Component::Action(c) => &c.name,
            Component::Base(c) => &c.name,
            Component::Composite(c) => &c.name,
        }
    }

    pub fn inputs(&self) -> &PortMap {
        match self {
            Component::Action(c) => &c.inputs,
            Component::Base(c) => &c.inputs,
            Component::Composite(c) => &c.inputs,
        }
    }

    pub fn outputs(&self) -> &PortMap {
        match self {
            Component::Action(c) => &c.outputs,
            Component::Base(c) => &c.outputs,
            Component::Composite(c) => &c.outputs,
        }
    }

    pub fn linked_object_name(&self) -> Option<&str> {
        match self {
            Component::Action(c) => c.linked_name.as_deref(),
            Component::Base(c) => c.linked_name.as_deref(),
            Component::Composite(c) => c.linked_name.as_deref(),
        }
    }

    pub fn linked_object(&self) -> Option<&ObjectHandle> {
        match self {
            Component::Action(c) => c.linked.as_ref(),
            Component::Base(c) => c.linked.as_ref(),
            Component::Composite(c) => c.linked.as_ref(),
        }
    }

    pub fn last_inputs(&self) -> &Values {
        match self {
            Component::Action(c) => &c.last_inputs,
            Component::Base(c) => &c.last_inputs,
            Component::Composite(c) => &c.last_inputs,
        }
    }

    pub fn last_outputs(&self) -> &Values {
        match self {
            Component::Action(c) => &c.last_outputs,
            Component::Base(c) => &c.last_outputs,
            Component::Composite(c) => &c.last_outputs,
        }
    }

    pub fn run(&mut self, inputs: &Values) -> Result<StepOutput, ComponentError> {
        match self {
            Component::Action(c) => c.run(inputs),
            Component::Base(c) => c.run(inputs),
            Component::Composite(c) => c.run(inputs),
        }
    }

    /// Bind every linked-object reference in the tree. Idempotent.
    pub fn link(&mut self, scene: &Scene) -> Result<(), ComponentError> {
        match self {
            Component::Action(c) => c.link(scene),
            Component::Base(c) => c.link(scene),
            Component::Composite(c) => c.link(scene),
        }
    }

    /// The component at `path` below this one, following composite
    /// subcomponent names. An empty path is the component itself.
    pub fn descendant<P: AsRef<str>>(&self, path: &[P]) -> Result<&Component, ComponentError> {
        let mut current = self;
        for step in path {
            let step: &str = step.as_ref();
            current = match current {
                Component::Composite(c) => c.subcomponent(step),
                _ => None,
            }
            .ok_or_else(|| ComponentError::UnknownSubcomponent {
                component: current.name().to_string(),
                name: step.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Reinitialize all leaf state and clear links, recursively.
    pub fn reset(&mut self) {
        match self {
            Component::Action(c) => c.reset(),
            Component::Base(c) => c.reset(),
            Component::Composite(c) => c.reset(),
        }
    }
}

impl From<ActionLeaf> for Component {
    fn from(c: ActionLeaf) -> Self {
        Component::Action(c)
    }
}

impl From<BaseLeaf> for Component {
    fn from(c: BaseLeaf) -> Self {
        Component::Base(c)
    }
}

impl From<Composite> for Component {
    fn from(c: Composite) -> Self {
        Component::Composite(c)
    }
}

// ── Action leaf ──────────────────────────────────────────────────────

/// Dataflow sink relabeling its inputs as actions for the simulator.
#[derive(Debug, Clone)]
pub struct ActionLeaf {
    name: String,
    inputs: PortMap,
    outputs: PortMap,
    params: Params,
    linked_name: Option<String>,
    linked: Option<ObjectHandle>,
    last_inputs: Values,
    last_outputs: Values,
}

impl ActionLeaf {
    pub fn new(name: impl Into<String>, inputs: PortMap) -> Result<Self, ComponentError> {
        let name = name.into();
        for (port, declared) in &inputs {
            if !declared.is_action() {
                return Err(ComponentError::NonActionInput {
                    component: name,
                    port: port.clone(),
                    declared: declared.clone(),
                });
            }
        }
        Ok(Self {
            name,
            inputs,
            outputs: PortMap::new(),
            params: Params::new(),
            linked_name: None,
            linked: None,
            last_inputs: Values::new(),
            last_outputs: Values::new(),
        })
    }

    pub fn linked_to(mut self, object: impl Into<String>) -> Self {
        self.linked_name = Some(object.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn run(&mut self, actions: &Values) -> Result<StepOutput, ComponentError> {
        for (port, value) in actions {
            let declared =
                self.inputs
                    .get(port)
                    .ok_or_else(|| ComponentError::UndeclaredInput {
                        component: self.name.clone(),
                        port: port.clone(),
                    })?;
            if !declared.matches(value) {
                return Err(ComponentError::InputType {
                    component: self.name.clone(),
                    port: port.clone(),
                    expected: declared.clone(),
                    actual: value.type_name(),
                });
            }
        }

        let emitted = self
            .inputs
            .keys()
            .filter_map(|port| match actions.get(port) {
                Some(Value::Action(action)) => Some(action.clone()),
                _ => None,
            })
            .collect();

        self.last_inputs = actions.clone();
        Ok(StepOutput {
            outputs: Values::new(),
            actions: emitted,
        })
    }

    pub fn link(&mut self, scene: &Scene) -> Result<(), ComponentError> {
        self.linked = link_object(&self.name, &self.linked_name, scene)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.linked = None;
        self.last_inputs.clear();
    }
}

// ── Base leaf ────────────────────────────────────────────────────────

/// Leaf computing outputs from inputs, sensor readings and private state.
#[derive(Clone)]
pub struct BaseLeaf {
    name: String,
    inputs: PortMap,
    outputs: PortMap,
    params: Params,
    sensors: IndexMap<String, (String, ValueType)>,
    transition: Arc<dyn Transition>,
    initial: ComponentState,
    state: ComponentState,
    linked_name: Option<String>,
    linked: Option<ObjectHandle>,
    last_inputs: Values,
    last_outputs: Values,
}

impl fmt::Debug for BaseLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseLeaf")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("sensors", &self.sensors)
            .field("state", &self.state)
            .field("linked_name", &self.linked_name)
            .finish_non_exhaustive()
    }
}

impl BaseLeaf {
    pub fn builder(name: impl Into<String>) -> BaseLeafBuilder {
        BaseLeafBuilder {
            name: name.into(),
            inputs: PortMap::new(),
            outputs: PortMap::new(),
            params: Params::new(),
            state_types: PortMap::new(),
            state_inits: Values::new(),
            sensors: IndexMap::new(),
            transition: None,
            linked_name: None,
        }
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn last_outputs(&self) -> &Values {
        &self.last_outputs
    }

    pub fn run(&mut self, inputs: &Values) -> Result<StepOutput, ComponentError> {
        check_inputs(&self.name, &self.inputs, inputs)?;
        let sensors = self.read_sensors()?;

        let ordered_inputs: Vec<Value> = self
            .inputs
            .keys()
            .map(|port| inputs[port.as_str()].clone())
            .collect();

        let outputs = self
            .transition
            .step(&mut self.state, &ordered_inputs, &sensors, &self.params)
            .map_err(|source| ComponentError::Transition {
                component: self.name.clone(),
                source,
            })?;

        check_outputs(&self.name, &self.outputs, &outputs)?;
        trace!(component = %self.name, ?outputs, "base leaf step");

        self.last_inputs = inputs.clone();
        self.last_outputs = outputs.clone();
        Ok(StepOutput {
            outputs,
            actions: Vec::new(),
        })
    }

    fn read_sensors(&self) -> Result<Vec<Value>, ComponentError> {
        if self.sensors.is_empty() {
            return Ok(Vec::new());
        }
        let handle = self.linked.as_ref().ok_or_else(|| {
            let sensor = self.sensors.keys().next().cloned().unwrap_or_default();
            ComponentError::SensorUnbound {
                component: self.name.clone(),
                sensor,
            }
        })?;
        let object = handle.read().unwrap_or_else(PoisonError::into_inner);

        let mut readings = Vec::with_capacity(self.sensors.len());
        for (sensor, (field, expected)) in &self.sensors {
            let value =
                object
                    .get_field(field)
                    .ok_or_else(|| ComponentError::MissingSensorField {
                        component: self.name.clone(),
                        sensor: sensor.clone(),
                        field: field.clone(),
                    })?;
            if !expected.matches(value) {
                return Err(ComponentError::SensorType {
                    component: self.name.clone(),
                    sensor: sensor.clone(),
                    expected: expected.clone(),
                    actual: value.type_name(),
                });
            }
            readings.push(value.clone());
        }
        Ok(readings)
    }

    pub fn link(&mut self, scene: &Scene) -> Result<(), ComponentError> {
        self.linked = link_object(&self.name, &self.linked_name, scene)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.linked = None;
        self.state = self.initial.clone();
        self.last_inputs.clear();
        self.last_outputs.clear();
    }
}

fn initial_state(types: &PortMap, inits: &Values) -> Result<ComponentState, StateError> {
    let mut state = ComponentState::new(types.clone());
    for (name, value) in inits {
        state.set(name, value.clone())?;
    }
    Ok(state)
}

/// Schema-first construction of a [`BaseLeaf`].
pub struct BaseLeafBuilder {
    name: String,
    inputs: PortMap,
    outputs: PortMap,
    params: Params,
    state_types: PortMap,
    state_inits: Values,
    sensors: IndexMap<String, (String, ValueType)>,
    transition: Option<Arc<dyn Transition>>,
    linked_name: Option<String>,
}

impl BaseLeafBuilder {
    pub fn input(mut self, name: &str, ty: ValueType) -> Self {
        self.inputs.insert(name.to_string(), ty);
        self
    }

    pub fn output(mut self, name: &str, ty: ValueType) -> Self {
        self.outputs.insert(name.to_string(), ty);
        self
    }

    pub fn param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// Declare a state variable and its initial value.
    pub fn state(mut self, name: &str, ty: ValueType, init: Value) -> Self {
        self.state_types.insert(name.to_string(), ty);
        self.state_inits.insert(name.to_string(), init);
        self
    }

    /// Read `field` of the linked object as sensor `name` on every step.
    pub fn sensor(mut self, name: &str, field: &str, ty: ValueType) -> Self {
        self.sensors
            .insert(name.to_string(), (field.to_string(), ty));
        self
    }

    pub fn linked_to(mut self, object: impl Into<String>) -> Self {
        self.linked_name = Some(object.into());
        self
    }

    pub fn transition(mut self, transition: impl Transition + 'static) -> Self {
        self.transition = Some(Arc::new(transition));
        self
    }

    pub fn build(self) -> Result<BaseLeaf, ComponentError> {
        let transition = self
            .transition
            .ok_or_else(|| ComponentError::MissingTransition {
                component: self.name.clone(),
            })?;
        let state = initial_state(&self.state_types, &self.state_inits).map_err(|source| {
            ComponentError::InitialState {
                component: self.name.clone(),
                source,
            }
        })?;

        Ok(BaseLeaf {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            params: self.params,
            sensors: self.sensors,
            transition,
            initial: state.clone(),
            state,
            linked_name: self.linked_name,
            linked: None,
            last_inputs: Values::new(),
            last_outputs: Values::new(),
        })
    }
}

// ── Composite ────────────────────────────────────────────────────────

/// A port of a composite's dataflow: `owner == None` is the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub name: String,
    pub owner: Option<String>,
}

impl Port {
    /// A port on the composite's own boundary.
    pub fn boundary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
        }
    }

    /// A port of the named subcomponent.
    pub fn of(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: Some(owner.into()),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{owner}.{}", self.name),
            None => write!(f, "self.{}", self.name),
        }
    }
}

/// `(port name, dataflow node name)`.
type PortKey = (String, String);

/// Composite component owning subcomponents and their connections.
#[derive(Debug, Clone)]
pub struct Composite {
    name: String,
    inputs: PortMap,
    outputs: PortMap,
    params: Params,
    subcomponents: IndexMap<String, Component>,
    connections: Vec<(Port, Port)>,
    input_sources: HashMap<PortKey, PortKey>,
    evaluation_order: Vec<String>,
    linked_name: Option<String>,
    linked: Option<ObjectHandle>,
    last_inputs: Values,
    last_outputs: Values,
}

impl Composite {
    pub fn builder(name: impl Into<String>) -> CompositeBuilder {
        CompositeBuilder {
            name: name.into(),
            inputs: PortMap::new(),
            outputs: PortMap::new(),
            params: Params::new(),
            subcomponents: IndexMap::new(),
            connections: Vec::new(),
            linked_name: None,
        }
    }

    /// Subcomponent names in the order they run.
    pub fn evaluation_order(&self) -> &[String] {
        &self.evaluation_order
    }

    pub fn subcomponent(&self, name: &str) -> Option<&Component> {
        self.subcomponents.get(name)
    }

    pub fn connections(&self) -> &[(Port, Port)] {
        &self.connections
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn run(&mut self, inputs: &Values) -> Result<StepOutput, ComponentError> {
        check_inputs(&self.name, &self.inputs, inputs)?;

        let mut actions = Vec::new();
        let mut values: HashMap<PortKey, Value> = inputs
            .iter()
            .map(|(port, value)| ((port.clone(), SELF_INPUT.to_string()), value.clone()))
            .collect();

        for sc_name in &self.evaluation_order {
            let sc = self
                .subcomponents
                .get_mut(sc_name)
                .ok_or_else(|| ComponentError::UnknownSubcomponent {
                    component: self.name.clone(),
                    name: sc_name.clone(),
                })?;

            let mut sc_inputs = Values::new();
            for input_name in sc.inputs().keys() {
                let key = (input_name.clone(), sc_name.clone());
                let value = self
                    .input_sources
                    .get(&key)
                    .and_then(|source| values.get(source))
                    .ok_or_else(|| ComponentError::MissingSource {
                        component: self.name.clone(),
                        port: Port::of(sc_name.clone(), input_name.clone()),
                    })?;
                sc_inputs.insert(input_name.clone(), value.clone());
            }

            let step = sc.run(&sc_inputs)?;
            for (output_name, value) in step.outputs {
                values.insert((output_name, sc_name.clone()), value);
            }
            actions.extend(step.actions);
        }

        let mut outputs = Values::new();
        for output_name in self.outputs.keys() {
            let key = (output_name.clone(), SELF_OUTPUT.to_string());
            let value = self
                .input_sources
                .get(&key)
                .and_then(|source| values.get(source))
                .ok_or_else(|| ComponentError::MissingSource {
                    component: self.name.clone(),
                    port: Port::boundary(output_name.clone()),
                })?;
            outputs.insert(output_name.clone(), value.clone());
        }
        check_outputs(&self.name, &self.outputs, &outputs)?;

        self.last_inputs = inputs.clone();
        self.last_outputs = outputs.clone();
        Ok(StepOutput { outputs, actions })
    }

    pub fn link(&mut self, scene: &Scene) -> Result<(), ComponentError> {
        self.linked = link_object(&self.name, &self.linked_name, scene)?;
        for sc in self.subcomponents.values_mut() {
            sc.link(scene)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.linked = None;
        self.last_inputs.clear();
        self.last_outputs.clear();
        for sc in self.subcomponents.values_mut() {
            sc.reset();
        }
    }
}

/// Collects a composite's declaration; [`CompositeBuilder::build`] validates
/// the wiring and fixes the evaluation order.
pub struct CompositeBuilder {
    name: String,
    inputs: PortMap,
    outputs: PortMap,
    params: Params,
    subcomponents: IndexMap<String, Component>,
    connections: Vec<(Port, Port)>,
    linked_name: Option<String>,
}

impl CompositeBuilder {
    pub fn input(mut self, name: &str, ty: ValueType) -> Self {
        self.inputs.insert(name.to_string(), ty);
        self
    }

    pub fn output(mut self, name: &str, ty: ValueType) -> Self {
        self.outputs.insert(name.to_string(), ty);
        self
    }

    pub fn param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn subcomponent(mut self, name: &str, component: impl Into<Component>) -> Self {
        self.subcomponents.insert(name.to_string(), component.into());
        self
    }

    pub fn connect(mut self, source: Port, target: Port) -> Self {
        self.connections.push((source, target));
        self
    }

    pub fn linked_to(mut self, object: impl Into<String>) -> Self {
        self.linked_name = Some(object.into());
        self
    }

    pub fn build(self) -> Result<Composite, ComponentError> {
        let name = self.name.clone();

        for sc_name in self.subcomponents.keys() {
            if sc_name == SELF_INPUT || sc_name == SELF_OUTPUT {
                return Err(ComponentError::ReservedName {
                    component: name,
                    name: sc_name.clone(),
                });
            }
        }

        let mut graph = DataflowGraph::new(self.subcomponents.keys().map(String::as_str));
        let mut input_sources: HashMap<PortKey, PortKey> = HashMap::new();

        for (source, target) in &self.connections {
            let (source_node, source_type) = self.resolve(source, Side::Source)?;
            let (target_node, target_type) = self.resolve(target, Side::Target)?;

            if source_type != target_type {
                return Err(ComponentError::PortTypeMismatch {
                    component: name,
                    source_port: source.clone(),
                    target_port: target.clone(),
                    source_type,
                    target_type,
                });
            }

            let target_key = (target.name.clone(), target_node.clone());
            let source_key = (source.name.clone(), source_node.clone());
            match input_sources.get(&target_key) {
                Some(existing) if *existing == source_key => continue,
                Some(_) => {
                    return Err(ComponentError::DuplicateSource {
                        component: name,
                        port: target.clone(),
                    })
                }
                None => {}
            }

            graph
                .add_edge(&target_node, &source_node)
                .map_err(|source| ComponentError::Graph {
                    component: name.clone(),
                    source,
                })?;
            input_sources.insert(target_key, source_key);
        }

        for output_name in self.outputs.keys() {
            let key = (output_name.clone(), SELF_OUTPUT.to_string());
            if !input_sources.contains_key(&key) {
                return Err(ComponentError::MissingSource {
                    component: name,
                    port: Port::boundary(output_name.clone()),
                });
            }
        }
        for (sc_name, sc) in &self.subcomponents {
            for input_name in sc.inputs().keys() {
                let key = (input_name.clone(), sc_name.clone());
                if !input_sources.contains_key(&key) {
                    return Err(ComponentError::MissingSource {
                        component: name,
                        port: Port::of(sc_name.clone(), input_name.clone()),
                    });
                }
            }
        }

        for input_name in self.inputs.keys() {
            let used = input_sources
                .values()
                .any(|(port, node)| port == input_name && node == SELF_INPUT);
            if !used {
                warn!(component = %name, input = %input_name, "composite input is never used");
            }
        }

        let evaluation_order =
            graph
                .topological_order()
                .map_err(|source| ComponentError::Graph {
                    component: name.clone(),
                    source,
                })?;

        Ok(Composite {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            params: self.params,
            subcomponents: self.subcomponents,
            connections: self.connections,
            input_sources,
            evaluation_order,
            linked_name: self.linked_name,
            linked: None,
            last_inputs: Values::new(),
            last_outputs: Values::new(),
        })
    }

    /// Map a port to its dataflow node and declared type.
    fn resolve(&self, port: &Port, side: Side) -> Result<(String, ValueType), ComponentError> {
        let unknown = || ComponentError::UnknownPort {
            component: self.name.clone(),
            port: port.clone(),
        };

        match &port.owner {
            None => {
                let (node, boundary) = match side {
                    Side::Source => (SELF_INPUT, &self.inputs),
                    Side::Target => (SELF_OUTPUT, &self.outputs),
                };
                let ty = boundary.get(&port.name).ok_or_else(unknown)?;
                Ok((node.to_string(), ty.clone()))
            }
            Some(owner) => {
                let sc = self.subcomponents.get(owner).ok_or_else(|| {
                    ComponentError::UnknownSubcomponent {
                        component: self.name.clone(),
                        name: owner.clone(),
                    }
                })?;
                let declared = match side {
                    Side::Source => sc.outputs(),
                    Side::Target => sc.inputs(),
                };
                let ty = declared.get(&port.name).ok_or_else(unknown)?;
                Ok((owner.clone(), ty.clone()))
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Target,
}
