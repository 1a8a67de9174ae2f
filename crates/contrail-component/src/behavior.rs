use std::sync::{Arc, Mutex, PoisonError};

use contrail_ir::types::Action;

use crate::component::{Component, ComponentError, Values};

/// The per-step policy of one simulated agent.
pub trait Behavior: Send {
    /// Name of the agent this behavior drives.
    fn agent(&self) -> &str;

    /// Compute the actions for the current step.
    fn step(&mut self) -> Result<Vec<Action>, ComponentError>;
}

/// Inputs and outputs of a component's latest step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentIo {
    pub inputs: Values,
    pub outputs: Values,
}

/// Shared view of the latest I/O of a [`ComponentBehavior`]'s target.
pub type IoProbe = Arc<Mutex<ComponentIo>>;

/// Drives a top-level component as the behavior of its linked agent.
///
/// The published I/O belongs to the target: the driving component itself
/// by default, or a subcomponent selected with [`ComponentBehavior::with_target`].
#[derive(Debug)]
pub struct ComponentBehavior {
    agent: String,
    component: Component,
    target: Vec<String>,
    probe: IoProbe,
}

impl ComponentBehavior {
    /// Fails if the component declares inputs: nothing upstream can feed them.
    pub fn new(component: Component) -> Result<Self, ComponentError> {
        if !component.inputs().is_empty() {
            return Err(ComponentError::BehaviorInputs {
                component: component.name().to_string(),
                inputs: component.inputs().keys().cloned().collect(),
            });
        }
        let agent = component
            .linked_object_name()
            .unwrap_or_else(|| component.name())
            .to_string();
        Ok(Self {
            agent,
            component,
            target: Vec::new(),
            probe: IoProbe::default(),
        })
    }

    /// Publish the I/O of the subcomponent at `path` instead of the root.
    pub fn with_target<P: AsRef<str>>(mut self, path: &[P]) -> Result<Self, ComponentError> {
        self.component.descendant(path)?;
        self.target = path.iter().map(|p| p.as_ref().to_string()).collect();
        Ok(self)
    }

    /// The component whose I/O is published.
    pub fn target(&self) -> Result<&Component, ComponentError> {
        self.component.descendant(self.target.as_slice())
    }

    pub fn probe(&self) -> IoProbe {
        Arc::clone(&self.probe)
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn into_component(self) -> Component {
        self.component
    }
}

impl Behavior for ComponentBehavior {
    fn agent(&self) -> &str {
        &self.agent
    }

    fn step(&mut self) -> Result<Vec<Action>, ComponentError> {
        let step = self.component.run(&Values::new())?;
        let target = self.component.descendant(self.target.as_slice())?;
        let mut io = self.probe.lock().unwrap_or_else(PoisonError::into_inner);
        io.inputs = target.last_inputs().clone();
        io.outputs = target.last_outputs().clone();
        Ok(step.actions)
    }
}
