pub mod behavior;
pub mod component;
pub mod graph;
pub mod scene;
pub mod state;

pub use behavior::{Behavior, ComponentBehavior, ComponentIo, IoProbe};
pub use component::{
    ports, ActionLeaf, BaseLeaf, Component, ComponentError, Composite, Params, Port, PortMap,
    StepOutput, Transition, TransitionError, Values,
};
pub use graph::{DataflowGraph, GraphError, SELF_INPUT, SELF_OUTPUT};
pub use scene::{lookup_linked_object, LinkError, ObjectHandle, Scene, SceneSnapshot};
pub use state::{ComponentState, StateError};
