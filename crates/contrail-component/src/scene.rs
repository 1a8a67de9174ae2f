use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use contrail_ir::types::{SceneObject, Value};

/// Shared handle to a live world object. The simulator mutates the object in
/// place; linked components and value windows observe it through the handle.
pub type ObjectHandle = Arc<RwLock<SceneObject>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkError {
    #[error("No object in scenario with name '{name}'")]
    NoSuchObject { name: String },

    #[error("Multiple objects ({count}) in scenario with name '{name}'")]
    AmbiguousObject { name: String, count: usize },
}

/// One concrete sampled instance of a scenario.
#[derive(Debug, Clone)]
pub struct Scene {
    pub objects: Vec<ObjectHandle>,
    pub workspace: Value,
    pub params: IndexMap<String, Value>,
}

/// Owned, serializable copy of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub objects: Vec<SceneObject>,
    pub workspace: Value,
    pub params: IndexMap<String, Value>,
}

impl Scene {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self {
            objects: objects
                .into_iter()
                .map(|obj| Arc::new(RwLock::new(obj)))
                .collect(),
            workspace: Value::List(Vec::new()),
            params: IndexMap::new(),
        }
    }

    pub fn with_workspace(mut self, workspace: Value) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Copy the current state of every object.
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            objects: self.objects.iter().map(read_object).collect(),
            workspace: self.workspace.clone(),
            params: self.params.clone(),
        }
    }

    /// Serialized snapshot, stored as part of a sample's replay payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.snapshot())
    }

    pub fn from_snapshot(snapshot: SceneSnapshot) -> Self {
        let SceneSnapshot {
            objects,
            workspace,
            params,
        } = snapshot;
        Self::new(objects).with_workspace(workspace).with_params(params)
    }

    fn with_params(mut self, params: IndexMap<String, Value>) -> Self {
        self.params = params;
        self
    }
}

/// Read a copy of a live object, tolerating a poisoned lock.
pub fn read_object(handle: &ObjectHandle) -> SceneObject {
    handle.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Resolve `name` to exactly one object of the scene.
pub fn lookup_linked_object(scene: &Scene, name: &str) -> Result<ObjectHandle, LinkError> {
    let matches: Vec<&ObjectHandle> = scene
        .objects
        .iter()
        .filter(|handle| {
            handle
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .name
                .as_deref()
                == Some(name)
        })
        .collect();

    match matches.as_slice() {
        [] => Err(LinkError::NoSuchObject {
            name: name.to_string(),
        }),
        [single] => Ok(Arc::clone(single)),
        many => Err(LinkError::AmbiguousObject {
            name: name.to_string(),
            count: many.len(),
        }),
    }
}
