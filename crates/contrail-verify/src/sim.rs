//! Seams to the scenario sampler and the stepped simulator.

use serde::{Deserialize, Serialize};

use contrail_component::behavior::Behavior;
use contrail_component::component::ComponentError;
use contrail_component::scene::Scene;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Scenario '{scenario}' produced no valid scene after {attempts} attempts")]
    Exhausted { scenario: String, attempts: usize },

    #[error("Scenario sampling failed: {message}")]
    Failed { message: String },
}

/// Produces concrete scenes from a scenario.
pub trait ScenarioSampler {
    fn generate(&mut self) -> Result<Scene, SampleError>;

    fn generate_batch(&mut self, count: usize) -> Result<Vec<Scene>, SampleError> {
        (0..count).map(|_| self.generate()).collect()
    }

    /// Display name of the scenario, e.g. its file name.
    fn name(&self) -> &str;

    /// Content hash identifying the scenario.
    fn hash(&self) -> u64;
}

/// Why and when a simulation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub steps: usize,
    pub termination_reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Simulation rejected: {reason}")]
    Rejected { reason: String },

    #[error("Guard violated: {guard}")]
    GuardViolation { guard: String },

    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// A simulation advanced one step at a time.
///
/// Resources held by the simulation are released when it is dropped.
pub trait SteppedSimulation {
    /// Run every behavior for the current step, apply their actions and
    /// advance the world by one step.
    fn advance(&mut self, behaviors: &mut [&mut dyn Behavior]) -> Result<(), StepError>;

    /// `Some` once the simulation has concluded.
    fn result(&self) -> Option<&SimulationResult>;

    /// Opaque bytes sufficient to replay the run so far.
    fn replay(&self) -> Vec<u8>;
}

pub trait Simulator: Sync {
    type Simulation: SteppedSimulation;

    fn simulate_stepped(&self, scene: &Scene, max_steps: usize) -> Self::Simulation;
}
