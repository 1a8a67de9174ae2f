pub mod condition;
pub mod config;
pub mod contract;
pub mod evidence;
pub mod report;
pub mod sim;
pub mod stats;
pub mod testing;

pub use condition::Condition;
pub use config::{ConfigError, VerifierConfig};
pub use contract::{Contract, ContractError, Global};
pub use evidence::{Evidence, EvidenceSummary, ReplayPayload, SourceInfo, TestData, TestResult};
pub use report::{ContractResult, Report};
pub use sim::{
    SampleError, ScenarioSampler, SimulationResult, Simulator, StepError, SteppedSimulation,
};
pub use stats::{Alternative, BinomialInterval, ClopperPearson};
pub use testing::{run_components_simulation, SimulationOutcome, SimulationTesting, VerifyError};
