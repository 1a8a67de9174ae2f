//! The simulation-based verification loop.
//!
//! Each round samples a batch of scenes, verifies every scene on the rayon
//! pool against a private copy of the component, and merges the finished
//! samples into the evidence until a termination or requirement condition
//! holds.

use std::sync::{Arc, PoisonError};
use std::time::Instant;

use crossbeam::channel;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use contrail_component::behavior::{Behavior, ComponentBehavior, IoProbe};
use contrail_component::component::{Component, ComponentError};
use contrail_component::scene::{lookup_linked_object, read_object, LinkError, Scene};
use contrail_ir::expr::Expr;
use contrail_ir::types::Value;
use contrail_spec::eval::lazy_definition;
use contrail_spec::monitor::{Monitor, MonitorError, MonitorFactory, PrefixMonitorFactory, Verdict};
use contrail_spec::spec::SpecNode;
use contrail_spec::window::{Sampler, WindowError, WindowSet};

use crate::condition::Condition;
use crate::config::{ConfigError, VerifierConfig};
use crate::contract::{Contract, ContractError, Global};
use crate::evidence::{Evidence, ReplayPayload, SourceInfo, TestData, TestResult};
use crate::report::{ContractResult, Report};
use crate::sim::{SampleError, ScenarioSampler, SimulationResult, Simulator, StepError, SteppedSimulation};
use crate::stats::{BinomialInterval, ClopperPearson};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("Failed to serialize scene: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("At least one termination or requirement condition is required")]
    NoConditions,

    #[error("Component '{component}' is not linked to an object")]
    UnlinkedComponent { component: String },

    #[error("Value at time {time} is still unavailable after the simulation concluded at step {sim_step}")]
    LateValue { time: usize, sim_step: usize },
}

/// Checks a contract against a component by sampling simulations.
///
/// `component` drives the linked agent during each simulation; the
/// contract is checked against the I/O of the component found at `target`
/// inside it (the driver itself when `target` is empty).
pub struct SimulationTesting<S, M> {
    contract: Contract,
    component: Component,
    target: Vec<String>,
    sampler: S,
    simulator: M,
    config: VerifierConfig,
    termination: Vec<Condition>,
    requirements: Vec<Condition>,
    monitors: Arc<dyn MonitorFactory<Expr>>,
    interval: Arc<dyn BinomialInterval>,
    pool: rayon::ThreadPool,
}

impl<S: ScenarioSampler, M: Simulator> SimulationTesting<S, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contract: Contract,
        component: Component,
        target: &[&str],
        sampler: S,
        simulator: M,
        config: VerifierConfig,
        termination: Vec<Condition>,
        requirements: Vec<Condition>,
    ) -> Result<Self, VerifyError> {
        if termination.is_empty() && requirements.is_empty() {
            return Err(VerifyError::NoConditions);
        }
        config.validate()?;
        let verified = component.descendant(target)?;
        if verified.linked_object_name().is_none() && component.linked_object_name().is_none() {
            return Err(VerifyError::UnlinkedComponent {
                component: verified.name().to_string(),
            });
        }
        contract.check_stream_names()?;
        contract.check_component(verified)?;
        let target = target.iter().map(|step| step.to_string()).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.unwrap_or(0))
            .build()?;

        Ok(Self {
            contract,
            component,
            target,
            sampler,
            simulator,
            config,
            termination,
            requirements,
            monitors: Arc::new(PrefixMonitorFactory),
            interval: Arc::new(ClopperPearson),
            pool,
        })
    }

    pub fn with_monitor_factory(mut self, monitors: Arc<dyn MonitorFactory<Expr>>) -> Self {
        self.monitors = monitors;
        self
    }

    pub fn with_interval(mut self, interval: Arc<dyn BinomialInterval>) -> Self {
        self.interval = interval;
        self
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    fn stop(&self, evidence: &Evidence) -> bool {
        self.termination
            .iter()
            .chain(&self.requirements)
            .any(|cond| cond.check(evidence))
    }

    /// Sample until a condition holds, then judge the requirements.
    #[instrument(skip(self), name = "verify", fields(contract = %self.contract.name))]
    pub fn verify(&mut self) -> Result<ContractResult, VerifyError> {
        let source = SourceInfo {
            scenario: self.sampler.name().to_string(),
            hash: self.sampler.hash(),
        };
        let mut evidence = Evidence::new(self.config.confidence, source)
            .with_interval(Arc::clone(&self.interval));

        while !self.stop(&evidence) {
            let batch = self.run_tests(self.config.batch_size)?;
            evidence.add_tests(batch);

            if self.config.verbose {
                info!(
                    "\n{}",
                    Report::new(&self.contract.assumptions, &self.contract.guarantees, &evidence)
                );
            }
        }

        if self.config.verbose {
            for cond in &self.termination {
                info!(condition = %cond, met = cond.check(&evidence), "termination condition");
            }
        }

        let requirements_met = self.requirements.iter().all(|cond| cond.check(&evidence));
        if self.config.verbose {
            for cond in &self.requirements {
                info!(condition = %cond, met = cond.check(&evidence), "requirement condition");
            }
        }
        evidence.requirements_met = Some(requirements_met);
        info!(
            samples = evidence.len(),
            requirements_met,
            "verification finished"
        );

        Ok(ContractResult::new(
            self.contract.assumptions.clone(),
            self.contract.guarantees.clone(),
            evidence,
        ))
    }

    /// Sample and verify `count` scenes in parallel. Samples keep the order
    /// in which their scenes were generated.
    pub fn run_tests(&mut self, count: usize) -> Result<Vec<TestData>, VerifyError> {
        let scenes = self.sampler.generate_batch(count)?;
        let runner = SceneRunner {
            contract: &self.contract,
            component: &self.component,
            target: &self.target,
            simulator: &self.simulator,
            monitors: self.monitors.as_ref(),
            config: &self.config,
        };

        let (tx, rx) = channel::unbounded();
        self.pool.install(|| {
            scenes
                .into_par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (index, scene)| {
                    let outcome = runner.test_scene(scene);
                    if tx.send((index, outcome)).is_err() {
                        warn!(index, "sample receiver dropped");
                    }
                });
        });

        let mut finished: Vec<(usize, Result<TestData, VerifyError>)> = rx.iter().collect();
        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Verify a single scene on the calling thread.
    pub fn test_scene(&self, scene: Scene) -> Result<TestData, VerifyError> {
        SceneRunner {
            contract: &self.contract,
            component: &self.component,
            target: &self.target,
            simulator: &self.simulator,
            monitors: self.monitors.as_ref(),
            config: &self.config,
        }
        .test_scene(scene)
    }
}

/// Everything a worker needs to verify one scene. Shared read-only.
struct SceneRunner<'a, M> {
    contract: &'a Contract,
    component: &'a Component,
    target: &'a [String],
    simulator: &'a M,
    monitors: &'a dyn MonitorFactory<Expr>,
    config: &'a VerifierConfig,
}

/// Latest verdict of every monitor of one kind.
struct Tracked {
    monitors: Vec<Box<dyn Monitor>>,
    values: Vec<Verdict>,
}

impl Tracked {
    fn new(factory: &dyn MonitorFactory<Expr>, nodes: &[SpecNode<Expr>]) -> Self {
        Self {
            monitors: nodes.iter().map(|node| factory.create(node)).collect(),
            values: vec![Verdict::PresumablyTrue; nodes.len()],
        }
    }

    /// Query every monitor at `time`. Values that are not available yet are
    /// skipped unless the simulation has already concluded past them.
    fn update(
        &mut self,
        time: usize,
        windows: &WindowSet,
        sim_step: usize,
        concluded: bool,
    ) -> Result<(), VerifyError> {
        for (monitor, value) in self.monitors.iter_mut().zip(self.values.iter_mut()) {
            match monitor.update(time, windows) {
                Ok(verdict) => *value = verdict,
                Err(MonitorError::NotAvailable { time }) if !(time < sim_step && concluded) => {}
                Err(MonitorError::NotAvailable { time }) => {
                    return Err(VerifyError::LateValue { time, sim_step })
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn indices(&self, pred: impl Fn(Verdict) -> bool) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| pred(**v))
            .map(|(i, _)| i)
            .collect()
    }
}

impl<M: Simulator> SceneRunner<'_, M> {
    #[instrument(skip_all, name = "test_scene", fields(contract = %self.contract.name))]
    fn test_scene(&self, scene: Scene) -> Result<TestData, VerifyError> {
        let start = Instant::now();
        let scene_bytes = scene.to_bytes()?;

        let mut component = self.component.clone();
        component.reset();
        component.link(&scene)?;
        let mut behavior = ComponentBehavior::new(component)?.with_target(self.target)?;
        let mut windows = self.bind_windows(&scene, &behavior)?;

        let mut assumptions = Tracked::new(self.monitors, &self.contract.assumptions);
        let mut guarantees = Tracked::new(self.monitors, &self.contract.guarantees);

        let finish = |result: TestResult, violations: Vec<usize>, replay: Vec<u8>| TestData {
            result,
            violations,
            elapsed_secs: start.elapsed().as_secs_f64(),
            replay: ReplayPayload {
                scene: scene_bytes.clone(),
                simulation: replay,
            },
        };

        let mut simulation = self.simulator.simulate_stepped(&scene, self.config.max_steps);
        let mut sim_step = 0;
        let mut eval_step = 0;

        // Warm up: fill the windows far enough for the first lookahead reads.
        for _ in 0..self.contract.max_lookahead() {
            if !advance(&mut simulation, &mut behavior)? {
                return Ok(finish(TestResult::Rejected, Vec::new(), simulation.replay()));
            }
            if simulation.result().is_some() {
                break;
            }
            windows.refresh()?;
            sim_step += 1;
        }

        while eval_step <= sim_step {
            if simulation.result().is_none() {
                if !advance(&mut simulation, &mut behavior)? {
                    return Ok(finish(TestResult::Rejected, Vec::new(), simulation.replay()));
                }
                if simulation.result().is_none() {
                    windows.refresh()?;
                    sim_step += 1;
                }
            }
            let concluded = simulation.result().is_some();

            assumptions.update(eval_step, &windows, sim_step, concluded)?;
            if self.config.stop_on_assumption_violation {
                let violated = assumptions.indices(|v| v == Verdict::False);
                if !violated.is_empty() {
                    debug!(eval_step, ?violated, "assumption definitively violated");
                    return Ok(finish(
                        TestResult::AssumptionViolated,
                        violated,
                        simulation.replay(),
                    ));
                }
            }
            guarantees.update(eval_step, &windows, sim_step, concluded)?;

            eval_step += 1;
        }

        let replay = simulation.replay();
        drop(simulation);

        let violated = assumptions.indices(Verdict::is_violation);
        if !violated.is_empty() {
            debug!(?violated, "assumptions violated");
            return Ok(finish(TestResult::AssumptionViolated, violated, replay));
        }
        let violated = guarantees.indices(Verdict::is_violation);
        if !violated.is_empty() {
            debug!(?violated, "guarantees violated");
            return Ok(finish(TestResult::GuaranteeViolated, violated, replay));
        }
        debug!(steps = sim_step, "scene valid");
        Ok(finish(TestResult::Valid, Vec::new(), replay))
    }

    /// Eager windows for the linked object, globals and the target's ports,
    /// then lazy windows for the definitions. The target's own link wins over
    /// the driver's.
    fn bind_windows(
        &self,
        scene: &Scene,
        behavior: &ComponentBehavior,
    ) -> Result<WindowSet, VerifyError> {
        let mut windows = WindowSet::new();
        let target = behavior.target()?;
        let driver = behavior.component();
        let probe = behavior.probe();

        let object = match target.linked_object().or_else(|| driver.linked_object()) {
            Some(handle) => Arc::clone(handle),
            None => {
                let name = target
                    .linked_object_name()
                    .or_else(|| driver.linked_object_name())
                    .ok_or_else(|| VerifyError::UnlinkedComponent {
                        component: target.name().to_string(),
                    })?;
                lookup_linked_object(scene, name)?
            }
        };
        windows.bind_eager(
            &self.contract.object,
            Box::new(move || Ok(Value::Object(read_object(&object)))),
        )?;

        for global in &self.contract.globals {
            let sampler: Sampler = match global {
                Global::Objects => {
                    let objects = scene.objects.clone();
                    Box::new(move || {
                        Ok(Value::List(
                            objects
                                .iter()
                                .map(|handle| Value::Object(read_object(handle)))
                                .collect(),
                        ))
                    })
                }
                Global::Workspace => {
                    let workspace = scene.workspace.clone();
                    Box::new(move || Ok(workspace.clone()))
                }
            };
            windows.bind_eager(global.name(), sampler)?;
        }

        for name in self.contract.inputs.keys() {
            windows.bind_eager(name, port_sampler(&probe, name, Side::Input))?;
        }
        for name in self.contract.outputs.keys() {
            windows.bind_eager(name, port_sampler(&probe, name, Side::Output))?;
        }

        for (name, expr) in &self.contract.definitions {
            windows.bind_lazy(name, lazy_definition(name, expr.clone()))?;
        }
        Ok(windows)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Input,
    Output,
}

fn port_sampler(probe: &IoProbe, name: &str, side: Side) -> Sampler {
    let probe = Arc::clone(probe);
    let name = name.to_string();
    Box::new(move || {
        let io = probe.lock().unwrap_or_else(PoisonError::into_inner);
        let ports = match side {
            Side::Input => &io.inputs,
            Side::Output => &io.outputs,
        };
        ports.get(&name).cloned().ok_or_else(|| WindowError::Sample {
            name: name.clone(),
            message: "component has not produced this value".to_string(),
        })
    })
}

/// Advance one step. `Ok(false)` when the simulation rejected the scene.
fn advance<T: SteppedSimulation>(
    simulation: &mut T,
    behavior: &mut ComponentBehavior,
) -> Result<bool, VerifyError> {
    let mut behaviors: [&mut dyn Behavior; 1] = [behavior];
    match simulation.advance(&mut behaviors) {
        Ok(()) => Ok(true),
        Err(err @ (StepError::Rejected { .. } | StepError::GuardViolation { .. })) => {
            debug!(reason = %err, "scene rejected");
            Ok(false)
        }
        Err(StepError::Component(err)) => Err(err.into()),
    }
}

/// Outcome of [`run_components_simulation`].
#[derive(Debug)]
pub struct SimulationOutcome {
    pub scene: Scene,
    /// `None` if the scene was rejected before concluding.
    pub result: Option<SimulationResult>,
    pub rejection: Option<String>,
    pub replay: Vec<u8>,
    /// The components, reset.
    pub components: Vec<Component>,
}

/// Sample one scene and simulate it with each component driving its linked
/// agent.
pub fn run_components_simulation<S, M>(
    sampler: &mut S,
    simulator: &M,
    components: Vec<Component>,
    max_steps: usize,
) -> Result<SimulationOutcome, VerifyError>
where
    S: ScenarioSampler,
    M: Simulator,
{
    let scene = sampler.generate()?;

    let mut behaviors = Vec::with_capacity(components.len());
    for mut component in components {
        component.link(&scene)?;
        let behavior = ComponentBehavior::new(component)?;
        debug!(agent = behavior.agent(), "installing component behavior");
        behaviors.push(behavior);
    }

    let mut simulation = simulator.simulate_stepped(&scene, max_steps);
    let mut rejection = None;
    while simulation.result().is_none() {
        let mut agents: Vec<&mut dyn Behavior> = behaviors
            .iter_mut()
            .map(|b| b as &mut dyn Behavior)
            .collect();
        match simulation.advance(&mut agents) {
            Ok(()) => {}
            Err(err @ (StepError::Rejected { .. } | StepError::GuardViolation { .. })) => {
                rejection = Some(err.to_string());
                break;
            }
            Err(StepError::Component(err)) => return Err(err.into()),
        }
    }

    let result = simulation.result().cloned();
    let replay = simulation.replay();
    drop(simulation);

    let components = behaviors
        .into_iter()
        .map(|b| {
            let mut component = b.into_component();
            component.reset();
            component
        })
        .collect();

    Ok(SimulationOutcome {
        scene,
        result,
        rejection,
        replay,
        components,
    })
}
