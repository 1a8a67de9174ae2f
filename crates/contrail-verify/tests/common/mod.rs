#![allow(dead_code)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use contrail_component::behavior::Behavior;
use contrail_component::component::{BaseLeaf, Component, Params, TransitionError, Values};
use contrail_component::scene::{lookup_linked_object, ObjectHandle, Scene};
use contrail_component::state::ComponentState;
use contrail_ir::expr::{Expr, Literal, OpKind};
use contrail_ir::types::{SceneObject, Value, ValueType};
use contrail_spec::spec::SpecNode;
use contrail_verify::contract::Contract;
use contrail_verify::sim::{
    SampleError, ScenarioSampler, SimulationResult, Simulator, StepError, SteppedSimulation,
};

// ── Scenes ───────────────────────────────────────────────────────────

/// A scene whose ego speed follows `trace`, one entry per advance.
pub fn trace_scene(trace: &[f64]) -> Scene {
    Scene::new(vec![
        SceneObject::new("Car")
            .named("ego")
            .with_field("speed", Value::Float(0.0)),
        SceneObject::new("Car").named("lead"),
    ])
    .with_param(
        "trace",
        Value::List(trace.iter().map(|s| Value::Float(*s)).collect()),
    )
}

/// Like [`trace_scene`], but the simulator rejects the scene on advance
/// number `step` (zero-based).
pub fn rejecting_scene(trace: &[f64], step: i64) -> Scene {
    trace_scene(trace).with_param("reject_at", Value::Int(step))
}

pub fn safe_trace(len: usize) -> Vec<f64> {
    (0..len).map(|i| 10.0 + i as f64).collect()
}

/// Ten steps, reaching 35 at step 4.
pub fn speeding_trace() -> Vec<f64> {
    vec![20.0, 22.0, 24.0, 26.0, 35.0, 28.0, 26.0, 24.0, 22.0, 20.0]
}

/// Hands out copies of a fixed list of scenes in turn.
pub struct ScriptedSampler {
    scenes: Vec<Scene>,
    next: usize,
}

impl ScriptedSampler {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes, next: 0 }
    }
}

impl ScenarioSampler for ScriptedSampler {
    fn generate(&mut self) -> Result<Scene, SampleError> {
        if self.scenes.is_empty() {
            return Err(SampleError::Exhausted {
                scenario: self.name().to_string(),
                attempts: 0,
            });
        }
        let scene = &self.scenes[self.next % self.scenes.len()];
        self.next += 1;
        Ok(Scene::from_snapshot(scene.snapshot()))
    }

    fn name(&self) -> &str {
        "scripted.scenic"
    }

    fn hash(&self) -> u64 {
        7
    }
}

/// Random ten-step speed traces; each scene spikes past 30 with
/// probability `spike`.
pub struct RandomSpeedSampler {
    rng: ChaCha8Rng,
    spike: f64,
}

impl RandomSpeedSampler {
    pub fn new(seed: u64, spike: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            spike,
        }
    }
}

impl ScenarioSampler for RandomSpeedSampler {
    fn generate(&mut self) -> Result<Scene, SampleError> {
        let mut trace: Vec<f64> = (0..10).map(|_| self.rng.gen_range(5.0..25.0)).collect();
        if self.rng.gen_bool(self.spike) {
            let at = self.rng.gen_range(0..trace.len() - 1);
            trace[at] = 40.0;
        }
        Ok(trace_scene(&trace))
    }

    fn name(&self) -> &str {
        "random_speed.scenic"
    }

    fn hash(&self) -> u64 {
        11
    }
}

// ── Simulator ────────────────────────────────────────────────────────

/// Replays the scene's `trace` parameter onto the ego object.
pub struct TraceSimulator;

pub struct TraceRun {
    ego: Option<ObjectHandle>,
    trace: Vec<f64>,
    reject_at: Option<usize>,
    step: usize,
    max_steps: usize,
    actions: usize,
    result: Option<SimulationResult>,
}

impl Simulator for TraceSimulator {
    type Simulation = TraceRun;

    fn simulate_stepped(&self, scene: &Scene, max_steps: usize) -> TraceRun {
        let trace = match scene.params.get("trace") {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let reject_at = match scene.params.get("reject_at") {
            Some(Value::Int(n)) => Some(*n as usize),
            _ => None,
        };
        TraceRun {
            ego: lookup_linked_object(scene, "ego").ok(),
            trace,
            reject_at,
            step: 0,
            max_steps,
            actions: 0,
            result: None,
        }
    }
}

impl SteppedSimulation for TraceRun {
    fn advance(&mut self, behaviors: &mut [&mut dyn Behavior]) -> Result<(), StepError> {
        if self.result.is_some() {
            return Ok(());
        }
        if self.reject_at == Some(self.step) {
            return Err(StepError::Rejected {
                reason: format!("requirement failed at step {}", self.step),
            });
        }
        for behavior in behaviors.iter_mut() {
            self.actions += behavior.step()?.len();
        }
        if let (Some(ego), Some(speed)) = (&self.ego, self.trace.get(self.step)) {
            ego.write()
                .unwrap()
                .set_field("speed", Value::Float(*speed));
        }
        self.step += 1;
        if self.step >= self.trace.len() || self.step >= self.max_steps {
            self.result = Some(SimulationResult {
                steps: self.step,
                termination_reason: "trace finished".to_string(),
            });
        }
        Ok(())
    }

    fn result(&self) -> Option<&SimulationResult> {
        self.result.as_ref()
    }

    fn replay(&self) -> Vec<u8> {
        format!("steps={};actions={}", self.step, self.actions).into_bytes()
    }
}

// ── Component and contract ───────────────────────────────────────────

/// Opens the throttle below 25 m/s.
pub fn cruise_control() -> Component {
    BaseLeaf::builder("cruise")
        .output("throttle", ValueType::Float)
        .sensor("speed", "speed", ValueType::Float)
        .linked_to("ego")
        .transition(
            |_state: &mut ComponentState,
             _inputs: &[Value],
             sensors: &[Value],
             _params: &Params|
             -> Result<Values, TransitionError> {
                let throttle = match sensors[0] {
                    Value::Float(speed) if speed < 25.0 => 1.0,
                    _ => 0.0,
                };
                let mut out = Values::new();
                out.insert("throttle".to_string(), Value::Float(throttle));
                Ok(out)
            },
        )
        .build()
        .unwrap()
        .into()
}

pub fn speed_below(limit: i64) -> Expr {
    Expr::op(
        OpKind::Lt,
        vec![Expr::stream("speed"), Expr::literal(Literal::Int(limit))],
    )
}

pub fn speed_at_least(limit: i64) -> Expr {
    Expr::op(
        OpKind::Gte,
        vec![Expr::stream("speed"), Expr::literal(Literal::Int(limit))],
    )
}

pub fn always(fragment: Expr, text: &str) -> SpecNode<Expr> {
    SpecNode::Always(Box::new(SpecNode::atomic(fragment, Some(text))))
}

/// `always speed < 30` over the ego's speed, throttle bound as an output.
pub fn speed_limit_contract() -> Contract {
    Contract::new("SpeedLimit", "ego")
        .with_output("throttle", ValueType::Float)
        .with_definition("speed", Expr::field(Expr::stream("ego"), "speed"))
        .guarantee(always(speed_below(30), "speed < 30"))
}
