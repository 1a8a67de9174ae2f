pub mod eval;
pub mod monitor;
pub mod spec;
pub mod window;

pub use eval::{evaluate, lazy_definition, EvalError, Evaluate};
pub use monitor::{Monitor, MonitorError, MonitorFactory, PrefixMonitor, PrefixMonitorFactory, Verdict};
pub use spec::{Fragment, FragmentTable, Lookahead, SpecError, SpecNode};
pub use window::{LazyFn, Sampler, StreamSource, WindowError, WindowSet, WindowView};
