//! Named, time-indexed value streams read by monitors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use contrail_ir::types::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowError {
    #[error("Window '{name}' has no value at time {time} (elapsed {elapsed})")]
    NotAvailable {
        name: String,
        time: usize,
        elapsed: usize,
    },

    #[error("No window named '{name}' is visible here")]
    Unbound { name: String },

    #[error("Window '{name}' is already bound")]
    Duplicate { name: String },

    #[error("Failed to sample window '{name}': {message}")]
    Sample { name: String, message: String },
}

impl WindowError {
    /// Time of a not-yet-available read, if this is one.
    pub fn unavailable_time(&self) -> Option<usize> {
        match self {
            WindowError::NotAvailable { time, .. } => Some(*time),
            _ => None,
        }
    }
}

/// Anything that can answer "value of stream `name` at `time`".
pub trait StreamSource {
    fn sample(&self, name: &str, time: usize) -> Result<Value, WindowError>;
}

/// Samples the current value of an eager window.
pub type Sampler = Box<dyn FnMut() -> Result<Value, WindowError> + Send>;

/// Computes a lazy window's value at a time from previously bound windows.
pub type LazyFn = Box<dyn Fn(usize, &WindowView<'_>) -> Result<Value, WindowError> + Send>;

/// Append-only window sampled once per simulation step.
pub struct EagerWindow {
    sampler: Sampler,
    values: Vec<Value>,
}

impl EagerWindow {
    pub fn new(sampler: Sampler) -> Self {
        Self {
            sampler,
            values: Vec::new(),
        }
    }

    pub fn update(&mut self) -> Result<(), WindowError> {
        let value = (self.sampler)()?;
        self.values.push(value);
        Ok(())
    }

    pub fn elapsed(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, name: &str, time: usize) -> Result<&Value, WindowError> {
        self.values
            .get(time)
            .ok_or_else(|| WindowError::NotAvailable {
                name: name.to_string(),
                time,
                elapsed: self.values.len(),
            })
    }
}

/// Window computed on demand and memoized per time index.
pub struct LazyWindow {
    compute: LazyFn,
    cache: RefCell<HashMap<usize, Value>>,
}

impl LazyWindow {
    pub fn new(compute: LazyFn) -> Self {
        Self {
            compute,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Failed computations are not cached and are retried on the next read.
    pub fn get(&self, time: usize, view: &WindowView<'_>) -> Result<Value, WindowError> {
        if let Some(value) = self.cache.borrow().get(&time) {
            return Ok(value.clone());
        }
        let value = (self.compute)(time, view)?;
        self.cache.borrow_mut().insert(time, value.clone());
        Ok(value)
    }

    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

enum Window {
    Eager(EagerWindow),
    Lazy(LazyWindow),
}

/// All windows of one scene, in binding order.
///
/// A lazy window only sees the windows bound before it.
#[derive(Default)]
pub struct WindowSet {
    windows: IndexMap<String, Window>,
}

impl fmt::Debug for WindowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.windows.keys()).finish()
    }
}

impl WindowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_eager(&mut self, name: &str, sampler: Sampler) -> Result<(), WindowError> {
        self.bind(name, Window::Eager(EagerWindow::new(sampler)))
    }

    pub fn bind_lazy(&mut self, name: &str, compute: LazyFn) -> Result<(), WindowError> {
        self.bind(name, Window::Lazy(LazyWindow::new(compute)))
    }

    fn bind(&mut self, name: &str, window: Window) -> Result<(), WindowError> {
        if self.windows.contains_key(name) {
            return Err(WindowError::Duplicate {
                name: name.to_string(),
            });
        }
        self.windows.insert(name.to_string(), window);
        Ok(())
    }

    /// Sample every eager window once.
    pub fn refresh(&mut self) -> Result<(), WindowError> {
        for window in self.windows.values_mut() {
            if let Window::Eager(eager) = window {
                eager.update()?;
            }
        }
        Ok(())
    }

    /// Samples taken by the eager windows so far.
    pub fn elapsed(&self) -> usize {
        self.windows
            .values()
            .filter_map(|w| match w {
                Window::Eager(eager) => Some(eager.elapsed()),
                Window::Lazy(_) => None,
            })
            .min()
            .unwrap_or(0)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn sample_visible(&self, limit: usize, name: &str, time: usize) -> Result<Value, WindowError> {
        let (index, _, window) = self
            .windows
            .get_full(name)
            .filter(|(index, _, _)| *index < limit)
            .ok_or_else(|| WindowError::Unbound {
                name: name.to_string(),
            })?;
        match window {
            Window::Eager(eager) => eager.get(name, time).cloned(),
            Window::Lazy(lazy) => lazy.get(time, &WindowView { set: self, limit: index }),
        }
    }
}

impl StreamSource for WindowSet {
    fn sample(&self, name: &str, time: usize) -> Result<Value, WindowError> {
        self.sample_visible(self.windows.len(), name, time)
    }
}

/// The windows bound before a given lazy window.
pub struct WindowView<'a> {
    set: &'a WindowSet,
    limit: usize,
}

impl StreamSource for WindowView<'_> {
    fn sample(&self, name: &str, time: usize) -> Result<Value, WindowError> {
        self.set.sample_visible(self.limit, name, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn counter_window(set: &mut WindowSet, name: &str) -> Arc<AtomicI64> {
        let counter = Arc::new(AtomicI64::new(0));
        let handle = Arc::clone(&counter);
        set.bind_eager(
            name,
            Box::new(move || Ok(Value::Int(handle.fetch_add(1, Ordering::SeqCst)))),
        )
        .unwrap();
        counter
    }

    #[test]
    fn test_eager_read_requires_elapsed() {
        let mut set = WindowSet::new();
        counter_window(&mut set, "n");
        assert!(matches!(
            set.sample("n", 0),
            Err(WindowError::NotAvailable { time: 0, elapsed: 0, .. })
        ));
        set.refresh().unwrap();
        set.refresh().unwrap();
        assert_eq!(set.sample("n", 1).unwrap(), Value::Int(1));
        assert_eq!(set.elapsed(), 2);
        assert_eq!(
            set.sample("n", 2).unwrap_err().unavailable_time(),
            Some(2)
        );
    }

    #[test]
    fn test_lazy_memoizes_in_any_order() {
        let mut set = WindowSet::new();
        counter_window(&mut set, "n");
        set.bind_lazy(
            "double",
            Box::new(|t, view| match view.sample("n", t)? {
                Value::Int(n) => Ok(Value::Int(n * 2)),
                other => Ok(other),
            }),
        )
        .unwrap();
        for _ in 0..3 {
            set.refresh().unwrap();
        }

        assert_eq!(set.sample("double", 2).unwrap(), Value::Int(4));
        assert_eq!(set.sample("double", 0).unwrap(), Value::Int(0));
        assert_eq!(set.sample("double", 2).unwrap(), Value::Int(4));
    }

    #[test]
    fn test_lazy_failure_not_cached() {
        let mut set = WindowSet::new();
        counter_window(&mut set, "n");
        set.bind_lazy("copy", Box::new(|t, view| view.sample("n", t)))
            .unwrap();

        assert!(set.sample("copy", 0).is_err());
        set.refresh().unwrap();
        assert_eq!(set.sample("copy", 0).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_lazy_sees_only_earlier_windows() {
        let mut set = WindowSet::new();
        set.bind_lazy("early", Box::new(|t, view| view.sample("late", t)))
            .unwrap();
        counter_window(&mut set, "late");
        set.refresh().unwrap();

        assert!(matches!(
            set.sample("early", 0),
            Err(WindowError::Unbound { .. })
        ));
        assert_eq!(set.sample("late", 0).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut set = WindowSet::new();
        counter_window(&mut set, "n");
        assert!(matches!(
            set.bind_lazy("n", Box::new(|_, _| Ok(Value::Bool(true)))),
            Err(WindowError::Duplicate { .. })
        ));
    }
}
