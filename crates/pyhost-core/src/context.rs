//! Host-configured execution context (`spec.md` §3 "Context" / §6).
//!
//! Built once per run via [`ContextBuilder`], grounded in the teacher's
//! `SessionManager` construction pattern (`session_manager.rs`): a typed
//! builder assembling an otherwise-immutable bundle of host-provided
//! capabilities, filesystem, injected modules, and environment variables,
//! plus the mutable state a run accumulates (stdout buffer, module cache,
//! compute deadline).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::capability::CapabilitySet;
use crate::error::{EvalResult, RunSignal};
use crate::filesystem::{Filesystem, MemoryFilesystem};
use crate::value::Value;

/// Immutable host configuration plus the mutable state a single run
/// accumulates. Cloning a `Context` is cheap (`Arc` to shared inner state);
/// clones observe the same stdout buffer and module cache.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    capabilities: CapabilitySet,
    filesystem: Arc<dyn Filesystem>,
    /// Modules the embedder injects directly as pre-built `Value::Module`s;
    /// these take precedence over builtin stdlib stubs and filesystem
    /// modules at import time (spec.md §6 resolution order).
    injected_modules: HashMap<String, Value>,
    environ: HashMap<String, String>,
    output: Mutex<String>,
    module_cache: Mutex<HashMap<String, Value>>,
    /// Compute-time budget accounting (`spec.md` §5/§8 "deadline
    /// monotonicity"): `compute_remaining` is whatever budget is left, and
    /// `running_since` is `Some` exactly while the clock is ticking against
    /// it. A bracketed host I/O call (`pause_compute`/`resume_compute`)
    /// folds its elapsed wall-clock time out of `compute_remaining` before
    /// resetting `running_since`, so time spent waiting on the filesystem or
    /// a guarded network/db stub never counts against the script's budget.
    compute_remaining: Mutex<Option<Duration>>,
    running_since: Mutex<Option<Instant>>,
    default_duration: Option<Duration>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.inner.capabilities
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        self.inner.filesystem.as_ref()
    }

    pub fn injected_module(&self, name: &str) -> Option<Value> {
        self.inner.injected_modules.get(name).cloned()
    }

    pub fn env_var(&self, name: &str) -> Option<String> {
        self.inner.environ.get(name).cloned()
    }

    pub fn environ(&self) -> &HashMap<String, String> {
        &self.inner.environ
    }

    pub fn write_stdout(&self, text: &str) {
        self.inner.output.lock().unwrap().push_str(text);
    }

    pub fn take_stdout(&self) -> String {
        std::mem::take(&mut *self.inner.output.lock().unwrap())
    }

    pub fn cached_module(&self, name: &str) -> Option<Value> {
        self.inner.module_cache.lock().unwrap().get(name).cloned()
    }

    pub fn cache_module(&self, name: impl Into<String>, module: Value) {
        self.inner.module_cache.lock().unwrap().insert(name.into(), module);
    }

    /// Starts (or restarts) the per-run compute budget, per `spec.md` §5
    /// "wall-clock budget... timeout is a host-level abort, never catchable".
    pub fn begin_run(&self) {
        *self.inner.compute_remaining.lock().unwrap() = self.inner.default_duration;
        *self.inner.running_since.lock().unwrap() = self.inner.default_duration.map(|_| Instant::now());
    }

    /// Checked before each statement/loop iteration by the evaluator. Only
    /// the time the clock has actually been running against counts: time
    /// folded out by a `pause_compute`/`resume_compute` bracket never trips
    /// this.
    pub fn check_deadline(&self) -> EvalResult<()> {
        let remaining = *self.inner.compute_remaining.lock().unwrap();
        let Some(remaining) = remaining else { return Ok(()) };
        let running_since = *self.inner.running_since.lock().unwrap();
        let elapsed_since_resume = running_since.map(|t| t.elapsed()).unwrap_or_default();
        if elapsed_since_resume >= remaining {
            return Err(RunSignal::timeout());
        }
        Ok(())
    }

    /// Excludes the wall-clock time spent in a host I/O call (filesystem
    /// read/write, a guarded network/db stub) from the compute budget.
    /// Idempotent: pausing an already-paused context is a no-op, so nested
    /// I/O-performing helpers can each bracket their own call.
    pub fn pause_compute(&self) {
        let mut running_since = self.inner.running_since.lock().unwrap();
        if let Some(start) = running_since.take() {
            let mut remaining = self.inner.compute_remaining.lock().unwrap();
            if let Some(r) = remaining.as_mut() {
                *r = r.saturating_sub(start.elapsed());
            }
        }
    }

    /// Resumes the compute clock after a `pause_compute`. A no-op if the run
    /// has no budget configured or the clock is already running.
    pub fn resume_compute(&self) {
        let mut running_since = self.inner.running_since.lock().unwrap();
        if running_since.is_none() && self.inner.compute_remaining.lock().unwrap().is_some() {
            *running_since = Some(Instant::now());
        }
    }

    /// Brackets a host I/O call with `pause_compute`/`resume_compute` so its
    /// wall-clock time is excluded from the script's compute budget.
    pub fn excluding_compute_time<T>(&self, io: impl FnOnce() -> T) -> T {
        self.pause_compute();
        let result = io();
        self.resume_compute();
        result
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    capabilities: Option<CapabilitySet>,
    filesystem: Option<Arc<dyn Filesystem>>,
    injected_modules: HashMap<String, Value>,
    environ: HashMap<String, String>,
    max_duration: Option<Duration>,
}

impl ContextBuilder {
    #[must_use]
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    #[must_use]
    pub fn filesystem(mut self, filesystem: Arc<dyn Filesystem>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    #[must_use]
    pub fn inject_module(mut self, name: impl Into<String>, module: Value) -> Self {
        self.injected_modules.insert(name.into(), module);
        self
    }

    #[must_use]
    pub fn env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environ.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                capabilities: self.capabilities.unwrap_or_default(),
                filesystem: self.filesystem.unwrap_or_else(|| Arc::new(MemoryFilesystem::new())),
                injected_modules: self.injected_modules,
                environ: self.environ,
                output: Mutex::new(String::new()),
                module_cache: Mutex::new(HashMap::new()),
                compute_remaining: Mutex::new(None),
                running_since: Mutex::new(None),
                default_duration: self.max_duration,
            }),
        }
    }
}
