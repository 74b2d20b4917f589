//! Scope chain (`spec.md` §3 "Environment").
//!
//! Frames are `Arc<Mutex<HashMap>>` so a closure can share its defining
//! frame with the function that created it (and with sibling closures
//! captured from the same enclosing call), matching the "enclosing: lexical
//! captures of nested defs" frame kind. Lookup walks local -> enclosing*
//! -> module-global -> builtins, exactly as specified.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::{EvalResult, RunSignal};
use crate::value::Value;

pub type Frame = Arc<Mutex<HashMap<String, Value>>>;

pub fn new_frame() -> Frame {
    Arc::new(Mutex::new(HashMap::new()))
}

#[derive(Clone)]
pub struct Env {
    pub local: Frame,
    /// Innermost-first chain of lexically enclosing function frames.
    pub enclosing: Vec<Frame>,
    pub globals: Frame,
    pub builtins: Frame,
    /// Names declared `global` in the current function body.
    pub global_decls: Arc<Mutex<HashSet<String>>>,
    /// Names declared `nonlocal` in the current function body.
    pub nonlocal_decls: Arc<Mutex<HashSet<String>>>,
}

impl Env {
    pub fn new_module(builtins: Frame) -> Self {
        Env {
            local: new_frame(),
            enclosing: Vec::new(),
            globals: new_frame(),
            builtins,
            global_decls: Arc::new(Mutex::new(HashSet::new())),
            nonlocal_decls: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Environment for a fresh call frame closing over `self` (used both for
    /// calling a defined function and for a comprehension's own scope, per
    /// `spec.md` §4.4 "Comprehensions ... execute in a fresh scope").
    pub fn child_call(&self) -> Self {
        let mut enclosing = Vec::with_capacity(self.enclosing.len() + 1);
        enclosing.push(self.local.clone());
        enclosing.extend(self.enclosing.iter().cloned());
        Env {
            local: new_frame(),
            enclosing,
            globals: self.globals.clone(),
            builtins: self.builtins.clone(),
            global_decls: Arc::new(Mutex::new(HashSet::new())),
            nonlocal_decls: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Environment for a closure at definition time: the frame chain to
    /// capture without creating a new local frame yet (the call itself adds
    /// one via `child_call` when invoked).
    pub fn capture(&self) -> Self {
        self.clone()
    }

    pub fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(v) = self.local.lock().unwrap().get(name) {
            return Ok(v.clone());
        }
        for frame in &self.enclosing {
            if let Some(v) = frame.lock().unwrap().get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.globals.lock().unwrap().get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.builtins.lock().unwrap().get(name) {
            return Ok(v.clone());
        }
        Err(RunSignal::name_error(format!("name '{name}' is not defined")))
    }

    pub fn assign(&self, name: &str, value: Value) {
        if self.global_decls.lock().unwrap().contains(name) {
            self.globals.lock().unwrap().insert(name.to_string(), value);
            return;
        }
        if self.nonlocal_decls.lock().unwrap().contains(name) {
            for frame in &self.enclosing {
                let mut guard = frame.lock().unwrap();
                if guard.contains_key(name) {
                    guard.insert(name.to_string(), value);
                    return;
                }
            }
            // Declared nonlocal but absent: still write to nearest enclosing
            // frame so the binding becomes visible (mirrors CPython closing
            // over the cell regardless of prior assignment order).
            if let Some(frame) = self.enclosing.first() {
                frame.lock().unwrap().insert(name.to_string(), value);
                return;
            }
        }
        self.local.lock().unwrap().insert(name.to_string(), value);
    }

    pub fn declare_global(&self, name: &str) {
        self.global_decls.lock().unwrap().insert(name.to_string());
    }

    /// Returns `Err` when `name` cannot resolve to any enclosing non-global
    /// frame, per `spec.md` §3 ("nonlocal must resolve to an enclosing
    /// non-global frame or it is a compile-time error").
    pub fn declare_nonlocal(&self, name: &str) -> Result<(), String> {
        if self.enclosing.is_empty() {
            return Err(format!("no binding for nonlocal '{name}' found"));
        }
        self.nonlocal_decls.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    pub fn delete(&self, name: &str) -> EvalResult<()> {
        if self.local.lock().unwrap().remove(name).is_some() {
            return Ok(());
        }
        for frame in &self.enclosing {
            if frame.lock().unwrap().remove(name).is_some() {
                return Ok(());
            }
        }
        if self.globals.lock().unwrap().remove(name).is_some() {
            return Ok(());
        }
        Err(RunSignal::name_error(format!("name '{name}' is not defined")))
    }
}
