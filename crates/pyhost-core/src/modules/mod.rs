//! Module resolution and the built-in stdlib surface (`spec.md` §4.7, §6).
//!
//! Resolution precedence on `import name`: a context-injected module first,
//! then a builtin stub from this file, then a `.py` file read through the
//! configured [`crate::filesystem::Filesystem`]. A resolved module is cached
//! on the `Context` so a second `import` of the same name is a cache hit and
//! any side effects in its top-level code run exactly once.

mod boto3;
mod collections;
mod csv;
mod datetime;
mod fastapi;
mod html;
mod itertools;
mod json;
mod jinja2;
mod markdown;
mod math;
mod os;
mod pydantic;
mod random;
mod re;
mod requests;
mod sql;
mod time;
mod unittest;
mod uuid;

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::error::{EvalResult, RunSignal};
use crate::evaluator::Evaluator;
use crate::value::{BuiltinFn, Value};

pub struct ModuleData {
    pub name: String,
    pub attrs: IndexMap<String, Value>,
}

pub type ModuleRef = Arc<Mutex<ModuleData>>;

pub fn module_value(name: impl Into<String>, attrs: IndexMap<String, Value>) -> Value {
    Value::Module(Arc::new(Mutex::new(ModuleData { name: name.into(), attrs })))
}

pub fn builtin(name: &str, func: impl Fn(&mut Evaluator, Vec<Value>, Vec<(String, Value)>) -> EvalResult<Value> + Send + Sync + 'static) -> Value {
    Value::Builtin(Arc::new(BuiltinFn { name: name.to_string(), func: Box::new(func) }))
}

/// Returns `true` for every name `spec.md` §4.7 lists as a recognized
/// builtin/guarded stdlib module, whether or not the embedder granted the
/// capability it needs — the module still resolves and imports; only calling
/// a guarded function inside it can raise `PermissionError`.
fn builtin_module_by_name(name: &str) -> Option<Value> {
    match name {
        "math" => Some(math::build()),
        "json" => Some(json::build()),
        "re" => Some(re::build()),
        "time" => Some(time::build()),
        "datetime" => Some(datetime::build()),
        "collections" => Some(collections::build()),
        "csv" => Some(csv::build()),
        "itertools" => Some(itertools::build()),
        "random" => Some(random::build()),
        "uuid" => Some(uuid::build()),
        "os" => Some(os::build()),
        "unittest" => Some(unittest::build()),
        "html" => Some(html::build()),
        "markdown" => Some(markdown::build()),
        "jinja2" => Some(jinja2::build()),
        "pydantic" => Some(pydantic::build()),
        "fastapi" => Some(fastapi::build()),
        "requests" => Some(requests::build()),
        "sql" => Some(sql::build()),
        "boto3" => Some(boto3::build()),
        _ => None,
    }
}

/// Resolves `name` per the precedence order above, executing filesystem
/// module top-level code on first import and caching the resulting module.
pub fn import_module(evaluator: &mut Evaluator, name: &str) -> EvalResult<Value> {
    let ctx = evaluator.context().clone();
    if let Some(cached) = ctx.cached_module(name) {
        tracing::debug!(module = name, "import cache hit");
        return Ok(cached);
    }
    if let Some(injected) = ctx.injected_module(name) {
        tracing::debug!(module = name, "import resolved from host-injected module");
        ctx.cache_module(name, injected.clone());
        return Ok(injected);
    }
    if let Some(builtin_mod) = builtin_module_by_name(name) {
        tracing::debug!(module = name, "import resolved from builtin stdlib stub");
        ctx.cache_module(name, builtin_mod.clone());
        return Ok(builtin_mod);
    }
    let path = format!("{}.py", name.replace('.', "/"));
    let Some(source) = ctx.excluding_compute_time(|| ctx.filesystem().read(&path)) else {
        return Err(RunSignal::import_error(format!("No module named '{name}'")));
    };
    tracing::debug!(module = name, path = %path, "import resolved from filesystem");
    let module_value = evaluator.run_submodule(name, &source)?;
    ctx.cache_module(name, module_value.clone());
    Ok(module_value)
}

/// Helper for module implementations: raises `PermissionError` unless `cap`
/// is granted, mirroring `spec.md` §4.7's "stub on disabled import" rule —
/// the module and its names stay visible; only the call fails.
pub fn require(evaluator: &Evaluator, cap: &crate::capability::Capability, operation: &str) -> EvalResult<()> {
    if evaluator.context().capabilities().allows(cap) {
        Ok(())
    } else {
        tracing::warn!(%cap, operation, "capability denied");
        Err(RunSignal::permission_error(format!("{operation} requires capability '{cap}'")))
    }
}

pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::None)
}

pub(crate) fn as_str(v: &Value) -> String {
    match v {
        Value::Str(s) => (**s).clone(),
        other => crate::builtins::repr_value(other),
    }
}

pub(crate) fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => crate::builtins::bigint_to_f64(i),
        Value::Float(f) => *f,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}
