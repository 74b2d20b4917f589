//! Tree-walking evaluator (`spec.md` §4.4).

pub mod fileobj;
pub mod generator;

use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::context::Context;
use crate::environment::{new_frame, Env, Frame};
use crate::error::{EvalResult, Exception, ExcType, RunSignal};
use crate::object::{self, ClassRef, InstanceRef, InstanceValue};
use crate::parser::ast::*;
use crate::value::{BoundMethod, DictKey, FunctionValue, ParamSpec, SuperProxy, Value};

use generator::{GeneratorHandle, GeneratorIo};

/// Non-error control transfer: a Python-level raise travels as
/// `EvalResult::Err(RunSignal::Exc(..))`, everything else (`break`,
/// `continue`, `return`) travels as `Signal` so it can unwind through
/// exactly the constructs that understand it (loops, function bodies).
pub(crate) enum Signal {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Evaluator {
    ctx: Context,
    builtins: Frame,
    pub(crate) gen_io: Option<GeneratorIo>,
    call_depth: usize,
}

const MAX_CALL_DEPTH: usize = 1000;

impl Evaluator {
    pub fn new(ctx: Context) -> Self {
        let builtins = crate::builtins::install(object::object_class());
        Evaluator { ctx, builtins, gen_io: None, call_depth: 0 }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn fork_for_thread(&self) -> Evaluator {
        Evaluator { ctx: self.ctx.clone(), builtins: self.builtins.clone(), gen_io: None, call_depth: self.call_depth }
    }

    pub fn monotonic_seconds(&self) -> f64 {
        use std::sync::OnceLock;
        use std::time::Instant;
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
    }

    pub fn check_deadline(&mut self) -> EvalResult<()> {
        self.ctx.check_deadline()
    }

    /// Runs a module's top-level statements. A trailing bare expression
    /// statement (as in a REPL, or the scenario fixtures in `spec.md` §8)
    /// becomes the module's result rather than being discarded; any other
    /// module falls back to `None` unless it hits a top-level `return`.
    pub fn run_module(&mut self, stmts: &[Stmt]) -> EvalResult<Value> {
        let _span = tracing::info_span!("run_module", statements = stmts.len()).entered();
        self.ctx.begin_run();
        let env = Env::new_module(self.builtins.clone());
        let mut last = Value::None;
        for stmt in stmts {
            self.check_deadline()?;
            if let Stmt::Expr(e) = stmt {
                last = self.eval_expr(&env, e)?;
                continue;
            }
            if let Signal::Return(v) = self.exec_stmt(&env, stmt)? {
                return Ok(v);
            }
        }
        Ok(last)
    }

    /// Executes `source` as a fresh module and wraps its top-level bindings
    /// as a `Value::Module`, for filesystem-resolved imports.
    pub fn run_submodule(&mut self, name: &str, source: &str) -> EvalResult<Value> {
        let tokens = crate::lexer::Lexer::new(source).tokenize().map_err(RunSignal::Abort)?;
        let stmts = crate::parser::parse(tokens).map_err(RunSignal::Abort)?;
        let env = Env::new_module(self.builtins.clone());
        self.exec_block(&env, &stmts)?;
        let attrs: IndexMap<String, Value> = env.local.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(crate::modules::module_value(name, attrs))
    }

    // ---- statement execution -------------------------------------------

    pub(crate) fn exec_block(&mut self, env: &Env, stmts: &[Stmt]) -> EvalResult<Signal> {
        for stmt in stmts {
            self.check_deadline()?;
            match self.exec_stmt(env, stmt)? {
                Signal::Normal => continue,
                other => return Ok(other),
            }
        }
        Ok(Signal::Normal)
    }

    fn exec_stmt(&mut self, env: &Env, stmt: &Stmt) -> EvalResult<Signal> {
        match stmt {
            Stmt::Line(_) | Stmt::Pass => Ok(Signal::Normal),
            Stmt::Expr(e) => {
                self.eval_expr(env, e)?;
                Ok(Signal::Normal)
            }
            Stmt::Assign { targets, value } => {
                let v = self.eval_expr(env, value)?;
                for target in targets {
                    self.assign_target(env, target, v.clone())?;
                }
                Ok(Signal::Normal)
            }
            Stmt::AugAssign { target, op, value } => {
                let current = self.eval_expr(env, target)?;
                let rhs = self.eval_expr(env, value)?;
                let result = self.apply_binop(aug_to_binop(*op), &current, &rhs)?;
                self.assign_target(env, target, result)?;
                Ok(Signal::Normal)
            }
            Stmt::AnnAssign { target, value, .. } => {
                if let Some(value) = value {
                    let v = self.eval_expr(env, value)?;
                    self.assign_target(env, target, v)?;
                }
                Ok(Signal::Normal)
            }
            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::None,
                };
                Ok(Signal::Return(v))
            }
            Stmt::Break => Ok(Signal::Break),
            Stmt::Continue => Ok(Signal::Continue),
            Stmt::Delete(targets) => {
                for t in targets {
                    if let Expr::Name(name) = t {
                        env.delete(name)?;
                    }
                }
                Ok(Signal::Normal)
            }
            Stmt::Global(names) => {
                for n in names {
                    env.declare_global(n);
                }
                Ok(Signal::Normal)
            }
            Stmt::Nonlocal(names) => {
                for n in names {
                    env.declare_nonlocal(n).map_err(RunSignal::value_error)?;
                }
                Ok(Signal::Normal)
            }
            Stmt::Assert { test, msg } => {
                let test_value = self.eval_expr(env, test)?;
                if !self.truthy(&test_value)? {
                    let message = match msg {
                        Some(m) => {
                            let v = self.eval_expr(env, m)?;
                            self.str_value(&v)?
                        }
                        None => String::new(),
                    };
                    return Err(RunSignal::Exc(Exception::new(ExcType::AssertionError, message)));
                }
                Ok(Signal::Normal)
            }
            Stmt::Raise { exc, cause: _ } => match exc {
                Some(e) => {
                    let v = self.eval_expr(env, e)?;
                    Err(self.value_to_signal(v)?)
                }
                None => Err(RunSignal::Exc(Exception::new(ExcType::RuntimeError, "No active exception to re-raise"))),
            },
            Stmt::Import { names } => {
                for (module, alias) in names {
                    let top = module.split('.').next().unwrap_or(module.as_str());
                    let value = crate::modules::import_module(self, top)?;
                    let bind_name = alias.clone().unwrap_or_else(|| top.to_string());
                    env.assign(&bind_name, value);
                }
                Ok(Signal::Normal)
            }
            Stmt::ImportFrom { module, names } => {
                let module_value = crate::modules::import_module(self, module)?;
                for (name, alias) in names {
                    if name == "*" {
                        let Value::Module(m) = &module_value else {
                            return Err(RunSignal::type_error(format!("cannot import * from non-module '{}'", module_value.type_name())));
                        };
                        let exports: Vec<(String, Value)> = m
                            .lock()
                            .unwrap()
                            .attrs
                            .iter()
                            .filter(|(k, _)| !k.starts_with('_'))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        for (export_name, value) in exports {
                            env.assign(&export_name, value);
                        }
                        continue;
                    }
                    let value = self.get_attr_value(&module_value, name)?;
                    env.assign(&alias.clone().unwrap_or_else(|| name.clone()), value);
                }
                Ok(Signal::Normal)
            }
            Stmt::If { test, body, orelse } => {
                let test_value = self.eval_expr(env, test)?;
                if self.truthy(&test_value)? {
                    self.exec_block(env, body)
                } else {
                    self.exec_block(env, orelse)
                }
            }
            Stmt::While { test, body, orelse } => {
                loop {
                    let test_value = self.eval_expr(env, test)?;
                    if !self.truthy(&test_value)? {
                        break;
                    }
                    self.check_deadline()?;
                    match self.exec_block(env, body)? {
                        Signal::Break => return Ok(Signal::Normal),
                        Signal::Return(v) => return Ok(Signal::Return(v)),
                        _ => {}
                    }
                }
                self.exec_block(env, orelse)
            }
            Stmt::For { target, iter, body, orelse } => {
                let iterable = self.eval_expr(env, iter)?;
                let mut it = self.make_iter(&iterable)?;
                loop {
                    self.check_deadline()?;
                    let Some(item) = it.next(self)? else { break };
                    self.assign_target(env, target, item)?;
                    match self.exec_block(env, body)? {
                        Signal::Break => return Ok(Signal::Normal),
                        Signal::Return(v) => return Ok(Signal::Return(v)),
                        _ => {}
                    }
                }
                self.exec_block(env, orelse)
            }
            Stmt::Try { body, handlers, orelse, finally } => self.exec_try(env, body, handlers, orelse, finally),
            Stmt::With { items, body } => self.exec_with(env, items, body),
            Stmt::FunctionDef(def) => {
                let func = self.make_function(env, def)?;
                env.assign(&def.name, func);
                Ok(Signal::Normal)
            }
            Stmt::ClassDef(def) => {
                let cls = self.make_class(env, def)?;
                env.assign(&def.name, cls);
                Ok(Signal::Normal)
            }
            Stmt::Match { subject, cases } => self.exec_match(env, subject, cases),
        }
    }

    fn exec_try(&mut self, env: &Env, body: &[Stmt], handlers: &[ExceptHandler], orelse: &[Stmt], finally: &[Stmt]) -> EvalResult<Signal> {
        let result = self.exec_block(env, body);
        let outcome = match result {
            Ok(sig) => {
                let else_result = self.exec_block(env, orelse);
                match (sig, else_result) {
                    (_, Err(e)) => self.handle_exception(env, e, handlers),
                    (sig, Ok(Signal::Normal)) => Ok(sig),
                    (_, Ok(other)) => Ok(other),
                }
            }
            Err(e) => self.handle_exception(env, e, handlers),
        };
        let finally_result = self.exec_block(env, finally)?;
        match finally_result {
            Signal::Normal => outcome,
            other => Ok(other),
        }
    }

    fn handle_exception(&mut self, env: &Env, signal: RunSignal, handlers: &[ExceptHandler]) -> EvalResult<Signal> {
        let exc = match signal {
            RunSignal::Exc(exc) => exc,
            abort @ RunSignal::Abort(_) => return Err(abort),
        };
        for handler in handlers {
            if self.exception_matches(&exc, &handler.types, env)? {
                if let Some(name) = &handler.name {
                    env.assign(name, self.exception_to_value(&exc));
                }
                return self.exec_block(env, &handler.body);
            }
        }
        Err(RunSignal::Exc(exc))
    }

    fn exception_matches(&mut self, exc: &Exception, types: &[Expr], env: &Env) -> EvalResult<bool> {
        if types.is_empty() {
            return Ok(true);
        }
        for t in types {
            let value = self.eval_expr(env, t)?;
            if let Value::Class(cls) = value {
                if self.exception_is_instance_of_class(exc, &cls) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn exception_is_instance_of_class(&self, exc: &Exception, cls: &ClassRef) -> bool {
        if let Some(Value::Instance(inst)) = &exc.instance {
            return object::is_subclass(&inst.lock().unwrap().class, cls);
        }
        let target_exc = cls.lock().unwrap().exc_type;
        matches!(target_exc, Some(t) if exc.exc_type.is_subclass_of(t))
    }

    fn exception_to_value(&self, exc: &Exception) -> Value {
        if let Some(v) = &exc.instance {
            return v.clone();
        }
        let cls = object::class_for_exc_type(exc.exc_type).unwrap_or_else(object::object_class);
        let mut attrs = IndexMap::new();
        attrs.insert("args".into(), Value::tuple(vec![Value::str(exc.message.clone())]));
        Value::Instance(Arc::new(std::sync::Mutex::new(InstanceValue { class: cls, attrs })))
    }

    fn value_to_signal(&mut self, v: Value) -> EvalResult<RunSignal> {
        match &v {
            Value::Class(cls) => {
                let exc_type = cls.lock().unwrap().exc_type.unwrap_or(ExcType::UserDefined);
                let instance = self.instantiate(cls.clone(), Vec::new(), Vec::new())?;
                let message = self.str_value(&instance).unwrap_or_default();
                Ok(RunSignal::Exc(Exception { exc_type, message, instance: Some(instance) }))
            }
            Value::Instance(_) => {
                let message = self.str_value(&v)?;
                Ok(RunSignal::Exc(Exception { exc_type: ExcType::UserDefined, message, instance: Some(v) }))
            }
            _ => Ok(RunSignal::type_error("exceptions must derive from BaseException")),
        }
    }

    fn exec_with(&mut self, env: &Env, items: &[WithItem], body: &[Stmt]) -> EvalResult<Signal> {
        let mut managers = Vec::with_capacity(items.len());
        for item in items {
            let manager = self.eval_expr(env, &item.context_expr)?;
            let entered = self.call_dunder(&manager, "__enter__", Vec::new())?;
            if let Some(target) = &item.optional_vars {
                self.assign_target(env, target, entered)?;
            }
            managers.push(manager);
        }
        let result = self.exec_block(env, body);
        let mut propagate = result;
        for manager in managers.into_iter().rev() {
            let exit_args = match &propagate {
                Err(RunSignal::Exc(exc)) => {
                    let exc_type = match &exc.instance {
                        Some(Value::Instance(inst)) => Value::Class(inst.lock().unwrap().class.clone()),
                        _ => object::class_for_exc_type(exc.exc_type).map(Value::Class).unwrap_or(Value::None),
                    };
                    vec![exc_type, self.exception_to_value(exc), Value::None]
                }
                _ => vec![Value::None, Value::None, Value::None],
            };
            let suppressed = self.call_dunder(&manager, "__exit__", exit_args).map(|v| self.truthy_default_only(&v)).unwrap_or(false);
            if let Err(RunSignal::Exc(_)) = &propagate {
                if suppressed {
                    propagate = Ok(Signal::Normal);
                }
            }
        }
        propagate
    }

    fn truthy_default_only(&self, v: &Value) -> bool {
        v.truthy_default()
    }

    fn exec_match(&mut self, env: &Env, subject: &Expr, cases: &[MatchCase]) -> EvalResult<Signal> {
        let value = self.eval_expr(env, subject)?;
        for case in cases {
            let mut bound = Vec::new();
            let matched = self.pattern_matches(env, &case.pattern, &value, &mut bound)?;
            if matched {
                let guard_ok = match &case.guard {
                    Some(guard) => {
                        let guard_value = self.eval_expr(env, guard)?;
                        self.truthy(&guard_value)?
                    }
                    None => true,
                };
                if guard_ok {
                    return self.exec_block(env, &case.body);
                }
            }
            // Pattern matched but the guard failed, or the pattern itself
            // only partially matched: undo whatever this case bound so it
            // can't leak into a later case or past the `match` entirely.
            for name in bound {
                let _ = env.delete(&name);
            }
        }
        Ok(Signal::Normal)
    }

    fn pattern_matches(&mut self, env: &Env, pattern: &Pattern, value: &Value, bound: &mut Vec<String>) -> EvalResult<bool> {
        match pattern {
            Pattern::Wildcard => Ok(true),
            Pattern::Capture(name) => {
                env.assign(name, value.clone());
                bound.push(name.clone());
                Ok(true)
            }
            Pattern::As { pattern, name } => {
                if self.pattern_matches(env, pattern, value, bound)? {
                    env.assign(name, value.clone());
                    bound.push(name.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Pattern::Or(alts) => {
                for alt in alts {
                    let mut alt_bound = Vec::new();
                    if self.pattern_matches(env, alt, value, &mut alt_bound)? {
                        bound.extend(alt_bound);
                        return Ok(true);
                    }
                    for name in alt_bound {
                        let _ = env.delete(&name);
                    }
                }
                Ok(false)
            }
            Pattern::Literal(expr) => {
                let pv = self.eval_expr(env, expr)?;
                self.values_equal(&pv, value)
            }
            Pattern::Sequence { prefix, rest, suffix } => {
                let items = match value {
                    Value::List(l) => l.lock().unwrap().clone(),
                    Value::Tuple(t) => (**t).clone(),
                    _ => return Ok(false),
                };
                let min_len = prefix.len() + suffix.len();
                if rest.is_none() && items.len() != min_len {
                    return Ok(false);
                }
                if items.len() < min_len {
                    return Ok(false);
                }
                for (pat, item) in prefix.iter().zip(items.iter()) {
                    if !self.pattern_matches(env, pat, item, bound)? {
                        return Ok(false);
                    }
                }
                let suffix_start = items.len() - suffix.len();
                for (pat, item) in suffix.iter().zip(items[suffix_start..].iter()) {
                    if !self.pattern_matches(env, pat, item, bound)? {
                        return Ok(false);
                    }
                }
                if let Some(Some(name)) = rest {
                    env.assign(name, Value::list(items[prefix.len()..suffix_start].to_vec()));
                    bound.push(name.clone());
                }
                Ok(true)
            }
            Pattern::Mapping { keys, patterns, rest } => {
                let Value::Dict(map) = value else { return Ok(false) };
                let map = map.lock().unwrap();
                let mut matched_keys = Vec::new();
                for (key_expr, pat) in keys.iter().zip(patterns.iter()) {
                    let key_value = self.eval_expr(env, key_expr)?;
                    let Some(key) = DictKey::from_value(&key_value) else { return Ok(false) };
                    let Some(item) = map.get(&key) else { return Ok(false) };
                    if !self.pattern_matches(env, pat, item, bound)? {
                        return Ok(false);
                    }
                    matched_keys.push(key);
                }
                if let Some(name) = rest {
                    let mut remaining = IndexMap::new();
                    for (k, v) in map.iter() {
                        if !matched_keys.contains(k) {
                            remaining.insert(k.clone(), v.clone());
                        }
                    }
                    env.assign(name, Value::dict(remaining));
                    bound.push(name.clone());
                }
                Ok(true)
            }
            Pattern::Class { name, positional, keyword } => {
                let class_value = self.eval_expr(env, name)?;
                let Value::Class(cls) = class_value else { return Ok(false) };
                let Value::Instance(inst) = value else { return Ok(false) };
                if !object::is_subclass(&inst.lock().unwrap().class, &cls) {
                    return Ok(false);
                }
                let match_args = cls.lock().unwrap().match_args.clone();
                for (i, pat) in positional.iter().enumerate() {
                    let Some(field) = match_args.get(i) else { return Ok(false) };
                    let field_value = object::get_attr(inst, field)?;
                    if !self.pattern_matches(env, pat, &field_value, bound)? {
                        return Ok(false);
                    }
                }
                for (field, pat) in keyword {
                    let field_value = object::get_attr(inst, field)?;
                    if !self.pattern_matches(env, pat, &field_value, bound)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn assign_target(&mut self, env: &Env, target: &Expr, value: Value) -> EvalResult<()> {
        match target {
            Expr::Name(name) => {
                env.assign(name, value);
                Ok(())
            }
            Expr::Attribute { value: obj_expr, attr } => {
                let obj = self.eval_expr(env, obj_expr)?;
                self.set_attr_value(&obj, attr, value)
            }
            Expr::Subscript { value: obj_expr, index } => {
                let obj = self.eval_expr(env, obj_expr)?;
                let key = self.eval_expr(env, index)?;
                self.set_item(&obj, key, value)
            }
            Expr::Tuple(items) | Expr::List(items) => {
                let values = self.iterate_to_vec(&value)?;
                self.destructure(env, items, values)
            }
            Expr::Starred(inner) => self.assign_target(env, inner, value),
            _ => Err(RunSignal::type_error("cannot assign to this expression")),
        }
    }

    fn destructure(&mut self, env: &Env, targets: &[Expr], values: Vec<Value>) -> EvalResult<()> {
        let star_pos = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
        match star_pos {
            None => {
                if targets.len() != values.len() {
                    return Err(RunSignal::value_error(format!(
                        "{} values to unpack (expected {})",
                        if values.len() > targets.len() { "too many" } else { "not enough" },
                        targets.len()
                    )));
                }
                for (t, v) in targets.iter().zip(values) {
                    self.assign_target(env, t, v)?;
                }
                Ok(())
            }
            Some(pos) => {
                let after = targets.len() - pos - 1;
                if values.len() < targets.len() - 1 {
                    return Err(RunSignal::value_error("not enough values to unpack"));
                }
                for (t, v) in targets[..pos].iter().zip(values.iter()) {
                    self.assign_target(env, t, v.clone())?;
                }
                let star_slice = values[pos..values.len() - after].to_vec();
                self.assign_target(env, &targets[pos], Value::list(star_slice))?;
                for (t, v) in targets[pos + 1..].iter().zip(values[values.len() - after..].iter()) {
                    self.assign_target(env, t, v.clone())?;
                }
                Ok(())
            }
        }
    }

    // ---- expression evaluation ------------------------------------------

    fn eval_expr(&mut self, env: &Env, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(raw) => Ok(Value::Int(parse_int_literal(raw))),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::str(s.clone())),
            Expr::Bytes(b) => Ok(Value::Bytes(Arc::new(b.clone()))),
            Expr::Ellipsis => Ok(Value::None),
            Expr::FString(parts) => self.eval_fstring(env, parts),
            Expr::Name(name) => env.lookup(name),
            Expr::List(items) => Ok(Value::list(self.eval_seq(env, items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_seq(env, items)?)),
            Expr::SetLit(items) => {
                let mut set = indexmap::IndexSet::new();
                for item in self.eval_seq(env, items)? {
                    set.insert(DictKey::from_value(&item).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", item.type_name())))?);
                }
                Ok(Value::Set(Arc::new(std::sync::Mutex::new(set))))
            }
            Expr::Dict(pairs) => {
                let mut map = IndexMap::new();
                for (k, v) in pairs {
                    let value = self.eval_expr(env, v)?;
                    match k {
                        Some(key_expr) => {
                            let key_value = self.eval_expr(env, key_expr)?;
                            let key = DictKey::from_value(&key_value).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", key_value.type_name())))?;
                            map.insert(key, value);
                        }
                        None => {
                            if let Value::Dict(other) = value {
                                for (k, v) in other.lock().unwrap().iter() {
                                    map.insert(k.clone(), v.clone());
                                }
                            }
                        }
                    }
                }
                Ok(Value::dict(map))
            }
            Expr::ListComp { element, generators } => {
                let mut out = Vec::new();
                let comp_env = env.child_call();
                self.run_comprehension(env, &comp_env, generators, &mut |eval, scope| {
                    out.push(eval.eval_expr(scope, element)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Expr::SetComp { element, generators } => {
                let mut out = indexmap::IndexSet::new();
                let comp_env = env.child_call();
                self.run_comprehension(env, &comp_env, generators, &mut |eval, scope| {
                    let v = eval.eval_expr(scope, element)?;
                    out.insert(DictKey::from_value(&v).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", v.type_name())))?);
                    Ok(())
                })?;
                Ok(Value::Set(Arc::new(std::sync::Mutex::new(out))))
            }
            Expr::DictComp { key, value, generators } => {
                let mut out = IndexMap::new();
                let comp_env = env.child_call();
                self.run_comprehension(env, &comp_env, generators, &mut |eval, scope| {
                    let k = eval.eval_expr(scope, key)?;
                    let v = eval.eval_expr(scope, value)?;
                    let dict_key = DictKey::from_value(&k).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", k.type_name())))?;
                    out.insert(dict_key, v);
                    Ok(())
                })?;
                Ok(Value::dict(out))
            }
            Expr::GeneratorExp { element, generators } => {
                // Eagerly materialized: the evaluator consumes iterables
                // through `iterate_to_vec`, so a genexp behaves like a list
                // everywhere it is actually driven (`sum(...)`, `list(...)`).
                let mut out = Vec::new();
                let comp_env = env.child_call();
                self.run_comprehension(env, &comp_env, generators, &mut |eval, scope| {
                    out.push(eval.eval_expr(scope, element)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Expr::UnaryOp { op, operand } => {
                let v = self.eval_expr(env, operand)?;
                self.apply_unary(*op, &v)
            }
            Expr::BinOp { op, left, right } => {
                let l = self.eval_expr(env, left)?;
                let r = self.eval_expr(env, right)?;
                self.apply_binop(*op, &l, &r)
            }
            Expr::BoolOp { op, values } => {
                let mut result = Value::None;
                for (i, v) in values.iter().enumerate() {
                    result = self.eval_expr(env, v)?;
                    let truthy = self.truthy(&result)?;
                    if (*op == BoolOp::And && !truthy) || (*op == BoolOp::Or && truthy) {
                        return Ok(result);
                    }
                    let _ = i;
                }
                Ok(result)
            }
            Expr::Compare { left, ops, comparators } => {
                let mut current = self.eval_expr(env, left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let next = self.eval_expr(env, comparator)?;
                    if !self.apply_cmp(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args, keywords } => self.eval_call(env, func, args, keywords),
            Expr::Attribute { value, attr } => {
                let v = self.eval_expr(env, value)?;
                self.get_attr_value(&v, attr)
            }
            Expr::Subscript { value, index } => {
                let v = self.eval_expr(env, value)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    return self.eval_slice(env, &v, lower.as_deref(), upper.as_deref(), step.as_deref());
                }
                let key = self.eval_expr(env, index)?;
                self.get_item(&v, &key)
            }
            Expr::Slice { .. } => Err(RunSignal::type_error("slice used outside subscript")),
            Expr::IfExp { test, body, orelse } => {
                let test_value = self.eval_expr(env, test)?;
                if self.truthy(&test_value)? {
                    self.eval_expr(env, body)
                } else {
                    self.eval_expr(env, orelse)
                }
            }
            Expr::Lambda { params, body } => {
                let param_spec = self.build_param_spec(env, params)?;
                let stmts = Arc::new(vec![Stmt::Return(Some((**body).clone()))]);
                Ok(Value::Function(Arc::new(FunctionValue {
                    name: "<lambda>".to_string(),
                    params: param_spec,
                    body: stmts,
                    closure: env.capture(),
                    is_generator: false,
                    module_name: "__main__".to_string(),
                })))
            }
            Expr::Starred(inner) => self.eval_expr(env, inner),
            Expr::Yield(value) => {
                let v = match value {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::None,
                };
                match &self.gen_io {
                    Some(io) => Ok(io.yield_value(v)),
                    None => Err(RunSignal::Abort(crate::error::HostError::internal("'yield' outside function"))),
                }
            }
            Expr::YieldFrom(inner) => {
                let source = self.eval_expr(env, inner)?;
                let mut it = self.make_iter(&source)?;
                while let Some(item) = it.next(self)? {
                    match &self.gen_io {
                        Some(io) => {
                            io.yield_value(item);
                        }
                        None => return Err(RunSignal::Abort(crate::error::HostError::internal("'yield' outside function"))),
                    }
                }
                Ok(it.stop_value())
            }
            Expr::Await(inner) => self.eval_expr(env, inner),
            Expr::NamedExpr { target, value } => {
                let v = self.eval_expr(env, value)?;
                env.assign(target, v.clone());
                Ok(v)
            }
        }
    }

    fn eval_seq(&mut self, env: &Env, items: &[Expr]) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = item {
                let v = self.eval_expr(env, inner)?;
                out.extend(self.iterate_to_vec(&v)?);
            } else {
                out.push(self.eval_expr(env, item)?);
            }
        }
        Ok(out)
    }

    fn eval_fstring(&mut self, env: &Env, parts: &[StringPart]) -> EvalResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                StringPart::Literal(s) => out.push_str(s),
                StringPart::Expr { expr, conversion, format_spec } => {
                    let v = self.eval_expr(env, expr)?;
                    let mut rendered = match conversion {
                        Some('r') => self.repr_value_dispatch(&v)?,
                        Some('a') => self.repr_value_dispatch(&v)?,
                        _ => self.str_value(&v)?,
                    };
                    if let Some(spec_parts) = format_spec {
                        let spec = self.eval_fstring_as_text(env, spec_parts)?;
                        rendered = apply_format_spec(&v, &spec, &rendered);
                    }
                    out.push_str(&rendered);
                }
            }
        }
        Ok(Value::str(out))
    }

    fn eval_fstring_as_text(&mut self, env: &Env, parts: &[StringPart]) -> EvalResult<String> {
        if let Value::Str(s) = self.eval_fstring(env, parts)? {
            Ok((*s).clone())
        } else {
            Ok(String::new())
        }
    }

    fn run_comprehension(&mut self, outer: &Env, scope: &Env, generators: &[Comprehension], body: &mut dyn FnMut(&mut Self, &Env) -> EvalResult<()>) -> EvalResult<()> {
        self.run_comprehension_level(outer, scope, generators, 0, body)
    }

    fn run_comprehension_level(&mut self, outer: &Env, scope: &Env, generators: &[Comprehension], depth: usize, body: &mut dyn FnMut(&mut Self, &Env) -> EvalResult<()>) -> EvalResult<()> {
        let Some(gen) = generators.get(depth) else {
            return body(self, scope);
        };
        let source = if depth == 0 { self.eval_expr(outer, &gen.iter)? } else { self.eval_expr(scope, &gen.iter)? };
        let mut it = self.make_iter(&source)?;
        while let Some(item) = it.next(self)? {
            self.check_deadline()?;
            self.assign_target(scope, &gen.target, item)?;
            let mut keep = true;
            for cond in &gen.ifs {
                let cond_value = self.eval_expr(scope, cond)?;
                if !self.truthy(&cond_value)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.run_comprehension_level(outer, scope, generators, depth + 1, body)?;
            }
        }
        Ok(())
    }

    // ---- functions & calls ------------------------------------------------

    fn build_param_spec(&mut self, env: &Env, params: &Params) -> EvalResult<ParamSpec> {
        let mut defaults = Vec::new();
        for p in &params.positional {
            if let Some(d) = &p.default {
                defaults.push(self.eval_expr(env, d)?);
            }
        }
        let mut kwonly_defaults = Vec::new();
        for p in &params.kwonly {
            kwonly_defaults.push(match &p.default {
                Some(d) => Some(self.eval_expr(env, d)?),
                None => None,
            });
        }
        Ok(ParamSpec {
            positional: params.positional.iter().map(|p| p.name.clone()).collect(),
            defaults,
            star_args: params.star_args.clone(),
            kwonly: params.kwonly.iter().map(|p| p.name.clone()).collect(),
            kwonly_defaults,
            star_kwargs: params.star_kwargs.clone(),
        })
    }

    fn make_function(&mut self, env: &Env, def: &FunctionDef) -> EvalResult<Value> {
        let param_spec = self.build_param_spec(env, &def.params)?;
        let func = Value::Function(Arc::new(FunctionValue {
            name: def.name.clone(),
            params: param_spec,
            body: def.body.clone(),
            closure: env.capture(),
            is_generator: def.is_generator,
            module_name: "__main__".to_string(),
        }));
        self.apply_decorators(env, func, &def.decorators)
    }

    fn apply_decorators(&mut self, env: &Env, mut value: Value, decorators: &[Expr]) -> EvalResult<Value> {
        for dec in decorators.iter().rev() {
            let decorator = self.eval_expr(env, dec)?;
            value = self.call_value(decorator, vec![value], Vec::new())?;
        }
        Ok(value)
    }

    fn make_class(&mut self, env: &Env, def: &ClassDef) -> EvalResult<Value> {
        let mut bases = Vec::new();
        for b in &def.bases {
            match self.eval_expr(env, b)? {
                Value::Class(c) => bases.push(c),
                other => return Err(RunSignal::type_error(format!("'{}' is not a valid base class", other.type_name()))),
            }
        }
        let class_env = env.child_call();
        self.exec_block(&class_env, &def.body)?;
        let attrs: IndexMap<String, Value> = class_env.local.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let cls = object::new_class(def.name.clone(), bases, attrs, "__main__")?;
        let value = Value::Class(cls);
        self.apply_decorators(env, value, &def.decorators)
    }

    fn eval_call(&mut self, env: &Env, func_expr: &Expr, arg_exprs: &[Expr], keyword_exprs: &[(Option<String>, Expr)]) -> EvalResult<Value> {
        // `super()` with no arguments needs the lexically enclosing class and
        // `self`, which only the call site (not a generic callable) has.
        if let Expr::Name(name) = func_expr {
            if name == "super" && arg_exprs.is_empty() && keyword_exprs.is_empty() {
                return self.zero_arg_super(env);
            }
        }
        let func = self.eval_expr(env, func_expr)?;
        let args = self.eval_seq(env, arg_exprs)?;
        let mut kwargs = Vec::with_capacity(keyword_exprs.len());
        for (name, expr) in keyword_exprs {
            let v = self.eval_expr(env, expr)?;
            match name {
                Some(n) => kwargs.push((n.clone(), v)),
                None => {
                    if let Value::Dict(map) = v {
                        for (k, val) in map.lock().unwrap().iter() {
                            if let DictKey::Str(s) = k {
                                kwargs.push(((**s).clone(), val.clone()));
                            }
                        }
                    }
                }
            }
        }
        self.call_value(func, args, kwargs)
    }

    fn zero_arg_super(&mut self, env: &Env) -> EvalResult<Value> {
        let self_value = env.lookup("self")?;
        let Value::Instance(inst) = &self_value else {
            return Err(RunSignal::type_error("super(): no self found"));
        };
        let defining_class = env.lookup("__class__")?;
        let Value::Class(defining_class) = defining_class else {
            return Err(RunSignal::type_error("super(): __class__ cell not found"));
        };
        let instance_class = inst.lock().unwrap().class.clone();
        let mro = instance_class.lock().unwrap().mro.clone();
        let skip = mro.iter().position(|c| Arc::ptr_eq(c, &defining_class)).map(|i| i + 1).unwrap_or(1);
        Ok(make_super_proxy(self_value, instance_class, skip))
    }

    pub fn builtin_super(&mut self, args: Vec<Value>) -> EvalResult<Value> {
        match (args.first(), args.get(1)) {
            (Some(Value::Class(cls)), Some(self_value @ Value::Instance(_))) => {
                let instance_class = if let Value::Instance(inst) = self_value { inst.lock().unwrap().class.clone() } else { unreachable!() };
                let mro = instance_class.lock().unwrap().mro.clone();
                let skip = mro.iter().position(|c| Arc::ptr_eq(c, cls)).map(|i| i + 1).unwrap_or(1);
                Ok(make_super_proxy(self_value.clone(), instance_class, skip))
            }
            _ => Err(RunSignal::type_error("super() argument 1 must be type")),
        }
    }

    pub fn call_value(&mut self, func: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        self.call_depth += 1;
        if self.call_depth > MAX_CALL_DEPTH {
            self.call_depth -= 1;
            return Err(RunSignal::Exc(Exception::new(ExcType::RecursionError, "maximum recursion depth exceeded")));
        }
        let result = self.call_value_inner(func, args, kwargs);
        self.call_depth -= 1;
        result
    }

    fn call_value_inner(&mut self, func: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        match func {
            Value::Builtin(b) => (b.func)(self, args, kwargs),
            Value::Function(f) => self.call_function(&f, args, kwargs),
            Value::BoundMethod(m) => {
                let mut full_args = Vec::with_capacity(args.len() + 1);
                full_args.push(m.receiver.clone());
                full_args.extend(args);
                self.call_value(m.func.clone(), full_args, kwargs)
            }
            Value::Class(cls) => self.instantiate(cls, args, kwargs),
            other => {
                if let Some(call) = self.lookup_dunder(&other, "__call__") {
                    self.call_value(call, args, kwargs)
                } else {
                    Err(RunSignal::type_error(format!("'{}' object is not callable", other.type_name())))
                }
            }
        }
    }

    fn call_function(&mut self, f: &FunctionValue, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        if f.is_generator {
            let handle = GeneratorHandle::new(self, f.closure.clone(), f.params.clone(), args, kwargs, f.body.clone());
            return Ok(Value::Generator(handle));
        }
        let call_env = f.closure.child_call();
        bind_params(self, &call_env, &f.params, args, kwargs)?;
        match self.exec_block(&call_env, &f.body)? {
            Signal::Return(v) => Ok(v),
            _ => Ok(Value::None),
        }
    }

    pub fn instantiate(&mut self, cls: ClassRef, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        let instance = Arc::new(std::sync::Mutex::new(InstanceValue { class: cls.clone(), attrs: IndexMap::new() }));
        if let Some((defining, init)) = object::mro_lookup(&cls, "__init__", 0) {
            let mut full_args = vec![Value::Instance(instance.clone())];
            full_args.extend(args);
            self.call_with_class_cell(init, defining, full_args, kwargs)?;
        }
        Ok(Value::Instance(instance))
    }

    /// Calls a method value with `__class__` bound in its frame (for
    /// zero-arg `super()` inside the body), matching CPython's implicit
    /// closure cell for methods defined textually inside a `class` body.
    fn call_with_class_cell(&mut self, func: Value, defining_class: ClassRef, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        match func {
            Value::Function(f) => {
                let call_env = f.closure.child_call();
                call_env.assign("__class__", Value::Class(defining_class));
                bind_params(self, &call_env, &f.params, args, kwargs)?;
                match self.exec_block(&call_env, &f.body)? {
                    Signal::Return(v) => Ok(v),
                    _ => Ok(Value::None),
                }
            }
            other => self.call_value(other, args, kwargs),
        }
    }

    fn call_dunder(&mut self, value: &Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        match self.lookup_dunder(value, name) {
            Some(func) => self.call_value(func, args, Vec::new()),
            None => Err(RunSignal::attribute_error(format!("'{}' object has no attribute '{name}'", value.type_name()))),
        }
    }

    fn lookup_dunder(&self, value: &Value, name: &str) -> Option<Value> {
        if let Value::Instance(inst) = value {
            let cls = inst.lock().unwrap().class.clone();
            if let Some((defining, func)) = object::mro_lookup(&cls, name, 0) {
                let _ = defining;
                return Some(Value::BoundMethod(Arc::new(BoundMethod { receiver: value.clone(), func })));
            }
            return None;
        }
        if let Value::File(handle) = value {
            return fileobj::file_attr(value, handle, name);
        }
        None
    }

    // ---- attributes & items -----------------------------------------------

    pub fn get_attr_value(&mut self, value: &Value, name: &str) -> EvalResult<Value> {
        match value {
            Value::Instance(inst) => object::get_attr(inst, name),
            Value::Class(cls) => object::mro_lookup(cls, name, 0).map(|(_, v)| v).ok_or_else(|| {
                RunSignal::attribute_error(format!("type object '{}' has no attribute '{name}'", cls.lock().unwrap().name))
            }),
            Value::Module(m) => m.lock().unwrap().attrs.get(name).cloned().ok_or_else(|| {
                RunSignal::attribute_error(format!("module '{}' has no attribute '{name}'", m.lock().unwrap().name))
            }),
            Value::SuperProxy(proxy) => object::mro_lookup(&proxy.instance_class, name, proxy.skip)
                .map(|(_, v)| {
                    if matches!(v, Value::Function(_)) {
                        Value::BoundMethod(Arc::new(BoundMethod { receiver: proxy.receiver.clone(), func: v }))
                    } else {
                        v
                    }
                })
                .ok_or_else(|| RunSignal::attribute_error(format!("'super' object has no attribute '{name}'"))),
            Value::File(handle) => fileobj::file_attr(value, handle, name).ok_or_else(|| RunSignal::attribute_error(format!("'file' object has no attribute '{name}'"))),
            _ => builtin_type_attr(value, name),
        }
    }

    pub fn set_attr_value(&mut self, value: &Value, name: &str, new_value: Value) -> EvalResult<()> {
        match value {
            Value::Instance(inst) => {
                inst.lock().unwrap().attrs.insert(name.to_string(), new_value);
                Ok(())
            }
            Value::Class(cls) => {
                cls.lock().unwrap().attrs.insert(name.to_string(), new_value);
                Ok(())
            }
            Value::Module(m) => {
                m.lock().unwrap().attrs.insert(name.to_string(), new_value);
                Ok(())
            }
            other => Err(RunSignal::attribute_error(format!("'{}' object has no attribute '{name}'", other.type_name()))),
        }
    }

    pub fn dir_of(&mut self, value: &Value) -> EvalResult<Vec<String>> {
        Ok(match value {
            Value::Module(m) => m.lock().unwrap().attrs.keys().cloned().collect(),
            Value::Instance(inst) => {
                let mut names: Vec<String> = inst.lock().unwrap().attrs.keys().cloned().collect();
                let cls = inst.lock().unwrap().class.clone();
                for ancestor in cls.lock().unwrap().mro.clone() {
                    names.extend(ancestor.lock().unwrap().attrs.keys().cloned());
                }
                names.sort();
                names.dedup();
                names
            }
            Value::Class(cls) => {
                let mut names = Vec::new();
                for ancestor in cls.lock().unwrap().mro.clone() {
                    names.extend(ancestor.lock().unwrap().attrs.keys().cloned());
                }
                names.sort();
                names.dedup();
                names
            }
            _ => Vec::new(),
        })
    }

    fn get_item(&mut self, value: &Value, key: &Value) -> EvalResult<Value> {
        match value {
            Value::List(items) => {
                let idx = normalize_index(key, items.lock().unwrap().len())?;
                items.lock().unwrap().get(idx).cloned().ok_or_else(|| RunSignal::index_error("list index out of range"))
            }
            Value::Tuple(items) => {
                let idx = normalize_index(key, items.len())?;
                items.get(idx).cloned().ok_or_else(|| RunSignal::index_error("tuple index out of range"))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(key, chars.len())?;
                chars.get(idx).map(|c| Value::str(c.to_string())).ok_or_else(|| RunSignal::index_error("string index out of range"))
            }
            Value::Dict(map) => {
                let dict_key = DictKey::from_value(key).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", key.type_name())))?;
                map.lock().unwrap().get(&dict_key).cloned().ok_or_else(|| RunSignal::key_error(crate::builtins::repr_value(key)))
            }
            Value::Instance(_) => self.call_dunder(value, "__getitem__", vec![key.clone()]),
            other => Err(RunSignal::type_error(format!("'{}' object is not subscriptable", other.type_name()))),
        }
    }

    fn set_item(&mut self, value: &Value, key: Value, new_value: Value) -> EvalResult<()> {
        match value {
            Value::List(items) => {
                let idx = normalize_index(&key, items.lock().unwrap().len())?;
                let mut items = items.lock().unwrap();
                if idx >= items.len() {
                    return Err(RunSignal::index_error("list assignment index out of range"));
                }
                items[idx] = new_value;
                Ok(())
            }
            Value::Dict(map) => {
                let dict_key = DictKey::from_value(&key).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", key.type_name())))?;
                map.lock().unwrap().insert(dict_key, new_value);
                Ok(())
            }
            Value::Instance(_) => {
                self.call_dunder(value, "__setitem__", vec![key, new_value])?;
                Ok(())
            }
            other => Err(RunSignal::type_error(format!("'{}' object does not support item assignment", other.type_name()))),
        }
    }

    fn eval_slice(&mut self, env: &Env, value: &Value, lower: Option<&Expr>, upper: Option<&Expr>, step: Option<&Expr>) -> EvalResult<Value> {
        let len = self.len_of(value)? as i64;
        let step = match step {
            Some(e) => as_index(&self.eval_expr(env, e)?)?,
            None => 1,
        };
        if step == 0 {
            return Err(RunSignal::value_error("slice step cannot be zero"));
        }
        let (default_lo, default_hi) = if step > 0 { (0, len) } else { (len - 1, -1) };
        let lo = match lower {
            Some(e) => clamp_slice_index(as_index(&self.eval_expr(env, e)?)?, len, step > 0),
            None => default_lo,
        };
        let hi = match upper {
            Some(e) => clamp_slice_index(as_index(&self.eval_expr(env, e)?)?, len, step > 0),
            None => default_hi,
        };
        let mut indices = Vec::new();
        let mut i = lo;
        while (step > 0 && i < hi) || (step < 0 && i > hi) {
            if i >= 0 && i < len {
                indices.push(i as usize);
            }
            i += step;
        }
        match value {
            Value::List(items) => {
                let items = items.lock().unwrap();
                Ok(Value::list(indices.into_iter().filter_map(|i| items.get(i).cloned()).collect()))
            }
            Value::Tuple(items) => Ok(Value::tuple(indices.into_iter().filter_map(|i| items.get(i).cloned()).collect())),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::str(indices.into_iter().filter_map(|i| chars.get(i)).collect::<String>()))
            }
            other => Err(RunSignal::type_error(format!("'{}' object is not subscriptable", other.type_name()))),
        }
    }

    // ---- operators ----------------------------------------------------

    fn apply_unary(&mut self, op: UnaryOp, v: &Value) -> EvalResult<Value> {
        match (op, v) {
            (UnaryOp::Pos, Value::Int(i)) => Ok(Value::Int(i.clone())),
            (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
            (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i.clone())),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(-(i + BigInt::from(1)))),
            (UnaryOp::Not, v) => Ok(Value::Bool(!self.truthy(v)?)),
            (op, Value::Instance(_)) => {
                let dunder = match op {
                    UnaryOp::Neg => "__neg__",
                    UnaryOp::Pos => "__pos__",
                    UnaryOp::Invert => "__invert__",
                    UnaryOp::Not => unreachable!(),
                };
                self.call_dunder(v, dunder, Vec::new())
            }
            (_, other) => Err(RunSignal::type_error(format!("bad operand type for unary operator: '{}'", other.type_name()))),
        }
    }

    pub fn add_values(&mut self, a: &Value, b: &Value) -> EvalResult<Value> {
        self.apply_binop(BinOp::Add, a, b)
    }

    fn apply_binop(&mut self, op: BinOp, a: &Value, b: &Value) -> EvalResult<Value> {
        use BinOp::*;
        if matches!(a, Value::Instance(_)) || matches!(b, Value::Instance(_)) {
            if let Some(v) = self.try_dunder_binop(op, a, b)? {
                return Ok(v);
            }
            if matches!(a, Value::Instance(_)) && matches!(b, Value::Instance(_)) {
                return Err(RunSignal::type_error(format!("unsupported operand type(s): '{}' and '{}'", a.type_name(), b.type_name())));
            }
        }
        match op {
            Add => self.numeric_or_seq_add(a, b),
            Sub => numeric_binop(a, b, |x, y| x - y, |x, y| x - y),
            Mul => self.mul_values(a, b),
            Div => true_div(a, b),
            FloorDiv => floor_div(a, b),
            Mod => modulo(a, b),
            Pow => pow_values(a, b),
            MatMul => Err(RunSignal::type_error("@ is not supported between these types")),
            LShift => int_binop(a, b, |x, y| x << y.to_u32().unwrap_or(0)),
            RShift => int_binop(a, b, |x, y| x >> y.to_u32().unwrap_or(0)),
            BitAnd => int_binop(a, b, |x, y| x & y),
            BitOr => int_binop(a, b, |x, y| x | y),
            BitXor => int_binop(a, b, |x, y| x ^ y),
        }
    }

    /// Tries the forward dunder on `a`, then — if it's absent or returns
    /// `NotImplemented` — the reflected dunder on `b`, per `spec.md` §4.3.
    /// `a is b` skips the reflected retry (CPython does the same to avoid
    /// calling the same method twice for `x + x`).
    fn try_dunder_binop(&mut self, op: BinOp, a: &Value, b: &Value) -> EvalResult<Option<Value>> {
        let name = binop_dunder_name(op);
        if let Some(func) = self.lookup_dunder(a, name) {
            let result = self.call_value(func, vec![b.clone()], Vec::new())?;
            if !matches!(result, Value::NotImplemented) {
                return Ok(Some(result));
            }
        }
        if !is_same_object(a, b) {
            let rname = reflected_binop_dunder_name(op);
            if let Some(func) = self.lookup_dunder(b, rname) {
                let result = self.call_value(func, vec![a.clone()], Vec::new())?;
                if !matches!(result, Value::NotImplemented) {
                    return Ok(Some(result));
                }
            }
        }
        Ok(None)
    }

    fn numeric_or_seq_add(&mut self, a: &Value, b: &Value) -> EvalResult<Value> {
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(Value::str(format!("{x}{y}"))),
            (Value::List(x), Value::List(y)) => {
                let mut out = x.lock().unwrap().clone();
                out.extend(y.lock().unwrap().iter().cloned());
                Ok(Value::list(out))
            }
            (Value::Tuple(x), Value::Tuple(y)) => {
                let mut out = (**x).clone();
                out.extend(y.iter().cloned());
                Ok(Value::tuple(out))
            }
            _ => numeric_binop(a, b, |x, y| x + y, |x, y| x + y),
        }
    }

    fn mul_values(&mut self, a: &Value, b: &Value) -> EvalResult<Value> {
        match (a, b) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => Ok(Value::str(s.repeat(n.to_usize().unwrap_or(0)))),
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let items = items.lock().unwrap();
                let times = n.to_usize().unwrap_or(0);
                let mut out = Vec::with_capacity(items.len() * times);
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::list(out))
            }
            _ => numeric_binop(a, b, |x, y| x * y, |x, y| x * y),
        }
    }

    pub fn less_than(&mut self, a: &Value, b: &Value) -> EvalResult<bool> {
        self.apply_cmp(CmpOp::Lt, a, b)
    }

    fn apply_cmp(&mut self, op: CmpOp, a: &Value, b: &Value) -> EvalResult<bool> {
        match op {
            CmpOp::Eq => self.values_equal(a, b),
            CmpOp::NotEq => Ok(!self.values_equal(a, b)?),
            CmpOp::Is => Ok(is_same_object(a, b)),
            CmpOp::IsNot => Ok(!is_same_object(a, b)),
            CmpOp::In => self.contains(b, a),
            CmpOp::NotIn => Ok(!self.contains(b, a)?),
            CmpOp::Lt | CmpOp::LtEq | CmpOp::Gt | CmpOp::GtEq => self.order_cmp(op, a, b),
        }
    }

    fn order_cmp(&mut self, op: CmpOp, a: &Value, b: &Value) -> EvalResult<bool> {
        if matches!(a, Value::Instance(_)) {
            let name = match op {
                CmpOp::Lt => "__lt__",
                CmpOp::LtEq => "__le__",
                CmpOp::Gt => "__gt__",
                CmpOp::GtEq => "__ge__",
                _ => unreachable!(),
            };
            if let Some(func) = self.lookup_dunder(a, name) {
                let result = self.call_value(func, vec![b.clone()], Vec::new())?;
                return self.truthy(&result);
            }
        }
        let ordering = numeric_or_str_cmp(a, b)?;
        Ok(match op {
            CmpOp::Lt => ordering.is_lt(),
            CmpOp::LtEq => ordering.is_le(),
            CmpOp::Gt => ordering.is_gt(),
            CmpOp::GtEq => ordering.is_ge(),
            _ => unreachable!(),
        })
    }

    pub fn values_equal(&mut self, a: &Value, b: &Value) -> EvalResult<bool> {
        if matches!(a, Value::Instance(_)) {
            if let Some(func) = self.lookup_dunder(a, "__eq__") {
                let result = self.call_value(func, vec![b.clone()], Vec::new())?;
                return self.truthy(&result);
            }
        }
        Ok(match (a, b) {
            (Value::None, Value::None) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => crate::builtins::bigint_to_f64(x) == *y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Bytes(x), Value::Bytes(y)) => x == y,
            (Value::List(x), Value::List(y)) => self.seq_equal(&x.lock().unwrap(), &y.lock().unwrap())?,
            (Value::Tuple(x), Value::Tuple(y)) => self.seq_equal(x, y)?,
            (Value::Dict(x), Value::Dict(y)) => {
                let x = x.lock().unwrap();
                let y = y.lock().unwrap();
                x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).map(|v2| crate::builtins::repr_value(v) == crate::builtins::repr_value(v2)).unwrap_or(false))
            }
            (Value::Set(x), Value::Set(y)) => *x.lock().unwrap() == *y.lock().unwrap(),
            (Value::Instance(x), Value::Instance(y)) => Arc::ptr_eq(x, y),
            (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
            _ => false,
        })
    }

    fn seq_equal(&mut self, a: &[Value], b: &[Value]) -> EvalResult<bool> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (x, y) in a.iter().zip(b) {
            if !self.values_equal(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn contains(&mut self, container: &Value, item: &Value) -> EvalResult<bool> {
        match container {
            Value::Str(s) => {
                if let Value::Str(sub) = item {
                    Ok(s.contains(sub.as_str()))
                } else {
                    Err(RunSignal::type_error("'in <string>' requires string as left operand"))
                }
            }
            Value::List(items) => {
                for v in items.lock().unwrap().iter() {
                    if self.values_equal(v, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Tuple(items) => {
                for v in items.iter() {
                    if self.values_equal(v, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Dict(map) => Ok(DictKey::from_value(item).is_some_and(|k| map.lock().unwrap().contains_key(&k))),
            Value::Set(set) => Ok(DictKey::from_value(item).is_some_and(|k| set.lock().unwrap().contains(&k))),
            Value::Module(m) => Ok(m.lock().unwrap().attrs.contains_key(&crate::modules::as_str(item))),
            Value::Instance(_) => {
                let result = self.call_dunder(container, "__contains__", vec![item.clone()])?;
                self.truthy(&result)
            }
            other => Err(RunSignal::type_error(format!("argument of type '{}' is not iterable", other.type_name()))),
        }
    }

    pub fn is_instance(&mut self, value: &Value, of: &Value) -> EvalResult<bool> {
        let Value::Class(target) = of else {
            return Err(RunSignal::type_error("isinstance() arg 2 must be a type"));
        };
        match value {
            Value::Instance(inst) => Ok(object::is_subclass(&inst.lock().unwrap().class, target)),
            _ => {
                let builtin_name = value.type_name();
                Ok(target.lock().unwrap().name == builtin_name)
            }
        }
    }

    pub fn truthy(&mut self, v: &Value) -> EvalResult<bool> {
        if let Value::Instance(_) = v {
            if let Some(func) = self.lookup_dunder(v, "__bool__") {
                let result = self.call_value(func, Vec::new(), Vec::new())?;
                return self.truthy(&result);
            }
            if let Some(func) = self.lookup_dunder(v, "__len__") {
                let len_value = self.call_value(func, Vec::new(), Vec::new())?;
                return Ok(!matches!(len_value, Value::Int(ref i) if i.is_zero()));
            }
            return Ok(true);
        }
        Ok(v.truthy_default())
    }

    pub fn len_of(&mut self, v: &Value) -> EvalResult<i64> {
        Ok(match v {
            Value::Str(s) => s.chars().count() as i64,
            Value::Bytes(b) => b.len() as i64,
            Value::List(items) => items.lock().unwrap().len() as i64,
            Value::Tuple(items) => items.len() as i64,
            Value::Dict(map) => map.lock().unwrap().len() as i64,
            Value::Set(set) => set.lock().unwrap().len() as i64,
            Value::Instance(_) => {
                let result = self.call_dunder(v, "__len__", Vec::new())?;
                match result {
                    Value::Int(i) => i.to_i64().unwrap_or(0),
                    _ => return Err(RunSignal::type_error("__len__ should return an integer")),
                }
            }
            other => return Err(RunSignal::type_error(format!("object of type '{}' has no len()", other.type_name()))),
        })
    }

    pub fn str_value(&mut self, v: &Value) -> EvalResult<String> {
        if let Value::Instance(_) = v {
            if let Some(func) = self.lookup_dunder(v, "__str__") {
                let result = self.call_value(func, Vec::new(), Vec::new())?;
                return self.str_value(&result);
            }
            return self.repr_value_dispatch(v);
        }
        Ok(match v {
            Value::Str(s) => (**s).clone(),
            other => crate::builtins::repr_value(other),
        })
    }

    pub fn repr_value_dispatch(&mut self, v: &Value) -> EvalResult<String> {
        if let Value::Instance(_) = v {
            if let Some(func) = self.lookup_dunder(v, "__repr__") {
                let result = self.call_value(func, Vec::new(), Vec::new())?;
                return self.str_value(&result);
            }
        }
        Ok(crate::builtins::repr_value(v))
    }

    pub fn sort_values(&mut self, items: &mut [Value], key: Option<&Value>) -> EvalResult<()> {
        let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
        for item in items.iter() {
            let k = match key {
                Some(f) => self.call_value(f.clone(), vec![item.clone()], Vec::new())?,
                None => item.clone(),
            };
            keyed.push((k, item.clone()));
        }
        // A plain insertion sort: this evaluator's comparisons can invoke
        // arbitrary Python code (`__lt__`), so the comparator isn't a cheap,
        // side-effect-free `Ord` the standard sort can assume.
        for i in 1..keyed.len() {
            let mut j = i;
            while j > 0 && self.less_than(&keyed[j].0, &keyed[j - 1].0)? {
                keyed.swap(j, j - 1);
                j -= 1;
            }
        }
        for (slot, (_, v)) in items.iter_mut().zip(keyed) {
            *slot = v;
        }
        Ok(())
    }

    /// Drains an iterable eagerly. Only safe for callers that genuinely need
    /// the whole sequence at once (unpacking, `*args` spreads, `list(...)`);
    /// anything that drives a `for`/`yield from` over a possibly-infinite or
    /// side-effecting generator must use [`Evaluator::make_iter`] instead so
    /// side effects interleave in program order and `break` actually stops
    /// the underlying generator from running further.
    pub fn iterate_to_vec(&mut self, v: &Value) -> EvalResult<Vec<Value>> {
        match v {
            Value::List(items) => Ok(items.lock().unwrap().clone()),
            Value::Tuple(items) => Ok((**items).clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Value::Dict(map) => Ok(map.lock().unwrap().keys().map(DictKey::to_value).collect()),
            Value::Set(set) => Ok(set.lock().unwrap().iter().map(DictKey::to_value).collect()),
            _ => {
                let mut it = self.make_iter(v)?;
                let mut out = Vec::new();
                while let Some(item) = it.next(self)? {
                    out.push(item);
                }
                Ok(out)
            }
        }
    }

    /// Builds a one-item-at-a-time iterator over `v`, per `spec.md` §5
    /// program-order output: a `for`/`yield from` driven through this never
    /// runs a generator's body any further than the consumer actually asks.
    pub fn make_iter(&mut self, v: &Value) -> EvalResult<LazyIter> {
        match v {
            Value::List(items) => Ok(LazyIter::Values(items.lock().unwrap().clone().into_iter())),
            Value::Tuple(items) => Ok(LazyIter::Values((**items).clone().into_iter())),
            Value::Str(s) => Ok(LazyIter::Values(s.chars().map(|c| Value::str(c.to_string())).collect::<Vec<_>>().into_iter())),
            Value::Dict(map) => Ok(LazyIter::Values(map.lock().unwrap().keys().map(DictKey::to_value).collect::<Vec<_>>().into_iter())),
            Value::Set(set) => Ok(LazyIter::Values(set.lock().unwrap().iter().map(DictKey::to_value).collect::<Vec<_>>().into_iter())),
            Value::Generator(handle) => Ok(LazyIter::Generator(handle.clone(), None)),
            Value::File(handle) => Ok(LazyIter::File(handle.clone())),
            Value::Instance(_) => {
                let iterator = match self.lookup_dunder(v, "__iter__") {
                    Some(iter_func) => self.call_value(iter_func, Vec::new(), Vec::new())?,
                    None => v.clone(),
                };
                match iterator {
                    Value::Generator(handle) => Ok(LazyIter::Generator(handle, None)),
                    Value::File(handle) => Ok(LazyIter::File(handle)),
                    other => Ok(LazyIter::Protocol(other)),
                }
            }
            other => Err(RunSignal::type_error(format!("'{}' object is not iterable", other.type_name()))),
        }
    }

    pub fn generator_next(&mut self, v: &Value) -> EvalResult<Value> {
        match v {
            Value::Generator(handle) => handle.next(Value::None),
            Value::Instance(_) | Value::File(_) => self.call_dunder(v, "__next__", Vec::new()),
            other => Err(RunSignal::type_error(format!("'{}' object is not an iterator", other.type_name()))),
        }
    }
}

/// A single-step iterator over any of the protocols `spec.md` §4.4/§5
/// recognizes: plain sequences (already materialized, so stepping them is
/// infallible), a generator driven one `next()` at a time, a `Value::File`
/// read line-by-line, or a user object's `__next__` dunder.
pub enum LazyIter {
    Values(std::vec::IntoIter<Value>),
    Generator(GeneratorHandle, Option<Value>),
    File(crate::filesystem::FileRef),
    Protocol(Value),
}

impl LazyIter {
    /// Advances the iterator. `Ok(None)` is a clean `StopIteration`; any
    /// other error (including a non-`StopIteration` exception raised from
    /// inside a generator body or a `__next__` override) propagates.
    pub fn next(&mut self, eval: &mut Evaluator) -> EvalResult<Option<Value>> {
        match self {
            LazyIter::Values(it) => Ok(it.next()),
            LazyIter::Generator(handle, stop_value) => match handle.next(Value::None) {
                Ok(v) => Ok(Some(v)),
                Err(RunSignal::Exc(Exception { exc_type: ExcType::StopIteration, instance, .. })) => {
                    *stop_value = instance;
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            LazyIter::File(handle) => {
                let mut h = handle.lock().unwrap();
                if h.closed {
                    return Err(RunSignal::value_error("I/O operation on closed file"));
                }
                Ok(fileobj::take_line(&mut h.unread).map(Value::str))
            }
            LazyIter::Protocol(iterator) => match eval.call_dunder(iterator, "__next__", Vec::new()) {
                Ok(v) => Ok(Some(v)),
                Err(RunSignal::Exc(Exception { exc_type: ExcType::StopIteration, .. })) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// The delegate's `StopIteration.value`, per `spec.md` §4.4 `yield from`
    /// semantics — only a `Value::Generator` source can carry one (populated
    /// by the `next` call that first observed exhaustion); any other
    /// iterable's exhaustion behaves like a bare `return` with no value.
    pub fn stop_value(&self) -> Value {
        match self {
            LazyIter::Generator(_, stop_value) => stop_value.clone().unwrap_or(Value::None),
            _ => Value::None,
        }
    }
}

pub(crate) fn bind_params(evaluator: &mut Evaluator, env: &Env, params: &ParamSpec, mut args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<()> {
    let n_required = params.positional.len() - params.defaults.len();
    let mut kwargs_map: IndexMap<String, Value> = kwargs.into_iter().collect();
    for (i, name) in params.positional.iter().enumerate() {
        let value = if i < args.len() {
            Some(args[i].clone())
        } else if let Some(v) = kwargs_map.shift_remove(name) {
            Some(v)
        } else if i >= n_required {
            Some(params.defaults[i - n_required].clone())
        } else {
            None
        };
        let value = value.ok_or_else(|| RunSignal::type_error(format!("missing required positional argument: '{name}'")))?;
        env.assign(name, value);
    }
    if let Some(star) = &params.star_args {
        let extra = if args.len() > params.positional.len() { args.split_off(params.positional.len()) } else { Vec::new() };
        env.assign(star, Value::tuple(extra));
    }
    for (i, name) in params.kwonly.iter().enumerate() {
        let value = kwargs_map
            .shift_remove(name)
            .or_else(|| params.kwonly_defaults[i].clone())
            .ok_or_else(|| RunSignal::type_error(format!("missing required keyword-only argument: '{name}'")))?;
        env.assign(name, value);
    }
    if let Some(star_kw) = &params.star_kwargs {
        let mut map = IndexMap::new();
        for (k, v) in kwargs_map {
            map.insert(DictKey::Str(Arc::new(k)), v);
        }
        env.assign(star_kw, Value::dict(map));
    }
    let _ = evaluator;
    Ok(())
}

fn make_super_proxy(receiver: Value, instance_class: ClassRef, skip: usize) -> Value {
    Value::SuperProxy(Arc::new(SuperProxy { receiver, instance_class, skip }))
}

fn builtin_type_attr(value: &Value, name: &str) -> EvalResult<Value> {
    Err(RunSignal::attribute_error(format!("'{}' object has no attribute '{name}'", value.type_name())))
}

fn is_same_object(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Instance(x), Value::Instance(y)) => Arc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        _ => false,
    }
}

fn binop_dunder_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add__",
        BinOp::Sub => "__sub__",
        BinOp::Mul => "__mul__",
        BinOp::Div => "__truediv__",
        BinOp::FloorDiv => "__floordiv__",
        BinOp::Mod => "__mod__",
        BinOp::Pow => "__pow__",
        BinOp::MatMul => "__matmul__",
        BinOp::LShift => "__lshift__",
        BinOp::RShift => "__rshift__",
        BinOp::BitAnd => "__and__",
        BinOp::BitOr => "__or__",
        BinOp::BitXor => "__xor__",
    }
}

/// The reflected counterpart CPython tries when the forward dunder is
/// absent or returns `NotImplemented` (`spec.md` §4.3): `a + b` falls back
/// to `b.__radd__(a)`.
fn reflected_binop_dunder_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__radd__",
        BinOp::Sub => "__rsub__",
        BinOp::Mul => "__rmul__",
        BinOp::Div => "__rtruediv__",
        BinOp::FloorDiv => "__rfloordiv__",
        BinOp::Mod => "__rmod__",
        BinOp::Pow => "__rpow__",
        BinOp::MatMul => "__rmatmul__",
        BinOp::LShift => "__rlshift__",
        BinOp::RShift => "__rrshift__",
        BinOp::BitAnd => "__rand__",
        BinOp::BitOr => "__ror__",
        BinOp::BitXor => "__rxor__",
    }
}

fn aug_to_binop(op: AugOp) -> BinOp {
    match op {
        AugOp::Add => BinOp::Add,
        AugOp::Sub => BinOp::Sub,
        AugOp::Mul => BinOp::Mul,
        AugOp::Div => BinOp::Div,
        AugOp::FloorDiv => BinOp::FloorDiv,
        AugOp::Mod => BinOp::Mod,
        AugOp::Pow => BinOp::Pow,
        AugOp::MatMul => BinOp::MatMul,
        AugOp::LShift => BinOp::LShift,
        AugOp::RShift => BinOp::RShift,
        AugOp::BitAnd => BinOp::BitAnd,
        AugOp::BitOr => BinOp::BitOr,
        AugOp::BitXor => BinOp::BitXor,
    }
}

fn numeric_binop(a: &Value, b: &Value, int_op: impl Fn(&BigInt, &BigInt) -> BigInt, float_op: impl Fn(f64, f64) -> f64) -> EvalResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(x, y))),
        (Value::Bool(x), Value::Bool(y)) => Ok(Value::Int(int_op(&BigInt::from(*x as i64), &BigInt::from(*y as i64)))),
        (Value::Float(_), _) | (_, Value::Float(_)) => Ok(Value::Float(float_op(as_f64_numeric(a)?, as_f64_numeric(b)?))),
        (Value::Int(_), Value::Bool(y)) => Ok(Value::Int(int_op(as_bigint(a)?, &BigInt::from(*y as i64)))),
        (Value::Bool(x), Value::Int(_)) => Ok(Value::Int(int_op(&BigInt::from(*x as i64), as_bigint(b)?))),
        _ => Err(RunSignal::type_error(format!("unsupported operand type(s): '{}' and '{}'", a.type_name(), b.type_name()))),
    }
}

fn as_bigint(v: &Value) -> EvalResult<&BigInt> {
    match v {
        Value::Int(i) => Ok(i),
        _ => Err(RunSignal::type_error("expected int")),
    }
}

fn as_f64_numeric(v: &Value) -> EvalResult<f64> {
    match v {
        Value::Int(i) => Ok(crate::builtins::bigint_to_f64(i)),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(*b as i64 as f64),
        other => Err(RunSignal::type_error(format!("unsupported operand type: '{}'", other.type_name()))),
    }
}

fn true_div(a: &Value, b: &Value) -> EvalResult<Value> {
    let x = as_f64_numeric(a)?;
    let y = as_f64_numeric(b)?;
    if y == 0.0 {
        return Err(RunSignal::zero_division("division by zero"));
    }
    Ok(Value::Float(x / y))
}

fn floor_div(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if y.is_zero() {
                return Err(RunSignal::zero_division("integer division or modulo by zero"));
            }
            Ok(Value::Int(num_integer::Integer::div_floor(x, y)))
        }
        _ => {
            let y = as_f64_numeric(b)?;
            if y == 0.0 {
                return Err(RunSignal::zero_division("float floor division by zero"));
            }
            Ok(Value::Float((as_f64_numeric(a)? / y).floor()))
        }
    }
}

fn modulo(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            if y.is_zero() {
                return Err(RunSignal::zero_division("integer division or modulo by zero"));
            }
            Ok(Value::Int(num_integer::Integer::mod_floor(x, y)))
        }
        _ => {
            let y = as_f64_numeric(b)?;
            if y == 0.0 {
                return Err(RunSignal::zero_division("float modulo"));
            }
            let x = as_f64_numeric(a)?;
            Ok(Value::Float(x - y * (x / y).floor()))
        }
    }
}

fn pow_values(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) if !y.is_negative() => Ok(Value::Int(x.pow(y.to_u32().unwrap_or(0)))),
        _ => Ok(Value::Float(as_f64_numeric(a)?.powf(as_f64_numeric(b)?))),
    }
}

fn int_binop(a: &Value, b: &Value, op: impl Fn(&BigInt, &BigInt) -> BigInt) -> EvalResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(op(x, y))),
        _ => Err(RunSignal::type_error(format!("unsupported operand type(s): '{}' and '{}'", a.type_name(), b.type_name()))),
    }
}

fn numeric_or_str_cmp(a: &Value, b: &Value) -> EvalResult<std::cmp::Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => Ok(x.lock().unwrap().len().cmp(&y.lock().unwrap().len())),
        _ => {
            let x = as_f64_numeric(a)?;
            let y = as_f64_numeric(b)?;
            x.partial_cmp(&y).ok_or_else(|| RunSignal::type_error(format!("'<' not supported between instances of '{}' and '{}'", a.type_name(), b.type_name())))
        }
    }
}

fn normalize_index(key: &Value, len: usize) -> EvalResult<usize> {
    let i = as_index(key)?;
    let normalized = if i < 0 { i + len as i64 } else { i };
    if normalized < 0 {
        return Err(RunSignal::index_error("index out of range"));
    }
    Ok(normalized as usize)
}

fn as_index(v: &Value) -> EvalResult<i64> {
    match v {
        Value::Int(i) => i.to_i64().ok_or_else(|| RunSignal::value_error("index too large")),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(RunSignal::type_error(format!("'{}' object cannot be interpreted as an integer", other.type_name()))),
    }
}

fn clamp_slice_index(i: i64, len: i64, forward: bool) -> i64 {
    let normalized = if i < 0 { i + len } else { i };
    if forward {
        normalized.clamp(0, len)
    } else {
        normalized.clamp(-1, len - 1)
    }
}

fn parse_int_literal(raw: &str) -> BigInt {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        BigInt::parse_bytes(hex.as_bytes(), 16).unwrap_or_default()
    } else if let Some(oct) = cleaned.strip_prefix("0o").or_else(|| cleaned.strip_prefix("0O")) {
        BigInt::parse_bytes(oct.as_bytes(), 8).unwrap_or_default()
    } else if let Some(bin) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        BigInt::parse_bytes(bin.as_bytes(), 2).unwrap_or_default()
    } else {
        cleaned.parse().unwrap_or_default()
    }
}

fn apply_format_spec(value: &Value, spec: &str, default: &str) -> String {
    if spec.is_empty() {
        return default.to_string();
    }
    if let Some(precision) = spec.strip_prefix('.').and_then(|s| s.strip_suffix('f')) {
        if let (Ok(p), Value::Float(f)) = (precision.parse::<usize>(), value) {
            return format!("{f:.p$}");
        }
        if let (Ok(p), Value::Int(i)) = (precision.parse::<usize>(), value) {
            return format!("{:.*}", p, crate::builtins::bigint_to_f64(i));
        }
    }
    default.to_string()
}
