//! Builtin functions installed into every module's `builtins` frame, plus the
//! value<->JSON and repr helpers the stdlib stubs in `modules/` share.

use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::capability::Capability;
use crate::environment::{new_frame, Frame};
use crate::error::{EvalResult, Exception, ExcType, RunSignal};
use crate::evaluator::Evaluator;
use crate::filesystem::FileHandle;
use crate::object::{self, ClassRef};
use crate::value::{BuiltinFn, DictKey, Value};

pub fn bigint_to_f64(i: &BigInt) -> f64 {
    i.to_f64().unwrap_or(f64::NAN)
}

/// A dunder-unaware fallback `repr`, used for error-message formatting inside
/// builtins where spinning up a full evaluator dispatch would be overkill.
/// The `repr()`/`str()` *builtin functions* below go through
/// [`Evaluator::repr_value`] instead, which does consult `__repr__`.
pub fn repr_value(v: &Value) -> String {
    match v {
        Value::None => "None".to_string(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Bytes(b) => format!("b'{}'", String::from_utf8_lossy(b)),
        Value::List(items) => {
            let items = items.lock().unwrap();
            format!("[{}]", items.iter().map(repr_value).collect::<Vec<_>>().join(", "))
        }
        Value::Tuple(items) => {
            let rendered = items.iter().map(repr_value).collect::<Vec<_>>().join(", ");
            if items.len() == 1 {
                format!("({rendered},)")
            } else {
                format!("({rendered})")
            }
        }
        Value::Dict(map) => {
            let map = map.lock().unwrap();
            let rendered = map.iter().map(|(k, v)| format!("{}: {}", repr_value(&k.to_value()), repr_value(v))).collect::<Vec<_>>().join(", ");
            format!("{{{rendered}}}")
        }
        Value::Set(items) => {
            let items = items.lock().unwrap();
            if items.is_empty() {
                return "set()".to_string();
            }
            format!("{{{}}}", items.iter().map(|k| repr_value(&k.to_value())).collect::<Vec<_>>().join(", "))
        }
        Value::Function(f) => format!("<function {}>", f.name),
        Value::BoundMethod(m) => format!("<bound method {}>", repr_value(&m.func)),
        Value::Class(c) => format!("<class '{}'>", c.lock().unwrap().name),
        Value::Instance(i) => format!("<{} object>", i.lock().unwrap().class.lock().unwrap().name),
        Value::Builtin(b) => format!("<built-in function {}>", b.name),
        Value::Generator(_) => "<generator object>".to_string(),
        Value::Module(m) => format!("<module '{}'>", m.lock().unwrap().name),
        Value::SuperProxy(_) => "<super object>".to_string(),
        Value::File(h) => {
            let h = h.lock().unwrap();
            format!("<file '{}'{}>", h.path, if h.closed { " (closed)" } else { "" })
        }
        Value::NotImplemented => "NotImplemented".to_string(),
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

pub fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(i.to_i64().map(serde_json::Number::from).unwrap_or_else(|| serde_json::Number::from(0))),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String((**s).clone()),
        Value::List(items) => serde_json::Value::Array(items.lock().unwrap().iter().map(value_to_json).collect()),
        Value::Tuple(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Dict(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map.lock().unwrap().iter() {
                obj.insert(json_key_string(k), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
        _ => serde_json::Value::String(repr_value(v)),
    }
}

fn json_key_string(key: &DictKey) -> String {
    match key {
        DictKey::Str(s) => (**s).clone(),
        other => repr_value(&other.to_value()),
    }
}

pub fn json_to_value(j: &serde_json::Value) -> Value {
    match j {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(DictKey::Str(Arc::new(k.clone())), json_to_value(v));
            }
            Value::dict(out)
        }
    }
}

fn expect_arg(args: &[Value], i: usize, who: &str) -> EvalResult<Value> {
    args.get(i).cloned().ok_or_else(|| RunSignal::type_error(format!("{who} expected an argument at position {i}")))
}

fn builtin(name: &str, func: impl Fn(&mut Evaluator, Vec<Value>, Vec<(String, Value)>) -> EvalResult<Value> + Send + Sync + 'static) -> Value {
    Value::Builtin(Arc::new(BuiltinFn { name: name.to_string(), func: Box::new(func) }))
}

fn iter_to_vec(evaluator: &mut Evaluator, v: &Value) -> EvalResult<Vec<Value>> {
    evaluator.iterate_to_vec(v)
}

pub fn install(object_class: ClassRef) -> Frame {
    let frame = new_frame();
    let mut guard = frame.lock().unwrap();

    guard.insert("NotImplemented".into(), Value::NotImplemented);
    guard.insert(
        "print".into(),
        builtin("print", |evaluator, args, kwargs| {
            let sep = kwargs.iter().find(|(k, _)| k == "sep").map(|(_, v)| crate::modules::as_str(v)).unwrap_or_else(|| " ".into());
            let end = kwargs.iter().find(|(k, _)| k == "end").map(|(_, v)| crate::modules::as_str(v)).unwrap_or_else(|| "\n".into());
            let mut parts = Vec::with_capacity(args.len());
            for a in &args {
                parts.push(evaluator.str_value(a)?);
            }
            evaluator.context().write_stdout(&parts.join(&sep));
            evaluator.context().write_stdout(&end);
            Ok(Value::None)
        }),
    );
    guard.insert(
        "len".into(),
        builtin("len", |evaluator, args, _| {
            let v = expect_arg(&args, 0, "len")?;
            evaluator.len_of(&v).map(Value::int)
        }),
    );
    guard.insert(
        "open".into(),
        builtin("open", |evaluator, args, kwargs| {
            let path = crate::modules::as_str(&expect_arg(&args, 0, "open")?);
            let mode = args.get(1).map(crate::modules::as_str).or_else(|| kwargs.iter().find(|(k, _)| k == "mode").map(|(_, v)| crate::modules::as_str(v))).unwrap_or_else(|| "r".to_string());
            if mode.contains('+') {
                return Err(RunSignal::value_error(format!("unsupported file mode '{mode}'")));
            }
            let (readable, writable, append) = match mode.as_str() {
                "r" | "" | "rt" | "rb" => (true, false, false),
                "w" | "wt" | "wb" => (false, true, false),
                "a" | "at" | "ab" => (false, true, true),
                "x" | "xt" | "xb" => (false, true, false),
                other => return Err(RunSignal::value_error(format!("invalid mode: '{other}'"))),
            };
            let cap = if writable { Capability::FileWrite } else { Capability::FileRead };
            crate::modules::require(evaluator, &cap, "open()")?;
            let ctx = evaluator.context().clone();
            if mode.starts_with('x') && ctx.excluding_compute_time(|| ctx.filesystem().exists(&path)) {
                return Err(RunSignal::Exc(Exception::new(ExcType::OSError, format!("file exists: '{path}'"))));
            }
            let existing = if readable || append { ctx.excluding_compute_time(|| ctx.filesystem().read(&path)) } else { None };
            if readable && existing.is_none() {
                return Err(RunSignal::Exc(Exception::new(ExcType::FileNotFoundError, format!("No such file or directory: '{path}'"))));
            }
            let unread = if readable { existing.clone().unwrap_or_default() } else { String::new() };
            let write_buf = if append { existing.unwrap_or_default() } else { String::new() };
            Ok(Value::File(Arc::new(std::sync::Mutex::new(FileHandle { path, writable, readable, unread, write_buf, closed: false }))))
        }),
    );
    guard.insert(
        "range".into(),
        builtin("range", |_, args, _| {
            let (start, stop, step) = match args.len() {
                1 => (0i64, as_i64(&args[0])?, 1i64),
                2 => (as_i64(&args[0])?, as_i64(&args[1])?, 1i64),
                _ => (as_i64(&args[0])?, as_i64(&args[1])?, as_i64(&args[2])?),
            };
            if step == 0 {
                return Err(RunSignal::value_error("range() arg 3 must not be zero"));
            }
            let mut items = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                items.push(Value::int(i));
                i += step;
            }
            Ok(Value::list(items))
        }),
    );
    guard.insert(
        "sorted".into(),
        builtin("sorted", |evaluator, args, kwargs| {
            let mut items = iter_to_vec(evaluator, &expect_arg(&args, 0, "sorted")?)?;
            let key = kwargs.iter().find(|(k, _)| k == "key").map(|(_, v)| v.clone());
            let reverse = kwargs.iter().find(|(k, _)| k == "reverse").map(|(_, v)| v.truthy_default()).unwrap_or(false);
            evaluator.sort_values(&mut items, key.as_ref())?;
            if reverse {
                items.reverse();
            }
            Ok(Value::list(items))
        }),
    );
    guard.insert(
        "reversed".into(),
        builtin("reversed", |evaluator, args, _| {
            let mut items = iter_to_vec(evaluator, &expect_arg(&args, 0, "reversed")?)?;
            items.reverse();
            Ok(Value::list(items))
        }),
    );
    guard.insert(
        "enumerate".into(),
        builtin("enumerate", |evaluator, args, kwargs| {
            let start = kwargs.iter().find(|(k, _)| k == "start").map(as_i64_value).transpose()?.unwrap_or(0);
            let items = iter_to_vec(evaluator, &expect_arg(&args, 0, "enumerate")?)?;
            Ok(Value::list(
                items.into_iter().enumerate().map(|(i, v)| Value::tuple(vec![Value::int(start + i as i64), v])).collect(),
            ))
        }),
    );
    guard.insert(
        "zip".into(),
        builtin("zip", |evaluator, args, _| {
            let mut columns = Vec::with_capacity(args.len());
            for a in &args {
                columns.push(iter_to_vec(evaluator, a)?);
            }
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut rows = Vec::with_capacity(len);
            for i in 0..len {
                rows.push(Value::tuple(columns.iter().map(|c| c[i].clone()).collect()));
            }
            Ok(Value::list(rows))
        }),
    );
    guard.insert(
        "map".into(),
        builtin("map", |evaluator, args, _| {
            let func = expect_arg(&args, 0, "map")?;
            let items = iter_to_vec(evaluator, &expect_arg(&args, 1, "map")?)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluator.call_value(func.clone(), vec![item], Vec::new())?);
            }
            Ok(Value::list(out))
        }),
    );
    guard.insert(
        "filter".into(),
        builtin("filter", |evaluator, args, _| {
            let func = expect_arg(&args, 0, "filter")?;
            let items = iter_to_vec(evaluator, &expect_arg(&args, 1, "filter")?)?;
            let mut out = Vec::new();
            for item in items {
                let keep = if matches!(func, Value::None) {
                    evaluator.truthy(&item)?
                } else {
                    evaluator.truthy(&evaluator.call_value(func.clone(), vec![item.clone()], Vec::new())?)?
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }),
    );
    guard.insert(
        "sum".into(),
        builtin("sum", |evaluator, args, _| {
            let items = iter_to_vec(evaluator, &expect_arg(&args, 0, "sum")?)?;
            let mut acc = args.get(1).cloned().unwrap_or(Value::int(0));
            for item in items {
                acc = evaluator.add_values(&acc, &item)?;
            }
            Ok(acc)
        }),
    );
    guard.insert(
        "min".into(),
        builtin("min", |evaluator, args, kwargs| reduce_extreme(evaluator, args, kwargs, true)),
    );
    guard.insert(
        "max".into(),
        builtin("max", |evaluator, args, kwargs| reduce_extreme(evaluator, args, kwargs, false)),
    );
    guard.insert(
        "abs".into(),
        builtin("abs", |_, args, _| match expect_arg(&args, 0, "abs")? {
            Value::Int(i) => Ok(Value::Int(i.magnitude().clone().into())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Bool(b) => Ok(Value::int(b as i64)),
            other => Err(RunSignal::type_error(format!("bad operand type for abs(): '{}'", other.type_name()))),
        }),
    );
    guard.insert(
        "round".into(),
        builtin("round", |_, args, _| {
            let x = match &args[0] {
                Value::Float(f) => *f,
                Value::Int(i) => return Ok(Value::Int(i.clone())),
                other => return Err(RunSignal::type_error(format!("type {} doesn't define __round__ method", other.type_name()))),
            };
            Ok(Value::int(x.round() as i64))
        }),
    );
    guard.insert("str".into(), builtin("str", |evaluator, args, _| Ok(Value::str(evaluator.str_value(&expect_arg(&args, 0, "str")?)?))));
    guard.insert("repr".into(), builtin("repr", |evaluator, args, _| Ok(Value::str(evaluator.repr_value_dispatch(&expect_arg(&args, 0, "repr")?)?))));
    guard.insert(
        "int".into(),
        builtin("int", |_, args, _| {
            Ok(match args.first() {
                None => Value::int(0),
                Some(Value::Int(i)) => Value::Int(i.clone()),
                Some(Value::Float(f)) => Value::int(*f as i64),
                Some(Value::Bool(b)) => Value::int(*b as i64),
                Some(Value::Str(s)) => s.trim().parse::<BigInt>().map(Value::Int).map_err(|_| RunSignal::value_error(format!("invalid literal for int() with base 10: '{s}'")))?,
                Some(other) => return Err(RunSignal::type_error(format!("int() argument must be a string or a number, not '{}'", other.type_name()))),
            })
        }),
    );
    guard.insert(
        "float".into(),
        builtin("float", |_, args, _| {
            Ok(match args.first() {
                None => Value::Float(0.0),
                Some(Value::Float(f)) => Value::Float(*f),
                Some(Value::Int(i)) => Value::Float(bigint_to_f64(i)),
                Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| RunSignal::value_error(format!("could not convert string to float: '{s}'")))?,
                Some(other) => return Err(RunSignal::type_error(format!("float() argument must be a string or a number, not '{}'", other.type_name()))),
            })
        }),
    );
    guard.insert("bool".into(), builtin("bool", |evaluator, args, _| Ok(Value::Bool(args.first().map(|v| evaluator.truthy(v)).transpose()?.unwrap_or(false)))));
    guard.insert(
        "list".into(),
        builtin("list", |evaluator, args, _| Ok(Value::list(if let Some(v) = args.first() { iter_to_vec(evaluator, v)? } else { Vec::new() }))),
    );
    guard.insert(
        "tuple".into(),
        builtin("tuple", |evaluator, args, _| Ok(Value::tuple(if let Some(v) = args.first() { iter_to_vec(evaluator, v)? } else { Vec::new() }))),
    );
    guard.insert(
        "dict".into(),
        builtin("dict", |_, _args, kwargs| {
            let mut map = IndexMap::new();
            for (k, v) in kwargs {
                map.insert(DictKey::Str(Arc::new(k)), v);
            }
            Ok(Value::dict(map))
        }),
    );
    guard.insert(
        "set".into(),
        builtin("set", |evaluator, args, _| {
            let mut set = indexmap::IndexSet::new();
            if let Some(v) = args.first() {
                for item in iter_to_vec(evaluator, v)? {
                    set.insert(DictKey::from_value(&item).ok_or_else(|| RunSignal::type_error(format!("unhashable type: '{}'", item.type_name())))?);
                }
            }
            Ok(Value::Set(Arc::new(std::sync::Mutex::new(set))))
        }),
    );
    guard.insert(
        "isinstance".into(),
        builtin("isinstance", |evaluator, args, _| Ok(Value::Bool(evaluator.is_instance(&expect_arg(&args, 0, "isinstance")?, &expect_arg(&args, 1, "isinstance")?)?))),
    );
    guard.insert(
        "issubclass".into(),
        builtin("issubclass", |_, args, _| match (&args[0], &args[1]) {
            (Value::Class(a), Value::Class(b)) => Ok(Value::Bool(object::is_subclass(a, b))),
            _ => Err(RunSignal::type_error("issubclass() arg 1 must be a class")),
        }),
    );
    guard.insert(
        "type".into(),
        builtin("type", |_, args, _| {
            let v = expect_arg(&args, 0, "type")?;
            Ok(match v {
                Value::Instance(inst) => Value::Class(inst.lock().unwrap().class.clone()),
                other => Value::str(other.type_name()),
            })
        }),
    );
    guard.insert(
        "super".into(),
        builtin("super", |evaluator, args, _| evaluator.builtin_super(args)),
    );
    guard.insert(
        "hasattr".into(),
        builtin("hasattr", |evaluator, args, _| Ok(Value::Bool(evaluator.get_attr_value(&expect_arg(&args, 0, "hasattr")?, &crate::modules::as_str(&args[1])).is_ok()))),
    );
    guard.insert(
        "getattr".into(),
        builtin("getattr", |evaluator, args, _| {
            let name = crate::modules::as_str(&args[1]);
            match evaluator.get_attr_value(&args[0], &name) {
                Ok(v) => Ok(v),
                Err(e) => args.get(2).cloned().ok_or(e),
            }
        }),
    );
    guard.insert(
        "setattr".into(),
        builtin("setattr", |evaluator, args, _| {
            evaluator.set_attr_value(&args[0], &crate::modules::as_str(&args[1]), args[2].clone())?;
            Ok(Value::None)
        }),
    );
    guard.insert(
        "dir".into(),
        builtin("dir", |evaluator, args, _| Ok(Value::list(evaluator.dir_of(&expect_arg(&args, 0, "dir")?)?.into_iter().map(Value::str).collect()))),
    );
    guard.insert(
        "iter".into(),
        builtin("iter", |_, args, _| Ok(expect_arg(&args, 0, "iter")?)),
    );
    guard.insert(
        "next".into(),
        builtin("next", |evaluator, args, _| evaluator.generator_next(&expect_arg(&args, 0, "next")?)),
    );
    guard.insert(
        "all".into(),
        builtin("all", |evaluator, args, _| {
            for item in iter_to_vec(evaluator, &expect_arg(&args, 0, "all")?)? {
                if !evaluator.truthy(&item)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
    );
    guard.insert(
        "any".into(),
        builtin("any", |evaluator, args, _| {
            for item in iter_to_vec(evaluator, &expect_arg(&args, 0, "any")?)? {
                if evaluator.truthy(&item)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
    );
    guard.insert("object".into(), Value::Class(object_class));

    for (name, exc) in crate::object::exception_classes().iter() {
        guard.insert(exc.lock().unwrap().name.clone(), Value::Class(exc.clone()));
        let _ = name;
    }

    drop(guard);
    frame
}

fn as_i64(v: &Value) -> EvalResult<i64> {
    match v {
        Value::Int(i) => i.to_i64().ok_or_else(|| RunSignal::value_error("Python int too large to convert to Rust i64")),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(RunSignal::type_error(format!("'{}' object cannot be interpreted as an integer", other.type_name()))),
    }
}

fn as_i64_value((_, v): &(String, Value)) -> EvalResult<i64> {
    as_i64(v)
}

fn reduce_extreme(evaluator: &mut Evaluator, args: Vec<Value>, kwargs: Vec<(String, Value)>, want_min: bool) -> EvalResult<Value> {
    let key = kwargs.iter().find(|(k, _)| k == "key").map(|(_, v)| v.clone());
    let items = if args.len() == 1 { iter_to_vec(evaluator, &args[0])? } else { args };
    if items.is_empty() {
        return Err(RunSignal::value_error(if want_min { "min() arg is an empty sequence" } else { "max() arg is an empty sequence" }));
    }
    let mut best = items[0].clone();
    let mut best_key = match &key {
        Some(f) => evaluator.call_value(f.clone(), vec![best.clone()], Vec::new())?,
        None => best.clone(),
    };
    for item in items.into_iter().skip(1) {
        let candidate_key = match &key {
            Some(f) => evaluator.call_value(f.clone(), vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let less = evaluator.less_than(&candidate_key, &best_key)?;
        if less == want_min {
            best = item;
            best_key = candidate_key;
        }
    }
    Ok(best)
}
