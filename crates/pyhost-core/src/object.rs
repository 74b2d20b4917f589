//! Classes, instances, and C3-linearized method resolution (`spec.md` §4.3).

use std::sync::{Arc, Mutex, OnceLock};

use indexmap::IndexMap;

use crate::error::{EvalResult, ExcType, RunSignal};
use crate::value::Value;

pub type ClassRef = Arc<Mutex<ClassValue>>;
pub type InstanceRef = Arc<Mutex<InstanceValue>>;

pub struct ClassValue {
    pub name: String,
    pub bases: Vec<ClassRef>,
    /// Computed once at class creation (`spec.md` §3 invariant) and never
    /// recomputed; begins with the class itself and ends with `object`.
    pub mro: Vec<ClassRef>,
    pub attrs: IndexMap<String, Value>,
    pub module_name: String,
    /// `__match_args__` for positional `case ClassName(a, b)` patterns.
    pub match_args: Vec<String>,
    /// Set only for the built-in exception hierarchy, so `except` matching
    /// can fall back to `ExcType::is_subclass_of` fast paths.
    pub exc_type: Option<ExcType>,
}

pub struct InstanceValue {
    pub class: ClassRef,
    pub attrs: IndexMap<String, Value>,
}

/// C3 linearization: `L[C] = C + merge(L[B1..Bn], [B1..Bn])`.
pub fn compute_c3_mro(this: &ClassRef, bases: &[ClassRef]) -> EvalResult<Vec<ClassRef>> {
    if bases.is_empty() {
        return Ok(vec![this.clone()]);
    }
    let mut sequences: Vec<Vec<ClassRef>> = bases.iter().map(|b| b.lock().unwrap().mro.clone()).collect();
    sequences.push(bases.to_vec());
    let merged = c3_merge(sequences)?;
    let mut mro = vec![this.clone()];
    mro.extend(merged);
    Ok(mro)
}

fn c3_merge(mut sequences: Vec<Vec<ClassRef>>) -> EvalResult<Vec<ClassRef>> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        let candidate = sequences.iter().map(|s| &s[0]).find(|head| {
            !sequences.iter().any(|seq| seq[1..].iter().any(|c| Arc::ptr_eq(c, head)))
        });
        let Some(candidate) = candidate.cloned() else {
            return Err(RunSignal::type_error("Cannot create a consistent method resolution order (MRO)"));
        };
        result.push(candidate.clone());
        for seq in sequences.iter_mut() {
            if seq.first().is_some_and(|h| Arc::ptr_eq(h, &candidate)) {
                seq.remove(0);
            }
        }
    }
}

/// Returns the well-known `object` root class, created once per process.
pub fn object_class() -> ClassRef {
    static OBJECT: OnceLock<ClassRef> = OnceLock::new();
    OBJECT
        .get_or_init(|| {
            Arc::new(Mutex::new(ClassValue {
                name: "object".to_string(),
                bases: Vec::new(),
                mro: Vec::new(),
                attrs: IndexMap::new(),
                module_name: "builtins".to_string(),
                match_args: Vec::new(),
                exc_type: None,
            }))
        })
        .clone()
}

fn ensure_object_seeded() {
    let obj = object_class();
    let mut guard = obj.lock().unwrap();
    if guard.mro.is_empty() {
        guard.mro = vec![obj_self()];
    }
}

fn obj_self() -> ClassRef {
    object_class()
}

/// Creates a new class value with its MRO computed and cached.
pub fn new_class(
    name: impl Into<String>,
    mut bases: Vec<ClassRef>,
    attrs: IndexMap<String, Value>,
    module_name: impl Into<String>,
) -> EvalResult<ClassRef> {
    ensure_object_seeded();
    if bases.is_empty() {
        bases.push(object_class());
    }
    let match_args = match attrs.get("__match_args__") {
        Some(Value::Tuple(items)) => items
            .iter()
            .filter_map(|v| if let Value::Str(s) = v { Some((**s).clone()) } else { None })
            .collect(),
        _ => Vec::new(),
    };
    let class_ref: ClassRef = Arc::new(Mutex::new(ClassValue {
        name: name.into(),
        bases: bases.clone(),
        mro: Vec::new(),
        attrs,
        module_name: module_name.into(),
        match_args,
        exc_type: None,
    }));
    let mro = compute_c3_mro(&class_ref, &bases)?;
    class_ref.lock().unwrap().mro = mro;
    Ok(class_ref)
}

/// Walks `cls`'s MRO for `name`, skipping the first `skip` entries (used to
/// implement zero-arg `super()`, which searches starting *after* the
/// defining class).
pub fn mro_lookup(cls: &ClassRef, name: &str, skip: usize) -> Option<(ClassRef, Value)> {
    let mro = cls.lock().unwrap().mro.clone();
    for ancestor in mro.into_iter().skip(skip) {
        let found = ancestor.lock().unwrap().attrs.get(name).cloned();
        if let Some(v) = found {
            return Some((ancestor, v));
        }
    }
    None
}

pub fn is_subclass(cls: &ClassRef, of: &ClassRef) -> bool {
    cls.lock().unwrap().mro.iter().any(|c| Arc::ptr_eq(c, of))
}

/// Attribute lookup on an instance per `spec.md` §4.3: instance dict first,
/// then the type's MRO, wrapping a found function as a bound method.
pub fn get_attr(instance: &InstanceRef, name: &str) -> EvalResult<Value> {
    if let Some(v) = instance.lock().unwrap().attrs.get(name).cloned() {
        return Ok(v);
    }
    let class = instance.lock().unwrap().class.clone();
    if let Some((_, value)) = mro_lookup(&class, name, 0) {
        if matches!(value, Value::Function(_)) {
            return Ok(Value::BoundMethod(Arc::new(crate::value::BoundMethod {
                receiver: Value::Instance(instance.clone()),
                func: value,
            })));
        }
        return Ok(value);
    }
    let class_name = class.lock().unwrap().name.clone();
    Err(RunSignal::attribute_error(format!("'{class_name}' object has no attribute '{name}'")))
}

pub fn exception_classes() -> &'static IndexMap<ExcType, ClassRef> {
    static REGISTRY: OnceLock<IndexMap<ExcType, ClassRef>> = OnceLock::new();
    REGISTRY.get_or_init(build_exception_hierarchy)
}

fn build_exception_hierarchy() -> IndexMap<ExcType, ClassRef> {
    use ExcType::*;
    let mut map: IndexMap<ExcType, ClassRef> = IndexMap::new();
    let mut make = |name: &str, exc: ExcType, base: Option<ExcType>, map: &mut IndexMap<ExcType, ClassRef>| {
        let bases = base.map(|b| vec![map[&b].clone()]).unwrap_or_default();
        let cls = new_class(name, bases, IndexMap::new(), "builtins").expect("builtin exception hierarchy is acyclic");
        cls.lock().unwrap().exc_type = Some(exc);
        map.insert(exc, cls);
    };
    make("BaseException", BaseException, None, &mut map);
    make("Exception", Exception, Some(BaseException), &mut map);
    make("ArithmeticError", ArithmeticError, Some(Exception), &mut map);
    make("ZeroDivisionError", ZeroDivisionError, Some(ArithmeticError), &mut map);
    make("LookupError", LookupError, Some(Exception), &mut map);
    make("IndexError", IndexError, Some(LookupError), &mut map);
    make("KeyError", KeyError, Some(LookupError), &mut map);
    make("RuntimeError", RuntimeError, Some(Exception), &mut map);
    make("RecursionError", RecursionError, Some(RuntimeError), &mut map);
    make("NotImplementedError", NotImplementedError, Some(RuntimeError), &mut map);
    make("StopIteration", StopIteration, Some(Exception), &mut map);
    make("AttributeError", AttributeError, Some(Exception), &mut map);
    make("NameError", NameError, Some(Exception), &mut map);
    make("UnboundLocalError", UnboundLocalError, Some(NameError), &mut map);
    make("ValueError", ValueError, Some(Exception), &mut map);
    make("TypeError", TypeError, Some(Exception), &mut map);
    make("ImportError", ImportError, Some(Exception), &mut map);
    make("ModuleNotFoundError", ModuleNotFoundError, Some(ImportError), &mut map);
    make("OSError", OSError, Some(Exception), &mut map);
    make("FileNotFoundError", FileNotFoundError, Some(OSError), &mut map);
    make("IsADirectoryError", IsADirectoryError, Some(OSError), &mut map);
    make("PermissionError", PermissionError, Some(OSError), &mut map);
    make("NetworkError", NetworkError, Some(OSError), &mut map);
    make("SyntaxError", SyntaxError, Some(Exception), &mut map);
    make("AssertionError", AssertionError, Some(Exception), &mut map);
    make("KeyboardInterrupt", KeyboardInterrupt, Some(BaseException), &mut map);
    map
}

pub fn class_for_exc_type(exc: ExcType) -> Option<ClassRef> {
    exception_classes().get(&exc).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, bases: Vec<ClassRef>) -> ClassRef {
        new_class(name, bases, IndexMap::new(), "test").unwrap()
    }

    #[test]
    fn diamond_mro_prefers_declared_order() {
        let a = named("A", vec![]);
        let b = named("B", vec![a.clone()]);
        let c = named("C", vec![a.clone()]);
        let d = named("D", vec![b.clone(), c.clone()]);
        let names: Vec<String> = d.lock().unwrap().mro.iter().map(|c| c.lock().unwrap().name.clone()).collect();
        assert_eq!(names, vec!["D", "B", "C", "A", "object"]);
    }

    #[test]
    fn inconsistent_mro_is_type_error() {
        let a = named("A", vec![]);
        let b = named("B", vec![]);
        let x = named("X", vec![a.clone(), b.clone()]);
        let y = named("Y", vec![b.clone(), a.clone()]);
        let attrs = IndexMap::new();
        let bases = vec![x, y];
        let z: ClassRef = Arc::new(Mutex::new(ClassValue {
            name: "Z".into(),
            bases: bases.clone(),
            mro: Vec::new(),
            attrs,
            module_name: "test".into(),
            match_args: Vec::new(),
            exc_type: None,
        }));
        assert!(compute_c3_mro(&z, &bases).is_err());
    }
}
