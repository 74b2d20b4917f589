//! The runtime value universe (`spec.md` §3).
//!
//! Mutable containers use `Arc<Mutex<_>>` rather than `Rc<RefCell<_>>`: a
//! generator body runs on its own cooperatively-scheduled OS thread (see
//! `evaluator::generator`), and only one side of the yield/resume handshake
//! ever runs at a time, so the `Mutex` here is for `Send`, not contention.
//! This is the interior-mutability strategy `spec.md` §9 explicitly leaves to
//! the implementer, and it is what lets an object graph contain cycles
//! without a dedicated collector: cycles leak, and are reclaimed when the
//! host drops the run, exactly as §9 describes.

use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::filesystem::FileRef;
use crate::object::{ClassRef, InstanceRef};

pub type SharedList = Arc<Mutex<Vec<Value>>>;
pub type SharedDict = Arc<Mutex<IndexMap<DictKey, Value>>>;
pub type SharedSet = Arc<Mutex<indexmap::IndexSet<DictKey>>>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(Arc<String>),
    Bytes(Arc<Vec<u8>>),
    List(SharedList),
    Tuple(Arc<Vec<Value>>),
    Dict(SharedDict),
    Set(SharedSet),
    Function(Arc<FunctionValue>),
    BoundMethod(Arc<BoundMethod>),
    Class(ClassRef),
    Instance(InstanceRef),
    Builtin(Arc<BuiltinFn>),
    Generator(crate::evaluator::generator::GeneratorHandle),
    Module(crate::modules::ModuleRef),
    SuperProxy(Arc<SuperProxy>),
    /// A handle returned by `open()` (`spec.md` §4.6).
    File(FileRef),
    /// The singleton `NotImplemented` sentinel a reflected-operator dunder
    /// returns to say "try the other operand instead" (`spec.md` §4.3).
    NotImplemented,
}

/// A bound `super()` call: method lookup walks `instance_class`'s MRO
/// starting after `skip` entries, dispatched against `receiver`.
pub struct SuperProxy {
    pub receiver: Value,
    pub instance_class: ClassRef,
    pub skip: usize,
}

/// A hashable, total-ordering-free key for dict/set storage. Python values
/// that are unhashable (list, dict, set) simply cannot construct one; callers
/// raise `TypeError: unhashable type` before reaching here.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(BigInt),
    /// Float keys are bit-pattern hashed; Python unifies `1 == 1.0` hashing,
    /// which this intentionally does not attempt to replicate exactly.
    Float(u64),
    Str(Arc<String>),
    Bytes(Arc<Vec<u8>>),
    Tuple(Vec<DictKey>),
}

impl DictKey {
    pub fn from_value(v: &Value) -> Option<DictKey> {
        Some(match v {
            Value::None => DictKey::None,
            Value::Bool(b) => DictKey::Bool(*b),
            Value::Int(i) => DictKey::Int(i.clone()),
            Value::Float(f) => DictKey::Float(f.to_bits()),
            Value::Str(s) => DictKey::Str(s.clone()),
            Value::Bytes(b) => DictKey::Bytes(b.clone()),
            Value::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(DictKey::from_value(item)?);
                }
                DictKey::Tuple(out)
            }
            _ => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            DictKey::None => Value::None,
            DictKey::Bool(b) => Value::Bool(*b),
            DictKey::Int(i) => Value::Int(i.clone()),
            DictKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            DictKey::Str(s) => Value::Str(s.clone()),
            DictKey::Bytes(b) => Value::Bytes(b.clone()),
            DictKey::Tuple(items) => Value::Tuple(Arc::new(items.iter().map(DictKey::to_value).collect())),
        }
    }
}

/// Positional/keyword parameter specification for a `def`/`lambda`.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    pub positional: Vec<String>,
    pub defaults: Vec<Value>,
    pub star_args: Option<String>,
    pub kwonly: Vec<String>,
    pub kwonly_defaults: Vec<Option<Value>>,
    pub star_kwargs: Option<String>,
}

pub struct FunctionValue {
    pub name: String,
    pub params: ParamSpec,
    pub body: Arc<Vec<crate::parser::ast::Stmt>>,
    pub closure: crate::environment::Env,
    pub is_generator: bool,
    pub module_name: String,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub func: Value,
}

pub type BuiltinImpl = dyn Fn(&mut crate::evaluator::Evaluator, Vec<Value>, Vec<(String, Value)>) -> crate::error::EvalResult<Value> + Send + Sync;

pub struct BuiltinFn {
    pub name: String,
    pub func: Box<BuiltinImpl>,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Arc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn dict(map: IndexMap<DictKey, Value>) -> Value {
        Value::Dict(Arc::new(Mutex::new(map)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Arc::new(items))
    }

    pub fn int(i: i64) -> Value {
        Value::Int(BigInt::from(i))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::Bytes(_) => "bytes".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Set(_) => "set".into(),
            Value::Function(_) => "function".into(),
            Value::BoundMethod(_) => "method".into(),
            Value::Class(c) => format!("type[{}]", c.lock().unwrap().name),
            Value::Instance(i) => i.lock().unwrap().class.lock().unwrap().name.clone(),
            Value::Builtin(_) => "builtin_function_or_method".into(),
            Value::Generator(_) => "generator".into(),
            Value::Module(_) => "module".into(),
            Value::SuperProxy(_) => "super".into(),
            Value::File(_) => "file".into(),
            Value::NotImplemented => "NotImplementedType".into(),
        }
    }

    /// Default truthiness for values with no user-defined `__bool__`/`__len__`.
    pub fn truthy_default(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.eq(&BigInt::from(0)),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.lock().unwrap().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.lock().unwrap().is_empty(),
            Value::Set(s) => !s.lock().unwrap().is_empty(),
            _ => true,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} value>", self.type_name())
    }
}
