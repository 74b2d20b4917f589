use indexmap::IndexMap;

use crate::object::new_class;
use crate::value::{DictKey, Value};

use super::{builtin, module_value};

/// `BaseModel` stub: `__init__` stores every keyword argument as an attribute
/// (no field declarations or validation — `spec.md` §4.7 scopes real stdlib
/// fidelity out, just the contract a script's `class Foo(BaseModel)` needs).
pub fn build() -> Value {
    let mut class_attrs = IndexMap::new();
    class_attrs.insert(
        "__init__".into(),
        builtin("__init__", |_, args, kwargs| {
            if let Value::Instance(inst) = &args[0] {
                let mut guard = inst.lock().unwrap();
                for (key, value) in kwargs {
                    guard.attrs.insert(key, value);
                }
            }
            Ok(Value::None)
        }),
    );
    class_attrs.insert(
        "dict".into(),
        builtin("dict", |_, args, _| {
            let Value::Instance(inst) = &args[0] else {
                return Ok(Value::dict(IndexMap::new()));
            };
            let mut map: IndexMap<DictKey, Value> = IndexMap::new();
            for (key, value) in &inst.lock().unwrap().attrs {
                map.insert(DictKey::Str(std::sync::Arc::new(key.clone())), value.clone());
            }
            Ok(Value::dict(map))
        }),
    );
    let base_model = new_class("BaseModel", Vec::new(), class_attrs, "pydantic").expect("BaseModel class has no bases to conflict");

    let mut attrs = IndexMap::new();
    attrs.insert("BaseModel".into(), Value::Class(base_model));
    module_value("pydantic", attrs)
}
