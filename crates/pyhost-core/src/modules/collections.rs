use indexmap::IndexMap;

use crate::object::new_class;
use crate::value::{DictKey, Value};

use super::{as_str, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert("OrderedDict".into(), builtin("OrderedDict", |_, _, _| Ok(Value::dict(IndexMap::new()))));
    attrs.insert(
        "defaultdict".into(),
        builtin("defaultdict", |_, _args, _| {
            // Simplified: behaves like a plain dict; the default-factory
            // behavior on missing keys is not modeled.
            Ok(Value::dict(IndexMap::new()))
        }),
    );
    attrs.insert(
        "Counter".into(),
        builtin("Counter", |_, args, _| {
            let mut counts: IndexMap<DictKey, Value> = IndexMap::new();
            if let Some(Value::List(items)) = args.first() {
                for item in items.lock().unwrap().iter() {
                    if let Some(key) = DictKey::from_value(item) {
                        let entry = counts.entry(key).or_insert(Value::int(0));
                        if let Value::Int(n) = entry {
                            *n += num_bigint::BigInt::from(1);
                        }
                    }
                }
            }
            Ok(Value::dict(counts))
        }),
    );
    attrs.insert(
        "namedtuple".into(),
        builtin("namedtuple", |_, args, _| {
            let name = as_str(&args[0]);
            let fields: Vec<String> = match &args[1] {
                Value::List(items) => items.lock().unwrap().iter().map(as_str).collect(),
                Value::Tuple(items) => items.iter().map(as_str).collect(),
                other => as_str(other).split_whitespace().map(str::to_string).collect(),
            };
            let mut class_attrs = IndexMap::new();
            class_attrs.insert(
                "__match_args__".into(),
                Value::tuple(fields.iter().map(|f| Value::str(f.clone())).collect()),
            );
            let cls = new_class(name, Vec::new(), class_attrs, "collections").expect("namedtuple class has no bases to conflict");
            Ok(Value::Class(cls))
        }),
    );
    module_value("collections", attrs)
}
