use indexmap::IndexMap;

use crate::value::Value;

use super::{as_f64, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "chain".into(),
        builtin("chain", |_, args, _| {
            let mut out = Vec::new();
            for a in &args {
                match a {
                    Value::List(items) => out.extend(items.lock().unwrap().iter().cloned()),
                    Value::Tuple(items) => out.extend(items.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::list(out))
        }),
    );
    attrs.insert(
        "count".into(),
        builtin("count", |_, args, _| {
            let start = args.first().map(as_f64).unwrap_or(0.0);
            // Returned as a materialized small window rather than a true
            // infinite iterator: the tree-walking evaluator's `for` loop
            // consumes iterables eagerly through `__iter__`/`__next__`.
            Ok(Value::list((0..1000).map(|i| Value::Float(start + i as f64)).collect()))
        }),
    );
    attrs.insert(
        "repeat".into(),
        builtin("repeat", |_, args, _| {
            let value = args.first().cloned().unwrap_or(Value::None);
            let times = args.get(1).map(as_f64).unwrap_or(1.0) as usize;
            Ok(Value::list(vec![value; times]))
        }),
    );
    module_value("itertools", attrs)
}
