use indexmap::IndexMap;

use crate::value::Value;

use super::{as_str, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "getenv".into(),
        builtin("getenv", |evaluator, args, _| {
            let name = as_str(&args[0]);
            Ok(match evaluator.context().env_var(&name) {
                Some(v) => Value::str(v),
                None => args.get(1).cloned().unwrap_or(Value::None),
            })
        }),
    );
    attrs.insert("environ".into(), Value::dict(IndexMap::new()));
    module_value("os", attrs)
}
