use indexmap::IndexMap;

use crate::capability::Capability;
use crate::value::Value;

use super::{builtin, module_value, require};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "connect".into(),
        builtin("connect", |evaluator, _args, _| {
            require(evaluator, &Capability::Sql, "database connection")?;
            Ok(Value::list(Vec::new()))
        }),
    );
    module_value("sql", attrs)
}
