use indexmap::IndexMap;

use crate::value::Value;

use super::{builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "uuid4".into(),
        builtin("uuid4", |_, _, _| Ok(Value::str(uuid::Uuid::new_v4().to_string()))),
    );
    module_value("uuid", attrs)
}
