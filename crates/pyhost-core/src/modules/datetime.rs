use indexmap::IndexMap;

use crate::object::new_class;
use crate::value::Value;

use super::{builtin, module_value};

pub fn build() -> Value {
    let mut class_attrs = IndexMap::new();
    class_attrs.insert(
        "now".into(),
        builtin("now", |_, _, _| {
            let now = chrono::Local::now();
            Ok(Value::str(now.format("%Y-%m-%d %H:%M:%S").to_string()))
        }),
    );
    let datetime_class = new_class("datetime", Vec::new(), class_attrs, "datetime").expect("datetime class has no bases to conflict");

    let mut attrs = IndexMap::new();
    attrs.insert("datetime".into(), Value::Class(datetime_class));
    module_value("datetime", attrs)
}
