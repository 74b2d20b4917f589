use indexmap::IndexMap;

use crate::value::Value;

use super::{as_str, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "escape".into(),
        builtin("escape", |_, args, _| {
            let s = as_str(&args[0]);
            let escaped = s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;");
            Ok(Value::str(escaped))
        }),
    );
    module_value("html", attrs)
}
