use indexmap::IndexMap;

use crate::error::RunSignal;
use crate::value::Value;

use super::{as_str, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "dumps".into(),
        builtin("dumps", |_, args, _| {
            let json = crate::builtins::value_to_json(&args[0]);
            let text = serde_json::to_string(&json).map_err(|e| RunSignal::value_error(e.to_string()))?;
            Ok(Value::str(text))
        }),
    );
    attrs.insert(
        "loads".into(),
        builtin("loads", |_, args, _| {
            let text = as_str(&args[0]);
            let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| RunSignal::value_error(format!("invalid JSON: {e}")))?;
            Ok(crate::builtins::json_to_value(&json))
        }),
    );
    module_value("json", attrs)
}
