use indexmap::IndexMap;

use crate::value::Value;

use super::{builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "time".into(),
        builtin("time", |_, _, _| {
            let secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            Ok(Value::Float(secs))
        }),
    );
    attrs.insert(
        "monotonic".into(),
        builtin("monotonic", |evaluator, _, _| Ok(Value::Float(evaluator.monotonic_seconds()))),
    );
    // `sleep` is a no-op: a sandboxed compute budget cannot spend real wall
    // time waiting, but the deadline check still runs so a script that
    // busy-loops around `sleep` remains boundable.
    attrs.insert(
        "sleep".into(),
        builtin("sleep", |evaluator, _, _| {
            evaluator.check_deadline()?;
            Ok(Value::None)
        }),
    );
    module_value("time", attrs)
}
