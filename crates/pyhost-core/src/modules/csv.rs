use indexmap::IndexMap;

use crate::value::Value;

use super::{as_str, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "reader".into(),
        builtin("reader", |_, args, _| {
            let lines: Vec<String> = match &args[0] {
                Value::List(items) => items.lock().unwrap().iter().map(as_str).collect(),
                Value::Str(s) => s.lines().map(str::to_string).collect(),
                other => vec![as_str(other)],
            };
            let rows = lines
                .into_iter()
                .filter(|l| !l.is_empty())
                .map(|line| Value::list(line.split(',').map(|cell| Value::str(cell.trim())).collect()))
                .collect();
            Ok(Value::list(rows))
        }),
    );
    attrs.insert(
        "writer_row".into(),
        builtin("writer_row", |_, args, _| {
            let cells: Vec<String> = match &args[0] {
                Value::List(items) => items.lock().unwrap().iter().map(as_str).collect(),
                Value::Tuple(items) => items.iter().map(as_str).collect(),
                other => vec![as_str(other)],
            };
            Ok(Value::str(cells.join(",")))
        }),
    );
    module_value("csv", attrs)
}
