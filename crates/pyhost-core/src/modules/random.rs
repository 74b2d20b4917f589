use indexmap::IndexMap;

use crate::error::RunSignal;
use crate::value::Value;

use super::{as_f64, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "random".into(),
        builtin("random", |_, _, _| Ok(Value::Float(rand::random::<f64>()))),
    );
    attrs.insert(
        "randint".into(),
        builtin("randint", |_, args, _| {
            let lo = as_f64(&args[0]) as i64;
            let hi = as_f64(&args[1]) as i64;
            if hi < lo {
                return Err(RunSignal::value_error("empty range for randint()"));
            }
            Ok(Value::int(lo + (rand::random::<u64>() % (hi - lo + 1) as u64) as i64))
        }),
    );
    attrs.insert(
        "choice".into(),
        builtin("choice", |_, args, _| match &args[0] {
            Value::List(items) => {
                let items = items.lock().unwrap();
                if items.is_empty() {
                    return Err(RunSignal::index_error("Cannot choose from an empty sequence"));
                }
                let idx = (rand::random::<u64>() % items.len() as u64) as usize;
                Ok(items[idx].clone())
            }
            Value::Tuple(items) => {
                if items.is_empty() {
                    return Err(RunSignal::index_error("Cannot choose from an empty sequence"));
                }
                let idx = (rand::random::<u64>() % items.len() as u64) as usize;
                Ok(items[idx].clone())
            }
            _ => Err(RunSignal::type_error("choice() argument must be a sequence")),
        }),
    );
    attrs.insert("seed".into(), builtin("seed", |_, _, _| Ok(Value::None)));
    module_value("random", attrs)
}
