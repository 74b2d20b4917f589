use indexmap::IndexMap;

use crate::error::RunSignal;
use crate::value::Value;

use super::{as_f64, builtin, module_value};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert("pi".into(), Value::Float(std::f64::consts::PI));
    attrs.insert("e".into(), Value::Float(std::f64::consts::E));
    attrs.insert("inf".into(), Value::Float(f64::INFINITY));
    attrs.insert("nan".into(), Value::Float(f64::NAN));
    attrs.insert(
        "sqrt".into(),
        builtin("sqrt", |_, args, _| {
            let x = as_f64(&args[0]);
            if x < 0.0 {
                return Err(RunSignal::value_error("math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }),
    );
    attrs.insert("floor".into(), builtin("floor", |_, args, _| Ok(Value::int(as_f64(&args[0]).floor() as i64))));
    attrs.insert("ceil".into(), builtin("ceil", |_, args, _| Ok(Value::int(as_f64(&args[0]).ceil() as i64))));
    attrs.insert("fabs".into(), builtin("fabs", |_, args, _| Ok(Value::Float(as_f64(&args[0]).abs()))));
    attrs.insert("pow".into(), builtin("pow", |_, args, _| Ok(Value::Float(as_f64(&args[0]).powf(as_f64(&args[1]))))));
    attrs.insert("log".into(), builtin("log", |_, args, _| {
        let x = as_f64(&args[0]);
        let result = if args.len() > 1 { x.log(as_f64(&args[1])) } else { x.ln() };
        Ok(Value::Float(result))
    }));
    attrs.insert("isnan".into(), builtin("isnan", |_, args, _| Ok(Value::Bool(as_f64(&args[0]).is_nan()))));
    module_value("math", attrs)
}
