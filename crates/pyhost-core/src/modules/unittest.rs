use indexmap::IndexMap;

use crate::error::RunSignal;
use crate::object::new_class;
use crate::value::Value;

use super::{builtin, module_value};

pub fn build() -> Value {
    let mut class_attrs = IndexMap::new();
    class_attrs.insert(
        "assertEqual".into(),
        builtin("assertEqual", |evaluator, args, _| {
            let (a, b) = (args.get(1).cloned().unwrap_or(Value::None), args.get(2).cloned().unwrap_or(Value::None));
            if evaluator.values_equal(&a, &b)? {
                Ok(Value::None)
            } else {
                Err(RunSignal::Exc(crate::error::Exception::new(
                    crate::error::ExcType::AssertionError,
                    format!("{} != {}", crate::builtins::repr_value(&a), crate::builtins::repr_value(&b)),
                )))
            }
        }),
    );
    class_attrs.insert(
        "assertTrue".into(),
        builtin("assertTrue", |evaluator, args, _| {
            let v = args.get(1).cloned().unwrap_or(Value::None);
            if evaluator.truthy(&v)? {
                Ok(Value::None)
            } else {
                Err(RunSignal::Exc(crate::error::Exception::new(crate::error::ExcType::AssertionError, "assertTrue failed")))
            }
        }),
    );
    let test_case = new_class("TestCase", Vec::new(), class_attrs, "unittest").expect("TestCase class has no bases to conflict");

    let mut attrs = IndexMap::new();
    attrs.insert("TestCase".into(), Value::Class(test_case));
    module_value("unittest", attrs)
}
