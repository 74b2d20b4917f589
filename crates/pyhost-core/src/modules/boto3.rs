use indexmap::IndexMap;

use crate::capability::Capability;
use crate::value::Value;

use super::{builtin, module_value, require};

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "client".into(),
        builtin("client", |evaluator, _args, _| {
            require(evaluator, &Capability::Boto3, "boto3 client creation")?;
            Ok(Value::dict(IndexMap::new()))
        }),
    );
    attrs.insert(
        "resource".into(),
        builtin("resource", |evaluator, _args, _| {
            require(evaluator, &Capability::Boto3, "boto3 resource creation")?;
            Ok(Value::dict(IndexMap::new()))
        }),
    );
    module_value("boto3", attrs)
}
