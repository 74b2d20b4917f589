use indexmap::IndexMap;

use crate::object::new_class;
use crate::value::{DictKey, Value};

use super::{as_str, builtin, module_value};

/// `FastAPI` stub: `@app.get(path)`/`@app.post(path)` register the decorated
/// function in a routes dict on the instance. There is no real HTTP server —
/// running one is out of scope (`spec.md` non-goals), but the route-table
/// contract a script's decorators rely on is real.
pub fn build() -> Value {
    let mut class_attrs = IndexMap::new();
    class_attrs.insert(
        "__init__".into(),
        builtin("__init__", |_, args, _| {
            if let Value::Instance(inst) = &args[0] {
                inst.lock().unwrap().attrs.insert("routes".into(), Value::dict(IndexMap::new()));
            }
            Ok(Value::None)
        }),
    );
    for method in ["get", "post", "put", "delete"] {
        class_attrs.insert(
            method.into(),
            builtin(method, move |_, args, _| {
                let Value::Instance(inst) = &args[0] else {
                    return Ok(Value::None);
                };
                let path = as_str(&args[1]);
                let inst = inst.clone();
                let method = method.to_string();
                Ok(builtin("route_decorator", move |_, handler_args, _| {
                    let handler = handler_args[0].clone();
                    if let Value::Dict(routes) = inst.lock().unwrap().attrs.get("routes").cloned().unwrap_or(Value::dict(IndexMap::new())) {
                        let key = DictKey::Str(std::sync::Arc::new(format!("{method} {path}")));
                        routes.lock().unwrap().insert(key, handler.clone());
                    }
                    Ok(handler)
                }))
            }),
        );
    }
    let app_class = new_class("FastAPI", Vec::new(), class_attrs, "fastapi").expect("FastAPI class has no bases to conflict");

    let mut attrs = IndexMap::new();
    attrs.insert("FastAPI".into(), Value::Class(app_class));
    module_value("fastapi", attrs)
}
