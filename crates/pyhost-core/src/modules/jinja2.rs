use indexmap::IndexMap;

use crate::builtins::repr_value;
use crate::object::new_class;
use crate::value::Value;

use super::{as_str, builtin, module_value};

/// `{{ name }}` substitution only — no control flow, filters, or
/// inheritance. Enough to exercise `jinja2.Template(...).render(**ctx)`.
pub fn build() -> Value {
    let mut class_attrs = IndexMap::new();
    class_attrs.insert(
        "__init__".into(),
        builtin("__init__", |_, args, _| {
            if let Value::Instance(inst) = &args[0] {
                inst.lock().unwrap().attrs.insert("_source".into(), Value::str(as_str(&args[1])));
            }
            Ok(Value::None)
        }),
    );
    class_attrs.insert(
        "render".into(),
        builtin("render", |_, args, kwargs| {
            let Value::Instance(inst) = &args[0] else {
                return Ok(Value::None);
            };
            let source = match inst.lock().unwrap().attrs.get("_source") {
                Some(Value::Str(s)) => (**s).clone(),
                _ => String::new(),
            };
            let mut out = source;
            for (key, value) in &kwargs {
                out = out.replace(&format!("{{{{ {key} }}}}"), &repr_text(value));
                out = out.replace(&format!("{{{{{key}}}}}"), &repr_text(value));
            }
            Ok(Value::str(out))
        }),
    );
    let template_class = new_class("Template", Vec::new(), class_attrs, "jinja2").expect("Template class has no bases to conflict");
    let mut attrs = IndexMap::new();
    attrs.insert("Template".into(), Value::Class(template_class));
    module_value("jinja2", attrs)
}

fn repr_text(v: &Value) -> String {
    match v {
        Value::Str(s) => (**s).clone(),
        other => repr_value(other),
    }
}
