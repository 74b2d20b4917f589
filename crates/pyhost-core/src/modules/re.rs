use indexmap::IndexMap;

use crate::error::RunSignal;
use crate::value::Value;

use super::{as_str, builtin, module_value};

fn compile(pattern: &str) -> Result<regex::Regex, RunSignal> {
    regex::Regex::new(pattern).map_err(|e| RunSignal::value_error(format!("invalid regular expression: {e}")))
}

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert(
        "match".into(),
        builtin("match", |_, args, _| {
            let re = compile(&as_str(&args[0]))?;
            let text = as_str(&args[1]);
            Ok(match re.find(&text) {
                Some(m) if m.start() == 0 => Value::str(m.as_str()),
                _ => Value::None,
            })
        }),
    );
    attrs.insert(
        "search".into(),
        builtin("search", |_, args, _| {
            let re = compile(&as_str(&args[0]))?;
            let text = as_str(&args[1]);
            Ok(match re.find(&text) {
                Some(m) => Value::str(m.as_str()),
                None => Value::None,
            })
        }),
    );
    attrs.insert(
        "findall".into(),
        builtin("findall", |_, args, _| {
            let re = compile(&as_str(&args[0]))?;
            let text = as_str(&args[1]);
            let items = re.find_iter(&text).map(|m| Value::str(m.as_str())).collect();
            Ok(Value::list(items))
        }),
    );
    attrs.insert(
        "sub".into(),
        builtin("sub", |_, args, _| {
            let re = compile(&as_str(&args[0]))?;
            let repl = as_str(&args[1]);
            let text = as_str(&args[2]);
            Ok(Value::str(re.replace_all(&text, repl.as_str()).into_owned()))
        }),
    );
    module_value("re", attrs)
}
