use indexmap::IndexMap;

use crate::capability::Capability;
use crate::error::RunSignal;
use crate::value::Value;

use super::{as_str, builtin, module_value};

fn host_of(url: &str) -> String {
    url.trim_start_matches("https://").trim_start_matches("http://").split('/').next().unwrap_or("").to_string()
}

fn guarded_call(evaluator: &mut crate::evaluator::Evaluator, url: &str) -> crate::error::EvalResult<Value> {
    if !evaluator.context().capabilities().allows(&Capability::Network) {
        tracing::warn!(url, "capability denied");
        return Err(RunSignal::permission_error("network access is disabled for this run"));
    }
    let host = host_of(url);
    if !evaluator.context().capabilities().allows_network_host(&host) {
        return Err(RunSignal::network_error(format!("host '{host}' is not in the allowed network hosts")));
    }
    // No real socket is ever opened: a sandboxed run has no network stack.
    // A granted-and-allowed call still cannot reach the internet from here,
    // matching `spec.md` §4.7's "contracts they expose to the evaluator".
    Err(RunSignal::network_error("network access is not available in this run"))
}

pub fn build() -> Value {
    let mut attrs = IndexMap::new();
    attrs.insert("get".into(), builtin("get", |evaluator, args, _| guarded_call(evaluator, &as_str(&args[0]))));
    attrs.insert("post".into(), builtin("post", |evaluator, args, _| guarded_call(evaluator, &as_str(&args[0]))));
    module_value("requests", attrs)
}
