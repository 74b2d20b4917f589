//! Attribute/dunder surface for `Value::File` handles returned by `open()`
//! (`spec.md` §4.6). Mirrors the bound-method synthesis `get_attr_value` does
//! for `Value::SuperProxy` in `evaluator::mod`: each method name resolves to
//! a `Value::Builtin` closure capturing the handle.

use crate::error::{EvalResult, Exception, ExcType, RunSignal};
use crate::filesystem::FileRef;
use crate::value::Value;

use super::Evaluator;

fn closed_error() -> RunSignal {
    RunSignal::value_error("I/O operation on closed file")
}

pub(super) fn take_line(unread: &mut String) -> Option<String> {
    if unread.is_empty() {
        return None;
    }
    match unread.find('\n') {
        Some(idx) => {
            let rest = unread.split_off(idx + 1);
            Some(std::mem::replace(unread, rest))
        }
        None => Some(std::mem::take(unread)),
    }
}

fn flush(evaluator: &mut Evaluator, handle: &FileRef) -> EvalResult<()> {
    let (path, contents) = {
        let h = handle.lock().unwrap();
        (h.path.clone(), h.write_buf.clone())
    };
    evaluator
        .context()
        .excluding_compute_time(|| evaluator.context().filesystem().write(&path, &contents))
        .map_err(|e| RunSignal::Exc(Exception::new(ExcType::OSError, e.to_string())))
}

fn close(evaluator: &mut Evaluator, handle: &FileRef) -> EvalResult<()> {
    let writable = { handle.lock().unwrap().writable };
    if writable {
        flush(evaluator, handle)?;
    }
    handle.lock().unwrap().closed = true;
    Ok(())
}

/// Resolves `name` against `handle`, returning `None` for anything this
/// handle doesn't support so callers can fall back to an `AttributeError`.
pub(super) fn file_attr(file_value: &Value, handle: &FileRef, name: &str) -> Option<Value> {
    use crate::modules::builtin;
    let h = handle.clone();
    let fv = file_value.clone();
    match name {
        "read" => Some(builtin("read", move |_, _, _| {
            let mut h = h.lock().unwrap();
            if h.closed {
                return Err(closed_error());
            }
            if !h.readable {
                return Err(RunSignal::value_error("File not open for reading"));
            }
            Ok(Value::str(std::mem::take(&mut h.unread)))
        })),
        "readline" => Some(builtin("readline", move |_, _, _| {
            let mut h = h.lock().unwrap();
            if h.closed {
                return Err(closed_error());
            }
            if !h.readable {
                return Err(RunSignal::value_error("File not open for reading"));
            }
            Ok(Value::str(take_line(&mut h.unread).unwrap_or_default()))
        })),
        "readlines" => Some(builtin("readlines", move |_, _, _| {
            let mut h = h.lock().unwrap();
            if h.closed {
                return Err(closed_error());
            }
            if !h.readable {
                return Err(RunSignal::value_error("File not open for reading"));
            }
            let mut lines = Vec::new();
            while let Some(line) = take_line(&mut h.unread) {
                lines.push(Value::str(line));
            }
            Ok(Value::list(lines))
        })),
        "write" => Some(builtin("write", move |_, args, _| {
            let mut h = h.lock().unwrap();
            if h.closed {
                return Err(closed_error());
            }
            if !h.writable {
                return Err(RunSignal::value_error("File not open for writing"));
            }
            let text = crate::modules::as_str(args.first().unwrap_or(&Value::None));
            let len = text.chars().count();
            h.write_buf.push_str(&text);
            Ok(Value::int(len as i64))
        })),
        "writelines" => Some(builtin("writelines", move |evaluator, args, _| {
            let lines = evaluator.iterate_to_vec(args.first().unwrap_or(&Value::None))?;
            let mut h = h.lock().unwrap();
            if h.closed {
                return Err(closed_error());
            }
            if !h.writable {
                return Err(RunSignal::value_error("File not open for writing"));
            }
            for line in lines {
                h.write_buf.push_str(&crate::modules::as_str(&line));
            }
            Ok(Value::None)
        })),
        "close" => Some(builtin("close", move |evaluator, _, _| {
            if h.lock().unwrap().closed {
                return Ok(Value::None);
            }
            close(evaluator, &h)?;
            Ok(Value::None)
        })),
        "__enter__" => Some(builtin("__enter__", move |_, _, _| Ok(fv.clone()))),
        "__exit__" => Some(builtin("__exit__", move |evaluator, _, _| {
            if !h.lock().unwrap().closed {
                close(evaluator, &h)?;
            }
            Ok(Value::Bool(false))
        })),
        "__iter__" => Some(builtin("__iter__", move |_, _, _| Ok(fv.clone()))),
        "__next__" => Some(builtin("__next__", move |_, _, _| {
            let mut h = h.lock().unwrap();
            if h.closed {
                return Err(closed_error());
            }
            match take_line(&mut h.unread) {
                Some(line) => Ok(Value::str(line)),
                None => Err(RunSignal::stop_iteration("")),
            }
        })),
        _ => None,
    }
}
