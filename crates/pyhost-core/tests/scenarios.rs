//! End-to-end scenario contracts: literal source in, literal result/output
//! out, exercising the lexer/parser/evaluator pipeline through the public
//! `Runner`/`run_source` seam rather than any internal type.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use pyhost_core::context::Context;
use pyhost_core::error::ErrorKind;
use pyhost_core::filesystem::MemoryFilesystem;
use pyhost_core::runner::{run_source, Runner};
use pyhost_core::value::Value;
use pyhost_core::{Capability, CapabilitySet};

fn ints(v: &Value) -> Vec<i64> {
    match v {
        Value::List(items) => items.lock().unwrap().iter().map(as_i64).collect(),
        other => panic!("expected a list, got {}", other.type_name()),
    }
}

fn as_i64(v: &Value) -> i64 {
    match v {
        Value::Int(n) => n.to_string().parse().expect("fits in i64"),
        other => panic!("expected an int, got {}", other.type_name()),
    }
}

fn ints_as_strs(v: &Value) -> Vec<String> {
    match v {
        Value::List(items) => items.lock().unwrap().iter().map(as_str).collect(),
        other => panic!("expected a list, got {}", other.type_name()),
    }
}

fn as_str(v: &Value) -> String {
    match v {
        Value::Str(s) => (**s).clone(),
        other => panic!("expected a str, got {}", other.type_name()),
    }
}

fn as_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        other => panic!("expected a bool, got {}", other.type_name()),
    }
}

#[test]
fn sorted_list_literal() {
    let result = run_source("sorted([3, 1, 2])", Context::builder().build()).expect("runs");
    assert_eq!(ints(&result), vec![1, 2, 3]);
}

#[test]
fn augmented_assignment_int_and_list() {
    let result = run_source("x = 10\nx += 5\nx", Context::builder().build()).expect("runs");
    assert_eq!(as_i64(&result), 15);

    let result = run_source("x = [1, 2]\nx += [3, 4]\nx", Context::builder().build()).expect("runs");
    assert_eq!(ints(&result), vec![1, 2, 3, 4]);
}

#[test]
fn diamond_inheritance_prefers_c3_order() {
    let source = "
class A:
    def method(self):
        return 'A'
class B(A):
    pass
class C(A):
    def method(self):
        return 'C'
class D(B, C):
    pass
D().method()
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_str(&result), "C");
}

#[test]
fn generator_drains_to_a_list_and_feeds_a_comprehension() {
    let result = run_source("def g():\n    yield 1\n    yield 2\nlist(g())", Context::builder().build()).expect("runs");
    assert_eq!(ints(&result), vec![1, 2]);

    let result = run_source("sum(x * x for x in range(5))", Context::builder().build()).expect("runs");
    assert_eq!(as_i64(&result), 30);
}

#[test]
fn busy_loop_is_aborted_at_its_deadline() {
    let ctx = Context::builder().max_duration(Duration::from_millis(50)).build();
    let err = run_source("while True:\n    x = 1", ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.message.contains("execution exceeded time limit"), "unexpected message: {}", err.message);
}

#[test]
fn network_capability_gates_requests_get_but_not_membership() {
    let ctx = Context::builder().capabilities(CapabilitySet::none()).build();
    let err = run_source("import requests\nrequests.get('http://x')", ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Python);
    assert!(err.message.contains("network access is disabled"), "unexpected message: {}", err.message);

    let ctx = Context::builder().capabilities(CapabilitySet::none()).build();
    let result = run_source("import requests\n'get' in requests", ctx).expect("runs");
    assert!(as_bool(&result));
}

#[test]
fn filesystem_import_runs_module_side_effects_exactly_once() {
    let fs = MemoryFilesystem::new();
    fs.seed("greeter.py", "print('module loaded')");
    let ctx = Context::builder().filesystem(Arc::new(fs)).build();
    let mut runner = Runner::new(ctx);
    runner.run_source("import greeter\nimport greeter").expect("runs");
    let output = runner.context().take_stdout();
    assert_eq!(output.matches("module loaded").count(), 1, "output was: {output:?}");
}

#[test]
fn match_statement_selects_the_first_matching_guarded_case() {
    let source = "x=15\nmatch x:\n  case n if n<10: r='s'\n  case n if n<100: r='m'\n  case _: r='l'\nr";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_str(&result), "m");
}

#[test]
fn name_error_on_first_reference_to_an_unbound_name() {
    let err = run_source("totally_undefined_name", Context::builder().build()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Python);
    assert!(err.message.contains("NameError"));
}

#[test]
fn bool_dunder_wins_over_len_dunder() {
    let source = "
class Empty:
    def __len__(self):
        return 0
    def __bool__(self):
        return True
bool(Empty())
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert!(as_bool(&result));
}

#[test]
fn len_dunder_drives_truthiness_without_a_bool_dunder() {
    let source = "
class Counted:
    def __len__(self):
        return 0
bool(Counted())
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert!(!as_bool(&result));
}

#[test]
fn unrestricted_capabilities_still_stub_the_socket() {
    let ctx = Context::builder().capabilities(CapabilitySet::unrestricted()).build();
    let err = run_source("import requests\nrequests.get('http://example.com')", ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Python);
}

#[test]
fn try_except_else_finally_run_in_the_right_order_on_a_raise() {
    let source = "
class Boom(Exception):
    def __init__(self, msg):
        self.msg = msg

order = []
try:
    order.append('try')
    raise Boom('boom')
except Boom as e:
    order.append('except:' + e.msg)
else:
    order.append('else')
finally:
    order.append('finally')
order
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    let items = ints_as_strs(&result);
    assert_eq!(items, vec!["try", "except:boom", "finally"]);
}

#[test]
fn try_except_else_finally_run_in_the_right_order_without_a_raise() {
    let source = "
order = []
try:
    order.append('try')
except ValueError:
    order.append('except')
else:
    order.append('else')
finally:
    order.append('finally')
order
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    let items = ints_as_strs(&result);
    assert_eq!(items, vec!["try", "else", "finally"]);
}

#[test]
fn with_statement_passes_the_raised_exception_to_exit_and_can_suppress_it() {
    let source = "
class Boom(Exception):
    def __init__(self, msg):
        self.msg = msg

log = []
class Suppressor:
    def __enter__(self):
        return self
    def __exit__(self, exc_type, exc, tb):
        log.append(exc_type is not None)
        log.append(exc.msg)
        return True
with Suppressor():
    raise Boom('boom')
log.append('reached')
log
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    let items = match &result {
        Value::List(items) => items.lock().unwrap().clone(),
        other => panic!("expected a list, got {}", other.type_name()),
    };
    assert_eq!(items.len(), 3);
    assert!(as_bool(&items[0]));
    assert_eq!(as_str(&items[1]), "boom");
    assert_eq!(as_str(&items[2]), "reached");
}

#[test]
fn with_statement_passes_none_to_exit_when_the_body_does_not_raise() {
    let source = "
seen = []
class Logger:
    def __enter__(self):
        return self
    def __exit__(self, exc_type, exc, tb):
        seen.append(exc_type)
        return False
with Logger():
    pass
seen[0]
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert!(matches!(result, Value::None));
}

#[test]
fn decorator_wraps_the_function_it_decorates() {
    let source = "
def twice(f):
    def wrapper(*args):
        return f(*args) + f(*args)
    return wrapper

@twice
def shout(word):
    return word.upper()

shout('hi')
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_str(&result), "HIHI");
}

#[test]
fn nonlocal_closure_mutates_the_enclosing_counter() {
    let source = "
def make_counter():
    count = 0
    def increment():
        nonlocal count
        count += 1
        return count
    return increment

counter = make_counter()
counter()
counter()
counter()
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_i64(&result), 3);
}

#[test]
fn fstring_interpolates_expressions_and_format_specs() {
    let source = "
name = 'world'
pi = 3.14159
f'hello {name}, pi is {pi:.2f} and {1 + 1} is two'
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_str(&result), "hello world, pi is 3.14 and 2 is two");
}

#[test]
fn reflected_operator_is_tried_when_the_left_operand_has_no_dunder() {
    let source = "
class Vector:
    def __init__(self, x):
        self.x = x
    def __radd__(self, other):
        return Vector(self.x + other)
(3 + Vector(4)).x
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_i64(&result), 7);
}

#[test]
fn not_implemented_forward_dunder_falls_through_to_reflected() {
    let source = "
class Meters:
    def __init__(self, n):
        self.n = n
    def __add__(self, other):
        return NotImplemented
    def __radd__(self, other):
        return Meters(self.n + other)
(Meters(5) + 2).n
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(as_i64(&result), 7);
}

#[test]
fn for_loop_breaks_a_generator_before_it_runs_to_completion() {
    let source = "
seen = []
def counting_up():
    n = 0
    while True:
        seen.append(n)
        yield n
        n += 1

for x in counting_up():
    if x == 2:
        break
seen
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    assert_eq!(ints(&result), vec![0, 1, 2]);
}

#[test]
fn for_loop_over_a_generator_interleaves_output_in_program_order() {
    let source = "
def g():
    print('a')
    yield 1
    print('b')
    yield 2
    print('c')

for x in g():
    print('got', x)
";
    let ctx = Context::builder().build();
    let mut runner = Runner::new(ctx);
    runner.run_source(source).expect("runs");
    let output = runner.context().take_stdout();
    assert_eq!(output, "a\ngot 1\nb\ngot 2\nc\n");
}

#[test]
fn yield_from_forwards_values_and_returns_the_delegates_stop_value() {
    let source = "
def inner():
    yield 1
    yield 2
    return 'done'

def outer():
    result = yield from inner()
    yield result

list(outer())
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    let items = match &result {
        Value::List(items) => items.lock().unwrap().clone(),
        other => panic!("expected a list, got {}", other.type_name()),
    };
    assert_eq!(as_i64(&items[0]), 1);
    assert_eq!(as_i64(&items[1]), 2);
    assert_eq!(as_str(&items[2]), "done");
}

#[test]
fn import_star_binds_every_public_module_attribute() {
    let fs = MemoryFilesystem::new();
    fs.seed("shapes.py", "def area(n):\n    return n * n\n_private = 'hidden'\nPI = 3\n");
    let ctx = Context::builder().filesystem(Arc::new(fs)).build();
    let result = run_source("from shapes import *\narea(4)", ctx).expect("runs");
    assert_eq!(as_i64(&result), 16);

    let ctx = Context::builder().filesystem(Arc::new(MemoryFilesystem::with_files([("shapes.py".to_string(), "_private = 'hidden'\n".to_string())]))).build();
    let err = run_source("from shapes import *\n_private", ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Python);
    assert!(err.message.contains("NameError"));
}

#[test]
fn match_case_does_not_leak_bindings_from_a_failed_guard_or_pattern() {
    let source = "
results = []
for value in [1, [1, 2], 'other']:
    match value:
        case int() as n if n > 10:
            results.append(('big', n))
        case [a, b]:
            results.append(('pair', a, b))
        case _:
            try:
                n
                results.append('n leaked')
            except NameError:
                results.append('clean')
results
";
    let result = run_source(source, Context::builder().build()).expect("runs");
    let items = match &result {
        Value::List(items) => items.lock().unwrap().clone(),
        other => panic!("expected a list, got {}", other.type_name()),
    };
    assert_eq!(items.len(), 3);
    assert_eq!(as_str(&items[2]), "clean");
}

#[test]
fn open_reads_and_writes_through_the_configured_filesystem() {
    let fs = Arc::new(MemoryFilesystem::new());
    fs.seed("greeting.txt", "hello\nworld\n");
    let ctx = Context::builder().filesystem(fs.clone()).capabilities(CapabilitySet::unrestricted()).build();
    let source = "
lines = []
with open('greeting.txt', 'r') as f:
    for line in f:
        lines.append(line.strip())
with open('out.txt', 'w') as f:
    f.write('written')
lines
";
    let result = run_source(source, ctx).expect("runs");
    let items = match &result {
        Value::List(items) => items.lock().unwrap().clone(),
        other => panic!("expected a list, got {}", other.type_name()),
    };
    assert_eq!(as_str(&items[0]), "hello");
    assert_eq!(as_str(&items[1]), "world");
    assert_eq!(fs.read("out.txt").as_deref(), Some("written"));
}

#[test]
fn open_for_write_is_denied_without_the_filewrite_capability() {
    let ctx = Context::builder().capabilities(CapabilitySet::new(vec![Capability::FileRead])).build();
    let err = run_source("open('new.txt', 'w')", ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Python);
    assert!(err.message.contains("PermissionError"), "unexpected message: {}", err.message);
}

#[test]
fn open_missing_file_for_read_raises_file_not_found() {
    let ctx = Context::builder().capabilities(CapabilitySet::unrestricted()).build();
    let err = run_source("open('missing.txt')", ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Python);
    assert!(err.message.contains("FileNotFoundError"), "unexpected message: {}", err.message);
}

