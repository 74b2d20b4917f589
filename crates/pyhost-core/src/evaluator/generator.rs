//! Generators implemented as cooperatively-scheduled OS threads.
//!
//! A generator body runs on its own thread, synchronized with the driving
//! evaluator through a pair of rendezvous (`sync_channel(0)`) channels: the
//! driver blocks on `event_rx` until the body yields, returns, or raises; the
//! body blocks on `resume_rx` after every `yield` until the driver calls
//! `next` again. Exactly one side runs at a time, which is what lets every
//! `Value` be plain `Arc<Mutex<_>>` data without a real concurrent-access
//! story — the mutexes exist only so the type is `Send` across this thread
//! boundary, matching the interior-mutability note in `value.rs`.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::environment::Env;
use crate::error::{EvalResult, Exception, ExcType, RunSignal};
use crate::parser::ast::Stmt;
use crate::value::{ParamSpec, Value};

use super::Evaluator;

enum GenEvent {
    Yield(Value),
    Return(Value),
    Raised(RunSignal),
}

/// Per-thread channel endpoints visible to the evaluator instance running
/// inside the generator body, so `Expr::Yield` can find them without
/// threading an extra parameter through every `eval_expr` call.
pub struct GeneratorIo {
    event_tx: SyncSender<GenEvent>,
    resume_rx: Receiver<Value>,
}

impl GeneratorIo {
    pub fn yield_value(&self, value: Value) -> Value {
        let _ = self.event_tx.send(GenEvent::Yield(value));
        self.resume_rx.recv().unwrap_or(Value::None)
    }
}

struct Inner {
    resume_tx: SyncSender<Value>,
    event_rx: Receiver<GenEvent>,
    started: bool,
    finished: bool,
    thread: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct GeneratorHandle(Arc<Mutex<Inner>>);

impl GeneratorHandle {
    /// Spawns the (initially parked) generator thread. The body does not
    /// start executing until the first `next()` call.
    pub fn new(evaluator: &Evaluator, env: Env, params: ParamSpec, args: Vec<Value>, kwargs: Vec<(String, Value)>, body: Arc<Vec<Stmt>>) -> Self {
        let (resume_tx, resume_rx) = sync_channel::<Value>(0);
        let (event_tx, event_rx) = sync_channel::<GenEvent>(0);
        let base = evaluator.fork_for_thread();
        let thread = std::thread::Builder::new()
            .name("pyhost-generator".into())
            .spawn(move || {
                let mut gen_eval = base;
                gen_eval.gen_io = Some(GeneratorIo { event_tx: event_tx.clone(), resume_rx });
                let call_env = env.child_call();
                let bind_result = super::bind_params(&mut gen_eval, &call_env, &params, args, kwargs);
                let outcome = match bind_result {
                    Ok(()) => gen_eval.exec_block(&call_env, &body),
                    Err(e) => Err(e),
                };
                let event = match outcome {
                    Ok(super::Signal::Return(v)) => GenEvent::Return(v),
                    Ok(_) => GenEvent::Return(Value::None),
                    Err(e) => GenEvent::Raised(e),
                };
                let _ = event_tx.send(event);
            })
            .expect("spawning a generator thread");
        GeneratorHandle(Arc::new(Mutex::new(Inner { resume_tx, event_rx, started: false, finished: false, thread: Some(thread) })))
    }

    /// Advances the generator, sending `sent` as the result of the `yield`
    /// expression it is currently parked on (ignored for the very first call,
    /// matching CPython's `next(g)` semantics for a fresh generator).
    pub fn next(&self, sent: Value) -> EvalResult<Value> {
        let mut inner = self.0.lock().unwrap();
        if inner.finished {
            return Err(RunSignal::stop_iteration("generator already executing or finished"));
        }
        if inner.started {
            if inner.resume_tx.send(sent).is_err() {
                inner.finished = true;
                return Err(RunSignal::stop_iteration(""));
            }
        } else {
            inner.started = true;
        }
        match inner.event_rx.recv() {
            Ok(GenEvent::Yield(v)) => Ok(v),
            Ok(GenEvent::Return(v)) => {
                inner.finished = true;
                if let Some(t) = inner.thread.take() {
                    let _ = t.join();
                }
                if matches!(v, Value::None) {
                    Err(RunSignal::stop_iteration(""))
                } else {
                    Err(RunSignal::Exc(Exception { exc_type: ExcType::StopIteration, message: String::new(), instance: Some(v) }))
                }
            }
            Ok(GenEvent::Raised(e)) => {
                inner.finished = true;
                if let Some(t) = inner.thread.take() {
                    let _ = t.join();
                }
                Err(e)
            }
            Err(_) => {
                inner.finished = true;
                Err(RunSignal::stop_iteration(""))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.0.lock().unwrap().finished
    }
}
