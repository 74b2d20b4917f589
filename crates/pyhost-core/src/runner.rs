//! Public execution entry point (`spec.md` §4.5 "Runner").
//!
//! Wraps lex -> parse -> evaluate into a single call, normalizing every
//! failure mode the two-plane model in `error.rs` can produce — syntax
//! errors, uncaught Python exceptions, and host aborts (timeouts, internal
//! invariant violations) — into the one `HostError` an embedder has to
//! handle.

use crate::context::Context;
use crate::error::{HostError, RunSignal};
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::{self, ast::Stmt};
use crate::value::Value;

/// Holds a live [`Evaluator`] (and the [`Context`] it was built from) so a
/// host running several scripts against the same capabilities/filesystem
/// doesn't pay `Evaluator::new`'s builtin-install cost more than once.
pub struct Runner {
    evaluator: Evaluator,
}

impl Runner {
    pub fn new(ctx: Context) -> Self {
        Runner { evaluator: Evaluator::new(ctx) }
    }

    pub fn context(&self) -> &Context {
        self.evaluator.context()
    }

    /// Lexes, parses, and executes `source` as a top-level module.
    pub fn run_source(&mut self, source: &str) -> Result<Value, HostError> {
        let stmts = parse_source(source)?;
        self.run(&stmts)
    }

    /// Executes an already-parsed module, for hosts that parse once and run
    /// repeatedly (or want parse errors reported before any side effect).
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<Value, HostError> {
        self.evaluator.run_module(stmts).map_err(signal_to_host_error)
    }
}

fn parse_source(source: &str) -> Result<Vec<Stmt>, HostError> {
    let tokens = Lexer::new(source).tokenize()?;
    parser::parse(tokens)
}

fn signal_to_host_error(signal: RunSignal) -> HostError {
    match signal {
        RunSignal::Exc(exc) => HostError::from_uncaught(&exc),
        RunSignal::Abort(err) => err,
    }
}

/// Parses and runs `source` fresh against `ctx` in one call.
pub fn run_source(source: &str, ctx: Context) -> Result<Value, HostError> {
    Runner::new(ctx).run_source(source)
}

/// Runs an already-parsed module against `ctx` in one call.
pub fn run(stmts: &[Stmt], ctx: Context) -> Result<Value, HostError> {
    Runner::new(ctx).run(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_trivial_module_and_captures_stdout() {
        let ctx = Context::builder().build();
        let mut runner = Runner::new(ctx);
        runner.run_source("x = 1 + 2\nprint(x)").expect("run succeeds");
        assert_eq!(runner.context().take_stdout(), "3\n");
    }

    #[test]
    fn surfaces_a_syntax_error_as_a_host_error() {
        let ctx = Context::builder().build();
        let err = run_source("def (", ctx).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
    }

    #[test]
    fn surfaces_an_uncaught_exception_as_a_host_error() {
        let ctx = Context::builder().build();
        let err = run_source("raise ValueError('boom')", ctx).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Python);
        assert!(err.message.contains("boom"));
    }
}
