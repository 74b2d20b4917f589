//! An embeddable, capability-sandboxed Python interpreter.
//!
//! The pipeline is the textbook one: [`lexer`] turns source text into tokens,
//! [`parser`] turns tokens into an AST (`parser::ast`), and [`evaluator`]
//! walks the AST against a [`context::Context`] built once per run by the
//! embedding host. [`runner`] is the thin public seam that ties those three
//! stages together and is the entry point most embedders want; the stage
//! modules are public for hosts that need to stop short (e.g. parse-only
//! linting) or drive execution by hand.

pub mod builtins;
pub mod capability;
pub mod context;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod filesystem;
pub mod lexer;
pub mod modules;
pub mod object;
pub mod parser;
pub mod runner;
pub mod value;

pub use capability::{Capability, CapabilitySet};
pub use context::{Context, ContextBuilder};
pub use error::{ErrorKind, ExcType, Exception, HostError};
pub use filesystem::{Filesystem, MemoryFilesystem, NativeFilesystem};
pub use runner::{run, run_source, Runner};
pub use value::Value;
