//! Error taxonomy.
//!
//! Two planes, per `spec.md` §7: `RunSignal::Raise` carries a Python-level
//! `Exception` instances can catch with `try/except`; `RunSignal::Abort`
//! carries a `HostError` that unwinds past every handler (grounded in the
//! teacher's `RunError::Exc` / `RunError::UncatchableExc` split).

use std::fmt;

use crate::value::Value;

pub type EvalResult<T> = Result<T, RunSignal>;

/// The closed set of Python exception classes the evaluator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcType {
    BaseException,
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    LookupError,
    IndexError,
    KeyError,
    RuntimeError,
    RecursionError,
    NotImplementedError,
    StopIteration,
    AttributeError,
    NameError,
    UnboundLocalError,
    ValueError,
    TypeError,
    ImportError,
    ModuleNotFoundError,
    OSError,
    FileNotFoundError,
    IsADirectoryError,
    PermissionError,
    NetworkError,
    TimeoutError,
    SyntaxError,
    AssertionError,
    KeyboardInterrupt,
    /// Not a real Python class; used internally to model user-defined
    /// exception classes whose identity lives in `Value::Class`.
    UserDefined,
}

impl ExcType {
    /// Implements the ancestor relationships `except` matching needs.
    pub fn is_subclass_of(self, other: Self) -> bool {
        use ExcType::*;
        if self == other {
            return true;
        }
        match other {
            BaseException => !matches!(self, UserDefined),
            Exception => !matches!(self, BaseException | KeyboardInterrupt | TimeoutError | UserDefined),
            ArithmeticError => matches!(self, ZeroDivisionError),
            LookupError => matches!(self, IndexError | KeyError),
            RuntimeError => matches!(self, RecursionError | NotImplementedError),
            OSError => matches!(self, FileNotFoundError | IsADirectoryError | PermissionError),
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        use ExcType::*;
        match self {
            BaseException => "BaseException",
            Exception => "Exception",
            ArithmeticError => "ArithmeticError",
            ZeroDivisionError => "ZeroDivisionError",
            LookupError => "LookupError",
            IndexError => "IndexError",
            KeyError => "KeyError",
            RuntimeError => "RuntimeError",
            RecursionError => "RecursionError",
            NotImplementedError => "NotImplementedError",
            StopIteration => "StopIteration",
            AttributeError => "AttributeError",
            NameError => "NameError",
            UnboundLocalError => "UnboundLocalError",
            ValueError => "ValueError",
            TypeError => "TypeError",
            ImportError => "ImportError",
            ModuleNotFoundError => "ModuleNotFoundError",
            OSError => "OSError",
            FileNotFoundError => "FileNotFoundError",
            IsADirectoryError => "IsADirectoryError",
            PermissionError => "PermissionError",
            NetworkError => "NetworkError",
            TimeoutError => "TimeoutError",
            SyntaxError => "SyntaxError",
            AssertionError => "AssertionError",
            KeyboardInterrupt => "KeyboardInterrupt",
            UserDefined => "Exception",
        }
    }
}

/// A raised Python-level exception: either one of the built-in `ExcType`s or
/// an instance of a user-defined class deriving from `BaseException`.
#[derive(Debug, Clone)]
pub struct Exception {
    pub exc_type: ExcType,
    pub message: String,
    /// Present when the exception is an instance of a user-defined class;
    /// `isinstance`/`except` matching then walks the class's MRO instead of
    /// `ExcType::is_subclass_of`.
    pub instance: Option<Value>,
}

impl Exception {
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Exception { exc_type, message: message.into(), instance: None }
    }

    pub fn type_name(&self) -> String {
        if let Some(Value::Instance(inst)) = &self.instance {
            inst.lock().unwrap().class.lock().unwrap().name.clone()
        } else {
            self.exc_type.name().to_string()
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name(), self.message)
    }
}

/// Host-level, never-catchable condition, per `spec.md` §7 plane 2.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct HostError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Python,
    Timeout,
    Import,
    Io,
    RouteNotFound,
    Internal,
}

impl HostError {
    pub fn syntax(message: impl Into<String>, span: SourceSpan) -> Self {
        HostError { kind: ErrorKind::Syntax, message: message.into(), line: Some(span.line), column: Some(span.col) }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HostError { kind: ErrorKind::Internal, message: message.into(), line: None, column: None }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        HostError { kind: ErrorKind::Timeout, message: message.into(), line: None, column: None }
    }

    pub fn from_uncaught(exc: &Exception) -> Self {
        HostError { kind: ErrorKind::Python, message: format!("{exc}"), line: None, column: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub line: u32,
    pub col: u32,
}

impl SourceSpan {
    pub fn new(line: u32, col: u32) -> Self {
        SourceSpan { line, col }
    }
}

/// Every control transfer the evaluator can produce: a Python-level raise
/// (`Exc`), or an uncatchable host abort (`Abort`) — timeouts and internal
/// invariant violations. `spec.md` §9 calls for signals rather than host
/// exceptions to represent control transfer, so `Return`/`Break`/`Continue`
/// travel as `Signal` (see `evaluator::mod`), not through this type; this
/// type is strictly the error channel.
#[derive(Debug, Clone)]
pub enum RunSignal {
    Exc(Exception),
    Abort(HostError),
}

impl RunSignal {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::TypeError, msg))
    }
    pub fn value_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::ValueError, msg))
    }
    pub fn name_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::NameError, msg))
    }
    pub fn attribute_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::AttributeError, msg))
    }
    pub fn key_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::KeyError, msg))
    }
    pub fn index_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::IndexError, msg))
    }
    pub fn zero_division(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::ZeroDivisionError, msg))
    }
    pub fn import_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::ImportError, msg))
    }
    pub fn permission_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::PermissionError, msg))
    }
    pub fn network_error(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::NetworkError, msg))
    }
    pub fn stop_iteration(msg: impl Into<String>) -> Self {
        RunSignal::Exc(Exception::new(ExcType::StopIteration, msg))
    }
    pub fn timeout() -> Self {
        RunSignal::Abort(HostError::timeout("execution exceeded time limit"))
    }
}

impl From<HostError> for RunSignal {
    fn from(e: HostError) -> Self {
        RunSignal::Abort(e)
    }
}
