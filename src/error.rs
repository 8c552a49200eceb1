//! Error taxonomy, error codes, and captured panics.
//!
//! Operations carry failures as first-class values: an [`ErrorCode`] for
//! expected, enumerable failures and a [`Captured`] panic payload for
//! everything that unwound. Accessors surface whichever one is stored as an
//! [`OpError`]; nothing in this crate unwinds on its own.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Errors raised by the operation machinery itself, plus the two propagated
/// failure forms surfaced by result accessors.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum OpError {
    /// Write after write, read before write, read of the wrong variant, or a
    /// fetch of a result that has been destructively moved out.
    #[error("invalid result access: {0}")]
    InvalidResult(&'static str),

    /// A bad-result setter was handed a payload that cannot denote failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A dependency notification or removal named an operation the receiver
    /// does not depend on.
    #[error("bad dependency: {0}")]
    BadDependency(&'static str),

    /// The stored result is an error code.
    #[error("operation failed: {0}")]
    Failed(ErrorCode),

    /// The stored result is a captured panic.
    #[error("operation panicked: {0}")]
    Panicked(Captured),
}

impl OpError {
    /// True when this error wraps a [`BrokenPromise`] payload delivered by a
    /// promise that was dropped while still needed.
    pub fn is_broken_promise(&self) -> bool {
        matches!(self, OpError::Panicked(c) if c.is::<BrokenPromise>())
    }
}

/// A failure an operation can carry and propagate to its dependents: either
/// an expected error code or a captured panic. Cloning is cheap for both
/// arms.
#[derive(Debug, Clone)]
pub enum Failure {
    Code(ErrorCode),
    Panic(Captured),
}

impl From<Failure> for OpError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Code(code) => OpError::Failed(code),
            Failure::Panic(captured) => OpError::Panicked(captured),
        }
    }
}

/// Category metadata for [`ErrorCode`] values.
///
/// Categories are expected to be `'static` constants; two codes compare
/// equal only when they come from the same category instance.
pub struct ErrorCategory {
    /// Short category name, e.g. `"io"`.
    pub name: &'static str,
    /// Render a code from this category as a human-readable message.
    pub message: fn(i32) -> &'static str,
}

impl fmt::Debug for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCategory")
            .field("name", &self.name)
            .finish()
    }
}

fn no_error_message(_code: i32) -> &'static str {
    "no error"
}

static NONE_CATEGORY: ErrorCategory = ErrorCategory {
    name: "none",
    message: no_error_message,
};

/// A small copyable error code with category metadata, in the mold of
/// platform error-code types: code `0` means "no error" and is rejected by
/// every bad-result setter.
#[derive(Clone, Copy)]
pub struct ErrorCode {
    code: i32,
    category: &'static ErrorCategory,
}

impl ErrorCode {
    /// The distinguished "no error" value.
    pub const NONE: ErrorCode = ErrorCode {
        code: 0,
        category: &NONE_CATEGORY,
    };

    pub fn new(code: i32, category: &'static ErrorCategory) -> Self {
        Self { code, category }
    }

    /// The numeric code. `0` means no error regardless of category.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn category(&self) -> &'static ErrorCategory {
        self.category
    }

    /// True for the zero value.
    pub fn is_none(&self) -> bool {
        self.code == 0
    }

    pub fn message(&self) -> &'static str {
        (self.category.message)(self.code)
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && std::ptr::eq(self.category, other.category)
    }
}

impl Eq for ErrorCode {}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCode({}:{})", self.category.name, self.code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category.name, self.message())
    }
}

/// An opaque, cheaply clonable handle to a panic payload or a user-supplied
/// failure value. The crate-level stand-in for a captured exception.
///
/// A `Captured` always holds a payload; there is no empty state.
#[derive(Clone)]
pub struct Captured {
    payload: Arc<dyn Any + Send + Sync>,
    summary: Arc<str>,
}

impl Captured {
    /// Capture an arbitrary failure value.
    pub fn new<P>(payload: P) -> Self
    where
        P: Any + Send + Sync + fmt::Debug,
    {
        let summary = format!("{payload:?}").into();
        Self {
            payload: Arc::new(payload),
            summary,
        }
    }

    /// Normalize the payload of `std::panic::catch_unwind`.
    ///
    /// String-ish payloads (the overwhelmingly common case) are preserved
    /// for downcasting; anything else is reduced to an [`OpaquePanic`]
    /// marker, since a `Box<dyn Any + Send>` cannot be re-shared without
    /// knowing its concrete type.
    pub fn from_unwind(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<String>() {
            Ok(message) => {
                let summary = Arc::from(message.as_str());
                Self {
                    payload: Arc::new(*message),
                    summary,
                }
            }
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => Self {
                    payload: Arc::new(*message),
                    summary: Arc::from(*message),
                },
                Err(_) => Self {
                    payload: Arc::new(OpaquePanic),
                    summary: Arc::from("opaque panic payload"),
                },
            },
        }
    }

    /// Borrow the payload as a concrete type, if it is one.
    pub fn downcast_ref<P: Any>(&self) -> Option<&P> {
        self.payload.downcast_ref()
    }

    /// True when the payload is of type `P`.
    pub fn is<P: Any>(&self) -> bool {
        (*self.payload).is::<P>()
    }

    /// A human-readable rendering of the payload, fixed at capture time.
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Captured({})", self.summary)
    }
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

/// Placeholder payload for panics whose concrete type could not be shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaquePanic;

/// The payload delivered to a remote operation when its promise is dropped
/// while still needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenPromise;

impl fmt::Display for BrokenPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("promise dropped before fulfillment")
    }
}
