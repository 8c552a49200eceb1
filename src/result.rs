//! The four-state result variant owned by every typed operation.
//!
//! An [`OpResult`] starts [`OpResult::Unset`] and admits exactly one
//! transition out of that state: to a value, an error code, or a captured
//! panic. Once set it can only be read, cloned out, or destructively moved
//! out — a destructive move returns it to `Unset`. Every operation is
//! non-panicking and reports misuse as [`OpError`].

use crate::error::{Captured, ErrorCode, Failure, OpError};

/// The result of an operation: nothing yet, a value, an error code, or a
/// captured panic.
///
/// `T = ()` is the "void" case: `Value(())` records success-with-no-value
/// and is distinct from `Unset`.
#[derive(Debug, Clone)]
pub enum OpResult<T> {
    /// No result has been produced yet.
    Unset,
    /// The operation completed with a value.
    Value(T),
    /// The operation failed with an expected error code.
    Error(ErrorCode),
    /// The operation panicked; the payload was captured.
    Panicked(Captured),
}

// Hand-written so `Unset` is the default for every `T`, not only those
// with defaults of their own.
impl<T> Default for OpResult<T> {
    fn default() -> Self {
        OpResult::Unset
    }
}

impl<T> OpResult<T> {
    /// A result already holding `value`.
    pub fn of(value: T) -> Self {
        OpResult::Value(value)
    }

    /// Does this hold anything other than `Unset`?
    pub fn is_set(&self) -> bool {
        !matches!(self, OpResult::Unset)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, OpResult::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OpResult::Error(_))
    }

    pub fn is_panicked(&self) -> bool {
        matches!(self, OpResult::Panicked(_))
    }

    /// The failure stored here, if the result is one of the two bad arms.
    pub fn failure(&self) -> Option<Failure> {
        match self {
            OpResult::Error(code) => Some(Failure::Code(*code)),
            OpResult::Panicked(captured) => Some(Failure::Panic(captured.clone())),
            _ => None,
        }
    }

    /// Record a success value. Fails with `InvalidResult` if anything has
    /// already been stored.
    pub fn set_value(&mut self, value: T) -> Result<(), OpError> {
        self.check_unset()?;
        *self = OpResult::Value(value);
        Ok(())
    }

    /// Record an error code. The zero code is rejected with
    /// `InvalidArgument` before the current state is consulted.
    pub fn set_error(&mut self, code: ErrorCode) -> Result<(), OpError> {
        if code.is_none() {
            return Err(OpError::InvalidArgument(
                "cannot store a no-error error code",
            ));
        }
        self.check_unset()?;
        *self = OpResult::Error(code);
        Ok(())
    }

    /// Record a captured panic.
    pub fn set_panicked(&mut self, captured: Captured) -> Result<(), OpError> {
        self.check_unset()?;
        *self = OpResult::Panicked(captured);
        Ok(())
    }

    /// Record either arm of a [`Failure`].
    pub fn set_failure(&mut self, failure: Failure) -> Result<(), OpError> {
        match failure {
            Failure::Code(code) => self.set_error(code),
            Failure::Panic(captured) => self.set_panicked(captured),
        }
    }

    /// Whole-variant assignment from another result. An `Unset` source is a
    /// no-op; a set destination fails with `InvalidResult`.
    pub fn assign_from(&mut self, other: OpResult<T>) -> Result<(), OpError> {
        match other {
            OpResult::Unset => Ok(()),
            OpResult::Value(value) => self.set_value(value),
            OpResult::Error(code) => self.set_error(code),
            OpResult::Panicked(captured) => self.set_panicked(captured),
        }
    }

    /// Fetch the result destructively. The state is `Unset` afterwards even
    /// when the outcome is a failure: error codes and captured panics are
    /// moved out with the same finality as values.
    pub fn take(&mut self) -> Result<T, OpError> {
        match std::mem::take(self) {
            OpResult::Unset => Err(OpError::InvalidResult(
                "attempt to fetch a non-existent result",
            )),
            OpResult::Value(value) => Ok(value),
            OpResult::Error(code) => Err(OpError::Failed(code)),
            OpResult::Panicked(captured) => Err(OpError::Panicked(captured)),
        }
    }

    /// Fetch the error code, or `InvalidResult` when the state is `Unset` or
    /// holds something else.
    pub fn error(&self) -> Result<ErrorCode, OpError> {
        match self {
            OpResult::Error(code) => Ok(*code),
            OpResult::Unset => Err(OpError::InvalidResult(
                "attempt to fetch a non-existent result",
            )),
            _ => Err(OpError::InvalidResult(
                "tried to fetch an error code from a result that is not one",
            )),
        }
    }

    /// Fetch the captured panic, or `InvalidResult` when the state is
    /// `Unset` or holds something else.
    pub fn captured(&self) -> Result<Captured, OpError> {
        match self {
            OpResult::Panicked(captured) => Ok(captured.clone()),
            OpResult::Unset => Err(OpError::InvalidResult(
                "attempt to fetch a non-existent result",
            )),
            _ => Err(OpError::InvalidResult(
                "tried to fetch a captured panic from a result that is not one",
            )),
        }
    }

    /// Like [`OpResult::error`] but destructive: the state is `Unset`
    /// afterwards on success.
    pub fn take_error(&mut self) -> Result<ErrorCode, OpError> {
        let code = self.error()?;
        *self = OpResult::Unset;
        Ok(code)
    }

    /// Like [`OpResult::captured`] but destructive.
    pub fn take_captured(&mut self) -> Result<Captured, OpError> {
        let captured = self.captured()?;
        *self = OpResult::Unset;
        Ok(captured)
    }

    /// Destructively transfer this result into `dst`. The source must be
    /// set; the destination's own setters enforce its emptiness. The source
    /// is `Unset` afterwards.
    pub fn move_into(&mut self, dst: &mut OpResult<T>) -> Result<(), OpError> {
        match std::mem::take(self) {
            OpResult::Unset => Err(OpError::InvalidResult(
                "trying to move a result that isn't there",
            )),
            taken => dst.assign_from(taken),
        }
    }

    fn check_unset(&self) -> Result<(), OpError> {
        if self.is_set() {
            Err(OpError::InvalidResult(
                "attempt to set a result that has already been set",
            ))
        } else {
            Ok(())
        }
    }
}

impl<T: Clone> OpResult<T> {
    /// Fetch the result non-destructively, cloning the stored value. `Unset`
    /// reports `InvalidResult`; the bad arms surface as the matching
    /// [`OpError`].
    pub fn peek(&self) -> Result<T, OpError> {
        match self {
            OpResult::Unset => Err(OpError::InvalidResult(
                "attempt to fetch a non-existent result",
            )),
            OpResult::Value(value) => Ok(value.clone()),
            OpResult::Error(code) => Err(OpError::Failed(*code)),
            OpResult::Panicked(captured) => Err(OpError::Panicked(captured.clone())),
        }
    }

    /// Copy this result into `dst`, leaving the source untouched. The source
    /// must be set.
    pub fn copy_into(&self, dst: &mut OpResult<T>) -> Result<(), OpError> {
        match self {
            OpResult::Unset => Err(OpError::InvalidResult(
                "trying to copy a result that isn't there",
            )),
            set => dst.assign_from(set.clone()),
        }
    }
}
