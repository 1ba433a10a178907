//! Marshalling errors.
//!
//! Every failure the marshalling core can surface is a `MarshalError`.
//! Errors that cross the call-marshaller boundary are wrapped with the
//! argument index or field path where they occurred.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarshalError>;

#[derive(Error, Debug)]
pub enum MarshalError {
    /// Absent value at a non-nullable position.
    #[error("null value for non-nullable type {descriptor}")]
    NullViolation { descriptor: String },

    /// A guest object header carries a class id other than the handler's.
    #[error("type mismatch for {descriptor}: expected class id {expected}, found {found}")]
    TypeMismatch {
        descriptor: String,
        expected: u32,
        found: u32,
    },

    /// The host value cannot be coerced to the declared type.
    #[error("cannot coerce {found} value to {descriptor}")]
    CoercionError {
        descriptor: String,
        found: &'static str,
    },

    /// Duplicate key on a mapping write.
    #[error("duplicate key in map: {key}")]
    DuplicateKey { key: String },

    /// Variant tag outside the declared alternatives.
    #[error("invalid discriminator {tag} for variant {descriptor}")]
    InvalidDiscriminator { descriptor: String, tag: String },

    /// Numeric or time value outside the guest-representable range.
    #[error("value {value} out of range for {descriptor}")]
    OutOfRange { descriptor: String, value: String },

    /// A guest memory read or write failed.
    #[error("guest memory fault: {op} of {len} bytes at offset {offset}")]
    MemoryFault {
        op: &'static str,
        offset: u32,
        len: u32,
    },

    /// The guest allocator returned the null pointer or trapped.
    #[error("guest allocation of {size} bytes (class id {class_id}) failed")]
    AllocFault { size: u32, class_id: u32 },

    /// The type registry cannot classify a descriptor.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// The shape is recognised but no handler family applies.
    #[error("unsupported type {descriptor}: {reason}")]
    UnsupportedType { descriptor: String, reason: String },

    /// A handler received the wrong number of ABI slots.
    #[error("expected {expected} slots for {descriptor}, got {got}")]
    SlotMismatch {
        descriptor: String,
        expected: u32,
        got: usize,
    },

    /// A call was made with the wrong number of arguments.
    #[error("function {function} expects {expected} arguments, got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    /// Error while encoding or decoding a specific call argument.
    #[error("argument {index} ({name}): {source}")]
    Argument {
        index: usize,
        name: String,
        #[source]
        source: Box<MarshalError>,
    },

    /// Error while reading or writing a specific record field.
    #[error("field '{path}': {source}")]
    Field {
        path: String,
        #[source]
        source: Box<MarshalError>,
    },

    /// The guest export itself failed (trap or guest-reported error).
    ///
    /// These originate in user code, so they are user-visible and should
    /// be suppressed from internal telemetry sinks.
    #[error("guest function failed: {message}")]
    GuestError { message: String },

    /// The host cancelled the call before it completed.
    #[error("call cancelled")]
    Cancelled,
}

impl MarshalError {
    /// Wrap an error with the argument position it occurred at.
    pub fn in_argument(self, index: usize, name: &str) -> Self {
        MarshalError::Argument {
            index,
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// Wrap an error with the record field path it occurred at.
    pub fn in_field(self, path: &str) -> Self {
        MarshalError::Field {
            path: path.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping argument/field context.
    pub fn root(&self) -> &MarshalError {
        match self {
            MarshalError::Argument { source, .. } | MarshalError::Field { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// True when the error was caused by user guest code rather than the
    /// runtime. User-visible errors are returned to the caller but kept
    /// out of internal telemetry.
    pub fn is_user_visible(&self) -> bool {
        matches!(self.root(), MarshalError::GuestError { .. })
    }
}
