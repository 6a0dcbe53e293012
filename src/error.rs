use thiserror::Error;

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the failure modes of the whole-program rewriting engine: lens
/// construction, class merging, IR transformation, and driver-level sequencing.
/// Silent skips (an inlining candidate over budget, a discarded merge group) are
/// deliberately NOT errors; they leave the program unchanged and compilation
/// proceeds.
#[derive(Error, Debug)]
pub enum Error {
    /// An assertion internal to the engine failed.
    ///
    /// This is always a programmer error, never a property of the input. The
    /// driver aborts compilation with a diagnostic naming the failing invariant.
    /// The error includes the source location where the violation was detected.
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Live bytecode references a symbol that resolves to no definition.
    ///
    /// Raised by the tree shaker when a reference is neither in the program nor
    /// in the library and is not covered by a `dontWarn` rule.
    #[error("Unresolved reference to {0}")]
    UnresolvedReference(String),

    /// Two keep rules demand incompatible treatments for the same symbol.
    #[error("Conflicting keep rules for {0}")]
    RuleConflict(String),

    /// The post-optimization program exceeds a target-format limit.
    ///
    /// Detected when finalizing the application for the writer, e.g. more
    /// methods than a single dex partition can hold.
    #[error("Format limit exceeded: {0}")]
    FormatLimit(String),

    /// Failed to construct or push a graph lens.
    ///
    /// Typical causes: a rename map that is not injective, or a second lens
    /// carrying a prototype change for a method that already has one in effect.
    #[error("{0}")]
    LensError(String),

    /// A class merge operation detected an inconsistency.
    ///
    /// Raised only when a merge has already begun mutating the target; an
    /// ineligible group is discarded before this point without error.
    #[error("{0}")]
    MergeError(String),

    /// The SSA IR of a method is inconsistent.
    ///
    /// Examples: a value used before definition, a phi whose operand count
    /// does not match its block's predecessors.
    #[error("{0}")]
    IrError(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
