use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// None of these errors ever reach the caller of [`crate::exceptions::ExceptionStore::handle`].
/// They surface from the instrumentation scan (where a failing candidate is logged and skipped),
/// from the guarded activator wrapper, and from loading or saving [`crate::settings::Settings`].
///
/// # Error Categories
///
/// ## Instruction Stream Errors
/// - [`Error::Malformed`] - An instruction stream or exception region is inconsistent
/// - [`Error::OutOfBounds`] - An edit addressed an instruction that does not exist
/// - [`Error::MissingBody`] - The host could not provide a method body
/// - [`Error::InstallFailed`] - The host rejected a rewritten method body
///
/// ## Runtime Errors
/// - [`Error::NullTypeActivation`] - The guarded activator was asked to construct a null type
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::JsonError`] - Settings could not be (de)serialized
///
/// # Examples
///
/// ```rust,no_run
/// use patchscope::{settings::Settings, Error};
/// use std::path::Path;
///
/// match Settings::read_from(Path::new("settings.json")) {
///     Ok(settings) => println!("enabled: {}", settings.enabled),
///     Err(Error::JsonError(err)) => eprintln!("Malformed settings: {}", err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An instruction stream or its exception regions are inconsistent.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An edit addressed an instruction index past the end of the stream.
    #[error("Instruction index {index} is out of range for a body of {len} instructions")]
    OutOfBounds {
        /// The requested index
        index: usize,
        /// Number of instructions in the stream
        len: usize,
    },

    /// The host could not provide the instruction stream of a method.
    #[error("No method body available for {0}")]
    MissingBody(String),

    /// The host rejected a rewritten method body.
    #[error("Failed to install rewritten body for {method}: {reason}")]
    InstallFailed {
        /// Display name of the method
        method: String,
        /// Reason reported by the host
        reason: String,
    },

    /// The guarded activator was called with a null type.
    ///
    /// The message names the call shape and, when resolvable, the configuration
    /// object that requested the construction.
    #[error("{0}")]
    NullTypeActivation(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Settings could not be serialized or deserialized.
    #[error("{0}")]
    JsonError(#[from] serde_json::Error),
}
