//! Error types shared across the apexlog crates

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for apexlog operations.
///
/// The enum is `Clone` so a deduplicated command execution can deliver one
/// outcome to every concurrent waiter; underlying I/O errors are carried as
/// rendered messages rather than sources for that reason.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// The external CLI binary could not be found on the PATH
    #[error("'{program}' was not found on the PATH")]
    #[diagnostic(code(apexlog::exec::cli_not_found))]
    CliNotFound {
        /// The program that failed to spawn
        program: String,
    },

    /// The external CLI did not finish within the allotted time
    #[error("'{program}' timed out after {timeout_ms} ms")]
    #[diagnostic(code(apexlog::exec::cli_timeout))]
    CliTimeout {
        /// The program that was killed
        program: String,
        /// The timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// The external CLI exited with a non-zero status
    #[error("'{program}' exited with {}", exit_display(.code, .signal))]
    #[diagnostic(code(apexlog::exec::cli_exit_nonzero))]
    CliExitNonZero {
        /// The program that failed
        program: String,
        /// Exit code, when the process exited normally
        code: Option<i32>,
        /// Terminating signal, when the process was killed
        signal: Option<i32>,
        /// Captured standard error output
        stderr: String,
    },

    /// Combined stdout/stderr output exceeded the configured cap
    #[error("'{program}' produced more than {limit_bytes} bytes of output")]
    #[diagnostic(code(apexlog::exec::buffer_exceeded))]
    BufferExceeded {
        /// The program that was killed
        program: String,
        /// The cap that was exceeded, in bytes
        limit_bytes: usize,
    },

    /// The caller's cancellation token fired
    #[error("operation aborted")]
    #[diagnostic(code(apexlog::aborted))]
    Aborted,

    /// Two consecutive 401 responses; the refreshed credentials are also stale
    #[error("authentication expired for {url} (401 after credential refresh)")]
    #[diagnostic(code(apexlog::http::auth_expired))]
    AuthExpired {
        /// The request URL that was rejected twice
        url: String,
    },

    /// A non-2xx HTTP status other than the refreshable 401
    #[error("HTTP {status} from {url}: {body}")]
    #[diagnostic(code(apexlog::http::status))]
    HttpStatus {
        /// The response status code
        status: u16,
        /// The request URL
        url: String,
        /// The response body, as text
        body: String,
    },

    /// Transport-level HTTP failure (connection, TLS, body read)
    #[error("HTTP request failed: {message}")]
    #[diagnostic(code(apexlog::http::transport))]
    Http {
        /// Rendered transport error
        message: String,
    },

    /// A payload could not be parsed as the expected JSON shape
    #[error("failed to parse JSON from {context}: {message}")]
    #[diagnostic(code(apexlog::json::parse))]
    JsonParse {
        /// What was being parsed (CLI stdout, a response body, ...)
        context: String,
        /// Rendered parse error
        message: String,
    },

    /// Credential resolution failed for a reason other than a missing CLI
    #[error("authentication failed: {message}")]
    #[diagnostic(code(apexlog::auth::failed))]
    Auth {
        /// Rendered resolution failure
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    #[diagnostic(code(apexlog::config::invalid))]
    Config {
        /// The error message describing the configuration issue
        message: String,
    },

    /// Process plumbing failure that is not a missing binary
    #[error("process execution failed: {message}")]
    #[diagnostic(code(apexlog::exec::process))]
    Process {
        /// Rendered spawn/stream failure
        message: String,
    },
}

fn exit_display(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "an unknown status".to_string(),
    }
}

impl Error {
    /// Create a transport-level HTTP error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a JSON parse error with context
    pub fn json_parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a generic authentication failure
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a process plumbing error
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Whether this is the missing-CLI class the credential resolver
    /// branches on for its PATH-recovery fallback
    #[must_use]
    pub fn is_cli_not_found(&self) -> bool {
        matches!(self, Self::CliNotFound { .. })
    }
}

/// Result type alias for apexlog operations
pub type Result<T> = std::result::Result<T, Error>;
