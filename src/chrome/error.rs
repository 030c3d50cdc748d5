use std::fmt;

/// Errors that can occur while discovering a debuggable Chromium instance.
#[derive(Debug)]
pub enum ChromeError {
    /// HTTP request to the debug endpoint failed.
    HttpError(String),

    /// Failed to parse a response from the debug endpoint.
    ParseError(String),

    /// The `DevToolsActivePort` file was not found.
    NoActivePort,

    /// No running instance could be discovered on any candidate port.
    NotRunning(String),

    /// An I/O error occurred.
    Io(std::io::Error),
}

impl fmt::Display for ChromeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError(msg) => write!(f, "Chrome HTTP error: {msg}"),
            Self::ParseError(msg) => write!(f, "Chrome parse error: {msg}"),
            Self::NoActivePort => write!(f, "DevToolsActivePort file not found"),
            Self::NotRunning(detail) => {
                write!(
                    f,
                    "no running Chrome instance found with remote debugging: {detail}"
                )
            }
            Self::Io(e) => write!(f, "Chrome I/O error: {e}"),
        }
    }
}

impl std::error::Error for ChromeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChromeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ChromeError> for crate::error::AppError {
    fn from(e: ChromeError) -> Self {
        use crate::error::ExitCode;
        let code = match &e {
            ChromeError::ParseError(_) | ChromeError::Io(_) => ExitCode::GeneralError,
            ChromeError::HttpError(_) | ChromeError::NotRunning(_) | ChromeError::NoActivePort => {
                ExitCode::ConnectionError
            }
        };
        Self {
            message: e.to_string(),
            code,
            custom_json: None,
        }
    }
}
