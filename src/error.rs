use std::fmt;

use serde::Serialize;

/// CLI process exit codes. Kept for the CLI surface (`setup`/`start`/`doctor`/`open`),
/// which stays out of scope for redesign per spec.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ConnectionError = 2,
    TargetError = 3,
    TimeoutError = 4,
    ProtocolError = 5,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::GeneralError => write!(f, "general error"),
            Self::ConnectionError => write!(f, "connection error"),
            Self::TargetError => write!(f, "target error"),
            Self::TimeoutError => write!(f, "timeout error"),
            Self::ProtocolError => write!(f, "protocol error"),
        }
    }
}

/// Error surfaced by the CLI shell. Every non-zero exit prints one of these as JSON
/// on stderr before exiting with `code`.
#[derive(Debug)]
pub struct AppError {
    pub message: String,
    pub code: ExitCode,
    /// Pre-rendered JSON body, used when a richer shape than `{error, code}` is needed
    /// (e.g. a `BridgeFailure` with `last_text`/`remediation`).
    pub custom_json: Option<String>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn not_implemented(command: &str) -> Self {
        Self {
            message: format!("{command}: not yet implemented"),
            code: ExitCode::GeneralError,
            custom_json: None,
        }
    }

    pub fn to_json(&self) -> String {
        if let Some(custom) = &self.custom_json {
            return custom.clone();
        }
        let output = ErrorOutput {
            error: &self.message,
            code: self.code as u8,
        };
        serde_json::to_string(&output).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","code":{}}}"#,
                self.message, self.code as u8
            )
        })
    }

    pub fn print_json_stderr(&self) {
        eprintln!("{}", self.to_json());
    }
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    code: u8,
}

/// Classification of core-level failures.
///
/// Every variant maps to a distinct recovery policy at the component that raises it:
/// `CdpClient` never retries above the reconnect layer, `ResponseMonitor`/detectors
/// absorb single-probe failures, `SessionBridge` propagates `Busy`/`AuthRejected`/
/// `ActivationFailed` to the chat transport and turns everything else into progress
/// noise or a final `onTimeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Socket dropped or not yet connected.
    Disconnected,
    /// A CDP call exceeded its per-call deadline.
    Timeout,
    /// The CDP peer returned an `error` object.
    RemoteError,
    /// Discovery yielded no usable target or execution context.
    NoTarget,
    /// A DOM script returned an unexpected shape.
    InvalidPayload,
    /// A prompt arrived while the session was already generating.
    Busy,
    /// The caller was not allowed to perform the action.
    AuthRejected,
    /// The target chat session could not be re-entered.
    ActivationFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Timeout => "timeout",
            Self::RemoteError => "remote_error",
            Self::NoTarget => "no_target",
            Self::InvalidPayload => "invalid_payload",
            Self::Busy => "busy",
            Self::AuthRejected => "auth_rejected",
            Self::ActivationFailed => "activation_failed",
        };
        write!(f, "{s}")
    }
}

/// A user-visible failure from the bridge core.
///
/// Carries a short classification, the last useful state, and, where applicable,
/// a remediation string. Never a stack trace.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl fmt::Display for BridgeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BridgeFailure {}

impl BridgeFailure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            last_text: None,
            remediation: None,
        }
    }

    #[must_use]
    pub fn with_last_text(mut self, last_text: impl Into<String>) -> Self {
        self.last_text = Some(last_text.into());
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

impl From<crate::cdp::CdpError> for BridgeFailure {
    fn from(e: crate::cdp::CdpError) -> Self {
        use crate::cdp::CdpError;
        let kind = match &e {
            CdpError::Connection(_) | CdpError::ConnectionClosed | CdpError::ReconnectFailed { .. } => {
                FailureKind::Disconnected
            }
            CdpError::ConnectionTimeout | CdpError::CommandTimeout { .. } => FailureKind::Timeout,
            CdpError::Protocol { .. } => FailureKind::RemoteError,
            CdpError::InvalidResponse(_) | CdpError::Internal(_) => FailureKind::InvalidPayload,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<BridgeFailure> for AppError {
    fn from(e: BridgeFailure) -> Self {
        let code = match e.kind {
            FailureKind::Disconnected | FailureKind::NoTarget => ExitCode::ConnectionError,
            FailureKind::Timeout => ExitCode::TimeoutError,
            FailureKind::RemoteError | FailureKind::InvalidPayload => ExitCode::ProtocolError,
            FailureKind::Busy | FailureKind::AuthRejected | FailureKind::ActivationFailed => {
                ExitCode::TargetError
            }
        };
        let custom_json = serde_json::to_string(&e).ok();
        Self {
            message: e.message,
            code,
            custom_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_produces_json_with_error_and_code() {
        let err = AppError::not_implemented("tabs");
        let json = err.to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["error"], "tabs: not yet implemented");
        assert_eq!(parsed["code"], 1);
    }

    #[test]
    fn exit_code_display() {
        assert_eq!(ExitCode::Success.to_string(), "success");
        assert_eq!(ExitCode::GeneralError.to_string(), "general error");
        assert_eq!(ExitCode::ConnectionError.to_string(), "connection error");
    }

    #[test]
    fn app_error_display() {
        let err = AppError::not_implemented("connect");
        assert_eq!(
            err.to_string(),
            "general error: connect: not yet implemented"
        );
    }

    #[test]
    fn bridge_failure_display() {
        let err = BridgeFailure::new(FailureKind::Busy, "a prompt is already generating");
        assert_eq!(err.to_string(), "busy: a prompt is already generating");
    }

    #[test]
    fn bridge_failure_carries_last_text_and_remediation() {
        let err = BridgeFailure::new(FailureKind::Timeout, "no activity for 120s")
            .with_last_text("partial reply")
            .with_remediation("restart the assistant with a debug port");
        assert_eq!(err.last_text.as_deref(), Some("partial reply"));
        assert!(err.remediation.is_some());
    }

    #[test]
    fn bridge_failure_to_app_error_maps_exit_code() {
        let err: AppError = BridgeFailure::new(FailureKind::Busy, "busy").into();
        assert!(matches!(err.code, ExitCode::TargetError));
        let json = err.to_json();
        assert!(json.contains("\"kind\":\"busy\""));
    }

    #[test]
    fn failure_kind_display_matches_table() {
        assert_eq!(FailureKind::Disconnected.to_string(), "disconnected");
        assert_eq!(FailureKind::NoTarget.to_string(), "no_target");
        assert_eq!(FailureKind::ActivationFailed.to_string(), "activation_failed");
    }
}
