//! Structured tool payloads and the auth signals carried inside them

use serde_json::{json, Value};

/// What the user has to do with an auth provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Logout,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Login => "login",
            AuthAction::Logout => "logout",
        }
    }
}

/// An authorization requirement surfaced by a tool result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSignal {
    pub action: AuthAction,
    pub provider: String,
    pub message: Option<String>,
}

impl AuthSignal {
    /// Recognize `login_required` errors and `login`/`logout` actions.
    pub fn from_output(output: &Value) -> Option<Self> {
        let kind = output.get("type")?.as_str()?;
        let code = output.get("code")?.as_str()?;
        let provider = output.get("provider")?.as_str()?;
        if provider.is_empty() {
            return None;
        }

        let action = match (kind, code) {
            ("error", "login_required") | ("action", "login") => AuthAction::Login,
            ("action", "logout") => AuthAction::Logout,
            _ => return None,
        };

        Some(Self {
            action,
            provider: provider.to_string(),
            message: output
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

pub fn error_payload(code: &str, message: impl Into<String>) -> Value {
    json!({
        "type": "error",
        "code": code,
        "message": message.into(),
    })
}

pub fn status_payload(code: &str, message: impl Into<String>) -> Value {
    json!({
        "type": "status",
        "code": code,
        "message": message.into(),
    })
}

/// The user must sign in to `provider` before the tool can run
pub fn login_required(provider: &str) -> Value {
    json!({
        "type": "error",
        "code": "login_required",
        "message": format!("Please sign in to your {} account to continue.", display_name(provider)),
        "provider": provider,
    })
}

pub fn auth_action(action: AuthAction, provider: &str) -> Value {
    let message = match action {
        AuthAction::Login => format!("Use the link below to sign in to your {} account.", display_name(provider)),
        AuthAction::Logout => format!("Use the link below to sign out of your {} account.", display_name(provider)),
    };
    json!({
        "type": "action",
        "code": action.as_str(),
        "message": message,
        "provider": provider,
    })
}

/// "google" -> "Google"
pub(crate) fn display_name(provider: &str) -> String {
    let mut chars = provider.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
