use std::fmt;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "sticky_notes=info,tower_http=info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Sanitized wrapper for email addresses that masks the local part
#[derive(Debug, Clone)]
pub struct SanitizedEmail(String);

impl SanitizedEmail {
    pub fn new(email: impl AsRef<str>) -> Self {
        let email = email.as_ref();
        let masked = match email.split_once('@') {
            Some((local, domain)) => format!("{}@{}", mask_tail(local), domain),
            None if email.is_empty() => String::new(),
            None => "***@***".to_string(),
        };
        Self(masked)
    }
}

/// Sanitized wrapper for usernames that shows only first and last character
#[derive(Debug, Clone)]
pub struct SanitizedUsername(String);

impl SanitizedUsername {
    pub fn new(username: impl AsRef<str>) -> Self {
        let username = username.as_ref();
        let masked = match username.chars().count() {
            0..=4 => mask_tail(username),
            _ => {
                let first = username.chars().next().unwrap_or('*');
                let last = username.chars().last().unwrap_or('*');
                format!("{first}***{last}")
            }
        };
        Self(masked)
    }
}

/// Keeps the first character of values longer than two characters.
fn mask_tail(value: &str) -> String {
    let len = value.chars().count();
    match value.chars().next() {
        Some(first) if len > 2 => format!("{first}***"),
        _ => "*".repeat(len),
    }
}

/// Sanitized wrapper for IP addresses that masks the last octet or segment
#[derive(Debug, Clone)]
pub struct SanitizedIpAddr(String);

impl SanitizedIpAddr {
    pub fn new(ip: impl fmt::Display) -> Self {
        let ip = ip.to_string();
        let masked = if let Some(last_dot) = ip.rfind('.') {
            format!("{}.***", &ip[..last_dot])
        } else if let Some(last_colon) = ip.rfind(':') {
            format!("{}:****", &ip[..last_colon])
        } else {
            "***".to_string()
        };
        Self(masked)
    }
}

/// Wrapper for UUIDs that are safe to log
#[derive(Debug, Clone, Copy)]
pub struct LoggableUuid(pub Uuid);

impl From<Uuid> for LoggableUuid {
    fn from(uuid: Uuid) -> Self {
        LoggableUuid(uuid)
    }
}

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        })*
    };
}

display_inner!(SanitizedEmail, SanitizedUsername, SanitizedIpAddr, LoggableUuid);

/// Security event types for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    LoginSuccess,
    LoginFailure,
    Logout,
    RegistrationSuccess,
    RegistrationFailure,
    PasswordChanged,
    PasswordChangeFailure,
    ProfileUpdated,
    SessionRejected,
    RateLimitExceeded,
    UnsafeRedirectRejected,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::LoginSuccess => "login_success",
            SecurityEvent::LoginFailure => "login_failure",
            SecurityEvent::Logout => "logout",
            SecurityEvent::RegistrationSuccess => "registration_success",
            SecurityEvent::RegistrationFailure => "registration_failure",
            SecurityEvent::PasswordChanged => "password_changed",
            SecurityEvent::PasswordChangeFailure => "password_change_failure",
            SecurityEvent::ProfileUpdated => "profile_updated",
            SecurityEvent::SessionRejected => "session_rejected",
            SecurityEvent::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEvent::UnsafeRedirectRejected => "unsafe_redirect_rejected",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SecurityEvent::LoginFailure
                | SecurityEvent::PasswordChangeFailure
                | SecurityEvent::SessionRejected
                | SecurityEvent::RateLimitExceeded
                | SecurityEvent::UnsafeRedirectRejected
        )
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log a security event with sanitized context
#[macro_export]
macro_rules! log_security_event {
    ($event:expr, $($field:tt)*) => {
        if $event.is_critical() {
            tracing::warn!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        } else {
            tracing::info!(
                security_event = %$event,
                event_type = "security",
                $($field)*
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_email() {
        assert_eq!(
            SanitizedEmail::new("user@example.com").to_string(),
            "u***@example.com"
        );
        assert_eq!(
            SanitizedEmail::new("ab@test.com").to_string(),
            "**@test.com"
        );
        assert_eq!(SanitizedEmail::new("invalid-email").to_string(), "***@***");
        assert_eq!(SanitizedEmail::new("").to_string(), "");
    }

    #[test]
    fn test_sanitize_username() {
        assert_eq!(SanitizedUsername::new("johndoe").to_string(), "j***e");
        assert_eq!(SanitizedUsername::new("bob").to_string(), "b***");
        assert_eq!(SanitizedUsername::new("ab").to_string(), "**");
    }

    #[test]
    fn test_sanitize_ip() {
        assert_eq!(
            SanitizedIpAddr::new("192.168.1.100").to_string(),
            "192.168.1.***"
        );
        assert_eq!(
            SanitizedIpAddr::new("2001:db8::8a2e:370:7334").to_string(),
            "2001:db8::8a2e:370:****"
        );
    }

    #[test]
    fn test_security_event_critical() {
        assert!(SecurityEvent::LoginFailure.is_critical());
        assert!(SecurityEvent::SessionRejected.is_critical());
        assert!(!SecurityEvent::Logout.is_critical());
        assert_eq!(SecurityEvent::PasswordChanged.to_string(), "password_changed");
    }
}
