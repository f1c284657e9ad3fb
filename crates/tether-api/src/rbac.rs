//! Authorization seam
//!
//! Handlers consult an [`Authorizer`] before touching anything. The
//! deny error renders to clients as the literal `"forbidden"` with no
//! further detail; the full cause (subject, action, object, engine
//! detail) stays in the server log, where it cannot leak resource
//! existence to unauthorized callers.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;

/// What a caller is attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read resource metadata.
    Read,
    /// Establish a tunnel leg.
    Connect,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Connect => write!(f, "connect"),
        }
    }
}

/// The identity a request carries.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: String,
}

impl Subject {
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
        }
    }

    /// Derive the caller identity from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get("x-tether-subject")
            .and_then(|v| v.to_str().ok())
            .map(|id| Self { id: id.to_string() })
            .unwrap_or_else(Self::anonymous)
    }
}

/// Authorization denial.
///
/// `Display` is always the bare word `forbidden`; anything rendered
/// from this error is safe to hand to a client. Use [`detail`] for
/// the server-side log line.
///
/// [`detail`]: Unauthorized::detail
#[derive(Debug)]
pub struct Unauthorized {
    subject: String,
    action: Action,
    object: String,
    cause: String,
}

impl Unauthorized {
    pub fn new(subject: &Subject, action: Action, object: &str, cause: impl Into<String>) -> Self {
        Self {
            subject: subject.id.clone(),
            action,
            object: object.to_string(),
            cause: cause.into(),
        }
    }

    /// Full denial context for the server log. Never sent to clients.
    pub fn detail(&self) -> String {
        format!(
            "unauthorized: subject={} action={} object={}: {}",
            self.subject, self.action, self.object, self.cause
        )
    }
}

impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forbidden")
    }
}

impl std::error::Error for Unauthorized {}

/// Policy seam consulted by every handler.
pub trait Authorizer: Send + Sync {
    fn authorize(
        &self,
        subject: &Subject,
        action: Action,
        object: &str,
    ) -> Result<(), Unauthorized>;
}

/// Permits everything. The default until a real policy engine is
/// wired in.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _: &Subject, _: Action, _: &str) -> Result<(), Unauthorized> {
        Ok(())
    }
}

pub type SharedAuthorizer = Arc<dyn Authorizer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_renders_as_forbidden_only() {
        let err = Unauthorized::new(
            &Subject {
                id: "user:alice".to_string(),
            },
            Action::Connect,
            "resource:1234",
            "no role grants connect",
        );
        assert_eq!(err.to_string(), "forbidden");
        assert!(!err.to_string().contains("alice"));
    }

    #[test]
    fn test_detail_keeps_full_context() {
        let err = Unauthorized::new(
            &Subject {
                id: "user:alice".to_string(),
            },
            Action::Read,
            "resource:1234",
            "no role grants read",
        );
        let detail = err.detail();
        assert!(detail.contains("user:alice"));
        assert!(detail.contains("read"));
        assert!(detail.contains("resource:1234"));
        assert!(detail.contains("no role grants read"));
    }

    #[test]
    fn test_allow_all_permits() {
        let result = AllowAll.authorize(&Subject::anonymous(), Action::Connect, "anything");
        assert!(result.is_ok());
    }

    #[test]
    fn test_subject_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(Subject::from_headers(&headers).id, "anonymous");

        headers.insert("x-tether-subject", "user:bob".parse().unwrap());
        assert_eq!(Subject::from_headers(&headers).id, "user:bob");
    }
}
