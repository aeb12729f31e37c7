//! Admin gate for the export endpoints.
//!
//! Only approved administrators may export. The caller presents the access
//! token of their backend session as `Authorization: Bearer <token>`; the
//! gate resolves it to a user and checks that user's profile row.

use serde::Deserialize;
use std::fmt;
use std::future::Future;
use zeroize::Zeroizing;

use crate::error::AuthError;

pub const ADMIN_ROLE: &str = "admin";

/// The authorised caller. The access token is kept so backend calls made on
/// the caller's behalf run under their row-level permissions.
#[derive(Clone)]
pub struct AdminIdentity {
    pub user_id: String,
    pub access_token: Zeroizing<String>,
}

impl AdminIdentity {
    pub fn new(user_id: impl Into<String>, access_token: &str) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: Zeroizing::new(access_token.to_string()),
        }
    }
}

impl fmt::Debug for AdminIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminIdentity")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// The columns of a `profiles` row the gate looks at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
}

pub trait AdminGate: Send + Sync + 'static {
    /// Resolve the bearer token of a request to an admin identity.
    /// `None` means the request carried no usable token.
    fn authorize(
        &self,
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<AdminIdentity, AuthError>> + Send;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; an empty token is rejected.
pub fn parse_bearer(header: Option<&str>) -> Option<&str> {
    let header = header?.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Decide whether the caller owning `profile` may export.
///
/// A missing profile or one that is not explicitly approved is rejected as
/// not approved; approval is checked before the role.
pub fn check_profile(profile: Option<&Profile>) -> Result<(), AuthError> {
    let profile = profile.ok_or(AuthError::NotApproved)?;
    if profile.approved != Some(true) {
        return Err(AuthError::NotApproved);
    }
    if profile.role.as_deref() != Some(ADMIN_ROLE) {
        return Err(AuthError::NotAdmin);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: &str, approved: Option<bool>) -> Profile {
        Profile {
            role: Some(role.to_string()),
            approved,
        }
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(parse_bearer(Some("bearer   tok ")), Some("tok"));
        assert_eq!(parse_bearer(None), None);
        assert_eq!(parse_bearer(Some("")), None);
        assert_eq!(parse_bearer(Some("Bearer")), None);
        assert_eq!(parse_bearer(Some("Bearer   ")), None);
        assert_eq!(parse_bearer(Some("Basic dXNlcjpwYXNz")), None);
    }

    #[test]
    fn test_approved_admin_passes() {
        assert!(check_profile(Some(&profile("admin", Some(true)))).is_ok());
    }

    #[test]
    fn test_missing_or_unapproved_profile_rejected() {
        assert!(matches!(check_profile(None), Err(AuthError::NotApproved)));
        assert!(matches!(
            check_profile(Some(&profile("admin", Some(false)))),
            Err(AuthError::NotApproved)
        ));
        assert!(matches!(
            check_profile(Some(&profile("admin", None))),
            Err(AuthError::NotApproved)
        ));
        // Approval is checked first, even for non-admins.
        assert!(matches!(
            check_profile(Some(&profile("barista", Some(false)))),
            Err(AuthError::NotApproved)
        ));
    }

    #[test]
    fn test_non_admin_rejected() {
        assert!(matches!(
            check_profile(Some(&profile("barista", Some(true)))),
            Err(AuthError::NotAdmin)
        ));
        let no_role = Profile {
            role: None,
            approved: Some(true),
        };
        assert!(matches!(check_profile(Some(&no_role)), Err(AuthError::NotAdmin)));
    }

    #[test]
    fn test_identity_debug_hides_token() {
        let identity = AdminIdentity::new("u-1", "secret-token");
        let debug = format!("{identity:?}");
        assert!(debug.contains("u-1"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_profile_deserializes_with_missing_columns() {
        let p: Profile = serde_json::from_str(r#"{"role":"admin"}"#).unwrap();
        assert_eq!(p.role.as_deref(), Some("admin"));
        assert_eq!(p.approved, None);
    }
}
