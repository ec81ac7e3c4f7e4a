//! Caller identity forwarded by the upstream authentication layer.
//!
//! Tokens are verified before requests reach the gateway; what arrives here
//! is the verified user id and privilege level as plain headers.

use axum::{extract::FromRequestParts, http::request::Parts};

use mathhub_core::{PrivilegeLevel, UserId};

use crate::error::GatewayError;

/// Header carrying the verified user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's privilege level.
pub const PRIVILEGE_HEADER: &str = "x-privilege-level";
/// Optional header carrying the caller's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    /// Display name; falls back to the user id.
    pub name: String,
    pub privilege: PrivilegeLevel,
}

impl Caller {
    /// Check that the caller holds at least `required`.
    ///
    /// # Errors
    /// Returns [`GatewayError::Forbidden`] if the privilege is too low.
    pub fn require(&self, required: PrivilegeLevel) -> Result<(), GatewayError> {
        if self.privilege.satisfies(required) {
            Ok(())
        } else {
            tracing::debug!(user = %self.user_id, actual = %self.privilege, required = %required, "privilege too low");
            Err(GatewayError::Forbidden { required, actual: self.privilege })
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER).ok_or(GatewayError::Unauthorized)?;
        let privilege = header(parts, PRIVILEGE_HEADER)
            .and_then(|v| v.parse::<u32>().ok())
            .map(PrivilegeLevel::new)
            .ok_or(GatewayError::Unauthorized)?;
        let name = header(parts, USER_NAME_HEADER).unwrap_or(user_id).to_owned();
        Ok(Self { user_id: UserId::new(user_id), name, privilege })
    }
}
