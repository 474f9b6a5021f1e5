//! Role-based authorization after the session guard.

use std::collections::HashSet;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jobboard_core::Role;

use super::guard::ResolvedIdentity;
use super::{AuthError, UnauthorizedReason};

/// Restricts an operation to a set of roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    allowed: HashSet<Role>,
}

impl RoleGate {
    /// Create a gate that admits the given roles.
    #[must_use]
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Gate admitting administrators only.
    #[must_use]
    pub fn admin() -> Self {
        Self::new([Role::Admin])
    }

    /// Whether a role passes the gate.
    #[must_use]
    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    /// Check a resolved identity against the gate.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` if no identity was resolved and
    /// `AuthError::Forbidden` if its role is not admitted.
    pub fn require<'a>(
        &self,
        identity: Option<&'a ResolvedIdentity>,
    ) -> Result<&'a ResolvedIdentity, AuthError> {
        let identity = identity.ok_or(AuthError::Unauthorized(
            UnauthorizedReason::MissingCredentials,
        ))?;

        if self.allows(identity.role) {
            Ok(identity)
        } else {
            tracing::debug!(identity = %identity.id, role = %identity.role, "Role gate refused");
            Err(AuthError::Forbidden)
        }
    }
}

/// Middleware applying a `RoleGate`. Must run after `require_session`.
pub async fn require_role(State(gate): State<RoleGate>, request: Request, next: Next) -> Response {
    match gate.require(request.extensions().get::<ResolvedIdentity>()) {
        Ok(_) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
