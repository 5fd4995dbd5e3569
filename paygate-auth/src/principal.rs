// Authenticated identities attached to requests

use crate::{AuthError, Result};
use paygate_core::HttpRequest;
use serde::{Deserialize, Serialize};

/// Role granted to callers holding the internal API key.
pub const ROLE_SERVICE: &str = "ROLE_SERVICE";

/// Trait for authenticated callers
pub trait Principal: Send + Sync {
    fn name(&self) -> &str;

    fn has_role(&self, role: &str) -> bool;

    fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    fn has_all_roles(&self, roles: &[&str]) -> bool {
        roles.iter().all(|role| self.has_role(role))
    }
}

/// A machine caller authenticated by a shared key rather than a user login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipal {
    pub name: String,
    pub roles: Vec<String>,
}

impl ServicePrincipal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    /// The principal installed for requests carrying the internal key.
    pub fn internal() -> Self {
        Self::new("internal-service").with_role(ROLE_SERVICE)
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// The principal a filter installed on `req`, if any.
    pub fn from_request(req: &HttpRequest) -> Option<&ServicePrincipal> {
        req.extensions.get::<ServicePrincipal>()
    }

    /// Like [`from_request`](Self::from_request) but requires `role`.
    pub fn require_role<'a>(req: &'a HttpRequest, role: &str) -> Result<&'a ServicePrincipal> {
        let principal = Self::from_request(req).ok_or(AuthError::MissingApiKey)?;
        if principal.has_role(role) {
            Ok(principal)
        } else {
            Err(AuthError::MissingRole(role.to_string()))
        }
    }
}

impl Principal for ServicePrincipal {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_principal() {
        let principal = ServicePrincipal::internal();
        assert_eq!(principal.name(), "internal-service");
        assert_eq!(principal.roles, vec!["ROLE_SERVICE".to_string()]);
        assert!(principal.has_any_role(&["ROLE_ADMIN", "ROLE_SERVICE"]));
        assert!(!principal.has_all_roles(&["ROLE_ADMIN", "ROLE_SERVICE"]));
    }

    #[test]
    fn test_require_role() {
        let mut req = HttpRequest::new("GET", "/api/internal/payments");
        assert_eq!(
            ServicePrincipal::require_role(&req, ROLE_SERVICE),
            Err(AuthError::MissingApiKey)
        );

        req.extensions.insert(ServicePrincipal::internal());
        assert!(ServicePrincipal::require_role(&req, ROLE_SERVICE).is_ok());
        assert_eq!(
            ServicePrincipal::require_role(&req, "ROLE_ADMIN"),
            Err(AuthError::MissingRole("ROLE_ADMIN".to_string()))
        );
    }
}
