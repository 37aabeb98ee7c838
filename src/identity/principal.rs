use serde::{Deserialize, Serialize};

/// Reserved principal that denotes the administrator.
pub const ADMIN_PRINCIPAL: &str = "forte";

/// Identity bound to a session after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into() } }

    pub fn admin() -> Self { Self::new(ADMIN_PRINCIPAL) }

    pub fn is_admin(&self) -> bool { self.user_id == ADMIN_PRINCIPAL }
}

/// Who the gateway admitted a request as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subject", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    User(Principal),
    Admin(Principal),
    /// Verified peer server; carries the peer's domain.
    Federated { domain: String },
}

impl Identity {
    pub fn from_principal(principal: Option<&Principal>) -> Self {
        match principal {
            Some(p) if p.is_admin() => Identity::Admin(p.clone()),
            Some(p) => Identity::User(p.clone()),
            None => Identity::Anonymous,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Anonymous => "anonymous",
            Identity::User(_) => "user",
            Identity::Admin(_) => "admin",
            Identity::Federated { .. } => "federated",
        }
    }

    /// User id or peer domain, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User(p) | Identity::Admin(p) => Some(p.user_id.as_str()),
            Identity::Federated { domain } => Some(domain.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reserved_value_is_admin() {
        assert!(Principal::admin().is_admin());
        assert!(!Principal::new("Forte").is_admin());
        assert!(!Principal::new("alice").is_admin());
    }

    #[test]
    fn identity_from_principal() {
        assert_eq!(Identity::from_principal(None), Identity::Anonymous);
        assert_eq!(Identity::from_principal(Some(&Principal::new("alice"))).kind(), "user");
        let admin = Identity::from_principal(Some(&Principal::admin()));
        assert_eq!(admin.kind(), "admin");
        assert_eq!(admin.subject(), Some("forte"));
    }
}
