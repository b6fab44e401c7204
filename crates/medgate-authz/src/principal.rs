//! The resolved caller of an operation.

use medgate_core::{IdentityHash, Role};

/// A caller whose identity and role have been resolved by the host.
///
/// The identity string itself is kept only to log and to derive the
/// digest; every comparison uses [`Caller::hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    identity: String,
    hash: IdentityHash,
    role: Role,
    clinic_id: Option<String>,
}

impl Caller {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        let identity = identity.into();
        let hash = IdentityHash::of(&identity);
        Self {
            identity,
            hash,
            role,
            clinic_id: None,
        }
    }

    /// Attach the clinic attribute registered for this caller.
    pub fn with_clinic(mut self, clinic_id: impl Into<String>) -> Self {
        self.clinic_id = Some(clinic_id.into());
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn hash(&self) -> IdentityHash {
        self.hash
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn clinic_id(&self) -> Option<&str> {
        self.clinic_id.as_deref()
    }
}
