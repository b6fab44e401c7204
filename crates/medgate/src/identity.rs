//! Caller resolution.
//!
//! The host (transport, certificate layer) hands the engine a
//! [`CallContext`] of attributes it has already authenticated. The engine
//! never parses credentials; an [`IdentityResolver`] turns the attributes
//! into a [`Caller`].

use std::collections::HashMap;
use std::sync::Arc;

use medgate_authz::Caller;
use medgate_core::Role;

use crate::config::AttributeNames;
use crate::error::IdentityError;

/// Attributes describing the caller of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    attributes: HashMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Resolves the caller of an invocation.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, ctx: &CallContext) -> Result<Caller, IdentityError>;
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for Arc<R> {
    fn resolve(&self, ctx: &CallContext) -> Result<Caller, IdentityError> {
        (**self).resolve(ctx)
    }
}

/// Reads identity, role and clinic from named context attributes.
#[derive(Debug, Clone, Default)]
pub struct AttributeResolver {
    names: AttributeNames,
}

impl AttributeResolver {
    pub fn new(names: AttributeNames) -> Self {
        Self { names }
    }

    fn required<'a>(&self, ctx: &'a CallContext, name: &str) -> Result<&'a str, IdentityError> {
        ctx.attribute(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| IdentityError::MissingAttribute(name.to_string()))
    }
}

impl IdentityResolver for AttributeResolver {
    fn resolve(&self, ctx: &CallContext) -> Result<Caller, IdentityError> {
        let identity = self.required(ctx, &self.names.identity)?;
        let role_attr = self.required(ctx, &self.names.role)?;
        let role: Role = role_attr
            .parse()
            .map_err(|_| IdentityError::UnknownRole(role_attr.to_string()))?;

        let caller = Caller::new(identity, role);
        Ok(match ctx.attribute(&self.names.clinic) {
            Some(clinic) if !clinic.is_empty() => caller.with_clinic(clinic),
            _ => caller,
        })
    }
}
