//! Allow/deny decisions for inbound calls.
//!
//! | Caller scopes          | Read method | Write method | Unclassified |
//! |------------------------|-------------|--------------|--------------|
//! | `*`                    | allow       | allow        | allow        |
//! | `read` or `public`     | allow       | deny         | deny         |
//! | `write`                | deny        | allow        | deny         |
//! | none / anonymous       | deny        | deny         | deny         |
//!
//! Scopes are independent tags: `write` does not imply `read`. A method is
//! unclassified when its name is malformed, its service is not bound, or its
//! service does not declare it.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::client::{Client, Scope};
use crate::service::{MethodClass, MethodName, ServiceDescriptor};
use crate::{Error, Result};

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the call through.
    Allow,
    /// Refuse it.
    Deny(DenyReason),
}

impl Decision {
    /// Whether the call may proceed.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The method is not declared read or write by any bound service.
    Unclassified,
    /// A read method and the caller has neither `read` nor `public`.
    MissingReadScope,
    /// A write method and the caller lacks `write`.
    MissingWriteScope,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unclassified => "method is not classified",
            Self::MissingReadScope => "read or public scope required",
            Self::MissingWriteScope => "write scope required",
        })
    }
}

/// Decides every call against the classifiers of the bound services.
///
/// Immutable once built, so one instance is shared across all connections
/// without locking.
#[derive(Debug, Clone)]
pub struct Authorizer {
    services: HashMap<&'static str, &'static ServiceDescriptor>,
}

impl Authorizer {
    /// Build from the descriptors of the bound services.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a descriptor is malformed or two
    /// descriptors claim the same service name.
    pub fn new<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'static ServiceDescriptor>,
    {
        let mut services = HashMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if services.insert(descriptor.service, descriptor).is_some() {
                return Err(Error::Config(format!(
                    "Service {} is declared twice",
                    descriptor.service
                )));
            }
        }
        Ok(Self { services })
    }

    /// Classify `method` against the service that owns it.
    #[must_use]
    pub fn classify(&self, method: &str) -> MethodClass {
        MethodName::parse(method)
            .and_then(|name| {
                self.services
                    .get(name.service)
                    .map(|descriptor| descriptor.classify(&name))
            })
            .unwrap_or(MethodClass::Unclassified)
    }

    /// Decide whether `client` may call `method`.
    ///
    /// `None` is an anonymous caller: no scopes at all.
    #[must_use]
    pub fn authorize(&self, method: &str, client: Option<&Client>) -> Decision {
        let identity = client.map_or("anonymous", |c| c.identity.as_str());
        let has = |scope: Scope| client.is_some_and(|c| c.has_scope(scope));

        if has(Scope::Wildcard) {
            debug!(client = identity, method, "Allowed by wildcard scope");
            return Decision::Allow;
        }

        let decision = match self.classify(method) {
            MethodClass::Read if has(Scope::Read) || has(Scope::Public) => Decision::Allow,
            MethodClass::Read => Decision::Deny(DenyReason::MissingReadScope),
            MethodClass::Write if has(Scope::Write) => Decision::Allow,
            MethodClass::Write => Decision::Deny(DenyReason::MissingWriteScope),
            MethodClass::Unclassified => {
                warn!(client = identity, method, "Unclassified method denied");
                return Decision::Deny(DenyReason::Unclassified);
            }
        };

        match decision {
            Decision::Allow => debug!(client = identity, method, "Allowed"),
            Decision::Deny(reason) => debug!(client = identity, method, %reason, "Denied"),
        }
        decision
    }

    /// [`Authorizer::authorize`] as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PermissionDenied` naming the method and the reason.
    pub fn check(&self, method: &str, client: Option<&Client>) -> Result<()> {
        match self.authorize(method, client) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(Error::PermissionDenied(format!("{method}: {reason}"))),
        }
    }
}
