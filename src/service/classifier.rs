//! Method classification.
//!
//! Every business service declares which of its RPC methods read and which
//! write. A fully-qualified method name has the form
//! `/<package>.<Service>/<Method>`; classification compares the parsed
//! `(service, method)` pair against the declaration exactly, so a service
//! name can never be misread as a pattern.

use std::collections::HashSet;
use std::fmt;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Method names
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed fully-qualified method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodName<'a> {
    /// `<package>.<Service>`
    pub service: &'a str,
    /// `<Method>`
    pub method: &'a str,
}

impl<'a> MethodName<'a> {
    /// Parse `/<package>.<Service>/<Method>` (leading slash optional).
    ///
    /// Returns `None` for anything that is not exactly two non-empty
    /// segments with a dotted service name.
    #[must_use]
    pub fn parse(full: &'a str) -> Option<Self> {
        let path = full.strip_prefix('/').unwrap_or(full);
        let (service, method) = path.split_once('/')?;
        if service.is_empty() || method.is_empty() || method.contains('/') {
            return None;
        }
        if !is_qualified_service(service) {
            return None;
        }
        Some(Self { service, method })
    }
}

impl fmt::Display for MethodName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

/// `<package>.<Service>` with no empty segment.
fn is_qualified_service(service: &str) -> bool {
    service.contains('.') && service.split('.').all(|part| !part.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns and classes
// ─────────────────────────────────────────────────────────────────────────────

/// Exact `(service, method)` pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodPattern {
    service: &'static str,
    method: &'static str,
}

impl MethodPattern {
    /// Pattern for `method` of `service`.
    #[must_use]
    pub const fn new(service: &'static str, method: &'static str) -> Self {
        Self { service, method }
    }

    /// Whether `name` is exactly this method.
    #[must_use]
    pub fn matches(&self, name: &MethodName<'_>) -> bool {
        self.service == name.service && self.method == name.method
    }

    /// Transport path of the method.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl fmt::Display for MethodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

/// Access class of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    /// Matches a declared read method.
    Read,
    /// Matches a declared write method.
    Write,
    /// Declared by nobody; always denied short of a wildcard scope.
    Unclassified,
}

// ─────────────────────────────────────────────────────────────────────────────
// Service descriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Read/write declaration for one business service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Fully-qualified service name, e.g. `orders.OrderService`.
    pub service: &'static str,
    read: &'static [&'static str],
    write: &'static [&'static str],
}

impl ServiceDescriptor {
    /// Declare a service with its read and write methods.
    #[must_use]
    pub const fn new(
        service: &'static str,
        read: &'static [&'static str],
        write: &'static [&'static str],
    ) -> Self {
        Self {
            service,
            read,
            write,
        }
    }

    /// Read methods, in declaration order.
    #[must_use]
    pub fn read_methods(&self) -> Vec<MethodPattern> {
        Self::patterns(self.service, self.read).collect()
    }

    /// Write methods, in declaration order.
    #[must_use]
    pub fn write_methods(&self) -> Vec<MethodPattern> {
        Self::patterns(self.service, self.write).collect()
    }

    fn patterns(
        service: &'static str,
        methods: &'static [&'static str],
    ) -> impl Iterator<Item = MethodPattern> {
        methods.iter().map(move |m| MethodPattern::new(service, *m))
    }

    /// Transport path for `method` on this service.
    #[must_use]
    pub fn path(&self, method: &str) -> String {
        format!("/{}/{method}", self.service)
    }

    /// Whether `name` belongs to this service at all.
    #[must_use]
    pub fn owns(&self, name: &MethodName<'_>) -> bool {
        self.service == name.service
    }

    /// Classify `name`; first match wins, reads before writes.
    #[must_use]
    pub fn classify(&self, name: &MethodName<'_>) -> MethodClass {
        if !self.owns(name) {
            return MethodClass::Unclassified;
        }
        if Self::patterns(self.service, self.read).any(|p| p.matches(name)) {
            MethodClass::Read
        } else if Self::patterns(self.service, self.write).any(|p| p.matches(name)) {
            MethodClass::Write
        } else {
            MethodClass::Unclassified
        }
    }

    /// Check the declaration is well formed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the service name is not
    /// `<package>.<Service>`, a method name is empty or contains `/`, a
    /// method is listed twice, or a method is declared both read and write.
    pub fn validate(&self) -> Result<()> {
        if !is_qualified_service(self.service) || self.service.contains('/') {
            return Err(Error::Config(format!(
                "Service name '{}' must have the form <package>.<Service>",
                self.service
            )));
        }

        let mut seen = HashSet::new();
        for method in self.read.iter().chain(self.write) {
            if method.is_empty() || method.contains('/') {
                return Err(Error::Config(format!(
                    "Invalid method name '{method}' on {}",
                    self.service
                )));
            }
            if !seen.insert(*method) {
                let both = self.read.contains(method) && self.write.contains(method);
                return Err(Error::Config(if both {
                    format!("{}/{method} is declared both read and write", self.service)
                } else {
                    format!("{}/{method} is declared twice", self.service)
                }));
            }
        }
        Ok(())
    }
}
