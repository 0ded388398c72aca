//! # Attribute checks
//!
//! Attribute-based checks layered on top of role grants. A constraint names
//! an attribute checker and optionally the value it expects; the checker
//! decides whether the subject satisfies it for the resource in the check
//! context. Unregistered attributes always fail.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::subject::{CheckContext, Subject};

/// Resource owner must be the subject.
pub const OWN: &str = "own";
/// Subject department must match.
pub const DEPARTMENT: &str = "department";
/// Subject location must match.
pub const LOCATION: &str = "location";
/// Subject username must match.
pub const USERNAME: &str = "username";
/// Subject must directly hold a role.
pub const ROLE: &str = "role";

/// Names of the checkers shipped with the crate.
pub const BUILTIN_ATTRIBUTES: [&str; 5] = [OWN, DEPARTMENT, LOCATION, USERNAME, ROLE];

/// A single attribute requirement.
///
/// # Examples
///
/// ```
/// use vireo_permissions::AttributeConstraint;
///
/// let own = AttributeConstraint::own();
/// assert_eq!(own.attribute, "own");
///
/// let dept = AttributeConstraint::new("department").with_value("finance");
/// assert_eq!(dept.to_string(), "department=finance");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeConstraint {
    /// Checker name
    pub attribute: String,

    /// Expected value, if the checker takes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl AttributeConstraint {
    /// Create a constraint without an expected value.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: None,
        }
    }

    /// Set the expected value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The ownership constraint.
    pub fn own() -> Self {
        Self::new(OWN)
    }
}

impl fmt::Display for AttributeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.attribute, value),
            None => f.write_str(&self.attribute),
        }
    }
}

/// A predicate evaluated for one attribute constraint.
///
/// Implemented for any `Fn(&Subject, &CheckContext, Option<&str>) -> bool`,
/// so closures can be registered directly.
pub trait AttributeChecker: Send + Sync {
    /// Decide whether `subject` satisfies the constraint.
    ///
    /// `expected` is the constraint's value, if any.
    fn check(&self, subject: &Subject, context: &CheckContext, expected: Option<&str>) -> bool;
}

impl<F> AttributeChecker for F
where
    F: Fn(&Subject, &CheckContext, Option<&str>) -> bool + Send + Sync,
{
    fn check(&self, subject: &Subject, context: &CheckContext, expected: Option<&str>) -> bool {
        self(subject, context, expected)
    }
}

/// Registry of attribute checkers keyed by attribute name.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use vireo_permissions::{AttributeCheckerRegistry, CheckContext, Subject};
///
/// let mut registry = AttributeCheckerRegistry::with_builtins();
/// registry.register("team", |subject: &Subject, _ctx: &CheckContext, expected: Option<&str>| {
///     expected.map_or(false, |team| subject.in_group(team))
/// });
///
/// let subject = Subject::new(Uuid::now_v7()).with_group("blue");
/// assert!(registry.check("team", &subject, &CheckContext::new(), Some("blue")));
/// assert!(!registry.check("branch", &subject, &CheckContext::new(), None));
/// ```
#[derive(Clone, Default)]
pub struct AttributeCheckerRegistry {
    checkers: HashMap<String, Arc<dyn AttributeChecker>>,
}

impl fmt::Debug for AttributeCheckerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("AttributeCheckerRegistry")
            .field("checkers", &names)
            .finish()
    }
}

impl AttributeCheckerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in checker.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for name in BUILTIN_ATTRIBUTES {
            registry.register_builtin(name);
        }
        registry
    }

    /// Create a registry from the `attributes` configuration toggles.
    ///
    /// Enabled built-ins are registered. Enabled names without a built-in
    /// are left for the application to register; until it does, checks
    /// against them fail.
    pub fn from_toggles(toggles: &BTreeMap<String, bool>) -> Self {
        let mut registry = Self::new();
        for (name, enabled) in toggles {
            if !*enabled {
                continue;
            }
            if !registry.register_builtin(name) {
                tracing::warn!(
                    attribute = %name,
                    "Attribute enabled without a built-in checker; register one or checks will fail"
                );
            }
        }
        registry
    }

    fn register_builtin(&mut self, name: &str) -> bool {
        match name {
            OWN => self.register(OWN, check_own),
            DEPARTMENT => self.register(DEPARTMENT, |s: &Subject, c: &CheckContext, e: Option<&str>| {
                check_matching_attribute(DEPARTMENT, s, c, e)
            }),
            LOCATION => self.register(LOCATION, |s: &Subject, c: &CheckContext, e: Option<&str>| {
                check_matching_attribute(LOCATION, s, c, e)
            }),
            USERNAME => self.register(USERNAME, check_username),
            ROLE => self.register(ROLE, check_role),
            _ => return false,
        }
        true
    }

    /// Register (or replace) the checker for `attribute`.
    pub fn register<C>(&mut self, attribute: impl Into<String>, checker: C)
    where
        C: AttributeChecker + 'static,
    {
        self.checkers.insert(attribute.into(), Arc::new(checker));
    }

    /// Remove the checker for `attribute`.
    ///
    /// # Returns
    ///
    /// `true` if a checker was registered
    pub fn unregister(&mut self, attribute: &str) -> bool {
        self.checkers.remove(attribute).is_some()
    }

    /// Check if a checker is registered for `attribute`.
    pub fn is_registered(&self, attribute: &str) -> bool {
        self.checkers.contains_key(attribute)
    }

    /// Registered attribute names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checkers.keys().map(String::as_str)
    }

    /// Evaluate the checker for `attribute`.
    ///
    /// Unregistered attributes fail closed.
    pub fn check(
        &self,
        attribute: &str,
        subject: &Subject,
        context: &CheckContext,
        expected: Option<&str>,
    ) -> bool {
        match self.checkers.get(attribute) {
            Some(checker) => checker.check(subject, context, expected),
            None => false,
        }
    }

    /// Evaluate a constraint.
    pub fn satisfies(
        &self,
        constraint: &AttributeConstraint,
        subject: &Subject,
        context: &CheckContext,
    ) -> bool {
        self.check(
            &constraint.attribute,
            subject,
            context,
            constraint.value.as_deref(),
        )
    }

    /// Find the first constraint that fails, if any.
    pub fn first_failure<'a, I>(
        &self,
        constraints: I,
        subject: &Subject,
        context: &CheckContext,
    ) -> Option<&'a AttributeConstraint>
    where
        I: IntoIterator<Item = &'a AttributeConstraint>,
    {
        constraints
            .into_iter()
            .find(|constraint| !self.satisfies(constraint, subject, context))
    }
}

fn check_own(subject: &Subject, context: &CheckContext, _expected: Option<&str>) -> bool {
    context.owner_id == Some(subject.id)
}

/// Subject attribute must equal the expected value or, without one, the
/// resource attribute of the same name.
fn check_matching_attribute(
    key: &str,
    subject: &Subject,
    context: &CheckContext,
    expected: Option<&str>,
) -> bool {
    let Some(actual) = subject.attribute(key) else {
        return false;
    };
    match expected.or_else(|| context.attribute(key)) {
        Some(wanted) => actual == wanted,
        None => false,
    }
}

fn check_username(subject: &Subject, _context: &CheckContext, expected: Option<&str>) -> bool {
    match (subject.username.as_deref(), expected) {
        (Some(actual), Some(wanted)) => actual == wanted,
        _ => false,
    }
}

fn check_role(subject: &Subject, _context: &CheckContext, expected: Option<&str>) -> bool {
    expected.map_or(false, |role| subject.has_role(role))
}
