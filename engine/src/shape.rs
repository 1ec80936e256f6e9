//! Protection shapes
//!
//! A shape is the full set of restrictions on an item: action -> (level,
//! expiry). The engine only ever moves between two shapes, the empty one and
//! indefinite semi-protection on `edit`.
//!
//! An action reported with more than one restriction (own protection plus a
//! cascading one, say) is kept as conflicting. Such a shape never equals
//! either target shape.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The restricted action the engine manages
pub const EDIT_ACTION: &str = "edit";

/// Level that restricts editing to established accounts
pub const SEMI_LEVEL: &str = "autoconfirmed";

/// Expiry of an indefinite protection
pub const INDEFINITE: &str = "infinity";

/// Level that lifts a restriction when passed to the mutation API
pub const OPEN_LEVEL: &str = "all";

/// One restriction: who may perform the action and until when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub level: String,
    pub expiry: String,
}

impl Restriction {
    pub fn new(level: impl Into<String>, expiry: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            expiry: expiry.into(),
        }
    }
}

/// Complete protection state of an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionShape {
    restrictions: BTreeMap<String, Restriction>,
    conflicting: BTreeSet<String>,
}

impl ProtectionShape {
    /// Build from every reported restriction. A repeated action is recorded
    /// as conflicting instead of being overwritten.
    pub fn from_entries<A, I>(entries: I) -> Self
    where
        A: Into<String>,
        I: IntoIterator<Item = (A, Restriction)>,
    {
        let mut shape = Self::unprotected();
        for (action, restriction) in entries {
            let action = action.into();
            if shape.restrictions.contains_key(&action) {
                shape.conflicting.insert(action);
            } else {
                shape.restrictions.insert(action, restriction);
            }
        }
        shape
    }

    /// No restrictions at all
    pub fn unprotected() -> Self {
        Self::default()
    }

    /// Indefinite semi-protection on edit, nothing else
    pub fn semi_protected() -> Self {
        Self::unprotected().with(EDIT_ACTION, Restriction::new(SEMI_LEVEL, INDEFINITE))
    }

    /// Builder: add or replace a restriction
    pub fn with(mut self, action: impl Into<String>, restriction: Restriction) -> Self {
        self.restrictions.insert(action.into(), restriction);
        self
    }

    /// Builder: drop a restriction if present. Conflicts are kept.
    pub fn without(mut self, action: &str) -> Self {
        self.restrictions.remove(action);
        self
    }

    pub fn is_unprotected(&self) -> bool {
        self.restrictions.is_empty() && self.conflicting.is_empty()
    }
}

impl fmt::Display for ProtectionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut sep = "";
        for (action, r) in &self.restrictions {
            write!(f, "{sep}'{action}': ('{}', '{}')", r.level, r.expiry)?;
            sep = ", ";
        }
        for action in &self.conflicting {
            write!(f, "{sep}'{action}': <multiple>")?;
            sep = ", ";
        }
        write!(f, "}}")
    }
}

/// A requested protection change, as sent to the catalog API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionRequest {
    /// Action being restricted or opened
    pub action: String,
    /// Target level; [`OPEN_LEVEL`] lifts the restriction
    pub level: String,
    /// Expiry for a restriction; `None` when lifting
    pub expiry: Option<String>,
    /// Edit summary recorded in the protection log
    pub reason: String,
}

impl ProtectionRequest {
    /// Restricted edit, indefinite duration
    pub fn semi_protect(reason: impl Into<String>) -> Self {
        Self {
            action: EDIT_ACTION.to_string(),
            level: SEMI_LEVEL.to_string(),
            expiry: Some(INDEFINITE.to_string()),
            reason: reason.into(),
        }
    }

    /// Fully open
    pub fn unprotect(reason: impl Into<String>) -> Self {
        Self {
            action: EDIT_ACTION.to_string(),
            level: OPEN_LEVEL.to_string(),
            expiry: None,
            reason: reason.into(),
        }
    }

    pub fn is_lift(&self) -> bool {
        self.level == OPEN_LEVEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semi_protected_shape() {
        let shape = ProtectionShape::semi_protected();
        assert!(!shape.is_unprotected());
        assert_eq!(
            shape,
            ProtectionShape::from_entries([("edit", Restriction::new("autoconfirmed", "infinity"))])
        );
    }

    #[test]
    fn test_repeated_action_is_conflicting() {
        let shape = ProtectionShape::from_entries([
            ("edit", Restriction::new(SEMI_LEVEL, INDEFINITE)),
            ("edit", Restriction::new("sysop", INDEFINITE)),
        ]);
        assert_ne!(shape, ProtectionShape::semi_protected());
        assert!(!shape.clone().without(EDIT_ACTION).is_unprotected());
        assert_eq!(
            shape.to_string(),
            "{'edit': ('autoconfirmed', 'infinity'), 'edit': <multiple>}"
        );
    }

    #[test]
    fn test_with_and_without_round_trip_to_unprotected() {
        let lifted = ProtectionShape::semi_protected().without(EDIT_ACTION);
        assert_eq!(lifted, ProtectionShape::unprotected());
    }

    #[test]
    fn test_extra_restriction_breaks_equality() {
        let shape = ProtectionShape::semi_protected()
            .with("move", Restriction::new("sysop", INDEFINITE));
        assert_ne!(shape, ProtectionShape::semi_protected());
        assert_ne!(shape.without(EDIT_ACTION), ProtectionShape::unprotected());
    }

    #[test]
    fn test_display() {
        assert_eq!(ProtectionShape::unprotected().to_string(), "{}");
        assert_eq!(
            ProtectionShape::semi_protected().to_string(),
            "{'edit': ('autoconfirmed', 'infinity')}"
        );
    }

    #[test]
    fn test_requests() {
        assert!(ProtectionRequest::unprotect("x").is_lift());
        let add = ProtectionRequest::semi_protect("y");
        assert!(!add.is_lift());
        assert_eq!(add.expiry.as_deref(), Some(INDEFINITE));
    }
}
