//! Atomic repair components over action schemas.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use serde::Serialize;

use crate::model::{ActionSchema, Effect, Literal};

/// What a component edits. An `AddEffect` of a negated literal introduces a
/// delete-effect; `RemoveEffect` is the logical complement of `AddEffect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ComponentKind {
    RemovePrecondition,
    AddEffect,
    RemoveEffect,
}

/// An atomic edit of one action schema: remove a lifted literal from the
/// precondition, or add/remove one in the effect list.
///
/// `condition` marks a component that is required only conditionally on
/// itself already being part of the candidate; it is set only during conflict
/// extraction and never participates in equality, hashing or ordering.
#[derive(Clone, Debug, Serialize)]
pub struct Component {
    pub action: String,
    pub atom: Literal,
    pub kind: ComponentKind,
    pub condition: bool,
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.action == other.action && self.atom == other.atom
    }
}

impl Eq for Component {}

impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.action.hash(state);
        self.atom.hash(state);
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.action.cmp(&other.action))
            .then_with(|| self.atom.cmp(&other.atom))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Component {
    pub fn remove_precondition(action: impl Into<String>, atom: Literal) -> Self {
        Self {
            action: action.into(),
            atom,
            kind: ComponentKind::RemovePrecondition,
            condition: false,
        }
    }

    pub fn add_effect(action: impl Into<String>, atom: Literal) -> Self {
        Self {
            action: action.into(),
            atom,
            kind: ComponentKind::AddEffect,
            condition: false,
        }
    }

    pub fn remove_effect(action: impl Into<String>, atom: Literal) -> Self {
        Self {
            action: action.into(),
            atom,
            kind: ComponentKind::RemoveEffect,
            condition: false,
        }
    }

    /// A copy marked as conditional.
    pub fn conditional(&self) -> Self {
        Self {
            condition: true,
            ..self.clone()
        }
    }

    /// Applies the edit, producing a new schema. The component must target
    /// the schema it is applied to.
    pub fn apply(&self, schema: &ActionSchema) -> ActionSchema {
        assert_eq!(
            self.action, schema.name,
            "component targets {} but was applied to {}",
            self.action, schema.name
        );
        let mut schema = schema.clone();
        match self.kind {
            ComponentKind::RemovePrecondition => {
                schema.precondition.retain(|l| *l != self.atom);
            }
            ComponentKind::AddEffect => {
                schema.effects.push(Effect::new(self.atom.clone()));
            }
            ComponentKind::RemoveEffect => {
                schema.effects.retain(|e| e.literal != self.atom);
            }
        }
        schema
    }

    /// The logically opposite component(s). An added effect can be undone
    /// either by retracting the addition or by adding the opposite-polarity
    /// effect, so the result is a set. Undefined (empty) for
    /// precondition-removal components.
    pub fn negate(&self) -> Vec<Component> {
        match self.kind {
            ComponentKind::RemovePrecondition => Vec::new(),
            ComponentKind::AddEffect => vec![
                Self::remove_effect(self.action.clone(), self.atom.clone()),
                Self::add_effect(self.action.clone(), self.atom.negate()),
            ],
            ComponentKind::RemoveEffect => {
                vec![Self::add_effect(self.action.clone(), self.atom.clone())]
            }
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edit = match self.kind {
            ComponentKind::RemovePrecondition => {
                format!("Remove {} from precondition: {}", self.atom, self.action)
            }
            ComponentKind::AddEffect => {
                format!("Add {} to effects: {}", self.atom, self.action)
            }
            ComponentKind::RemoveEffect => {
                format!("Remove {} from effects: {}", self.atom, self.action)
            }
        };
        write!(f, "<Component: {} | Condition: {}>", edit, self.condition)
    }
}
