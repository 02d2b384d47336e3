//! The in-memory planning model: literals, action schemas and tasks.
//!
//! Everything here is an immutable value object with structural equality.
//! Repairs never mutate a schema in place; they build a new one, so identical
//! edits across diagnosis attempts never alias.

pub mod error;
mod types;

use std::fmt;

use itertools::Itertools;
use serde::Serialize;

pub use error::ModelError;
pub use types::TypeGraph;

/// A predicate applied to an ordered tuple of argument names, with a
/// polarity flag. Arguments are schema parameters (`?x`) in lifted literals
/// and object names in ground ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Literal {
    pub predicate: String,
    pub args: Vec<String>,
    pub negated: bool,
}

impl Literal {
    pub fn positive(
        predicate: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            predicate: predicate.into(),
            args: args.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn negative(
        predicate: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            negated: true,
            ..Self::positive(predicate, args)
        }
    }

    /// Flips the polarity. Its own inverse.
    pub fn negate(&self) -> Self {
        Self {
            negated: !self.negated,
            ..self.clone()
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "(not {})", self.negate())
        } else if self.args.is_empty() {
            write!(f, "({})", self.predicate)
        } else {
            write!(f, "({} {})", self.predicate, self.args.iter().join(" "))
        }
    }
}

/// A named object (or schema parameter) with its declared type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypedObject {
    pub name: String,
    pub ty: String,
}

impl TypedObject {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

impl fmt::Display for TypedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.ty)
    }
}

/// A type declaration; `basetype` is `None` only for the root type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    pub basetype: Option<String>,
}

/// A predicate declaration from the domain's `:predicates` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredicateDecl {
    pub name: String,
    pub parameters: Vec<TypedObject>,
}

/// One effect of an action schema. The parameter list is carried only so the
/// consistency checker can reject conditional effects; the parser never
/// produces a non-empty one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effect {
    pub parameters: Vec<TypedObject>,
    pub literal: Literal,
}

impl Effect {
    pub fn new(literal: Literal) -> Self {
        Self {
            parameters: Vec::new(),
            literal,
        }
    }
}

/// An action template with free parameters. Immutable: every repair builds a
/// new schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionSchema {
    pub name: String,
    pub parameters: Vec<TypedObject>,
    /// Conjunction of literals, possibly singleton or empty.
    pub precondition: Vec<Literal>,
    pub effects: Vec<Effect>,
    pub cost: Option<f64>,
}

/// A parsed domain + problem pair.
#[derive(Clone, Debug)]
pub struct Task {
    pub domain_name: String,
    pub problem_name: String,
    pub requirements: Vec<String>,
    pub types: Vec<TypeDef>,
    pub constants: Vec<TypedObject>,
    /// Problem objects plus domain constants.
    pub objects: Vec<TypedObject>,
    pub predicates: Vec<PredicateDecl>,
    pub actions: Vec<ActionSchema>,
    pub init: Vec<Literal>,
    pub goal: Vec<Literal>,
}

impl Task {
    pub fn action(&self, name: &str) -> Option<&ActionSchema> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn object(&self, name: &str) -> Option<&TypedObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn type_graph(&self) -> TypeGraph {
        TypeGraph::new(&self.types)
    }

    /// Re-serializes the domain part (with whatever repairs have been folded
    /// into `actions`) back into the domain description format.
    pub fn domain_pddl(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("(define (domain {})\n", self.domain_name));
        if !self.requirements.is_empty() {
            out.push_str(&format!(
                "  (:requirements {})\n",
                self.requirements.iter().join(" ")
            ));
        }
        let named_types: Vec<&TypeDef> =
            self.types.iter().filter(|t| t.basetype.is_some()).collect();
        if !named_types.is_empty() {
            out.push_str("  (:types\n");
            for t in named_types {
                out.push_str(&format!(
                    "    {} - {}\n",
                    t.name,
                    t.basetype.as_deref().unwrap_or("object")
                ));
            }
            out.push_str("  )\n");
        }
        if !self.constants.is_empty() {
            out.push_str("  (:constants\n");
            for c in &self.constants {
                out.push_str(&format!("    {}\n", c));
            }
            out.push_str("  )\n");
        }
        if !self.predicates.is_empty() {
            out.push_str("  (:predicates\n");
            for p in &self.predicates {
                let params = p.parameters.iter().map(|o| format!(" {}", o)).join("");
                out.push_str(&format!("    ({}{})\n", p.name, params));
            }
            out.push_str("  )\n");
        }
        for a in &self.actions {
            out.push_str(&format!("  (:action {}\n", a.name));
            let params = a.parameters.iter().map(|p| p.to_string()).join(" ");
            out.push_str(&format!("    :parameters ({})\n", params));
            out.push_str(&format!(
                "    :precondition (and{})\n",
                a.precondition.iter().map(|l| format!(" {}", l)).join("")
            ));
            let mut effects = a
                .effects
                .iter()
                .map(|e| format!(" {}", e.literal))
                .join("");
            if let Some(cost) = a.cost {
                effects.push_str(&format!(" (increase (total-cost) {})", cost));
            }
            out.push_str(&format!("    :effect (and{})\n", effects));
            out.push_str("  )\n");
        }
        out.push_str(")\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn negate_is_involutive() {
        let lit = Literal::positive("at", ["?t", "?p"]);
        assert_eq!(lit.negate().negate(), lit);
        assert!(lit.negate().negated);
    }

    #[test]
    fn literal_equality_is_structural() {
        let a = Literal::positive("at", ["t1", "kitchen"]);
        let b = Literal::positive("at", ["t1", "kitchen"]);
        let c = Literal::positive("at", ["kitchen", "t1"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.negate());
    }

    #[test]
    fn literal_display() {
        assert_eq!(
            Literal::positive("at", ["?t", "kitchen"]).to_string(),
            "(at ?t kitchen)"
        );
        assert_eq!(
            Literal::negative("at", ["?t", "kitchen"]).to_string(),
            "(not (at ?t kitchen))"
        );
        assert_eq!(
            Literal::positive("rain", Vec::<String>::new()).to_string(),
            "(rain)"
        );
    }
}
