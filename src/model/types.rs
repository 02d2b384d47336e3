//! Subtype reachability over the declared type hierarchy.

use std::collections::{HashMap, VecDeque};

use crate::model::TypeDef;

/// Directed graph over type names, with an edge from each type to its
/// basetype. `is_subtype` is reachability along those edges.
#[derive(Clone, Debug)]
pub struct TypeGraph {
    index: HashMap<String, usize>,
    adj: Vec<Vec<usize>>,
}

impl TypeGraph {
    pub fn new(types: &[TypeDef]) -> Self {
        let index: HashMap<String, usize> = types
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.name.clone(), idx))
            .collect();
        let mut adj = vec![Vec::new(); types.len()];
        for t in types {
            if let Some(base) = &t.basetype {
                if let (Some(&v), Some(&w)) = (index.get(&t.name), index.get(base)) {
                    adj[v].push(w);
                }
            }
        }
        Self { index, adj }
    }

    /// Whether `t1` is `t2` or a (transitive) subtype of it. Unknown type
    /// names are not subtypes of anything.
    pub fn is_subtype(&self, t1: &str, t2: &str) -> bool {
        let (Some(&start), Some(&target)) = (self.index.get(t1), self.index.get(t2)) else {
            return false;
        };
        let mut queue = VecDeque::from([start]);
        let mut marked = vec![false; self.adj.len()];
        while let Some(v) = queue.pop_front() {
            if v == target {
                return true;
            }
            if !marked[v] {
                marked[v] = true;
                queue.extend(self.adj[v].iter().copied());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str, base: Option<&str>) -> TypeDef {
        TypeDef {
            name: name.to_string(),
            basetype: base.map(|b| b.to_string()),
        }
    }

    #[test]
    fn subtype_is_reflexive_and_transitive() {
        let graph = TypeGraph::new(&[
            ty("object", None),
            ty("item", Some("object")),
            ty("tray", Some("item")),
            ty("place", Some("object")),
        ]);
        assert!(graph.is_subtype("tray", "tray"));
        assert!(graph.is_subtype("tray", "item"));
        assert!(graph.is_subtype("tray", "object"));
        assert!(graph.is_subtype("place", "object"));
        assert!(!graph.is_subtype("object", "tray"));
        assert!(!graph.is_subtype("place", "item"));
    }

    #[test]
    fn unknown_types_are_never_subtypes() {
        let graph = TypeGraph::new(&[ty("object", None)]);
        assert!(!graph.is_subtype("ghost", "object"));
        assert!(!graph.is_subtype("object", "ghost"));
    }
}
