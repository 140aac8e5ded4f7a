//! Dependency graph over converted resources.
//!
//! Nodes are resource ids; an edge `u -> v` means *u depends on v* (v must
//! be reconciled before u). Everything here iterates in id-ascending order
//! — node starts, neighbour visits, tie-breaks — which is what makes the
//! serialized output byte-stable for an unchanged input set.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::resource::Resource;

/// Graph-local failures.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge references unknown node id: {0}")]
    UnknownNode(String),

    #[error("node id {0:?} is not a valid identifier")]
    InvalidNodeId(String),

    /// Each cycle is in canonical rotation (id-minimum member first) with
    /// the entry node repeated at the tail.
    #[error("dependency cycle: {}", .0.first().map(|c| c.join(" -> ")).unwrap_or_default())]
    CycleDetected(Vec<Vec<String>>),
}

/// True when `s` is a valid resource identifier: an expression-language
/// identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_id(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Gray,
    Black,
}

/// Node/edge store with deterministic traversal.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Resource>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under a unique, identifier-valid id.
    pub fn add_node(&mut self, id: impl Into<String>, resource: Resource) -> Result<(), GraphError> {
        let id = id.into();
        if !is_valid_id(&id) {
            return Err(GraphError::InvalidNodeId(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, resource);
        Ok(())
    }

    /// Add `from -> to`: `from` depends on `to`.
    ///
    /// Same-endpoint edges are accepted but never affect ordering.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::UnknownNode(from.to_string()));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphError::UnknownNode(to.to_string()));
        }
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Resource> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.nodes.get_mut(id)
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Direct out-neighbours of `id`, id-ascending.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.edges
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Dependency-first linear order.
    ///
    /// Depth-first post-order over out-edges: a node is emitted only after
    /// everything it depends on. Siblings are visited id-ascending, so the
    /// order is a pure function of the node/edge set.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        let mut colours: BTreeMap<&str, Colour> =
            self.nodes.keys().map(|k| (k.as_str(), Colour::White)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        for id in self.nodes.keys() {
            if colours[id.as_str()] == Colour::White
                && !self.sort_visit(id, &mut colours, &mut order)
            {
                return Err(GraphError::CycleDetected(self.detect_cycles()));
            }
        }
        Ok(order)
    }

    fn sort_visit<'a>(
        &'a self,
        id: &'a str,
        colours: &mut BTreeMap<&'a str, Colour>,
        order: &mut Vec<String>,
    ) -> bool {
        colours.insert(id, Colour::Gray);
        if let Some(deps) = self.edges.get(id) {
            for dep in deps {
                if dep == id {
                    continue;
                }
                match colours[dep.as_str()] {
                    Colour::White => {
                        if !self.sort_visit(dep, colours, order) {
                            return false;
                        }
                    }
                    Colour::Gray => return false,
                    Colour::Black => {}
                }
            }
        }
        colours.insert(id, Colour::Black);
        order.push(id.to_string());
        true
    }

    /// Enumerate distinct cycles.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut adj: BTreeMap<String, BTreeSet<String>> = self
            .nodes
            .keys()
            .map(|k| (k.clone(), BTreeSet::new()))
            .collect();
        for (from, tos) in &self.edges {
            if let Some(set) = adj.get_mut(from) {
                set.extend(tos.iter().cloned());
            }
        }
        detect_cycles_in(&adj)
    }
}

/// Enumerate distinct cycles in a plain adjacency map.
///
/// Three-colour depth-first search; encountering a gray neighbour closes a
/// cycle, reconstructed from the parent chain with the entry node repeated
/// at the tail. Cycles are deduplicated by rotating each to start at its
/// id-minimum member. Shared by the graph and the validator so both report
/// the same canonical cycle.
pub fn detect_cycles_in(adj: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    let mut colours: BTreeMap<&str, Colour> =
        adj.keys().map(|k| (k.as_str(), Colour::White)).collect();
    let mut parents: BTreeMap<&str, &str> = BTreeMap::new();
    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut cycles = Vec::new();

    for id in adj.keys() {
        if colours[id.as_str()] == Colour::White {
            cycle_visit(adj, id, &mut colours, &mut parents, &mut seen, &mut cycles);
        }
    }
    cycles
}

fn cycle_visit<'a>(
    adj: &'a BTreeMap<String, BTreeSet<String>>,
    id: &'a str,
    colours: &mut BTreeMap<&'a str, Colour>,
    parents: &mut BTreeMap<&'a str, &'a str>,
    seen: &mut BTreeSet<Vec<String>>,
    cycles: &mut Vec<Vec<String>>,
) {
    colours.insert(id, Colour::Gray);
    if let Some(deps) = adj.get(id) {
        for dep in deps {
            if dep == id {
                continue;
            }
            match colours.get(dep.as_str()).copied() {
                // Edge to a node outside the map: nothing to traverse.
                None => {}
                Some(Colour::White) => {
                    parents.insert(dep, id);
                    cycle_visit(adj, dep, colours, parents, seen, cycles);
                }
                Some(Colour::Gray) => {
                    // Gray neighbour: dep is an ancestor of id on the
                    // current path. Walk the parent chain back to it.
                    let mut chain = vec![id];
                    let mut cur = id;
                    while cur != dep.as_str() {
                        match parents.get(cur) {
                            Some(p) => {
                                cur = p;
                                chain.push(cur);
                            }
                            None => break,
                        }
                    }
                    chain.reverse();
                    let cycle = canonical_rotation(&chain);
                    if seen.insert(cycle.clone()) {
                        cycles.push(cycle);
                    }
                }
                Some(Colour::Black) => {}
            }
        }
    }
    colours.insert(id, Colour::Black);
}

/// Rotate cycle members so the id-minimum node comes first, then repeat it
/// at the tail to close the cycle.
fn canonical_rotation(members: &[&str]) -> Vec<String> {
    let min_idx = members
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut out: Vec<String> = members[min_idx..]
        .iter()
        .chain(members[..min_idx].iter())
        .map(|s| s.to_string())
        .collect();
    if let Some(first) = out.first().cloned() {
        out.push(first);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn res(kind: &str, name: &str) -> Resource {
        let tree: Value = serde_yaml::from_str(&format!(
            "apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}\n"
        ))
        .unwrap();
        Resource::from_tree(tree, None).unwrap()
    }

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for id in ids {
            g.add_node(*id, res("ConfigMap", id)).unwrap();
        }
        for (from, to) in edges {
            g.add_edge(from, to).unwrap();
        }
        g
    }

    #[test]
    fn identifier_validity() {
        assert!(is_valid_id("webDeployment"));
        assert!(is_valid_id("_x9"));
        assert!(!is_valid_id("9lives"));
        assert!(!is_valid_id("a-b"));
        assert!(!is_valid_id(""));
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut g = DependencyGraph::new();
        g.add_node("a", res("ConfigMap", "a")).unwrap();
        assert!(matches!(
            g.add_node("a", res("ConfigMap", "a")),
            Err(GraphError::DuplicateNode(_))
        ));
    }

    #[test]
    fn edge_requires_existing_endpoints() {
        let mut g = graph(&["a"], &[]);
        assert!(matches!(
            g.add_edge("a", "b"),
            Err(GraphError::UnknownNode(_))
        ));
        assert!(matches!(
            g.add_edge("b", "a"),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn dependencies_come_first() {
        // web depends on cfg: cfg must be emitted before web.
        let g = graph(&["web", "cfg"], &[("web", "cfg")]);
        assert_eq!(g.topological_sort().unwrap(), vec!["cfg", "web"]);
    }

    #[test]
    fn independent_nodes_order_by_id() {
        let g = graph(&["zeta", "alpha", "mid"], &[]);
        assert_eq!(
            g.topological_sort().unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
    }

    #[test]
    fn self_edge_is_inert() {
        let g = graph(&["a", "b"], &[("a", "a"), ("b", "a")]);
        assert_eq!(g.topological_sort().unwrap(), vec!["a", "b"]);
        assert!(g.detect_cycles().is_empty());
    }

    #[test]
    fn cycle_fails_sort_and_is_canonical() {
        let g = graph(&["b", "c", "a"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let err = g.topological_sort().err().unwrap();
        let GraphError::CycleDetected(cycles) = err else {
            panic!("expected cycle");
        };
        assert_eq!(cycles, vec![vec!["a", "b", "c", "a"]]);
        assert_eq!(g.detect_cycles(), cycles);
    }

    #[test]
    fn two_node_cycle_reported_once() {
        let g = graph(&["x", "y"], &[("x", "y"), ("y", "x")]);
        assert_eq!(g.detect_cycles(), vec![vec!["x", "y", "x"]]);
    }

    #[test]
    fn disjoint_cycles_both_reported() {
        let g = graph(
            &["a", "b", "m", "n"],
            &[("a", "b"), ("b", "a"), ("m", "n"), ("n", "m")],
        );
        let cycles = g.detect_cycles();
        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&vec!["a".to_string(), "b".to_string(), "a".to_string()]));
        assert!(cycles.contains(&vec!["m".to_string(), "n".to_string(), "m".to_string()]));
    }

    #[test]
    fn dependencies_of_is_sorted() {
        let g = graph(&["a", "b", "c"], &[("a", "c"), ("a", "b")]);
        assert_eq!(g.dependencies_of("a"), vec!["b", "c"]);
        assert!(g.dependencies_of("b").is_empty());
    }
}
