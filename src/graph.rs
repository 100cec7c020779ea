//! Dependency graph (C3): built fresh from persisted cells on every edit,
//! never cached across edits (§5, "Shared resources").

use crate::address::Address;
use crate::error::CoreError;
use crate::formula;
use crate::model::Cell;
use std::collections::{BTreeSet, HashMap, HashSet};

/// `G[addr]` is the set of cells `addr` depends on. Leaf cells (no
/// dependencies) need not appear as keys.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    deps: HashMap<Address, BTreeSet<Address>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            deps: HashMap::new(),
        }
    }

    /// Build the graph from every FORMULA cell in the given collection.
    pub fn build<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Result<Self, CoreError> {
        let mut deps = HashMap::new();
        for cell in cells {
            if cell.is_formula() {
                deps.insert(cell.addr, formula::extract_refs(&cell.raw)?);
            }
        }
        Ok(DependencyGraph { deps })
    }

    pub fn dependencies_of(&self, addr: Address) -> BTreeSet<Address> {
        self.deps.get(&addr).cloned().unwrap_or_default()
    }

    pub fn set_dependencies(&mut self, addr: Address, deps: BTreeSet<Address>) {
        if deps.is_empty() {
            self.deps.remove(&addr);
        } else {
            self.deps.insert(addr, deps);
        }
    }

    /// Dependency-ordered topological sort: every address appears after all
    /// of its dependencies. Fails with [`CoreError::Cycle`] naming the
    /// offending address.
    pub fn topo_sort(&self) -> Result<Vec<Address>, CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Visited,
        }

        let mut marks: HashMap<Address, Mark> = HashMap::new();
        let mut order = Vec::new();

        // Nodes with empty dependency sets only appear as values; collect
        // every node mentioned anywhere so they are all ordered.
        let mut nodes: BTreeSet<Address> = self.deps.keys().copied().collect();
        for deps in self.deps.values() {
            nodes.extend(deps.iter().copied());
        }

        fn visit(
            node: Address,
            deps: &HashMap<Address, BTreeSet<Address>>,
            marks: &mut HashMap<Address, Mark>,
            order: &mut Vec<Address>,
        ) -> Result<(), CoreError> {
            match marks.get(&node) {
                Some(Mark::Visited) => return Ok(()),
                Some(Mark::Visiting) => return Err(CoreError::Cycle(node)),
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            if let Some(children) = deps.get(&node) {
                for &child in children {
                    visit(child, deps, marks, order)?;
                }
            }
            marks.insert(node, Mark::Visited);
            order.push(node);
            Ok(())
        }

        for node in nodes {
            visit(node, &self.deps, &mut marks, &mut order)?;
        }

        Ok(order)
    }

    /// Would setting `src`'s dependencies to `new_deps` introduce a cycle?
    /// Self-reference counts as a cycle.
    pub fn would_create_cycle(&self, src: Address, new_deps: &BTreeSet<Address>) -> bool {
        if new_deps.contains(&src) {
            return true;
        }
        let mut clone = self.clone();
        clone.set_dependencies(src, new_deps.clone());
        clone.topo_sort().is_err()
    }

    /// All addresses transitively reachable from `target` by reversed
    /// edges (i.e. everything that depends on `target`, directly or not).
    /// Terminates even over a graph that is not yet acyclic.
    pub fn transitive_dependents(&self, target: Address) -> BTreeSet<Address> {
        let mut reverse: HashMap<Address, Vec<Address>> = HashMap::new();
        for (&node, deps) in &self.deps {
            for &dep in deps {
                reverse.entry(dep).or_default().push(node);
            }
        }

        let mut result = BTreeSet::new();
        let mut visited: HashSet<Address> = HashSet::new();
        let mut stack = vec![target];
        visited.insert(target);

        while let Some(node) = stack.pop() {
            if let Some(parents) = reverse.get(&node) {
                for &parent in parents {
                    if visited.insert(parent) {
                        result.insert(parent);
                        stack.push(parent);
                    }
                }
            }
        }

        result
    }
}
