use std::collections::{HashMap, VecDeque};

use serde::Serialize;

/// Kind of database object a node represents.
///
/// Variants are declared alphabetically; the derived order keeps the
/// `(schema, kind, name)` tie-break for cycle members deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Aggregate,
    Domain,
    Function,
    Sequence,
    Table,
    View,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Domain => "domain",
            Self::Function => "function",
            Self::Sequence => "sequence",
            Self::Table => "table",
            Self::View => "view",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one node of a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// One object, its direct dependencies, and its creation slot once sorted.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: NodeId,
    pub kind: ObjectKind,
    pub schema: String,
    pub name: String,
    pub dependencies: Vec<NodeId>,
    /// Slot in creation order; `None` until the graph is sorted.
    pub position: Option<usize>,
}

/// Outcome of one sort pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortResult {
    /// Every node in creation order, cycle members last.
    pub order: Vec<NodeId>,
    /// Nodes that never reached zero remaining dependencies.
    pub cycle: Vec<NodeId>,
}

/// Node map plus a reverse adjacency ("dependents") map.
///
/// `add_edge(a, b)` means "a depends on b": b must be produced first.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<(ObjectKind, String, String), NodeId>,
    dependents: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the node for `(kind, schema, name)`, or returns the existing one.
    pub fn add_node(
        &mut self,
        kind: ObjectKind,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> NodeId {
        let key = (kind, schema.into(), name.into());
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(DependencyNode {
            id,
            kind,
            schema: key.1.clone(),
            name: key.2.clone(),
            dependencies: Vec::new(),
            position: None,
        });
        self.index.insert(key, id);
        id
    }

    pub fn lookup(&self, kind: ObjectKind, schema: &str, name: &str) -> Option<NodeId> {
        self.index
            .get(&(kind, schema.to_string(), name.to_string()))
            .copied()
    }

    /// Records that `from` depends on `to`. Duplicate edges collapse; a self
    /// reference does not constrain creation order and is ignored.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if from == to || to.0 >= self.nodes.len() {
            return;
        }
        let Some(node) = self.nodes.get_mut(from.0) else {
            return;
        };
        if !node.dependencies.contains(&to) {
            node.dependencies.push(to);
            self.dependents.entry(to).or_default().push(from);
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creation slot assigned by the last [`sort`](Self::sort).
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(id.0).and_then(|n| n.position)
    }

    /// Kahn's algorithm. In-degree is the number of dependencies a node has;
    /// the ready queue seeds with zero-dependency nodes in insertion order;
    /// emitting a node decrements every dependent. Nodes that never reach
    /// zero are cyclic; they are appended in `(schema, kind, name)` order
    /// with positions continuing after the acyclic nodes.
    pub fn sort(&mut self) -> SortResult {
        for node in &mut self.nodes {
            node.position = None;
        }

        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut ready: VecDeque<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.id)
            .collect();
        let mut order: Vec<NodeId> = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            self.nodes[id.0].position = Some(order.len());
            order.push(id);
            if let Some(dependents) = self.dependents.get(&id) {
                for &dependent in dependents {
                    remaining[dependent.0] -= 1;
                    if remaining[dependent.0] == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        let mut cycle: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.position.is_none())
            .map(|n| n.id)
            .collect();
        cycle.sort_by(|a, b| {
            let a = &self.nodes[a.0];
            let b = &self.nodes[b.0];
            (a.schema.as_str(), a.kind, a.name.as_str())
                .cmp(&(b.schema.as_str(), b.kind, b.name.as_str()))
        });
        for &id in &cycle {
            self.nodes[id.0].position = Some(order.len());
            order.push(id);
        }

        SortResult { order, cycle }
    }

    /// Whether a reference from `source` to `target` must be applied as a
    /// deferred statement: true when `target` is produced after `source`, or
    /// when either position is unknown.
    pub fn should_defer(&self, source: NodeId, target: NodeId) -> bool {
        match (self.position(source), self.position(target)) {
            (Some(source), Some(target)) => target > source,
            _ => true,
        }
    }
}
