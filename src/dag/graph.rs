// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

/// Structural errors raised while building or validating a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate vertex uid '{0}'")]
    DuplicateUid(String),

    #[error("unknown vertex '{uid}' (referenced by '{referenced_by}')")]
    UnknownVertex { uid: String, referenced_by: String },

    #[error("cycle detected in dependency graph involving vertex '{0}'")]
    Cycle(String),
}

/// A uniquely named vertex plus its declared predecessors.
#[derive(Debug, Clone)]
pub struct Vertex<P> {
    uid: String,
    payload: P,
    predecessors: Vec<String>,
}

impl<P> Vertex<P> {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Declared predecessors, in declaration order.
    pub fn predecessors(&self) -> &[String] {
        &self.predecessors
    }
}

/// Directed graph of uniquely named vertices, built incrementally by any
/// number of contributors and validated once as a whole.
///
/// Predecessors declared through [`DependencyGraph::add_vertex`] may refer to
/// vertices that other contributors have not added yet; they are resolved by
/// [`DependencyGraph::validate`]. Edges declared through
/// [`DependencyGraph::add_edge`] require both endpoints to exist already.
#[derive(Debug, Clone)]
pub struct DependencyGraph<P> {
    vertices: Vec<Vertex<P>>,
    index: HashMap<String, usize>,
    /// `(successor, predecessor)` pairs added by `add_edge`, for rollback.
    edge_log: Vec<(usize, String)>,
}

/// Graph size marker taken by [`DependencyGraph::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    vertices: usize,
    edges: usize,
}

impl<P> Default for DependencyGraph<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> DependencyGraph<P> {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            index: HashMap::new(),
            edge_log: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    /// Insert a new vertex. An existing uid is never overwritten.
    pub fn add_vertex<I, S>(&mut self, uid: &str, payload: P, predecessors: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.index.contains_key(uid) {
            return Err(GraphError::DuplicateUid(uid.to_string()));
        }

        let mut preds: Vec<String> = Vec::new();
        for p in predecessors {
            let p = p.into();
            if !preds.contains(&p) {
                preds.push(p);
            }
        }

        self.index.insert(uid.to_string(), self.vertices.len());
        self.vertices.push(Vertex {
            uid: uid.to_string(),
            payload,
            predecessors: preds,
        });
        debug!(uid, "graph: vertex added");
        Ok(())
    }

    /// Declare `predecessor -> successor`. Both vertices must already exist.
    pub fn add_edge(&mut self, predecessor: &str, successor: &str) -> Result<(), GraphError> {
        if !self.index.contains_key(predecessor) {
            return Err(GraphError::UnknownVertex {
                uid: predecessor.to_string(),
                referenced_by: successor.to_string(),
            });
        }
        let Some(&succ) = self.index.get(successor) else {
            return Err(GraphError::UnknownVertex {
                uid: successor.to_string(),
                referenced_by: predecessor.to_string(),
            });
        };

        let preds = &mut self.vertices[succ].predecessors;
        if !preds.iter().any(|p| p == predecessor) {
            preds.push(predecessor.to_string());
            self.edge_log.push((succ, predecessor.to_string()));
        }
        Ok(())
    }

    /// Remember the current contents, so a contributor that fails halfway
    /// can be undone with [`DependencyGraph::rollback`].
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            vertices: self.vertices.len(),
            edges: self.edge_log.len(),
        }
    }

    /// Drop every vertex and edge added since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        while self.edge_log.len() > checkpoint.edges {
            let Some((succ, pred)) = self.edge_log.pop() else {
                break;
            };
            if let Some(vertex) = self.vertices.get_mut(succ) {
                vertex.predecessors.retain(|p| *p != pred);
            }
        }
        for vertex in self.vertices.drain(checkpoint.vertices.min(self.vertices.len())..) {
            self.index.remove(&vertex.uid);
            debug!(uid = %vertex.uid, "graph: vertex rolled back");
        }
    }

    /// All vertices, in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex<P>> {
        self.vertices.iter()
    }

    pub fn vertex(&self, uid: &str) -> Option<&Vertex<P>> {
        self.index.get(uid).map(|&i| &self.vertices[i])
    }

    /// Direct predecessors of `uid` (empty for unknown vertices).
    pub fn predecessors_of(&self, uid: &str) -> &[String] {
        self.vertex(uid)
            .map(|v| v.predecessors.as_slice())
            .unwrap_or(&[])
    }

    /// Direct successors of `uid`, in insertion order of the successors.
    pub fn successors_of(&self, uid: &str) -> Vec<&str> {
        self.vertices
            .iter()
            .filter(|v| v.predecessors.iter().any(|p| p == uid))
            .map(|v| v.uid.as_str())
            .collect()
    }

    /// Check that every declared predecessor exists and that the graph is
    /// acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.resolve().map(|_| ())
    }

    /// Validate and freeze the graph for scheduling.
    pub fn seal(self) -> Result<SealedGraph<P>, GraphError> {
        let (predecessors, successors) = self.resolve()?;
        Ok(SealedGraph {
            vertices: self.vertices,
            index: self.index,
            predecessors,
            successors,
        })
    }

    /// Graphviz rendering, for diagnostics only.
    pub fn to_dot(&self) -> String {
        render_dot(&self.vertices, &self.index)
    }

    /// Map predecessor uids to indices, then reject cycles.
    fn resolve(&self) -> Result<(Vec<Vec<usize>>, Vec<Vec<usize>>), GraphError> {
        let n = self.vertices.len();
        let mut predecessors = vec![Vec::new(); n];
        let mut successors = vec![Vec::new(); n];

        for (i, vertex) in self.vertices.iter().enumerate() {
            for pred in vertex.predecessors.iter() {
                let Some(&p) = self.index.get(pred) else {
                    return Err(GraphError::UnknownVertex {
                        uid: pred.clone(),
                        referenced_by: vertex.uid.clone(),
                    });
                };
                predecessors[i].push(p);
                successors[p].push(i);
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n, 0);
        for i in 0..n {
            graph.add_node(i);
        }
        for (succ, preds) in predecessors.iter().enumerate() {
            for &pred in preds {
                graph.add_edge(NodeIndex::new(pred), NodeIndex::new(succ), ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            // Prefer a vertex of a non-trivial strongly connected component,
            // which is guaranteed to lie on a cycle.
            let on_cycle = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| {
                    scc.len() > 1
                        || scc
                            .first()
                            .is_some_and(|&node| graph.contains_edge(node, node))
                })
                .and_then(|scc| scc.into_iter().min())
                .unwrap_or_else(|| cycle.node_id());
            return Err(GraphError::Cycle(
                self.vertices[on_cycle.index()].uid.clone(),
            ));
        }

        Ok((predecessors, successors))
    }
}

/// A validated, immutable dependency graph.
///
/// Only produced by [`DependencyGraph::seal`], so holding one proves the
/// graph is acyclic and every edge is resolved.
#[derive(Debug)]
pub struct SealedGraph<P> {
    vertices: Vec<Vertex<P>>,
    index: HashMap<String, usize>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
}

impl<P> SealedGraph<P> {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn index_of(&self, uid: &str) -> Option<usize> {
        self.index.get(uid).copied()
    }

    pub fn vertex_at(&self, index: usize) -> &Vertex<P> {
        &self.vertices[index]
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex<P>> {
        self.vertices.iter()
    }

    pub fn predecessor_indices(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    /// Successors, in insertion order.
    pub fn successor_indices(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    pub fn to_dot(&self) -> String {
        render_dot(&self.vertices, &self.index)
    }
}

fn render_dot<P>(vertices: &[Vertex<P>], index: &HashMap<String, usize>) -> String {
    let mut graph: DiGraph<&str, &str> = DiGraph::with_capacity(vertices.len(), 0);
    for v in vertices {
        graph.add_node(v.uid.as_str());
    }
    for (succ, v) in vertices.iter().enumerate() {
        for pred in v.predecessors.iter() {
            // Unresolved predecessors are left out of the picture.
            if let Some(&p) = index.get(pred) {
                graph.add_edge(NodeIndex::new(p), NodeIndex::new(succ), "");
            }
        }
    }
    format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
}
