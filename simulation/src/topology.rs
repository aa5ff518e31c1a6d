//! Radio topologies
//!
//! A [`Mesh`] says who can hear whom. It is independent of payment
//! channels: two nodes in radio range only pay each other once a channel is
//! open between them.
//!
//! - Line, ring, star and full mesh via [`MeshBuilder`]
//! - Random with a connection probability and seed
//! - Custom from an edge list via [`from_edges`]

use std::collections::{BTreeMap, BTreeSet};

use payroute_core::SimulationIdentity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{SimError, SimResult};

pub type NodeId = SimulationIdentity;

/// Symmetric radio adjacency
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.adjacency.entry(id).or_default();
    }

    /// Put `a` and `b` in range of each other; self-loops are ignored
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Take `a` and `b` out of range; returns whether they were connected
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) -> bool {
        let removed = self
            .adjacency
            .get_mut(&a)
            .map(|n| n.remove(&b))
            .unwrap_or(false);
        if let Some(n) = self.adjacency.get_mut(&b) {
            n.remove(&a);
        }
        removed
    }

    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.get(&id).into_iter().flatten().copied()
    }

    pub fn are_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency
            .get(&a)
            .map(|n| n.contains(&b))
            .unwrap_or(false)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.adjacency.contains_key(&id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.adjacency.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Undirected edges, each listed once with the smaller id first
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.adjacency
            .iter()
            .flat_map(|(a, ns)| ns.iter().filter(move |b| a < *b).map(move |b| (*a, *b)))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Mesh Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count()));
        output.push_str(&format!("  Edges: {}\n\n", self.edge_count()));
        for (id, neighbors) in &self.adjacency {
            let names: Vec<String> = neighbors.iter().map(|n| n.to_string()).collect();
            output.push_str(&format!("  {} -> [{}]\n", id, names.join(", ")));
        }
        output
    }
}

/// Builder for named topologies over nodes `A..`
pub struct MeshBuilder {
    nodes: Vec<NodeId>,
}

impl MeshBuilder {
    /// `node_count` nodes named A, B, C, ...
    pub fn new(node_count: usize) -> SimResult<Self> {
        if !(1..=SimulationIdentity::MAX_NODES).contains(&node_count) {
            return Err(SimError::TopologySize(node_count));
        }
        Ok(Self {
            nodes: SimulationIdentity::first_n(node_count),
        })
    }

    fn empty(&self) -> Mesh {
        let mut mesh = Mesh::new();
        for node in &self.nodes {
            mesh.add_node(*node);
        }
        mesh
    }

    /// A - B - C - ...
    pub fn line(self) -> Mesh {
        let mut mesh = self.empty();
        for pair in self.nodes.windows(2) {
            mesh.connect(pair[0], pair[1]);
        }
        mesh
    }

    /// A line with the ends joined
    pub fn ring(self) -> Mesh {
        let mut mesh = self.empty();
        for i in 0..self.nodes.len() {
            mesh.connect(self.nodes[i], self.nodes[(i + 1) % self.nodes.len()]);
        }
        mesh
    }

    /// A in the middle, everyone else a spoke
    pub fn star(self) -> Mesh {
        let mut mesh = self.empty();
        if let Some((center, spokes)) = self.nodes.split_first() {
            for spoke in spokes {
                mesh.connect(*center, *spoke);
            }
        }
        mesh
    }

    pub fn full_mesh(self) -> Mesh {
        let mut mesh = self.empty();
        for (i, a) in self.nodes.iter().enumerate() {
            for b in &self.nodes[i + 1..] {
                mesh.connect(*a, *b);
            }
        }
        mesh
    }

    /// Each pair connected with probability `p`; isolated nodes are then
    /// attached to their successor so nobody is unreachable
    pub fn random(self, p: f64, seed: u64) -> Mesh {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mesh = self.empty();
        for (i, a) in self.nodes.iter().enumerate() {
            for b in &self.nodes[i + 1..] {
                if rng.random_bool(p.clamp(0.0, 1.0)) {
                    mesh.connect(*a, *b);
                }
            }
        }
        let n = self.nodes.len();
        for i in 0..n {
            if n > 1 && mesh.neighbors(self.nodes[i]).next().is_none() {
                mesh.connect(self.nodes[i], self.nodes[(i + 1) % n]);
            }
        }
        mesh
    }
}

/// Mesh from an edge list of node letters
pub fn from_edges(edges: &[(char, char)]) -> SimResult<Mesh> {
    let mut mesh = Mesh::new();
    for &(a, b) in edges {
        let a = SimulationIdentity::new(a).ok_or(SimError::InvalidNode(a))?;
        let b = SimulationIdentity::new(b).ok_or(SimError::InvalidNode(b))?;
        mesh.connect(a, b);
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(c: char) -> NodeId {
        SimulationIdentity::new(c).unwrap()
    }

    #[test]
    fn test_line_topology() {
        let mesh = MeshBuilder::new(4).unwrap().line();
        assert_eq!(mesh.node_count(), 4);
        assert_eq!(mesh.edge_count(), 3);
        assert!(mesh.are_connected(node('B'), node('C')));
        assert!(!mesh.are_connected(node('A'), node('D')));
    }

    #[test]
    fn test_ring_and_star() {
        let ring = MeshBuilder::new(4).unwrap().ring();
        assert_eq!(ring.edge_count(), 4);
        assert!(ring.are_connected(node('D'), node('A')));

        let star = MeshBuilder::new(5).unwrap().star();
        assert_eq!(star.neighbors(node('A')).count(), 4);
        assert_eq!(star.neighbors(node('C')).collect::<Vec<_>>(), vec![node('A')]);
    }

    #[test]
    fn test_full_mesh() {
        let mesh = MeshBuilder::new(4).unwrap().full_mesh();
        assert_eq!(mesh.edge_count(), 6);
    }

    #[test]
    fn test_random_is_seeded_and_connected() {
        let a = MeshBuilder::new(8).unwrap().random(0.2, 7);
        let b = MeshBuilder::new(8).unwrap().random(0.2, 7);
        assert_eq!(a.edges(), b.edges());
        for id in a.node_ids() {
            assert!(a.neighbors(id).next().is_some(), "{id} is isolated");
        }
    }

    #[test]
    fn test_builder_rejects_bad_sizes() {
        assert!(matches!(MeshBuilder::new(0), Err(SimError::TopologySize(0))));
        assert!(matches!(MeshBuilder::new(27), Err(SimError::TopologySize(27))));
    }

    #[test]
    fn test_from_edges_and_disconnect() {
        let mut mesh = from_edges(&[('A', 'B'), ('A', 'C'), ('B', 'C'), ('B', 'D')]).unwrap();
        assert_eq!(mesh.node_count(), 4);
        assert_eq!(mesh.edge_count(), 4);

        assert!(mesh.disconnect(node('B'), node('C')));
        assert!(!mesh.are_connected(node('C'), node('B')));
        assert!(!mesh.disconnect(node('B'), node('C')));

        assert!(matches!(from_edges(&[('A', '1')]), Err(SimError::InvalidNode('1'))));
    }
}
