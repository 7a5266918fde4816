use crate::bio::iupac::{code_nucleotide, iupac_match};
use crate::kmer::encoding::{check_k, KmerIter, KmerWord};
use crate::{ObiError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Default number of edge traversals explored by the heaviest-path search
/// on graphs that still hold a cycle.
pub const DEFAULT_PATH_BUDGET: usize = 1_000_000;

/// De Bruijn graph over `(k-1)`-mer nodes.
///
/// Edges are the k-mers of the pushed sequences, weighted by their number
/// of occurrences. An edge `e` links node `e >> 2` to node `e & mask(k-1)`.
#[derive(Debug, Clone)]
pub struct DeBruijnGraph {
    k: usize,
    edge_mask: u64,
    node_mask: u64,
    edges: FxHashMap<u64, u32>,
}

impl DeBruijnGraph {
    pub fn new(k: usize) -> Result<Self> {
        check_k::<u64>(k)?;
        if k < 2 {
            return Err(ObiError::Graph(format!("k-mer size {} is too small for a graph", k)));
        }
        Ok(Self {
            k,
            edge_mask: u64::mask(k),
            node_mask: u64::mask(k - 1),
            edges: FxHashMap::default(),
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn weight(&self, edge: u64) -> u32 {
        self.edges.get(&edge).copied().unwrap_or(0)
    }

    /// Adds one walk along the k-mers of `sequence`.
    pub fn push(&mut self, sequence: &[u8]) {
        self.push_weighted(sequence, 1);
    }

    /// Adds `weight` walks along the k-mers of `sequence`.
    pub fn push_weighted(&mut self, sequence: &[u8], weight: u32) {
        let Ok(kmers) = KmerIter::<u64>::new(sequence, self.k, false) else {
            return;
        };
        for kmer in kmers {
            *self.edges.entry(kmer.forward).or_default() += weight;
        }
    }

    pub fn source(&self, edge: u64) -> u64 {
        edge >> 2
    }

    pub fn target(&self, edge: u64) -> u64 {
        edge & self.node_mask
    }

    pub fn nodes(&self) -> FxHashSet<u64> {
        let mut nodes = FxHashSet::default();
        for &e in self.edges.keys() {
            nodes.insert(self.source(e));
            nodes.insert(self.target(e));
        }
        nodes
    }

    /// Outgoing `(edge, target, weight)` triples of `node`.
    pub fn successors(&self, node: u64) -> impl Iterator<Item = (u64, u64, u32)> + '_ {
        (0..4u64).filter_map(move |code| {
            let edge = ((node << 2) | code) & self.edge_mask;
            self.edges.get(&edge).map(|&w| (edge, edge & self.node_mask, w))
        })
    }

    /// Incoming `(edge, source, weight)` triples of `node`.
    pub fn predecessors(&self, node: u64) -> impl Iterator<Item = (u64, u64, u32)> + '_ {
        let shift = 2 * (self.k - 1);
        (0..4u64).filter_map(move |code| {
            let edge = (code << shift) | node;
            self.edges.get(&edge).map(|&w| (edge, edge >> 2, w))
        })
    }

    /// Number of edges per weight.
    pub fn spectrum(&self) -> BTreeMap<u32, usize> {
        let mut spectrum = BTreeMap::new();
        for &w in self.edges.values() {
            *spectrum.entry(w).or_default() += 1;
        }
        spectrum
    }

    pub fn min_weight(&self) -> u32 {
        self.edges.values().copied().min().unwrap_or(0)
    }

    pub fn max_weight(&self) -> u32 {
        self.edges.values().copied().max().unwrap_or(0)
    }

    /// Mean edge weight over the weight spectrum.
    pub fn mean_weight(&self) -> f64 {
        if self.edges.is_empty() {
            return 0.0;
        }
        let total: u64 = self.edges.values().map(|&w| w as u64).sum();
        total as f64 / self.edges.len() as f64
    }

    /// Removes edges lighter than `min`.
    pub fn filter_min_weight(&mut self, min: u32) {
        self.edges.retain(|_, w| *w >= min);
    }

    /// Removes edges heavier than `max`.
    pub fn filter_max_weight(&mut self, max: u32) {
        self.edges.retain(|_, w| *w <= max);
    }

    /// Kahn ordering of the nodes; `None` when a cycle prevents it.
    fn topological_order(&self) -> Option<Vec<u64>> {
        let nodes = self.nodes();
        let mut in_degree: FxHashMap<u64, usize> = nodes.iter().map(|&n| (n, 0)).collect();
        for &e in self.edges.keys() {
            *in_degree.entry(self.target(e)).or_default() += 1;
        }
        let mut ready: VecDeque<u64> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(node) = ready.pop_front() {
            order.push(node);
            for (_, target, _) in self.successors(node) {
                if let Some(d) = in_degree.get_mut(&target) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(target);
                    }
                }
            }
        }
        (order.len() == nodes.len()).then_some(order)
    }

    /// True when some node keeps a non-zero in-degree once every node
    /// reachable from an in-degree-0 node has been peeled off.
    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_none()
    }

    fn matches_prefix(&self, node: u64, pattern: &[u8], max_mismatches: usize) -> bool {
        let n = self.k - 1;
        let len = pattern.len().min(n);
        let mismatches = (0..len)
            .filter(|&i| !iupac_match(code_nucleotide(node.code_at(i, n)), pattern[i]))
            .count();
        mismatches <= max_mismatches
    }

    fn matches_suffix(&self, node: u64, pattern: &[u8], max_mismatches: usize) -> bool {
        let n = self.k - 1;
        let len = pattern.len().min(n);
        let tail = &pattern[pattern.len() - len..];
        let mismatches = (0..len)
            .filter(|&i| !iupac_match(code_nucleotide(node.code_at(n - len + i, n)), tail[i]))
            .count();
        mismatches <= max_mismatches
    }

    /// Nodes whose residues match the start of `pattern` with at most
    /// `max_mismatches` differences. Patterns shorter than `k-1` are compared
    /// to the node prefix.
    pub fn search(&self, pattern: &[u8], max_mismatches: usize) -> Vec<u64> {
        let mut found: Vec<u64> = self
            .nodes()
            .into_iter()
            .filter(|&n| self.matches_prefix(n, pattern, max_mismatches))
            .collect();
        found.sort_unstable();
        found
    }

    /// Nodes whose residues match the end of `pattern`, comparing from the
    /// last residue backwards.
    pub fn back_search(&self, pattern: &[u8], max_mismatches: usize) -> Vec<u64> {
        let mut found: Vec<u64> = self
            .nodes()
            .into_iter()
            .filter(|&n| self.matches_suffix(n, pattern, max_mismatches))
            .collect();
        found.sort_unstable();
        found
    }

    /// Nodes without incoming edges.
    pub fn sources(&self) -> Vec<u64> {
        let mut found: Vec<u64> = self
            .nodes()
            .into_iter()
            .filter(|&n| self.predecessors(n).next().is_none())
            .collect();
        found.sort_unstable();
        found
    }

    /// Nodes without outgoing edges.
    pub fn sinks(&self) -> Vec<u64> {
        let mut found: Vec<u64> = self
            .nodes()
            .into_iter()
            .filter(|&n| self.successors(n).next().is_none())
            .collect();
        found.sort_unstable();
        found
    }

    /// Path from a node of `starts` to a node of `stops` maximizing the sum
    /// of traversed edge weights.
    ///
    /// Acyclic graphs are solved exactly in topological order. On a graph
    /// that still holds a cycle, each edge may be traversed as many times as
    /// its weight and the search stops after `budget` traversals, keeping the
    /// best path found so far. `backtrack` reverses the returned nodes.
    pub fn heaviest_path(
        &self,
        starts: &[u64],
        stops: &[u64],
        backtrack: bool,
        budget: usize,
    ) -> Result<Vec<u64>> {
        let stops: FxHashSet<u64> = stops.iter().copied().collect();
        let path = match self.topological_order() {
            Some(order) => self.heaviest_acyclic(&order, starts, &stops),
            None => {
                debug!("graph k={} holds a cycle, bounded path search", self.k);
                self.heaviest_bounded(starts, &stops, budget)
            }
        };
        let mut path =
            path.ok_or_else(|| ObiError::Graph("no path between start and stop nodes".into()))?;
        if backtrack {
            path.reverse();
        }
        Ok(path)
    }

    fn heaviest_acyclic(
        &self,
        order: &[u64],
        starts: &[u64],
        stops: &FxHashSet<u64>,
    ) -> Option<Vec<u64>> {
        let mut best: FxHashMap<u64, (u64, Option<u64>)> = FxHashMap::default();
        for &s in starts {
            best.insert(s, (0, None));
        }
        for &node in order {
            let Some(&(score, _)) = best.get(&node) else {
                continue;
            };
            for (_, target, w) in self.successors(node) {
                let candidate = score + w as u64;
                let improves = best.get(&target).map_or(true, |&(s, _)| candidate > s);
                if improves {
                    best.insert(target, (candidate, Some(node)));
                }
            }
        }
        let end = stops
            .iter()
            .filter_map(|s| best.get(s).map(|&(score, _)| (score, *s)))
            .max()?
            .1;
        let mut path = vec![end];
        let mut node = end;
        while let Some(&(_, Some(prev))) = best.get(&node) {
            path.push(prev);
            node = prev;
        }
        path.reverse();
        Some(path)
    }

    fn heaviest_bounded(
        &self,
        starts: &[u64],
        stops: &FxHashSet<u64>,
        budget: usize,
    ) -> Option<Vec<u64>> {
        let mut best: Option<(u64, Vec<u64>)> = None;
        let mut remaining = budget;
        let mut used: FxHashMap<u64, u32> = FxHashMap::default();
        for &start in starts {
            if stops.contains(&start) && best.is_none() {
                best = Some((0, vec![start]));
            }
            // (node, next residue code to try)
            let mut stack: Vec<(u64, u64)> = vec![(start, 0)];
            let mut path: Vec<u64> = Vec::new();
            let mut score = 0u64;
            while let Some(top) = stack.last_mut() {
                if remaining == 0 {
                    break;
                }
                if top.1 == 4 {
                    stack.pop();
                    if let Some(edge) = path.pop() {
                        score -= self.weight(edge) as u64;
                        if let Some(u) = used.get_mut(&edge) {
                            *u -= 1;
                        }
                    }
                    continue;
                }
                let edge = ((top.0 << 2) | top.1) & self.edge_mask;
                top.1 += 1;
                let Some(&w) = self.edges.get(&edge) else {
                    continue;
                };
                let u = used.entry(edge).or_default();
                if *u >= w {
                    continue;
                }
                *u += 1;
                remaining -= 1;
                score += w as u64;
                path.push(edge);
                let target = self.target(edge);
                if stops.contains(&target) && best.as_ref().map_or(true, |(s, _)| score > *s) {
                    let mut nodes = Vec::with_capacity(path.len() + 1);
                    nodes.push(start);
                    nodes.extend(path.iter().map(|&e| self.target(e)));
                    best = Some((score, nodes));
                }
                stack.push((target, 0));
            }
            used.clear();
        }
        best.map(|(_, nodes)| nodes)
    }

    /// Residues spelled by a node path: the first node, then the last
    /// residue of every following node.
    pub fn decode(&self, path: &[u64]) -> Vec<u8> {
        let n = self.k - 1;
        let Some((&first, rest)) = path.split_first() else {
            return Vec::new();
        };
        let mut out: Vec<u8> = (0..n).map(|i| code_nucleotide(first.code_at(i, n))).collect();
        out.extend(rest.iter().map(|&node| code_nucleotide(node.low_code())));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::encoding::encode;
    use pretty_assertions::assert_eq;

    fn node(s: &[u8]) -> u64 {
        encode(s).unwrap()
    }

    #[test]
    fn test_push_weights() {
        let mut g = DeBruijnGraph::new(4).unwrap();
        g.push(b"acgtacgtg");
        assert_eq!(g.len(), 5);
        assert_eq!(g.weight(node(b"acgt")), 2);
        assert_eq!(g.weight(node(b"cgtg")), 1);
        assert_eq!(g.spectrum(), BTreeMap::from([(1, 4), (2, 1)]));
        assert_eq!(g.max_weight(), 2);
        assert!((g.mean_weight() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_heaviest_path_through_cycle() {
        let mut g = DeBruijnGraph::new(4).unwrap();
        g.push(b"acgtacgtg");
        assert!(g.has_cycle());
        let path = g
            .heaviest_path(&[node(b"acg")], &[node(b"gtg")], false, DEFAULT_PATH_BUDGET)
            .unwrap();
        assert_eq!(g.decode(&path), b"acgtacgtg");
    }

    #[test]
    fn test_heaviest_path_acyclic() {
        let mut g = DeBruijnGraph::new(3).unwrap();
        g.push_weighted(b"aacgt", 5);
        g.push_weighted(b"aactt", 1);
        assert!(!g.has_cycle());
        let starts = g.search(b"aa", 0);
        let stops = g.sinks();
        let path = g.heaviest_path(&starts, &stops, false, DEFAULT_PATH_BUDGET).unwrap();
        assert_eq!(g.decode(&path), b"aacgt");
        let back = g.heaviest_path(&starts, &stops, true, DEFAULT_PATH_BUDGET).unwrap();
        assert_eq!(back.first(), path.last());
    }

    #[test]
    fn test_filters_break_cycle() {
        let mut g = DeBruijnGraph::new(3).unwrap();
        g.push_weighted(b"acgtt", 4);
        g.push(b"gtac");
        assert!(g.has_cycle());
        let mean = g.mean_weight().ceil() as u32;
        g.filter_min_weight(mean);
        g.filter_max_weight(2 * g.max_weight());
        assert!(!g.has_cycle());
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_search_with_mismatches_and_iupac() {
        let mut g = DeBruijnGraph::new(5).unwrap();
        g.push(b"acgtacc");
        assert_eq!(g.search(b"acgt", 0), vec![node(b"acgt")]);
        assert_eq!(g.search(b"rcgt", 0), vec![node(b"acgt")]);
        assert_eq!(g.search(b"ccgt", 1), vec![node(b"acgt")]);
        assert_eq!(g.back_search(b"ttgtacc", 0), vec![node(b"tacc")]);
        assert_eq!(g.back_search(b"cc", 0), vec![node(b"tacc")]);
    }

    #[test]
    fn test_no_path() {
        let mut g = DeBruijnGraph::new(3).unwrap();
        g.push(b"aacc");
        let err = g.heaviest_path(&[node(b"cc")], &[node(b"aa")], false, 10).unwrap_err();
        assert!(matches!(err, ObiError::Graph(_)));
    }
}
