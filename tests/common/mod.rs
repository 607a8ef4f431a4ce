/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![allow(dead_code)]

use anyhow::Result;
use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use webrank::record::{join_adjacency, Record};

/// A graph as a list of nodes with their out-neighbors.
pub type Graph = Vec<(String, Vec<String>)>;

pub fn graph(arcs: &[(&str, &[&str])]) -> Graph {
    arcs.iter()
        .map(|(id, succ)| {
            (
                id.to_string(),
                succ.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

/// Writes `graph` as a record file `dir/name`.
pub fn write_graph(dir: impl AsRef<Path>, name: &str, graph: &Graph) -> Result<PathBuf> {
    let path = dir.as_ref().join(name);
    let mut content = String::new();
    for (id, succ) in graph {
        writeln!(content, "{}", Record::new(id.as_str(), join_adjacency(succ)))?;
    }
    std::fs::write(&path, content)?;
    Ok(path)
}

/// A random graph on nodes `n0`, `n1`, … in which each node has, with
/// probability `p`, an arc towards each other node.
///
/// If `strongly_connected` is true, the arcs `nᵢ → nᵢ₊₁` (and
/// `nₙ₋₁ → n₀`) are added, so there are no dangling nodes.
pub fn random_graph(rng: &mut SmallRng, n: usize, p: f64, strongly_connected: bool) -> Graph {
    (0..n)
        .map(|i| {
            let mut succ = (0..n)
                .filter(|_| rng.random_bool(p))
                .map(|j| format!("n{j}"))
                .collect::<Vec<_>>();
            if strongly_connected {
                succ.push(format!("n{}", (i + 1) % n));
            }
            (format!("n{i}"), succ)
        })
        .collect()
}

/// A straightforward in-memory computation of `rounds` rounds, used as a
/// reference. Returns, for each node, its rank and its adjacency.
pub fn reference_rounds(graph: &Graph, alpha: f64, rounds: usize) -> HashMap<String, (f64, Vec<String>)> {
    let mut state: HashMap<String, (f64, Vec<String>)> = graph
        .iter()
        .map(|(id, succ)| (id.clone(), (1.0, succ.clone())))
        .collect();
    for _ in 0..rounds {
        let mut next: HashMap<String, (f64, Option<Vec<String>>)> = HashMap::new();
        for (id, (rank, succ)) in &state {
            for s in succ {
                next.entry(s.clone()).or_insert((0.0, None)).0 += rank / succ.len() as f64;
            }
            next.entry(id.clone()).or_insert((0.0, None)).1 = Some(succ.clone());
        }
        state = next
            .into_iter()
            .map(|(id, (sum, succ))| (id, ((1.0 - alpha) + alpha * sum, succ.unwrap_or_default())))
            .collect();
    }
    state
}

/// Maps the records of a round to `(rank, adjacency)` by node identifier.
pub fn by_id(records: &[Record]) -> HashMap<String, (f64, String)> {
    records
        .iter()
        .map(|record| {
            let key = record.node_key().unwrap();
            let rank = key.rank_or_default();
            (key.id, (rank, record.value.clone()))
        })
        .collect()
}
