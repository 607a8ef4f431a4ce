/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The aggregation ("reduce") step of a round.
//!
//! The new rank of a node *i* is
//!
//! > *rᵢ* = (1 − α) + α ∑_(*j* → *i*) *rⱼ* / *d*⁺(*j*),
//!
//! where α is the damping factor and *d*⁺(*j*) the outdegree of *j*. Note
//! that the teleportation term is not divided by the number of nodes: ranks
//! sum to (about) the number of nodes rather than to one.

use super::Message;
use crate::record::{NodeKey, Record};
use kahan::KahanSum;

/// Computes the new rank of `id` from all the messages it received in a
/// round, and reattaches its adjacency.
///
/// Contributions are summed in the order of their source, so the result
/// does not depend on the order of `messages`, except in the anomalous case
/// in which more than one adjacency is received: then the last one wins and
/// a warning is logged. If no adjacency is received (the node only appears as
/// a destination) the adjacency of the output record is empty.
pub fn aggregate(id: &str, messages: impl IntoIterator<Item = Message>, alpha: f64) -> Record {
    let mut contributions = Vec::new();
    let mut adjacency: Option<String> = None;

    for message in messages {
        match message {
            Message::Contribution { ref source, .. } => {
                let mass = message.mass();
                contributions.push((source.clone(), mass));
            }
            Message::Adjacency(value) => {
                if let Some(previous) = adjacency.replace(value) {
                    log::warn!("Node {id:?} received more than one adjacency; dropping {previous:?}");
                }
            }
        }
    }

    contributions.sort_unstable_by(|(s0, m0), (s1, m1)| s0.cmp(s1).then(m0.total_cmp(m1)));
    let mut mass: KahanSum<f64> = KahanSum::new();
    for (_, contribution) in &contributions {
        mass += *contribution;
    }
    let rank = (1.0 - alpha) + alpha * mass.sum();

    Record::new(
        NodeKey::new(id, Some(rank)).to_string(),
        adjacency.unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(source: &str, rank: f64, outdegree: usize) -> Message {
        Message::Contribution {
            source: source.to_owned(),
            rank,
            outdegree,
        }
    }

    fn rank_of(record: &Record) -> f64 {
        record.node_key().unwrap().rank.unwrap()
    }

    #[test]
    fn test_damping_formula() {
        let alpha = 0.85;
        let record = aggregate(
            "c",
            [
                contribution("a", 1.0, 2),
                Message::Adjacency("a".to_owned()),
                contribution("b", 0.6, 3),
            ],
            alpha,
        );
        let expected = (1.0 - alpha) + alpha * (1.0 / 2.0 + 0.6 / 3.0);
        assert!((rank_of(&record) - expected).abs() < 1E-15);
        assert_eq!(record.node_key().unwrap().id, "c");
        assert_eq!(record.value, "a");
    }

    #[test]
    fn test_no_contributions() {
        let record = aggregate("a", [Message::Adjacency("b,c".to_owned())], 0.85);
        assert!((rank_of(&record) - 0.15).abs() < 1E-15);
        assert_eq!(record.value, "b,c");
    }

    #[test]
    fn test_sink_without_adjacency() {
        let record = aggregate("b", [contribution("a", 1.0, 1)], 0.85);
        assert!((rank_of(&record) - 1.0).abs() < 1E-15);
        assert_eq!(record.value, "");
    }

    #[test]
    fn test_order_independence() {
        let messages = vec![
            contribution("a", 0.3, 1),
            Message::Adjacency("x,y".to_owned()),
            contribution("b", 0.7, 7),
            contribution("c", 1.1, 2),
        ];
        let forward = aggregate("n", messages.clone(), 0.5);
        let backward = aggregate("n", messages.into_iter().rev(), 0.5);
        assert_eq!(rank_of(&forward), rank_of(&backward));
        assert_eq!(forward.value, backward.value);
    }

    #[test]
    fn test_last_adjacency_wins() {
        let record = aggregate(
            "n",
            [
                Message::Adjacency("x".to_owned()),
                Message::Adjacency("y".to_owned()),
            ],
            0.85,
        );
        assert_eq!(record.value, "y");
    }
}
