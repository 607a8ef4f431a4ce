/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The propagation ("map") step of a round.

use super::Message;
use crate::record::{NodeKey, Record};
use anyhow::{Context, Result};

/// Distributes the rank of the node described by `record` along its arcs.
///
/// For each out-neighbor *n*, `emit` receives *n* and a
/// [contribution](Message::Contribution) carrying the identifier, rank, and
/// outdegree of the node; then `emit` receives the node itself and its
/// [adjacency](Message::Adjacency), so that the adjacency reaches the next
/// round even if the node has no predecessors. Nodes without a rank in their
/// key have rank [`NodeKey::DEFAULT_RANK`].
///
/// Dangling nodes emit no contribution, so their rank is lost.
///
/// Returns the number of contributions emitted.
pub fn propagate<F>(record: &Record, mut emit: F) -> Result<usize>
where
    F: FnMut(&str, Message) -> Result<()>,
{
    let node = record
        .node_key()
        .with_context(|| format!("Could not parse key of record {:?}", record.key))?;
    record
        .check()
        .with_context(|| format!("Invalid adjacency of node {:?}", node.id))?;
    let rank = node.rank_or_default();
    let successors = record.adjacency();
    let outdegree = successors.len();

    for &succ in &successors {
        emit(
            succ,
            Message::Contribution {
                source: node.id.clone(),
                rank,
                outdegree,
            },
        )?;
    }
    emit(&node.id, Message::Adjacency(record.value.clone()))?;

    Ok(outdegree)
}
