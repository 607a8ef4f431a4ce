/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Messages exchanged between propagation and aggregation.
//!
//! Each node receives, in every round, one [`Adjacency`](Message::Adjacency)
//! message from itself and one [`Contribution`](Message::Contribution) from
//! each of its predecessors. The two kinds are told apart by their tag, so
//! identifiers containing any character other than tab and newline are safe.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;

const CONTRIBUTION_TAG: &str = "C";
const ADJACENCY_TAG: &str = "A";
const SEPARATOR: char = '\t';

/// A message keyed by the identifier of the node receiving it.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Rank mass sent along an arc `source → key`.
    Contribution {
        source: String,
        rank: f64,
        outdegree: usize,
    },
    /// The comma-joined out-adjacency of the key, forwarded verbatim.
    Adjacency(String),
}

impl Message {
    /// The mass carried to the destination, before damping.
    ///
    /// Adjacency messages carry no mass.
    #[inline(always)]
    pub fn mass(&self) -> f64 {
        match self {
            Message::Contribution {
                rank, outdegree, ..
            } => {
                debug_assert!(*outdegree > 0);
                rank / *outdegree as f64
            }
            Message::Adjacency(_) => 0.0,
        }
    }

    /// Writes `key` and `self` as a single spill line.
    ///
    /// The adjacency, if any, is the last field, so it may contain tabs.
    pub fn write_keyed(&self, key: &str, writer: &mut impl Write) -> Result<()> {
        debug_assert!(!key.contains(SEPARATOR), "key {key:?} contains a tab");
        let mut buf = zmij::Buffer::new();
        match self {
            Message::Contribution {
                source,
                rank,
                outdegree,
            } => writeln!(
                writer,
                "{key}{SEPARATOR}{CONTRIBUTION_TAG}{SEPARATOR}{source}{SEPARATOR}{}{SEPARATOR}{outdegree}",
                buf.format(*rank)
            ),
            Message::Adjacency(adjacency) => writeln!(
                writer,
                "{key}{SEPARATOR}{ADJACENCY_TAG}{SEPARATOR}{adjacency}"
            ),
        }
        .context("Could not write message")
    }

    /// Parses a spill line written by [`write_keyed`](Self::write_keyed)
    /// (without the trailing newline).
    pub fn read_keyed(line: &str) -> Result<(String, Message)> {
        let mut fields = line.splitn(3, SEPARATOR);
        let (Some(key), Some(tag), Some(payload)) = (fields.next(), fields.next(), fields.next())
        else {
            bail!("Truncated message {line:?}");
        };
        let message = match tag {
            ADJACENCY_TAG => Message::Adjacency(payload.to_owned()),
            CONTRIBUTION_TAG => {
                let mut fields = payload.split(SEPARATOR);
                let (Some(source), Some(rank), Some(outdegree), None) =
                    (fields.next(), fields.next(), fields.next(), fields.next())
                else {
                    bail!("Malformed contribution {line:?}");
                };
                Message::Contribution {
                    source: source.to_owned(),
                    rank: rank
                        .parse()
                        .with_context(|| format!("Invalid rank in {line:?}"))?,
                    outdegree: outdegree
                        .parse()
                        .with_context(|| format!("Invalid outdegree in {line:?}"))?,
                }
            }
            _ => return Err(anyhow!("Unknown message tag {tag:?} in {line:?}")),
        };
        Ok((key.to_owned(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(key: &str, message: &Message) -> (String, Message) {
        let mut buf = Vec::new();
        message.write_keyed(key, &mut buf).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.ends_with('\n'));
        Message::read_keyed(line.trim_end_matches('\n')).unwrap()
    }

    #[test]
    fn test_spill_lines() {
        let contribution = Message::Contribution {
            source: "a;b".to_owned(),
            rank: 1.0 / 3.0,
            outdegree: 3,
        };
        assert_eq!(roundtrip("x", &contribution), ("x".to_owned(), contribution));

        // Adjacency payloads are verbatim, even when empty or with tabs
        for adjacency in ["", "b,c", "b\tc,d"] {
            let message = Message::Adjacency(adjacency.to_owned());
            assert_eq!(roundtrip("x", &message), ("x".to_owned(), message));
        }
    }

    #[test]
    fn test_mass() {
        let message = Message::Contribution {
            source: "a".to_owned(),
            rank: 1.5,
            outdegree: 3,
        };
        assert_eq!(message.mass(), 0.5);
        assert_eq!(Message::Adjacency("a,b".to_owned()).mass(), 0.0);
    }

    #[test]
    fn test_malformed_spill_lines() {
        assert!(Message::read_keyed("x").is_err());
        assert!(Message::read_keyed("x\tZ\tstuff").is_err());
        assert!(Message::read_keyed("x\tC\ta\t1.0").is_err());
        assert!(Message::read_keyed("x\tC\ta\tone\t1").is_err());
    }
}
