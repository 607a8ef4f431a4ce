/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The line-oriented key-value format used at every stage boundary.
//!
//! A record is a line of the form `key<TAB>value`. The key is a node
//! identifier, optionally followed by `,` and the current rank of the node
//! (which is always present after the first round); the value is the
//! comma-joined list of out-neighbors of the node, possibly empty:
//!
//! ```text
//! a	b,c,d
//! a,0.4362500000000001	b,c,d
//! d,0.15
//! ```
//!
//! Parsing and formatting are exact inverses of each other.

use std::fmt::{self, Display};

/// Separator between key and value.
pub const KEY_VALUE_SEPARATOR: char = '\t';
/// Separator between node identifier and rank in keys, and between
/// out-neighbors in values.
pub const FIELD_SEPARATOR: char = ',';

/// A parse error for a single record.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("missing tab separator in record {0:?}")]
    MissingSeparator(String),
    #[error("cannot parse rank {rank:?} of node {id:?}")]
    InvalidRank { id: String, rank: String },
    #[error("tab in the adjacency {value:?} of node {key:?}")]
    TabInValue { key: String, value: String },
}

/// A `key<TAB>value` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parses a line, splitting on the first tab.
    ///
    /// The value may be empty (a node with no out-links), but the tab must
    /// be there. Identifiers cannot contain tabs, so neither can the value.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let (key, value) = line
            .split_once(KEY_VALUE_SEPARATOR)
            .ok_or_else(|| RecordError::MissingSeparator(line.to_owned()))?;
        let record = Self::new(key, value);
        record.check()?;
        Ok(record)
    }

    /// Checks that no identifier in the value contains a tab.
    pub fn check(&self) -> Result<(), RecordError> {
        if self.value.contains(KEY_VALUE_SEPARATOR) {
            return Err(RecordError::TabInValue {
                key: self.key.clone(),
                value: self.value.clone(),
            });
        }
        Ok(())
    }

    /// Parses the key of this record.
    pub fn node_key(&self) -> Result<NodeKey, RecordError> {
        NodeKey::parse(&self.key)
    }

    /// Returns the out-neighbors listed in the value.
    pub fn adjacency(&self) -> Vec<&str> {
        split_adjacency(&self.value)
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_VALUE_SEPARATOR}{}", self.key, self.value)
    }
}

/// The key of a record: a node identifier and, after the first round, its
/// rank.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeKey {
    pub id: String,
    pub rank: Option<f64>,
}

impl NodeKey {
    /// Rank of a node that has never been through a round.
    pub const DEFAULT_RANK: f64 = 1.0;

    pub fn new(id: impl Into<String>, rank: Option<f64>) -> Self {
        Self {
            id: id.into(),
            rank,
        }
    }

    /// Splits a key on its first comma; whatever follows must be a rank.
    pub fn parse(key: &str) -> Result<Self, RecordError> {
        match key.split_once(FIELD_SEPARATOR) {
            None => Ok(Self::new(key, None)),
            Some((id, rank)) => {
                let rank = rank.trim().parse::<f64>().map_err(|_| RecordError::InvalidRank {
                    id: id.to_owned(),
                    rank: rank.to_owned(),
                })?;
                Ok(Self::new(id, Some(rank)))
            }
        }
    }

    /// Returns the rank, or [the default](Self::DEFAULT_RANK) if the node has
    /// not been ranked yet.
    pub fn rank_or_default(&self) -> f64 {
        self.rank.unwrap_or(Self::DEFAULT_RANK)
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rank {
            None => f.write_str(&self.id),
            Some(rank) => {
                let mut buf = zmij::Buffer::new();
                write!(f, "{}{FIELD_SEPARATOR}{}", self.id, buf.format(rank))
            }
        }
    }
}

/// Enumerates the out-neighbors in a comma-joined list.
///
/// Trailing empty identifiers are dropped, so the empty string is the empty
/// list and `b,c,` lists two neighbors. Empty identifiers between commas
/// are kept.
pub fn split_adjacency(value: &str) -> Vec<&str> {
    let mut neighbors = value.split(FIELD_SEPARATOR).collect::<Vec<_>>();
    while neighbors.last().is_some_and(|n| n.is_empty()) {
        neighbors.pop();
    }
    neighbors
}

/// Joins out-neighbors; the inverse of [`split_adjacency`] on values
/// without trailing commas.
pub fn join_adjacency<S: AsRef<str>>(neighbors: &[S]) -> String {
    let mut result = String::new();
    for (i, neighbor) in neighbors.iter().enumerate() {
        if i > 0 {
            result.push(FIELD_SEPARATOR);
        }
        result.push_str(neighbor.as_ref());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let record = Record::parse("a\tb,c,d").unwrap();
        assert_eq!(record, Record::new("a", "b,c,d"));
        assert_eq!(record.adjacency(), vec!["b", "c", "d"]);
        assert_eq!(record.to_string(), "a\tb,c,d");
    }

    #[test]
    fn test_empty_value() {
        let record = Record::parse("a\t").unwrap();
        assert_eq!(record.value, "");
        assert!(record.adjacency().is_empty());
        assert_eq!(record.to_string(), "a\t");
    }

    #[test]
    fn test_tab_in_value() {
        assert_eq!(
            Record::parse("a\tb\tc"),
            Err(RecordError::TabInValue {
                key: "a".to_owned(),
                value: "b\tc".to_owned()
            })
        );
        assert!(Record::new("a", "b\tc").check().is_err());
        assert!(Record::new("a", "b,c").check().is_ok());
    }

    #[test]
    fn test_missing_separator() {
        assert_eq!(
            Record::parse("a b,c"),
            Err(RecordError::MissingSeparator("a b,c".to_owned()))
        );
    }

    #[test]
    fn test_node_key() {
        assert_eq!(NodeKey::parse("a").unwrap(), NodeKey::new("a", None));
        assert_eq!(NodeKey::parse("a").unwrap().rank_or_default(), 1.0);
        assert_eq!(
            NodeKey::parse("a,0.15").unwrap(),
            NodeKey::new("a", Some(0.15))
        );
        assert!(matches!(
            NodeKey::parse("a,x"),
            Err(RecordError::InvalidRank { .. })
        ));
    }

    #[test]
    fn test_node_key_full_precision() {
        let rank = 0.1 + 0.2;
        let key = NodeKey::new("http://example.org/", Some(rank)).to_string();
        let parsed = NodeKey::parse(&key).unwrap();
        assert_eq!(parsed.id, "http://example.org/");
        assert_eq!(parsed.rank, Some(rank));
    }

    #[test]
    fn test_adjacency_join_is_inverse() {
        for value in ["", "a", "a,b", "a,,b", ",a"] {
            assert_eq!(join_adjacency(&split_adjacency(value)), value);
        }
    }

    #[test]
    fn test_trailing_empty_neighbors() {
        assert_eq!(split_adjacency("b,c,"), vec!["b", "c"]);
        assert_eq!(split_adjacency("b,,"), vec!["b"]);
        assert_eq!(split_adjacency(",,"), Vec::<&str>::new());
        assert_eq!(split_adjacency(",b"), vec!["", "b"]);
        assert_eq!(Record::new("a", "b,c,").adjacency().len(), 2);
    }
}
