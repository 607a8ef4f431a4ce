/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Final ranking of the nodes by decreasing rank.

use crate::record::Record;
use crate::utils::store;
use anyhow::{Context, Result};
use kahan::KahanSum;
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;

/// Nodes sorted by decreasing rank.
///
/// Ties keep the order in which the nodes were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    nodes: Vec<(String, f64)>,
}

impl Ranking {
    /// The default number of decimal digits of [`write`](Self::write).
    pub const DEFAULT_PRECISION: usize = 10;

    /// Sorts `(id, rank)` pairs by decreasing rank.
    pub fn new(mut nodes: Vec<(String, f64)>) -> Self {
        // par_sort_by is stable
        nodes.par_sort_by(|(_, a), (_, b)| b.total_cmp(a));
        Self { nodes }
    }

    /// Builds a ranking from the output of the last round.
    ///
    /// Adjacency values are ignored.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Result<Self> {
        let nodes = records
            .into_iter()
            .map(|record| {
                let node = record
                    .node_key()
                    .with_context(|| format!("Could not parse key of record {:?}", record.key))?;
                let rank = node.rank_or_default();
                Ok((node.id, rank))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(nodes))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over `(id, rank)` pairs by decreasing rank.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, f64)> + '_ {
        self.nodes.iter().map(|(id, rank)| (id.as_str(), *rank))
    }

    /// Returns the rank of `id`, if present (linear time).
    pub fn rank_of(&self, id: &str) -> Option<f64> {
        self.iter().find(|(other, _)| *other == id).map(|(_, rank)| rank)
    }

    /// The sum of all ranks.
    pub fn total_rank(&self) -> f64 {
        let mut total: KahanSum<f64> = KahanSum::new();
        for (_, rank) in &self.nodes {
            total += *rank;
        }
        total.sum()
    }

    /// Writes one line `(id,rank)` per node, with `precision` decimal
    /// digits.
    ///
    /// Ranks exactly halfway between two outputs are rounded away from
    /// zero.
    pub fn write(&self, mut writer: impl Write, precision: usize) -> Result<()> {
        for (id, rank) in self.iter() {
            let rank = round_half_up(rank, precision);
            writeln!(writer, "({id},{rank:.precision$})")
                .with_context(|| format!("Could not write rank of {id:?}"))?;
        }
        writer.flush().context("Could not flush ranking")
    }

    /// Stores the ranking at `path`, replacing any existing file.
    pub fn store(&self, path: impl AsRef<Path>, precision: usize) -> Result<()> {
        let path = path.as_ref();
        log::info!("Storing {} ranked nodes at {}", self.len(), path.display());
        let writer = store::RecordWriter::overwrite(path)?;
        self.write(writer.into_inner(), precision)
            .with_context(|| format!("Could not store ranking at {}", path.display()))
    }
}

impl IntoIterator for Ranking {
    type Item = (String, f64);
    type IntoIter = std::vec::IntoIter<(String, f64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Returns the number of binary digits after the point of a finite `x`.
fn fraction_bits(x: f64) -> u32 {
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7FF) as i32;
    let mantissa = bits & ((1 << 52) - 1);
    let (mantissa, exponent) = if exponent == 0 {
        (mantissa, -1074)
    } else {
        (mantissa | (1 << 52), exponent - 1075)
    };
    if mantissa == 0 {
        return 0;
    }
    (-(exponent + mantissa.trailing_zeros() as i32)).max(0) as u32
}

/// Nudges `x` away from zero if it is a tie at `precision` decimal digits,
/// so that formatting rounds it half up instead of half to even.
///
/// A value with exactly *k* binary digits after the point has exactly *k*
/// decimal digits after the point, the last being 5; so `x` is a tie iff
/// *k* = `precision` + 1.
fn round_half_up(x: f64, precision: usize) -> f64 {
    if x.is_finite() && fraction_bits(x) as usize == precision + 1 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        x
    }
}
