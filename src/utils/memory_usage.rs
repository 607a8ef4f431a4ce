/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::{anyhow, ensure, Result};
use std::fmt::{self, Display};
use sysinfo::System;

/// How much memory to devote to in-memory buffers before spilling to disk.
///
/// Memory can be given either as a number of bytes or as a number of
/// elements; in the first case the number of elements is computed from the
/// size of the element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    /// The total amount of memory, in bytes.
    MemorySize(usize),
    /// The number of elements of a batch.
    BatchSize(usize),
}

impl Default for MemoryUsage {
    /// Half of the memory available.
    fn default() -> Self {
        Self::from_perc(50.0)
    }
}

impl Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryUsage::MemorySize(size) => write!(f, "{size} bytes"),
            MemoryUsage::BatchSize(len) => write!(f, "{len} elements"),
        }
    }
}

impl MemoryUsage {
    /// Creates a new memory usage expressed as a percentage of the
    /// available memory.
    pub fn from_perc(perc: f64) -> Self {
        let system = System::new_all();
        MemoryUsage::MemorySize(
            usize::try_from((system.available_memory() as f64 * perc / 100.0) as u64)
                .unwrap_or(usize::MAX),
        )
    }

    /// Returns the number of elements of type `T` that fit in this memory
    /// usage, divided by `num_buffers` (at least one).
    pub fn batch_size<T>(&self, num_buffers: usize) -> usize {
        let num_buffers = num_buffers.max(1);
        match self {
            MemoryUsage::MemorySize(size) => (size / size_of::<T>().max(1) / num_buffers).max(1),
            MemoryUsage::BatchSize(len) => (len / num_buffers).max(1),
        }
    }

    /// Splits this memory usage evenly among `num_buffers` buffers.
    pub fn split(&self, num_buffers: usize) -> Self {
        let num_buffers = num_buffers.max(1);
        match self {
            MemoryUsage::MemorySize(size) => MemoryUsage::MemorySize((size / num_buffers).max(1)),
            MemoryUsage::BatchSize(len) => MemoryUsage::BatchSize((len / num_buffers).max(1)),
        }
    }

    /// Returns whether a buffer with `len` elements occupying (about)
    /// `bytes` bytes has reached this memory usage.
    #[inline(always)]
    pub fn is_full(&self, len: usize, bytes: usize) -> bool {
        match self {
            MemoryUsage::MemorySize(size) => bytes >= *size,
            MemoryUsage::BatchSize(max_len) => len >= *max_len,
        }
    }
}

/// Parses a memory usage.
///
/// This function accepts either a number (possibly followed by a
/// SI or NIST multiplier k, M, G, T, P, ki, Mi, Gi, Ti, or Pi), or a percentage
/// (followed by a `%`) that is interpreted as a percentage of the available
/// memory. If the value ends with a `b` or `B` it is interpreted as a number of
/// bytes, otherwise as a number of elements.
pub fn memory_usage_parser(arg: &str) -> Result<MemoryUsage> {
    const PREF_SYMS: [(&str, u64); 10] = [
        ("ki", 1 << 10),
        ("mi", 1 << 20),
        ("gi", 1 << 30),
        ("ti", 1 << 40),
        ("pi", 1 << 50),
        ("k", 1E3 as u64),
        ("m", 1E6 as u64),
        ("g", 1E9 as u64),
        ("t", 1E12 as u64),
        ("p", 1E15 as u64),
    ];
    let arg = arg.trim().to_ascii_lowercase();
    ensure!(!arg.is_empty(), "empty string");

    if let Some(perc) = arg.strip_suffix('%') {
        let perc = perc.parse::<f64>()?;
        ensure!((0.0..=100.0).contains(&perc), "percentage out of range");
        return Ok(MemoryUsage::from_perc(perc));
    }

    let num_digits = arg
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .count();

    let number = arg[..num_digits].parse::<f64>()?;
    let suffix = arg[num_digits..].trim();

    let prefix = suffix.strip_suffix('b').unwrap_or(suffix);
    let multiplier = if prefix.is_empty() {
        1
    } else {
        PREF_SYMS
            .iter()
            .find(|(x, _)| *x == prefix)
            .map(|(_, m)| *m)
            .ok_or_else(|| anyhow!("invalid prefix symbol {suffix}"))?
    };

    let value = (number * multiplier as f64) as usize;
    ensure!(value > 0, "memory usage must be greater than zero");

    if suffix.ends_with('b') {
        Ok(MemoryUsage::MemorySize(value))
    } else {
        Ok(MemoryUsage::BatchSize(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size() {
        assert_eq!(MemoryUsage::BatchSize(100).batch_size::<u64>(1), 100);
        assert_eq!(MemoryUsage::BatchSize(100).batch_size::<u64>(4), 25);
        assert_eq!(MemoryUsage::BatchSize(3).batch_size::<u64>(4), 1);
        assert_eq!(MemoryUsage::MemorySize(800).batch_size::<u64>(1), 100);
        assert_eq!(MemoryUsage::MemorySize(800).batch_size::<u64>(0), 100);
    }

    #[test]
    fn test_split() {
        let memory = MemoryUsage::MemorySize(1000).split(4);
        assert_eq!(memory, MemoryUsage::MemorySize(250));
        assert!(!memory.is_full(1_000_000, 249));
        assert!(memory.is_full(1, 250));
        let batch = MemoryUsage::BatchSize(10).split(20);
        assert_eq!(batch, MemoryUsage::BatchSize(1));
        assert!(batch.is_full(1, 0));
    }

    #[test]
    fn test_parser() -> Result<()> {
        assert_eq!(memory_usage_parser("1000")?, MemoryUsage::BatchSize(1000));
        assert_eq!(memory_usage_parser("2k")?, MemoryUsage::BatchSize(2000));
        assert_eq!(memory_usage_parser("1.5 Mi")?, MemoryUsage::BatchSize(3 << 19));
        assert_eq!(memory_usage_parser("512b")?, MemoryUsage::MemorySize(512));
        assert_eq!(memory_usage_parser("4GiB")?, MemoryUsage::MemorySize(4 << 30));
        assert!(matches!(memory_usage_parser("10%")?, MemoryUsage::MemorySize(_)));
        assert!(memory_usage_parser("").is_err());
        assert!(memory_usage_parser("0").is_err());
        assert!(memory_usage_parser("101%").is_err());
        assert!(memory_usage_parser("3x").is_err());
        Ok(())
    }

    #[test]
    fn test_from_perc() {
        assert!(matches!(MemoryUsage::from_perc(10.0), MemoryUsage::MemorySize(_)));
    }
}
