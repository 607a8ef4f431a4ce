/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Round-based PageRank over record stores.
//!
//! The computation is a sequence of rounds, each made of a
//! [propagation](super::propagate) step and an [aggregation](super::aggregate)
//! step separated by a [shuffle](crate::utils::shuffle) that groups messages
//! by destination node. The output of round *i* (one record per node, with
//! the rank in the key and the adjacency in the value) is the input of round
//! *i* + 1.
//!
//! There is no convergence check: exactly the requested number of rounds is
//! performed. Rank is not normalized; after the first round ranks of a graph
//! without dangling nodes sum to the number of nodes, and dangling nodes
//! leak rank at every round.
//!
//! All intermediate data lives in a scratch directory that is removed when
//! the computation ends, even on failure.

use super::{aggregate, propagate, Ranking};
use crate::record::Record;
use crate::utils::{store, MemoryUsage, Shuffle};
use anyhow::{ensure, Context, Result};
use dsi_progress_logger::{no_logging, ConcurrentProgressLog, ProgressLog};
use itertools::Either;
use kahan::KahanSum;
use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Statistics about a round.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoundStats {
    /// Records read by the propagation step.
    pub records: usize,
    /// Contributions emitted by the propagation step.
    pub contributions: usize,
    /// Records (i.e., nodes) written by the aggregation step.
    pub nodes: usize,
    /// Sum of the ranks of the written nodes.
    pub total_rank: f64,
}

/// Computes PageRank with a fixed number of propagate/aggregate rounds.
///
/// The struct is configured via setters and then executed via
/// [`run`](Self::run) or [`rank`](Self::rank).
///
/// # Examples
///
/// ```
/// use webrank::rank::PageRank;
///
/// # fn main() -> anyhow::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let input = dir.path().join("graph");
/// std::fs::write(&input, "a\tb\nb\tc\nc\ta\n")?;
///
/// let mut pr = PageRank::new();
/// pr.alpha(0.85).iterations(10);
/// let ranking = pr.rank([&input])?;
///
/// assert_eq!(ranking.len(), 3);
/// assert!((ranking.total_rank() - 3.0).abs() < 1E-9);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PageRank {
    alpha: f64,
    iterations: usize,
    memory_usage: MemoryUsage,
    num_partitions: NonZeroUsize,
    scratch_dir: Option<PathBuf>,

    round_stats: Vec<RoundStats>,
}

impl Default for PageRank {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRank {
    /// The default damping factor.
    pub const DEFAULT_ALPHA: f64 = 0.85;
    /// The default number of rounds.
    pub const DEFAULT_ITERATIONS: usize = 10;

    pub fn new() -> Self {
        Self {
            alpha: Self::DEFAULT_ALPHA,
            iterations: Self::DEFAULT_ITERATIONS,
            memory_usage: MemoryUsage::default(),
            num_partitions: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            scratch_dir: None,
            round_stats: Vec::new(),
        }
    }

    /// Sets the damping factor α.
    ///
    /// # Panics
    ///
    /// Panics if `alpha` is not in the interval [0 . . 1).
    pub fn alpha(&mut self, alpha: f64) -> &mut Self {
        assert!(
            // Note that 0.0..1.0 is [0.0..1.0) in mathematical notation
            (0.0..1.0).contains(&alpha),
            "The damping factor must be in [0 . . 1), got {alpha}"
        );
        self.alpha = alpha;
        self
    }

    /// Sets the number of rounds.
    ///
    /// With zero rounds the input is ranked as it is.
    pub fn iterations(&mut self, iterations: usize) -> &mut Self {
        self.iterations = iterations;
        self
    }

    /// Sets the memory used by the shuffle before spilling to disk.
    pub fn memory_usage(&mut self, memory_usage: MemoryUsage) -> &mut Self {
        self.memory_usage = memory_usage;
        self
    }

    /// Sets the number of partitions, and thus of output files, of each
    /// round.
    pub fn num_partitions(&mut self, num_partitions: NonZeroUsize) -> &mut Self {
        self.num_partitions = num_partitions;
        self
    }

    /// Sets the directory inside which the scratch directory of a run is
    /// created. `None` means the system temporary directory.
    pub fn scratch_dir(&mut self, scratch_dir: Option<PathBuf>) -> &mut Self {
        self.scratch_dir = scratch_dir;
        self
    }

    /// Returns the statistics of the rounds performed by the last run.
    pub fn round_stats(&self) -> &[RoundStats] {
        &self.round_stats
    }

    /// Runs the computation on the given record files or directories,
    /// returning the records of the last round.
    pub fn run<P: AsRef<Path>>(&mut self, inputs: impl IntoIterator<Item = P>) -> Result<Vec<Record>> {
        self.run_with_logging(inputs, no_logging![], no_logging![])
    }

    /// Runs the computation and ranks the nodes of the last round.
    pub fn rank<P: AsRef<Path>>(&mut self, inputs: impl IntoIterator<Item = P>) -> Result<Ranking> {
        let records = self.run(inputs)?;
        Ranking::from_records(&records)
    }

    /// Runs the computation, logging progress.
    ///
    /// `pl` is a sequential [`ProgressLog`] counting rounds. `cpl` is a
    /// [`ConcurrentProgressLog`] used for messages and nodes inside each
    /// round. Either can be [`no_logging![]`](dsi_progress_logger::no_logging).
    pub fn run_with_logging<P: AsRef<Path>>(
        &mut self,
        inputs: impl IntoIterator<Item = P>,
        pl: &mut impl ProgressLog,
        cpl: &mut impl ConcurrentProgressLog,
    ) -> Result<Vec<Record>> {
        let files = store::record_files(inputs)?;
        self.round_stats.clear();

        log::info!("Alpha: {}", self.alpha);
        log::info!("Rounds: {}", self.iterations);
        log::info!("Partitions: {}", self.num_partitions);
        log::info!("Memory usage: {}", self.memory_usage);
        log::info!("Input files: {}", files.len());

        let scratch = self.create_scratch()?;
        log::debug!("Scratch directory: {}", scratch.path().display());

        let shuffle = Shuffle::new()?
            .num_partitions(self.num_partitions)
            .memory_usage(self.memory_usage)
            .tmp_dir(scratch.path());

        pl.item_name("round");
        pl.expected_updates(Some(self.iterations));
        pl.start(format!(
            "Computing PageRank (α = {}) for {} rounds...",
            self.alpha, self.iterations
        ));

        let mut current = files;
        let mut previous_dir: Option<PathBuf> = None;
        for round in 1..=self.iterations {
            let round_dir = scratch.path().join(format!("round-{round:02}"));
            let stats = self.round(round, &current, &round_dir, &shuffle, cpl)?;
            pl.info(format_args!(
                "Round {round}: read {} records, emitted {} contributions, wrote {} nodes; total rank {}",
                stats.records, stats.contributions, stats.nodes, stats.total_rank
            ));
            self.round_stats.push(stats);

            // the output of a round is consumed only by the next round
            if let Some(dir) = previous_dir.replace(round_dir.clone()) {
                store::remove_dir_all(dir)?;
            }
            current = store::record_files([&round_dir])?;
            pl.update_and_display();
        }
        pl.done();

        let records = store::load_records(&current)?;
        scratch
            .close()
            .context("Could not remove the scratch directory")?;
        Ok(records)
    }

    fn create_scratch(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("webrank-");
        match &self.scratch_dir {
            Some(base) => {
                ensure!(
                    base.is_dir(),
                    "The scratch directory {} does not exist or is not a directory",
                    base.display()
                );
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .context("Could not create the scratch directory")
    }

    /// Propagates the records in `files` and writes the aggregated records
    /// in `round_dir`, one file per partition.
    fn round(
        &self,
        round: usize,
        files: &[PathBuf],
        round_dir: &Path,
        shuffle: &Shuffle,
        cpl: &mut impl ConcurrentProgressLog,
    ) -> Result<RoundStats> {
        let num_records = AtomicUsize::new(0);
        let num_contributions = AtomicUsize::new(0);

        let records = files.par_iter().flat_map_iter(|file| match store::read_records(file) {
            Ok(records) => Either::Left(records),
            Err(err) => Either::Right(std::iter::once(Err(err))),
        });

        cpl.item_name("message");
        cpl.expected_updates(None);
        cpl.start(format!("Round {round}: propagating..."));
        let shuffled = shuffle
            .par_map(
                records,
                |record: Record, writer| {
                    let outdegree = propagate(&record, |key, message| writer.push(key, message))?;
                    num_records.fetch_add(1, Ordering::Relaxed);
                    num_contributions.fetch_add(outdegree, Ordering::Relaxed);
                    Ok(())
                },
                cpl,
            )
            .with_context(|| format!("Propagation failed in round {round}"))?;
        cpl.done();

        let alpha = self.alpha;
        cpl.item_name("node");
        cpl.expected_updates(None);
        cpl.start(format!("Round {round}: aggregating..."));
        let partitions = shuffled
            .par_reduce(
                |partition_id, groups| {
                    let path = round_dir.join(format!("part-{partition_id:05}"));
                    let mut writer = store::RecordWriter::create(&path)?;
                    let mut total_rank: KahanSum<f64> = KahanSum::new();
                    for group in groups {
                        let (id, messages) = group?;
                        let record = aggregate(&id, messages, alpha);
                        total_rank += record.node_key()?.rank_or_default();
                        writer.write(&record)?;
                    }
                    Ok((writer.finish()?, total_rank.sum()))
                },
                cpl,
            )
            .with_context(|| format!("Aggregation failed in round {round}"))?;
        cpl.done();

        let mut total_rank: KahanSum<f64> = KahanSum::new();
        let mut nodes = 0;
        for (partition_nodes, partition_rank) in partitions {
            nodes += partition_nodes;
            total_rank += partition_rank;
        }

        Ok(RoundStats {
            records: num_records.into_inner(),
            contributions: num_contributions.into_inner(),
            nodes,
            total_rank: total_rank.sum(),
        })
    }
}
