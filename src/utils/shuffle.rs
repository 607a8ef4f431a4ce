/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External grouping of keyed messages.
//!
//! A [`Shuffle`] receives a parallel stream of inputs, maps each input to
//! any number of `(key, message)` pairs, and routes the pairs to partitions
//! by hashing the key. Each worker thread keeps one buffer per partition;
//! when a buffer is full it is sorted by key and spilled to a temporary
//! file. Once the inputs are exhausted, every partition is merged
//! independently (and in parallel) using a [quaternary
//! heap](dary_heap::QuaternaryHeap), yielding the messages of each key as a
//! single group.
//!
//! All messages for a given key land in the same partition, and within a
//! partition keys are returned in lexicographical order.

use super::MemoryUsage;
use crate::rank::Message;
use anyhow::{Context, Result};
use dary_heap::PeekMut;
use dsi_progress_logger::ConcurrentProgressLog;
use rayon::prelude::*;
use std::fs::File;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::iter::Peekable;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Returns the partition of `key` among `num_partitions`.
///
/// The assignment depends only on the key, so it is the same in every round
/// and in every run.
#[inline]
pub fn partition_of(key: &str, num_partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % num_partitions as u64) as usize
}

/// Approximate memory footprint of a buffered pair.
fn entry_size(key: &str, message: &Message) -> usize {
    size_of::<(String, Message)>()
        + key.len()
        + match message {
            Message::Contribution { source, .. } => source.len(),
            Message::Adjacency(adjacency) => adjacency.len(),
        }
}

/// A parallel group-by-key with bounded memory.
#[derive(Debug, Clone)]
pub struct Shuffle {
    num_partitions: NonZeroUsize,
    memory_usage: MemoryUsage,
    tmp_dir: Option<PathBuf>,
}

impl Shuffle {
    /// Creates a shuffle with one partition per CPU and the default memory
    /// usage.
    pub fn new() -> Result<Self> {
        Ok(Self {
            num_partitions: NonZeroUsize::new(num_cpus::get()).context("zero CPUs")?,
            memory_usage: MemoryUsage::default(),
            tmp_dir: None,
        })
    }

    pub fn num_partitions(self, num_partitions: NonZeroUsize) -> Self {
        Self {
            num_partitions,
            ..self
        }
    }

    /// Sets the memory usage shared by all buffers of all workers.
    pub fn memory_usage(self, memory_usage: MemoryUsage) -> Self {
        Self {
            memory_usage,
            ..self
        }
    }

    /// Sets the directory in which spill directories are created (by
    /// default, the system temporary directory).
    pub fn tmp_dir(self, tmp_dir: impl AsRef<Path>) -> Self {
        Self {
            tmp_dir: Some(tmp_dir.as_ref().to_owned()),
            ..self
        }
    }

    /// Maps every input to keyed messages and groups them by key.
    ///
    /// `map` receives each input and a [`ShuffleWriter`] to
    /// [push](ShuffleWriter::push) messages to. The first error returned by
    /// an input or by `map` aborts the shuffle.
    ///
    /// `pl` is updated once per input.
    pub fn par_map<T, M>(
        &self,
        inputs: impl ParallelIterator<Item = Result<T>>,
        map: M,
        pl: &mut impl ConcurrentProgressLog,
    ) -> Result<Shuffled>
    where
        M: Fn(T, &mut ShuffleWriter) -> Result<()> + Sync,
    {
        let num_partitions = self.num_partitions.get();
        let dir = match &self.tmp_dir {
            Some(base) => tempfile::tempdir_in(base),
            None => tempfile::tempdir(),
        }
        .context("Could not create temporary directory")?;
        let buffer_usage = self
            .memory_usage
            .split(rayon::current_num_threads() * num_partitions);
        log::debug!(
            "Shuffling into {num_partitions} partitions at {} with {buffer_usage} per buffer",
            dir.path().display()
        );

        let worker_id = AtomicUsize::new(0);
        let num_messages = AtomicUsize::new(0);

        // partitions[partition_id] contains the spill files of all workers
        // for that partition
        let partitions: Vec<Vec<PathBuf>> = inputs
            .try_fold(
                || ShuffleWriter {
                    worker_id: worker_id.fetch_add(1, Ordering::Relaxed),
                    tmp_dir: dir.path(),
                    buffer_usage,
                    buffers: (0..num_partitions).map(|_| Buffer::default()).collect(),
                    spills: vec![Vec::new(); num_partitions],
                    num_messages: 0,
                },
                |mut writer, input| -> Result<_> {
                    map(input?, &mut writer)?;
                    Ok(writer)
                },
            )
            .map_with(pl.clone(), |pl, writer| {
                let writer = writer?;
                pl.update_with_count(writer.num_messages);
                num_messages.fetch_add(writer.num_messages, Ordering::Relaxed);
                writer.finish()
            })
            .try_reduce(
                || vec![Vec::new(); num_partitions],
                |mut spills0, spills1| {
                    for (partition0, partition1) in spills0.iter_mut().zip(spills1) {
                        partition0.extend(partition1);
                    }
                    Ok(spills0)
                },
            )?;

        let num_messages = num_messages.into_inner();
        log::debug!(
            "Shuffled {num_messages} messages into {} spill files",
            partitions.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Shuffled {
            dir,
            partitions,
            num_messages,
        })
    }
}

#[derive(Default)]
struct Buffer {
    pairs: Vec<(String, Message)>,
    bytes: usize,
}

/// The per-worker state of a [`Shuffle`].
pub struct ShuffleWriter<'a> {
    worker_id: usize,
    tmp_dir: &'a Path,
    buffer_usage: MemoryUsage,
    buffers: Vec<Buffer>,
    spills: Vec<Vec<PathBuf>>,
    num_messages: usize,
}

impl ShuffleWriter<'_> {
    /// Routes `message` to the partition of `key`.
    pub fn push(&mut self, key: &str, message: Message) -> Result<()> {
        let partition_id = partition_of(key, self.buffers.len());
        let buffer = &mut self.buffers[partition_id];
        buffer.bytes += entry_size(key, &message);
        buffer.pairs.push((key.to_owned(), message));
        self.num_messages += 1;
        if self
            .buffer_usage
            .is_full(buffer.pairs.len(), buffer.bytes)
        {
            self.spill(partition_id)?;
        }
        Ok(())
    }

    /// Sorts a buffer by key and dumps it to a new spill file.
    fn spill(&mut self, partition_id: usize) -> Result<()> {
        let buffer = &mut self.buffers[partition_id];
        if buffer.pairs.is_empty() {
            return Ok(());
        }
        let spills = &mut self.spills[partition_id];
        let path = self.tmp_dir.join(format!(
            "{:04x}-{partition_id:05}-{:06x}",
            self.worker_id,
            spills.len()
        ));

        let start = std::time::Instant::now();
        buffer.pairs.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        let mut file = BufWriter::with_capacity(
            1 << 16,
            File::create(&path)
                .with_context(|| format!("Could not create spill file {}", path.display()))?,
        );
        for (key, message) in buffer.pairs.drain(..) {
            message
                .write_keyed(&key, &mut file)
                .with_context(|| format!("Could not write to {}", path.display()))?;
        }
        file.flush()
            .with_context(|| format!("Could not flush {}", path.display()))?;
        log::trace!("Spilled {} in {:?}", path.display(), start.elapsed());

        buffer.bytes = 0;
        spills.push(path);
        Ok(())
    }

    /// Spills all remaining buffers, returning the spill files of each
    /// partition.
    fn finish(mut self) -> Result<Vec<Vec<PathBuf>>> {
        for partition_id in 0..self.buffers.len() {
            self.spill(partition_id)
                .context("Could not flush buffer at the end")?;
        }
        Ok(self.spills)
    }
}

/// The result of a [`Shuffle`]: sorted spill files, by partition.
///
/// The spill files are deleted when this structure is dropped.
pub struct Shuffled {
    dir: TempDir,
    partitions: Vec<Vec<PathBuf>>,
    num_messages: usize,
}

impl Shuffled {
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// The number of messages pushed during the shuffle.
    pub fn num_messages(&self) -> usize {
        self.num_messages
    }

    /// Returns the groups of a partition, in key order.
    pub fn groups(&self, partition_id: usize) -> Result<Groups<KMergeIters<BatchIterator>>> {
        let batches = self.partitions[partition_id]
            .iter()
            .map(BatchIterator::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Groups::new(KMergeIters::new(batches)))
    }

    /// Applies `reduce` to the groups of each partition, in parallel.
    ///
    /// Returns the results of `reduce` in partition order.
    pub fn par_reduce<R, F>(&self, reduce: F, pl: &mut impl ConcurrentProgressLog) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(usize, &mut dyn Iterator<Item = Result<(String, Vec<Message>)>>) -> Result<R> + Sync,
    {
        (0..self.partitions.len())
            .into_par_iter()
            .map_with(pl.clone(), |pl, partition_id| {
                let mut groups = self.groups(partition_id)?.inspect(|_| pl.light_update());
                reduce(partition_id, &mut groups)
                    .with_context(|| format!("Could not reduce partition {partition_id}"))
            })
            .collect()
    }

    /// The directory containing the spill files.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// An iterator over the `(key, message)` pairs of a spill file.
pub struct BatchIterator {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
}

impl BatchIterator {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Could not open spill file {}", path.display()))?;
        Ok(Self {
            lines: BufReader::with_capacity(1 << 16, file).lines(),
            path: path.to_owned(),
        })
    }
}

impl Iterator for BatchIterator {
    type Item = Result<(String, Message)>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        Some(
            line.with_context(|| format!("Could not read {}", self.path.display()))
                .and_then(|line| Message::read_keyed(&line))
                .with_context(|| format!("Corrupted spill file {}", self.path.display())),
        )
    }
}

struct HeadTail<T, I: Iterator<Item = Result<(String, T)>>> {
    head: Result<(String, T)>,
    tail: I,
}

impl<T, I: Iterator<Item = Result<(String, T)>>> PartialEq for HeadTail<T, I> {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl<T, I: Iterator<Item = Result<(String, T)>>> Eq for HeadTail<T, I> {}

impl<T, I: Iterator<Item = Result<(String, T)>>> PartialOrd for HeadTail<T, I> {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, I: Iterator<Item = Result<(String, T)>>> Ord for HeadTail<T, I> {
    /// Reversed key order, so that the maximum of the heap is the smallest
    /// key; errors come before everything else.
    #[inline(always)]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        match (&self.head, &other.head) {
            (Ok((a, _)), Ok((b, _))) => b.cmp(a),
            (Err(_), Err(_)) => Equal,
            (Err(_), Ok(_)) => Greater,
            (Ok(_), Err(_)) => Less,
        }
    }
}

/// Merges iterators of `(key, value)` pairs sorted by key using a
/// [quaternary heap](dary_heap::QuaternaryHeap).
///
/// The relative order of pairs with the same key coming from different
/// iterators is unspecified. Errors are returned as soon as they are read.
pub struct KMergeIters<I: Iterator<Item = Result<(String, T)>>, T = Message> {
    heap: dary_heap::QuaternaryHeap<HeadTail<T, I>>,
}

impl<T, I: Iterator<Item = Result<(String, T)>>> KMergeIters<I, T> {
    pub fn new(iters: impl IntoIterator<Item = I>) -> Self {
        let iters = iters.into_iter();
        let mut heap = dary_heap::QuaternaryHeap::with_capacity(iters.size_hint().1.unwrap_or(10));
        for mut iter in iters {
            if let Some(head) = iter.next() {
                heap.push(HeadTail { head, tail: iter });
            }
        }
        KMergeIters { heap }
    }
}

impl<T, I: Iterator<Item = Result<(String, T)>>> Iterator for KMergeIters<I, T> {
    type Item = Result<(String, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut head_tail = self.heap.peek_mut()?;

        match head_tail.tail.next() {
            None => Some(PeekMut::pop(head_tail).head),
            Some(head) => Some(std::mem::replace(&mut head_tail.head, head)),
        }
    }
}

/// Groups consecutive pairs with the same key.
pub struct Groups<I: Iterator<Item = Result<(String, T)>>, T = Message> {
    iter: Peekable<I>,
}

impl<T, I: Iterator<Item = Result<(String, T)>>> Groups<I, T> {
    pub fn new(iter: I) -> Self {
        Self {
            iter: iter.peekable(),
        }
    }
}

impl<T, I: Iterator<Item = Result<(String, T)>>> Iterator for Groups<I, T> {
    type Item = Result<(String, Vec<T>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = match self.iter.next()? {
            Ok(pair) => pair,
            Err(err) => return Some(Err(err)),
        };
        let mut values = vec![first];
        // an error ends the group and is returned by the next call
        while let Some(Ok((next_key, _))) = self.iter.peek() {
            if *next_key != key {
                break;
            }
            if let Some(Ok((_, value))) = self.iter.next() {
                values.push(value);
            }
        }
        Some(Ok((key, values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use dsi_progress_logger::no_logging;
    use std::collections::HashMap;

    fn adjacency(s: &str) -> Message {
        Message::Adjacency(s.to_owned())
    }

    #[test]
    fn test_kmerge() {
        let a = vec![Ok(("a".to_owned(), 0)), Ok(("c".to_owned(), 1))];
        let b = vec![Ok(("b".to_owned(), 2)), Ok(("c".to_owned(), 3))];
        let merged = KMergeIters::new([a.into_iter(), b.into_iter(), Vec::new().into_iter()])
            .map(|pair| pair.unwrap().0)
            .collect::<Vec<_>>();
        assert_eq!(merged, vec!["a", "b", "c", "c"]);
    }

    #[test]
    fn test_kmerge_error_first() {
        let a = vec![Ok(("a".to_owned(), 0))];
        let b = vec![Err(anyhow!("broken"))];
        let mut merged = KMergeIters::new([a.into_iter(), b.into_iter()]);
        assert!(merged.next().unwrap().is_err());
        assert_eq!(merged.next().unwrap().unwrap().0, "a");
        assert!(merged.next().is_none());
    }

    #[test]
    fn test_groups() {
        let pairs = ["a", "a", "b", "c", "c", "c"]
            .into_iter()
            .enumerate()
            .map(|(i, key)| Ok((key.to_owned(), i)));
        let groups = Groups::new(pairs)
            .map(|group| group.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            groups,
            vec![
                ("a".to_owned(), vec![0, 1]),
                ("b".to_owned(), vec![2]),
                ("c".to_owned(), vec![3, 4, 5]),
            ]
        );
    }

    #[test]
    fn test_partition_of() {
        for n in 1..10 {
            assert!(partition_of("http://example.org/", n) < n);
            assert_eq!(partition_of("x", n), partition_of("x", n));
        }
        assert_eq!(partition_of("anything", 1), 0);
    }

    /// Many spills per partition must still give one group per key.
    #[test]
    fn test_par_map_spills() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let shuffle = Shuffle::new()?
            .num_partitions(NonZeroUsize::new(3).unwrap())
            .memory_usage(MemoryUsage::BatchSize(1))
            .tmp_dir(dir.path());
        let inputs = (0..100_usize).into_par_iter().map(Ok);
        let shuffled = shuffle.par_map(
            inputs,
            |i, writer| {
                writer.push(&format!("k{}", i % 7), adjacency(&i.to_string()))?;
                writer.push("all", adjacency(&i.to_string()))
            },
            no_logging![],
        )?;
        assert_eq!(shuffled.num_messages(), 200);
        assert_eq!(shuffled.num_partitions(), 3);

        let groups: Vec<Vec<(String, Vec<Message>)>> = shuffled.par_reduce(
            |_, groups| groups.collect::<Result<Vec<_>>>(),
            no_logging![],
        )?;

        let mut seen = HashMap::new();
        for (partition_id, partition) in groups.into_iter().enumerate() {
            let keys = partition.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>();
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(keys, sorted);
            for (key, messages) in partition {
                assert_eq!(partition_of(&key, 3), partition_id);
                assert!(seen.insert(key, messages.len()).is_none());
            }
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(seen["all"], 100);
        assert_eq!(seen["k0"], 15);
        assert_eq!(seen["k6"], 14);

        let spill_dir = shuffled.path().to_owned();
        assert!(spill_dir.starts_with(dir.path()));
        drop(shuffled);
        assert!(!spill_dir.exists());
        Ok(())
    }

    #[test]
    fn test_par_map_error() -> Result<()> {
        let shuffle = Shuffle::new()?.memory_usage(MemoryUsage::BatchSize(1000));
        let inputs = (0..10_usize)
            .into_par_iter()
            .map(|i| if i == 7 { Err(anyhow!("bad input")) } else { Ok(i) });
        let result = shuffle.par_map(
            inputs,
            |i, writer| writer.push(&i.to_string(), adjacency("")),
            no_logging![],
        );
        assert!(result.is_err());
        Ok(())
    }
}
