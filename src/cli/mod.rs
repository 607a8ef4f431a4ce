/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Command-line interface of `webrank`.

use crate::rank::{PageRank, Ranking};
use crate::utils::{memory_usage_parser, MemoryUsage};
use anyhow::{anyhow, bail, ensure, Result};
use clap::{Args, Parser};
use dsi_progress_logger::{concurrent_progress_logger, progress_logger, ProgressLog};
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    pub fn version_string() -> String {
        format!(
            "{}
build info: {} build for {} with {}",
            PKG_VERSION, PROFILE, TARGET, RUSTC_VERSION
        )
    }
}

/// Parses the number of threads from a string.
///
/// This function is meant to be used with `#[arg(...,  value_parser =
/// num_threads_parser)]`.
pub fn num_threads_parser(arg: &str) -> Result<usize> {
    let num_threads = arg.parse::<usize>()?;
    ensure!(num_threads > 0, "Number of threads must be greater than 0");
    Ok(num_threads)
}

/// Parses a duration from a string.
/// If no suffix is given, it is assumed to be in milliseconds.
/// You can use suffixes, the available ones are:
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
///
/// Example: `1d2h3m4s567` this is parsed as: 1 day, 2 hours, 3 minutes, 4 seconds, and 567 milliseconds.
fn parse_duration(value: &str) -> Result<Duration> {
    if value.is_empty() {
        bail!("Empty duration string, if you want every 0 milliseconds use `0`.");
    }
    let mut duration = Duration::from_secs(0);
    let mut acc = String::new();
    for c in value.chars() {
        if c.is_ascii_digit() {
            acc.push(c);
        } else if c.is_whitespace() {
            continue;
        } else {
            let dur = acc.parse::<u64>()?;
            match c {
                's' => duration += Duration::from_secs(dur),
                'm' => duration += Duration::from_secs(dur * 60),
                'h' => duration += Duration::from_secs(dur * 60 * 60),
                'd' => duration += Duration::from_secs(dur * 60 * 60 * 24),
                _ => return Err(anyhow!("Invalid duration suffix: {}", c)),
            }
            acc.clear();
        }
    }
    if !acc.is_empty() {
        let dur = acc.parse::<u64>()?;
        duration += Duration::from_millis(dur);
    }
    Ok(duration)
}

/// Creates a [`ThreadPool`](rayon::ThreadPool) with the given number of threads.
pub fn get_thread_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;
    log::info!("Using {} threads", thread_pool.current_num_threads());
    Ok(thread_pool)
}

/// Initializes the `env_logger` logger with a custom format including
/// timestamps with elapsed time since initialization.
pub fn init_env_logger() -> Result<()> {
    use jiff::fmt::friendly::{Designator, Spacing, SpanPrinter};
    use jiff::SpanRound;

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    let start = std::time::Instant::now();
    let printer = SpanPrinter::new()
        .spacing(Spacing::None)
        .designator(Designator::Compact);
    let span_round = SpanRound::new()
        .largest(jiff::Unit::Day)
        .smallest(jiff::Unit::Millisecond)
        .days_are_24_hours();

    builder.format(move |buf, record| {
        let Ok(ts) = jiff::Timestamp::try_from(SystemTime::now()) else {
            return Err(std::io::Error::other("Failed to get timestamp"));
        };
        let style = buf.default_level_style(record.level());
        let elapsed = start.elapsed();
        let span = jiff::Span::new()
            .seconds(elapsed.as_secs() as i64)
            .milliseconds(elapsed.subsec_millis() as i64);
        let span = span.round(span_round).map_err(std::io::Error::other)?;
        writeln!(
            buf,
            "{} {} {style}{}{style:#} [{:?}] {} - {}",
            ts.strftime("%F %T%.3f"),
            printer.span_to_string(&span),
            record.level(),
            std::thread::current().id(),
            record.target(),
            record.args()
        )
    });
    builder.try_init()?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    #[arg(long, value_parser = parse_duration, global = true, display_order = 1000)]
    /// How often to log progress. Default is 10s. You can use the suffixes "s"
    /// for seconds, "m" for minutes, "h" for hours, and "d" for days. If no
    /// suffix is provided it is assumed to be in milliseconds.
    pub log_interval: Option<Duration>,
}

#[derive(Parser, Debug)]
#[command(name = "webrank", version = build_info::version_string())]
/// Computes PageRank on a web graph of tab-separated records and ranks its
/// nodes.
///
/// Each input line has the form `node<TAB>succ,succ,...`. The output
/// contains one line `(node,rank)` per node, by decreasing rank.
///
/// Noteworthy environment variables:
///
/// - RUST_MIN_STACK: minimum thread stack size (in bytes)
///
/// - RUST_LOG: configuration for env_logger (e.g., "info", "webrank=debug")
pub struct Cli {
    /// The input record file, or a directory of record files.
    pub input: PathBuf,

    /// The output file (replaced if it exists).
    pub output: PathBuf,

    #[arg(short, long, default_value_t = PageRank::DEFAULT_ALPHA)]
    /// The damping factor α (must be in the interval [0 . . 1).
    pub alpha: f64,

    #[arg(short = 'n', long, default_value_t = PageRank::DEFAULT_ITERATIONS)]
    /// The number of rounds.
    pub iterations: usize,

    #[arg(long, default_value_t = Ranking::DEFAULT_PRECISION)]
    /// Decimal digits of the ranks in the output.
    pub precision: usize,

    #[arg(long)]
    /// The directory in which the scratch directory is created (default:
    /// the system temporary directory).
    pub scratch_dir: Option<PathBuf>,

    #[arg(long)]
    /// The number of partitions of each round (default: the number of CPUs).
    pub partitions: Option<NonZeroUsize>,

    #[arg(short = 'j', long, default_value_t = rayon::current_num_threads().max(1), value_parser = num_threads_parser)]
    /// The number of threads to use.
    pub num_threads: usize,

    #[arg(short = 'm', long = "memory-usage", value_parser = memory_usage_parser, default_value = "50%")]
    /// The memory used by the shuffle buffers before spilling to disk.
    /// If the number ends with a "b" or "B" it is interpreted as a number of bytes, otherwise as a number of messages.
    /// You can use the SI and NIST multipliers k, M, G, T, P, ki, Mi, Gi, Ti, and Pi.
    /// You can also use a percentage of the available memory by appending a "%" to the number.
    pub memory_usage: MemoryUsage,

    #[clap(flatten)]
    pub global: GlobalArgs,
}

/// The entry point of the command-line interface.
pub fn cli_main<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let start = std::time::Instant::now();
    let cli = Cli::parse_from(args);
    main(cli)?;

    log::info!(
        "The command took {}",
        pretty_print_elapsed(start.elapsed().as_secs_f64())
    );

    Ok(())
}

/// Runs PageRank as described by `args`.
pub fn main(args: Cli) -> Result<()> {
    ensure!(
        // Note that 0.0..1.0 is [0.0..1.0) in mathematical notation
        (0.0..1.0).contains(&args.alpha),
        "The damping factor must be in [0 . . 1), got {}",
        args.alpha
    );
    if let Some(scratch_dir) = &args.scratch_dir {
        ensure!(
            scratch_dir.is_dir(),
            "The scratch directory {} does not exist or is not a directory",
            scratch_dir.display()
        );
    }

    let mut pl = progress_logger![];
    pl.display_memory(true);
    if let Some(log_interval) = args.global.log_interval {
        pl.log_interval(log_interval);
    }

    let mut cpl = concurrent_progress_logger![];
    cpl.display_memory(true).local_speed(true);
    if let Some(log_interval) = args.global.log_interval {
        cpl.log_interval(log_interval);
    }

    let thread_pool = get_thread_pool(args.num_threads)?;

    let mut pr = PageRank::new();
    pr.alpha(args.alpha)
        .iterations(args.iterations)
        .memory_usage(args.memory_usage)
        .scratch_dir(args.scratch_dir.clone());
    if let Some(partitions) = args.partitions {
        pr.num_partitions(partitions);
    }

    log::info!("Reading records from {}", args.input.display());
    let records =
        thread_pool.install(|| pr.run_with_logging([&args.input], &mut pl, &mut cpl))?;

    let ranking = thread_pool.install(|| Ranking::from_records(&records))?;
    log::info!(
        "Ranked {} nodes; total rank {}",
        ranking.len(),
        ranking.total_rank()
    );
    ranking.store(&args.output, args.precision)?;

    Ok(())
}

/// Pretty-prints seconds in a human-readable format.
fn pretty_print_elapsed(elapsed: f64) -> String {
    let mut result = String::new();
    let mut elapsed_seconds = elapsed as u64;
    let weeks = elapsed_seconds / (60 * 60 * 24 * 7);
    elapsed_seconds %= 60 * 60 * 24 * 7;
    let days = elapsed_seconds / (60 * 60 * 24);
    elapsed_seconds %= 60 * 60 * 24;
    let hours = elapsed_seconds / (60 * 60);
    elapsed_seconds %= 60 * 60;
    let minutes = elapsed_seconds / 60;

    for (count, unit) in [(weeks, "week"), (days, "day"), (hours, "hour"), (minutes, "minute")] {
        match count {
            0 => {}
            1 => result.push_str(&format!("1 {unit} ")),
            _ => result.push_str(&format!("{count} {unit}s ")),
        }
    }

    result.push_str(&format!("{:.3} seconds ({}s)", elapsed % 60.0, elapsed));
    result
}
