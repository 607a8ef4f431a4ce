/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Iterative computation of PageRank over record stores.

mod message;
pub use message::Message;

mod propagate;
pub use propagate::propagate;

mod aggregate;
pub use aggregate::aggregate;

pub mod pagerank;
pub use pagerank::PageRank;

mod ranking;
pub use ranking::Ranking;
