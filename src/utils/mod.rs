/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Miscellaneous utilities.

mod memory_usage;
pub use memory_usage::*;

pub mod shuffle;
pub use shuffle::Shuffle;

pub mod store;
