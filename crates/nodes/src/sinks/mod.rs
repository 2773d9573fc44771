// SPDX-License-Identifier: Apache-2.0

//! Built-in sinks.

pub mod devnull;
pub mod file;
pub mod stdout;
