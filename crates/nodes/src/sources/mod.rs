// SPDX-License-Identifier: Apache-2.0

//! Built-in sources.

pub mod socket;
