//! Transport seam: the `Publisher` pump (§4.A), the `QueueToken` supersede
//! mechanism (§4.B), and the `BusSink`/`BusSource` traits standing in for
//! the out-of-scope message-bus transport (§4.J).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod publisher;
pub mod queue_token;
pub mod sink;

pub use publisher::{Publisher, TokenSink};
pub use queue_token::{QueueToken, Replaced};
pub use sink::{BusSink, BusSource, InMemoryBus};
