//! `RequestListener` (§4.F invariant F1, §4.G): the callback surface a
//! `Request` invokes on terminal outcomes. The sole implementor in this
//! crate is `modify_map`'s per-PDP listener, but the trait is generic (not
//! `dyn`) so `Request`/`PdpRequests` tests can supply a recording double.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::future::Future;

pub trait RequestListener: Send + Sync + 'static {
    /// The response matched. `pdp_name` is the name reported in the
    /// response (relevant for broadcast outgoing messages).
    fn success(&self, pdp_name: String) -> impl Future<Output = ()> + Send;
    /// The response mismatched, or a broadcast response from a different
    /// PDP than the map is tracking.
    fn failure(&self, pdp_name: String, reason: String) -> impl Future<Output = ()> + Send;
    /// `maxRetryCount` was exceeded without a matching response.
    fn retry_count_exhausted(&self) -> impl Future<Output = ()> + Send;
}
