//! Error taxonomy (§7). Public fallible operations return `anyhow::Result`;
//! `PdpCoreError` is the concrete error usually carried inside it so a caller
//! that needs to branch (e.g. a REST façade mapping to an HTTP status) can
//! `downcast_ref` against it.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdpCoreError {
    /// Programmer error: null required parameter, wrong message subtype
    /// passed to `reconfigure`, broadcast on a targeted-only path.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A `PdpStatus` response disagreed with the outgoing message it was
    /// matched against (name/group/subgroup/state/policies).
    #[error("response mismatch: {0}")]
    ResponseMismatch(String),

    /// `reconfigure` was called with a message of a different subtype than
    /// the `Request` was constructed for.
    #[error("wrong message subtype: expected {expected}, got {got}")]
    WrongMessageSubtype { expected: &'static str, got: &'static str },

    /// A broadcast message (`name = null`) was rejected on a path that only
    /// issues targeted messages.
    #[error("broadcast rejected: {0}")]
    Broadcast(String),

    /// A collaborator failure (DAO, transport) the core only logs and does
    /// not itself retry.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
