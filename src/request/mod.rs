//! One outbound message's full lifecycle (§3 Request, §4.E): enqueue, await
//! response, match, retry, replace. `UpdateReq`/`StateChangeReq` are modeled
//! as the `RequestMessage` tagged enum in `message.rs`; this module holds the
//! shared state machine around it.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod listener;
pub mod message;

pub use listener::RequestListener;
pub use message::{RequestMessage, RequestSubtype};

use std::{pin::Pin, sync::Arc, time::Duration};

use anyhow::Result;

use crate::{
    bus::{QueueToken, Replaced, TokenSink},
    dispatcher::RequestIdDispatcher,
    error::PdpCoreError,
    messages::PdpStatus,
    timer::{Timer, TimerManager},
};

type ResponseHandler = Arc<dyn Fn(PdpStatus) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
type TimeoutHandler = Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Publishing,
    CompletedOk,
    CompletedFail,
}

/// Exactly-one-owner value held by its `PdpRequests` slot (§3).
pub struct Request<L: RequestListener> {
    /// Fixed at construction, stable across `reconfigure` (§9 decision b).
    name: String,
    message: RequestMessage,
    retry_count: u32,
    max_retry_count: u32,
    state: RequestState,
    token: Option<QueueToken>,
    timer: Option<Timer>,
    listener: Option<Arc<L>>,
    response_handler: Option<ResponseHandler>,
    timeout_handler: Option<TimeoutHandler>,
}

impl<L: RequestListener> Request<L> {
    pub fn new(message: RequestMessage, max_retry_count: u32) -> Self {
        let name = message.target_name().unwrap_or("broadcast").to_string();
        Request {
            name,
            message,
            retry_count: 0,
            max_retry_count,
            state: RequestState::Idle,
            token: None,
            timer: None,
            listener: None,
            response_handler: None,
            timeout_handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn priority(&self) -> u8 {
        self.message.priority()
    }

    pub fn message(&self) -> &RequestMessage {
        &self.message
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_same_content(&self, other: &RequestMessage) -> bool {
        self.message.is_same_content(other)
    }

    /// Invariant R1: publishing iff a registered listener, a live timer, and
    /// a live token all hold at once.
    pub fn is_publishing(&self) -> bool {
        self.state == RequestState::Publishing && self.timer.is_some() && self.token.is_some()
    }

    pub fn set_listener(&mut self, listener: Arc<L>) {
        self.listener = Some(listener);
    }

    /// Installs the handlers `startPublishing`/`reconfigure` register with
    /// the Dispatcher and TimerManager. Set once, before the first
    /// `startPublishing`, by the owning `PdpRequests`.
    pub fn set_callbacks<F1, Fut1, F2, Fut2>(&mut self, on_response: F1, on_timeout: F2)
    where
        F1: Fn(PdpStatus) -> Fut1 + Send + Sync + 'static,
        Fut1: Future<Output = ()> + Send + 'static,
        F2: Fn(String) -> Fut2 + Send + Sync + 'static,
        Fut2: Future<Output = ()> + Send + 'static,
    {
        self.response_handler = Some(Arc::new(move |s| Box::pin(on_response(s))));
        self.timeout_handler = Some(Arc::new(move |k| Box::pin(on_timeout(k))));
    }

    /// §3 invariant R2: at the limit, returns `false` and leaves the count
    /// unchanged.
    pub fn bump_retry_count(&mut self) -> bool {
        if self.retry_count >= self.max_retry_count {
            return false;
        }
        self.retry_count += 1;
        true
    }

    pub fn reset_retry_count(&mut self) {
        self.retry_count = 0;
    }

    async fn rearm_timer(&mut self, timer_manager: &TimerManager, max_wait: Duration) {
        let timeout_handler = self
            .timeout_handler
            .clone()
            .expect("callbacks set before startPublishing");
        let timer = timer_manager
            .register(self.name.clone(), max_wait, move |k: String| {
                let handler = timeout_handler.clone();
                async move { handler(k).await }
            })
            .await;
        self.timer = Some(timer);
    }

    fn register_response_handler(&self, request_id: String, dispatcher: &RequestIdDispatcher) {
        let response_handler = self
            .response_handler
            .clone()
            .expect("callbacks set before startPublishing");
        dispatcher.register(request_id, move |s: PdpStatus| {
            let handler = response_handler.clone();
            async move { handler(s).await }
        });
    }

    /// §4.E `startPublishing`. Illegal (fail-fast) if the listener or
    /// callbacks have not been set. Idempotent while already `Publishing`.
    pub async fn start_publishing(
        &mut self,
        preferred_token: Option<QueueToken>,
        publisher: &dyn TokenSink,
        dispatcher: &RequestIdDispatcher,
        timer_manager: &TimerManager,
        max_wait: Duration,
    ) -> Result<()> {
        if self.listener.is_none() {
            return Err(PdpCoreError::InvalidArgument("listener not set before startPublishing".into()).into());
        }
        if self.response_handler.is_none() || self.timeout_handler.is_none() {
            return Err(PdpCoreError::InvalidArgument("callbacks not set before startPublishing".into()).into());
        }
        if self.state == RequestState::Publishing {
            return Ok(());
        }

        self.register_response_handler(self.message.request_id().to_string(), dispatcher);
        self.rearm_timer(timer_manager, max_wait).await;

        let token = match preferred_token {
            Some(t) => match t.replace_item(self.message.to_envelope()).await {
                Replaced::Previous(_) => t,
                Replaced::AlreadyTaken => {
                    let fresh = QueueToken::new(self.message.to_envelope());
                    publisher.enqueue(fresh.clone())?;
                    fresh
                },
            },
            None => {
                let fresh = QueueToken::new(self.message.to_envelope());
                publisher.enqueue(fresh.clone())?;
                fresh
            },
        };

        self.token = Some(token);
        self.state = RequestState::Publishing;
        Ok(())
    }

    /// §4.E `reconfigure`. Rejects a message of a different subtype outright
    /// (§9 decision b: this model never swaps subtype in place, so the
    /// returned bool is always `false`).
    pub async fn reconfigure(
        &mut self,
        new_message: RequestMessage,
        optional_replacement_token: Option<QueueToken>,
        dispatcher: &RequestIdDispatcher,
        timer_manager: &TimerManager,
        max_wait: Duration,
    ) -> Result<bool> {
        if self.message.kind_name() != new_message.kind_name() {
            return Err(PdpCoreError::WrongMessageSubtype {
                expected: self.message.kind_name(),
                got: new_message.kind_name(),
            }
            .into());
        }

        if self.state == RequestState::Publishing {
            dispatcher.unregister(self.message.request_id());
            if let Some(timer) = self.timer.take() {
                timer.cancel();
            }

            self.register_response_handler(new_message.request_id().to_string(), dispatcher);
            self.rearm_timer(timer_manager, max_wait).await;

            let target_token = match optional_replacement_token {
                Some(replacement) => {
                    if let Some(old_token) = self.token.take() {
                        old_token.clear().await;
                    }
                    replacement
                },
                None => self.token.clone().unwrap_or_else(QueueToken::empty),
            };
            target_token.replace_item(new_message.to_envelope()).await;
            self.token = Some(target_token);
        }

        self.message = new_message;
        self.retry_count = 0;
        Ok(false)
    }

    /// §4.E `stopPublishing`. `retain_token = true` empties the slot in
    /// place; `false` hands the still-live token back to the caller so it can
    /// be reused by the next `Request` (the coalescing path in
    /// `PdpRequests::start_next_request`).
    pub async fn stop_publishing(&mut self, dispatcher: &RequestIdDispatcher, retain_token: bool) -> Option<QueueToken> {
        dispatcher.unregister(self.message.request_id());
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if self.state == RequestState::Publishing {
            self.state = RequestState::Idle;
        }

        match self.token.take() {
            Some(token) if retain_token => {
                token.clear().await;
                None
            },
            other => other,
        }
    }

    /// §4.E `processResponse`. Always exits `Publishing` regardless of
    /// outcome (invariant R1 no longer holds once this returns).
    pub async fn process_response(&mut self, status: &PdpStatus, dispatcher: &RequestIdDispatcher) {
        dispatcher.unregister(self.message.request_id());
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if let Some(token) = self.token.take() {
            token.clear().await;
        }

        let listener = self.listener.clone().expect("listener set before startPublishing");
        let effective_name = status.name.clone().unwrap_or_else(|| self.name.clone());

        match self.message.validate_response(status) {
            Ok(()) => {
                self.state = RequestState::CompletedOk;
                listener.success(effective_name).await;
            },
            Err(reason) => {
                self.state = RequestState::CompletedFail;
                listener.failure(effective_name, reason).await;
            },
        }
    }

    /// §4.E `handleTimeout`. A token still holding its message means the
    /// Publisher never actually sent it (bus backlog) — that is not a real
    /// timeout, so the retry budget is untouched and the timer simply
    /// re-arms. Otherwise the usual retry/exhaust path applies.
    pub async fn handle_timeout(
        &mut self,
        publisher: &dyn TokenSink,
        dispatcher: &RequestIdDispatcher,
        timer_manager: &TimerManager,
        max_wait: Duration,
    ) -> Result<()> {
        let never_sent = match &self.token {
            Some(token) => token.get().await.is_some(),
            None => false,
        };

        if never_sent {
            self.reset_retry_count();
            self.rearm_timer(timer_manager, max_wait).await;
            return Ok(());
        }

        if self.bump_retry_count() {
            let fresh = QueueToken::new(self.message.to_envelope());
            publisher.enqueue(fresh.clone())?;
            self.token = Some(fresh);
            self.rearm_timer(timer_manager, max_wait).await;
            Ok(())
        } else {
            dispatcher.unregister(self.message.request_id());
            self.token = None;
            self.state = RequestState::CompletedFail;
            let listener = self.listener.clone().expect("listener set before startPublishing");
            listener.retry_count_exhausted().await;
            Ok(())
        }
    }
}
