//! Single-shot completion for asynchronous engine work
//!
//! The engine receives a [`Completion`] and the caller keeps the matching [`PendingReply`].
//! `complete` consumes the completion, so an answer is delivered at most once; dropping it
//! unanswered surfaces as [`BridgeError::CompletionDropped`] on the caller's side instead of a
//! request that waits forever.

use crate::engine::EngineError;
use crate::{BridgeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use tokio::sync::oneshot;

type Payload = std::result::Result<Value, EngineError>;

/// Engine-side half: deliver exactly one result of type `T`
#[derive(Debug)]
pub struct Completion<T> {
    sender: oneshot::Sender<Payload>,
    _result: PhantomData<fn(T)>,
}

/// Caller-side half: the serialized result, once the engine has answered
#[derive(Debug)]
pub struct PendingReply {
    receiver: oneshot::Receiver<Payload>,
}

/// Create a connected completion/reply pair
pub fn channel<T>() -> (Completion<T>, PendingReply) {
    let (sender, receiver) = oneshot::channel();
    (
        Completion {
            sender,
            _result: PhantomData,
        },
        PendingReply { receiver },
    )
}

impl<T: Serialize> Completion<T> {
    /// Deliver the result and serialize it for the caller
    pub fn complete(self, result: std::result::Result<T, EngineError>) {
        let payload = result.and_then(|value| {
            serde_json::to_value(value).map_err(|e| EngineError::Serialization(e.to_string()))
        });
        if self.sender.send(payload).is_err() {
            tracing::debug!("Caller discarded the pending reply before completion");
        }
    }
}

impl<T> Completion<T> {
    /// Forget the result type; the caller only ever receives JSON
    pub(crate) fn untyped(self) -> Completion<Value> {
        Completion {
            sender: self.sender,
            _result: PhantomData,
        }
    }
}

impl PendingReply {
    /// Wait for the engine's answer without blocking the thread
    pub async fn wait(self) -> Result<Value> {
        match self.receiver.await {
            Ok(payload) => payload.map_err(BridgeError::from),
            Err(_) => Err(BridgeError::CompletionDropped),
        }
    }

    /// Poll for the answer; `None` while the engine is still working
    ///
    /// Once this has returned `Some`, the reply is spent and should be dropped.
    pub fn try_take(&mut self) -> Option<Result<Value>> {
        match self.receiver.try_recv() {
            Ok(payload) => Some(payload.map_err(BridgeError::from)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BridgeError::CompletionDropped)),
        }
    }
}
