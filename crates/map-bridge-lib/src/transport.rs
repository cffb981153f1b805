//! Outbound messaging to the host
//!
//! The bridge never owns the host connection. It sends named messages through a [`Messenger`]
//! supplied by the host; [`ChannelMessenger`] scopes channel names to one map instance.

use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Sends one message on a named channel
pub trait Messenger {
    fn send(&self, channel: &str, payload: Value);
}

impl<M: Messenger + ?Sized> Messenger for &M {
    fn send(&self, channel: &str, payload: Value) {
        (**self).send(channel, payload)
    }
}

impl<M: Messenger + ?Sized> Messenger for Rc<M> {
    fn send(&self, channel: &str, payload: Value) {
        (**self).send(channel, payload)
    }
}

/// Appends the map instance suffix `/map_<index>` to every channel name
#[derive(Debug)]
pub struct ChannelMessenger<M> {
    inner: M,
    suffix: String,
}

impl<M: Messenger> ChannelMessenger<M> {
    pub fn new(inner: M, map_index: u32) -> Self {
        Self {
            inner,
            suffix: format!("/map_{map_index}"),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: Messenger> Messenger for ChannelMessenger<M> {
    fn send(&self, channel: &str, payload: Value) {
        self.inner.send(&format!("{channel}{}", self.suffix), payload);
    }
}

/// A message as it left the bridge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub payload: Value,
}

/// Keeps every sent message in order
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    messages: RefCell<Vec<OutboundMessage>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.borrow().clone()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<OutboundMessage> {
        self.messages.take()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }
}

impl Messenger for RecordingMessenger {
    fn send(&self, channel: &str, payload: Value) {
        tracing::trace!("Sending message on `{channel}`");
        self.messages.borrow_mut().push(OutboundMessage {
            channel: channel.to_string(),
            payload,
        });
    }
}
