//! Per-request response channels.
//!
//! Every request that expects a reply gets a [`ResponseHandle`]; the matching
//! sender sits in the connection's FIFO queue. RECORD messages are delivered
//! to the head of the queue without removing it; a summary (SUCCESS, FAILURE
//! or IGNORED) is delivered and the entry is dropped, which closes the
//! channel. Nothing else ever writes to a handle, so a handle sees its events
//! in arrival order and exactly one summary.

use tokio::sync::mpsc;

use crate::bolt::{FailureMessage, PackStreamValue, SuccessMessage};

/// One event for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// A result row
    Record(Vec<PackStreamValue>),
    /// Terminal success
    Success(SuccessMessage),
    /// Terminal failure
    Failure(FailureMessage),
    /// Terminal: skipped because an earlier request failed
    Ignored,
}

impl ResponseEvent {
    /// Whether this event ends the response.
    pub fn is_summary(&self) -> bool {
        !matches!(self, ResponseEvent::Record(_))
    }
}

/// Queue entry owned by the connection.
#[derive(Debug)]
pub(crate) struct PendingResponse {
    pub(crate) request: &'static str,
    tx: mpsc::UnboundedSender<ResponseEvent>,
}

impl PendingResponse {
    /// Deliver an event. A handle that was dropped simply discards it.
    pub(crate) fn deliver(&self, event: ResponseEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receiving end for one request.
#[derive(Debug)]
pub struct ResponseHandle {
    request: &'static str,
    rx: mpsc::UnboundedReceiver<ResponseEvent>,
    done: bool,
}

impl ResponseHandle {
    /// Name of the request this handle answers.
    pub fn request(&self) -> &'static str {
        self.request
    }

    /// Whether the summary has been taken.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Take an event that has already arrived.
    pub(crate) fn try_take(&mut self) -> Option<ResponseEvent> {
        let event = self.rx.try_recv().ok()?;
        if event.is_summary() {
            self.done = true;
        }
        Some(event)
    }
}

/// Create a linked queue entry and handle.
pub(crate) fn channel(request: &'static str) -> (PendingResponse, ResponseHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PendingResponse { request, tx },
        ResponseHandle {
            request,
            rx,
            done: false,
        },
    )
}
