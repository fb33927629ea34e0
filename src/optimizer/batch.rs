//! Per-class request coalescing.
//!
//! The first request of a class opens a window; the batch is dispatched when the
//! window elapses or the batch reaches its maximum size, whichever comes first.
//! Each caller waits on its own oneshot reply. A caller that goes away before the
//! dispatch has its entry removed by the [`BatchTicket`] drop.

use super::Inner;
use crate::transport::{WireRequest, WireResponse};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

pub(super) struct BatchEntry {
    ticket: u64,
    request: WireRequest,
    reply: oneshot::Sender<Result<WireResponse>>,
}

pub(super) struct PendingBatch {
    generation: u64,
    entries: Vec<BatchEntry>,
}

impl PendingBatch {
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Removes a caller's entry from its pending batch when the caller stops waiting.
struct BatchTicket {
    inner: Arc<Inner>,
    class: String,
    ticket: u64,
}

impl Drop for BatchTicket {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        let emptied = match state.batches.get_mut(&self.class) {
            Some(batch) => {
                batch.entries.retain(|e| e.ticket != self.ticket);
                batch.entries.is_empty()
            }
            None => false,
        };
        if emptied {
            state.batches.remove(&self.class);
        }
    }
}

pub(super) async fn submit(inner: &Arc<Inner>, request: WireRequest) -> Result<WireResponse> {
    let class = request.batch_class.clone().unwrap_or_default();
    let (tx, rx) = oneshot::channel();

    let (ticket, full, opened) = {
        let mut state = inner.lock();
        state.counter += 1;
        let ticket = state.counter;
        let opened = match state.batches.get(&class) {
            Some(_) => None,
            None => Some(ticket),
        };
        let batch = state
            .batches
            .entry(class.clone())
            .or_insert_with(|| PendingBatch {
                generation: ticket,
                entries: Vec::new(),
            });
        batch.entries.push(BatchEntry {
            ticket,
            request,
            reply: tx,
        });
        let full = if batch.len() >= inner.config.max_batch_size.max(1) {
            state.batches.remove(&class)
        } else {
            None
        };
        (ticket, full, opened)
    };

    let _ticket = BatchTicket {
        inner: inner.clone(),
        class: class.clone(),
        ticket,
    };

    if let Some(batch) = full {
        debug!(class = class.as_str(), size = batch.len(), "batch full, flushing");
        tokio::spawn(dispatch(inner.clone(), class, batch));
    } else if let Some(generation) = opened {
        let inner = inner.clone();
        let window = inner.config.batch_window();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let batch = {
                let mut state = inner.lock();
                match state.batches.get(&class) {
                    Some(b) if b.generation == generation => state.batches.remove(&class),
                    _ => None,
                }
            };
            if let Some(batch) = batch {
                debug!(class = class.as_str(), size = batch.len(), "batch window elapsed, flushing");
                dispatch(inner, class, batch).await;
            }
        });
    }

    rx.await
        .unwrap_or_else(|_| Err(Error::transport("batch dispatcher dropped the request")))
}

async fn dispatch(inner: Arc<Inner>, class: String, batch: PendingBatch) {
    let (requests, replies): (Vec<_>, Vec<_>) = batch
        .entries
        .into_iter()
        .map(|e| (e.request, e.reply))
        .unzip();
    let results = inner.transport.send_batch(&requests).await;
    if results.len() != replies.len() {
        debug!(
            class = class.as_str(),
            expected = replies.len(),
            got = results.len(),
            "batch result count mismatch"
        );
    }
    let mut results = results.into_iter();
    for reply in replies {
        let result = results.next().unwrap_or_else(|| {
            Err(Error::transport(
                "batch returned fewer responses than requests",
            ))
        });
        // The caller may have gone away; its result is discarded.
        let _ = reply.send(result);
    }
}
