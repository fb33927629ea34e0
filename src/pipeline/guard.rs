use crate::error::ErrorKind;
use crate::types::{EventStream, ResponseEvent};
use futures::{stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct GuardState<H> {
    inner: EventStream,
    deadline: Instant,
    cancel: CancellationToken,
    _hold: Option<H>,
    done: bool,
}

/// Wrap an event stream so that it ends with exactly one terminal event.
///
/// - the deadline elapsing yields `Error(Timeout)`
/// - cancellation yields `Error(Cancelled)`
/// - an inner stream that ends without a terminal yields `Error(Malformed)`
/// - anything the inner stream produces after its terminal is dropped
///
/// `hold` is released together with the inner stream once the terminal is emitted.
pub fn terminated<H>(
    inner: EventStream,
    deadline: Instant,
    cancel: CancellationToken,
    hold: H,
) -> EventStream
where
    H: Send + 'static,
{
    let state = GuardState {
        inner,
        deadline,
        cancel,
        _hold: Some(hold),
        done: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = st.cancel.cancelled() => {
                ResponseEvent::error(ErrorKind::Cancelled, "request cancelled by caller")
            }
            _ = tokio::time::sleep_until(st.deadline) => {
                ResponseEvent::error(ErrorKind::Timeout, "deadline exceeded before the response completed")
            }
            next = st.inner.next() => match next {
                Some(event) => event,
                None => ResponseEvent::error(
                    ErrorKind::Malformed,
                    "event stream ended without a terminal event",
                ),
            },
        };
        if event.is_terminal() {
            st.done = true;
            st.inner = Box::pin(stream::empty());
            st._hold = None;
        }
        Some((event, st))
    }))
}
