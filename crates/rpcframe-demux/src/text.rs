use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::registry::StreamRegistry;

pub(crate) type TextSender = mpsc::UnboundedSender<Result<String>>;

/// The textual result channel: one item per TEXT frame, in wire order.
///
/// Ends when the input is exhausted; yields the decoder's error once if the
/// response fails. [`TextChannel::cancel`] tears down the whole response.
pub struct TextChannel {
    rx: mpsc::UnboundedReceiver<Result<String>>,
    cancel: CancellationToken,
    registry: StreamRegistry,
    cancelled: bool,
}

impl TextChannel {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Result<String>>,
        cancel: CancellationToken,
        registry: StreamRegistry,
    ) -> Self {
        Self {
            rx,
            cancel,
            registry,
            cancelled: false,
        }
    }

    /// Cancel the response.
    ///
    /// Every raw stream still open fails with [`DecodeError::Cancelled`], the
    /// registry is cleared, and the driver drops the input source. No further
    /// frames are dispatched. A no-op once the response has finished.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.rx.close();
        if self.registry.fail_all(DecodeError::Cancelled, true) {
            debug!("framed response cancelled by text consumer");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> Option<Result<String>> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }
}

impl Stream for TextChannel {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for TextChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChannel")
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
