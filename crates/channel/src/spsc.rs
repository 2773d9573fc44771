// SPDX-License-Identifier: Apache-2.0

//! Single-producer, single-consumer bounded channel with explicit closure.
//!
//! Unlike a plain mpsc channel, a pipeline edge can be closed by a third
//! party: the shutdown coordinator holds a [`Closer`] per edge and marks the
//! channel terminal once every upstream of the consumer has drained. After
//! `close`, queued values are still delivered; once the buffer is empty the
//! consumer sees [`RecvError::Closed`] as end-of-stream.

use crate::error::{RecvError, SendError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct ChannelState<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    is_closed: bool,
    sender_alive: bool,
    receiver_alive: bool,
    receiver_waker: Option<Waker>,
    sender_waker: Option<Waker>,
}

struct Shared<T> {
    state: Mutex<ChannelState<T>>,
}

/// Creates a bounded channel with the given capacity.
///
/// Capacity zero is rounded up to one; a channel must be able to hold at
/// least one in-flight value.
#[must_use]
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            is_closed: false,
            sender_alive: true,
            receiver_alive: true,
            receiver_waker: None,
            sender_waker: None,
        }),
    });

    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

/// The producer end of a channel. Owned by exactly one driver.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// The consumer end of a channel. Owned by exactly one driver.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// A detached handle that can close the channel without owning either end.
pub struct Closer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Closer<T> {
    fn clone(&self) -> Self {
        Closer {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Closer<T> {
    /// Marks the channel terminal and wakes both ends. Idempotent.
    ///
    /// Values already queued are still delivered to the consumer before it
    /// observes end-of-stream.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.is_closed = true;
        if let Some(waker) = state.receiver_waker.take() {
            waker.wake();
        }
        if let Some(waker) = state.sender_waker.take() {
            waker.wake();
        }
    }
}

impl<T> Sender<T> {
    /// Returns a close handle for this channel.
    #[must_use]
    pub fn closer(&self) -> Closer<T> {
        Closer {
            shared: self.shared.clone(),
        }
    }

    /// Attempts to enqueue a value without suspending.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Full`] when the buffer is at capacity and
    /// [`SendError::Closed`] when the channel is terminal or the consumer is
    /// gone.
    pub fn try_send(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.shared.state.lock();

        if state.is_closed || !state.receiver_alive {
            return Err(SendError::Closed(value));
        }
        if state.buffer.len() >= state.capacity {
            return Err(SendError::Full(value));
        }

        state.buffer.push_back(value);
        if let Some(waker) = state.receiver_waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Enqueues a value, suspending while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] when the channel is terminal or the
    /// consumer is gone.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        SendFuture {
            sender: self,
            value: Some(value),
        }
        .await
    }
}

impl<T> Receiver<T> {
    /// Attempts to dequeue a value without suspending.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Empty`] when nothing is queued yet and
    /// [`RecvError::Closed`] once the channel is terminal and drained.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut state = self.shared.state.lock();

        if let Some(value) = state.buffer.pop_front() {
            if let Some(waker) = state.sender_waker.take() {
                waker.wake();
            }
            return Ok(value);
        }
        if state.is_closed || !state.sender_alive {
            Err(RecvError::Closed)
        } else {
            Err(RecvError::Empty)
        }
    }

    /// Dequeues the next value, suspending while the channel is empty.
    ///
    /// Cancel-safe: dropping the returned future never loses a value.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Closed`] once the channel is terminal and
    /// drained; this is the end-of-stream marker.
    pub async fn recv(&self) -> Result<T, RecvError> {
        RecvFuture { receiver: self }.await
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.sender_alive = false;
        if let Some(waker) = state.receiver_waker.take() {
            waker.wake();
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.receiver_alive = false;
        if let Some(waker) = state.sender_waker.take() {
            waker.wake();
        }
    }
}

struct SendFuture<'a, T> {
    sender: &'a Sender<T>,
    value: Option<T>,
}

impl<T> Unpin for SendFuture<'_, T> {}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The whole attempt happens under one lock acquisition so a consumer
        // cannot drain the buffer between the capacity check and waker
        // registration.
        let mut state = self.sender.shared.state.lock();

        if state.is_closed || !state.receiver_alive {
            drop(state);
            let value = self.value.take().expect("SendFuture polled after completion");
            return Poll::Ready(Err(SendError::Closed(value)));
        }
        if state.buffer.len() < state.capacity {
            let value = self.value.take().expect("SendFuture polled after completion");
            state.buffer.push_back(value);
            if let Some(waker) = state.receiver_waker.take() {
                waker.wake();
            }
            return Poll::Ready(Ok(()));
        }

        state.sender_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

struct RecvFuture<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.receiver.shared.state.lock();

        if let Some(value) = state.buffer.pop_front() {
            if let Some(waker) = state.sender_waker.take() {
                waker.wake();
            }
            return Poll::Ready(Ok(value));
        }
        if state.is_closed || !state.sender_alive {
            return Poll::Ready(Err(RecvError::Closed));
        }

        state.receiver_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    #![allow(missing_docs)]
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn basic_send_recv_preserves_order() {
        let (tx, rx) = bounded(4);
        tx.send(1).await.expect("send");
        tx.send(2).await.expect("send");
        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Ok(2));
        assert_eq!(rx.try_recv(), Err(RecvError::Empty));
    }

    #[tokio::test]
    async fn try_send_reports_full() {
        let (tx, _rx) = bounded(1);
        tx.try_send(1).expect("first send fits");
        assert!(matches!(tx.try_send(2), Err(SendError::Full(2))));
    }

    #[tokio::test]
    async fn full_channel_blocks_producer_until_drained() {
        let (tx, rx) = bounded(1);
        tx.send(1).await.expect("send");

        let producer = tokio::spawn(async move {
            tx.send(2).await.expect("send unblocks after recv");
        });

        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await, Ok(1));

        timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer should complete")
            .expect("producer task");
        assert_eq!(rx.recv().await, Ok(2));
    }

    #[tokio::test]
    async fn close_delivers_queued_then_end_of_stream() {
        let (tx, rx) = bounded(4);
        tx.send(1).await.expect("send");
        let closer = tx.closer();
        closer.close();
        closer.close(); // idempotent

        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Err(RecvError::Closed));
        assert!(matches!(tx.try_send(2), Err(SendError::Closed(2))));
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let (tx, rx) = bounded::<i32>(1);
        let closer = tx.closer();

        let consumer = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        closer.close();

        let result = timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should be woken")
            .expect("consumer task");
        assert_eq!(result, Err(RecvError::Closed));
    }

    #[tokio::test]
    async fn sender_drop_ends_stream_after_drain() {
        let (tx, rx) = bounded(2);
        tx.send(7).await.expect("send");
        drop(tx);

        assert_eq!(rx.recv().await, Ok(7));
        assert_eq!(rx.recv().await, Err(RecvError::Closed));
    }

    #[tokio::test]
    async fn receiver_drop_fails_send() {
        let (tx, rx) = bounded(2);
        drop(rx);
        assert!(matches!(tx.send(1).await, Err(SendError::Closed(1))));
    }

    #[tokio::test]
    async fn close_wakes_blocked_producer() {
        let (tx, rx) = bounded(1);
        tx.send(1).await.expect("send");
        let closer = tx.closer();

        let producer = tokio::spawn(async move { tx.send(2).await });
        tokio::task::yield_now().await;
        closer.close();

        let result = timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer should be woken")
            .expect("producer task");
        assert!(matches!(result, Err(SendError::Closed(2))));

        // The queued value is still delivered.
        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Err(RecvError::Closed));
    }
}
