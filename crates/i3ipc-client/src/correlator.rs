//! Reply correlation
//!
//! i3 answers requests in the order it receives them and tags each reply only
//! with its kind, never with a request id. The correlator keeps one FIFO of
//! waiting callers per reply kind and hands each incoming reply to the oldest
//! caller of that kind.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::message::ReplyKind;

type ReplySender = oneshot::Sender<Result<Vec<u8>, IpcError>>;

#[derive(Debug, Default)]
struct State {
    queues: HashMap<ReplyKind, VecDeque<ReplySender>>,
    closed: bool,
}

/// Matches replies to waiting callers, first come first served per reply kind
#[derive(Debug, Default)]
pub struct Correlator {
    state: Mutex<State>,
}

/// A caller's place in line for one reply
#[derive(Debug)]
pub struct PendingReply {
    receiver: oneshot::Receiver<Result<Vec<u8>, IpcError>>,
}

impl PendingReply {
    /// Wait for the reply payload
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` if the connection tore down first,
    /// or whatever error the correlator was resolved with.
    pub async fn wait(self) -> Result<Vec<u8>, IpcError> {
        self.receiver
            .await
            .unwrap_or(Err(IpcError::ConnectionClosed))
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the back of the queue for `kind`
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionClosed` once [`Correlator::close`] has run.
    pub fn register(&self, kind: ReplyKind) -> Result<PendingReply, IpcError> {
        let mut state = self.lock();
        if state.closed {
            return Err(IpcError::ConnectionClosed);
        }

        let (sender, receiver) = oneshot::channel();
        state.queues.entry(kind).or_default().push_back(sender);
        Ok(PendingReply { receiver })
    }

    /// Hand `result` to the oldest caller waiting on `kind`
    ///
    /// Returns `false` when nobody was waiting; the reply is dropped.
    pub fn resolve(&self, kind: ReplyKind, result: Result<Vec<u8>, IpcError>) -> bool {
        let sender = {
            let mut state = self.lock();
            state.queues.get_mut(&kind).and_then(VecDeque::pop_front)
        };

        match sender {
            Some(sender) => {
                if sender.send(result).is_err() {
                    // Caller gave up (future dropped); its reply slot is still consumed
                    debug!(kind = %kind, "Reply receiver dropped before delivery");
                }
                true
            }
            None => {
                warn!(kind = %kind, "Received reply with no pending request, dropping");
                false
            }
        }
    }

    /// Drop the newest caller waiting on `kind`
    ///
    /// Used when a request was registered but its frame never made it onto
    /// the wire. Registration and sending both happen under the writer lock,
    /// so the newest entry is always that request's.
    pub fn withdraw(&self, kind: ReplyKind) -> bool {
        let withdrawn = self
            .lock()
            .queues
            .get_mut(&kind)
            .and_then(VecDeque::pop_back)
            .is_some();
        if withdrawn {
            debug!(kind = %kind, "Withdrew unsent request");
        }
        withdrawn
    }

    /// Number of callers waiting on `kind`
    pub fn pending(&self, kind: ReplyKind) -> usize {
        self.lock().queues.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Fail every waiting caller with `ConnectionClosed` and refuse new ones
    ///
    /// Returns how many callers were failed. Calling again is a no-op.
    pub fn close(&self) -> usize {
        let queues = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.queues)
        };

        let mut failed = 0;
        for sender in queues.into_values().flatten() {
            let _ = sender.send(Err(IpcError::ConnectionClosed));
            failed += 1;
        }

        if failed > 0 {
            debug!(failed, "Failed pending requests on close");
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_per_kind() {
        let correlator = Correlator::new();
        let first = correlator.register(ReplyKind::Marks).unwrap();
        let second = correlator.register(ReplyKind::Marks).unwrap();
        let other = correlator.register(ReplyKind::Tree).unwrap();
        assert_eq!(correlator.pending(ReplyKind::Marks), 2);

        assert!(correlator.resolve(ReplyKind::Marks, Ok(b"1".to_vec())));
        assert!(correlator.resolve(ReplyKind::Tree, Ok(b"tree".to_vec())));
        assert!(correlator.resolve(ReplyKind::Marks, Ok(b"2".to_vec())));

        assert_eq!(first.wait().await.unwrap(), b"1");
        assert_eq!(second.wait().await.unwrap(), b"2");
        assert_eq!(other.wait().await.unwrap(), b"tree");
        assert_eq!(correlator.pending(ReplyKind::Marks), 0);
    }

    #[test]
    fn test_resolve_without_pending_drops() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve(ReplyKind::Command, Ok(Vec::new())));

        let _waiting = correlator.register(ReplyKind::Tree).unwrap();
        assert!(!correlator.resolve(ReplyKind::Command, Ok(Vec::new())));
        assert_eq!(correlator.pending(ReplyKind::Tree), 1);
    }

    #[tokio::test]
    async fn test_resolve_with_error() {
        let correlator = Correlator::new();
        let pending = correlator.register(ReplyKind::Version).unwrap();
        correlator.resolve(ReplyKind::Version, Err(IpcError::UnexpectedReply { message_type: 7 }));
        assert!(matches!(
            pending.wait().await,
            Err(IpcError::UnexpectedReply { message_type: 7 })
        ));
    }

    #[tokio::test]
    async fn test_close_fails_everything_pending() {
        let correlator = Correlator::new();
        let waiting: Vec<_> = [ReplyKind::Marks, ReplyKind::Marks, ReplyKind::Command]
            .into_iter()
            .map(|kind| correlator.register(kind).unwrap())
            .collect();

        assert_eq!(correlator.close(), 3);
        assert!(correlator.is_closed());
        for pending in waiting {
            assert!(matches!(pending.wait().await, Err(IpcError::ConnectionClosed)));
        }

        assert_eq!(correlator.close(), 0);
    }

    #[test]
    fn test_register_after_close_is_refused() {
        let correlator = Correlator::new();
        correlator.close();
        assert!(matches!(
            correlator.register(ReplyKind::Workspaces),
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_caller_still_consumes_reply() {
        let correlator = Correlator::new();
        let abandoned = correlator.register(ReplyKind::Marks).unwrap();
        let next = correlator.register(ReplyKind::Marks).unwrap();
        drop(abandoned);

        assert!(correlator.resolve(ReplyKind::Marks, Ok(b"first".to_vec())));
        assert!(correlator.resolve(ReplyKind::Marks, Ok(b"second".to_vec())));
        assert_eq!(next.wait().await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_withdraw_removes_newest_only() {
        let correlator = Correlator::new();
        let first = correlator.register(ReplyKind::Command).unwrap();
        let unsent = correlator.register(ReplyKind::Command).unwrap();
        drop(unsent);

        assert!(correlator.withdraw(ReplyKind::Command));
        assert_eq!(correlator.pending(ReplyKind::Command), 1);
        assert!(!correlator.withdraw(ReplyKind::Tree));

        assert!(correlator.resolve(ReplyKind::Command, Ok(b"ok".to_vec())));
        assert_eq!(first.wait().await.unwrap(), b"ok");
    }
}
