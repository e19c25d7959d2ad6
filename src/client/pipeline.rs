//! Module `pipeline`
//!
//! The ordered queue of in-flight commands. Commands are written to the wire
//! and appended to the queue under one lock, so queue order always equals
//! wire order. Replies arrive in that same order and are matched against the
//! head of the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use crate::client::command::Pending;
use crate::error::ChannelError;
use crate::utils::sync::lock;

/// What happened to a command handed to [`Pipeline::issue`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Issued {
    /// Written (if it has text) and appended to the queue.
    Queued,
    /// A sync marker issued on an empty queue; resolve it right away.
    Immediate,
}

/// The command(s) a reply resolves, popped from the queue.
pub(crate) struct Dispatch {
    pub(crate) head: Arc<Pending>,
    /// Sync markers that directly followed `head` and are now due.
    pub(crate) syncs: Vec<Arc<Pending>>,
}

struct PipelineState {
    queue: VecDeque<Arc<Pending>>,
    writer: Option<UnboundedSender<Vec<u8>>>,
    closed: Option<ChannelError>,
}

pub(crate) struct Pipeline {
    state: Mutex<PipelineState>,
}

impl Pipeline {
    /// Creates a pipeline writing encoded commands to `writer`, which is
    /// drained in order by the connection's writer task.
    pub(crate) fn new(writer: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            state: Mutex::new(PipelineState {
                queue: VecDeque::new(),
                writer: Some(writer),
                closed: None,
            }),
        }
    }

    /// Issues a command.
    ///
    /// A command with text is encoded with `encode`, handed to the writer
    /// and appended to the queue. A sync marker is appended too unless the
    /// queue is empty, in which case the caller resolves it immediately.
    pub(crate) fn issue<F>(&self, pending: Arc<Pending>, encode: F) -> Result<Issued, ChannelError>
    where
        F: FnOnce(&str) -> Result<Vec<u8>, ChannelError>,
    {
        let mut state = lock(&self.state);
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }

        match pending.text() {
            None if state.queue.is_empty() => return Ok(Issued::Immediate),
            None => {}
            Some(text) => {
                let line = encode(text)?;
                let writer = state.writer.as_ref().ok_or(ChannelError::Closed)?;
                writer.send(line).map_err(|_| ChannelError::Closed)?;
            }
        }

        state.queue.push_back(pending);
        Ok(Issued::Queued)
    }

    /// Picks the command(s) a reply belongs to.
    ///
    /// A preliminary reply goes to the head, which stays queued. Any other
    /// reply pops the head along with the sync markers directly behind it.
    /// Returns `None` if nothing is waiting for a reply.
    pub(crate) fn take(&self, preliminary: bool) -> Option<Dispatch> {
        let mut state = lock(&self.state);

        if preliminary {
            let head = state.queue.front()?;
            return Some(Dispatch {
                head: Arc::clone(head),
                syncs: Vec::new(),
            });
        }

        let head = state.queue.pop_front()?;
        let mut syncs = Vec::new();
        while state.queue.front().is_some_and(|next| next.is_sync()) {
            if let Some(sync) = state.queue.pop_front() {
                syncs.push(sync);
            }
        }
        Some(Dispatch { head, syncs })
    }

    /// Closes the pipeline. Later issues fail with `err`. Returns the
    /// commands that were still queued; the caller fails them. Only the first
    /// call has any effect.
    pub(crate) fn close(&self, err: ChannelError) -> Vec<Arc<Pending>> {
        let mut state = lock(&self.state);
        if state.closed.is_some() {
            return Vec::new();
        }
        state.closed = Some(err);
        state.writer = None;
        state.queue.drain(..).collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.state).closed.is_some()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Labels of the queued commands, head first.
    pub(crate) fn labels(&self) -> Vec<String> {
        lock(&self.state).queue.iter().map(|p| p.label()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn command(text: &str) -> Arc<Pending> {
        Arc::new(Pending::new(Some(text.to_string()), None))
    }

    fn sync() -> Arc<Pending> {
        Arc::new(Pending::new(None, None))
    }

    fn plain(text: &str) -> Result<Vec<u8>, ChannelError> {
        Ok(format!("{}\r\n", text).into_bytes())
    }

    #[test]
    fn test_wire_order_matches_queue_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(tx);
        for text in ["USER bob", "PASS x", "PWD"] {
            assert_eq!(pipeline.issue(command(text), plain).unwrap(), Issued::Queued);
        }
        assert_eq!(rx.try_recv().unwrap(), b"USER bob\r\n".to_vec());
        assert_eq!(rx.try_recv().unwrap(), b"PASS x\r\n".to_vec());
        assert_eq!(rx.try_recv().unwrap(), b"PWD\r\n".to_vec());
        assert_eq!(pipeline.labels(), vec!["USER bob", "PASS ****", "PWD"]);
    }

    #[test]
    fn test_sync_on_empty_queue_is_immediate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(tx);
        assert_eq!(pipeline.issue(sync(), plain).unwrap(), Issued::Immediate);
        assert_eq!(pipeline.len(), 0);
        assert!(rx.try_recv().is_err());

        pipeline.issue(command("NOOP"), plain).unwrap();
        assert_eq!(pipeline.issue(sync(), plain).unwrap(), Issued::Queued);
        assert_eq!(pipeline.len(), 2);
        // Sync markers never reach the wire.
        assert_eq!(rx.try_recv().unwrap(), b"NOOP\r\n".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_preliminary_peeks_terminal_pops() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(tx);
        pipeline.issue(command("RETR f"), plain).unwrap();
        pipeline.issue(command("NOOP"), plain).unwrap();

        let d = pipeline.take(true).unwrap();
        assert_eq!(d.head.text(), Some("RETR f"));
        assert_eq!(pipeline.len(), 2);

        let d = pipeline.take(false).unwrap();
        assert_eq!(d.head.text(), Some("RETR f"));
        assert!(d.syncs.is_empty());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_terminal_drains_trailing_syncs() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(tx);
        pipeline.issue(command("A"), plain).unwrap();
        pipeline.issue(sync(), plain).unwrap();
        pipeline.issue(sync(), plain).unwrap();
        pipeline.issue(command("B"), plain).unwrap();
        pipeline.issue(sync(), plain).unwrap();

        let d = pipeline.take(false).unwrap();
        assert_eq!(d.head.text(), Some("A"));
        assert_eq!(d.syncs.len(), 2);
        assert_eq!(pipeline.labels(), vec!["B", "<sync>"]);

        let d = pipeline.take(false).unwrap();
        assert_eq!(d.head.text(), Some("B"));
        assert_eq!(d.syncs.len(), 1);
        assert!(pipeline.take(false).is_none());
        assert!(pipeline.take(true).is_none());
    }

    #[test]
    fn test_encode_failure_does_not_enqueue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(tx);
        let result = pipeline.issue(command("PWD"), |_| Err(ChannelError::Security("no key".into())));
        assert!(matches!(result, Err(ChannelError::Security(_))));
        assert_eq!(pipeline.len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(tx);
        pipeline.issue(command("A"), plain).unwrap();
        pipeline.issue(sync(), plain).unwrap();

        let drained = pipeline.close(ChannelError::Closed);
        assert_eq!(drained.len(), 2);
        assert!(pipeline.is_closed());
        assert!(pipeline.close(ChannelError::Closed).is_empty());
        assert!(matches!(pipeline.issue(command("B"), plain), Err(ChannelError::Closed)));

        // The writer side is released on close.
        assert_eq!(rx.try_recv().unwrap(), b"A\r\n".to_vec());
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }
}
