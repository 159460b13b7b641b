//! Unbounded single-consumer work queue.

use tokio::sync::mpsc;

/// Create a connected sender/receiver pair.
pub fn mailbox<T>() -> (MailboxSender<T>, Mailbox<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, Mailbox { rx })
}

/// Producer side. Sending never blocks.
pub struct MailboxSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> MailboxSender<T> {
    /// Queue a message. Returns it back if the receiver is gone.
    pub fn send(&self, message: T) -> Result<(), T> {
        self.tx.send(message).map_err(|err| err.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for MailboxSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Consumer side, owned by exactly one task.
#[derive(Debug)]
pub struct Mailbox<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Mailbox<T> {
    /// Next message, or `None` once every sender is dropped (or after
    /// [`Mailbox::stop`]) and the queue is empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Refuse further messages and return everything already queued.
    pub fn stop(&mut self) -> Vec<T> {
        self.rx.close();
        let mut remaining = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            remaining.push(message);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (tx, mut rx) = mailbox();
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn recv_ends_when_senders_drop() {
        let (tx, mut rx) = mailbox::<u8>();
        let other = tx.clone();
        drop(tx);
        other.send(1).unwrap();
        drop(other);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn stop_drains_and_rejects() {
        let (tx, mut rx) = mailbox();
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        assert_eq!(rx.stop(), vec!["a", "b"]);
        assert!(tx.is_closed());
        assert_eq!(tx.send("c"), Err("c"));
    }
}
