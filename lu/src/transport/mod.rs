//! Messaging transport
//!
//! The transport exposes an append-only log of inbound messages per
//! conversation, each stamped with a monotonically increasing sequence
//! number, and sends outbound text to a group or a single member.

use async_trait::async_trait;
use thiserror::Error;

mod chat_db;

pub use chat_db::{ChatDbTransport, ChatSummary};

/// Position in a transport's message log
pub type Sequence = i64;

/// One inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sequence: Sequence,
    /// Contact of the sender (empty for our own messages on some transports)
    pub sender_id: String,
    pub text: String,
    /// Sent by this account
    pub is_self: bool,
}

/// Errors from the messaging transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Message database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to send to {target}: {message}")]
    Send { target: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(String),
}

/// Messaging surface consumed by the engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Messages in `conversation` with a sequence strictly greater than `since`, ascending
    async fn list_new_messages(&self, conversation: &str, since: Sequence)
    -> Result<Vec<InboundMessage>, TransportError>;

    /// Highest sequence currently in `conversation` (0 when empty)
    async fn latest_sequence(&self, conversation: &str) -> Result<Sequence, TransportError>;

    /// Post to a group conversation; resolves once the transport accepts it
    async fn send_group_message(&self, group_id: &str, text: &str) -> Result<(), TransportError>;

    /// Send a one-on-one message to a member contact
    async fn send_direct_message(&self, member_id: &str, text: &str) -> Result<(), TransportError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use tracing::debug;

    /// In-memory transport for unit tests
    ///
    /// Sequences are global across conversations, like row ids in a shared
    /// message table.
    #[derive(Default)]
    pub struct MemoryTransport {
        log: Mutex<HashMap<String, Vec<InboundMessage>>>,
        next_sequence: AtomicI64,
        group_sends: Mutex<Vec<(String, String)>>,
        direct_sends: Mutex<Vec<(String, String)>>,
        fail_sends: AtomicBool,
    }

    impl MemoryTransport {
        pub fn new() -> Self {
            debug!("MemoryTransport::new: called");
            Self::default()
        }

        /// Append an inbound message from `sender`; returns its sequence
        pub fn push(&self, conversation: &str, sender: &str, text: &str) -> Sequence {
            self.append(conversation, sender, text, false)
        }

        /// Append a message sent by this account
        pub fn push_self(&self, conversation: &str, text: &str) -> Sequence {
            self.append(conversation, "", text, true)
        }

        fn append(&self, conversation: &str, sender: &str, text: &str, is_self: bool) -> Sequence {
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            self.log
                .lock()
                .unwrap()
                .entry(conversation.to_string())
                .or_default()
                .push(InboundMessage {
                    sequence,
                    sender_id: sender.to_string(),
                    text: text.to_string(),
                    is_self,
                });
            sequence
        }

        /// Make every send fail
        pub fn fail_sends(&self) {
            self.fail_sends.store(true, Ordering::SeqCst);
        }

        pub fn group_sends(&self) -> Vec<(String, String)> {
            self.group_sends.lock().unwrap().clone()
        }

        pub fn direct_sends(&self) -> Vec<(String, String)> {
            self.direct_sends.lock().unwrap().clone()
        }

        pub fn direct_sends_to(&self, member: &str) -> Vec<String> {
            self.direct_sends()
                .into_iter()
                .filter(|(m, _)| m == member)
                .map(|(_, t)| t)
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn list_new_messages(
            &self,
            conversation: &str,
            since: Sequence,
        ) -> Result<Vec<InboundMessage>, TransportError> {
            let log = self.log.lock().unwrap();
            Ok(log
                .get(conversation)
                .map(|msgs| msgs.iter().filter(|m| m.sequence > since).cloned().collect())
                .unwrap_or_default())
        }

        async fn latest_sequence(&self, conversation: &str) -> Result<Sequence, TransportError> {
            let log = self.log.lock().unwrap();
            Ok(log
                .get(conversation)
                .and_then(|msgs| msgs.last())
                .map(|m| m.sequence)
                .unwrap_or(0))
        }

        async fn send_group_message(&self, group_id: &str, text: &str) -> Result<(), TransportError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::Send {
                    target: group_id.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            self.group_sends
                .lock()
                .unwrap()
                .push((group_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_direct_message(&self, member_id: &str, text: &str) -> Result<(), TransportError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::Send {
                    target: member_id.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            self.direct_sends
                .lock()
                .unwrap()
                .push((member_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_memory_transport_filters_by_cursor() {
            let transport = MemoryTransport::new();
            let first = transport.push("chat1", "+1", "hi");
            let second = transport.push("chat1", "+2", "yo");
            transport.push("other", "+3", "elsewhere");

            let all = transport.list_new_messages("chat1", 0).await.unwrap();
            assert_eq!(all.len(), 2);

            let after = transport.list_new_messages("chat1", first).await.unwrap();
            assert_eq!(after.len(), 1);
            assert_eq!(after[0].sequence, second);

            assert!(transport.list_new_messages("chat1", second).await.unwrap().is_empty());
            assert_eq!(transport.latest_sequence("chat1").await.unwrap(), second);
            assert_eq!(transport.latest_sequence("nobody").await.unwrap(), 0);
        }
    }
}
