//! Direct messages between identities.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{WorkflowError, WorkflowResult, MESSAGES_SENT_TOTAL};
use crate::db::DirectMessage;
use crate::relay::MessageRelay;
use crate::store::{IdentityStore, MessageStore};

const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Clone)]
pub struct MessagingWorkflow {
    messages: Arc<dyn MessageStore>,
    identities: Arc<dyn IdentityStore>,
    relay: Arc<dyn MessageRelay>,
}

impl MessagingWorkflow {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        identities: Arc<dyn IdentityStore>,
        relay: Arc<dyn MessageRelay>,
    ) -> Self {
        Self {
            messages,
            identities,
            relay,
        }
    }

    /// Store a message from the authenticated caller and push it to the
    /// recipient's relay room.
    #[instrument(skip(self, content))]
    pub async fn send(
        &self,
        caller: &str,
        from_user: &str,
        to_user: &str,
        content: &str,
    ) -> WorkflowResult<DirectMessage> {
        if from_user != caller {
            return Err(WorkflowError::Forbidden("Cannot send messages on behalf of another user"));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(WorkflowError::Validation {
                field: "content",
                message: "Message content is required".to_string(),
            });
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(WorkflowError::Validation {
                field: "content",
                message: format!("Message must be at most {} characters", MAX_MESSAGE_LEN),
            });
        }
        if to_user == caller {
            return Err(WorkflowError::Validation {
                field: "toUser",
                message: "Cannot send a message to yourself".to_string(),
            });
        }
        if self.identities.find_by_id(to_user).await?.is_none() {
            return Err(WorkflowError::UnknownParty("Recipient not found"));
        }

        let message = DirectMessage::new(caller.to_string(), to_user.to_string(), content.to_string());
        self.messages.insert_message(&message).await?;

        let delivered = self.relay.publish(to_user, &message);
        debug!(message_id = %message.id, delivered, "Message stored");
        metrics::counter!(MESSAGES_SENT_TOTAL).increment(1);

        Ok(message)
    }

    /// Full conversation between a student and an alumni, oldest first.
    /// Only the two participants may read it.
    pub async fn conversation(
        &self,
        caller: &str,
        student_id: &str,
        alumni_id: &str,
    ) -> WorkflowResult<Vec<DirectMessage>> {
        if caller != student_id && caller != alumni_id {
            return Err(WorkflowError::Forbidden("Not a participant in this conversation"));
        }
        Ok(self.messages.conversation(student_id, alumni_id).await?)
    }

    /// Latest message from each sender to an alumni, newest first
    pub async fn alumni_inbox(&self, caller: &str, alumni_id: &str) -> WorkflowResult<Vec<DirectMessage>> {
        if caller != alumni_id {
            return Err(WorkflowError::Forbidden("Cannot read another user's conversations"));
        }

        let received = self.messages.messages_to(alumni_id).await?;
        let mut seen = HashSet::new();
        Ok(received
            .into_iter()
            .filter(|m| seen.insert(m.from_user.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Identity, Profile};
    use crate::relay::BroadcastRelay;
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<BroadcastRelay>, MessagingWorkflow) {
        let store = Arc::new(MemoryStore::new());
        for (id, profile) in [
            ("s1", Profile::Student { roster_id: "PRN001".into() }),
            ("s2", Profile::Student { roster_id: "PRN002".into() }),
            ("a1", Profile::Alumni { graduation_year: None }),
        ] {
            store
                .insert_identity(&Identity {
                    id: id.into(),
                    email: format!("{}@example.edu", id),
                    name: id.into(),
                    password_hash: "x".into(),
                    profile,
                    created_at: chrono::Utc::now().to_rfc3339(),
                })
                .await
                .unwrap();
        }
        let relay = Arc::new(BroadcastRelay::new());
        let workflow = MessagingWorkflow::new(store.clone(), store, relay.clone());
        (relay, workflow)
    }

    #[tokio::test]
    async fn test_send_publishes_to_recipient_room() {
        let (relay, wf) = setup().await;
        let mut rx = relay.subscribe("a1");

        let sent = wf.send("s1", "s1", "a1", "  Hi there ").await.unwrap();
        assert_eq!(sent.content, "Hi there");

        let pushed = rx.recv().await.unwrap();
        assert_eq!(pushed.id, sent.id);
    }

    #[tokio::test]
    async fn test_send_rejects_spoofed_sender_and_bad_input() {
        let (_, wf) = setup().await;
        assert!(matches!(
            wf.send("s2", "s1", "a1", "hi").await,
            Err(WorkflowError::Forbidden(_))
        ));
        assert!(matches!(
            wf.send("s1", "s1", "a1", "   ").await,
            Err(WorkflowError::Validation { field: "content", .. })
        ));
        assert!(matches!(
            wf.send("s1", "s1", "ghost", "hi").await,
            Err(WorkflowError::UnknownParty(_))
        ));
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            wf.send("s1", "s1", "a1", &long).await,
            Err(WorkflowError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_conversation_is_private_to_participants() {
        let (_, wf) = setup().await;
        wf.send("s1", "s1", "a1", "question").await.unwrap();
        wf.send("a1", "a1", "s1", "answer").await.unwrap();

        let convo = wf.conversation("a1", "s1", "a1").await.unwrap();
        let contents: Vec<_> = convo.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["question", "answer"]);

        assert!(matches!(
            wf.conversation("s2", "s1", "a1").await,
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_alumni_inbox_keeps_latest_per_student() {
        let (_, wf) = setup().await;
        wf.send("s1", "s1", "a1", "first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        wf.send("s2", "s2", "a1", "other student").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        wf.send("s1", "s1", "a1", "second").await.unwrap();

        let inbox = wf.alumni_inbox("a1", "a1").await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].content, "second");
        assert_eq!(inbox[1].content, "other student");

        assert!(matches!(
            wf.alumni_inbox("s1", "a1").await,
            Err(WorkflowError::Forbidden(_))
        ));
    }
}
