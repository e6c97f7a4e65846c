//! Message Sequencer
//!
//! Every conversation has one actor task that owns its sequence counter. Appends,
//! edits and deletes for the conversation are queued to that actor and handled one
//! at a time: check, assign the next sequence number, persist, commit the counter,
//! dispatch, reply. Conversations never share an actor, so they do not contend.
//!
//! The actor runs detached from the caller; dropping the caller's future never
//! aborts a persist that is already in flight.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chatter_shared::time::Clock;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::domain::{
    ConversationId, LogError, Message, MessageContent, MessageId, MessageLog, Sequence, Timestamp,
    UserId,
};

use super::{
    conversation_directory::ConversationDirectory, dispatcher::FanOutDispatcher,
    error::ChatError,
};

const ACTOR_QUEUE_CAPACITY: usize = 256;

type Reply = oneshot::Sender<Result<Message, ChatError>>;

enum Command {
    Append {
        sender_id: UserId,
        content: MessageContent,
        reply: Reply,
    },
    Revise {
        message_id: MessageId,
        editor_id: UserId,
        revision: Revision,
        reply: Reply,
    },
}

enum Revision {
    Edit(MessageContent),
    Delete,
}

struct SequencerContext {
    directory: Arc<ConversationDirectory>,
    log: Arc<dyn MessageLog>,
    dispatcher: Arc<FanOutDispatcher>,
    clock: Arc<dyn Clock>,
    persist_timeout: Duration,
}

pub struct MessageSequencer {
    context: Arc<SequencerContext>,
    actors: RwLock<HashMap<ConversationId, mpsc::Sender<Command>>>,
    max_page_size: usize,
}

impl MessageSequencer {
    pub fn new(
        directory: Arc<ConversationDirectory>,
        log: Arc<dyn MessageLog>,
        dispatcher: Arc<FanOutDispatcher>,
        clock: Arc<dyn Clock>,
        persist_timeout: Duration,
        max_page_size: usize,
    ) -> Self {
        Self {
            context: Arc::new(SequencerContext {
                directory,
                log,
                dispatcher,
                clock,
                persist_timeout,
            }),
            actors: RwLock::new(HashMap::new()),
            max_page_size,
        }
    }

    /// Sequence, persist and dispatch a new message.
    ///
    /// # Errors
    ///
    /// * `ConversationNotFound` - unknown conversation
    /// * `NotAParticipant` - the sender is not a current participant
    /// * `PersistenceTimeout` - the log did not acknowledge in time; no sequence
    ///   number was consumed
    pub async fn append(
        &self,
        conversation_id: &ConversationId,
        sender_id: UserId,
        content: MessageContent,
    ) -> Result<Message, ChatError> {
        let (reply, response) = oneshot::channel();
        self.submit(
            conversation_id,
            Command::Append {
                sender_id,
                content,
                reply,
            },
        )
        .await?;
        Self::await_reply(conversation_id, response).await
    }

    /// Replace the content of a message. Only its sender may edit it.
    pub async fn edit(
        &self,
        message_id: &MessageId,
        editor_id: UserId,
        content: MessageContent,
    ) -> Result<Message, ChatError> {
        self.revise(message_id, editor_id, Revision::Edit(content))
            .await
    }

    /// Tombstone a message. Deleting a deleted message is a no-op.
    pub async fn delete(
        &self,
        message_id: &MessageId,
        editor_id: UserId,
    ) -> Result<Message, ChatError> {
        self.revise(message_id, editor_id, Revision::Delete).await
    }

    /// Messages with sequence greater than `after`, ascending, at most `limit`
    /// (capped at the configured maximum page size).
    ///
    /// Chaining calls on the last returned sequence walks the whole log.
    pub async fn fetch_since(
        &self,
        conversation_id: &ConversationId,
        after: Sequence,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        self.context.directory.get(conversation_id).await?;
        let limit = limit.min(self.max_page_size);
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .context
            .log
            .read_range(conversation_id, after, limit)
            .await?)
    }

    async fn revise(
        &self,
        message_id: &MessageId,
        editor_id: UserId,
        revision: Revision,
    ) -> Result<Message, ChatError> {
        let message = self
            .context
            .log
            .find(message_id)
            .await?
            .ok_or(ChatError::MessageNotFound(*message_id))?;

        let (reply, response) = oneshot::channel();
        self.submit(
            &message.conversation_id,
            Command::Revise {
                message_id: *message_id,
                editor_id,
                revision,
                reply,
            },
        )
        .await?;
        Self::await_reply(&message.conversation_id, response).await
    }

    async fn submit(
        &self,
        conversation_id: &ConversationId,
        command: Command,
    ) -> Result<(), ChatError> {
        let actor = self.actor_for(conversation_id).await?;
        if actor.send(command).await.is_err() {
            self.actors.write().await.remove(conversation_id);
            return Err(ChatError::Storage(format!(
                "sequencer of conversation '{}' stopped",
                conversation_id
            )));
        }
        Ok(())
    }

    async fn await_reply(
        conversation_id: &ConversationId,
        response: oneshot::Receiver<Result<Message, ChatError>>,
    ) -> Result<Message, ChatError> {
        response.await.map_err(|_| {
            ChatError::Storage(format!(
                "sequencer of conversation '{}' dropped the request",
                conversation_id
            ))
        })?
    }

    /// Queue of the conversation's actor, spawning the actor on first use.
    ///
    /// Running actors are looked up under the read lock; the write lock is only
    /// taken to spawn one, and never across a directory lookup.
    async fn actor_for(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<mpsc::Sender<Command>, ChatError> {
        if let Some(actor) = Self::running(&*self.actors.read().await, conversation_id) {
            return Ok(actor);
        }

        let conversation = self.context.directory.get(conversation_id).await?;
        let mut actors = self.actors.write().await;
        if let Some(actor) = Self::running(&actors, conversation_id) {
            return Ok(actor);
        }
        let (tx, rx) = mpsc::channel(ACTOR_QUEUE_CAPACITY);
        let actor = ConversationActor {
            conversation_id: conversation.id,
            last_sequence: conversation.last_sequence,
            context: self.context.clone(),
        };
        tokio::spawn(actor.run(rx));
        actors.insert(conversation.id, tx.clone());

        tracing::debug!(
            "Started sequencer for conversation '{}' at seq {}",
            conversation.id,
            conversation.last_sequence
        );
        Ok(tx)
    }

    fn running(
        actors: &HashMap<ConversationId, mpsc::Sender<Command>>,
        conversation_id: &ConversationId,
    ) -> Option<mpsc::Sender<Command>> {
        actors
            .get(conversation_id)
            .filter(|actor| !actor.is_closed())
            .cloned()
    }
}

struct ConversationActor {
    conversation_id: ConversationId,
    last_sequence: Sequence,
    context: Arc<SequencerContext>,
}

impl ConversationActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Append {
                    sender_id,
                    content,
                    reply,
                } => {
                    let result = self.append(sender_id, content).await;
                    let _ = reply.send(result);
                }
                Command::Revise {
                    message_id,
                    editor_id,
                    revision,
                    reply,
                } => {
                    let result = self.revise(&message_id, &editor_id, revision).await;
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!(
            "Sequencer of conversation '{}' stopped",
            self.conversation_id
        );
    }

    async fn append(
        &mut self,
        sender_id: UserId,
        content: MessageContent,
    ) -> Result<Message, ChatError> {
        let conversation = self.context.directory.get(&self.conversation_id).await?;
        if !conversation.is_participant(&sender_id) {
            return Err(ChatError::NotAParticipant);
        }

        let sequence = self.last_sequence.next();
        let message = Message::new(
            self.conversation_id,
            sender_id,
            content,
            sequence,
            self.now(),
        );
        self.persist(self.context.log.append(&message)).await?;
        self.last_sequence = sequence;

        if let Err(e) = self
            .context
            .directory
            .record_sequence(&self.conversation_id, sequence)
            .await
        {
            tracing::warn!(
                "Failed to commit seq {} of conversation '{}': {}",
                sequence,
                self.conversation_id,
                e
            );
        }
        if let Err(e) = self.context.dispatcher.dispatch(&message).await {
            tracing::warn!("Failed to dispatch message {}: {}", message.id, e);
        }

        tracing::info!(
            "Message {} appended to conversation '{}' at seq {}",
            message.id,
            self.conversation_id,
            sequence
        );
        Ok(message)
    }

    async fn revise(
        &mut self,
        message_id: &MessageId,
        editor_id: &UserId,
        revision: Revision,
    ) -> Result<Message, ChatError> {
        let mut message = self
            .context
            .log
            .find(message_id)
            .await?
            .ok_or(ChatError::MessageNotFound(*message_id))?;
        if &message.sender_id != editor_id {
            return Err(ChatError::NotMessageSender);
        }

        let now = self.now();
        match revision {
            Revision::Edit(content) => message.edit(content, now)?,
            Revision::Delete => {
                if !message.tombstone(now) {
                    return Ok(message);
                }
            }
        }
        self.persist(self.context.log.update(&message)).await?;

        if let Err(e) = self.context.dispatcher.dispatch_update(&message).await {
            tracing::warn!("Failed to dispatch revision of message {}: {}", message.id, e);
        }
        Ok(message)
    }

    async fn persist<F>(&self, write: F) -> Result<(), ChatError>
    where
        F: Future<Output = Result<(), LogError>>,
    {
        match tokio::time::timeout(self.context.persist_timeout, write).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    "Log did not acknowledge a write to conversation '{}' within {:?}",
                    self.conversation_id,
                    self.context.persist_timeout
                );
                Err(ChatError::PersistenceTimeout)
            }
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.context.clock.now_millis())
    }
}
