//! Fan-out Dispatcher
//!
//! Orchestrates every inbound realtime event: validate → persist → resolve
//! participants → translate per recipient → push to live connections →
//! notify offline participants → persist the translation cache.
//!
//! Failure isolation: only a failure to persist the core message is fatal
//! to a send. Translation and push failures degrade to original content or
//! a skipped notification; a stale connection deregisters itself and never
//! blocks delivery to other connections or participants.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use validator::Validate;

use super::notification_fallback::NotificationFallback;
use crate::application::dto::{
    ClientEvent, DeletePayload, DeletedBroadcast, MessageView, ReactionBroadcast, ReactionPayload,
    ReadBroadcast, ReadPayload, SendPayload, ServerEvent, TypingBroadcast, TypingPayload,
    UserSnapshot,
};
use crate::domain::{
    AttachmentStore, ConversationDirectory, Message, MessageKind, MessageStore, NewMessage,
    PushProvider, TranslateRequest, TranslationGateway, User, UserDirectory,
};
use crate::infrastructure::metrics;
use crate::infrastructure::registry::{ConnectionRegistry, OutboundFrame};
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;

/// The fan-out dispatcher.
///
/// Generic over its collaborators so tests can drive the whole pipeline
/// with in-memory implementations.
pub struct EventDispatcher<M, D, U, T, P, A> {
    store: Arc<M>,
    directory: Arc<D>,
    users: Arc<U>,
    translator: Arc<T>,
    attachments: Arc<A>,
    notifications: NotificationFallback<P>,
    registry: Arc<ConnectionRegistry>,
}

impl<M, D, U, T, P, A> EventDispatcher<M, D, U, T, P, A>
where
    M: MessageStore,
    D: ConversationDirectory,
    U: UserDirectory,
    T: TranslationGateway,
    P: PushProvider,
    A: AttachmentStore,
{
    pub fn new(
        store: Arc<M>,
        directory: Arc<D>,
        users: Arc<U>,
        translator: Arc<T>,
        attachments: Arc<A>,
        notifications: NotificationFallback<P>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            users,
            translator,
            attachments,
            notifications,
            registry,
        }
    }

    /// Handle one inbound event from `actor_id`.
    pub async fn dispatch(&self, actor_id: i64, event: ClientEvent) -> Result<(), AppError> {
        metrics::record_event(event.action());
        tracing::debug!(actor_id = actor_id, action = event.action(), "Event received");

        match event {
            ClientEvent::MessageSend(payload) => self.handle_send(actor_id, payload).await,
            ClientEvent::MessageTyping(payload) => self.handle_typing(actor_id, payload).await,
            ClientEvent::MessageReaction(payload) => self.handle_reaction(actor_id, payload).await,
            ClientEvent::MessageRead(payload) => self.handle_read(actor_id, payload).await,
            ClientEvent::MessageDeleted(payload) => self.handle_deleted(actor_id, payload).await,
        }
    }

    /// `message:send`: the full pipeline.
    async fn handle_send(&self, sender_id: i64, payload: SendPayload) -> Result<(), AppError> {
        let conversation_id = payload.conversation_id;

        // Validate. A malformed attachment or reply degrades the send to a
        // plain message instead of failing it.
        if payload.kind == MessageKind::Text && payload.content.trim().is_empty() {
            return Err(AppError::Validation(
                "Text messages require non-empty content".into(),
            ));
        }

        let attachment = payload.attachment.and_then(|a| match a.validate() {
            Ok(()) => Some(a.into_attachment()),
            Err(e) => {
                tracing::warn!(
                    conversation_id = conversation_id,
                    error = %validation_error(e),
                    "Malformed attachment dropped from send"
                );
                None
            }
        });

        let reply_to = payload.reply_to.and_then(|r| match r.validate() {
            Ok(()) => Some(r.into_preview()),
            Err(e) => {
                tracing::warn!(
                    conversation_id = conversation_id,
                    error = %validation_error(e),
                    "Malformed reply preview dropped from send"
                );
                None
            }
        });

        let participants = self.directory.participants(conversation_id).await?;
        if !participants.contains(&sender_id) {
            return Err(AppError::Forbidden(
                "Sender is not a participant of this conversation".into(),
            ));
        }

        let sender = self
            .users
            .find_by_id(sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", sender_id)))?;

        // Language is detected once per send, only for text.
        let original_language = if payload.kind == MessageKind::Text {
            match self.translator.detect_language(&payload.content).await {
                Ok(language) => language,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Language detection failed, assuming sender language"
                    );
                    sender.preferred_language.clone()
                }
            }
        } else {
            sender.preferred_language.clone()
        };

        // Persist. This is the only fatal failure point of a send.
        let message = self
            .store
            .append(NewMessage {
                conversation_id,
                sender_id,
                kind: payload.kind,
                content: payload.content,
                original_language,
                attachment,
                reply_to,
            })
            .await?;
        tracing::debug!(
            conversation_id = conversation_id,
            timestamp = message.timestamp,
            "Message persisted"
        );

        // Canonical snapshot onto every participant's visibility record.
        if let Err(e) = self.directory.touch_last_message(&message).await {
            tracing::error!(
                conversation_id = conversation_id,
                error = %e,
                "Failed to update visibility records"
            );
        }

        // Resolve recipient profiles; a lookup failure degrades every
        // affected viewer to original content.
        let recipients = match self.users.find_many(&participants).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(error = %e, "Recipient lookup failed, delivering originals");
                Vec::new()
            }
        };

        // Translate once per distinct target language.
        let translatable = match message.kind {
            MessageKind::Text => true,
            MessageKind::File => payload.translate_document,
            _ => false,
        };
        let translations = if translatable && !message.content.is_empty() {
            self.translate_for_targets(&message, &recipients).await
        } else {
            HashMap::new()
        };

        // Fan out. Participant deliveries are independent of one another.
        let sender_snapshot = UserSnapshot::from(&sender);
        let users_by_id: HashMap<i64, &User> =
            recipients.iter().map(|user| (user.id, user)).collect();

        join_all(participants.iter().map(|&participant_id| {
            let user = users_by_id.get(&participant_id).copied();
            let message = &message;
            let translations = &translations;
            let sender_snapshot = &sender_snapshot;
            let sender_name = sender.username.as_str();
            async move {
                let target_language = user
                    .map(|u| u.preferred_language.clone())
                    .unwrap_or_else(|| message.original_language.clone());

                let translated_content = if translatable {
                    translations
                        .get(&target_language)
                        .cloned()
                        .unwrap_or_else(|| message.content.clone())
                } else {
                    message.content.clone()
                };

                let view =
                    MessageView::render(message, sender_snapshot, &target_language, &translated_content);
                let frame = match ServerEvent::MessageReceive(view).to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(
                            participant_id = participant_id,
                            error = %e,
                            "Failed to serialize delivery"
                        );
                        return;
                    }
                };

                let delivered = self.push_frame_to_user(participant_id, &frame);
                if participant_id != message.sender_id {
                    self.notifications
                        .notify(participant_id, sender_name, message, delivered > 0)
                        .await;
                }
            }
        }))
        .await;

        // Persist the accumulated cache once, after all participants.
        if let Err(e) = self
            .store
            .cache_translations(conversation_id, message.timestamp, &translations)
            .await
        {
            tracing::warn!(
                conversation_id = conversation_id,
                error = %e,
                "Failed to persist translation cache"
            );
        }

        Ok(())
    }

    /// `message:typing`: ephemeral, fanned to every other participant.
    async fn handle_typing(&self, actor_id: i64, payload: TypingPayload) -> Result<(), AppError> {
        let participants = self.directory.participants(payload.conversation_id).await?;
        if !participants.contains(&actor_id) {
            return Err(AppError::Forbidden(
                "Sender is not a participant of this conversation".into(),
            ));
        }

        let frame = ServerEvent::MessageTyping(TypingBroadcast {
            conversation_id: payload.conversation_id.to_string(),
            user_id: actor_id.to_string(),
            typing: payload.typing,
        })
        .to_frame()?;

        for participant_id in participants {
            if participant_id != actor_id {
                self.push_frame_to_user(participant_id, &frame);
            }
        }
        Ok(())
    }

    /// `message:reaction`: toggle, then broadcast the full resulting map to
    /// everyone including the actor.
    async fn handle_reaction(
        &self,
        actor_id: i64,
        payload: ReactionPayload,
    ) -> Result<(), AppError> {
        payload.validate().map_err(validation_error)?;

        let participants = self.directory.participants(payload.conversation_id).await?;
        if !participants.contains(&actor_id) {
            return Err(AppError::Forbidden(
                "Sender is not a participant of this conversation".into(),
            ));
        }

        let message = self
            .store
            .toggle_reaction(
                payload.conversation_id,
                payload.timestamp,
                actor_id,
                &payload.emoji,
            )
            .await?;

        let frame = ServerEvent::MessageReaction(ReactionBroadcast {
            conversation_id: payload.conversation_id.to_string(),
            timestamp: message.timestamp,
            reactions: message.reactions.clone(),
        })
        .to_frame()?;

        for participant_id in participants {
            self.push_frame_to_user(participant_id, &frame);
        }
        Ok(())
    }

    /// `message:read`: idempotent union, broadcast to the sender only, and
    /// skipped entirely when the reader is the sender.
    async fn handle_read(&self, actor_id: i64, payload: ReadPayload) -> Result<(), AppError> {
        let message = self
            .store
            .get(payload.conversation_id, payload.timestamp)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Message {} not found", payload.timestamp))
            })?;

        if message.sender_id == actor_id {
            return Ok(());
        }

        let newly_read = self
            .store
            .mark_read(payload.conversation_id, payload.timestamp, actor_id)
            .await?;

        if let Err(e) = self
            .directory
            .mark_read_through(payload.conversation_id, actor_id, Utc::now())
            .await
        {
            tracing::warn!(
                conversation_id = payload.conversation_id,
                error = %e,
                "Failed to reset unread count"
            );
        }

        // A repeat is a no-op: nothing changed, nothing to broadcast.
        if !newly_read {
            return Ok(());
        }

        let frame = ServerEvent::MessageRead(ReadBroadcast {
            conversation_id: payload.conversation_id.to_string(),
            timestamp: payload.timestamp,
            reader_id: actor_id.to_string(),
        })
        .to_frame()?;

        self.push_frame_to_user(message.sender_id, &frame);
        Ok(())
    }

    /// `message:deleted`: for-me deletions stay local; for-everyone
    /// deletions purge the bound attachment and broadcast the placeholder.
    async fn handle_deleted(&self, actor_id: i64, payload: DeletePayload) -> Result<(), AppError> {
        let participants = self.directory.participants(payload.conversation_id).await?;
        if !participants.contains(&actor_id) {
            return Err(AppError::Forbidden(
                "Sender is not a participant of this conversation".into(),
            ));
        }

        let message = self
            .store
            .soft_delete(
                payload.conversation_id,
                payload.timestamp,
                actor_id,
                payload.for_everyone,
            )
            .await?;

        // For-me deletions stay local and are never broadcast.
        if !payload.for_everyone {
            return Ok(());
        }

        if let Some(attachment) = &message.attachment {
            if let Err(e) = self.attachments.purge(&attachment.key).await {
                tracing::warn!(
                    key = %attachment.key,
                    error = %e,
                    "Best-effort attachment purge failed"
                );
            }
        }

        let frame =
            ServerEvent::MessageDeleted(DeletedBroadcast::from_message(&message)).to_frame()?;
        for participant_id in participants {
            self.push_frame_to_user(participant_id, &frame);
        }
        Ok(())
    }

    /// Translate the message once per distinct target language, consulting
    /// the per-message cache first. Failures fall back silently; affected
    /// viewers get the original content.
    async fn translate_for_targets(
        &self,
        message: &Message,
        recipients: &[User],
    ) -> HashMap<String, String> {
        let targets = translation_targets(&message.original_language, recipients);
        let use_document_path = message.kind == MessageKind::File;

        let results = join_all(targets.into_iter().map(|target| {
            let translator = Arc::clone(&self.translator);
            async move {
                if let Some(cached) = message.translations.get(&target.language) {
                    metrics::record_translation("cached");
                    return Some((target.language, cached.clone()));
                }

                let request = TranslateRequest {
                    text: message.content.clone(),
                    source_language: message.original_language.clone(),
                    target_language: target.language.clone(),
                    target_country: target.country,
                    target_region: target.region,
                };

                let result = if use_document_path {
                    translator.translate_document(request).await
                } else {
                    translator.translate(request).await
                };

                match result {
                    Ok(text) => {
                        metrics::record_translation("translated");
                        Some((target.language, text))
                    }
                    Err(e) => {
                        metrics::record_translation("fallback");
                        tracing::warn!(
                            language = %target.language,
                            error = %e,
                            "Translation failed, delivering original content"
                        );
                        None
                    }
                }
            }
        }))
        .await;

        results.into_iter().flatten().collect()
    }

    /// Push one frame to every live connection of a user. A stale
    /// connection is already deregistered by the registry; it only costs
    /// this delivery, never the others.
    fn push_frame_to_user(&self, user_id: i64, frame: &OutboundFrame) -> usize {
        let mut delivered = 0;
        for connection in self.registry.connections_for(user_id) {
            match self.registry.send(connection.connection_id, frame) {
                Ok(()) => {
                    metrics::record_delivery("delivered");
                    delivered += 1;
                }
                Err(e) => {
                    metrics::record_delivery("stale");
                    tracing::debug!(
                        user_id = user_id,
                        connection_id = %connection.connection_id,
                        error = %e,
                        "Dropped stale connection during delivery"
                    );
                }
            }
        }
        delivered
    }
}

/// One translation target: a language plus the hint of the first recipient
/// that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TranslationTarget {
    language: String,
    country: Option<String>,
    region: Option<String>,
}

/// Distinct target languages differing from the original, in recipient
/// order. The country/region hint comes from the first recipient with that
/// language.
fn translation_targets(original_language: &str, recipients: &[User]) -> Vec<TranslationTarget> {
    let mut targets: Vec<TranslationTarget> = Vec::new();
    for user in recipients {
        if user.preferred_language == original_language {
            continue;
        }
        if targets.iter().any(|t| t.language == user.preferred_language) {
            continue;
        }
        targets.push(TranslationTarget {
            language: user.preferred_language.clone(),
            country: user.preferred_country.clone(),
            region: user.preferred_region.clone(),
        });
    }
    targets
}
