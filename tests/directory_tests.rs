//! Conversation directory semantics
//!
//! Exercises the visibility-record contract: direct-pair dedupe, membership
//! convergence, the group minimum-size rule, and unread bookkeeping.

mod common;

use common::*;

use chrono::Utc;
use lingua_chat_server::domain::{
    ConversationDirectory, ConversationKind, MessageStore, NewMessage,
};
use lingua_chat_server::shared::error::AppError;

fn directory() -> InMemoryDirectory {
    InMemoryDirectory::new()
}

#[tokio::test]
async fn direct_conversations_are_deduplicated_per_pair() {
    let directory = directory();

    let first = directory
        .create_conversation(1, ConversationKind::Direct, &[1, 2], None)
        .await
        .unwrap();

    // Same pair, opposite participant order, other creator.
    let second = directory
        .create_conversation(2, ConversationKind::Direct, &[2, 1], None)
        .await
        .unwrap();

    assert_eq!(first.conversation_id, second.conversation_id);
    assert_eq!(directory.records_of(first.conversation_id).len(), 2);

    // A different pair still gets its own conversation.
    let third = directory
        .create_conversation(1, ConversationKind::Direct, &[1, 3], None)
        .await
        .unwrap();
    assert_ne!(first.conversation_id, third.conversation_id);
}

#[tokio::test]
async fn direct_conversations_require_exactly_two_participants() {
    let directory = directory();
    let result = directory
        .create_conversation(1, ConversationKind::Direct, &[1, 2, 3], None)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn membership_changes_converge_on_every_record() {
    let directory = directory();
    let conversation_id = directory
        .create_conversation(1, ConversationKind::Group, &[1, 2, 3], Some("team".into()))
        .await
        .unwrap()
        .conversation_id;

    directory
        .add_participants(conversation_id, &[4, 5])
        .await
        .unwrap();

    let records = directory.records_of(conversation_id);
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.participant_ids, vec![1, 2, 3, 4, 5]);
    }

    directory
        .remove_participant(conversation_id, 3)
        .await
        .unwrap();

    let records = directory.records_of(conversation_id);
    assert_eq!(records.len(), 4);
    for record in &records {
        assert_eq!(record.participant_ids, vec![1, 2, 4, 5]);
        assert_ne!(record.participant_id, 3);
    }
}

#[tokio::test]
async fn removal_below_two_participants_is_rejected_without_mutation() {
    let directory = directory();
    let conversation_id = directory
        .create_conversation(1, ConversationKind::Group, &[1, 2], Some("pair".into()))
        .await
        .unwrap()
        .conversation_id;

    let result = directory.remove_participant(conversation_id, 2).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    // participantIds unchanged on every record.
    for record in directory.records_of(conversation_id) {
        assert_eq!(record.participant_ids, vec![1, 2]);
    }
}

#[tokio::test]
async fn membership_ops_are_group_only() {
    let directory = directory();
    let conversation_id = directory
        .create_conversation(1, ConversationKind::Direct, &[1, 2], None)
        .await
        .unwrap()
        .conversation_id;

    assert!(matches!(
        directory.add_participants(conversation_id, &[3]).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        directory.remove_participant(conversation_id, 2).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn last_message_touch_updates_snapshots_and_unread_counts() {
    let store = InMemoryMessageStore::new();
    let directory = directory();
    let conversation_id = directory
        .create_conversation(1, ConversationKind::Group, &[1, 2, 3], Some("team".into()))
        .await
        .unwrap()
        .conversation_id;

    let message = store
        .append(NewMessage {
            conversation_id,
            sender_id: 1,
            kind: Default::default(),
            content: "news!".into(),
            original_language: "en".into(),
            attachment: None,
            reply_to: None,
        })
        .await
        .unwrap();

    directory.touch_last_message(&message).await.unwrap();
    directory.touch_last_message(&message).await.unwrap();

    for record in directory.records_of(conversation_id) {
        let last = record.last_message.as_ref().expect("snapshot present");
        // The snapshot is canonical and untranslated.
        assert_eq!(last.content, "news!");
        assert_eq!(last.sender_id, 1);

        if record.participant_id == 1 {
            assert_eq!(record.unread_count, 0);
        } else {
            assert_eq!(record.unread_count, 2);
        }
    }

    directory
        .mark_read_through(conversation_id, 2, Utc::now())
        .await
        .unwrap();

    let record = directory
        .record(conversation_id, 2)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.unread_count, 0);
    assert!(record.last_read_at.is_some());
}

#[tokio::test]
async fn records_for_lists_only_own_conversations() {
    let directory = directory();
    directory
        .create_conversation(1, ConversationKind::Direct, &[1, 2], None)
        .await
        .unwrap();
    directory
        .create_conversation(3, ConversationKind::Direct, &[3, 4], None)
        .await
        .unwrap();

    let mine = directory.records_for(1).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(mine[0].participant_ids.contains(&2));

    assert!(directory.records_for(99).await.unwrap().is_empty());
}
