mod common;

use chat_backend::{
    error::AppError,
    message::{MessageRepository, MessageType, SendMessageRequest},
    response::Page,
};
use std::collections::HashSet;
use uuid::Uuid;

#[tokio::test]
async fn unread_count_tracks_messages_from_others() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;

    for i in 0..3 {
        common::send_text(&service, id, alice.id, &format!("msg {}", i)).await;
    }
    common::send_text(&service, id, bob.id, "reply").await;

    assert_eq!(service.get_conversation(id, bob.id).await.unwrap().unread_count, 3);
    assert_eq!(service.get_conversation(id, alice.id).await.unwrap().unread_count, 1);

    let summary = service.unread_summary(bob.id).await.unwrap();
    assert_eq!(summary.unread_messages, 3);
    assert_eq!(summary.unread_conversations, 1);

    service.mark_conversation_read(id, bob.id).await.unwrap();
    assert_eq!(service.get_conversation(id, bob.id).await.unwrap().unread_count, 0);
    assert_eq!(service.get_conversation(id, alice.id).await.unwrap().unread_count, 1);
    assert_eq!(service.unread_summary(bob.id).await.unwrap().unread_messages, 0);
}

#[tokio::test]
async fn marking_read_twice_is_harmless() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;
    common::send_text(&service, id, alice.id, "hello").await;

    let first = service.mark_conversation_read(id, bob.id).await.unwrap();
    let second = service.mark_conversation_read(id, bob.id).await.unwrap();

    assert_eq!(first.messages_marked, 1);
    assert_eq!(second.messages_marked, 0);
    assert!(second.last_read_at >= first.last_read_at);
    assert_eq!(service.get_conversation(id, bob.id).await.unwrap().unread_count, 0);
}

#[tokio::test]
async fn mark_read_requires_participation() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let eve = common::create_test_user(&db, "eve").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;

    let err = service.mark_conversation_read(id, eve.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = service.mark_conversation_read(Uuid::new_v4(), bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn single_message_read_flag() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;
    let first = common::send_text(&service, id, alice.id, "one").await;
    common::send_text(&service, id, alice.id, "two").await;

    assert!(service.mark_message_read(first.id, bob.id).await.unwrap());
    assert!(!service.mark_message_read(first.id, bob.id).await.unwrap());
    assert_eq!(service.get_conversation(id, bob.id).await.unwrap().unread_count, 1);

    let err = service.mark_message_read(first.id, alice.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn history_pages_cover_every_message_once_newest_first() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;

    let mut sent = Vec::new();
    for i in 0..25 {
        let sender = if i % 2 == 0 { alice.id } else { bob.id };
        sent.push(common::send_text(&service, id, sender, &format!("m{}", i)).await.id);
    }

    let mut seen = Vec::new();
    for number in 1..=3 {
        let (items, total) = service
            .list_messages(id, alice.id, Page::new(number, 10))
            .await
            .unwrap();
        assert_eq!(total, 25);
        seen.extend(items.into_iter().map(|m| m.id));
    }

    let unique: HashSet<Uuid> = seen.iter().copied().collect();
    assert_eq!(unique.len(), 25);
    sent.reverse();
    assert_eq!(seen, sent);
}

#[tokio::test]
async fn history_carries_sender_profiles() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;
    common::send_text(&service, id, alice.id, "from alice").await;
    common::send_text(&service, id, bob.id, "from bob").await;

    let (items, _) = service
        .list_messages(id, bob.id, Page::new(1, 20))
        .await
        .unwrap();
    assert_eq!(items[0].sender.as_ref().unwrap().username, "bob");
    assert_eq!(items[1].sender.as_ref().unwrap().username, "alice");
}

#[tokio::test]
async fn outsiders_cannot_read_or_post() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let eve = common::create_test_user(&db, "eve").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;

    let err = service
        .send_message(id, eve.id, common::text("let me in"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = service
        .list_messages(id, eve.id, Page::new(1, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = service
        .send_message(Uuid::new_v4(), alice.id, common::text("nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn only_the_sender_can_edit_or_delete() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;
    let message = common::send_text(&service, id, alice.id, "original").await;

    let err = service
        .edit_message(message.id, bob.id, "hijacked".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = service.delete_message(message.id, bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let edited = service
        .edit_message(message.id, alice.id, "edited".into())
        .await
        .unwrap();
    assert_eq!(edited.content, "edited");
    assert!(edited.updated_at >= edited.created_at);

    service.delete_message(message.id, alice.id).await.unwrap();
    let err = service.delete_message(message.id, alice.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn deleting_a_message_detaches_its_replies() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;

    let original = common::send_text(&service, id, alice.id, "question?").await;
    let reply = service
        .send_message(
            id,
            bob.id,
            SendMessageRequest {
                content: "answer".into(),
                reply_to_id: Some(original.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reply.reply_to_id, Some(original.id));
    assert_eq!(reply.reply_to.as_ref().unwrap().content, "question?");

    let (items, _) = service.list_messages(id, bob.id, Page::new(1, 20)).await.unwrap();
    assert_eq!(items[0].reply_to.as_ref().unwrap().id, original.id);

    service.delete_message(original.id, alice.id).await.unwrap();

    let (items, total) = service.list_messages(id, bob.id, Page::new(1, 20)).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].id, reply.id);
    assert_eq!(items[0].reply_to_id, None);
    assert!(items[0].reply_to.is_none());
}

#[tokio::test]
async fn replies_must_stay_in_their_conversation() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let carol = common::create_test_user(&db, "carol").await;
    let with_bob = common::open_conversation(&service, alice.id, bob.id).await;
    let with_carol = common::open_conversation(&service, alice.id, carol.id).await;
    let elsewhere = common::send_text(&service, with_bob, bob.id, "private").await;

    let err = service
        .send_message(
            with_carol,
            alice.id,
            SendMessageRequest {
                content: "quoting".into(),
                reply_to_id: Some(elsewhere.id),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = service
        .send_message(
            with_carol,
            alice.id,
            SendMessageRequest {
                content: "quoting".into(),
                reply_to_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn attachments_follow_the_message_type() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;

    let image = service
        .send_message(
            id,
            alice.id,
            SendMessageRequest {
                message_type: Some("image".into()),
                file_path: Some("/uploads/cat.png".into()),
                file_name: Some("cat.png".into()),
                file_size: Some(1024),
                file_type: Some("image/png".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(image.message_type, MessageType::Image);
    assert_eq!(image.file_name.as_deref(), Some("cat.png"));
    assert_eq!(image.content, "");
    assert_eq!(image.sender.as_ref().unwrap().id, alice.id);

    let text = common::send_text(&service, id, alice.id, "plain").await;
    assert_eq!(text.message_type, MessageType::Text);
    assert!(text.file_path.is_none() && text.file_name.is_none());

    let err = service
        .send_message(
            id,
            alice.id,
            SendMessageRequest {
                message_type: Some("audio".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = service
        .send_message(id, alice.id, common::text("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let (_, total) = service.list_messages(id, alice.id, Page::new(1, 20)).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn sending_bumps_the_conversation() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;
    let before = service.get_conversation(id, alice.id).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let message = common::send_text(&service, id, bob.id, "ping").await;

    let after = service.get_conversation(id, alice.id).await.unwrap();
    assert!(after.updated_at > before.updated_at);
    assert_eq!(after.updated_at, message.created_at);
}

#[tokio::test]
async fn store_unread_count_excludes_own_messages_and_read_ones() {
    let (service, db) = common::setup_service().await;
    let alice = common::create_test_user(&db, "alice").await;
    let bob = common::create_test_user(&db, "bob").await;
    let id = common::open_conversation(&service, alice.id, bob.id).await;
    for i in 0..3 {
        common::send_text(&service, id, alice.id, &format!("msg {}", i)).await;
    }
    common::send_text(&service, id, bob.id, "mine").await;

    let repo = MessageRepository::new(&db);
    let mut tx = db.begin().await.unwrap();
    assert_eq!(repo.count_unread(&mut tx, id, bob.id).await.unwrap(), 3);
    assert_eq!(repo.count_unread(&mut tx, id, alice.id).await.unwrap(), 1);

    assert_eq!(repo.mark_all_read(&mut tx, id, bob.id).await.unwrap(), 3);
    assert_eq!(repo.count_unread(&mut tx, id, bob.id).await.unwrap(), 0);
    assert_eq!(repo.count_unread(&mut tx, id, alice.id).await.unwrap(), 1);
    tx.commit().await.unwrap();

    assert_eq!(service.get_conversation(id, bob.id).await.unwrap().unread_count, 0);
}
