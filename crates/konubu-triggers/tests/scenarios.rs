//! End-to-end event handling against an in-memory store and a recording
//! push provider.

mod common;

use common::{Harness, user};
use konubu_push::ErrorCode;
use konubu_triggers::{Skip, TriggerError};
use konubu_types::{
    ApprovalStatus, CityValue, Comment, Confession, Like, LikeTarget, NotificationType,
    Preference, PrivateMessage, TriggerEvent, UserProfile,
};

fn confession(author: &str, code: CityValue) -> Confession {
    Confession {
        author_id: Some(author.into()),
        city_name: Some("Ankara".into()),
        city_plate_code: Some(code),
        content: "Bugün otobüste biri bana gülümsedi.".into(),
        ..Default::default()
    }
}

fn comment(author: &str, parent: Option<&str>, content: &str) -> Comment {
    Comment {
        author_id: Some(author.into()),
        parent_id: parent.map(str::to_string),
        content: content.into(),
        ..Default::default()
    }
}

async fn create_confession(h: &Harness, id: &str, c: Confession) -> konubu_triggers::TriggerOutcome {
    h.db.put_confession(id, &c).unwrap();
    h.router
        .handle(TriggerEvent::ConfessionCreated {
            confession_id: id.into(),
            confession: c,
        })
        .await
        .unwrap()
}

async fn create_comment(h: &Harness, confession_id: &str, id: &str, c: Comment) -> konubu_triggers::TriggerOutcome {
    h.db.put_comment(confession_id, id, &c).unwrap();
    h.router
        .handle(TriggerEvent::CommentCreated {
            path: format!("confessions/{}/comments/{}", confession_id, id),
            comment: c,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn city_broadcast_reaches_only_enabled_followers() {
    let h = Harness::new();
    h.user(user("u1", Some("tok1"), vec![6.into()]));
    h.user(user("u2", Some("tok2"), vec!["06".into()]));
    let mut u3 = user("u3", Some("tok3"), vec![6.into()]);
    u3.notifications_enabled = Preference::Disabled;
    h.user(u3);

    let out = create_confession(&h, "c1", confession("u1", 6.into())).await;

    assert_eq!(out.pushes_sent, 1);
    assert_eq!(out.inbox_persisted, 1);
    assert_eq!(h.provider().sent_tokens(), vec!["tok2".to_string()]);
    assert_eq!(h.db.notifications_for("u2").unwrap().len(), 1);
    assert!(h.db.notifications_for("u3").unwrap().is_empty());
    assert!(h.db.notifications_for("u1").unwrap().is_empty());
    assert_eq!(h.db.get_user("u1").unwrap().unwrap().stats.confession_count, 1);

    let sent = &h.provider().sent()[0];
    assert_eq!(sent.notification.title, "Ankara'da Yeni KonuBu!");
    assert_eq!(sent.data["type"], "new_confession");
    assert_eq!(sent.data["confessionId"], "c1");
    assert_eq!(sent.data["cityPlateCode"], "6");

    let entry = &h.db.notifications_for("u2").unwrap()[0];
    assert_eq!(entry.kind, NotificationType::NewCityConfession);
    assert_eq!(entry.city_name.as_deref(), Some("Ankara"));
}

#[tokio::test]
async fn broadcast_works_from_event_payload_alone() {
    let h = Harness::new();
    h.user(user("u2", Some("tok2"), vec![6.into()]));

    let out = h
        .router
        .handle(TriggerEvent::ConfessionCreated {
            confession_id: "c1".into(),
            confession: confession("u1", 6.into()),
        })
        .await
        .unwrap();

    assert_eq!(out.skipped, None);
    assert_eq!(out.pushes_sent, 1);
    assert_eq!(out.inbox_persisted, 1);
    assert_eq!(h.provider().sent_tokens(), vec!["tok2".to_string()]);
    assert!(h.db.get_confession("c1").unwrap().is_some());
}

#[tokio::test]
async fn refused_broadcast_is_delivered_on_redelivery() {
    let h = Harness::new();
    h.user(user("u2", Some("tok2"), vec![6.into()]));
    h.provider().fail_next_batch();

    let event = TriggerEvent::ConfessionCreated {
        confession_id: "c1".into(),
        confession: confession("u1", 6.into()),
    };
    let err = h.router.handle(event.clone()).await.unwrap_err();
    assert!(matches!(err, TriggerError::BroadcastIncomplete { failed_batches: 1, .. }));
    assert!(h.db.notifications_for("u2").unwrap().is_empty());

    let retry = h.router.handle(event.clone()).await.unwrap();
    assert_eq!(retry.skipped, None);
    assert_eq!(retry.pushes_sent, 1);
    assert_eq!(retry.inbox_persisted, 1);
    assert_eq!(h.db.notifications_for("u2").unwrap().len(), 1);

    let replay = h.router.handle(event).await.unwrap();
    assert_eq!(replay.skipped, Some(Skip::AlreadyNotified));
    assert_eq!(h.db.notifications_for("u2").unwrap().len(), 1);
}

#[tokio::test]
async fn unregistered_tokens_are_reported_and_cleared() {
    let h = Harness::new();
    for i in 0..25 {
        h.user(user(&format!("u{:02}", i), Some(&format!("tok{:02}", i)), vec![34.into()]));
    }
    for dead in ["tok03", "tok07", "tok11"] {
        h.provider().refuse(dead, ErrorCode::RegistrationTokenNotRegistered);
    }

    let out = create_confession(&h, "c1", confession("author", "34".into())).await;

    assert_eq!(out.pushes_sent, 22);
    assert_eq!(out.pushes_failed, 3);
    let mut invalid = out.invalid_tokens.clone();
    invalid.sort();
    assert_eq!(invalid, vec!["tok03", "tok07", "tok11"]);
    assert_eq!(out.tokens_cleared, 3);
    assert_eq!(out.inbox_persisted, 25);

    for id in ["u03", "u07", "u11"] {
        assert_eq!(h.db.get_user(id).unwrap().unwrap().fcm_token, None);
    }
    assert_eq!(h.db.get_user("u04").unwrap().unwrap().fcm_token.as_deref(), Some("tok04"));
}

#[tokio::test]
async fn transient_failures_do_not_clear_tokens() {
    let h = Harness::new();
    h.user(user("u1", Some("busy"), vec![1.into()]));
    h.provider().refuse("busy", ErrorCode::Unavailable);

    let out = create_confession(&h, "c1", confession("author", 1.into())).await;
    assert_eq!(out.pushes_failed, 1);
    assert!(out.invalid_tokens.is_empty());
    assert_eq!(h.db.get_user("u1").unwrap().unwrap().fcm_token.as_deref(), Some("busy"));
}

#[tokio::test]
async fn approval_notifies_once_per_confession() {
    let h = Harness::new();
    h.user(user("u2", Some("tok2"), vec![35.into()]));

    let mut pending = confession("u1", 35.into());
    pending.status = ApprovalStatus::Pending;
    let out = create_confession(&h, "c1", pending.clone()).await;
    assert_eq!(out.skipped, Some(Skip::NotApproved));
    assert!(h.provider().sent().is_empty());

    let mut approved = pending.clone();
    approved.status = ApprovalStatus::Approved;
    h.db.put_confession("c1", &approved).unwrap();
    let update = TriggerEvent::ConfessionUpdated {
        confession_id: "c1".into(),
        before: pending,
        after: approved,
    };

    let first = h.router.handle(update.clone()).await.unwrap();
    assert_eq!(first.pushes_sent, 1);

    let replay = h.router.handle(update).await.unwrap();
    assert_eq!(replay.skipped, Some(Skip::AlreadyNotified));
    assert_eq!(h.provider().sent().len(), 1);
    assert_eq!(h.db.notifications_for("u2").unwrap().len(), 1);
}

#[tokio::test]
async fn view_updates_only_add_increases() {
    let h = Harness::new();
    h.user(user("u1", None, vec![]));
    let mut before = confession("u1", 6.into());
    before.view_count = 50;
    let mut after = before.clone();
    after.view_count = 40;

    let out = h
        .router
        .handle(TriggerEvent::ConfessionUpdated {
            confession_id: "c1".into(),
            before: before.clone(),
            after: after.clone(),
        })
        .await
        .unwrap();
    assert_eq!(out.counters_updated, 0);

    before.view_count = 40;
    after.view_count = 65;
    h.router
        .handle(TriggerEvent::ConfessionUpdated {
            confession_id: "c1".into(),
            before,
            after,
        })
        .await
        .unwrap();
    assert_eq!(h.db.get_user("u1").unwrap().unwrap().stats.total_views_received, 25);
    assert!(h.provider().sent().is_empty());
}

#[tokio::test]
async fn self_reply_counts_but_does_not_notify() {
    let h = Harness::new();
    h.user(user("u4", Some("tok4"), vec![]));
    h.user(user("u9", Some("tok9"), vec![]));
    h.db.put_confession("c1", &confession("u9", 6.into())).unwrap();
    h.db.put_comment("c1", "k1", &comment("u4", None, "ilk yorum")).unwrap();

    let out = create_comment(&h, "c1", "k2", comment("u4", Some("k1"), "kendime cevap")).await;

    assert_eq!(out.skipped, Some(Skip::SelfAction));
    assert_eq!(out.pushes_sent, 0);
    assert!(h.provider().sent().is_empty());
    assert!(h.db.notifications_for("u4").unwrap().is_empty());
    assert_eq!(h.db.get_user("u4").unwrap().unwrap().stats.total_comments_given, 1);
}

#[tokio::test]
async fn reply_notifies_parent_author() {
    let h = Harness::new();
    h.user(user("u4", Some("tok4"), vec![]));
    h.user(user("u5", Some("tok5"), vec![]));
    h.db.put_confession("c1", &confession("u9", 6.into())).unwrap();
    h.db.put_comment("c1", "k1", &comment("u4", None, "ilk yorum")).unwrap();

    let out = create_comment(&h, "c1", "k2", comment("u5", Some("k1"), "katılıyorum")).await;

    assert_eq!(out.pushes_sent, 1);
    assert_eq!(out.inbox_persisted, 1);
    let sent = &h.provider().sent()[0];
    assert_eq!(sent.token, "tok4");
    assert_eq!(sent.notification.title, "Yorumuna yanıt geldi!");
    assert_eq!(sent.data["type"], "new_reply");
    assert_eq!(sent.data["commentId"], "k2");
    assert_eq!(sent.data["click_action"], "FLUTTER_NOTIFICATION_CLICK");

    let entry = &h.db.notifications_for("u4").unwrap()[0];
    assert_eq!(entry.sender_id.as_deref(), Some("u5"));
    assert_eq!(entry.comment_id.as_deref(), Some("k2"));
}

#[tokio::test]
async fn tokenless_confession_author_still_gets_inbox_entry() {
    let h = Harness::new();
    h.user(user("u1", None, vec![]));
    h.user(user("u2", Some("tok2"), vec![]));
    h.db.put_confession("c1", &confession("u1", 6.into())).unwrap();

    let long = "ç".repeat(130);
    let out = create_comment(&h, "c1", "k1", comment("u2", None, &long)).await;

    assert_eq!(out.pushes_sent, 0);
    assert_eq!(out.inbox_persisted, 1);
    let entry = &h.db.notifications_for("u1").unwrap()[0];
    assert_eq!(entry.title, "Konuna yeni yorum!");
    assert_eq!(entry.kind, NotificationType::NewComment);
    assert_eq!(entry.body.chars().count(), 103);
}

#[tokio::test]
async fn nested_comment_counts_without_notifying() {
    let h = Harness::new();
    h.user(user("u1", Some("tok1"), vec![]));

    let out = h
        .router
        .handle(TriggerEvent::CommentCreated {
            path: "polls/p1/comments/k1".into(),
            comment: comment("u1", None, "anket yorumu"),
        })
        .await
        .unwrap();

    assert_eq!(out.counters_updated, 1);
    assert_eq!(out.skipped, Some(Skip::NotAConfessionComment));
    assert_eq!(h.db.get_user("u1").unwrap().unwrap().stats.total_comments_given, 1);

    h.router
        .handle(TriggerEvent::CommentDeleted {
            path: "polls/p1/comments/k1".into(),
            comment: comment("u1", None, "anket yorumu"),
        })
        .await
        .unwrap();
    assert_eq!(h.db.get_user("u1").unwrap().unwrap().stats.total_comments_given, 0);
}

#[tokio::test]
async fn comment_like_links_to_parent_confession() {
    let h = Harness::new();
    h.user(user("owner", Some("tok-owner"), vec![]));
    h.user(user("fan", None, vec![]));
    h.db.put_confession("c1", &confession("someone", 6.into())).unwrap();
    h.db.put_comment("c1", "k1", &comment("owner", None, "yorum")).unwrap();

    let like = Like {
        target_type: LikeTarget::Comment,
        target_id: "k1".into(),
        user_id: Some("fan".into()),
    };
    let out = h
        .router
        .handle(TriggerEvent::LikeCreated { like_id: "l1".into(), like: like.clone() })
        .await
        .unwrap();

    assert_eq!(out.counters_updated, 2);
    assert_eq!(h.db.get_user("owner").unwrap().unwrap().stats.total_likes_received, 1);
    assert_eq!(h.db.get_user("fan").unwrap().unwrap().stats.total_likes_given, 1);

    let sent = &h.provider().sent()[0];
    assert_eq!(sent.notification.title, "Yorumun beğenildi! ❤️");
    assert_eq!(sent.notification.body, "Birisi paylaşımını beğendi.");
    assert_eq!(sent.data["confessionId"], "c1");
    assert_eq!(sent.data["commentId"], "k1");
    assert_eq!(h.db.notifications_for("owner").unwrap()[0].confession_id.as_deref(), Some("c1"));

    h.router
        .handle(TriggerEvent::LikeDeleted { like_id: "l1".into(), like })
        .await
        .unwrap();
    assert_eq!(h.db.get_user("owner").unwrap().unwrap().stats.total_likes_received, 0);
    assert_eq!(h.db.get_user("fan").unwrap().unwrap().stats.total_likes_given, 0);
}

#[tokio::test]
async fn self_like_counts_but_does_not_notify() {
    let h = Harness::new();
    h.user(user("u1", Some("tok1"), vec![]));
    h.db.put_confession("c1", &confession("u1", 6.into())).unwrap();

    let out = h
        .router
        .handle(TriggerEvent::LikeCreated {
            like_id: "l1".into(),
            like: Like {
                target_type: LikeTarget::Confession,
                target_id: "c1".into(),
                user_id: Some("u1".into()),
            },
        })
        .await
        .unwrap();

    assert_eq!(out.skipped, Some(Skip::SelfAction));
    assert!(h.provider().sent().is_empty());
    assert!(h.db.notifications_for("u1").unwrap().is_empty());
    let stats = h.db.get_user("u1").unwrap().unwrap().stats;
    assert_eq!(stats.total_likes_received, 1);
    assert_eq!(stats.total_likes_given, 1);
}

#[tokio::test]
async fn ambiguous_comment_like_only_credits_liker() {
    let h = Harness::new();
    h.user(user("a", Some("tok-a"), vec![]));
    h.user(user("b", Some("tok-b"), vec![]));
    h.user(user("fan", None, vec![]));
    h.db.put_comment("c1", "dup", &comment("a", None, "x")).unwrap();
    h.db.put_comment("c2", "dup", &comment("b", None, "y")).unwrap();

    let out = h
        .router
        .handle(TriggerEvent::LikeCreated {
            like_id: "l1".into(),
            like: Like {
                target_type: LikeTarget::Comment,
                target_id: "dup".into(),
                user_id: Some("fan".into()),
            },
        })
        .await
        .unwrap();

    assert_eq!(out.skipped, Some(Skip::AmbiguousTarget));
    assert_eq!(out.counters_updated, 1);
    assert!(h.provider().sent().is_empty());
    assert_eq!(h.db.get_user("a").unwrap().unwrap().stats.total_likes_received, 0);
}

#[tokio::test]
async fn message_is_pushed_without_inbox_entry() {
    let h = Harness::new();
    h.user(user("receiver", Some("tok-r"), vec![]));

    let out = h
        .router
        .handle(TriggerEvent::MessageCreated {
            conversation_id: "conv1".into(),
            message_id: "m1".into(),
            message: PrivateMessage {
                sender_id: Some("sender".into()),
                sender_name: Some("Deniz".into()),
                receiver_id: Some("receiver".into()),
                content: "görsel".into(),
                is_image: true,
                is_one_time: true,
            },
        })
        .await
        .unwrap();

    assert_eq!(out.pushes_sent, 1);
    assert_eq!(out.inbox_persisted, 0);
    assert_eq!(out.counters_updated, 0);
    let sent = &h.provider().sent()[0];
    assert_eq!(sent.notification.title, "Deniz mesaj gönderdi");
    assert_eq!(sent.notification.body, "🔥 Tek kullanımlık fotoğraf");
    assert_eq!(sent.data["type"], "new_message");
    assert_eq!(sent.data["conversationId"], "conv1");
    assert!(h.db.notifications_for("receiver").unwrap().is_empty());
}

#[tokio::test]
async fn rejected_single_send_clears_dead_token() {
    let h = Harness::new();
    h.user(user("receiver", Some("dead"), vec![]));
    h.provider().refuse("dead", ErrorCode::InvalidRegistrationToken);

    let out = h
        .router
        .handle(TriggerEvent::MessageCreated {
            conversation_id: "conv1".into(),
            message_id: "m1".into(),
            message: PrivateMessage {
                sender_id: Some("sender".into()),
                receiver_id: Some("receiver".into()),
                content: "selam".into(),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(out.pushes_failed, 1);
    assert_eq!(out.tokens_cleared, 1);
    assert_eq!(h.db.get_user("receiver").unwrap().unwrap().fcm_token, None);
}

#[tokio::test]
async fn missing_parent_and_profiles_are_no_ops() {
    let h = Harness::new();
    h.user(user("u1", Some("tok1"), vec![]));
    h.db.put_confession("c1", &confession("ghost", 6.into())).unwrap();

    let orphan = create_comment(&h, "c1", "k2", comment("u1", Some("missing"), "?")).await;
    assert_eq!(orphan.skipped, Some(Skip::ParentNotFound));

    let no_profile = create_comment(&h, "c1", "k3", comment("u1", None, "?")).await;
    assert_eq!(no_profile.skipped, Some(Skip::ProfileNotFound));

    let no_confession = create_comment(&h, "c404", "k4", comment("u1", None, "?")).await;
    assert_eq!(no_confession.skipped, Some(Skip::TargetNotFound));

    assert!(h.provider().sent().is_empty());
    assert_eq!(h.db.get_user("u1").unwrap().unwrap().stats.total_comments_given, 3);
}

#[tokio::test]
async fn deleting_user_removes_document_and_image() {
    let h = Harness::new();
    h.user(UserProfile { id: "u1".into(), ..Default::default() });
    h.user(UserProfile { id: "u2".into(), ..Default::default() });

    let images = h.storage.path().join("user_profiles");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("u1.jpg"), b"jpeg").unwrap();

    for id in ["u1", "u2"] {
        h.router
            .handle(TriggerEvent::UserDeleted { user_id: id.into() })
            .await
            .unwrap();
    }

    assert!(h.db.get_user("u1").unwrap().is_none());
    assert!(h.db.get_user("u2").unwrap().is_none());
    assert!(!images.join("u1.jpg").exists());
}
