use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::Season;
use crate::routes::message::Message;

/// Replaces sticker text until the festival opens.
pub const LOCKED_CONTENT: &str = "LOCKED UNTIL FESTIVAL";

/// Text of `message` as `viewer` may see it. `None` means the field is
/// omitted entirely.
///
/// Privacy is applied before the unlock rule: a private message only
/// exists for its two participants, and only then does the festival date
/// decide between the real text and the locked placeholder.
pub fn mask_content(message: &Message, viewer: Uuid, unlocked: bool) -> Option<String> {
    if message.is_private && !message.is_participant(viewer) {
        return None;
    }
    if !unlocked {
        return Some(LOCKED_CONTENT.to_string());
    }
    Some(message.content.clone())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderInfo {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// A sticker as returned to clients: visual identity always present, text
/// subject to [`mask_content`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender: SenderInfo,
    pub recipient: Uuid,
    pub sticker_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub season: Season,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn for_viewer(message: &Message, viewer: Uuid, unlocked: bool) -> Self {
        Self::with_content(message, mask_content(message, viewer, unlocked))
    }

    /// The sender's own copy, as listed in their outbox.
    pub fn for_author(message: &Message) -> Self {
        Self::with_content(message, Some(message.content.clone()))
    }

    fn with_content(message: &Message, content: Option<String>) -> Self {
        Self {
            id: message.id,
            sender: SenderInfo {
                id: message.sender_id,
                nickname: message.sender_nickname.clone(),
            },
            recipient: message.recipient_id,
            sticker_type: message.sticker_type.clone(),
            content,
            season: message.season,
            year: message.year,
            scene_id: message.scene_id.clone(),
            is_private: message.is_private,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cast {
        sender: Uuid,
        recipient: Uuid,
        stranger: Uuid,
    }

    fn cast() -> Cast {
        Cast {
            sender: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            stranger: Uuid::new_v4(),
        }
    }

    fn message(cast: &Cast, is_private: bool) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: cast.sender,
            recipient_id: cast.recipient,
            sticker_type: "lantern".into(),
            content: "新年快乐".into(),
            season: Season::Spring,
            year: 2026,
            scene_id: Some("spring_dinner".into()),
            is_private,
            created_at: Utc::now(),
            sender_nickname: Some("A".into()),
        }
    }

    #[test]
    fn locked_public_message_shows_placeholder() {
        let c = cast();
        let m = message(&c, false);
        assert_eq!(mask_content(&m, c.recipient, false).as_deref(), Some(LOCKED_CONTENT));
        assert_eq!(mask_content(&m, c.stranger, false).as_deref(), Some(LOCKED_CONTENT));
        assert_eq!(mask_content(&m, c.recipient, true).as_deref(), Some("新年快乐"));
    }

    #[test]
    fn private_message_hidden_from_third_parties_in_any_state() {
        let c = cast();
        let m = message(&c, true);
        assert_eq!(mask_content(&m, c.stranger, false), None);
        assert_eq!(mask_content(&m, c.stranger, true), None);
    }

    #[test]
    fn private_message_still_locked_for_recipient() {
        let c = cast();
        let m = message(&c, true);
        assert_eq!(mask_content(&m, c.recipient, false).as_deref(), Some(LOCKED_CONTENT));
        assert_eq!(mask_content(&m, c.recipient, true).as_deref(), Some("新年快乐"));
    }

    #[test]
    fn sender_is_locked_out_like_everyone_else() {
        let c = cast();
        for is_private in [false, true] {
            let m = message(&c, is_private);
            assert_eq!(mask_content(&m, c.sender, false).as_deref(), Some(LOCKED_CONTENT));
            assert_eq!(mask_content(&m, c.sender, true).as_deref(), Some("新年快乐"));
        }
    }

    #[test]
    fn outbox_shows_author_the_real_text() {
        let c = cast();
        for is_private in [false, true] {
            let m = message(&c, is_private);
            let view = MessageView::for_author(&m);
            assert_eq!(view.content.as_deref(), Some("新年快乐"));
        }
    }

    #[test]
    fn every_read_path_masks_identically() {
        let c = cast();
        for is_private in [false, true] {
            let m = message(&c, is_private);
            for viewer in [c.sender, c.recipient, c.stranger] {
                for unlocked in [false, true] {
                    let view = MessageView::for_viewer(&m, viewer, unlocked);
                    assert_eq!(view.content, mask_content(&m, viewer, unlocked));
                }
            }
        }
    }

    #[test]
    fn view_keeps_sticker_identity_when_masked() {
        let c = cast();
        let m = message(&c, true);
        let view = MessageView::for_viewer(&m, c.stranger, false);
        assert_eq!(view.id, m.id);
        assert_eq!(view.sticker_type, "lantern");
        assert_eq!(view.sender.id, c.sender);
        assert_eq!(view.created_at, m.created_at);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["stickerType"], "lantern");
        assert_eq!(json["_id"], m.id.to_string());
    }
}
