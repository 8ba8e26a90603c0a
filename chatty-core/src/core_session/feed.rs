//! Group message feed
//!
//! Outgoing text is trimmed, refused when empty, encrypted under the
//! selected group's key and pushed to `messages/{groupId}` with this device
//! as author. Incoming records are classified: the join-request sentinel
//! author marks a request to review, anything else is decrypted.

use super::{IvPolicy, Session, SessionError, SessionResult};
use crate::core_board::records::{from_value, join_requests_path, messages_path, to_value};
use crate::core_board::{BulletinBoard, ChannelRecord};
use crate::core_crypto::{GroupCipher, RandomSource};
use crate::core_invite::IncomingRequest;
use crate::core_vault::{GroupRecord, VaultSession};
use crate::metrics;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Message {
        id: String,
        author: String,
        text: String,
        /// Sent by this device
        own: bool,
    },
    /// A join request to accept or reject
    JoinRequest(IncomingRequest),
    /// Ciphertext that did not decrypt under the group key
    Undecryptable { id: String, author: String },
}

/// Build the encrypted record for `text` in the selected group
pub fn compose(
    session: &Session,
    vault: &VaultSession,
    text: &str,
    random: &RandomSource,
) -> SessionResult<ChannelRecord> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SessionError::EmptyMessage);
    }
    let group = session.current_group(vault)?;
    let content = match session.iv_policy() {
        IvPolicy::GroupStatic => GroupCipher::encrypt(text, &group.symmetric_key, &group.iv)?,
        IvPolicy::PerMessage => GroupCipher::encrypt_with_fresh_iv(text, &group.symmetric_key, random)?,
    };
    Ok(ChannelRecord {
        content,
        author: session.device_id().to_string(),
    })
}

/// Encrypt and publish; returns the new message id
pub async fn send_message(
    board: &dyn BulletinBoard,
    session: &Session,
    vault: &VaultSession,
    text: &str,
    random: &RandomSource,
) -> SessionResult<String> {
    let record = compose(session, vault, text, random)?;
    let channel = messages_path(&session.current_group(vault)?.group_id);
    let id = board.push(&channel, to_value(&channel, &record)?).await?;
    debug!(channel = %channel, message_id = %id, "Message sent");
    Ok(id)
}

/// Classify and, where applicable, decrypt one channel record
pub fn open_record(session: &Session, group: &GroupRecord, id: &str, record: ChannelRecord) -> FeedItem {
    if record.is_join_request() {
        return match IncomingRequest::from_record(&group.group_id, id, &record) {
            Ok(request) => FeedItem::JoinRequest(request),
            Err(e) => {
                warn!(group_id = %group.group_id, message_id = %id, error = %e, "Unreadable join request");
                FeedItem::Undecryptable { id: id.to_string(), author: record.author }
            }
        };
    }

    let decrypted = match session.iv_policy() {
        IvPolicy::GroupStatic => GroupCipher::decrypt(&record.content, &group.symmetric_key, &group.iv),
        IvPolicy::PerMessage => GroupCipher::decrypt_with_prefixed_iv(&record.content, &group.symmetric_key),
    };
    match decrypted {
        Ok(text) => FeedItem::Message {
            id: id.to_string(),
            own: record.author == session.device_id().as_str(),
            author: record.author,
            text,
        },
        Err(e) => {
            metrics::record_decrypt_failure();
            warn!(group_id = %group.group_id, message_id = %id, error = %e, "Message did not decrypt");
            FeedItem::Undecryptable { id: id.to_string(), author: record.author }
        }
    }
}

/// Messages and pending join requests of the selected group, oldest first
pub async fn read_feed(
    board: &dyn BulletinBoard,
    session: &Session,
    vault: &VaultSession,
) -> SessionResult<Vec<FeedItem>> {
    let group = session.current_group(vault)?;

    let mut entries = Vec::new();
    for channel in [messages_path(&group.group_id), join_requests_path(&group.group_id)] {
        for (id, value) in board.list(&channel).await? {
            let path = format!("{}/{}", channel, id);
            let record: ChannelRecord = from_value(&path, value)?;
            entries.push((id, record));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(entries
        .into_iter()
        .map(|(id, record)| open_record(session, group, &id, record))
        .collect())
}
