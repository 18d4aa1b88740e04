//! Conversation aggregation.
//!
//! A conversation is not stored anywhere: it is derived on demand from the
//! message log by grouping a user's messages per counterpart. The functions
//! here are pure so they can be exercised against literal fixtures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::models::{Message, UserProfile};

/// The other party of a conversation.
pub type Counterpart = UserProfile;

/// One thread between the current user and a counterpart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Who the thread is with.
    pub counterpart: Counterpart,
    /// Most recent message in either direction.
    pub last_message: Message,
    /// Unread messages sent by the counterpart to the current user.
    pub unread_count: u32,
}

struct Partition<'a> {
    counterpart: &'a UserId,
    last: &'a Message,
    unread: u32,
}

/// Group `messages` into conversations for `user`.
///
/// `messages` is the retrieval-ordered set of messages involving `user`;
/// entries that do not involve `user` are ignored. `resolve` maps a
/// counterpart id to its profile and is called once per counterpart;
/// counterparts it cannot resolve are left out.
///
/// The result is sorted by last-message time, newest first. Ties (both the
/// choice of last message inside a thread and the order between threads)
/// keep retrieval order.
pub fn aggregate_conversations<F>(user: &UserId, messages: &[Message], mut resolve: F) -> Vec<Conversation>
where
    F: FnMut(&UserId) -> Option<Counterpart>,
{
    let mut index: HashMap<&UserId, usize> = HashMap::new();
    let mut partitions: Vec<Partition<'_>> = Vec::new();

    for message in messages {
        let Some(counterpart) = message.counterpart_of(user) else {
            continue;
        };
        let unread = u32::from(&message.sender_id == counterpart && message.is_unread_for(user));
        match index.get(counterpart) {
            Some(&i) => {
                let partition = &mut partitions[i];
                if message.created_at > partition.last.created_at {
                    partition.last = message;
                }
                partition.unread += unread;
            }
            None => {
                let _ = index.insert(counterpart, partitions.len());
                partitions.push(Partition {
                    counterpart,
                    last: message,
                    unread,
                });
            }
        }
    }

    let mut conversations: Vec<Conversation> = partitions
        .into_iter()
        .filter_map(|p| {
            let counterpart = resolve(p.counterpart)?;
            Some(Conversation {
                counterpart,
                last_message: p.last.clone(),
                unread_count: p.unread,
            })
        })
        .collect();

    // Stable: equal timestamps keep first-seen order.
    conversations.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    conversations
}
