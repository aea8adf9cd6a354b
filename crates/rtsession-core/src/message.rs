//! Typed requests and responses exchanged with the backend.

use serde::{Deserialize, Serialize};

/// A user present in a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub handle: String,
}

/// Chat message delivered on a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: String,
    pub message_id: String,
    pub user_id: String,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
    pub content: String,
}

/// Account details of the connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfInfo {
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

/// Relationship state between the user and a friend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendState {
    Mutual,
    InviteSent,
    InviteReceived,
    Blocked,
}

/// Entry in the friends list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: String,
    pub handle: String,
    pub state: FriendState,
}

/// Request sent to the backend over an established connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Join a chat room.
    TopicJoin { room: String },
    /// Leave a joined topic.
    TopicLeave { topic: String },
    /// Post a message to a joined topic.
    TopicMessageSend { topic: String, content: String },
    /// Fetch the connected user's account.
    SelfFetch,
    /// Add a friend by user id.
    FriendAdd { user_id: String },
    /// Remove a friend by user id.
    FriendRemove { user_id: String },
    /// List the user's friends.
    FriendsList,
}

impl Request {
    /// Short name of the request, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TopicJoin { .. } => "topic_join",
            Self::TopicLeave { .. } => "topic_leave",
            Self::TopicMessageSend { .. } => "topic_message_send",
            Self::SelfFetch => "self_fetch",
            Self::FriendAdd { .. } => "friend_add",
            Self::FriendRemove { .. } => "friend_remove",
            Self::FriendsList => "friends_list",
        }
    }
}

/// Backend reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Plain acknowledgement.
    Ack,
    /// Topic joined; carries the topic id and the caller's own presence.
    TopicJoined {
        topic: String,
        presence: UserPresence,
    },
    /// Message accepted.
    MessageAck { message_id: String },
    /// Account details.
    SelfInfo(SelfInfo),
    /// Friends list.
    Friends { friends: Vec<Friend> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::TopicMessageSend {
            topic: "Topic1".into(),
            content: "Hello!".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("topic_message_send"));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(parsed.name(), "topic_message_send");
    }

    #[test]
    fn test_friend_state_names() {
        let json = serde_json::to_string(&FriendState::InviteSent).unwrap();
        assert_eq!(json, r#""invite_sent""#);
    }
}
