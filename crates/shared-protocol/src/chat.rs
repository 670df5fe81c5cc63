//! Chat datagram payloads: `<username>|<message>`

use bytes::Bytes;

/// Separator between sender name and message text
pub const CHAT_SEPARATOR: char = '|';

/// Name reported when a datagram carries no sender
pub const UNKNOWN_SENDER: &str = "unknown";

/// One chat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPayload {
    pub username: String,
    pub message: String,
}

impl ChatPayload {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }

    /// Announcement sent when a client starts
    pub fn joined(username: &str) -> Self {
        Self::new(username, format!("{} joined", username))
    }

    /// Best-effort announcement sent when a client shuts down
    pub fn left(username: &str) -> Self {
        Self::new(username, format!("{} left", username))
    }

    pub fn encode(&self) -> Bytes {
        Bytes::from(format!(
            "{}{}{}",
            self.username, CHAT_SEPARATOR, self.message
        ))
    }

    /// Split on the first separator. Without a sender the whole text is the message.
    pub fn decode(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        match text.find(CHAT_SEPARATOR) {
            Some(sep) if sep > 0 => Self::new(&text[..sep], &text[sep + 1..]),
            _ => Self::new(UNKNOWN_SENDER, text.into_owned()),
        }
    }
}

/// Usernames may not contain the separator
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && !username.contains(CHAT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_separator_splits() {
        let payload = ChatPayload::decode(b"ana|a | b | c");
        assert_eq!(payload.username, "ana");
        assert_eq!(payload.message, "a | b | c");
    }

    #[test]
    fn test_missing_sender() {
        let payload = ChatPayload::decode(b"no separator here");
        assert_eq!(payload.username, UNKNOWN_SENDER);
        assert_eq!(payload.message, "no separator here");

        let payload = ChatPayload::decode(b"|leading");
        assert_eq!(payload.username, UNKNOWN_SENDER);
        assert_eq!(payload.message, "|leading");
    }

    #[test]
    fn test_encode_and_announcements() {
        assert_eq!(
            ChatPayload::new("bo", "hi").encode(),
            Bytes::from_static(b"bo|hi")
        );
        assert_eq!(ChatPayload::joined("bo").encode(), Bytes::from_static(b"bo|bo joined"));
        assert_eq!(ChatPayload::left("bo").message, "bo left");
    }

    #[test]
    fn test_username_validation() {
        assert!(is_valid_username("ana"));
        assert!(!is_valid_username("a|na"));
        assert!(!is_valid_username(""));
    }
}
