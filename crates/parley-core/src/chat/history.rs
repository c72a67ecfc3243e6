//! Sliding-window conversation history.
//!
//! A session keeps its system prompt plus the most recent `window` messages.
//! Older user/assistant messages are dropped after every append, so the
//! stored history never grows beyond `window + 1` entries.

use parley_types::llm::{Message, MessageRole};

/// Ordered message list of one session with a fixed-size window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    window: usize,
}

impl ConversationHistory {
    /// Start a fresh history holding only the system prompt.
    pub fn seeded(system_prompt: &str, window: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            window,
        }
    }

    /// Rebuild a history from stored messages, enforcing the window.
    pub fn from_messages(messages: Vec<Message>, window: usize) -> Self {
        let mut history = Self { messages, window };
        history.truncate();
        history
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    fn has_system(&self) -> bool {
        self.messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System)
    }

    /// Message list for the next request: the history plus the new utterance.
    ///
    /// Does not mutate the history; the turn is only committed on success.
    pub fn request_messages(&self, utterance: &str) -> Vec<Message> {
        let mut messages = self.messages.clone();
        messages.push(Message::user(utterance));
        messages
    }

    /// Commit a completed user/assistant exchange.
    pub fn push_turn(&mut self, user: &str, assistant: &str) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
        self.truncate();
    }

    /// Append one message (used for interrupted turns).
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.truncate();
    }

    /// Keep the system message (if any) and the last `window` others.
    fn truncate(&mut self) {
        let offset = usize::from(self.has_system());
        let conversational = self.messages.len() - offset;
        if conversational > self.window {
            let excess = conversational - self.window;
            self.messages.drain(offset..offset + excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_holds_only_system_prompt() {
        let history = ConversationHistory::seeded("You are James...", 10);
        assert_eq!(history.messages().len(), 1);
        assert_eq!(history.messages()[0].role, MessageRole::System);
    }

    #[test]
    fn test_request_messages_does_not_commit() {
        let history = ConversationHistory::seeded("sys", 10);
        let request = history.request_messages("Hi");
        assert_eq!(request.len(), 2);
        assert_eq!(request[1], Message::user("Hi"));
        assert_eq!(history.messages().len(), 1);
    }

    #[test]
    fn test_window_bound_holds_after_many_turns() {
        let mut history = ConversationHistory::seeded("sys", 10);
        for i in 0..50 {
            history.push_turn(&format!("q{i}"), &format!("a{i}"));
            assert!(history.messages().len() <= 11);
        }
        let messages = history.messages();
        assert_eq!(messages.len(), 11);
        assert_eq!(messages[0], Message::system("sys"));
        // Oldest kept exchange is turn 45; newest is turn 49.
        assert_eq!(messages[1], Message::user("q45"));
        assert_eq!(messages[10], Message::assistant("a49"));
    }

    #[test]
    fn test_odd_window_keeps_most_recent_messages() {
        let mut history = ConversationHistory::seeded("sys", 3);
        history.push_turn("q1", "a1");
        history.push_turn("q2", "a2");
        let contents: Vec<_> = history.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "a1", "q2", "a2"]);
    }

    #[test]
    fn test_zero_window_keeps_only_system() {
        let mut history = ConversationHistory::seeded("sys", 0);
        history.push_turn("q", "a");
        assert_eq!(history.messages(), &[Message::system("sys")]);
    }

    #[test]
    fn test_from_messages_truncates_oversized_input() {
        let mut stored = vec![Message::system("sys")];
        for i in 0..8 {
            stored.push(Message::user(format!("q{i}")));
        }
        let history = ConversationHistory::from_messages(stored, 4);
        assert_eq!(history.messages().len(), 5);
        assert_eq!(history.messages()[1], Message::user("q4"));
    }

    #[test]
    fn test_window_without_system_message() {
        let stored = vec![
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
        ];
        let history = ConversationHistory::from_messages(stored, 2);
        assert_eq!(
            history.messages(),
            &[Message::assistant("a1"), Message::user("q2")]
        );
    }
}
