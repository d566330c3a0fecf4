//! Canned replies used when the model cannot be reached.

use crate::model::{Message, Role};

/// What the user seems to be asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Tables,
    Database,
    Other,
}

impl Intent {
    /// Classify `text` by case-insensitive keyword match.
    pub fn detect(text: &str) -> Self {
        let text = text.to_lowercase();
        let has = |needle: &str| text.contains(needle);

        if has("你好") || has("hello") {
            Self::Greeting
        } else if (has("查询") && has("表")) || ((has("list") || has("show")) && has("table")) {
            Self::Tables
        } else if ["mysql", "sqlite", "database", "sql", "数据库"]
            .into_iter()
            .any(has)
        {
            Self::Database
        } else {
            Self::Other
        }
    }

    pub fn reply(self) -> &'static str {
        match self {
            Self::Greeting => {
                "Hello! I'm the dbchat assistant. I can help you explore and query the database. \
                 What would you like to know?"
            }
            Self::Tables => {
                "I can help you look at the database tables. Available tools:\n\
                 1. get_tables - list all tables\n\
                 2. describe_table - show the structure of a table\n\
                 3. query_database - run an SQL query"
            }
            Self::Database => {
                "I'm connected to the database. Ask me to run a query, for example \
                 \"show all records in the users table\"."
            }
            Self::Other => {
                "I understand your question. Would you like me to look something up in the \
                 database? Tell me what you'd like to query."
            }
        }
    }
}

/// Reply to the last user message in `messages`.
pub fn respond(messages: &[Message]) -> Message {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    Message::assistant(Intent::detect(last_user).reply())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_intents() {
        assert_eq!(Intent::detect("你好"), Intent::Greeting);
        assert_eq!(Intent::detect("HELLO there"), Intent::Greeting);
        assert_eq!(Intent::detect("帮我查询一下有哪些表"), Intent::Tables);
        assert_eq!(Intent::detect("Show me the tables"), Intent::Tables);
        assert_eq!(Intent::detect("is MySQL up?"), Intent::Database);
        assert_eq!(Intent::detect("连接数据库"), Intent::Database);
        assert_eq!(Intent::detect("what's the weather"), Intent::Other);
        assert_eq!(Intent::detect(""), Intent::Other);
    }

    #[test]
    fn greeting_wins_over_tables() {
        assert_eq!(Intent::detect("hello, list tables"), Intent::Greeting);
    }

    #[test]
    fn uses_last_user_message() {
        let messages = [
            Message::user("hello"),
            Message::assistant("hi"),
            Message::user("list the tables please"),
            Message::system("ignored"),
        ];
        assert_eq!(respond(&messages).content, Intent::Tables.reply());
    }

    #[test]
    fn is_deterministic_and_total() {
        let messages = [Message::user("你好")];
        let first = respond(&messages);
        assert_eq!(first.role, Role::Assistant);
        assert_eq!(first, respond(&messages));

        assert_eq!(respond(&[]).content, Intent::Other.reply());
    }
}
