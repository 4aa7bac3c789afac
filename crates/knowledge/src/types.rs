//! Core data types for question answering over government plans.

use planes_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Minimum question length in characters.
pub const MIN_QUESTION_CHARS: usize = 3;

/// Maximum question length in characters.
pub const MAX_QUESTION_CHARS: usize = 500;

/// Maximum number of prior conversation messages.
pub const MAX_HISTORY_MESSAGES: usize = 10;

/// Trailing messages that reach a prompt.
pub const HISTORY_WINDOW: usize = 4;

/// Characters kept from each rendered history message.
pub const HISTORY_MESSAGE_CHARS: usize = 200;

/// Maximum session identifier length in characters.
pub const MAX_SESSION_ID_CHARS: usize = 100;

/// A validated user question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Question(String);

impl Question {
    /// Validate and trim a raw question.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let text = raw.trim();
        let chars = text.chars().count();

        if !(MIN_QUESTION_CHARS..=MAX_QUESTION_CHARS).contains(&chars) {
            return Err(AppError::InvalidInput(format!(
                "Question must be between {} and {} characters (got {})",
                MIN_QUESTION_CHARS, MAX_QUESTION_CHARS, chars
            )));
        }

        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of question intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// One topic within one party's plan
    SpecificParty,
    /// Broad summary of one party's plan
    PartyGeneralPlan,
    /// Spans several or unspecified parties
    GeneralComparison,
    /// Answerable from the party catalog alone
    MetadataQuery,
    /// Classification failed or was ambiguous
    Unclear,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::SpecificParty,
        Intent::PartyGeneralPlan,
        Intent::GeneralComparison,
        Intent::MetadataQuery,
        Intent::Unclear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SpecificParty => "specific_party",
            Intent::PartyGeneralPlan => "party_general_plan",
            Intent::GeneralComparison => "general_comparison",
            Intent::MetadataQuery => "metadata_query",
            Intent::Unclear => "unclear",
        }
    }

    /// Parse the snake_case name. Surrounding whitespace and quotes are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(value))
    }

    /// Whether party extraction runs for this intent.
    pub fn needs_party_extraction(&self) -> bool {
        matches!(self, Intent::SpecificParty | Intent::PartyGeneralPlan)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Prior conversation turns, at most `MAX_HISTORY_MESSAGES`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct History(Vec<ConversationMessage>);

impl History {
    pub fn new(messages: Vec<ConversationMessage>) -> AppResult<Self> {
        if messages.len() > MAX_HISTORY_MESSAGES {
            return Err(AppError::InvalidInput(format!(
                "History may hold at most {} messages (got {})",
                MAX_HISTORY_MESSAGES,
                messages.len()
            )));
        }
        Ok(Self(messages))
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.0
    }

    /// Render the non-blank messages among the last `HISTORY_WINDOW`, each cut
    /// to `HISTORY_MESSAGE_CHARS` characters. `None` when nothing is left.
    pub fn render(&self) -> Option<String> {
        let start = self.0.len().saturating_sub(HISTORY_WINDOW);
        let lines: Vec<String> = self.0[start..]
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "Usuario",
                    Role::Assistant => "Asistente",
                };
                let content: String = m.content.trim().chars().take(HISTORY_MESSAGE_CHARS).collect();
                format!("{}: {}", speaker, content)
            })
            .collect();

        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

impl<'de> Deserialize<'de> for History {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let messages = Vec::<ConversationMessage>::deserialize(deserializer)?;
        History::new(messages).map_err(serde::de::Error::custom)
    }
}

/// Opaque session identifier, used only for grouping traces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> AppResult<Self> {
        let value = raw.trim();
        let chars = value.chars().count();
        if chars == 0 || chars > MAX_SESSION_ID_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Session id must be between 1 and {} characters",
                MAX_SESSION_ID_CHARS
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Anonymous user id: first 16 hex chars of the SHA-256 of the session id.
    pub fn anonymous_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..16].to_string()
    }
}

/// A stored passage of a government plan, without a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageRecord {
    pub text: String,
    pub party: String,
    pub doc_id: String,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl PassageRecord {
    pub fn into_passage(self, score: f32) -> Passage {
        Passage {
            text: self.text,
            party: self.party,
            doc_id: self.doc_id,
            position: self.position,
            score,
            file_name: self.file_name,
        }
    }
}

/// A passage record together with its embedding, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPassage {
    pub record: PassageRecord,
    pub embedding: Vec<f32>,
}

/// A retrieved passage. Identity is `(doc_id, position)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub text: String,
    pub party: String,
    pub doc_id: String,
    pub position: u32,
    /// Relevance, higher is better. Comparable within one retrieval call.
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Passage {
    pub fn key(&self) -> (&str, u32) {
        (&self.doc_id, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_bounds() {
        assert!(Question::parse("¿Y?").is_ok());
        assert!(Question::parse("  ab  ").is_err());
        assert!(Question::parse(&"a".repeat(500)).is_ok());

        let err = Question::parse(&"á".repeat(501)).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_question_is_trimmed() {
        let q = Question::parse("  ¿Qué propone el PLN?\n").unwrap();
        assert_eq!(q.as_str(), "¿Qué propone el PLN?");
    }

    #[test]
    fn test_intent_parse() {
        assert_eq!(Intent::parse("specific_party"), Some(Intent::SpecificParty));
        assert_eq!(Intent::parse(" \"METADATA_QUERY\"\n"), Some(Intent::MetadataQuery));
        assert_eq!(Intent::parse("specific party"), None);
        assert_eq!(Intent::parse(""), None);
    }

    #[test]
    fn test_intent_serde_snake_case() {
        let json = serde_json::to_string(&Intent::PartyGeneralPlan).unwrap();
        assert_eq!(json, "\"party_general_plan\"");
        assert_eq!(Intent::PartyGeneralPlan.to_string(), "party_general_plan");
    }

    #[test]
    fn test_history_limit() {
        let messages = vec![ConversationMessage::user("hola"); 11];
        assert!(History::new(messages).is_err());

        let json = serde_json::to_string(&vec![ConversationMessage::user("x"); 11]).unwrap();
        assert!(serde_json::from_str::<History>(&json).is_err());
    }

    #[test]
    fn test_placeholder_history_renders_nothing() {
        let history = History::new(vec![
            ConversationMessage::user("   "),
            ConversationMessage::assistant(""),
        ])
        .unwrap();
        assert_eq!(history.render(), None);
        assert_eq!(History::default().render(), None);
    }

    #[test]
    fn test_history_render() {
        let history = History::new(vec![
            ConversationMessage::user("¿Qué propone el PLN sobre salud?"),
            ConversationMessage::assistant(" "),
            ConversationMessage::assistant("Según el PLN, ..."),
        ])
        .unwrap();
        assert_eq!(
            history.render().unwrap(),
            "Usuario: ¿Qué propone el PLN sobre salud?\nAsistente: Según el PLN, ..."
        );
    }

    #[test]
    fn test_history_render_keeps_last_four_and_caps_length() {
        let long = "x".repeat(250);
        let history = History::new(vec![
            ConversationMessage::user("primera"),
            ConversationMessage::assistant("segunda"),
            ConversationMessage::user("tercera"),
            ConversationMessage::assistant(long.clone()),
            ConversationMessage::user("quinta"),
            ConversationMessage::assistant("educación ".repeat(30)),
        ])
        .unwrap();

        let rendered = history.render().unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Usuario: tercera");
        assert_eq!(lines[1], format!("Asistente: {}", &long[..200]));
        assert_eq!(lines[2], "Usuario: quinta");
        assert_eq!(
            lines[3].strip_prefix("Asistente: ").unwrap().chars().count(),
            HISTORY_MESSAGE_CHARS
        );
        assert!(!rendered.contains("primera"));
    }

    #[test]
    fn test_history_render_blank_window_renders_nothing() {
        let history = History::new(vec![
            ConversationMessage::user("¿Y sobre educación?"),
            ConversationMessage::assistant(""),
            ConversationMessage::user(" "),
            ConversationMessage::assistant(""),
            ConversationMessage::user("  "),
        ])
        .unwrap();
        assert_eq!(history.render(), None);
    }

    #[test]
    fn test_session_anonymous_id() {
        let session = SessionId::parse("session-123").unwrap();
        let id = session.anonymous_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, SessionId::parse(" session-123 ").unwrap().anonymous_id());
        assert!(SessionId::parse(&"s".repeat(101)).is_err());
        assert!(SessionId::parse("  ").is_err());
    }
}
