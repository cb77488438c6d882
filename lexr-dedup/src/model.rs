//! Word-occurrence record and its identity key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One row of `word_occurrences`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque, store-assigned, immutable
    pub id: String,
    /// Hebrew token exactly as imported (niqqud included)
    pub word: String,
    /// Parent verse reference
    pub verse_id: String,
    /// Ordinal of the word inside its verse, when known
    pub position: Option<i64>,
    /// Generated SVG asset for the word, when one was produced
    pub svg: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// New record with a freshly generated id
    pub fn new(word: impl Into<String>, verse_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            word: word.into(),
            verse_id: verse_id.into(),
            position: None,
            svg: None,
            created_at,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_svg(mut self, svg: impl Into<String>) -> Self {
        self.svg = Some(svg.into());
        self
    }

    /// Asset payload, treating whitespace-only payloads as absent
    pub fn asset(&self) -> Option<&str> {
        self.svg.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn identity_key(&self, mode: KeyMode) -> IdentityKey {
        IdentityKey {
            word: self.word.clone(),
            verse_id: self.verse_id.clone(),
            position: match mode {
                KeyMode::WordVerse => None,
                KeyMode::WordVersePosition => self.position,
            },
        }
    }
}

/// Which natural attributes make up the identity key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// `(word, verse_id)`
    #[default]
    WordVerse,
    /// `(word, verse_id, position)`
    WordVersePosition,
}

impl KeyMode {
    /// Store columns forming the key, in key order
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            KeyMode::WordVerse => &["word", "verse_id"],
            KeyMode::WordVersePosition => &["word", "verse_id", "position"],
        }
    }
}

/// Composite identity that should be unique across the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub word: String,
    pub verse_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "({}, {}, #{})", self.word, self.verse_id, pos),
            None => write!(f, "({}, {})", self.word, self.verse_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_word_verse_key_ignores_position() {
        let a = Record::new("שלום", "gen-1-1", at(1)).with_position(1);
        let b = Record::new("שלום", "gen-1-1", at(2)).with_position(4);
        assert_eq!(a.identity_key(KeyMode::WordVerse), b.identity_key(KeyMode::WordVerse));
        assert_ne!(
            a.identity_key(KeyMode::WordVersePosition),
            b.identity_key(KeyMode::WordVersePosition)
        );
    }

    #[test]
    fn test_niqqud_variants_are_distinct_keys() {
        let plain = Record::new("שלום", "gen-1-1", at(1));
        let pointed = Record::new("שָׁלוֹם", "gen-1-1", at(1));
        assert_ne!(
            plain.identity_key(KeyMode::WordVerse),
            pointed.identity_key(KeyMode::WordVerse)
        );
    }

    #[test]
    fn test_blank_svg_is_not_an_asset() {
        let rec = Record::new("אור", "gen-1-3", at(1)).with_svg("   ");
        assert!(rec.asset().is_none());
        let rec = rec.with_svg("<svg/>");
        assert_eq!(rec.asset(), Some("<svg/>"));
    }

    #[test]
    fn test_key_display() {
        let rec = Record::new("אור", "gen-1-3", at(1)).with_position(2);
        assert_eq!(rec.identity_key(KeyMode::WordVerse).to_string(), "(אור, gen-1-3)");
        assert_eq!(
            rec.identity_key(KeyMode::WordVersePosition).to_string(),
            "(אור, gen-1-3, #2)"
        );
    }
}
