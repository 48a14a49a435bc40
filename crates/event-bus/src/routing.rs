use std::str::FromStr;

use crate::{ChannelError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one word.
    One,
    /// `#`: zero or more words.
    Many,
}

/// Topic binding pattern over dot-separated routing keys.
///
/// `*` matches exactly one word and `#` matches zero or more words, so
/// `booking.#` matches `booking`, `booking.created` and `booking.a.b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl BindingPattern {
    /// Parses a pattern. Wildcards must occupy a whole word.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| ChannelError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let segments = pattern
            .split('.')
            .map(|word| match word {
                "" => Err(invalid("empty word")),
                "*" => Ok(Segment::One),
                "#" => Ok(Segment::Many),
                w if w.contains(['*', '#']) => Err(invalid("wildcard must be a whole word")),
                w => Ok(Segment::Literal(w.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the routing key matches this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_segments(&self.segments, &words)
    }
}

fn match_segments(segments: &[Segment], words: &[&str]) -> bool {
    match segments.split_first() {
        None => words.is_empty(),
        Some((Segment::Many, rest)) => {
            // Let `#` swallow 0..=len words and try the remainder each time.
            (0..=words.len()).any(|skip| match_segments(rest, &words[skip..]))
        }
        Some((Segment::One, rest)) => !words.is_empty() && match_segments(rest, &words[1..]),
        Some((Segment::Literal(lit), rest)) => {
            words.first().is_some_and(|w| w == lit) && match_segments(rest, &words[1..])
        }
    }
}

impl FromStr for BindingPattern {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for BindingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
