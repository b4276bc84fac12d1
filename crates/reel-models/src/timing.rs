//! Word-level speech timings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One spoken word with its start/end offsets in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Scale both offsets by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            word: self.word.clone(),
            start: self.start * factor,
            end: self.end * factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled() {
        let t = WordTiming::new("hello", 1.0, 2.0).scaled(0.5);
        assert_eq!(t.word, "hello");
        assert!((t.start - 0.5).abs() < 1e-9);
        assert!((t.end - 1.0).abs() < 1e-9);
    }
}
