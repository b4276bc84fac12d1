//! Script synthesis: topic + duration to a narration script whose word count
//! lands inside a fixed band.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use reel_models::TargetDuration;
use tracing::{debug, info, warn};

use crate::error::{AiError, AiResult};
use crate::provider::{CompletionRequest, TextCompletionProvider};

/// Sampling temperature for every script request.
pub const TEMPERATURE: f32 = 0.8;

const SYSTEM_INSTRUCTION: &str = "You write narration for short vertical videos. \
Reply with only the words the narrator speaks: no title, no labels, no stage directions, \
no hashtags, no emojis and no quotation marks around the script.";

/// Word-count targets for one duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptPreset {
    pub target_words: usize,
    pub min_words: usize,
    pub max_words: usize,
    pub max_tokens: u32,
}

impl ScriptPreset {
    pub fn for_duration(duration: TargetDuration) -> Self {
        match duration {
            TargetDuration::Short => Self {
                target_words: 85,
                min_words: 75,
                max_words: 95,
                max_tokens: 600,
            },
            TargetDuration::Long => Self {
                target_words: 165,
                min_words: 150,
                max_words: 180,
                max_tokens: 1000,
            },
        }
    }

    pub fn accepts(&self, words: usize) -> bool {
        (self.min_words..=self.max_words).contains(&words)
    }
}

/// Narrative beats scaled to the duration.
fn beats(duration: TargetDuration) -> &'static str {
    match duration {
        TargetDuration::Short => {
            "1. A one-sentence hook that makes the viewer stop scrolling.\n\
             2. Three surprising, concrete facts, one or two sentences each.\n\
             3. A short closing line that lands the idea."
        }
        TargetDuration::Long => {
            "1. A one-sentence hook that makes the viewer stop scrolling.\n\
             2. Two sentences of context explaining why the topic matters.\n\
             3. Five surprising, concrete points, one or two sentences each.\n\
             4. A payoff that ties the points together.\n\
             5. A closing question or call to follow for more."
        }
    }
}

/// Initial prompt for a topic.
pub fn build_prompt(topic: &str, duration: TargetDuration) -> String {
    let preset = ScriptPreset::for_duration(duration);
    format!(
        "Write a {secs}-second voiceover script about: {topic}\n\n\
         Length: about {target} words, never fewer than {min} or more than {max}.\n\
         Structure:\n{beats}\n\n\
         Write in plain conversational sentences, as one paragraph.",
        secs = duration.as_secs(),
        topic = topic,
        target = preset.target_words,
        min = preset.min_words,
        max = preset.max_words,
        beats = beats(duration),
    )
}

/// Follow-up prompt after a script came back too short.
pub fn corrective_prompt(base: &str, previous: &str, preset: &ScriptPreset, words: usize) -> String {
    format!(
        "{base}\n\nYour previous script was {words} words, {short} words short of the \
         {target}-word target. Expand it with more concrete detail while keeping the same \
         structure. Previous script:\n{previous}",
        base = base,
        words = words,
        short = preset.target_words.saturating_sub(words),
        target = preset.target_words,
        previous = previous,
    )
}

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z]*").expect("valid regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#{1,6}\s+.*$").expect("valid regex"));
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*[*_]*(?:hook|intro|introduction|body|main|context|point\s*\d*|fact\s*\d*|payoff|conclusion|closing|outro|cta|call to action|scene\s*\d*|narrator|voiceover|voice over|script|title)\s*\d*[*_]*\s*:\s*[*_]*",
    )
    .expect("valid regex")
});
static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("valid regex"));
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid regex"));
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_]{1,3}").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}'), ('\u{2018}', '\u{2019}')];

fn strip_wrapping_quotes(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim();
        let stripped = QUOTE_PAIRS.iter().find_map(|(open, close)| {
            trimmed
                .strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        });
        match stripped {
            Some(inner) => text = inner,
            None => return trimmed,
        }
    }
}

/// Remove formatting the narrator should not read aloud.
pub fn clean_script(raw: &str) -> String {
    let text = CODE_FENCE_RE.replace_all(raw, "");
    let text = strip_wrapping_quotes(&text);
    let text = HEADING_RE.replace_all(text, "");
    let text = LABEL_RE.replace_all(&text, "");
    let text = BRACKETED_RE.replace_all(&text, " ");
    let text = HASHTAG_RE.replace_all(&text, "");
    let text = EMPHASIS_RE.replace_all(&text, "");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    strip_wrapping_quotes(&text).to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')', '\u{201d}', '\u{2019}'])
        .ends_with(['.', '!', '?'])
}

/// Cut an over-long script to at most `max` words.
///
/// Prefers the last sentence end that keeps at least `min` words; otherwise a
/// hard cut at `max`.
pub fn trim_to_band(text: &str, min: usize, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        return text.to_string();
    }

    let lower = min.max(1) - 1;
    let cut = (lower..max)
        .rev()
        .find(|&i| ends_sentence(words[i]))
        .map(|i| i + 1)
        .unwrap_or(max);
    words[..cut].join(" ")
}

/// An accepted script.
#[derive(Debug, Clone)]
pub struct Script {
    pub text: String,
    pub word_count: usize,
    pub model: String,
    /// Provider calls made, including the accepted one
    pub attempts: u32,
}

/// Tries each provider in order with corrective retries.
pub struct ScriptSynthesizer {
    providers: Vec<Arc<dyn TextCompletionProvider>>,
    attempts_per_model: u32,
}

impl ScriptSynthesizer {
    pub fn new(providers: Vec<Arc<dyn TextCompletionProvider>>, attempts_per_model: u32) -> Self {
        Self {
            providers,
            attempts_per_model: attempts_per_model.max(1),
        }
    }

    /// Generate a script for `topic` (already sanitized).
    pub async fn generate(&self, topic: &str, duration: TargetDuration) -> AiResult<Script> {
        let preset = ScriptPreset::for_duration(duration);
        let base = build_prompt(topic, duration);
        let mut calls = 0u32;
        let mut last_error = String::from("no providers configured");

        for provider in &self.providers {
            let mut prompt = base.clone();

            for attempt in 1..=self.attempts_per_model {
                calls += 1;
                let request = CompletionRequest {
                    system: SYSTEM_INSTRUCTION.to_string(),
                    prompt: prompt.clone(),
                    temperature: TEMPERATURE,
                    max_tokens: preset.max_tokens,
                };

                let raw = match provider.complete(&request).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(model = provider.name(), attempt, "Script request failed: {}", e);
                        last_error = e.to_string();
                        continue;
                    }
                };

                let mut text = clean_script(&raw);
                let mut words = word_count(&text);
                if words > preset.max_words {
                    text = trim_to_band(&text, preset.min_words, preset.max_words);
                    debug!(model = provider.name(), from = words, to = word_count(&text), "Trimmed script");
                    words = word_count(&text);
                }

                if preset.accepts(words) {
                    info!(model = provider.name(), attempt, words, "Script accepted");
                    return Ok(Script {
                        text,
                        word_count: words,
                        model: provider.name().to_string(),
                        attempts: calls,
                    });
                }

                warn!(
                    model = provider.name(),
                    attempt,
                    words,
                    min = preset.min_words,
                    "Script too short, retrying with correction"
                );
                last_error = format!("{} returned {} words, need {}", provider.name(), words, preset.min_words);
                prompt = corrective_prompt(&base, &text, &preset, words);
            }
        }

        Err(AiError::ScriptExhausted {
            attempts: calls,
            last_error,
        })
    }
}
