//! Normalization of word-timestamp payloads.
//!
//! Speech services disagree on casing, nesting and units. Everything is
//! folded into an ordered `Vec<WordTiming>` in seconds.

use std::collections::HashMap;

use reel_models::WordTiming;
use serde_json::Value;

use crate::error::{AiError, AiResult};

/// Keys under which the word array may be nested.
const NEST_KEYS: [&str; 6] = ["words", "timestamps", "word_timestamps", "wordtimestamps", "data", "results"];
const MAX_NESTING: usize = 3;

const WORD_KEYS: [&str; 3] = ["word", "text", "token"];
const START_SECS_KEYS: [&str; 3] = ["start", "start_time", "starttime"];
const START_MS_KEYS: [&str; 2] = ["start_ms", "startms"];
const END_SECS_KEYS: [&str; 3] = ["end", "end_time", "endtime"];
const END_MS_KEYS: [&str; 2] = ["end_ms", "endms"];
const DURATION_SECS_KEYS: [&str; 1] = ["duration"];
const DURATION_MS_KEYS: [&str; 2] = ["duration_ms", "durationms"];

fn find_array(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) if depth < MAX_NESTING => map
            .iter()
            .filter(|(k, _)| NEST_KEYS.contains(&k.to_ascii_lowercase().as_str()))
            .find_map(|(_, v)| find_array(v, depth + 1)),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

struct Entry<'a>(HashMap<String, &'a Value>);

impl<'a> Entry<'a> {
    fn new(map: &'a serde_json::Map<String, Value>) -> Self {
        Self(map.iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect())
    }

    fn number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.0.get(*k).copied().and_then(as_f64))
    }

    fn seconds(&self, secs_keys: &[&str], ms_keys: &[&str]) -> Option<f64> {
        self.number(secs_keys)
            .or_else(|| self.number(ms_keys).map(|ms| ms / 1000.0))
    }

    fn word(&self) -> Option<&'a str> {
        WORD_KEYS
            .iter()
            .find_map(|k| self.0.get(*k).copied().and_then(Value::as_str))
    }
}

/// Normalize a timestamp payload into word timings ordered by start time.
pub fn normalize_timestamps(payload: &Value) -> AiResult<Vec<WordTiming>> {
    let items = find_array(payload, 0)
        .ok_or_else(|| AiError::timestamp_format("no word array found"))?;

    let mut timings = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let map = item
            .as_object()
            .ok_or_else(|| AiError::timestamp_format(format!("entry {} is not an object", index)))?;
        let entry = Entry::new(map);

        let word = entry
            .word()
            .ok_or_else(|| AiError::timestamp_format(format!("entry {} has no word", index)))?
            .trim();
        if word.is_empty() {
            continue;
        }

        let start = entry
            .seconds(&START_SECS_KEYS, &START_MS_KEYS)
            .ok_or_else(|| AiError::timestamp_format(format!("entry {} has no start time", index)))?;
        let end = entry
            .seconds(&END_SECS_KEYS, &END_MS_KEYS)
            .or_else(|| {
                entry
                    .seconds(&DURATION_SECS_KEYS, &DURATION_MS_KEYS)
                    .map(|d| start + d)
            })
            .ok_or_else(|| AiError::timestamp_format(format!("entry {} has no end time", index)))?;

        timings.push(WordTiming::new(word, start.max(0.0), end.max(start).max(0.0)));
    }

    if timings.is_empty() {
        return Err(AiError::timestamp_format("payload contains no words"));
    }
    timings.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(timings)
}
