//! Karaoke-style caption compilation to Advanced SubStation Alpha (ASS).
//!
//! Words are grouped into short runs. Each run produces one event per word,
//! showing the whole run with the current word highlighted, so the highlight
//! walks across the run as the voiceover speaks.

use std::path::Path;

use reel_models::WordTiming;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Canvas width, matching the output frame.
pub const PLAY_RES_X: u32 = 1080;
/// Canvas height, matching the output frame.
pub const PLAY_RES_Y: u32 = 1920;

/// Maximum words shown together.
pub const MAX_WORDS_PER_GROUP: usize = 3;
/// A gap longer than this (seconds) is a natural pause.
pub const PAUSE_GAP_SECS: f64 = 0.3;

/// Subtitle style. Colours use ASS `&HAABBGGRR` notation.
#[derive(Debug, Clone)]
pub struct CaptionStyle {
    pub font_name: String,
    pub font_size: u32,
    pub highlight_colour: String,
    pub neutral_colour: String,
    pub outline_colour: String,
    pub outline_width: u32,
    pub shadow: u32,
    /// Bottom safe margin in canvas pixels
    pub margin_v: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 88,
            highlight_colour: "&H0000FFFF".to_string(),
            neutral_colour: "&H00FFFFFF".to_string(),
            outline_colour: "&H00000000".to_string(),
            outline_width: 5,
            shadow: 2,
            margin_v: 420,
        }
    }
}

/// One timed dialogue line.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEvent {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Group consecutive words into runs of at most [`MAX_WORDS_PER_GROUP`].
///
/// A run closes early when the gap between a word's start and the previous
/// word's end exceeds [`PAUSE_GAP_SECS`] and the run already holds at least
/// two words.
pub fn group_words(words: &[WordTiming]) -> Vec<&[WordTiming]> {
    let mut groups = Vec::new();
    let mut run_start = 0;

    for i in 1..words.len() {
        let run_len = i - run_start;
        let gap = words[i].start - words[i - 1].end;
        if run_len >= MAX_WORDS_PER_GROUP || (gap > PAUSE_GAP_SECS && run_len >= 2) {
            groups.push(&words[run_start..i]);
            run_start = i;
        }
    }
    if run_start < words.len() {
        groups.push(&words[run_start..]);
    }

    groups
}

/// Escape characters that collide with ASS override syntax.
pub fn escape_ass_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\r' | '\n' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

/// Format seconds as ASS `H:MM:SS.cc`.
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

/// Convert a style colour `&HAABBGGRR` into an override colour `&HBBGGRR&`.
fn override_colour(colour: &str) -> String {
    let hex = colour.trim_start_matches("&H").trim_end_matches('&');
    let bgr = if hex.len() == 8 { &hex[2..] } else { hex };
    format!("&H{}&", bgr)
}

/// Build per-word highlight events for every group.
pub fn build_events(words: &[WordTiming], style: &CaptionStyle) -> Vec<CaptionEvent> {
    let highlight = override_colour(&style.highlight_colour);
    let neutral = override_colour(&style.neutral_colour);
    let mut events = Vec::with_capacity(words.len());

    for group in group_words(words) {
        let escaped: Vec<String> = group.iter().map(|w| escape_ass_text(w.word.trim())).collect();

        for (i, word) in group.iter().enumerate() {
            let end = group.get(i + 1).map(|next| next.start).unwrap_or(word.end);

            let text = escaped
                .iter()
                .enumerate()
                .map(|(j, w)| {
                    let colour = if i == j { &highlight } else { &neutral };
                    format!("{{\\1c{}}}{}", colour, w)
                })
                .collect::<Vec<_>>()
                .join(" ");

            events.push(CaptionEvent {
                start: word.start,
                end: end.max(word.start),
                text,
            });
        }
    }

    events
}

/// Render a complete ASS document.
pub fn render_ass(events: &[CaptionEvent], style: &CaptionStyle) -> String {
    let mut doc = format!(
        r#"[Script Info]
ScriptType: v4.00+
PlayResX: {w}
PlayResY: {h}
WrapStyle: 2
ScaledBorderAndShadow: yes

[V4+ Styles]
Format: Name,Fontname,Fontsize,PrimaryColour,SecondaryColour,OutlineColour,BackColour,Bold,Italic,Underline,StrikeOut,ScaleX,ScaleY,Spacing,Angle,BorderStyle,Outline,Shadow,Alignment,MarginL,MarginR,MarginV,Encoding
Style: Reel,{font},{size},{neutral},{highlight},{outline},&H64000000,-1,0,0,0,100,100,0,0,1,{ow},{sh},2,60,60,{mv},1

[Events]
Format: Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text
"#,
        w = PLAY_RES_X,
        h = PLAY_RES_Y,
        font = style.font_name,
        size = style.font_size,
        neutral = style.neutral_colour,
        highlight = style.highlight_colour,
        outline = style.outline_colour,
        ow = style.outline_width,
        sh = style.shadow,
        mv = style.margin_v,
    );

    for event in events {
        doc.push_str(&format!(
            "Dialogue: 0,{},{},Reel,,0,0,0,,{}\n",
            format_ass_time(event.start),
            format_ass_time(event.end),
            event.text
        ));
    }

    doc
}

/// Compiles word timings into a subtitle file.
#[derive(Debug, Clone, Default)]
pub struct CaptionCompiler {
    style: CaptionStyle,
}

impl CaptionCompiler {
    pub fn new(style: CaptionStyle) -> Self {
        Self { style }
    }

    /// Compile timings into an ASS document.
    pub fn compile(&self, words: &[WordTiming]) -> MediaResult<String> {
        if words.is_empty() {
            return Err(MediaError::invalid_input("no word timings to caption"));
        }
        let events = build_events(words, &self.style);
        debug!(words = words.len(), events = events.len(), "Compiled captions");
        Ok(render_ass(&events, &self.style))
    }

    /// Compile and write to `path`.
    pub async fn write(&self, words: &[WordTiming], path: &Path) -> MediaResult<()> {
        let doc = self.compile(words)?;
        tokio::fs::write(path, doc).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Words 0.3s long separated by the given gaps.
    fn words_with_gaps(gaps: &[f64]) -> Vec<WordTiming> {
        let mut words = Vec::new();
        let mut t = 0.0;
        for i in 0..=gaps.len() {
            words.push(WordTiming::new(format!("w{}", i + 1), t, t + 0.3));
            t += 0.3;
            if let Some(g) = gaps.get(i) {
                t += g;
            }
        }
        words
    }

    fn group_words_str(words: &[WordTiming]) -> Vec<Vec<String>> {
        group_words(words)
            .iter()
            .map(|g| g.iter().map(|w| w.word.clone()).collect())
            .collect()
    }

    #[test]
    fn test_groups_never_exceed_three_words_and_keep_order() {
        let words = words_with_gaps(&[0.1, 0.1, 0.1, 0.4, 0.1, 0.1]);
        let groups = group_words(&words);

        assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= MAX_WORDS_PER_GROUP));
        let flattened: Vec<&str> = groups.iter().flat_map(|g| g.iter()).map(|w| w.word.as_str()).collect();
        assert_eq!(flattened, vec!["w1", "w2", "w3", "w4", "w5", "w6", "w7"]);
    }

    #[test]
    fn test_full_group_starts_a_fresh_run() {
        // w4 opens a new run after the cap, so the 0.4s pause before w5 keeps them together
        let words = words_with_gaps(&[0.1, 0.1, 0.1, 0.4, 0.1, 0.1]);
        assert_eq!(
            group_words_str(&words),
            vec![vec!["w1", "w2", "w3"], vec!["w4", "w5", "w6"], vec!["w7"]]
        );
    }

    #[test]
    fn test_pause_breaks_run_of_two() {
        let words = words_with_gaps(&[0.1, 0.5, 0.1]);
        assert_eq!(
            group_words_str(&words),
            vec![vec!["w1", "w2"], vec!["w3", "w4"]]
        );
    }

    #[test]
    fn test_pause_after_single_word_does_not_break() {
        let words = words_with_gaps(&[0.9, 0.1]);
        assert_eq!(group_words_str(&words), vec![vec!["w1", "w2", "w3"]]);
    }

    #[test]
    fn test_event_spans_follow_next_word_start() {
        let words = vec![
            WordTiming::new("Hello", 0.0, 0.4),
            WordTiming::new("big", 0.5, 0.8),
            WordTiming::new("world", 0.9, 1.3),
        ];
        let events = build_events(&words, &CaptionStyle::default());

        assert_eq!(events.len(), 3);
        assert_eq!((events[0].start, events[0].end), (0.0, 0.5));
        assert_eq!((events[1].start, events[1].end), (0.5, 0.9));
        assert_eq!((events[2].start, events[2].end), (0.9, 1.3));

        assert_eq!(
            events[1].text,
            "{\\1c&HFFFFFF&}Hello {\\1c&H00FFFF&}big {\\1c&HFFFFFF&}world"
        );
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(escape_ass_text("a{b}c\\d\ne"), "a\\{b\\}c\\\\d e");
    }

    #[test]
    fn test_format_ass_time() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(61.256), "0:01:01.26");
        assert_eq!(format_ass_time(3725.5), "1:02:05.50");
    }

    #[test]
    fn test_render_document_header() {
        let compiler = CaptionCompiler::default();
        let doc = compiler
            .compile(&[WordTiming::new("{brace}", 0.0, 1.0)])
            .unwrap();

        assert!(doc.contains("PlayResX: 1080"));
        assert!(doc.contains("PlayResY: 1920"));
        assert!(doc.contains("Style: Reel,Arial,88,&H00FFFFFF,&H0000FFFF"));
        assert!(doc.contains("Dialogue: 0,0:00:00.00,0:00:01.00,Reel,,0,0,0,,{\\1c&H00FFFF&}\\{brace\\}"));
    }

    #[test]
    fn test_empty_timings_rejected() {
        assert!(CaptionCompiler::default().compile(&[]).is_err());
    }

    #[tokio::test]
    async fn test_write_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("subtitles.ass");
        CaptionCompiler::default()
            .write(&[WordTiming::new("hi", 0.0, 0.5)], &path)
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.starts_with("[Script Info]"));
    }
}
