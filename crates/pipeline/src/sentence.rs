//! Sentence segmentation of streaming LLM output
//!
//! Buffers tokens and emits a sentence on each terminal punctuation mark, or
//! at a soft length limit when the model rambles without one. Emitted text
//! is normalised for TTS separately via [`clean_markdown_for_tts`].

use regex::Regex;
use std::sync::OnceLock;

const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Streaming sentence splitter
#[derive(Debug)]
pub struct SentenceSplitter {
    buffer: String,
    /// Emit without a terminator once the buffer reaches this length
    soft_limit: usize,
    emitted: usize,
}

impl SentenceSplitter {
    pub fn new(soft_limit: usize) -> Self {
        Self {
            buffer: String::new(),
            soft_limit: soft_limit.max(1),
            emitted: 0,
        }
    }

    /// Feed one token, returning any sentences it completed
    pub fn push(&mut self, token: &str) -> Vec<String> {
        let mut sentences = Vec::new();

        for c in token.chars() {
            self.buffer.push(c);

            if TERMINATORS.contains(&c) {
                let sentence = self.buffer.trim().to_string();
                self.buffer.clear();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
            } else if self.buffer.len() >= self.soft_limit {
                // Ramble guard: break at the last word boundary
                if let Some(pos) = self.buffer.rfind(char::is_whitespace) {
                    let head = self.buffer[..pos].trim().to_string();
                    let tail = self.buffer[pos..].trim_start().to_string();
                    self.buffer = tail;
                    if !head.is_empty() {
                        sentences.push(head);
                    }
                } else {
                    let sentence = std::mem::take(&mut self.buffer);
                    sentences.push(sentence);
                }
            }
        }

        self.emitted += sentences.len();
        sentences
    }

    /// Flush the residual tail at end of stream
    pub fn flush(&mut self) -> Option<String> {
        let tail = self.buffer.trim().to_string();
        self.buffer.clear();
        if tail.is_empty() {
            None
        } else {
            self.emitted += 1;
            Some(tail)
        }
    }

    /// Sentences emitted so far (including the flushed tail)
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.emitted = 0;
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(200)
    }
}

fn markdown_patterns() -> &'static [Regex; 9] {
    static PATTERNS: OnceLock<[Regex; 9]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"```[\s\S]*?```").unwrap(),
            Regex::new(r"\*\*(.+?)\*\*").unwrap(),
            Regex::new(r"__(.+?)__").unwrap(),
            Regex::new(r"\*(.+?)\*").unwrap(),
            Regex::new(r"_(.+?)_").unwrap(),
            Regex::new(r"~~(.+?)~~").unwrap(),
            Regex::new(r"`(.+?)`").unwrap(),
            Regex::new(r"\[(.+?)\]\(.+?\)").unwrap(),
            Regex::new(r"(?m)^(?:#{1,6}\s+|[-*]\s+|\d+\.\s+)").unwrap(),
        ]
    })
}

/// Strip markdown so the synthesiser never reads formatting symbols aloud
pub fn clean_markdown_for_tts(text: &str) -> String {
    let patterns = markdown_patterns();
    let mut out = patterns[0].replace_all(text, "").into_owned();
    for re in &patterns[1..8] {
        out = re.replace_all(&out, "$1").into_owned();
    }
    out = patterns[8].replace_all(&out, "").into_owned();

    static WS: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    ws.replace_all(&out, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_terminators() {
        let mut splitter = SentenceSplitter::default();
        let mut out = splitter.push("Hello there. How are");
        out.extend(splitter.push(" you today?"));
        assert_eq!(out, vec!["Hello there.", "How are you today?"]);
        assert!(splitter.flush().is_none());
    }

    #[test]
    fn test_token_by_token() {
        let mut splitter = SentenceSplitter::default();
        let mut out = Vec::new();
        for token in ["We ", "provide ", "Salesforce ", "consulting ", "services."] {
            out.extend(splitter.push(token));
        }
        assert_eq!(out, vec!["We provide Salesforce consulting services."]);
    }

    #[test]
    fn test_flush_residual() {
        let mut splitter = SentenceSplitter::default();
        assert!(splitter.push("First. trailing words").len() == 1);
        assert_eq!(splitter.flush().as_deref(), Some("trailing words"));
    }

    #[test]
    fn test_soft_limit_breaks_at_word_boundary() {
        let mut splitter = SentenceSplitter::new(40);
        let out = splitter.push("one two three four five six seven eight nine ten eleven");
        assert!(!out.is_empty());
        for s in &out {
            assert!(!s.ends_with(' '));
            assert!(s.len() <= 40);
        }
    }

    #[test]
    fn test_every_byte_in_exactly_one_sentence() {
        let stream = ["Good morning! We open ", "at nine. Call ", "us anytime?"];
        let mut splitter = SentenceSplitter::default();
        let mut sentences = Vec::new();
        for token in stream {
            sentences.extend(splitter.push(token));
        }
        sentences.extend(splitter.flush());

        let rejoined: String = sentences.join(" ");
        let original: String = stream.concat().split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_resplitting_is_idempotent() {
        let stream = "We provide consulting. It starts at nine! Any questions?";
        let mut first = SentenceSplitter::default();
        let mut pass_one = first.push(stream);
        pass_one.extend(first.flush());

        let mut pass_two = Vec::new();
        for sentence in &pass_one {
            let mut again = SentenceSplitter::default();
            let mut out = again.push(sentence);
            out.extend(again.flush());
            pass_two.extend(out);
        }
        assert_eq!(pass_one, pass_two);
    }

    #[test]
    fn test_clean_markdown() {
        assert_eq!(clean_markdown_for_tts("**bold** and *italic*"), "bold and italic");
        assert_eq!(clean_markdown_for_tts("a `code` span"), "a code span");
        assert_eq!(clean_markdown_for_tts("[link text](http://x.test)"), "link text");
        assert_eq!(clean_markdown_for_tts("# Heading\n- bullet one"), "Heading bullet one");
        assert_eq!(clean_markdown_for_tts("plain sentence."), "plain sentence.");
    }
}
