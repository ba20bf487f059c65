//! Lexical intent classification
//!
//! Cheap keyword matching over the utterance. Goodbye short-circuits the
//! ending flow, Confirm/Deny resolve pending tool confirmations, and the
//! rest only colours the prompt. No model calls here; latency matters more
//! than nuance.

/// Coarse user intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Goodbye,
    Confirm,
    Deny,
    Question,
    Action,
    Other,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "Greeting",
            Intent::Goodbye => "Goodbye",
            Intent::Confirm => "Confirm",
            Intent::Deny => "Deny",
            Intent::Question => "Question",
            Intent::Action => "Action",
            Intent::Other => "Other",
        }
    }
}

/// Confirmation reading of an utterance while a tool is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
}

const GOODBYE_MARKERS: [&str; 6] = [
    "bye",
    "goodbye",
    "end the call",
    "that's all",
    "that is all",
    "talk later",
];

const GREETING_MARKERS: [&str; 5] = ["hello", "hi there", "hey there", "good morning", "good afternoon"];

const QUESTION_STARTERS: [&str; 9] = [
    "what", "when", "where", "who", "why", "how", "can you", "could you", "do you",
];

const ACTION_MARKERS: [&str; 7] = [
    "schedule", "book", "transfer", "connect me", "set up", "cancel my", "sign me up",
];

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Classify one utterance
pub fn classify_intent(text: &str) -> Intent {
    let t = normalize(text);
    if t.is_empty() {
        return Intent::Other;
    }

    if GOODBYE_MARKERS.iter().any(|m| t.contains(m)) {
        return Intent::Goodbye;
    }

    match detect_confirmation(text) {
        Some(Confirmation::Yes) => return Intent::Confirm,
        Some(Confirmation::No) => return Intent::Deny,
        None => {}
    }

    if GREETING_MARKERS.iter().any(|m| t == *m || t.starts_with(m)) {
        return Intent::Greeting;
    }

    if ACTION_MARKERS.iter().any(|m| t.contains(m)) {
        return Intent::Action;
    }

    if text.trim_end().ends_with('?') || QUESTION_STARTERS.iter().any(|m| t.starts_with(m)) {
        return Intent::Question;
    }

    Intent::Other
}

const YES_FORMS: [&str; 21] = [
    "yes",
    "yeah",
    "yep",
    "yup",
    "sure",
    "okay",
    "ok",
    "go ahead",
    "do it",
    "that's fine",
    "sounds good",
    "yes please",
    "sure thing",
    "absolutely",
    "correct",
    "affirmative",
    "proceed",
    "transfer me",
    "let's do it",
    "alright",
    "all right",
];

const NO_FORMS: [&str; 15] = [
    "no",
    "nope",
    "nah",
    "not yet",
    "not now",
    "maybe later",
    "don't",
    "wait",
    "hold on",
    "cancel",
    "never mind",
    "not right now",
    "not really",
    "not interested",
    "i'll think about it",
];

/// Detect whether an utterance confirms or rejects a pending action
///
/// Case-insensitive, trims punctuation, and matches a closed set of forms.
/// Negated affirmatives ("not okay") read as rejections, not confirmations.
pub fn detect_confirmation(text: &str) -> Option<Confirmation> {
    let t = normalize(text);
    if t.is_empty() {
        return None;
    }

    let negated = t.contains("not ") || t.starts_with("no ") || t == "no";

    for form in NO_FORMS {
        if t == form || contains_phrase(&t, form) {
            return Some(Confirmation::No);
        }
    }

    for form in YES_FORMS {
        if (t == form || contains_phrase(&t, form)) && !negated {
            return Some(Confirmation::Yes);
        }
    }

    None
}

/// Word-boundary phrase containment ("ok" must not match "broke")
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .windows(phrase.split_whitespace().count().max(1))
        .any(|w| w.join(" ") == phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goodbye_detection() {
        assert_eq!(classify_intent("okay, goodbye"), Intent::Goodbye);
        assert_eq!(classify_intent("Bye!"), Intent::Goodbye);
        assert_eq!(classify_intent("that's all, thanks"), Intent::Goodbye);
    }

    #[test]
    fn test_question_detection() {
        assert_eq!(classify_intent("what services do you provide"), Intent::Question);
        assert_eq!(classify_intent("is this available?"), Intent::Question);
    }

    #[test]
    fn test_action_detection() {
        assert_eq!(classify_intent("please schedule a meeting for me"), Intent::Action);
        assert_eq!(classify_intent("transfer me to a human"), Intent::Action);
    }

    #[test]
    fn test_greeting_detection() {
        assert_eq!(classify_intent("hello"), Intent::Greeting);
        assert_eq!(classify_intent("good morning"), Intent::Greeting);
    }

    #[test]
    fn test_confirm_deny() {
        assert_eq!(classify_intent("yes please"), Intent::Confirm);
        assert_eq!(classify_intent("nope"), Intent::Deny);
    }

    #[test]
    fn test_confirmation_forms() {
        assert_eq!(detect_confirmation("Yes please."), Some(Confirmation::Yes));
        assert_eq!(detect_confirmation("go ahead"), Some(Confirmation::Yes));
        assert_eq!(detect_confirmation("sounds good!"), Some(Confirmation::Yes));
        assert_eq!(detect_confirmation("Nope"), Some(Confirmation::No));
        assert_eq!(detect_confirmation("not right now"), Some(Confirmation::No));
    }

    #[test]
    fn test_negated_affirmative_is_not_confirm() {
        // "okay" is an affirmative form, but the negation blocks it
        assert_eq!(detect_confirmation("that's not okay"), None);
        assert_eq!(detect_confirmation("no, don't do it"), Some(Confirmation::No));
    }

    #[test]
    fn test_neither_confirmation() {
        assert_eq!(detect_confirmation("tell me more about pricing"), None);
        assert_eq!(detect_confirmation(""), None);
    }

    #[test]
    fn test_word_boundary_matching() {
        // "ok" inside another word must not confirm
        assert_eq!(detect_confirmation("the line broke again"), None);
    }
}
