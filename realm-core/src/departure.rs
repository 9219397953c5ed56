//! Departure classifier for action text.
//!
//! Decides whether a physical action means the actor is leaving the scene or
//! withdrawing from it (going to bed, walking out, dozing off). Used by the
//! narrator to switch tone when the focal character is no longer present.

/// Phrases that mean the actor is leaving or withdrawing.
const DEPARTURE_PHRASES: &[&str] = &[
    "leaves",
    "leaving",
    "walks away",
    "walks out",
    "steps out",
    "storms out",
    "slips away",
    "slips out",
    "heads off",
    "heads out",
    "heads upstairs",
    "heads to bed",
    "heads up to",
    "goes upstairs",
    "goes to bed",
    "goes to sleep",
    "climbs the stairs",
    "retreats to",
    "retires to",
    "turns in for the night",
    "exits",
    "departs",
    "withdraws",
    "falls asleep",
    "drifts off to sleep",
    "dozes off",
    "disappears through",
    "disappears up",
];

/// Phrases that look like departures but are not.
const NEGATIONS: &[&str] = &["doesn't leave", "does not leave", "refuses to leave", "about to leave but"];

/// Words that, right before a one-word phrase, make it a noun ("the leaves",
/// "tea leaves", "the exits").
const NOUN_MARKERS: &[&str] = &[
    "a", "an", "the", "some", "its", "his", "her", "their", "my", "your", "our", "these", "those", "tea",
    "autumn", "fallen", "dead", "dry", "emergency", "fire",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Start indices where `phrase` occurs as whole words in `words`.
fn occurrences<'a>(words: &'a [String], phrase: &'a [&'a str]) -> impl Iterator<Item = usize> + 'a {
    words
        .windows(phrase.len())
        .enumerate()
        .filter(move |(_, window)| window.iter().map(String::as_str).eq(phrase.iter().copied()))
        .map(|(i, _)| i)
}

fn is_noun_use(words: &[String], at: usize) -> bool {
    let before = at.checked_sub(1).and_then(|i| words.get(i)).map(String::as_str);
    let after = words.get(at + 1).map(String::as_str);
    before.is_some_and(|w| NOUN_MARKERS.contains(&w)) || after == Some("of")
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let phrase: Vec<&str> = phrase.split(' ').collect();
    occurrences(words, &phrase).any(|at| phrase.len() > 1 || !is_noun_use(words, at))
}

/// Whether `action` describes the actor leaving the scene.
#[must_use]
pub fn is_departure(action: &str) -> bool {
    let words = words(action);
    if NEGATIONS.iter().any(|n| contains_phrase(&words, n)) {
        return false;
    }
    DEPARTURE_PHRASES.iter().any(|p| contains_phrase(&words, p))
}
