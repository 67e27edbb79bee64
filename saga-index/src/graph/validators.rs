//! Type-specific validators for raw NER candidates.
//!
//! Each validator is a table of pure rules evaluated in a fixed priority
//! order: the first rule with an opinion wins, and a span nobody vouches for
//! is rejected. Rules inspect a pre-tokenized [`SpanWords`] so the string
//! work happens once per candidate.

/// Pronouns never name a character.
const PRONOUNS: &[&str] = &[
    "he", "she", "they", "him", "her", "them", "his", "hers", "their", "theirs", "i", "you", "we",
    "us", "it", "its", "me", "my", "mine", "your", "yours", "our", "ours",
];

/// Frequent sentence-initial words the heuristic NER over-generates.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "but", "or", "if", "then", "when", "while", "there", "here", "this",
    "that", "these", "those", "what", "who", "where", "why", "how", "yes", "no", "not", "never",
    "perhaps", "maybe", "after", "before", "once", "still", "chapter", "prologue", "epilogue",
];

/// Verbs that open "action phrase" spans like "Said Alice".
const ACTION_VERBS: &[&str] = &[
    "said", "asked", "replied", "shouted", "whispered", "walked", "ran", "turned", "looked",
    "smiled", "laughed", "cried", "stood", "sat", "went", "came", "took", "felt", "thought",
    "knew", "saw", "heard", "run", "running", "walking", "holding",
];

/// Honorifics and kinship titles that introduce character names.
const TITLES: &[&str] = &[
    "mr", "mrs", "ms", "dr", "sir", "lady", "lord", "king", "queen", "prince", "princess",
    "captain", "professor", "master", "mistress", "father", "mother", "brother", "sister", "aunt",
    "uncle", "old",
];

/// Body parts the location validator must not mistake for places.
const BODY_PARTS: &[&str] = &[
    "head", "hand", "hands", "eyes", "eye", "face", "heart", "arm", "arms", "leg", "legs", "hair",
    "shoulder", "shoulders", "back", "feet", "foot", "mouth", "chest", "fingers", "skin", "throat",
];

/// Everyday nouns that show up capitalized but never name a place.
const COMMON_NOUNS: &[&str] = &[
    "room", "door", "window", "table", "chair", "floor", "wall", "morning", "evening", "night",
    "day", "moment", "time", "way", "thing", "voice", "air", "ground", "sky", "water", "silence",
];

/// Geographic and fantasy indicators that make a span look like a real place.
const PLACE_INDICATORS: &[&str] = &[
    "kingdom", "empire", "city", "town", "village", "isle", "island", "castle", "keep", "harbor",
    "harbour", "forest", "wood", "woods", "mountain", "mountains", "valley", "vale", "river",
    "bay", "sea", "coast", "road", "inn", "tavern", "temple", "palace", "bridge", "gate", "tower",
    "hall", "port", "fields", "moor", "marsh",
];

/// Pre-tokenized candidate span.
pub struct SpanWords {
    /// Lowercased tokens.
    words: Vec<String>,
    /// Per-token capitalization of the original span.
    capitalized: Vec<bool>,
}

impl SpanWords {
    pub fn new(span: &str) -> Self {
        let raw: Vec<&str> = span.split_whitespace().collect();
        Self {
            words: raw.iter().map(|w| trim_word(w).to_lowercase()).collect(),
            capitalized: raw
                .iter()
                .map(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
                .collect(),
        }
    }

    fn single(&self) -> Option<&str> {
        (self.words.len() == 1).then(|| self.words[0].as_str())
    }

    fn all_capitalized_or_connective(&self) -> bool {
        self.words
            .iter()
            .zip(&self.capitalized)
            .all(|(w, &cap)| cap || w == "of" || w == "the")
    }
}

fn trim_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Verdict of one rule; `None` defers to the next rule in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

type Rule = fn(&SpanWords) -> Option<Verdict>;

fn reject_empty(span: &SpanWords) -> Option<Verdict> {
    (span.words.is_empty() || span.words.iter().all(|w| w.is_empty()))
        .then_some(Verdict::Reject)
}

fn reject_contraction(span: &SpanWords) -> Option<Verdict> {
    let contracted = span.words.iter().any(|w| {
        w.ends_with("n't")
            || w.ends_with("'ll")
            || w.ends_with("'re")
            || w.ends_with("'ve")
            || w.ends_with("'d")
            || w.ends_with("'m")
    });
    contracted.then_some(Verdict::Reject)
}

fn reject_pronoun(span: &SpanWords) -> Option<Verdict> {
    span.single()
        .filter(|w| PRONOUNS.contains(w))
        .map(|_| Verdict::Reject)
}

fn reject_stop_word(span: &SpanWords) -> Option<Verdict> {
    span.single()
        .filter(|w| STOP_WORDS.contains(w))
        .map(|_| Verdict::Reject)
}

fn reject_verb_led(span: &SpanWords) -> Option<Verdict> {
    span.words
        .first()
        .filter(|w| ACTION_VERBS.contains(&w.as_str()))
        .map(|_| Verdict::Reject)
}

fn accept_titled(span: &SpanWords) -> Option<Verdict> {
    (span.words.len() >= 2 && TITLES.contains(&span.words[0].as_str()))
        .then_some(Verdict::Accept)
}

fn accept_proper_noun_run(span: &SpanWords) -> Option<Verdict> {
    (span.words.len() <= 4 && span.all_capitalized_or_connective()).then_some(Verdict::Accept)
}

fn reject_body_part(span: &SpanWords) -> Option<Verdict> {
    span.single()
        .filter(|w| BODY_PARTS.contains(w))
        .map(|_| Verdict::Reject)
}

fn reject_common_noun(span: &SpanWords) -> Option<Verdict> {
    span.single()
        .filter(|w| COMMON_NOUNS.contains(w))
        .map(|_| Verdict::Reject)
}

fn accept_place_indicator(span: &SpanWords) -> Option<Verdict> {
    span.words
        .iter()
        .any(|w| PLACE_INDICATORS.contains(&w.as_str()))
        .then_some(Verdict::Accept)
}

fn accept_capitalized_multiword(span: &SpanWords) -> Option<Verdict> {
    (span.words.len() >= 2 && span.all_capitalized_or_connective()).then_some(Verdict::Accept)
}

fn accept_capitalized_single(span: &SpanWords) -> Option<Verdict> {
    (span.words.len() == 1 && span.capitalized[0] && span.words[0].len() >= 3)
        .then_some(Verdict::Accept)
}

/// Character-name rules, highest priority first.
const CHARACTER_RULES: &[Rule] = &[
    reject_empty,
    reject_contraction,
    reject_pronoun,
    reject_stop_word,
    reject_verb_led,
    accept_titled,
    accept_proper_noun_run,
];

/// Location rules, highest priority first.
const LOCATION_RULES: &[Rule] = &[
    reject_empty,
    reject_contraction,
    reject_pronoun,
    reject_stop_word,
    reject_body_part,
    reject_common_noun,
    accept_place_indicator,
    accept_capitalized_multiword,
    accept_capitalized_single,
];

fn evaluate(rules: &[Rule], span: &SpanWords) -> bool {
    for rule in rules {
        match rule(span) {
            Some(Verdict::Accept) => return true,
            Some(Verdict::Reject) => return false,
            None => continue,
        }
    }
    false
}

/// Whether a raw span plausibly names a character.
pub fn validate_character_name(span: &str) -> bool {
    evaluate(CHARACTER_RULES, &SpanWords::new(span))
}

/// Whether a raw span plausibly names a location.
pub fn validate_location_name(span: &str) -> bool {
    evaluate(LOCATION_RULES, &SpanWords::new(span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_multiword_names() {
        assert!(validate_character_name("Alice"));
        assert!(validate_character_name("Alice Morgan"));
        assert!(validate_character_name("Jean-Luc"));
    }

    #[test]
    fn accepts_titled_names() {
        assert!(validate_character_name("Lady Catelyn"));
        assert!(validate_character_name("Dr Marlowe"));
        assert!(validate_character_name("Old Tom"));
    }

    #[test]
    fn rejects_pronouns_and_stop_words() {
        for span in ["He", "She", "They", "The", "When", "Perhaps", "Chapter"] {
            assert!(!validate_character_name(span), "{span} should be rejected");
        }
    }

    #[test]
    fn rejects_contractions_and_verb_led_phrases() {
        assert!(!validate_character_name("Don't"));
        assert!(!validate_character_name("I'll"));
        assert!(!validate_character_name("Said Alice"));
        assert!(!validate_character_name("Running Alice"));
    }

    #[test]
    fn location_rejects_body_parts_and_common_nouns() {
        for span in ["Head", "Eyes", "Heart", "Room", "Morning", "Voice"] {
            assert!(!validate_location_name(span), "{span} should be rejected");
        }
    }

    #[test]
    fn location_accepts_indicators_and_multiword_places() {
        assert!(validate_location_name("Ravenholm Kingdom"));
        assert!(validate_location_name("The Shattered Coast"));
        assert!(validate_location_name("Isle of Mists"));
        assert!(validate_location_name("Blackwater"));
    }

    #[test]
    fn empty_spans_are_rejected() {
        assert!(!validate_character_name(""));
        assert!(!validate_location_name("   "));
    }
}
