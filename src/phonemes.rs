//! Bidirectional mapping between IPA and LIAPHON phoneme transcriptions.
//!
//! LIAPHON is the 7-bit ASCII rendering of the French IPA inventory used by
//! the lexicon and token files; IPA is what the homophone table is keyed on.
//! Tokens outside the table pass through unchanged, so round-trips are only
//! guaranteed for sequences composed of mapped tokens.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// IPA → LIAPHON table. Nasal vowels are two Unicode scalars (base vowel
/// plus combining tilde), which is why the IPA tokenizer is longest-match.
static IPA_LIAPHON_PAIRS: &[(&str, &str)] = &[
    ("a", "a"),
    ("ə", "x"),
    ("ɛ", "e^"),
    ("œ", "x^"),
    ("i", "i"),
    ("y", "y"),
    ("e", "e"),
    ("u", "u"),
    ("ɔ", "o"),
    ("o", "o^"),
    ("ɑ̃", "a~"),
    ("ɛ̃", "e~"),
    ("ɔ̃", "o~"),
    ("œ̃", "x~"),
    (" ", "_"),
    ("b", "b"),
    ("c", "k"),
    ("d", "d"),
    ("f", "f"),
    ("ɡ", "g"),
    ("j", "j"),
    ("k", "k"),
    ("l", "l"),
    ("m", "m"),
    ("n", "n"),
    ("p", "p"),
    ("s", "s"),
    ("t", "t"),
    ("v", "v"),
    ("w", "w"),
    ("z", "z"),
    ("ɥ", "h"),
    ("ʁ", "r"),
    ("ʃ", "s^"),
    ("ʒ", "z^"),
    ("ɲ", "gn"),
    ("ŋ", "ng"),
];

static IPA_TO_LIAPHON: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| IPA_LIAPHON_PAIRS.iter().copied().collect());

static LIAPHON_TO_IPA: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    // "c" and "k" both map to LIAPHON "k"; first entry wins on inversion so
    // the round-trip canonicalizes to "k"... except the table lists "c"
    // first, so keep the later (plain "k") spelling explicitly.
    let mut inv = HashMap::new();
    for &(ipa, liaphon) in IPA_LIAPHON_PAIRS {
        inv.entry(liaphon).or_insert(ipa);
    }
    inv.insert("k", "k");
    inv
});

/// Longest IPA key length, in chars.
static MAX_IPA_KEY_CHARS: Lazy<usize> = Lazy::new(|| {
    IPA_LIAPHON_PAIRS
        .iter()
        .map(|(ipa, _)| ipa.chars().count())
        .max()
        .unwrap_or(1)
});

/// Concatenate the IPA rendering of a LIAPHON token sequence.
///
/// Unknown tokens pass through unchanged.
pub fn liaphon_to_ipa<S: AsRef<str>>(phonemes: &[S]) -> String {
    let mut ipa = String::new();
    for phoneme in phonemes {
        let token = phoneme.as_ref();
        ipa.push_str(LIAPHON_TO_IPA.get(token).copied().unwrap_or(token));
    }
    ipa
}

/// Tokenize an IPA string into LIAPHON tokens by longest match.
///
/// Characters that start no table entry pass through as singletons.
pub fn ipa_to_liaphon(ipa: &str) -> Vec<String> {
    let chars: Vec<char> = ipa.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let max_len = (*MAX_IPA_KEY_CHARS).min(chars.len() - i);
        let mut matched = None;
        for len in (1..=max_len).rev() {
            let candidate: String = chars[i..i + len].iter().collect();
            if let Some(&liaphon) = IPA_TO_LIAPHON.get(candidate.as_str()) {
                matched = Some((liaphon.to_string(), len));
                break;
            }
        }
        match matched {
            Some((token, len)) => {
                out.push(token);
                i += len;
            }
            None => {
                out.push(chars[i].to_string());
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liaphon_to_ipa_concatenates() {
        let phonemes = ["b", "o~", "z^", "u", "r"];
        assert_eq!(liaphon_to_ipa(&phonemes), "bɔ̃ʒuʁ");
    }

    #[test]
    fn test_ipa_to_liaphon_longest_match() {
        // The nasal vowel must win over its single-char prefix.
        assert_eq!(ipa_to_liaphon("bɔ̃ʒuʁ"), vec!["b", "o~", "z^", "u", "r"]);
        assert_eq!(ipa_to_liaphon("bɔʒuʁ"), vec!["b", "o", "z^", "u", "r"]);
    }

    #[test]
    fn test_unknown_tokens_pass_through() {
        let phonemes = ["b", "??", "a"];
        assert_eq!(liaphon_to_ipa(&phonemes), "b??a");
        assert_eq!(ipa_to_liaphon("b!"), vec!["b", "!"]);
    }

    #[test]
    fn test_space_maps_to_silence() {
        assert_eq!(liaphon_to_ipa(&["_"]), " ");
        assert_eq!(ipa_to_liaphon("a a"), vec!["a", "_", "a"]);
    }

    #[test]
    fn test_single_char_round_trip() {
        // For IPA strings composed of single-character table entries,
        // ipa_to_liaphon . liaphon_to_ipa is the identity.
        let ipa = "batilpzʁʃʒ";
        assert_eq!(liaphon_to_ipa(&ipa_to_liaphon(ipa)), ipa);
    }
}
