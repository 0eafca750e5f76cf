//! Decoder configuration.

use std::path::PathBuf;

/// Configuration for [`CtcDecoder`](crate::decoder::CtcDecoder).
///
/// Paths point at the token, lexicon, and language-model resources loaded by
/// `initialize`; the remaining knobs tune the beam search.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Lexicon file: `word  token token …` per line.
    pub lexicon_path: PathBuf,
    /// Token alphabet file, one token per line.
    pub tokens_path: PathBuf,
    /// N-gram language model in ARPA format. Optional; without it the
    /// search runs on acoustic scores alone.
    pub lm_path: Option<PathBuf>,
    /// Optional word list restricting the LM vocabulary. Accepted for
    /// compatibility with existing configurations; the ARPA backend derives
    /// its vocabulary from the model file itself.
    pub lm_dict_path: Option<PathBuf>,

    /// Number of hypotheses returned per decode.
    pub nbest: usize,
    /// Maximum active beams per time step.
    pub beam_size: usize,
    /// Maximum token candidates expanded per beam per step; `-1` means the
    /// full vocabulary.
    pub beam_size_token: i32,
    /// Beams scoring more than this below the best are pruned.
    pub beam_threshold: f32,
    /// Multiplier on language-model log-probabilities.
    pub lm_weight: f32,
    /// Bonus applied on word completion.
    pub word_score: f32,
    /// Score for completing an out-of-lexicon word; `-inf` disables it.
    pub unk_score: f32,
    /// Score for emitting the silence token.
    pub sil_score: f32,
    /// Combine equivalent beams with log-sum-exp instead of max.
    pub log_add: bool,

    pub blank_token: String,
    pub sil_token: String,
    pub unk_word: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            lexicon_path: PathBuf::new(),
            tokens_path: PathBuf::new(),
            lm_path: None,
            lm_dict_path: None,
            nbest: 1,
            beam_size: 40,
            beam_size_token: -1,
            beam_threshold: 50.0,
            lm_weight: 3.23,
            word_score: 0.0,
            unk_score: f32::NEG_INFINITY,
            sil_score: 0.0,
            log_add: false,
            blank_token: "<BLANK>".to_string(),
            sil_token: "_".to_string(),
            unk_word: "<UNK>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = DecoderConfig::default();
        assert_eq!(config.nbest, 1);
        assert_eq!(config.beam_size, 40);
        assert_eq!(config.beam_size_token, -1);
        assert_eq!(config.beam_threshold, 50.0);
        assert!((config.lm_weight - 3.23).abs() < 1e-6);
        assert_eq!(config.word_score, 0.0);
        assert!(config.unk_score.is_infinite() && config.unk_score < 0.0);
        assert_eq!(config.sil_score, 0.0);
        assert!(!config.log_add);
        assert_eq!(config.blank_token, "<BLANK>");
        assert_eq!(config.sil_token, "_");
        assert_eq!(config.unk_word, "<UNK>");
    }
}
