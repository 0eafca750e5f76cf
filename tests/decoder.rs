use std::fs;
use std::path::PathBuf;

use ndarray::Array2;

use cuedspeech_rs::{CtcDecoder, DecoderConfig};

/// Write the decoder resource files into a scratch directory and return a
/// config pointing at them.
fn write_fixtures(tag: &str) -> DecoderConfig {
    let dir: PathBuf = std::env::temp_dir().join(format!(
        "cuedspeech_decoder_{}_{}",
        std::process::id(),
        tag
    ));
    fs::create_dir_all(&dir).expect("scratch dir");

    let tokens_path = dir.join("tokens.txt");
    fs::write(&tokens_path, "<BLANK>\n_\nb\no~\nz^\nu\nr\nv\na\n").expect("tokens");

    let lexicon_path = dir.join("lexicon.txt");
    fs::write(
        &lexicon_path,
        "bonjour b o~ z^ u r\nvous v u\nbon b o~\nbonjour b o~ QQ u r\n",
    )
    .expect("lexicon");

    let lm_path = dir.join("words.arpa");
    fs::write(
        &lm_path,
        "\\data\\\n\
         ngram 1=5\n\
         ngram 2=2\n\
         \n\
         \\1-grams:\n\
         -99.0\t<s>\t-0.5\n\
         -2.0\t</s>\n\
         -1.0\tbonjour\t-0.3\n\
         -1.5\tvous\t-0.3\n\
         -2.5\tbon\n\
         \n\
         \\2-grams:\n\
         -0.1\t<s> bonjour\n\
         -0.3\tbonjour vous\n\
         \n\
         \\end\\\n",
    )
    .expect("arpa");

    DecoderConfig {
        tokens_path,
        lexicon_path,
        lm_path: Some(lm_path),
        ..DecoderConfig::default()
    }
}

fn logits_for_path(path: &[usize], vocab: usize) -> Array2<f32> {
    let mut logits = Array2::from_elem((path.len(), vocab), -5.0f32);
    for (t, &token) in path.iter().enumerate() {
        logits[[t, token]] = 5.0;
    }
    logits
}

#[test]
fn test_initialize_from_files_and_decode() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut decoder = CtcDecoder::new(write_fixtures("init"));
    decoder.initialize().expect("decoder should initialize");

    // Token file carried no <UNK>/<SOS>/<EOS>/<PAD>: they are injected in
    // front, after <BLANK>.
    assert_eq!(decoder.token_to_idx("<BLANK>"), Some(0));
    assert_eq!(decoder.token_to_idx("<UNK>"), Some(1));
    assert_eq!(decoder.token_to_idx("_"), Some(5));
    assert_eq!(decoder.idx_to_token(0), Some("<BLANK>"));
    assert_eq!(decoder.vocab_size(), 9 + 4);

    let b = decoder.token_to_idx("b").unwrap();
    let o = decoder.token_to_idx("o~").unwrap();
    let z = decoder.token_to_idx("z^").unwrap();
    let u = decoder.token_to_idx("u").unwrap();
    let r = decoder.token_to_idx("r").unwrap();

    // b o~ z^ u r with a CTC doubling and trailing blanks.
    let path = [0, b, o, o, z, u, r, 0, 0];
    let hypotheses = decoder.decode(logits_for_path(&path, decoder.vocab_size()).view());
    assert!(!hypotheses.is_empty());

    let best = &hypotheses[0];
    assert_eq!(best.words, vec!["bonjour".to_string()]);
    assert_eq!(
        decoder.idxs_to_tokens(&best.tokens),
        vec!["b", "o~", "z^", "u", "r"]
    );
    assert_eq!(best.tokens.len(), best.timesteps.len());
}

#[test]
fn test_rejected_spelling_keeps_word_indexed() {
    // The lexicon fixture carries a second "bonjour" spelling with an
    // unknown token; the word must survive on its first spelling alone.
    let mut decoder = CtcDecoder::new(write_fixtures("spelling"));
    decoder.initialize().expect("decoder should initialize");

    let b = decoder.token_to_idx("b").unwrap();
    let o = decoder.token_to_idx("o~").unwrap();
    let z = decoder.token_to_idx("z^").unwrap();
    let u = decoder.token_to_idx("u").unwrap();
    let r = decoder.token_to_idx("r").unwrap();

    let path = [0, b, o, z, u, r, 0];
    let hypotheses = decoder.decode(logits_for_path(&path, decoder.vocab_size()).view());
    assert_eq!(hypotheses[0].words, vec!["bonjour".to_string()]);
}

#[test]
fn test_decode_rerun_is_identical() {
    let mut decoder = CtcDecoder::new(write_fixtures("rerun"));
    decoder.initialize().expect("decoder should initialize");

    let b = decoder.token_to_idx("b").unwrap();
    let o = decoder.token_to_idx("o~").unwrap();
    let v = decoder.token_to_idx("v").unwrap();
    let u = decoder.token_to_idx("u").unwrap();
    let sil = decoder.token_to_idx("_").unwrap();

    let path = [0, b, o, 0, sil, v, u, 0, 0];
    let logits = logits_for_path(&path, decoder.vocab_size());

    let first = decoder.decode(logits.view());
    let second = decoder.decode(logits.view());
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.tokens, b.tokens);
        assert_eq!(a.words, b.words);
        assert_eq!(a.timesteps, b.timesteps);
        assert_eq!(a.score, b.score);
    }
}

#[test]
fn test_missing_resource_files_fail_initialization() {
    let config = DecoderConfig {
        tokens_path: PathBuf::from("does/not/exist/tokens.txt"),
        lexicon_path: PathBuf::from("does/not/exist/lexicon.txt"),
        ..DecoderConfig::default()
    };
    let mut decoder = CtcDecoder::new(config);
    assert!(decoder.initialize().is_err());
    assert!(!decoder.is_initialized());
}
