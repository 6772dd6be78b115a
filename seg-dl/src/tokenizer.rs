//! Text tokenizers and image-aware prompt tokenization.

use crate::{common::*, conversation::DEFAULT_IMAGE_TOKEN};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// The token id standing in for the image features.
pub const IMAGE_TOKEN_INDEX: i64 = -200;

/// The tokenizer interface consumed by the collator and the label aligner.
pub trait TextTokenizer
where
    Self: Send + Sync,
{
    /// Encode text into token ids, with the BOS token in front when the
    /// tokenizer adds one.
    fn encode(&self, text: &str) -> Result<Vec<i64>>;

    fn bos_token_id(&self) -> Option<i64>;

    fn pad_token_id(&self) -> i64;

    /// The maximum sequence length accepted by the model.
    fn model_max_length(&self) -> usize;
}

/// Tokenize a prompt in which every `<image>` placeholder becomes
/// [IMAGE_TOKEN_INDEX].
///
/// Each text chunk is encoded separately. The BOS token is kept once at the
/// front and stripped from the remaining chunks.
pub fn tokenize_with_image<T>(tokenizer: &T, prompt: &str) -> Result<Vec<i64>>
where
    T: TextTokenizer + ?Sized,
{
    let chunks: Vec<Vec<i64>> = prompt
        .split(DEFAULT_IMAGE_TOKEN)
        .map(|chunk| tokenizer.encode(chunk))
        .try_collect()?;

    let bos = tokenizer.bos_token_id();
    let leading_bos = match (chunks.first().and_then(|ids| ids.first()), bos) {
        (Some(&first), Some(bos)) => first == bos,
        _ => false,
    };
    let offset = leading_bos as usize;

    let mut input_ids = vec![];
    if leading_bos {
        input_ids.push(chunks[0][0]);
    }

    for (index, chunk) in chunks.iter().enumerate() {
        if index > 0 {
            input_ids.push(IMAGE_TOKEN_INDEX);
        }
        input_ids.extend(chunk.iter().skip(offset));
    }

    Ok(input_ids)
}

/// Tokenizer backed by a HuggingFace `tokenizer.json` file.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct HfTokenizer {
    #[derivative(Debug = "ignore")]
    inner: tokenizers::Tokenizer,
    bos_token_id: Option<i64>,
    pad_token_id: i64,
    model_max_length: usize,
}

impl HfTokenizer {
    /// Load the tokenizer file and resolve the BOS and padding tokens.
    ///
    /// The padding token falls back to `<unk>` and then to id 0 when the
    /// requested token is missing from the vocabulary.
    pub fn open(
        path: impl AsRef<Path>,
        bos_token: &str,
        pad_token: &str,
        model_max_length: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        ensure!(model_max_length > 0, "model_max_length must be positive");

        let inner = tokenizers::Tokenizer::from_file(path).map_err(|err| {
            format_err!("unable to load tokenizer '{}': {}", path.display(), err)
        })?;

        let bos_token_id = inner.token_to_id(bos_token).map(|id| id as i64);
        let pad_token_id = inner
            .token_to_id(pad_token)
            .or_else(|| {
                warn!(
                    "pad token '{}' is not in the vocabulary, falling back to <unk>",
                    pad_token
                );
                inner.token_to_id("<unk>")
            })
            .unwrap_or(0) as i64;

        Ok(Self {
            inner,
            bos_token_id,
            pad_token_id,
            model_max_length,
        })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i64>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|err| format_err!("tokenization failed: {}", err))?;
        Ok(encoding.get_ids().iter().map(|&id| id as i64).collect())
    }

    fn bos_token_id(&self) -> Option<i64> {
        self.bos_token_id
    }

    fn pad_token_id(&self) -> i64 {
        self.pad_token_id
    }

    fn model_max_length(&self) -> usize {
        self.model_max_length
    }
}

/// A vocabulary-free tokenizer that hashes whitespace separated words.
///
/// It behaves like a sentencepiece model on the parts that matter for label
/// alignment: BOS goes in front, `</s>` is a single token and a chunk ending
/// in whitespace yields a trailing space token. Useful for dry runs without
/// a tokenizer file.
#[derive(Debug, Clone)]
pub struct WhitespaceTokenizer {
    vocab_size: u64,
    model_max_length: usize,
}

impl WhitespaceTokenizer {
    pub const PAD: i64 = 0;
    pub const BOS: i64 = 1;
    pub const EOS: i64 = 2;
    pub const SPACE: i64 = 3;
    const EOS_TEXT: &'static str = "</s>";
    const RESERVED: u64 = 4;

    pub fn new(vocab_size: usize, model_max_length: usize) -> Result<Self> {
        ensure!(
            vocab_size as u64 > Self::RESERVED,
            "vocab_size must be greater than {}",
            Self::RESERVED
        );
        ensure!(model_max_length > 0, "model_max_length must be positive");
        Ok(Self {
            vocab_size: vocab_size as u64,
            model_max_length,
        })
    }

    fn word_id(&self, word: &str) -> i64 {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        (Self::RESERVED + hasher.finish() % (self.vocab_size - Self::RESERVED)) as i64
    }
}

impl TextTokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i64>> {
        let mut ids = vec![Self::BOS];

        for (index, segment) in text.split(Self::EOS_TEXT).enumerate() {
            if index > 0 {
                ids.push(Self::EOS);
            }
            ids.extend(segment.split_whitespace().map(|word| self.word_id(word)));
            if segment.ends_with(char::is_whitespace) {
                ids.push(Self::SPACE);
            }
        }

        Ok(ids)
    }

    fn bos_token_id(&self) -> Option<i64> {
        Some(Self::BOS)
    }

    fn pad_token_id(&self) -> i64 {
        Self::PAD
    }

    fn model_max_length(&self) -> usize {
        self.model_max_length
    }
}
