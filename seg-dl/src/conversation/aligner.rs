use super::{ConversationTemplate, DEFAULT_IMAGE_TOKEN};
use crate::{
    common::*,
    tokenizer::{tokenize_with_image, TextTokenizer},
};

/// Label value excluded from the language modeling loss.
pub const IGNORE_INDEX: i64 = -100;

/// Masks the non-response tokens of tokenized conversations.
///
/// Labels start as a copy of the input ids. The BOS token, every
/// instruction span and everything after the last round become
/// [IGNORE_INDEX], so only assistant responses are supervised.
pub struct LabelAligner<'a, T>
where
    T: TextTokenizer + ?Sized,
{
    tokenizer: &'a T,
    round_separator: String,
    response_separator: String,
}

impl<'a, T> Debug for LabelAligner<'a, T>
where
    T: TextTokenizer + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelAligner")
            .field("round_separator", &self.round_separator)
            .field("response_separator", &self.response_separator)
            .finish()
    }
}

impl<'a, T> LabelAligner<'a, T>
where
    T: TextTokenizer + ?Sized,
{
    pub fn new(tokenizer: &'a T, template: &ConversationTemplate) -> Self {
        Self {
            tokenizer,
            round_separator: template.round_separator().to_owned(),
            response_separator: template.response_separator(),
        }
    }

    /// Produce labels for one padded row of input ids.
    ///
    /// The row must come from tokenizing `conversation`. Rounds are
    /// re-tokenized independently to find instruction boundaries. When the
    /// row is shorter than the model limit, the walked length must equal the
    /// number of non-padding tokens, otherwise tokenization drifted and an
    /// error is returned.
    pub fn align(&self, conversation: &str, input_ids: &[i64]) -> Result<Vec<i64>> {
        let tokenizer = self.tokenizer;
        let pad_token_id = tokenizer.pad_token_id();
        let total_len = input_ids.iter().filter(|&&id| id != pad_token_id).count();
        let has_image = conversation.contains(DEFAULT_IMAGE_TOKEN);
        let token_count = |text: &str| -> Result<usize> {
            let ids = if has_image {
                tokenize_with_image(tokenizer, text)?
            } else {
                tokenizer.encode(text)?
            };
            Ok(ids.len())
        };

        let mut labels = input_ids.to_vec();
        let len = labels.len();
        let mut mask_range = |begin: usize, end: usize| {
            let begin = begin.min(len);
            let end = end.min(len);
            labels[begin..end].fill(IGNORE_INDEX);
        };

        // skip BOS
        let mut cur_len = 1;
        mask_range(0, cur_len);

        for round in conversation.split(&self.round_separator) {
            if round.is_empty() {
                break;
            }

            let parts: Vec<&str> = round.split(&self.response_separator).collect();
            ensure!(
                parts.len() == 2,
                "expect exactly one '{}' in a conversation round, but found {} parts in {:?}",
                self.response_separator,
                parts.len(),
                round
            );
            let instruction = format!("{}{}", parts[0], self.response_separator);

            let round_len = token_count(round)?;
            let instruction_len = token_count(&instruction)?.saturating_sub(2);

            mask_range(cur_len, cur_len + instruction_len);
            cur_len += round_len;
        }

        mask_range(cur_len, len);

        if cur_len < tokenizer.model_max_length() {
            ensure!(
                cur_len == total_len,
                "tokenization mismatch: walked {} tokens but the row has {} non-padding tokens",
                cur_len,
                total_len
            );
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WhitespaceTokenizer;

    fn conversation(template: &ConversationTemplate) -> String {
        template
            .conversation()
            .user("<image>\nWhat is the cat in this image?")
            .assistant("It is [SEG].")
            .prompt()
    }

    #[test]
    fn response_tokens_survive_test() -> Result<()> {
        let tokenizer = WhitespaceTokenizer::new(5000, 512)?;
        let template = ConversationTemplate::llava_v1();
        let text = conversation(&template);
        let input_ids = tokenize_with_image(&tokenizer, &text)?;

        let labels = LabelAligner::new(&tokenizer, &template).align(&text, &input_ids)?;
        let kept: Vec<i64> = labels
            .iter()
            .copied()
            .filter(|&id| id != IGNORE_INDEX)
            .collect();

        // "It", "is", "[SEG]." and "</s>"
        let expected = tokenizer.encode("It is [SEG].</s>")?[1..].to_vec();
        assert_eq!(kept, expected);
        assert_eq!(labels[0], IGNORE_INDEX);
        Ok(())
    }

    #[test]
    fn missing_response_separator_test() -> Result<()> {
        let tokenizer = WhitespaceTokenizer::new(5000, 512)?;
        let template = ConversationTemplate::llava_v1();
        let text = "no roles at all</s>";
        let input_ids = tokenizer.encode(text)?;

        let result = LabelAligner::new(&tokenizer, &template).align(text, &input_ids);
        assert!(result.is_err());
        Ok(())
    }
}
