use anyhow::Result;
use seg_dl::{
    collate::BatchCollator,
    conversation::{ConversationTemplate, IGNORE_INDEX},
    dataset::Sample,
    tokenizer::{TextTokenizer, WhitespaceTokenizer, IMAGE_TOKEN_INDEX},
};
use std::{path::PathBuf, sync::Arc};
use tch::{kind::FLOAT_CPU, kind::INT64_CPU, Device, Kind, Tensor};

fn sample(conversations: Vec<String>, inference: bool) -> Sample {
    let num = conversations.len() as i64;
    Sample {
        image_path: PathBuf::from("image.jpg"),
        images: Tensor::zeros(&[3, 16, 16], FLOAT_CPU),
        images_clip: Tensor::zeros(&[3, 8, 8], FLOAT_CPU),
        conversations,
        masks: Tensor::ones(&[num, 6, 5], (Kind::Uint8, Device::Cpu)),
        label: Tensor::ones(&[6, 5], INT64_CPU) * 255i64,
        resize: [16, 13],
        questions: None,
        sampled_classes: None,
        inference,
        text_only: false,
    }
}

fn single_turn(template: &ConversationTemplate, question: &str, answer: &str) -> String {
    template
        .conversation()
        .user(format!("<image>\n{}", question))
        .assistant(answer)
        .prompt()
}

fn kept_labels(labels: &Tensor, row: i64) -> Vec<i64> {
    let row: Vec<i64> = labels.get(row).into();
    row.into_iter().filter(|&id| id != IGNORE_INDEX).collect()
}

#[test]
fn single_sample_batch_test() -> Result<()> {
    let tokenizer = Arc::new(WhitespaceTokenizer::new(5000, 512)?);
    let template = ConversationTemplate::llava_v1();
    let collator = BatchCollator::new(tokenizer.clone(), template.clone(), false);

    let conversation = single_turn(&template, "What is the dog in this image?", "It is [SEG].");
    let batch = collator.collate(vec![sample(vec![conversation], false)])?;

    assert_eq!(batch.images.size(), vec![1, 3, 16, 16]);
    assert_eq!(batch.images_clip.size(), vec![1, 3, 8, 8]);
    assert_eq!(batch.input_ids.size(), batch.labels.size());
    assert_eq!(batch.input_ids.size(), batch.attention_masks.size());
    assert_eq!(batch.offsets(), vec![0, 1]);
    assert_eq!(batch.masks_list[0].kind(), Kind::Float);
    assert_eq!(batch.resize_list, vec![[16, 13]]);
    assert!(!batch.inference);

    // no padding in a single-row batch
    let seq_len = batch.input_ids.size()[1];
    assert_eq!(
        i64::from(batch.attention_masks.sum(Kind::Int64)),
        seq_len
    );

    let input_ids: Vec<i64> = batch.input_ids.get(0).into();
    assert_eq!(input_ids[0], WhitespaceTokenizer::BOS);
    assert_eq!(
        input_ids.iter().filter(|&&id| id == IMAGE_TOKEN_INDEX).count(),
        1
    );

    let expected = tokenizer.encode("It is [SEG].</s>")?[1..].to_vec();
    assert_eq!(kept_labels(&batch.labels, 0), expected);
    Ok(())
}

#[test]
fn padding_and_offsets_test() -> Result<()> {
    let tokenizer = Arc::new(WhitespaceTokenizer::new(5000, 512)?);
    let template = ConversationTemplate::llava_v1();
    let collator = BatchCollator::new(tokenizer.clone(), template.clone(), true);

    let short = single_turn(&template, "What is the cat?", "Sure, [SEG].");
    let long = single_turn(
        &template,
        "Please segment the small brown dog sitting next to the red door.",
        "Sure, the segmentation result is [SEG].",
    );
    let samples = vec![
        sample(vec![short.clone(), long.clone()], false),
        sample(vec![short.clone()], false),
    ];
    let batch = collator.collate(samples)?;

    assert_eq!(batch.offsets(), vec![0, 2, 3]);
    assert_eq!(batch.input_ids.size()[0], 3);
    assert_eq!(batch.masks_list.len(), 2);
    assert_eq!(batch.masks_list[0].size(), vec![2, 6, 5]);

    let groups = batch.conversation_groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[1].len(), 1);
    assert!(groups[0][0].contains("<im_start><image><im_end>"));

    // padded positions are excluded from attention and loss
    let pad = tokenizer.pad_token_id();
    for row in 0..3 {
        let ids: Vec<i64> = batch.input_ids.get(row).into();
        let labels: Vec<i64> = batch.labels.get(row).into();
        let attention: Vec<bool> = batch.attention_masks.get(row).into();
        for ((id, label), attend) in ids.iter().zip(&labels).zip(&attention) {
            assert_eq!(*attend, *id != pad);
            if *id == pad {
                assert_eq!(*label, IGNORE_INDEX);
            }
        }
    }

    let expected = tokenizer.encode("Sure, the segmentation result is [SEG].</s>")?[1..].to_vec();
    assert_eq!(kept_labels(&batch.labels, 1), expected);
    Ok(())
}

#[test]
fn multi_round_labels_test() -> Result<()> {
    let tokenizer = Arc::new(WhitespaceTokenizer::new(5000, 512)?);
    let template = ConversationTemplate::llava_v1();
    let collator = BatchCollator::new(tokenizer.clone(), template.clone(), false);

    let conversation = template
        .conversation()
        .user("<image>\nWhat is shown?")
        .assistant("A kitchen.")
        .user("Where is the sink?")
        .assistant("Near the window.")
        .prompt();
    let batch = collator.collate(vec![sample(vec![conversation], false)])?;

    let expected = tokenizer.encode("A kitchen.</s>Near the window.</s>")?[1..].to_vec();
    assert_eq!(kept_labels(&batch.labels, 0), expected);
    Ok(())
}

#[test]
fn truncation_depends_on_inference_test() -> Result<()> {
    let tokenizer = Arc::new(WhitespaceTokenizer::new(5000, 8)?);
    let template = ConversationTemplate::llava_v1();
    let collator = BatchCollator::new(tokenizer, template.clone(), false);
    let conversation = single_turn(&template, "Can you segment the tree in this image?", "[SEG].");

    let batch = collator.collate(vec![sample(vec![conversation.clone()], false)])?;
    assert_eq!(batch.input_ids.size(), vec![1, 8]);
    assert_eq!(batch.labels.size(), vec![1, 8]);
    assert_eq!(batch.attention_masks.size(), vec![1, 8]);

    let batch = collator.collate(vec![sample(vec![conversation], true)])?;
    assert!(batch.inference);
    assert!(batch.input_ids.size()[1] > 8);
    assert_eq!(batch.input_ids.size(), batch.labels.size());
    Ok(())
}

#[test]
fn collate_is_deterministic_test() -> Result<()> {
    let tokenizer = Arc::new(WhitespaceTokenizer::new(5000, 512)?);
    let template = ConversationTemplate::llava_v1();
    let collator = BatchCollator::new(tokenizer, template.clone(), false);
    let conversation = single_turn(&template, "What is the lamp?", "It is [SEG].");

    let lhs = collator.collate(vec![sample(vec![conversation.clone()], false)])?;
    let rhs = collator.collate(vec![sample(vec![conversation], false)])?;
    assert!(lhs.input_ids.equal(&rhs.input_ids));
    assert!(lhs.labels.equal(&rhs.labels));
    Ok(())
}

#[test]
fn malformed_conversation_test() -> Result<()> {
    let tokenizer = Arc::new(WhitespaceTokenizer::new(5000, 512)?);
    let collator = BatchCollator::new(tokenizer, ConversationTemplate::llava_v1(), false);

    let result = collator.collate(vec![sample(vec!["<image>\nno roles</s>".into()], false)]);
    assert!(result.is_err());

    assert!(collator.collate(vec![]).is_err());

    // mask count must follow the conversation count
    let mut bad = sample(vec!["USER: a ASSISTANT: b</s>".into()], false);
    bad.masks = Tensor::ones(&[2, 6, 5], (Kind::Uint8, Device::Cpu));
    assert!(collator.collate(vec![bad]).is_err());
    Ok(())
}
