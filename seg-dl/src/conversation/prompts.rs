//! Question and answer phrasings used to build conversations.

use super::DEFAULT_IMAGE_TOKEN;
use crate::common::*;

/// Questions about a short class name or referring phrase.
pub const SHORT_QUESTION_LIST: &[&str] = &[
    "Can you segment the {class_name} in this image?",
    "Please segment the {class_name} in this image.",
    "What is {class_name} in this image? Please respond with segmentation mask.",
    "What is {class_name} in this image? Please output segmentation mask.",
];

/// Questions built around a full descriptive sentence.
pub const LONG_QUESTION_LIST: &[&str] = &[
    "{sent} Please respond with segmentation mask.",
    "{sent} Please output segmentation mask.",
];

pub const ANSWER_LIST: &[&str] = &[
    "It is [SEG].",
    "Sure, [SEG].",
    "Sure, it is [SEG].",
    "Sure, the segmentation result is [SEG].",
    "[SEG].",
];

/// The question asked when all tumor classes are merged into one region.
pub const WHOLE_TUMOR_QUESTION: &str = "The whole tumor includes all visible tumor regions, including the actively growing enhanced tumor, the surrounding non-enhancing tumor tissue, and any peritumoral edema. Is there any region that indicates the presence of a tumor?. Provide the segmentation mask.";

/// Per-class tumor questions, indexed by zero-based class.
pub const TUMOR_CLASS_QUESTIONS: &[&str] = &[
    "The enhanced tumor forms the central, actively growing portion of the tumor. Is there any enhanced tumor region? Provide the segmentation mask.",
    "Non-enhanced tumor including necrotic and cystic areas, often surrounds the enhanced tumor, forming the inner boundary of the tumor mass. Is there any Non-enhanced tumor region? Provide the segmentation mask.",
    "Edema forms the outermost region, extending into surrounding brain tissues as a more diffuse, swollen area with fluid accumulation. Is there any edema region? Provide the segmentation mask.",
];

/// Short names of the tumor classes, indexed by zero-based class.
pub const TUMOR_CLASS_NAMES: &[&str] = &["enhanced tumor", "non-enhanced tumor", "edema"];

/// Prefix a question with the image placeholder line.
pub fn with_image(question: &str) -> String {
    format!("{}\n{}", DEFAULT_IMAGE_TOKEN, question)
}

/// Pick a short question about `class_name`.
pub fn short_question<R>(rng: &mut R, class_name: &str) -> String
where
    R: Rng + ?Sized,
{
    let template = SHORT_QUESTION_LIST
        .choose(rng)
        .copied()
        .unwrap_or(SHORT_QUESTION_LIST[0]);
    with_image(&template.replace("{class_name}", class_name))
}

/// Pick a long question wrapping `sentence`.
pub fn long_question<R>(rng: &mut R, sentence: &str) -> String
where
    R: Rng + ?Sized,
{
    let template = LONG_QUESTION_LIST
        .choose(rng)
        .copied()
        .unwrap_or(LONG_QUESTION_LIST[0]);
    with_image(&template.replace("{sent}", sentence))
}

pub fn random_answer<R>(rng: &mut R) -> &'static str
where
    R: Rng + ?Sized,
{
    ANSWER_LIST.choose(rng).copied().unwrap_or(ANSWER_LIST[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_formatting_test() {
        let mut rng = StdRng::seed_from_u64(3);
        let question = short_question(&mut rng, "dog");
        assert!(question.starts_with("<image>\n"));
        assert!(question.contains("dog"));
        assert!(!question.contains("{class_name}"));

        let question = long_question(&mut rng, "Where would I sit?");
        assert!(question.starts_with("<image>\nWhere would I sit? Please"));

        assert!(random_answer(&mut rng).contains("[SEG]"));
        assert_eq!(TUMOR_CLASS_QUESTIONS.len(), TUMOR_CLASS_NAMES.len());
    }
}
