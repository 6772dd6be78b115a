use crate::common::*;

pub const DEFAULT_IMAGE_TOKEN: &str = "<image>";
pub const DEFAULT_IM_START_TOKEN: &str = "<im_start>";
pub const DEFAULT_IM_END_TOKEN: &str = "<im_end>";

const LLAVA_SYSTEM: &str = "A chat between a curious human and an artificial intelligence assistant. The assistant gives helpful, detailed, and polite answers to the human's questions.";
const LLAVA_LLAMA2_SYSTEM: &str = "You are a helpful language and vision assistant. You are able to understand the visual content that the user provides, and assist the user with a variety of tasks using natural language.";
const MEDICAL_SYSTEM: &str = "A chat between a radiologist and an artificial intelligence assistant specialized in medical imaging. The assistant reads the scan, answers the radiologist's questions and outlines the requested regions.";

/// How messages are joined into a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeparatorStyle {
    /// `ROLE: message` pairs, user turns end with `sep` and assistant turns
    /// with `sep2`.
    Two,
    /// `[INST] ... [/INST]` wrapping.
    Llama2,
}

/// The named templates known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    #[serde(rename = "llava_v1")]
    LlavaV1,
    #[serde(rename = "llava_llama_2")]
    LlavaLlama2,
    #[serde(rename = "medical")]
    Medical,
}

impl TemplateKind {
    pub fn template(&self) -> ConversationTemplate {
        match self {
            Self::LlavaV1 => ConversationTemplate::llava_v1(),
            Self::LlavaLlama2 => ConversationTemplate::llava_llama2(),
            Self::Medical => ConversationTemplate::medical(),
        }
    }
}

impl Default for TemplateKind {
    fn default() -> Self {
        Self::LlavaV1
    }
}

/// The conversation role, indexing into [ConversationTemplate::roles].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn index(&self) -> usize {
        match self {
            Self::User => 0,
            Self::Assistant => 1,
        }
    }
}

/// The system prompt, role names and separators of a conversation format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationTemplate {
    pub system: String,
    pub roles: [String; 2],
    pub style: SeparatorStyle,
    pub sep: String,
    pub sep2: String,
}

impl ConversationTemplate {
    pub fn llava_v1() -> Self {
        Self {
            system: LLAVA_SYSTEM.into(),
            roles: ["USER".into(), "ASSISTANT".into()],
            style: SeparatorStyle::Two,
            sep: " ".into(),
            sep2: "</s>".into(),
        }
    }

    pub fn llava_llama2() -> Self {
        Self {
            system: LLAVA_LLAMA2_SYSTEM.into(),
            roles: ["USER".into(), "ASSISTANT".into()],
            style: SeparatorStyle::Llama2,
            sep: "<s>".into(),
            sep2: "</s>".into(),
        }
    }

    pub fn medical() -> Self {
        Self {
            system: MEDICAL_SYSTEM.into(),
            ..Self::llava_v1()
        }
    }

    pub fn role_name(&self, role: Role) -> &str {
        &self.roles[role.index()]
    }

    /// The separator that closes each question-answer round.
    pub fn round_separator(&self) -> &str {
        &self.sep2
    }

    /// The text between an instruction and the assistant response.
    pub fn response_separator(&self) -> String {
        match self.style {
            SeparatorStyle::Two => format!("{}{}: ", self.sep, self.roles[1]),
            SeparatorStyle::Llama2 => "[/INST] ".into(),
        }
    }

    /// Start an empty conversation in this format.
    pub fn conversation(&self) -> Conversation<'_> {
        Conversation {
            template: self,
            messages: vec![],
        }
    }
}

/// A list of messages rendered through a [ConversationTemplate].
#[derive(Debug, Clone)]
pub struct Conversation<'a> {
    template: &'a ConversationTemplate,
    messages: Vec<(Role, String)>,
}

impl<'a> Conversation<'a> {
    pub fn push(&mut self, role: Role, message: impl Into<String>) -> &mut Self {
        self.messages.push((role, message.into()));
        self
    }

    pub fn user(mut self, message: impl Into<String>) -> Self {
        self.push(Role::User, message);
        self
    }

    pub fn assistant(mut self, message: impl Into<String>) -> Self {
        self.push(Role::Assistant, message);
        self
    }

    pub fn messages(&self) -> &[(Role, String)] {
        &self.messages
    }

    /// Render the messages into a single prompt string.
    ///
    /// An empty message renders the role header only, which leaves the
    /// prompt open for generation.
    pub fn prompt(&self) -> String {
        let ConversationTemplate {
            system,
            style,
            sep,
            sep2,
            ..
        } = self.template;

        match style {
            SeparatorStyle::Two => {
                let seps = [sep, sep2];
                let mut text = format!("{}{}", system, sep);
                self.messages
                    .iter()
                    .enumerate()
                    .for_each(|(index, (role, message))| {
                        let role = self.template.role_name(*role);
                        if message.is_empty() {
                            text.push_str(&format!("{}:", role));
                        } else {
                            text.push_str(&format!("{}: {}{}", role, message, seps[index % 2]));
                        }
                    });
                text
            }
            SeparatorStyle::Llama2 => {
                let mut text = String::new();
                self.messages
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, message))| !message.is_empty())
                    .for_each(|(index, (_, message))| {
                        if index % 2 == 0 {
                            let message = if index == 0 {
                                format!("<<SYS>>\n{}\n<</SYS>>\n\n{}", system, message)
                            } else {
                                message.clone()
                            };
                            text.push_str(&format!("{}[INST] {} [/INST]", sep, message));
                        } else {
                            text.push_str(&format!(" {} {}", message, sep2));
                        }
                    });
                text.strip_prefix(sep.as_str())
                    .map(ToOwned::to_owned)
                    .unwrap_or(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llava_v1_prompt_test() {
        let template = ConversationTemplate::llava_v1();
        let prompt = template
            .conversation()
            .user("<image>\nWhat is this?")
            .assistant("It is [SEG].")
            .prompt();

        assert_eq!(
            prompt,
            format!(
                "{} USER: <image>\nWhat is this? ASSISTANT: It is [SEG].</s>",
                LLAVA_SYSTEM
            )
        );
        assert_eq!(template.response_separator(), " ASSISTANT: ");
        assert_eq!(template.round_separator(), "</s>");
    }

    #[test]
    fn llama2_prompt_test() {
        let template = ConversationTemplate::llava_llama2();
        let prompt = template.conversation().user("hi").assistant("hello").prompt();

        assert!(prompt.starts_with("[INST] <<SYS>>\n"));
        assert!(prompt.ends_with("hi [/INST] hello </s>"));
        assert_eq!(prompt.matches(&template.response_separator()).count(), 1);
    }

    #[test]
    fn template_kind_test() {
        let kind: TemplateKind = serde_json::from_str("\"medical\"").unwrap();
        assert_eq!(kind.template().style, SeparatorStyle::Two);
        assert_eq!(kind.template().response_separator(), " ASSISTANT: ");
    }
}
