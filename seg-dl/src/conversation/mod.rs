//! Conversation templates, prompt lists and label alignment.

mod aligner;
mod prompts;
mod template;

pub use aligner::*;
pub use prompts::*;
pub use template::*;
