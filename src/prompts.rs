//! Prompt templates for commit message generation.

/// System prompt describing the commit message convention.
pub const SYSTEM_PROMPT: &str = include_str!("templates/commit-prompt.md");

const ANALYSIS_INSTRUCTION: &str = "Analyze the changes and determine the most appropriate type and scope. Be specific and concise in the description.";

/// System and user prompt for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    /// System instruction.
    pub system: String,
    /// User message.
    pub user: String,
}

/// Builds the prompts sent to the model.
pub trait PromptBuilder: Send + Sync {
    /// Builds prompts for a staged diff and the list of files it touches.
    fn build(&self, diff: &str, files: &[String]) -> Prompts;
}

/// Default prompt builder using the embedded template.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitPromptBuilder;

impl PromptBuilder for CommitPromptBuilder {
    fn build(&self, diff: &str, files: &[String]) -> Prompts {
        Prompts {
            system: SYSTEM_PROMPT.to_string(),
            user: generate_user_prompt(diff, files),
        }
    }
}

/// Lists the modified files, then the fenced diff, then the analysis instruction.
pub fn generate_user_prompt(diff: &str, files: &[String]) -> String {
    format!(
        "Modified files:\n{}\n\nGit diff:\n```\n{}\n```\n\n{}",
        files.join("\n"),
        diff,
        ANALYSIS_INSTRUCTION
    )
}
