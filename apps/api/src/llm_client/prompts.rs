// Shared prompt fragments and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting fragments.

/// Appended to system prompts whose output is parsed line by line.
pub const NO_EXTRA_TEXT_INSTRUCTION: &str = "IMPORTANT: Ne mets RIEN avant la première section. \
    Ne mets RIEN après la dernière section. \
    N'utilise pas de Markdown, pas de gras, pas de blocs de code.";

/// Fills `{name}` placeholders in a prompt template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}
