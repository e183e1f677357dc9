//! Prompt templates and rendering.
//!
//! Templates use plain `{{var}}` placeholders with no control flow. The
//! built-in prompt set covers the three LLM operations the pipeline runs:
//! attribute extraction, general summarization, and diagram generation.

use std::collections::HashMap;

use crate::llm::{ChatRequest, ChatResponse, LanguageModel, LlmError};

/// A named prompt with fixed model parameters.
pub struct PromptDef {
    pub key: &'static str,
    pub system: Option<&'static str>,
    pub user: &'static str,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

pub const ATTRIBUTE_EXTRACTION: PromptDef = PromptDef {
    key: "document-attribute-extraction",
    system: Some(
        "You extract structured attributes from documents. \
         Respond with a single JSON object and nothing else.",
    ),
    user: "Extract the following attributes from the document text below and return them \
           as JSON with the keys: topic (string), field (string), keywords (array of strings), \
           methodology (string), docDate (ISO date string or null), extraAttributes (object).\n\n\
           Document text:\n{{text}}",
    temperature: Some(0.0),
    max_tokens: Some(512),
};

pub const SUMMARIZE_GENERAL: PromptDef = PromptDef {
    key: "doc.summarize.general",
    system: Some("You are a careful assistant that writes faithful, well-structured summaries."),
    user: "Summarize the following document. Cover the main argument, the key supporting \
           points, and any notable conclusions. Write in clear prose.\n\n{{text}}",
    temperature: Some(0.3),
    max_tokens: None,
};

pub const SUMMARY_TO_DIAGRAM: PromptDef = PromptDef {
    key: "summary.to.diagram",
    system: Some(
        "You convert summaries into mermaid flowchart definitions. \
         Respond with mermaid code only, no prose and no code fences.",
    ),
    user: "Convert this summary into a mermaid flowchart that captures its structure:\n\n{{text}}",
    temperature: Some(0.2),
    max_tokens: None,
};

/// Render a template by substituting `{{var}}` placeholders. Pure
/// substitution: unknown placeholders are left in place, `None` stays `None`.
pub fn render(template: Option<&str>, vars: &HashMap<&str, String>) -> Option<String> {
    let template = template?;
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    Some(out)
}

/// Render a prompt definition and run it through the language model.
pub async fn run_prompt(
    llm: &dyn LanguageModel,
    model: &str,
    def: &PromptDef,
    vars: &HashMap<&str, String>,
) -> Result<ChatResponse, LlmError> {
    let user = render(Some(def.user), vars)
        .ok_or_else(|| LlmError::Other(format!("prompt {} has no user template", def.key)))?;

    llm.chat(ChatRequest {
        model: model.to_string(),
        system: def.system.map(|s| s.to_string()),
        user,
        temperature: def.temperature,
        top_p: None,
        max_tokens: def.max_tokens,
        stop: Vec::new(),
    })
    .await
}

/// Strip a surrounding markdown code fence from a model response, if present.
/// Models frequently wrap JSON output in ```json ... ``` despite instructions.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the language tag on the opening fence line
    match rest.find('\n') {
        Some(idx) => rest[idx + 1..].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_vars() {
        let mut vars = HashMap::new();
        vars.insert("text", "hello".to_string());
        let out = render(Some("Summarize: {{text}}"), &vars).unwrap();
        assert_eq!(out, "Summarize: hello");
    }

    #[test]
    fn test_render_none_template() {
        let vars = HashMap::new();
        assert!(render(None, &vars).is_none());
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let vars = HashMap::new();
        let out = render(Some("{{missing}}"), &vars).unwrap();
        assert_eq!(out, "{{missing}}");
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let mut vars = HashMap::new();
        vars.insert("x", "ab".to_string());
        assert_eq!(render(Some("{{x}}-{{x}}"), &vars).unwrap(), "ab-ab");
    }

    #[test]
    fn test_strip_code_fence_json() {
        let fenced = "```json\n{\"topic\": \"x\"}\n```";
        assert_eq!(strip_code_fence(fenced), "{\"topic\": \"x\"}");
    }

    #[test]
    fn test_strip_code_fence_plain() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_no_language_tag() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(fenced), "{\"a\": 1}");
    }
}
