//! Chat template application for the draft collaborator.
//!
//! Mirrors the request shape a real chat model expects: a system/user
//! message sequence rendered into a single prompt string with an open
//! assistant turn, ready for tokenisation. ChatML is the default since it
//! is the most widely supported format among small local draft models.

/// Supported chat template types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateType {
    /// `<|im_start|>role\ncontent<|im_end|>`
    ChatML,
    /// `<|start_header_id|>role<|end_header_id|>\ncontent<|eot_id|>`
    Llama3,
    /// Raw/no template, for completion-style draft models.
    Raw,
}

impl TemplateType {
    pub fn from_model_name(model_name: &str) -> Self {
        let name_lower = model_name.to_lowercase();
        if name_lower.contains("llama-3") || name_lower.contains("llama3") {
            Self::Llama3
        } else if name_lower.contains("raw") || name_lower.contains("base") {
            Self::Raw
        } else {
            Self::ChatML
        }
    }
}

/// Render a single user prompt into the draft model's native prompt
/// string, with the assistant turn left open for generation.
pub fn apply_chat_template(prompt: &str, template_type: TemplateType) -> String {
    match template_type {
        TemplateType::ChatML => {
            format!("<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant\n")
        }
        TemplateType::Llama3 => format!(
            "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n"
        ),
        TemplateType::Raw => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatml_template_wraps_user_turn() {
        let rendered = apply_chat_template("hello", TemplateType::ChatML);
        assert!(rendered.contains("<|im_start|>user"));
        assert!(rendered.contains("hello"));
        assert!(rendered.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn template_detection_defaults_to_chatml() {
        assert_eq!(
            TemplateType::from_model_name("tiny-draft-1b"),
            TemplateType::ChatML
        );
        assert_eq!(
            TemplateType::from_model_name("llama-3-1b"),
            TemplateType::Llama3
        );
    }
}
