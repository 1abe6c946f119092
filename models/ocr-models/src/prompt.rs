/// Marks where the image goes in a prompt.
pub const IMAGE_PLACEHOLDER: &str = "<image>";
/// Asks for every recognized line to be paired with its bounding box.
pub const GROUNDING_MARKER: &str = "<|grounding|>";

/// A prompt split into its structural markers and the free text instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    grounding: bool,
    instruction: String,
}

impl Prompt {
    /// Parse a prompt.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let grounding = raw.contains(GROUNDING_MARKER);
        let instruction = raw
            .replace(IMAGE_PLACEHOLDER, "")
            .replace(GROUNDING_MARKER, "")
            .trim()
            .to_string();
        Self {
            grounding,
            instruction,
        }
    }

    /// Whether the output should pair text with bounding boxes
    pub fn grounding(&self) -> bool {
        self.grounding
    }

    /// The prompt with every marker removed
    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

impl From<&str> for Prompt {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Prompt {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_markers_from_the_instruction() {
        let prompt = Prompt::new("<image>\n<|grounding|>Extract all text from this document.");
        assert!(prompt.grounding());
        assert_eq!(prompt.instruction(), "Extract all text from this document.");
    }

    #[test]
    fn plain_prompts_have_no_markers() {
        let prompt = Prompt::from("<image>\nFree OCR.");
        assert!(!prompt.grounding());
        assert_eq!(prompt.instruction(), "Free OCR.");

        let prompt = Prompt::from(String::new());
        assert!(!prompt.grounding());
        assert_eq!(prompt.instruction(), "");
    }
}
