//! Prompt templates and answer extraction.
//!
//! LLaVA 1.5 prompts follow `<image>\nUSER: <question>\n<ROLE>:`. The model
//! echoes the prompt before its answer, so the answer is whatever follows the
//! last role tag.

/// Placeholder the processor swaps for image tokens.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

pub const GEOGENIE_DELIMITER: &str = "GEOGENIE:";
pub const ASSISTANT_DELIMITER: &str = "ASSISTANT:";

/// How much of the echoed prompt to keep when extracting the answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnswerStyle {
    /// Only the trimmed text after the delimiter.
    #[default]
    Strip,
    /// The delimiter followed by the untouched text after it.
    KeepDelimiter,
}

/// A prompt string with its image placeholder and answer delimiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
    delimiter: String,
}

impl PromptTemplate {
    /// Wraps a fully formatted prompt. The delimiter must be the final role tag.
    pub fn raw(text: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delimiter: delimiter.into(),
        }
    }

    /// Builds `<image>\nUSER: {question} \nGEOGENIE:`.
    pub fn geogenie(question: &str) -> Self {
        Self::raw(
            format!("{IMAGE_PLACEHOLDER}\nUSER: {question} \n{GEOGENIE_DELIMITER}"),
            GEOGENIE_DELIMITER,
        )
    }

    /// Builds `<image>\nUSER: {question}\nASSISTANT:`.
    pub fn assistant(question: &str) -> Self {
        Self::raw(
            format!("{IMAGE_PLACEHOLDER}\nUSER: {question}\n{ASSISTANT_DELIMITER}"),
            ASSISTANT_DELIMITER,
        )
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Pulls the answer out of a decoded response.
    pub fn extract(&self, response: &str, style: AnswerStyle) -> String {
        extract_answer(response, &self.delimiter, style)
    }
}

/// Isolates the model's answer from the echoed prompt.
///
/// Splits on the first `"\n" + delimiter`. When that marker is absent the
/// response is returned as-is.
pub fn extract_answer(response: &str, delimiter: &str, style: AnswerStyle) -> String {
    let marker = format!("\n{delimiter}");
    match response.split_once(&marker) {
        Some((_, answer)) => match style {
            AnswerStyle::Strip => answer.trim().to_string(),
            AnswerStyle::KeepDelimiter => format!("{delimiter}{answer}"),
        },
        None => response.to_string(),
    }
}

/// Removes the image placeholder, as the tokenizer does with
/// `skip_special_tokens`.
pub fn strip_image_placeholder(prompt: &str) -> String {
    prompt.replace(IMAGE_PLACEHOLDER, "")
}

pub mod presets {
    use super::PromptTemplate;

    /// City, country and one fact about the map center.
    pub fn map_center() -> PromptTemplate {
        PromptTemplate::geogenie(
            "What city is located at the center of this map? Then tell me which country this city belongs to, and one fact about the city.",
        )
    }

    /// Longer prompt that also asks the model to use visible landmarks.
    pub fn map_center_detailed() -> PromptTemplate {
        PromptTemplate::raw(
            "<image>\nUSER:\n        What city is located at the center of this map? \n        Use any visible landmarks or text to help identify it. \n        Then tell me which country this city belongs to. \n        Tell me about the city and country. \nGEOGENIE:",
            super::GEOGENIE_DELIMITER,
        )
    }

    pub fn bay_area() -> PromptTemplate {
        PromptTemplate::assistant("What is the name of the city at the center of this map?")
    }

    pub fn americas() -> PromptTemplate {
        PromptTemplate::assistant(
            "What is the name of the city at the center of this map? Can you guess which country it is in?",
        )
    }

    /// Minimal prompt used when checking whether an image size is accepted.
    pub fn probe() -> PromptTemplate {
        PromptTemplate::assistant("Test prompt")
    }

    pub const DEFAULT_TEXT_PROMPT: &str = "What is the capital of France?";

    /// Wordings compared by the variations endpoint. The first one is the
    /// current favourite.
    pub fn variations() -> Vec<PromptTemplate> {
        [
            "Where is this located? Can you tell me the city at the center of the map and its country? Tell me one fact about the city.",
            "What city is located at the center of this map? Then tell me which country this city belongs to, and one fact about the city.",
            "What city is located at the center of this map? Then tell me which country this city belongs to, and one fact about the city. Please tell me any geographical features you used to help you identify the city.",
            "Looking at this map, what is the name of the city in the center? Which country is it part of? Tell me something notable about this city.",
            "Please look at the map and analyze it. What city is located at the center of this map? Then tell me which country this city belongs to, and one fact about the city.",
            "I am testing your ability to analyze maps. What is the name of the city displayed at the center of this map? In which country can this city be found? Give me one interesting fact about this city.",
        ]
        .into_iter()
        .map(PromptTemplate::geogenie)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geogenie_template_layout() {
        let prompt = presets::map_center();
        assert!(prompt.text().starts_with("<image>\nUSER: What city"));
        assert!(prompt.text().ends_with("the city. \nGEOGENIE:"));
        assert_eq!(prompt.delimiter(), GEOGENIE_DELIMITER);
    }

    #[test]
    fn strip_keeps_only_the_answer() {
        let decoded = "\nUSER: What city is this? \nGEOGENIE:  Lima, Peru. It was founded in 1535.\n";
        assert_eq!(
            extract_answer(decoded, GEOGENIE_DELIMITER, AnswerStyle::Strip),
            "Lima, Peru. It was founded in 1535."
        );
    }

    #[test]
    fn keep_delimiter_prefixes_without_trimming() {
        let decoded = "\nUSER: Which city? \nGEOGENIE: Quito \n";
        assert_eq!(
            extract_answer(decoded, GEOGENIE_DELIMITER, AnswerStyle::KeepDelimiter),
            "GEOGENIE: Quito \n"
        );
    }

    #[test]
    fn only_the_first_marker_splits() {
        let decoded = "\nUSER: q \nGEOGENIE: Cali\nGEOGENIE: again";
        assert_eq!(
            extract_answer(decoded, GEOGENIE_DELIMITER, AnswerStyle::Strip),
            "Cali\nGEOGENIE: again"
        );
    }

    #[test]
    fn missing_marker_returns_response_untouched() {
        // a delimiter without the preceding newline does not count
        let decoded = "  GEOGENIE: Houston ";
        assert_eq!(
            extract_answer(decoded, GEOGENIE_DELIMITER, AnswerStyle::Strip),
            decoded
        );
    }

    #[test]
    fn assistant_prompts_extract_with_their_own_delimiter() {
        let prompt = presets::bay_area();
        let decoded = format!("{}Oakland", strip_image_placeholder(prompt.text()));
        assert_eq!(prompt.extract(&decoded, AnswerStyle::Strip), "Oakland");
    }

    #[test]
    fn variations_share_the_geogenie_delimiter() {
        let variations = presets::variations();
        assert_eq!(variations.len(), 6);
        assert!(variations.iter().all(|p| p.delimiter() == GEOGENIE_DELIMITER));
        assert!(variations[0].text().contains("Where is this located?"));
    }
}
