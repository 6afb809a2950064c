use chatgpt::client::ChatGPT;
use chatgpt::types::CompletionResponse;
use log::{debug, error, warn};
use rand::seq::SliceRandom;
use rand::thread_rng;
use teloxide::utils::html;

use crate::catalog::Catalog;
use crate::quiz::QuizQuestion;

/// Shown instead of an explanation whenever the API call fails.
/// The browsing and quiz flows must never get stuck on a failed fetch.
pub const EXPLANATION_FALLBACK: &str =
    "Could not retrieve flag explanation. Please try again later.";

pub const QUESTIONS_PER_QUIZ: usize = 10;
const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum QuizGenError {
    #[error("quiz request failed: {0}")]
    Api(#[from] chatgpt::err::Error),
    #[error("quiz response was not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("quiz response contained no usable questions")]
    EmptyQuiz,
}

#[derive(serde::Deserialize)]
struct QuizResponse {
    questions: Vec<QuizQuestion>,
}

/// Wraps the generative API client with the two operations the bot needs:
/// flag explanations and quiz generation.
pub struct FlagHelper {
    chat_gpt: ChatGPT,
}

impl FlagHelper {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }

    /// A short markdown explanation of a country's flag symbolism.
    ///
    /// Never fails: any API error is logged and replaced with
    /// [`EXPLANATION_FALLBACK`]. Repeated calls for the same country
    /// re-query the API.
    pub async fn explain_flag(&self, country_name: &str) -> String {
        debug!("Requesting flag explanation for {:?}", country_name);
        let prompt = format!(
            "Explain the meaning of the colors and symbols on the flag of {}. \
             Be concise and structure your response with headings for \"Colors\" \
             and \"Symbols\". Respond in markdown format.",
            country_name
        );

        match self.chat_gpt.send_message(&prompt).await {
            Ok(response) => {
                let content = response.message().clone().content;
                debug!("Explanation completion: {:?}", content);
                content
            }
            Err(err) => {
                error!("Failed to fetch flag explanation for {}: {}", country_name, err);
                EXPLANATION_FALLBACK.to_string()
            }
        }
    }

    /// Generate a fresh batch of quiz questions.
    ///
    /// The prompt embeds the JSON schema; the response is parsed and each
    /// question validated before its options are shuffled. Errors are
    /// returned to the caller so the user can retry; there is no internal
    /// retry policy.
    pub async fn generate_quiz(
        &self,
        catalog: &Catalog,
    ) -> Result<Vec<QuizQuestion>, QuizGenError> {
        debug!("Requesting a {}-question flag quiz", QUESTIONS_PER_QUIZ);
        let prompt = quiz_prompt();

        let response: CompletionResponse = self.chat_gpt.send_message(&prompt).await?;
        let content = response.message().clone().content;
        debug!("Quiz completion: {:?}", content);

        parse_quiz(&content, catalog)
    }
}

fn quiz_prompt() -> String {
    format!(
        "Generate a {}-question multiple-choice quiz about world flags. For each \
         question, select a country, and provide three other plausible but incorrect \
         country options, preferably from the same continent or a similar region. \
         Provide the country's two-letter ISO code (e.g., 'us' for United States). \
         The question should implicitly be \"Which country does this flag belong to?\".\n\
         Respond with JSON only, no prose and no code fences, matching exactly this schema:\n\
         {{\"questions\": [{{\"countryName\": \"...\", \"countryCode\": \"...\", \
         \"options\": [\"...\", \"...\", \"...\", \"...\"], \"correctAnswer\": \"...\"}}]}}\n\
         Every question object requires all four fields; \"options\" holds {} country \
         names, one of which equals \"correctAnswer\".",
        QUESTIONS_PER_QUIZ, OPTIONS_PER_QUESTION
    )
}

fn parse_quiz(raw: &str, catalog: &Catalog) -> Result<Vec<QuizQuestion>, QuizGenError> {
    let payload = strip_code_fence(raw);
    let response: QuizResponse = serde_json::from_str(payload)?;

    let mut questions = Vec::new();
    for question in response.questions {
        match sanitize_question(question, catalog) {
            Some(mut question) => {
                question.options.shuffle(&mut thread_rng());
                questions.push(question);
            }
            None => continue,
        }
    }

    if questions.is_empty() {
        return Err(QuizGenError::EmptyQuiz);
    }
    Ok(questions)
}

/// Models often wrap JSON in a markdown fence despite being told not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

/// Enforce the question invariant (four distinct options, correct answer
/// among them) and normalize the ISO code, falling back to a catalog
/// lookup by name when the model's code is unusable. Questions that fail
/// either check are dropped.
fn sanitize_question(mut question: QuizQuestion, catalog: &Catalog) -> Option<QuizQuestion> {
    if question.options.len() != OPTIONS_PER_QUESTION {
        warn!(
            "Dropping question for {:?}: got {} options",
            question.country_name,
            question.options.len()
        );
        return None;
    }
    for (i, option) in question.options.iter().enumerate() {
        if question.options[..i].contains(option) {
            warn!(
                "Dropping question for {:?}: duplicate option {:?}",
                question.country_name, option
            );
            return None;
        }
    }
    if !question
        .options
        .iter()
        .any(|option| option == &question.correct_answer)
    {
        warn!(
            "Dropping question for {:?}: correct answer not among the options",
            question.country_name
        );
        return None;
    }

    let code = question.country_code.trim().to_lowercase();
    if is_iso_code(&code) {
        question.country_code = code;
    } else {
        match catalog.code_for(&question.country_name) {
            Some(code) => question.country_code = code.to_string(),
            None => {
                warn!(
                    "Dropping question for {:?}: unusable country code {:?}",
                    question.country_name, question.country_code
                );
                return None;
            }
        }
    }
    Some(question)
}

fn is_iso_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase())
}

/// Shape a markdown-flavored explanation into Telegram HTML: headings
/// become bold lines, list items become bullets, everything is escaped.
pub fn format_explanation_html(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(heading) = heading_text(line) {
            lines.push(format!("<b>{}</b>", html::escape(heading)));
        } else if let Some(item) = line.strip_prefix("* ").or_else(|| line.strip_prefix("- ")) {
            lines.push(format!("\u{2022} {}", html::escape(item)));
        } else {
            lines.push(html::escape(line));
        }
    }
    lines.join("\n")
}

fn heading_text(line: &str) -> Option<&str> {
    for prefix in ["### ", "## ", "# "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some(rest);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_json(name: &str, code: &str, options: [&str; 4], correct: &str) -> String {
        format!(
            r#"{{"countryName": "{}", "countryCode": "{}", "options": ["{}", "{}", "{}", "{}"], "correctAnswer": "{}"}}"#,
            name, code, options[0], options[1], options[2], options[3], correct
        )
    }

    fn quiz_json(questions: &[String]) -> String {
        format!(r#"{{"questions": [{}]}}"#, questions.join(", "))
    }

    #[test]
    fn test_parse_quiz_keeps_valid_questions() {
        let catalog = Catalog::new();
        let raw = quiz_json(&[
            question_json("Japan", "jp", ["Japan", "China", "South Korea", "Vietnam"], "Japan"),
            question_json("Peru", "pe", ["Chile", "Peru", "Bolivia", "Ecuador"], "Peru"),
        ]);

        let questions = parse_quiz(&raw, &catalog).unwrap();
        assert_eq!(questions.len(), 2);
        for question in &questions {
            assert_eq!(question.options.len(), 4);
            assert!(question.options.contains(&question.correct_answer));
        }
    }

    #[test]
    fn test_parse_quiz_shuffle_preserves_options() {
        let catalog = Catalog::new();
        let raw = quiz_json(&[question_json(
            "Japan",
            "jp",
            ["Japan", "China", "South Korea", "Vietnam"],
            "Japan",
        )]);

        let questions = parse_quiz(&raw, &catalog).unwrap();
        let mut options = questions[0].options.clone();
        options.sort();
        let mut expected = vec![
            "China".to_string(),
            "Japan".to_string(),
            "South Korea".to_string(),
            "Vietnam".to_string(),
        ];
        expected.sort();
        assert_eq!(options, expected);
    }

    #[test]
    fn test_parse_quiz_accepts_code_fenced_json() {
        let catalog = Catalog::new();
        let raw = format!(
            "```json\n{}\n```",
            quiz_json(&[question_json(
                "France",
                "fr",
                ["France", "Italy", "Spain", "Belgium"],
                "France",
            )])
        );
        let questions = parse_quiz(&raw, &catalog).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].country_code, "fr");
    }

    #[test]
    fn test_parse_quiz_rejects_invalid_json() {
        let catalog = Catalog::new();
        assert!(matches!(
            parse_quiz("Sure! Here is your quiz:", &catalog),
            Err(QuizGenError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_quiz_rejects_empty_question_list() {
        let catalog = Catalog::new();
        assert!(matches!(
            parse_quiz(r#"{"questions": []}"#, &catalog),
            Err(QuizGenError::EmptyQuiz)
        ));
    }

    #[test]
    fn test_malformed_questions_are_dropped() {
        let catalog = Catalog::new();
        // Correct answer missing from the options.
        let bad = question_json("Japan", "jp", ["China", "Laos", "South Korea", "Vietnam"], "Japan");
        let good = question_json("Peru", "pe", ["Chile", "Peru", "Bolivia", "Ecuador"], "Peru");
        let questions = parse_quiz(&quiz_json(&[bad.clone(), good]), &catalog).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].country_name, "Peru");

        // Nothing usable at all.
        assert!(matches!(
            parse_quiz(&quiz_json(&[bad]), &catalog),
            Err(QuizGenError::EmptyQuiz)
        ));
    }

    #[test]
    fn test_duplicate_options_are_dropped() {
        let catalog = Catalog::new();
        let raw = quiz_json(&[question_json(
            "Japan",
            "jp",
            ["Japan", "Japan", "China", "Vietnam"],
            "Japan",
        )]);
        assert!(matches!(
            parse_quiz(&raw, &catalog),
            Err(QuizGenError::EmptyQuiz)
        ));
    }

    #[test]
    fn test_country_code_is_normalized_or_looked_up() {
        let catalog = Catalog::new();
        let raw = quiz_json(&[
            // Uppercase code gets lowercased.
            question_json("Japan", "JP", ["Japan", "China", "South Korea", "Vietnam"], "Japan"),
            // Three-letter code resolved through the catalog by name.
            question_json("France", "FRA", ["France", "Italy", "Spain", "Belgium"], "France"),
        ]);
        let questions = parse_quiz(&raw, &catalog).unwrap();
        assert_eq!(questions[0].country_code, "jp");
        assert_eq!(questions[1].country_code, "fr");
    }

    #[test]
    fn test_unresolvable_country_code_drops_question() {
        let catalog = Catalog::new();
        let raw = quiz_json(&[question_json(
            "Atlantis",
            "ATL",
            ["Atlantis", "Mu", "Lemuria", "Hyperborea"],
            "Atlantis",
        )]);
        assert!(matches!(
            parse_quiz(&raw, &catalog),
            Err(QuizGenError::EmptyQuiz)
        ));
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence(r#"{"questions": []}"#), r#"{"questions": []}"#);
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_fallback_passes_through_formatting() {
        assert_eq!(
            format_explanation_html(EXPLANATION_FALLBACK),
            EXPLANATION_FALLBACK
        );
    }

    #[test]
    fn test_format_explanation_html() {
        let markdown = "## Colors\nRed stands for valor.\n\n* Blue & white stripes\n### Symbols\n- A golden sun";
        let html = format_explanation_html(markdown);
        let lines: Vec<&str> = html.lines().collect();
        assert_eq!(
            lines,
            vec![
                "<b>Colors</b>",
                "Red stands for valor.",
                "\u{2022} Blue &amp; white stripes",
                "<b>Symbols</b>",
                "\u{2022} A golden sun",
            ]
        );
    }
}
