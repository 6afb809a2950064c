use serde::{Deserialize, Serialize};

/// One multiple-choice question as delivered by the quiz generator.
/// Field names mirror the generator's JSON schema (camelCase on the wire).
///
/// Invariant: `correct_answer` is one of `options`, and `options` holds
/// exactly four distinct country names. The generator enforces this before
/// a question ever reaches the machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub country_name: String,
    pub country_code: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Lifecycle phase of a quiz session.
///
/// Transitions: `Idle -> Loading` on start, `Loading -> Playing` on
/// successful generation, `Loading -> Idle` on generation failure,
/// `Playing -> Finished` on advancing past the last question, and
/// `Finished -> Idle` on restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuizPhase {
    #[default]
    Idle,
    Loading,
    Playing,
    Finished,
}

/// Outcome of submitting an answer for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// First answer for this question; score already updated.
    Accepted { correct: bool },
    /// An answer was already recorded for this question; nothing changed.
    AlreadyAnswered,
    /// The submitted text is not one of the question's options.
    NotAnOption,
    /// There is no active question to answer.
    NotPlaying,
}

/// Outcome of asking the quiz to move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextQuestion,
    Finished,
    /// Not playing, or the current question has no recorded answer yet.
    NotReady,
}

/// The quiz session state machine. All quiz state lives here and is only
/// mutated through the transition methods, so the scoring and
/// first-answer-wins rules hold no matter what the chat surface sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizMachine {
    phase: QuizPhase,
    questions: Vec<QuizQuestion>,
    current_question: usize,
    score: usize,
    selected_answer: Option<String>,
    is_correct: Option<bool>,
    error: Option<String>,
}

impl QuizMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// 1-based number of the current question, for display.
    pub fn question_number(&self) -> usize {
        self.current_question + 1
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        if self.phase != QuizPhase::Playing {
            return None;
        }
        self.questions.get(self.current_question)
    }

    pub fn selected_answer(&self) -> Option<&str> {
        self.selected_answer.as_deref()
    }

    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    /// The failure message recorded by the last `generation_failed`, shown
    /// while idle.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether advancing would present another question rather than finish.
    pub fn has_more_questions(&self) -> bool {
        self.current_question + 1 < self.questions.len()
    }

    /// Begin loading a new quiz. Only meaningful while idle; a start while
    /// a generation is already in flight is a no-op, which keeps the
    /// session single-flight. Returns whether the transition happened.
    pub fn start(&mut self) -> bool {
        if self.phase != QuizPhase::Idle {
            return false;
        }
        self.phase = QuizPhase::Loading;
        self.error = None;
        true
    }

    /// Generation succeeded: enter play with a fresh score and selection.
    pub fn questions_ready(&mut self, questions: Vec<QuizQuestion>) {
        if self.phase != QuizPhase::Loading {
            return;
        }
        self.questions = questions;
        self.current_question = 0;
        self.score = 0;
        self.selected_answer = None;
        self.is_correct = None;
        self.phase = QuizPhase::Playing;
    }

    /// Generation failed: back to idle with the message kept for display.
    pub fn generation_failed(&mut self, message: String) {
        if self.phase != QuizPhase::Loading {
            return;
        }
        self.error = Some(message);
        self.questions.clear();
        self.phase = QuizPhase::Idle;
    }

    /// Record the answer for the current question. Only the first answer
    /// per question counts; it must be one of the question's options.
    /// Scores one point iff it equals the correct answer.
    pub fn select_answer(&mut self, answer: &str) -> Selection {
        if self.phase != QuizPhase::Playing {
            return Selection::NotPlaying;
        }
        if self.selected_answer.is_some() {
            return Selection::AlreadyAnswered;
        }
        let question = match self.questions.get(self.current_question) {
            Some(question) => question,
            None => return Selection::NotPlaying,
        };
        if !question.options.iter().any(|option| option == answer) {
            return Selection::NotAnOption;
        }

        let correct = answer == question.correct_answer;
        self.selected_answer = Some(answer.to_string());
        self.is_correct = Some(correct);
        if correct {
            self.score += 1;
        }
        Selection::Accepted { correct }
    }

    /// Move to the next question, or finish after the last one. Requires a
    /// recorded answer for the current question.
    pub fn advance(&mut self) -> Advance {
        if self.phase != QuizPhase::Playing || self.selected_answer.is_none() {
            return Advance::NotReady;
        }
        if self.current_question + 1 < self.questions.len() {
            self.current_question += 1;
            self.selected_answer = None;
            self.is_correct = None;
            return Advance::NextQuestion;
        }
        self.phase = QuizPhase::Finished;
        Advance::Finished
    }

    /// Drop the finished session and return to idle.
    pub fn restart(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: &str, others: [&str; 3]) -> QuizQuestion {
        let mut options: Vec<String> = others.iter().map(|s| s.to_string()).collect();
        options.insert(1, correct.to_string());
        QuizQuestion {
            country_name: correct.to_string(),
            country_code: "xx".to_string(),
            options,
            correct_answer: correct.to_string(),
        }
    }

    fn sample_questions() -> Vec<QuizQuestion> {
        vec![
            question("France", ["Italy", "Spain", "Belgium"]),
            question("Japan", ["China", "South Korea", "Vietnam"]),
            question("Peru", ["Chile", "Bolivia", "Ecuador"]),
        ]
    }

    fn playing_machine() -> QuizMachine {
        let mut machine = QuizMachine::new();
        assert!(machine.start());
        machine.questions_ready(sample_questions());
        machine
    }

    #[test]
    fn test_lifecycle_score_equals_correct_answers() {
        let mut machine = playing_machine();

        assert_eq!(
            machine.select_answer("France"),
            Selection::Accepted { correct: true }
        );
        assert_eq!(machine.advance(), Advance::NextQuestion);

        assert_eq!(
            machine.select_answer("China"),
            Selection::Accepted { correct: false }
        );
        assert_eq!(machine.advance(), Advance::NextQuestion);

        assert_eq!(
            machine.select_answer("Peru"),
            Selection::Accepted { correct: true }
        );
        assert_eq!(machine.advance(), Advance::Finished);

        assert_eq!(machine.phase(), QuizPhase::Finished);
        assert_eq!(machine.score(), 2);
        assert!(machine.score() <= machine.total());
    }

    #[test]
    fn test_second_selection_is_a_no_op() {
        let mut machine = playing_machine();

        assert_eq!(
            machine.select_answer("Italy"),
            Selection::Accepted { correct: false }
        );
        let score_after_first = machine.score();

        assert_eq!(machine.select_answer("France"), Selection::AlreadyAnswered);
        assert_eq!(machine.score(), score_after_first);
        assert_eq!(machine.selected_answer(), Some("Italy"));
        assert_eq!(machine.is_correct(), Some(false));
    }

    #[test]
    fn test_selection_must_be_one_of_the_options() {
        let mut machine = playing_machine();
        assert_eq!(machine.select_answer("Narnia"), Selection::NotAnOption);
        assert_eq!(machine.score(), 0);
        assert_eq!(machine.selected_answer(), None);
    }

    #[test]
    fn test_generation_failure_returns_to_idle_with_error() {
        let mut machine = QuizMachine::new();
        assert!(machine.start());
        assert_eq!(machine.phase(), QuizPhase::Loading);

        machine.generation_failed("quiz response contained no usable questions".to_string());
        assert_eq!(machine.phase(), QuizPhase::Idle);
        assert!(!machine.error().unwrap().is_empty());
        assert_eq!(machine.total(), 0);
    }

    #[test]
    fn test_start_clears_prior_error_and_guards_single_flight() {
        let mut machine = QuizMachine::new();
        assert!(machine.start());
        machine.generation_failed("boom".to_string());
        assert!(machine.error().is_some());

        assert!(machine.start());
        assert!(machine.error().is_none());
        // Already loading: a second start must not fire another generation.
        assert!(!machine.start());
    }

    #[test]
    fn test_advance_requires_an_answer() {
        let mut machine = playing_machine();
        assert_eq!(machine.advance(), Advance::NotReady);
        machine.select_answer("France");
        assert_eq!(machine.advance(), Advance::NextQuestion);
        assert_eq!(machine.selected_answer(), None);
        assert_eq!(machine.is_correct(), None);
    }

    #[test]
    fn test_restart_resets_to_idle_regardless_of_score() {
        let mut machine = playing_machine();
        machine.select_answer("France");
        machine.advance();
        machine.select_answer("Japan");
        machine.advance();
        machine.select_answer("Peru");
        assert_eq!(machine.advance(), Advance::Finished);
        assert_eq!(machine.score(), 3);

        machine.restart();
        assert_eq!(machine.phase(), QuizPhase::Idle);
        assert_eq!(machine.total(), 0);
        assert_eq!(machine.score(), 0);
        assert_eq!(machine.selected_answer(), None);
    }

    #[test]
    fn test_question_deserializes_from_camel_case() {
        let json = r#"{
            "countryName": "Ukraine",
            "countryCode": "ua",
            "options": ["Ukraine", "Poland", "Slovakia", "Romania"],
            "correctAnswer": "Ukraine"
        }"#;
        let question: QuizQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(question.country_name, "Ukraine");
        assert_eq!(question.country_code, "ua");
        assert_eq!(question.options.len(), 4);
        assert_eq!(question.correct_answer, "Ukraine");
    }
}
