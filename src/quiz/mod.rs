//! Multiple-choice questions: types, option shuffling and synthesis.

mod synthesizer;

pub use synthesizer::QuestionSynthesizer;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A generated question with its correct answer and three distractors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answer: String,
    pub option1: String,
    pub option2: String,
    pub option3: String,
}

impl QuizQuestion {
    /// All four option strings, answer first.
    pub fn options(&self) -> Vec<String> {
        vec![
            self.answer.clone(),
            self.option1.clone(),
            self.option2.clone(),
            self.option3.clone(),
        ]
    }
}

/// A question ready to be stored, with its options in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQuestion {
    pub id: Uuid,
    pub chapter_id: String,
    pub question: String,
    /// Correct answer, kept verbatim apart from the shuffled options.
    pub answer: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PersistedQuestion {
    /// Shuffle the options of `question` once and attach it to a chapter.
    pub fn from_quiz<R: Rng + ?Sized>(
        question: &QuizQuestion,
        chapter_id: &str,
        rng: &mut R,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chapter_id: chapter_id.to_string(),
            question: question.question.clone(),
            answer: question.answer.clone(),
            options: shuffle_options(question, rng),
            created_at: Utc::now(),
        }
    }

    /// Options encoded as a JSON array, the stored representation.
    pub fn options_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.options)
    }
}

/// Uniformly permute the four options of a question (Fisher-Yates).
pub fn shuffle_options<R: Rng + ?Sized>(question: &QuizQuestion, rng: &mut R) -> Vec<String> {
    let mut options = question.options();
    options.shuffle(rng);
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn question() -> QuizQuestion {
        QuizQuestion {
            question: "Which sort repeatedly swaps adjacent elements?".to_string(),
            answer: "Bubble sort".to_string(),
            option1: "Merge sort".to_string(),
            option2: "Heap sort".to_string(),
            option3: "Radix sort".to_string(),
        }
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let mut shuffled = shuffle_options(&question(), &mut rng);
            let mut original = question().options();
            shuffled.sort();
            original.sort();
            assert_eq!(shuffled, original);
        }
    }

    #[test]
    fn test_same_seed_same_order() {
        let a = shuffle_options(&question(), &mut StdRng::seed_from_u64(42));
        let b = shuffle_options(&question(), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_answer_lands_in_every_position() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            let options = shuffle_options(&question(), &mut rng);
            let pos = options.iter().position(|o| o == "Bubble sort").unwrap();
            counts[pos] += 1;
        }
        for count in counts {
            assert!((700..1300).contains(&count), "skewed positions: {counts:?}");
        }
    }

    #[test]
    fn test_persisted_question_keeps_answer() {
        let mut rng = StdRng::seed_from_u64(3);
        let persisted = PersistedQuestion::from_quiz(&question(), "ch-1", &mut rng);
        let other = PersistedQuestion::from_quiz(&question(), "ch-1", &mut rng);

        assert_eq!(persisted.answer, "Bubble sort");
        assert_eq!(persisted.chapter_id, "ch-1");
        assert!(persisted.options.contains(&persisted.answer));
        assert_ne!(persisted.id, other.id);

        let decoded: Vec<String> =
            serde_json::from_str(&persisted.options_json().unwrap()).unwrap();
        assert_eq!(decoded, persisted.options);
    }
}
