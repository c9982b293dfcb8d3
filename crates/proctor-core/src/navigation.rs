//! Question navigation

use proctor_api::{Question, QuestionStatus};
use proctor_util::QuestionId;

use crate::ResponseStore;

/// Tracks which question is displayed and derives per-question status.
///
/// Out-of-range requests are silent no-ops so a misbehaving UI can never
/// move the pointer outside `[0, question_count)`.
#[derive(Debug)]
pub struct NavigationController {
    order: Vec<QuestionId>,
    current: usize,
}

impl NavigationController {
    pub fn new(questions: &[Question]) -> Self {
        Self {
            order: questions.iter().map(|q| q.id.clone()).collect(),
            current: 0,
        }
    }

    /// 0-based index of the displayed question
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn question_count(&self) -> usize {
        self.order.len()
    }

    pub fn current_question(&self) -> Option<&QuestionId> {
        self.order.get(self.current)
    }

    /// Move to `index`. Returns whether the pointer moved.
    pub fn go_to(&mut self, index: usize) -> bool {
        if index >= self.order.len() || index == self.current {
            return false;
        }
        self.current = index;
        true
    }

    pub fn next(&mut self) -> bool {
        match self.current.checked_add(1) {
            Some(index) => self.go_to(index),
            None => false,
        }
    }

    pub fn previous(&mut self) -> bool {
        match self.current.checked_sub(1) {
            Some(index) => self.go_to(index),
            None => false,
        }
    }

    /// Status of the question at `index`, or `None` when out of range
    pub fn status_of(&self, index: usize, responses: &ResponseStore) -> Option<QuestionStatus> {
        self.order.get(index).map(|id| status(id, responses))
    }

    /// Status of every question, in display order
    pub fn statuses(&self, responses: &ResponseStore) -> Vec<QuestionStatus> {
        self.order.iter().map(|id| status(id, responses)).collect()
    }
}

fn status(question_id: &QuestionId, responses: &ResponseStore) -> QuestionStatus {
    if responses.is_answered(question_id) {
        QuestionStatus::Answered
    } else {
        QuestionStatus::Unanswered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_api::{AnswerValue, QuestionKind};

    fn questions(count: usize) -> Vec<Question> {
        (1..=count)
            .map(|n| Question {
                id: QuestionId::new(format!("q{}", n)),
                ordinal: n as u32,
                kind: QuestionKind::SingleChoice,
                prompt: String::new(),
                options: vec!["A".into(), "B".into()],
                marks: 1.0,
                negative_marks: None,
            })
            .collect()
    }

    #[test]
    fn out_of_range_navigation_is_ignored() {
        let mut nav = NavigationController::new(&questions(3));

        // previous() from 0 is the go_to(-1) case
        assert!(!nav.previous());
        assert_eq!(nav.current_index(), 0);

        assert!(!nav.go_to(3));
        assert_eq!(nav.current_index(), 0);

        assert!(!nav.go_to(usize::MAX));
        assert_eq!(nav.current_index(), 0);
    }

    #[test]
    fn next_and_previous_stay_in_bounds() {
        let mut nav = NavigationController::new(&questions(2));

        assert!(nav.next());
        assert_eq!(nav.current_index(), 1);
        assert!(!nav.next());
        assert_eq!(nav.current_index(), 1);
        assert_eq!(nav.current_question(), Some(&QuestionId::new("q2")));

        assert!(nav.previous());
        assert_eq!(nav.current_index(), 0);
    }

    #[test]
    fn empty_session_never_moves() {
        let mut nav = NavigationController::new(&[]);
        assert!(!nav.go_to(0));
        assert!(!nav.next());
        assert_eq!(nav.current_index(), 0);
        assert_eq!(nav.current_question(), None);
    }

    #[test]
    fn status_derived_from_responses() {
        let questions = questions(3);
        let nav = NavigationController::new(&questions);
        let mut responses = ResponseStore::new(&questions);

        responses
            .set_answer(
                &QuestionId::new("q2"),
                AnswerValue::single("A"),
                proctor_util::now(),
            )
            .unwrap();

        assert_eq!(nav.status_of(0, &responses), Some(QuestionStatus::Unanswered));
        assert_eq!(nav.status_of(1, &responses), Some(QuestionStatus::Answered));
        assert_eq!(nav.status_of(3, &responses), None);
        assert_eq!(
            nav.statuses(&responses),
            vec![
                QuestionStatus::Unanswered,
                QuestionStatus::Answered,
                QuestionStatus::Unanswered
            ]
        );
    }
}
