//! Response store

use chrono::{DateTime, Local};
use proctor_api::{AnswerValue, Question, QuestionKind, Response, ResponseSet};
use proctor_util::QuestionId;
use std::collections::{BTreeSet, HashMap};

use crate::{CoreError, CoreResult};

/// The student's current answers, with dirty tracking for autosave.
///
/// Holds at most one [`Response`] per question; every write overwrites.
#[derive(Debug)]
pub struct ResponseStore {
    questions: HashMap<QuestionId, Question>,
    responses: HashMap<QuestionId, Response>,
    dirty: BTreeSet<QuestionId>,
    next_revision: u64,
}

impl ResponseStore {
    pub fn new(questions: &[Question]) -> Self {
        Self {
            questions: questions
                .iter()
                .map(|q| (q.id.clone(), q.clone()))
                .collect(),
            responses: HashMap::new(),
            dirty: BTreeSet::new(),
            next_revision: 1,
        }
    }

    /// Record an answer, replacing any previous one, and mark it dirty.
    ///
    /// The value must match the question kind: a single token for
    /// single-choice and numerical questions, a set of tokens for
    /// multiple-choice. An empty set clears a multiple-choice answer.
    pub fn set_answer(
        &mut self,
        question_id: &QuestionId,
        value: AnswerValue,
        now: DateTime<Local>,
    ) -> CoreResult<()> {
        let question = self.question(question_id)?;
        validate_answer(question, &value)?;
        self.write(question_id, value, now);
        Ok(())
    }

    /// Add `option` to a multiple-choice answer if absent, remove it if
    /// present.
    pub fn toggle_option(
        &mut self,
        question_id: &QuestionId,
        option: &str,
        now: DateTime<Local>,
    ) -> CoreResult<()> {
        let question = self.question(question_id)?;
        if question.kind != QuestionKind::MultipleChoice {
            return Err(CoreError::InvalidQuestionType {
                question_id: question_id.clone(),
                actual: question.kind,
            });
        }
        if !question.options.is_empty() && !question.has_option(option) {
            return Err(CoreError::UnknownOption {
                question_id: question_id.clone(),
                option: option.to_string(),
            });
        }

        let mut selected = match self.responses.get(question_id).map(|r| &r.value) {
            Some(AnswerValue::Multiple(set)) => set.clone(),
            _ => BTreeSet::new(),
        };
        if !selected.remove(option) {
            selected.insert(option.to_string());
        }

        self.write(question_id, AnswerValue::Multiple(selected), now);
        Ok(())
    }

    /// Current answer, or `None` when unset or cleared
    pub fn get_answer(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.responses
            .get(question_id)
            .map(|r| &r.value)
            .filter(|v| !v.is_empty())
    }

    /// Stored response including bookkeeping, even when cleared
    pub fn response(&self, question_id: &QuestionId) -> Option<&Response> {
        self.responses.get(question_id)
    }

    pub fn is_answered(&self, question_id: &QuestionId) -> bool {
        self.get_answer(question_id).is_some()
    }

    /// Number of questions with at least one recorded value
    pub fn answered_count(&self) -> usize {
        self.responses
            .values()
            .filter(|r| !r.value.is_empty())
            .count()
    }

    /// Question ids changed since the last drain, in id order. Clears the set.
    pub fn drain_dirty(&mut self) -> Vec<QuestionId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Put a question back in the dirty set so the next autosave picks it up.
    /// Ignored for questions that were never written.
    pub fn mark_dirty(&mut self, question_id: &QuestionId) {
        if self.responses.contains_key(question_id) {
            self.dirty.insert(question_id.clone());
        }
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Every answered question with its current value
    pub fn snapshot(&self) -> ResponseSet {
        self.responses
            .iter()
            .filter(|(_, r)| !r.value.is_empty())
            .map(|(id, r)| (id.clone(), r.value.clone()))
            .collect()
    }

    fn question(&self, question_id: &QuestionId) -> CoreResult<&Question> {
        self.questions
            .get(question_id)
            .ok_or_else(|| CoreError::UnknownQuestion(question_id.clone()))
    }

    fn write(&mut self, question_id: &QuestionId, value: AnswerValue, now: DateTime<Local>) {
        let revision = self.next_revision;
        self.next_revision += 1;

        self.responses.insert(
            question_id.clone(),
            Response {
                value,
                last_modified_at: now,
                revision,
            },
        );
        self.dirty.insert(question_id.clone());
    }
}

fn validate_answer(question: &Question, value: &AnswerValue) -> CoreResult<()> {
    let shape_error = || CoreError::InvalidAnswerShape {
        question_id: question.id.clone(),
        expected: question.kind,
    };
    let check_option = |token: &str| {
        if question.options.is_empty() || question.has_option(token) {
            Ok(())
        } else {
            Err(CoreError::UnknownOption {
                question_id: question.id.clone(),
                option: token.to_string(),
            })
        }
    };

    match (question.kind, value) {
        (QuestionKind::SingleChoice, AnswerValue::Single(token)) => {
            if token.is_empty() {
                return Err(shape_error());
            }
            check_option(token)
        }
        (QuestionKind::Numerical, AnswerValue::Single(token)) => {
            match token.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(()),
                _ => Err(shape_error()),
            }
        }
        (QuestionKind::MultipleChoice, AnswerValue::Multiple(set)) => {
            set.iter().try_for_each(|token| check_option(token))
        }
        _ => Err(shape_error()),
    }
}
