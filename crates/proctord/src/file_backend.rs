//! Session backend over a local directory
//!
//! Layout under the root directory:
//! - `sessions/<session_id>.json`: session manifest
//! - `autosave/<session_id>/<question_id>.json`: latest saved answer
//! - `submissions/<session_id>.json`: final submission

use async_trait::async_trait;
use chrono::{DateTime, Local};
use proctor_api::{AnswerValue, FinalizeReason, ResponseSet, SessionManifest};
use proctor_backend_api::{BackendError, BackendResult, SessionBackend};
use proctor_util::{QuestionId, SessionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Autosaved answer as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAnswer {
    pub question_id: QuestionId,
    pub value: AnswerValue,
    pub saved_at: DateTime<Local>,
}

/// Final submission as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub session_id: SessionId,
    pub reason: FinalizeReason,
    pub submitted_at: DateTime<Local>,
    pub responses: ResponseSet,
}

/// JSON-file session backend
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn manifest_path(&self, session_id: &SessionId) -> PathBuf {
        self.root
            .join("sessions")
            .join(format!("{}.json", session_id))
    }

    pub fn autosave_path(&self, session_id: &SessionId, question_id: &QuestionId) -> PathBuf {
        self.root
            .join("autosave")
            .join(session_id.as_str())
            .join(format!("{}.json", question_id))
    }

    pub fn submission_path(&self, session_id: &SessionId) -> PathBuf {
        self.root
            .join("submissions")
            .join(format!("{}.json", session_id))
    }

    /// Read a stored submission, if any
    pub async fn load_submission(
        &self,
        session_id: &SessionId,
    ) -> BackendResult<Option<SubmissionRecord>> {
        match tokio::fs::read(self.submission_path(session_id)).await {
            Ok(bytes) => Ok(Some(decode(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the latest autosave for one question, if any
    pub async fn load_autosave(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
    ) -> BackendResult<Option<SavedAnswer>> {
        match tokio::fs::read(self.autosave_path(session_id, question_id)).await {
            Ok(bytes) => Ok(Some(decode(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> BackendResult<T> {
    serde_json::from_slice(bytes).map_err(|e| BackendError::internal(e.to_string()))
}

/// Write via a temporary file so readers never see a partial document
async fn write_json<T: Serialize>(path: &Path, value: &T) -> BackendResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|e| BackendError::internal(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SessionBackend for FileBackend {
    async fn fetch_session(&self, session_id: &SessionId) -> BackendResult<SessionManifest> {
        let path = self.manifest_path(session_id);
        debug!(path = %path.display(), "Reading session manifest");

        match tokio::fs::read(&path).await {
            Ok(bytes) => decode(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BackendError::NotFound(session_id.clone()))
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(BackendError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_response(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        value: &AnswerValue,
    ) -> BackendResult<()> {
        let saved = SavedAnswer {
            question_id: question_id.clone(),
            value: value.clone(),
            saved_at: proctor_util::now(),
        };
        write_json(&self.autosave_path(session_id, question_id), &saved).await
    }

    async fn submit_session(
        &self,
        session_id: &SessionId,
        responses: &ResponseSet,
        reason: FinalizeReason,
    ) -> BackendResult<()> {
        let path = self.submission_path(session_id);
        if tokio::fs::try_exists(&path).await? {
            return Err(BackendError::AlreadySubmitted);
        }

        let record = SubmissionRecord {
            session_id: session_id.clone(),
            reason,
            submitted_at: proctor_util::now(),
            responses: responses.clone(),
        };
        write_json(&path, &record).await?;

        debug!(path = %path.display(), answered = responses.len(), "Submission written");
        Ok(())
    }
}
