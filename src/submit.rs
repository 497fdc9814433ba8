//! Batched submission
//!
//! On save the final hierarchy, the staged uploads and both deletion intent
//! lists are sent to the backend in a single request.

use derive_debug::Dbg;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    hierarchy::{FileId, Hierarchy, PageId},
    pending::PendingFile,
    selection::PageFileRef,
    state::EditorState,
};

#[derive(Dbg, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub page: PageId,
    pub file_id: FileId,
    pub file: PendingFile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub structure: Hierarchy,
    #[serde(skip)]
    pub uploads: Vec<FileUpload>,
    pub files_to_delete: Vec<FileId>,
    pub delete_files_of_pages: Vec<PageFileRef>,
}

impl SubmitRequest {
    /// Build the request for a snapshot. Uploads of files that are not bound
    /// to a leaf of the hierarchy are left out.
    pub fn from_state(state: &EditorState) -> Self {
        let bound = state
            .hierarchy()
            .leaves()
            .into_iter()
            .map(|(_, leaf)| leaf.file_id.clone())
            .collect::<std::collections::HashSet<_>>();
        let uploads = state
            .pending()
            .iter()
            .filter(|(file_id, _, _)| bound.contains(*file_id))
            .map(|(file_id, page, file)| FileUpload {
                page: page.clone(),
                file_id: file_id.clone(),
                file: file.clone(),
            })
            .collect();
        Self {
            structure: state.hierarchy().clone(),
            uploads,
            files_to_delete: state.intents().files_to_delete().cloned().collect(),
            delete_files_of_pages: state.intents().delete_files_of_pages().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default, alias = "msg")]
    pub message: String,
}

pub trait Backend {
    type Error;

    fn submit(
        &self,
        request: &SubmitRequest,
    ) -> impl Future<Output = Result<SubmitResponse, Self::Error>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("failed to encode request: {0}")]
    Encode(serde_json::Error),
    #[error("backend answered {code}: {body}")]
    Status {
        code: reqwest::StatusCode,
        body: String,
    },
}

/// Sends the batch as `multipart/form-data`.
///
/// Text parts: `structure`, `filesToDelete`, `deleteFilesOfPages` (JSON).
/// Every upload is a `files` part named `<page><<&&>><file_id>`.
pub struct HttpBackend {
    endpoint: url::Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(endpoint: url::Url, token: Option<String>) -> Self {
        Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        }
    }

    fn form(request: &SubmitRequest) -> Result<reqwest::multipart::Form, HttpError> {
        let mut form = reqwest::multipart::Form::new()
            .text(
                "structure",
                serde_json::to_string(&request.structure).map_err(HttpError::Encode)?,
            )
            .text(
                "filesToDelete",
                serde_json::to_string(&request.files_to_delete).map_err(HttpError::Encode)?,
            )
            .text(
                "deleteFilesOfPages",
                serde_json::to_string(&request.delete_files_of_pages)
                    .map_err(HttpError::Encode)?,
            );
        for upload in &request.uploads {
            let part = reqwest::multipart::Part::bytes(upload.file.body.to_vec())
                .file_name(PageFileRef::new(upload.page.clone(), upload.file_id.clone()).to_string())
                .mime_str(&upload.file.content_type)
                .map_err(HttpError::Transport)?;
            form = form.part("files", part);
        }
        Ok(form)
    }
}

impl Backend for HttpBackend {
    type Error = HttpError;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, Self::Error> {
        let form = Self::form(request)?;
        let mut builder = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await.map_err(HttpError::Transport)?;
        let code = response.status();
        let body = response.text().await.map_err(HttpError::Transport)?;
        debug!(%code, "backend answered");
        parse_response(code, body)
    }
}

/// A JSON answer is returned whatever the status, so rejections sent with an
/// error status still carry their message.
fn parse_response(code: reqwest::StatusCode, body: String) -> Result<SubmitResponse, HttpError> {
    match serde_json::from_str::<SubmitResponse>(&body) {
        Ok(response) => Ok(response),
        Err(_) if !code.is_success() => Err(HttpError::Status { code, body }),
        Err(error) => Err(HttpError::Encode(error)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error("backend unreachable")]
    Unreachable,
}

#[derive(Debug, Clone)]
enum Outcome {
    Accept,
    Reject(String),
    Fail,
}

/// Backend that logs and records requests instead of sending them.
pub struct DebugBackend {
    outcome: Outcome,
    requests: Mutex<Vec<SubmitRequest>>,
}

impl DebugBackend {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            requests: Default::default(),
        }
    }

    pub fn accepting() -> Self {
        Self::with_outcome(Outcome::Accept)
    }

    pub fn rejecting(message: impl Into<String>) -> Self {
        Self::with_outcome(Outcome::Reject(message.into()))
    }

    pub fn unreachable() -> Self {
        Self::with_outcome(Outcome::Fail)
    }

    pub async fn requests(&self) -> Vec<SubmitRequest> {
        self.requests.lock().await.clone()
    }
}

impl Backend for DebugBackend {
    type Error = DebugError;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, Self::Error> {
        info!(
            uploads = ?request.uploads,
            files_to_delete = ?request.files_to_delete,
            delete_files_of_pages = ?request.delete_files_of_pages,
            "submit"
        );
        self.requests.lock().await.push(request.clone());
        match &self.outcome {
            Outcome::Accept => Ok(SubmitResponse {
                success: true,
                message: "Component saved".into(),
            }),
            Outcome::Reject(message) => Ok(SubmitResponse {
                success: false,
                message: message.clone(),
            }),
            Outcome::Fail => Err(DebugError::Unreachable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::OptionPath;

    #[test]
    fn test_request_skips_unbound_uploads() {
        let state = EditorState::load(
            Hierarchy::from_json(r#"{ "Color": { "selected": "none", "options": { "Red": { "fileId": "f1" } } } }"#)
                .unwrap(),
        );
        let red = FileId::new("f1");
        let draft = FileId::new("draft");
        let state = state
            .attach_file(&red, &PageId::new("front"), PendingFile::new("front.svg", b"a".to_vec()))
            .attach_file(&draft, &PageId::new("front"), PendingFile::new("front.svg", b"b".to_vec()))
            .delete(&OptionPath::new(["Color", "Red"]))
            .unwrap();
        let request = SubmitRequest::from_state(&state);
        assert!(request.uploads.is_empty());
        assert_eq!(request.files_to_delete, vec![red]);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["filesToDelete"], serde_json::json!(["f1"]));
        assert_eq!(value["structure"]["Color"]["selected"], "none");
        assert!(value.get("uploads").is_none());
    }

    #[test]
    fn test_response_accepts_msg_alias() {
        let response: SubmitResponse =
            serde_json::from_str(r#"{ "success": false, "msg": "Name already used" }"#).unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "Name already used");
    }

    #[test]
    fn test_multipart_form_builds() {
        let request = SubmitRequest {
            structure: Hierarchy::default(),
            uploads: vec![FileUpload {
                page: PageId::new("front"),
                file_id: FileId::new("f1"),
                file: PendingFile::new("front.svg", b"<svg/>".to_vec()),
            }],
            files_to_delete: Vec::new(),
            delete_files_of_pages: vec![PageFileRef::new(PageId::new("top"), FileId::new("f2"))],
        };
        let form = HttpBackend::form(&request).unwrap();
        assert!(!form.boundary().is_empty());
    }

    #[tokio::test]
    async fn test_debug_backend_records() {
        let backend = DebugBackend::rejecting("nope");
        let response = backend
            .submit(&SubmitRequest::from_state(&EditorState::default()))
            .await
            .unwrap();
        assert_eq!(
            response,
            SubmitResponse {
                success: false,
                message: "nope".into()
            }
        );
        assert_eq!(backend.requests().await.len(), 1);
        assert!(matches!(
            DebugBackend::unreachable()
                .submit(&SubmitRequest::from_state(&EditorState::default()))
                .await,
            Err(DebugError::Unreachable)
        ));
    }

    #[test]
    fn test_backend_answer_mapping() {
        use reqwest::StatusCode;
        let saved = parse_response(StatusCode::OK, r#"{ "success": true, "message": "ok" }"#.into());
        assert!(saved.unwrap().success);

        let rejected = parse_response(
            StatusCode::BAD_REQUEST,
            r#"{ "success": false, "msg": "Name already used" }"#.into(),
        )
        .unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.message, "Name already used");

        assert!(matches!(
            parse_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".into()),
            Err(HttpError::Status { code, body })
                if code == StatusCode::INTERNAL_SERVER_ERROR && body == "Internal Server Error"
        ));
        assert!(matches!(
            parse_response(StatusCode::OK, "<html></html>".into()),
            Err(HttpError::Encode(_))
        ));
    }
}
