//! Attachment upload and retrieval.

use std::path::Path;

use reqwest::Method;
use reqwest::header::ACCEPT;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, instrument};

use super::FormsClient;
use crate::error::ApiError;
use crate::http::{AttachmentStream, ResultEnvelope, ReturnFormat, UploadTarget, dispatch, status_text, write_multipart};
use crate::json::{self, JsonObject};

/// Local name used when neither the recorded name nor the uid is usable.
const FALLBACK_ATTACHMENT_NAME: &str = "attachment";

/// Upload id and file name of an attachment field in a record.
struct AttachmentRef {
    uid: String,
    file_name: String,
}

impl FormsClient {
    fn attachment_url(&self, app_uid: &str, form_id: &str) -> String {
        format!("{}/attachment", self.form_url(app_uid, form_id))
    }

    /// Uploads the file at `path` as a new attachment of the form.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the file cannot be opened.
    #[instrument(level = "debug", skip(self))]
    pub async fn upload_attachment(
        &self,
        app_uid: &str,
        form_id: &str,
        media_type: &str,
        path: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        let file = File::open(path).await.map_err(|e| ApiError::io(path, e))?;
        let file_name = file_name_of(path);
        self.upload_attachment_stream(app_uid, form_id, media_type, &file_name, file)
            .await
    }

    /// Uploads `reader` as a new attachment named `file_name`.
    ///
    /// The reader is streamed while the request is sent and dropped once read
    /// to the end.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Upload`] if reading fails.
    #[instrument(level = "debug", skip(self, reader))]
    pub async fn upload_attachment_stream<R>(
        &self,
        app_uid: &str,
        form_id: &str,
        media_type: &str,
        file_name: &str,
        reader: R,
    ) -> Result<ResultEnvelope, ApiError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let media_types = self.media_types();
        let url = self.attachment_url(app_uid, form_id);
        debug!(url = %url, "REST URL");

        let connection =
            self.connector
                .open(&url, Method::POST, &[(ACCEPT.as_str(), media_types.json.as_str())], false)?;
        let target = UploadTarget::new(file_name, file_name, media_type, reader);
        let connection = write_multipart(connection, target, media_types)?;
        let response = connection.send().await?;
        dispatch(response, media_types).await
    }

    /// Downloads an attachment into `file_path`.
    ///
    /// The file is written only for a 200/201 response. The returned
    /// envelope carries the status and no body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the file cannot be written.
    #[instrument(level = "debug", skip(self))]
    pub async fn retrieve_attachment_to_path(
        &self,
        app_uid: &str,
        form_id: &str,
        attachment_uid: &str,
        file_path: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        let url = format!("{}/{attachment_uid}", self.attachment_url(app_uid, form_id));
        debug!(url = %url, "REST URL");
        let connection =
            self.connector
                .open(&url, Method::GET, &[(ACCEPT.as_str(), self.media_types().json.as_str())], false)?;
        let response = connection.send().await?;
        save_response(response, file_path).await
    }

    /// Opens an attachment for streaming.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connection`] on transport failure.
    #[instrument(level = "debug", skip(self))]
    pub async fn retrieve_attachment_stream(
        &self,
        app_uid: &str,
        form_id: &str,
        attachment_uid: &str,
    ) -> Result<AttachmentStream, ApiError> {
        let url = format!("{}/{attachment_uid}", self.attachment_url(app_uid, form_id));
        debug!(url = %url, "REST URL");
        let response = self.connector.open(&url, Method::GET, &[], false)?.send().await?;
        Ok(AttachmentStream::new(response))
    }

    /// Downloads the attachment held in `field_id` of a record into `dir`,
    /// under the file name recorded with the upload.
    ///
    /// Only the last component of the recorded name is used, so the file
    /// always lands directly inside `dir`. An unusable name falls back to
    /// the attachment uid.
    ///
    /// A non-200 record retrieval is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnexpectedShape`] if the record has no such
    /// attachment field.
    #[instrument(level = "debug", skip(self))]
    pub async fn retrieve_attachment_by_field_to_path(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        field_id: &str,
        dir: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        let retrieved = self
            .retrieve_record(app_uid, form_id, record_uid, ReturnFormat::Json)
            .await?;
        if retrieved.http_status != 200 {
            return Ok(retrieved);
        }
        let attachment = attachment_in(&retrieved, field_id)?;
        let file_name = local_file_name(&attachment.file_name, &attachment.uid);
        debug!(recorded = %attachment.file_name, local = %file_name, "attachment file name");
        self.retrieve_attachment_to_path(app_uid, form_id, &attachment.uid, &dir.join(file_name))
            .await
    }

    /// Opens the attachment held in `field_id` of a record for streaming.
    ///
    /// Returns `None` when the record retrieval is not 200.
    ///
    /// # Errors
    ///
    /// See [`retrieve_attachment_by_field_to_path`](Self::retrieve_attachment_by_field_to_path).
    #[instrument(level = "debug", skip(self))]
    pub async fn retrieve_attachment_by_field_stream(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        field_id: &str,
    ) -> Result<Option<AttachmentStream>, ApiError> {
        let retrieved = self
            .retrieve_record(app_uid, form_id, record_uid, ReturnFormat::Json)
            .await?;
        if retrieved.http_status != 200 {
            debug!(status = retrieved.http_status, "record retrieval failed, no attachment");
            return Ok(None);
        }
        let attachment = attachment_in(&retrieved, field_id)?;
        self.retrieve_attachment_stream(app_uid, form_id, &attachment.uid)
            .await
            .map(Some)
    }
}

fn attachment_in(retrieved: &ResultEnvelope, field_id: &str) -> Result<AttachmentRef, ApiError> {
    let body: &JsonObject = retrieved
        .json()
        .ok_or_else(|| ApiError::unexpected_shape("items", "object"))?;
    let field = json::object_field(json::first_item(body)?, field_id)?;
    Ok(AttachmentRef {
        uid: json::str_field(field, "uid")?.to_string(),
        file_name: json::str_field(field, "fileName")?.to_string(),
    })
}

/// Reduces a recorded file name to a single path component.
fn local_file_name(recorded: &str, uid: &str) -> String {
    file_name_component(recorded)
        .or_else(|| file_name_component(uid))
        .unwrap_or_else(|| FALLBACK_ATTACHMENT_NAME.to_string())
}

fn file_name_component(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = last
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// Streams a successful response to `path` and reports its status.
pub(super) async fn save_response(
    response: reqwest::Response,
    path: &Path,
) -> Result<ResultEnvelope, ApiError> {
    let status = response.status();
    let envelope =
        ResultEnvelope::status_only(status.as_u16(), status_text(status));
    if envelope.is_successful() {
        AttachmentStream::new(response).write_to_file(path).await?;
    } else {
        debug!(status = envelope.http_status, path = %path.display(), "nothing written");
    }
    Ok(envelope)
}

pub(super) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::http::Body;
    use serde_json::json;

    #[test]
    fn test_attachment_in_reads_uid_and_file_name() {
        let body = json!({"items": [{"F_Photo": {"uid": "att-1", "id": 9, "fileName": "cat.png"}}]});
        let envelope = ResultEnvelope {
            http_status: 200,
            status_text: "OK".to_string(),
            body: Body::Structured(body.as_object().unwrap().clone()),
        };
        let attachment = attachment_in(&envelope, "F_Photo").unwrap();
        assert_eq!(attachment.uid, "att-1");
        assert_eq!(attachment.file_name, "cat.png");

        assert!(matches!(
            attachment_in(&envelope, "F_Missing"),
            Err(ApiError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn test_file_name_of_path() {
        assert_eq!(file_name_of(Path::new("/tmp/docs/report.pdf")), "report.pdf");
        assert_eq!(file_name_of(Path::new("/")), "");
    }

    #[test]
    fn test_local_file_name_keeps_last_component() {
        assert_eq!(local_file_name("scan.pdf", "att-1"), "scan.pdf");
        assert_eq!(local_file_name("/etc/cron.d/job", "att-1"), "job");
        assert_eq!(local_file_name("../../outside.txt", "att-1"), "outside.txt");
        assert_eq!(local_file_name("C:\\Users\\me\\a.doc", "att-1"), "a.doc");
        assert_eq!(local_file_name("we?ird|name", "att-1"), "we_ird_name");
    }

    #[test]
    fn test_local_file_name_falls_back_to_uid() {
        assert_eq!(local_file_name("..", "att-1"), "att-1");
        assert_eq!(local_file_name("", "att-1"), "att-1");
        assert_eq!(local_file_name("dir/", "att-1"), "att-1");
        assert_eq!(local_file_name("", "../.."), FALLBACK_ATTACHMENT_NAME);
    }
}
