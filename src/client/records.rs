//! Record operations: list, retrieve, submit, update and delete.

use std::path::Path;

use reqwest::Method;
use serde_json::Value;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument, warn};

use super::{DeleteReport, DeleteSubject, FormsClient, require};
use crate::error::ApiError;
use crate::http::{ResultEnvelope, ReturnFormat};
use crate::json::{self, JsonObject};
use crate::query::{DEFAULT_PAGE_SIZE, FilterSet, build_query_string};

const PRESSED_BUTTON: &str = "pressedButton";
const FLOW_STATE: &str = "flowState";
const PRESSED_BUTTON_HINT: &str = "identify the ID of the submit button being triggered";
const FLOW_STATE_HINT: &str = "identify the ID of the current stage of the record being updated";

impl FormsClient {
    /// `<data base><app>/<form>`
    pub(super) fn form_url(&self, app_uid: &str, form_id: &str) -> String {
        format!("{}{app_uid}/{form_id}", self.config().data_url_base())
    }

    /// Lists the records of a form matching `filters`.
    ///
    /// Spreadsheet formats come back as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns transport and body errors; a non-2xx status is reported in
    /// the envelope.
    #[instrument(level = "debug", skip(self, filters))]
    pub async fn list_records(
        &self,
        app_uid: &str,
        form_id: &str,
        filters: Option<&FilterSet>,
        format: ReturnFormat,
    ) -> Result<ResultEnvelope, ApiError> {
        let mut url = self.form_url(app_uid, form_id);
        if let Some(filters) = filters {
            url.push_str(&build_query_string(filters));
        }
        debug!(url = %url, "REST URL");
        self.get(&url, format.media_type(), false).await
    }

    /// Retrieves one record, as JSON or Atom.
    ///
    /// # Errors
    ///
    /// See [`list_records`](Self::list_records).
    #[instrument(level = "debug", skip(self))]
    pub async fn retrieve_record(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        format: ReturnFormat,
    ) -> Result<ResultEnvelope, ApiError> {
        let url = format!("{}/{record_uid}", self.form_url(app_uid, form_id));
        debug!(url = %url, "REST URL");
        self.get(&url, format.media_type(), false).await
    }

    /// Retrieves the field metadata of a form.
    ///
    /// # Errors
    ///
    /// See [`list_records`](Self::list_records).
    #[instrument(level = "debug", skip(self))]
    pub async fn get_form_metadata(
        &self,
        app_uid: &str,
        form_id: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        let url = format!("{}/metadata", self.form_url(app_uid, form_id));
        let accept = self.media_types().json.clone();
        self.get(&url, &accept, false).await
    }

    /// Creates a record from JSON text.
    ///
    /// # Errors
    ///
    /// See [`list_records`](Self::list_records).
    #[instrument(level = "debug", skip(self, json), fields(bytes = json.len()))]
    pub async fn submit_record(
        &self,
        app_uid: &str,
        form_id: &str,
        json: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        let url = self.form_url(app_uid, form_id);
        debug!(url = %url, json, "submitting record");
        self.send_json(&url, Method::POST, Some(json.to_string()))
            .await
    }

    /// Creates a record from a JSON value.
    ///
    /// # Errors
    ///
    /// See [`list_records`](Self::list_records).
    pub async fn submit_record_json(
        &self,
        app_uid: &str,
        form_id: &str,
        record: &Value,
    ) -> Result<ResultEnvelope, ApiError> {
        self.submit_record(app_uid, form_id, &record.to_string())
            .await
    }

    /// Creates a record from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the file cannot be read.
    pub async fn submit_record_file(
        &self,
        app_uid: &str,
        form_id: &str,
        path: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        let json = read_json_file(path).await?;
        self.submit_record(app_uid, form_id, &json).await
    }

    /// Replaces a record with JSON text.
    ///
    /// # Errors
    ///
    /// See [`list_records`](Self::list_records).
    #[instrument(level = "debug", skip(self, json), fields(bytes = json.len()))]
    pub async fn update_record(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        json: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        let url = format!("{}/{record_uid}", self.form_url(app_uid, form_id));
        debug!(url = %url, "REST URL");
        self.send_json(&url, Method::PUT, Some(json.to_string()))
            .await
    }

    /// Replaces a record with a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingParameter`] unless the object carries
    /// non-empty `pressedButton` and `flowState` strings.
    pub async fn update_record_json(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        record: &JsonObject,
    ) -> Result<ResultEnvelope, ApiError> {
        require(str_or_empty(record, PRESSED_BUTTON), "pressed_button", PRESSED_BUTTON_HINT)?;
        require(str_or_empty(record, FLOW_STATE), "flow_state", FLOW_STATE_HINT)?;

        let json = Value::Object(record.clone()).to_string();
        self.update_record(app_uid, form_id, record_uid, &json)
            .await
    }

    /// Replaces a record with the contents of a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the file cannot be read.
    pub async fn update_record_file(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        path: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        let json = read_json_file(path).await?;
        self.update_record(app_uid, form_id, record_uid, &json)
            .await
    }

    /// Retrieves a record, sets `items` and the workflow fields on it, and
    /// puts it back.
    ///
    /// A non-200 retrieval is returned as is and nothing is updated.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingParameter`] for an empty button or stage,
    /// and [`ApiError::UnexpectedShape`] if the record has no `items[0]`.
    #[instrument(skip(self, items))]
    pub async fn retrieve_and_update_record(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        pressed_button: &str,
        flow_state: &str,
        items: &[(&str, &str)],
    ) -> Result<ResultEnvelope, ApiError> {
        require(pressed_button, "pressed_button", PRESSED_BUTTON_HINT)?;
        require(flow_state, "flow_state", FLOW_STATE_HINT)?;

        let record = match self
            .retrieve_for_update(app_uid, form_id, record_uid, pressed_button, flow_state, items)
            .await?
        {
            Ok(record) => record,
            Err(envelope) => return Ok(envelope),
        };
        self.put_updated(app_uid, form_id, record_uid, &record)
            .await
    }

    /// [`retrieve_and_update_record`](Self::retrieve_and_update_record) that
    /// also uploads the file at `path` and binds it to `attach_field`.
    ///
    /// # Errors
    ///
    /// As for `retrieve_and_update_record`, plus [`ApiError::Io`] for a
    /// missing file and [`ApiError::UploadRejected`] if the upload does not
    /// return 200.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, items))]
    pub async fn retrieve_and_update_record_with_attachment(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        pressed_button: &str,
        flow_state: &str,
        items: &[(&str, &str)],
        attach_field: &str,
        media_type: &str,
        path: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        require(pressed_button, "pressed_button", PRESSED_BUTTON_HINT)?;
        require(flow_state, "flow_state", FLOW_STATE_HINT)?;
        require(attach_field, "attach_field", "name the attachment field to bind the upload to")?;

        let mut record = match self
            .retrieve_for_update(app_uid, form_id, record_uid, pressed_button, flow_state, items)
            .await?
        {
            Ok(record) => record,
            Err(envelope) => return Ok(envelope),
        };

        let upload = self
            .upload_attachment(app_uid, form_id, media_type, path)
            .await?;
        bind_attachment(&mut record, attach_field, &upload)?;
        self.put_updated(app_uid, form_id, record_uid, &record)
            .await
    }

    /// Uploads the file at `path`, binds it to `attach_field` in `json`, sets
    /// `pressedButton` and submits the record.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingParameter`] for an empty button,
    /// [`ApiError::MalformedBody`] if `json` is not an object,
    /// [`ApiError::Io`] for a missing file and [`ApiError::UploadRejected`]
    /// if the upload does not return 200.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, json))]
    pub async fn submit_record_with_attachment(
        &self,
        app_uid: &str,
        form_id: &str,
        json: &str,
        pressed_button: &str,
        attach_field: &str,
        media_type: &str,
        path: &Path,
    ) -> Result<ResultEnvelope, ApiError> {
        let record = prepare_submission(json, pressed_button)?;
        let upload = self
            .upload_attachment(app_uid, form_id, media_type, path)
            .await?;
        self.submit_bound(app_uid, form_id, record, attach_field, &upload)
            .await
    }

    /// [`submit_record_with_attachment`](Self::submit_record_with_attachment)
    /// reading the attachment from `reader`.
    ///
    /// # Errors
    ///
    /// As for `submit_record_with_attachment`, with [`ApiError::Upload`] for
    /// read failures.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, json, reader))]
    pub async fn submit_record_with_attachment_stream<R>(
        &self,
        app_uid: &str,
        form_id: &str,
        json: &str,
        pressed_button: &str,
        attach_field: &str,
        media_type: &str,
        file_name: &str,
        reader: R,
    ) -> Result<ResultEnvelope, ApiError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let record = prepare_submission(json, pressed_button)?;
        let upload = self
            .upload_attachment_stream(app_uid, form_id, media_type, file_name, reader)
            .await?;
        self.submit_bound(app_uid, form_id, record, attach_field, &upload)
            .await
    }

    /// Deletes one record.
    ///
    /// # Errors
    ///
    /// See [`list_records`](Self::list_records).
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_record(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        let url = format!("{}/{record_uid}", self.form_url(app_uid, form_id));
        debug!(url = %url, "REST URL");
        self.send_json(&url, Method::DELETE, None).await
    }

    /// Deletes every record matching `filters`, a page at a time.
    ///
    /// Each pass lists the same window and deletes what it returns, since
    /// deleted records drop out of the next listing. The loop ends on a
    /// short page or an empty later page. A full page is always listed
    /// again, even when none of its deletes succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ListFailed`] when a listing is not 200 and
    /// [`ApiError::NothingToDelete`] when the first listing is empty.
    /// Individual delete failures are recorded in the report instead.
    #[instrument(skip(self, filters))]
    pub async fn delete_records(
        &self,
        app_uid: &str,
        form_id: &str,
        filters: Option<&FilterSet>,
    ) -> Result<DeleteReport, ApiError> {
        let page_size = filters.map_or(DEFAULT_PAGE_SIZE, FilterSet::page_size);
        let mut report = DeleteReport::new(DeleteSubject::Records);
        let mut first_page = true;

        loop {
            let listing = self
                .list_records(app_uid, form_id, filters, ReturnFormat::Json)
                .await?;
            if listing.http_status != 200 {
                return Err(ApiError::ListFailed {
                    status: listing.http_status,
                    status_text: listing.status_text,
                });
            }

            let uids = match listing.json() {
                Some(body) => record_uids(body)?,
                None => Vec::new(),
            };
            if uids.is_empty() {
                if first_page {
                    return Err(ApiError::NothingToDelete {
                        status_text: listing.status_text,
                    });
                }
                break;
            }
            first_page = false;

            let mut deleted_this_page = 0usize;
            for uid in &uids {
                debug!(uid = %uid, "trying to delete record");
                let deleted = match self.delete_record(app_uid, form_id, uid).await {
                    Ok(envelope) => envelope.http_status == 200,
                    Err(e) => {
                        warn!(uid = %uid, error = %e, "delete request failed");
                        false
                    }
                };
                if deleted {
                    deleted_this_page += 1;
                } else {
                    warn!(uid = %uid, "failed to delete record");
                }
                report.record(uid.clone(), deleted);
            }

            if uids.len() < page_size as usize {
                break;
            }
            if deleted_this_page == 0 {
                warn!(page_size, "no record on a full page could be deleted");
            }
            debug!("getting the next page of records to delete");
        }

        info!(
            deleted = report.deleted_count(),
            failed = report.failed_count(),
            "bulk delete finished"
        );
        Ok(report)
    }

    /// Fetches the generated API description of a form.
    ///
    /// The session token is never sent with this request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingParameter`] for an empty app or form id.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_complete_json_for_form(
        &self,
        app_uid: &str,
        form_id: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        require(app_uid, "app_uid", "the application id is required")?;
        require(form_id, "form_id", "the form id is required")?;

        let url = format!("{}/swagger.json", self.form_url(app_uid, form_id));
        let accept = self.media_types().json.clone();
        self.get(&url, &accept, true).await
    }

    /// Builds an empty submission template for a form from its example
    /// record.
    ///
    /// # Errors
    ///
    /// As for [`get_complete_json_for_form`](Self::get_complete_json_for_form),
    /// plus [`ApiError::UnexpectedShape`] if the description has no
    /// `definitions.Entries.example.items[0]`.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_sample_json_for_form(
        &self,
        app_uid: &str,
        form_id: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        let mut envelope = self.get_complete_json_for_form(app_uid, form_id).await?;
        if !(200..300).contains(&envelope.http_status) {
            return Ok(envelope);
        }
        let Some(description) = envelope.take_json() else {
            return Ok(envelope);
        };

        let example = sample_record(description)?;
        envelope.body = crate::http::Body::Structured(example);
        Ok(envelope)
    }

    /// Retrieves a record and applies the update fields to `items[0]`.
    /// `Err` carries a non-200 retrieval for the caller to return.
    async fn retrieve_for_update(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        pressed_button: &str,
        flow_state: &str,
        items: &[(&str, &str)],
    ) -> Result<Result<JsonObject, ResultEnvelope>, ApiError> {
        let mut retrieved = self
            .retrieve_record(app_uid, form_id, record_uid, ReturnFormat::Json)
            .await?;
        if retrieved.http_status != 200 {
            return Ok(Err(retrieved));
        }
        let body = retrieved
            .take_json()
            .ok_or_else(|| ApiError::unexpected_shape("items", "object"))?;
        let mut record = json::take_first_item(body)?;

        for (key, value) in items {
            debug!(key, value, "updating record field");
            record.insert((*key).to_string(), Value::from(*value));
        }
        record.insert(PRESSED_BUTTON.to_string(), Value::from(pressed_button));
        record.insert(FLOW_STATE.to_string(), Value::from(flow_state));
        Ok(Ok(record))
    }

    async fn put_updated(
        &self,
        app_uid: &str,
        form_id: &str,
        record_uid: &str,
        record: &JsonObject,
    ) -> Result<ResultEnvelope, ApiError> {
        let updated = self
            .update_record_json(app_uid, form_id, record_uid, record)
            .await?;
        if let Some(body) = updated.json().filter(|_| updated.http_status == 200) {
            info!(
                uid = ?body.get("uid"),
                id = ?body.get("id"),
                stage = ?body.get(FLOW_STATE),
                "record updated"
            );
        }
        Ok(updated)
    }

    async fn submit_bound(
        &self,
        app_uid: &str,
        form_id: &str,
        mut record: JsonObject,
        attach_field: &str,
        upload: &ResultEnvelope,
    ) -> Result<ResultEnvelope, ApiError> {
        bind_attachment(&mut record, attach_field, upload)?;
        let submitted = self
            .submit_record(app_uid, form_id, &Value::Object(record).to_string())
            .await?;
        if let Some(body) = submitted.json().filter(|_| submitted.is_successful()) {
            info!(
                uid = ?body.get("uid"),
                id = ?body.get("id"),
                stage = ?body.get(FLOW_STATE),
                "record created"
            );
        }
        Ok(submitted)
    }
}

fn str_or_empty<'a>(record: &'a JsonObject, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or_default()
}

async fn read_json_file(path: &Path) -> Result<String, ApiError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ApiError::io(path, e))
}

fn prepare_submission(json: &str, pressed_button: &str) -> Result<JsonObject, ApiError> {
    require(pressed_button, "pressed_button", PRESSED_BUTTON_HINT)?;
    let mut record = json::parse_object("record JSON", json)?;
    debug!(pressed_button, "adding property to JSON");
    record.insert(PRESSED_BUTTON.to_string(), Value::from(pressed_button));
    Ok(record)
}

/// Copies `uid`, `id` and `fileName` of an accepted upload into the
/// attachment field of `record`, creating the field if needed.
fn bind_attachment(
    record: &mut JsonObject,
    attach_field: &str,
    upload: &ResultEnvelope,
) -> Result<(), ApiError> {
    if upload.http_status != 200 {
        return Err(ApiError::UploadRejected {
            status: upload.http_status,
            status_text: upload.status_text.clone(),
        });
    }
    let uploaded = upload
        .json()
        .ok_or_else(|| ApiError::unexpected_shape("attachment", "object"))?;
    debug!(
        id = ?uploaded.get("id"),
        uid = ?uploaded.get("uid"),
        file_name = ?uploaded.get("fileName"),
        "attachment uploaded"
    );

    let slot = record
        .entry(attach_field.to_string())
        .or_insert_with(|| Value::Object(JsonObject::new()));
    if !slot.is_object() {
        *slot = Value::Object(JsonObject::new());
    }
    let field = json::object_field_mut(record, attach_field)?;
    for key in ["uid", "id", "fileName"] {
        field.insert(
            key.to_string(),
            uploaded.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    Ok(())
}

fn record_uids(listing: &JsonObject) -> Result<Vec<String>, ApiError> {
    json::array_field(listing, "items")?
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| ApiError::unexpected_shape("items[]", "object"))
                .and_then(|record| json::str_field(record, "uid"))
                .map(str::to_string)
        })
        .collect()
}

fn sample_record(mut description: JsonObject) -> Result<JsonObject, ApiError> {
    let example = json::object_field_mut(&mut description, "definitions")
        .and_then(|d| json::object_field_mut(d, "Entries"))
        .and_then(|e| json::object_field_mut(e, "example"))?;
    let example = std::mem::take(example);
    let mut record = json::take_first_item(example)?;
    json::clear_values(&mut record);
    Ok(record)
}
