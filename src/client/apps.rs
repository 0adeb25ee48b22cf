//! Application lifecycle: export, import, upgrade, start, stop, delete and
//! listing.

use std::path::Path;

use reqwest::Method;
use reqwest::header::ACCEPT;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument, warn};

use super::attachments::{file_name_of, save_response};
use super::{DeleteReport, DeleteSubject, FormsClient, require};
use crate::error::ApiError;
use crate::http::{AttachmentStream, Body, ResultEnvelope, UploadTarget, dispatch, status_text, write_multipart};
use crate::json;
use crate::query::{SortOrder, add_url_param};

/// File extension of an exported application archive.
pub const ARCHIVE_EXTENSION: &str = "nitro_s";

/// Where an uploaded archive goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    /// Create a new application.
    Import {
        deploy: bool,
        include_data: bool,
        remove_previous_ids: bool,
    },
    /// Replace an existing application, upgrading its database.
    Upgrade { app_uid: String, include_data: bool },
}

impl ArchiveTarget {
    /// Upload URL under the application base `app_base`.
    #[must_use]
    pub fn url(&self, app_base: &str) -> String {
        match self {
            Self::Import {
                deploy,
                include_data,
                remove_previous_ids,
            } => {
                let mut url = format!("{app_base}?deploy={deploy}");
                if *include_data {
                    url.push_str("&importData=true&importAllForms=true");
                }
                url.push_str(&format!("&cleanIds={remove_previous_ids}"));
                url
            }
            Self::Upgrade {
                app_uid,
                include_data,
            } => {
                let mut url = format!(
                    "{app_base}/{app_uid}/archive?replaceEmbeddedData=on&runDatabaseUpgradeNow=on"
                );
                if *include_data {
                    url.push_str("&replaceSubmittedData=on");
                }
                url
            }
        }
    }
}

impl FormsClient {
    fn app_url(&self, app_uid: &str) -> String {
        format!("{}/{app_uid}", self.config().app_url_base())
    }

    fn archive_url(&self, app_uid: &str, include_data: bool) -> String {
        format!(
            "{}/archive?mode=source&submitted={include_data}",
            self.app_url(app_uid)
        )
    }

    /// Exports an application to `<dir>/<app_uid>.nitro_s`.
    ///
    /// The archive is written only for a 200/201 response; the returned
    /// envelope carries the status and no body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if `dir` is not an existing directory or the
    /// archive cannot be written.
    #[instrument(skip(self))]
    pub async fn export_application_to_path(
        &self,
        app_uid: &str,
        dir: &Path,
        include_data: bool,
    ) -> Result<ResultEnvelope, ApiError> {
        let metadata = tokio::fs::metadata(dir)
            .await
            .map_err(|e| ApiError::io(dir, e))?;
        if !metadata.is_dir() {
            return Err(ApiError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "path is not a directory"),
            ));
        }

        let url = self.archive_url(app_uid, include_data);
        debug!(url = %url, "exporting");
        let response = self.connector.open(&url, Method::GET, &[], false)?.send().await?;

        let file_path = dir.join(format!("{app_uid}.{ARCHIVE_EXTENSION}"));
        let envelope = save_response(response, &file_path).await?;
        if envelope.is_successful() {
            info!(path = %file_path.display(), "application exported");
        }
        Ok(envelope)
    }

    /// Opens an application export for streaming.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connection`] on transport failure.
    #[instrument(level = "debug", skip(self))]
    pub async fn export_application_stream(
        &self,
        app_uid: &str,
        include_data: bool,
    ) -> Result<AttachmentStream, ApiError> {
        let url = self.archive_url(app_uid, include_data);
        debug!(url = %url, "exporting");
        let response = self.connector.open(&url, Method::GET, &[], false)?.send().await?;
        Ok(AttachmentStream::new(response))
    }

    /// Deletes one application.
    ///
    /// # Errors
    ///
    /// Returns transport errors; the status is in the envelope.
    #[instrument(skip(self))]
    pub async fn delete_application(&self, app_uid: &str) -> Result<ResultEnvelope, ApiError> {
        let url = self.app_url(app_uid);
        debug!(url = %url, "deleting");
        let response = self.connector.open(&url, Method::DELETE, &[], false)?.send().await?;
        dispatch(response, self.media_types()).await
    }

    /// Deletes each application in turn. Empty ids are skipped.
    ///
    /// # Errors
    ///
    /// Stops at the first transport error.
    #[instrument(skip(self), fields(count = app_uids.len()))]
    pub async fn delete_applications(&self, app_uids: &[&str]) -> Result<DeleteReport, ApiError> {
        let mut report = DeleteReport::new(DeleteSubject::Applications);
        for app_uid in app_uids.iter().filter(|uid| !uid.is_empty()) {
            let envelope = self.delete_application(app_uid).await?;
            let deleted = envelope.http_status == 200;
            if !deleted {
                warn!(app_uid, status = envelope.http_status, "failed to delete application");
            }
            report.record(*app_uid, deleted);
        }
        info!(
            deleted = report.deleted_count(),
            failed = report.failed_count(),
            "application delete finished"
        );
        Ok(report)
    }

    /// Imports the archive at `path`, optionally tagging the new application.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the archive cannot be opened, plus the
    /// errors of [`import_application_stream`](Self::import_application_stream).
    #[instrument(skip(self))]
    pub async fn import_application(
        &self,
        path: &Path,
        deploy: bool,
        include_data: bool,
        remove_previous_ids: bool,
        tags: Option<&str>,
    ) -> Result<ResultEnvelope, ApiError> {
        let file = File::open(path).await.map_err(|e| ApiError::io(path, e))?;
        self.import_application_stream(
            file,
            &file_name_of(path),
            deploy,
            include_data,
            remove_previous_ids,
            tags,
        )
        .await
    }

    /// Imports an archive read from `reader` under the name `app_name`.
    ///
    /// When the import returns 200 and `tags` is non-empty, the new
    /// application is tagged with one follow-up request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedBody`] if the response does not hold a
    /// JSON object and [`ApiError::TagAssignmentFailed`] if tagging fails.
    /// A failed tag request does not undo the import.
    #[instrument(skip(self, reader))]
    pub async fn import_application_stream<R>(
        &self,
        reader: R,
        app_name: &str,
        deploy: bool,
        include_data: bool,
        remove_previous_ids: bool,
        tags: Option<&str>,
    ) -> Result<ResultEnvelope, ApiError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let target = ArchiveTarget::Import {
            deploy,
            include_data,
            remove_previous_ids,
        };
        self.install_archive(&target, reader, app_name, tags).await
    }

    /// Upgrades application `app_uid` from the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Io`] if the archive cannot be opened.
    #[instrument(skip(self))]
    pub async fn upgrade_application(
        &self,
        path: &Path,
        include_data: bool,
        app_uid: &str,
    ) -> Result<ResultEnvelope, ApiError> {
        require(app_uid, "app_uid", "the application id to upgrade is required")?;
        let file = File::open(path).await.map_err(|e| ApiError::io(path, e))?;
        let target = ArchiveTarget::Upgrade {
            app_uid: app_uid.to_string(),
            include_data,
        };
        self.install_archive(&target, file, &file_name_of(path), None)
            .await
    }

    /// Upgrades application `app_uid` from an archive read from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedBody`] if the response does not hold a
    /// JSON object.
    #[instrument(skip(self, reader))]
    pub async fn upgrade_application_stream<R>(
        &self,
        reader: R,
        include_data: bool,
        app_uid: &str,
    ) -> Result<ResultEnvelope, ApiError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        require(app_uid, "app_uid", "the application id to upgrade is required")?;
        let target = ArchiveTarget::Upgrade {
            app_uid: app_uid.to_string(),
            include_data,
        };
        self.install_archive(&target, reader, "", None).await
    }

    /// Lists the applications visible to the current user, as an Atom feed.
    ///
    /// # Errors
    ///
    /// Returns transport and body errors.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_apps_for_user(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
        sort_by: Option<&str>,
        order: Option<SortOrder>,
    ) -> Result<ResultEnvelope, ApiError> {
        let base = format!("{}myapps", self.config().org_url_base());
        let url = app_list_url(&base, page, page_size, sort_by, order);
        debug!(url = %url, "REST URL");
        let accept = self.media_types().atom.clone();
        self.get(&url, &accept, false).await
    }

    /// Lists every application on the server. Requires the administrator
    /// role.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAdministrator`] when the server answers 404.
    #[instrument(level = "debug", skip(self))]
    pub async fn admin_list_apps(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
        sort_by: Option<&str>,
        order: Option<SortOrder>,
    ) -> Result<ResultEnvelope, ApiError> {
        let base = format!("{}apps", self.config().admin_url_base());
        let url = app_list_url(&base, page, page_size, sort_by, order);
        debug!(url = %url, "REST URL");
        let accept = self.media_types().json.clone();
        let envelope = self.get(&url, &accept, false).await?;
        if envelope.http_status == 404 {
            return Err(ApiError::NotAdministrator);
        }
        Ok(envelope)
    }

    /// Starts (deploys) an application.
    ///
    /// # Errors
    ///
    /// Returns transport and body errors.
    #[instrument(skip(self))]
    pub async fn start_application(&self, app_uid: &str) -> Result<ResultEnvelope, ApiError> {
        info!(app_uid, "starting application");
        self.set_deploy_status(app_uid, true).await
    }

    /// Stops (undeploys) an application.
    ///
    /// # Errors
    ///
    /// Returns transport and body errors.
    #[instrument(skip(self))]
    pub async fn stop_application(&self, app_uid: &str) -> Result<ResultEnvelope, ApiError> {
        info!(app_uid, "stopping application");
        self.set_deploy_status(app_uid, false).await
    }

    async fn set_deploy_status(
        &self,
        app_uid: &str,
        started: bool,
    ) -> Result<ResultEnvelope, ApiError> {
        let media_types = self.media_types();
        let url = format!("{}/deployed/latest", self.app_url(app_uid));
        debug!(url = %url, "REST URL");
        let response = self
            .connector
            .open(&url, Method::PUT, &[(ACCEPT.as_str(), media_types.atom.as_str())], false)?
            .write_body(&media_types.atom, deploy_settings_entry(started))?
            .send()
            .await?;
        dispatch(response, media_types).await
    }

    async fn install_archive<R>(
        &self,
        target: &ArchiveTarget,
        reader: R,
        app_name: &str,
        tags: Option<&str>,
    ) -> Result<ResultEnvelope, ApiError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let media_types = self.media_types();
        let url = target.url(&self.config().app_url_base());
        debug!(url = %url, "REST URL");

        let connection = self.connector.open(&url, Method::POST, &[], false)?;
        let upload = UploadTarget::new(app_name, app_name, &media_types.multipart, reader);
        let response = write_multipart(connection, upload, media_types)?
            .send()
            .await?;

        let status = response.status();
        let mut envelope =
            ResultEnvelope::status_only(status.as_u16(), status_text(status));
        info!(status = envelope.http_status, status_text = %envelope.status_text, "archive upload answered");

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::response(url.clone(), e))?;
        if !envelope.is_successful() || text.trim().is_empty() {
            return Ok(envelope);
        }
        let imported = json::parse_object(&url, &json::unwrap_textarea(&text))?;

        let tags = tags.filter(|t| !t.is_empty());
        if let (200, Some(tags)) = (envelope.http_status, tags) {
            match imported.get("id").and_then(|id| id.as_str()) {
                Some(app_id) => {
                    info!(app_id, "imported application");
                    self.assign_tags(app_id, tags).await?;
                }
                None => warn!("import response has no application id, tags not assigned"),
            }
        }

        envelope.body = Body::Structured(imported);
        Ok(envelope)
    }

    async fn assign_tags(&self, app_id: &str, tags: &str) -> Result<(), ApiError> {
        let url = format!("{}/tags", self.app_url(app_id));
        debug!(url = %url, tags, "adding tags to the imported application");
        let response = self
            .connector
            .open(&url, Method::PUT, &[], false)?
            .write_body(&self.media_types().text, tags.to_string())?
            .send()
            .await
            .map_err(|e| ApiError::tag_assignment(app_id, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "tag response");
        if !status.is_success() {
            return Err(ApiError::tag_assignment(
                app_id,
                format!("HTTP {status}"),
            ));
        }
        Ok(())
    }
}

fn app_list_url(
    base: &str,
    page: Option<u32>,
    page_size: Option<u32>,
    sort_by: Option<&str>,
    order: Option<SortOrder>,
) -> String {
    let mut url = base.to_string();
    if let Some(page) = page {
        url = add_url_param(&url, &format!("page={page}"));
    }
    if let Some(page_size) = page_size {
        url = add_url_param(&url, &format!("pageSize={page_size}"));
    }
    if let Some(sort_by) = sort_by.filter(|s| !s.is_empty()) {
        url = add_url_param(&url, &format!("sortBy={sort_by}"));
    }
    if let Some(order) = order {
        url = add_url_param(&url, &format!("order={}", order.as_str()));
    }
    url
}

/// Atom entry toggling the deployed state of an application.
fn deploy_settings_entry(started: bool) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n\
         <a:entry xmlns:a=\"http://www.w3.org/2005/Atom\">\r\n\
         \x20 <a:content type=\"application/xml\">\r\n\
         \x20   <deploySettings>\r\n\
         \x20     <deployStatus started=\"{started}\" deployed=\"{started}\" sync=\"false\"></deployStatus>\r\n\
         \x20   </deploySettings>\r\n\
         \x20 </a:content>\r\n\
         </a:entry>"
    )
}
