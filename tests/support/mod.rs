//! Shared helpers for the integration tests: clients pointed at a wiremock
//! server, and a responder that serves a paged record listing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use forms_client::{ConnectionConfig, FormsClient};
use serde_json::json;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// Web context used by every test client.
pub const CONTEXT: &str = "forms";

/// Path prefix of the record endpoints.
pub const DATA_PATH: &str = "/forms/secure/org/data";

/// Path prefix of the application endpoints.
pub const APP_PATH: &str = "/forms/secure/org/app";

/// `Basic` credentials for `admin:secret`.
pub const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

pub fn config_for(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig::new(&server.uri(), "admin", "secret")
        .expect("valid config")
        .with_context(CONTEXT)
}

pub fn client_for(server: &MockServer) -> FormsClient {
    FormsClient::new(config_for(server)).expect("client builds")
}

pub fn client_with_token(server: &MockServer, token: &str) -> FormsClient {
    FormsClient::new(config_for(server).with_session_token(token)).expect("client builds")
}

/// Serves one page of records per call, sized by `pages`. Calls past the
/// end get an empty page.
pub struct PagedListing {
    pages: Vec<usize>,
    calls: AtomicUsize,
}

impl PagedListing {
    pub fn new(pages: &[usize]) -> Self {
        Self {
            pages: pages.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for PagedListing {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let size = self.pages.get(call).copied().unwrap_or(0);
        let items: Vec<_> = (0..size)
            .map(|i| json!({"uid": format!("rec-{call}-{i}"), "F_Name": "x"}))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "items": items,
            "recordCount": size,
        }))
    }
}
