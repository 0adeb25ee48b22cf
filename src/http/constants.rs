//! Media types and timeouts for the connection layer.

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (5 minutes, archives can be large).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Query parameter and cookie name carrying the session token.
pub const SESSION_TOKEN_NAME: &str = "freedomIdentifyKey";

/// Media types the connector sends and the dispatcher routes on.
///
/// Owned by the [`Connector`](super::Connector) so a deployment with
/// different vendor types can swap the table without touching call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypes {
    pub json: String,
    pub atom: String,
    pub text: String,
    pub multipart: String,
    /// Declared for every multipart part.
    pub octet_stream: String,
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self {
            json: "application/json".to_string(),
            atom: "application/atom+xml".to_string(),
            text: "text/plain".to_string(),
            multipart: "multipart/form-data".to_string(),
            octet_stream: "application/octet-stream".to_string(),
        }
    }
}

/// Representation requested through `Accept` for record reads.
///
/// Listing supports all four; single-record retrieval supports JSON and XML.
/// Spreadsheet formats come back as [`Body::Raw`](super::Body::Raw).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnFormat {
    #[default]
    Json,
    Xml,
    MsExcel,
    OpenDoc,
}

impl ReturnFormat {
    /// The `Accept` header value.
    #[must_use]
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/atom+xml",
            Self::MsExcel => "application/x-msexcel",
            Self::OpenDoc => "application/vnd.oasis.opendocument.spreadsheet",
        }
    }
}

impl std::str::FromStr for ReturnFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "xml" | "atom" => Ok(Self::Xml),
            "excel" | "ms-excel" | "xls" => Ok(Self::MsExcel),
            "opendoc" | "ods" => Ok(Self::OpenDoc),
            other => Err(format!("unknown return format '{other}' (json, xml, excel, ods)")),
        }
    }
}
