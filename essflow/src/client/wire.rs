//! Request and response bodies of the ERP integration resource.
//!
//! Serialized names are the ERP's PascalCase names. Responses also accept
//! the snake_case field names as aliases.

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

use crate::core::{parse_submission_time, JobRequest, JobStatus, JobSummary, RequestStatus};

pub(crate) const SUBMIT_OPERATION: &str = "submitESSJobRequest";
pub(crate) const UPLOAD_OPERATION: &str = "uploadFileToUCM";

/// Request id the scheduler returns when it did not create a request.
pub(crate) const PLACEHOLDER_REQUEST_ID: &str = "-1";

const REPORT_SERVICE_NS: &str = "http://xmlns.oracle.com/oxp/service/v2";

static REPORT_BYTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?reportBytes>(.*?)</(?:[A-Za-z0-9_]+:)?reportBytes>")
        .expect("reportBytes pattern is valid")
});

/// Accepts a string or a number and yields its text.
fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequest<'a> {
    #[serde(rename = "OperationName")]
    pub operation_name: &'static str,
    #[serde(rename = "JobPackageName")]
    pub package_name: &'a str,
    #[serde(rename = "JobDefName")]
    pub definition_name: &'a str,
    #[serde(rename = "ESSParameters")]
    pub parameter_string: String,
}

impl<'a> SubmitRequest<'a> {
    pub(crate) fn new(request: &'a JobRequest) -> Self {
        Self {
            operation_name: SUBMIT_OPERATION,
            package_name: &request.package_name,
            definition_name: &request.definition_name,
            parameter_string: request.parameter_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(
        rename = "ReqstId",
        alias = "request_id",
        default,
        deserialize_with = "opt_string"
    )]
    pub request_id: Option<String>,
}

impl SubmitResponse {
    /// The assigned request id, unless missing, blank or the placeholder.
    pub(crate) fn assigned_id(&self) -> Option<&str> {
        self.request_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != PLACEHOLDER_REQUEST_ID)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadRequest<'a> {
    #[serde(rename = "OperationName")]
    pub operation_name: &'static str,
    #[serde(rename = "DocumentContent")]
    pub content: String,
    #[serde(rename = "DocumentAccount")]
    pub account: &'a str,
    #[serde(rename = "ContentType")]
    pub content_type: &'a str,
    #[serde(rename = "FileName")]
    pub file_name: &'a str,
    #[serde(rename = "DocumentId")]
    pub document_id: Option<String>,
}

impl<'a> UploadRequest<'a> {
    pub(crate) fn new(
        content: &[u8],
        account: &'a str,
        content_type: &'a str,
        file_name: &'a str,
    ) -> Self {
        Self {
            operation_name: UPLOAD_OPERATION,
            content: STANDARD.encode(content),
            account,
            content_type,
            file_name,
            document_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    #[serde(
        rename = "DocumentId",
        alias = "document_id",
        default,
        deserialize_with = "opt_string"
    )]
    pub document_id: Option<String>,
}

/// Envelope of every list query.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// One row of a status or listing query.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobItem {
    #[serde(
        rename = "ReqstId",
        alias = "request_id",
        alias = "id",
        default,
        deserialize_with = "opt_string"
    )]
    pub request_id: Option<String>,
    #[serde(rename = "JobName", alias = "name", default)]
    pub job_name: Option<String>,
    #[serde(rename = "RequestStatus", alias = "status", default)]
    pub status: Option<String>,
    #[serde(rename = "SubmissionDate", alias = "submission_time", default)]
    pub submission_date: Option<String>,
    #[serde(rename = "Phase", alias = "phase", default)]
    pub phase: Option<String>,
    #[serde(rename = "State", alias = "state", default)]
    pub state: Option<String>,
}

impl JobItem {
    /// Status observation for `request_id`, keeping the raw item.
    pub(crate) fn into_status(self, request_id: &str, raw: serde_json::Value) -> JobStatus {
        let status = self
            .status
            .as_deref()
            .map_or(RequestStatus::Unknown, RequestStatus::parse);
        JobStatus::new(self.request_id.unwrap_or_else(|| request_id.to_string()), status)
            .with_phase(self.phase.unwrap_or_default())
            .with_state(self.state.unwrap_or_default())
            .with_payload(raw)
    }

    /// Listing row, or `None` when the item has no request id.
    pub(crate) fn into_summary(self) -> Option<JobSummary> {
        let id = self.request_id.filter(|id| !id.trim().is_empty())?;
        let status = self
            .status
            .as_deref()
            .map_or(RequestStatus::Unknown, RequestStatus::parse);
        let submitted_at = self
            .submission_date
            .as_deref()
            .and_then(|raw| parse_submission_time(raw).ok());
        Some(JobSummary::new(
            id,
            self.job_name.unwrap_or_default(),
            status,
            submitted_at,
        ))
    }
}

/// One file of an execution-details query.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DocumentItem {
    #[serde(rename = "DocumentContent", alias = "document_content", default)]
    pub content: Option<String>,
}

/// Decodes base64 content, tolerating embedded whitespace.
pub(crate) fn decode_document(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}

/// SOAP `runReport` call for the legacy child-lookup report.
pub(crate) fn run_report_envelope(
    username: &str,
    password: &str,
    report_path: &str,
    parent_request_id: &str,
) -> String {
    format!(
        r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" xmlns:v2="{ns}">
  <soap:Header/>
  <soap:Body>
    <v2:runReport>
      <v2:reportRequest>
        <v2:attributeFormat>csv</v2:attributeFormat>
        <v2:byPassCache>true</v2:byPassCache>
        <v2:flattenXML>false</v2:flattenXML>
        <v2:parameterNameValues>
          <v2:listOfParamNameValues>
            <v2:item>
              <v2:name>REQUESTID</v2:name>
              <v2:values>
                <v2:item>{parent}</v2:item>
              </v2:values>
            </v2:item>
          </v2:listOfParamNameValues>
        </v2:parameterNameValues>
        <v2:reportAbsolutePath>{path}</v2:reportAbsolutePath>
        <v2:sizeOfDataChunkDownload>-1</v2:sizeOfDataChunkDownload>
      </v2:reportRequest>
      <v2:userID>{user}</v2:userID>
      <v2:password>{pass}</v2:password>
    </v2:runReport>
  </soap:Body>
</soap:Envelope>"#,
        ns = REPORT_SERVICE_NS,
        parent = xml_escape(parent_request_id),
        path = xml_escape(report_path),
        user = xml_escape(username),
        pass = xml_escape(password),
    )
}

/// Extracts the child request id from a `runReport` response.
///
/// The report output is a base64 CSV whose first data row starts with the
/// child request id; a header row is skipped. `Ok(None)` means the report ran
/// but listed no child.
pub(crate) fn parse_run_report(body: &str) -> Result<Option<String>, String> {
    let captures = REPORT_BYTES
        .captures(body)
        .ok_or_else(|| "response has no reportBytes element".to_string())?;
    let encoded = captures.get(1).map_or("", |m| m.as_str());
    let bytes = decode_document(encoded).map_err(|e| format!("reportBytes is not base64: {e}"))?;
    let csv = String::from_utf8_lossy(&bytes);

    Ok(csv
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(|cell| cell.trim().trim_matches('"').trim())
        .find(|cell| !cell.is_empty() && cell.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string))
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
