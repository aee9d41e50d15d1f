use serde::{Deserialize, Serialize};

/// JSON request body for `POST /export`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// A missing field is treated as an empty list.
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

/// Response body for `POST /export`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub export_url: String,
    pub count: usize,
}

/// Query string of a signed manifest link.
#[derive(Deserialize, Debug)]
pub struct LinkQuery {
    pub expires: i64,
    pub signature: String,
}

/// Simple error body returned on every non-2xx response.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
