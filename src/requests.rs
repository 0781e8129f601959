use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::http::ApiClient;
use crate::models::BorrowRequest;

#[derive(Deserialize)]
#[serde(untagged)]
enum RequestListPayload {
    Wrapped { requests: Vec<BorrowRequest> },
    Bare(Vec<BorrowRequest>),
}

impl RequestListPayload {
    fn into_vec(self) -> Vec<BorrowRequest> {
        match self {
            RequestListPayload::Wrapped { requests } => requests,
            RequestListPayload::Bare(requests) => requests,
        }
    }
}

/// A new borrow request for a document in the library.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBorrowRequest {
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The backend scopes the list by the caller's token: requesters see their
/// own, reviewers see everything.
pub async fn list(client: &ApiClient) -> ApiResult<Vec<BorrowRequest>> {
    client
        .get_json::<RequestListPayload>("/requests")
        .await
        .map(RequestListPayload::into_vec)
}

pub async fn create(client: &ApiClient, request: &NewBorrowRequest) -> ApiResult<BorrowRequest> {
    client.post_json("/requests", request).await
}

pub async fn approve(client: &ApiClient, id: &str) -> ApiResult<()> {
    client.patch_empty(&format!("/requests/{id}/approve")).await
}

pub async fn decline(client: &ApiClient, id: &str) -> ApiResult<()> {
    client.patch_empty(&format!("/requests/{id}/decline")).await
}
