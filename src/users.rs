use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::http::ApiClient;
use crate::models::{Role, UserProfile};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Deserialize)]
#[serde(untagged)]
enum UserListPayload {
    Wrapped { users: Vec<UserProfile> },
    Bare(Vec<UserProfile>),
}

impl UserListPayload {
    fn into_vec(self) -> Vec<UserProfile> {
        match self {
            UserListPayload::Wrapped { users } => users,
            UserListPayload::Bare(users) => users,
        }
    }
}

/// A new account, validated locally before any request goes out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Partial account update. Absent fields stay untouched server-side.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Admin-only directory listing. Avatars come back resolved against the
/// API origin like every other profile in the client.
pub async fn list(client: &ApiClient) -> ApiResult<Vec<UserProfile>> {
    let origin = client.origin();
    client
        .get_json::<UserListPayload>("/users")
        .await
        .map(|payload| {
            payload
                .into_vec()
                .into_iter()
                .map(|user| user.normalize_avatar(&origin))
                .collect()
        })
}

pub async fn create(client: &ApiClient, user: &NewUser) -> ApiResult<UserProfile> {
    validate_new_user(user)?;
    let origin = client.origin();
    client
        .post_json::<UserProfile, _>("/users", user)
        .await
        .map(|created| created.normalize_avatar(&origin))
}

pub async fn update(client: &ApiClient, id: &str, changes: &UserUpdate) -> ApiResult<UserProfile> {
    let origin = client.origin();
    client
        .patch_json::<UserProfile, _>(&format!("/users/{id}"), changes)
        .await
        .map(|updated| updated.normalize_avatar(&origin))
}

pub async fn remove(client: &ApiClient, id: &str) -> ApiResult<()> {
    client.delete(&format!("/users/{id}")).await
}

/// Field-level checks mirroring what the account form highlights. Failing
/// here means no request is made at all.
pub fn validate_new_user(user: &NewUser) -> Result<(), ApiError> {
    let mut fields = HashMap::new();

    if user.user_id.trim().is_empty() {
        fields.insert("userId".to_string(), "User ID is required.".to_string());
    }
    if user.name.trim().is_empty() {
        fields.insert("name".to_string(), "Name is required.".to_string());
    }
    let email = user.email.trim();
    if email.is_empty() {
        fields.insert("email".to_string(), "Email is required.".to_string());
    } else if !looks_like_email(email) {
        fields.insert("email".to_string(), "Enter a valid email address.".to_string());
    }
    if user.password.len() < MIN_PASSWORD_LEN {
        fields.insert(
            "password".to_string(),
            format!("Password must be at least {MIN_PASSWORD_LEN} characters."),
        );
    }
    if matches!(user.role, Role::Other(_)) {
        fields.insert("role".to_string(), "Choose a valid role.".to_string());
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(fields))
    }
}

fn looks_like_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.split_once('.') {
        Some((host, rest)) => !host.is_empty() && !rest.is_empty() && !rest.ends_with('.'),
        None => false,
    }
}
