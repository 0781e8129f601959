use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::http::ApiClient;
use crate::models::{Category, FileRecord};
use crate::preview::DocumentPreview;

const FALLBACK_DOWNLOAD_NAME: &str = "download.bin";

/// Some deployments wrap list responses in an object, some send the array
/// bare. Accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum FileListPayload {
    Wrapped { files: Vec<FileRecord> },
    Bare(Vec<FileRecord>),
}

impl FileListPayload {
    fn into_vec(self) -> Vec<FileRecord> {
        match self {
            FileListPayload::Wrapped { files } => files,
            FileListPayload::Bare(files) => files,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryListPayload {
    Wrapped { categories: Vec<Category> },
    Bare(Vec<Category>),
}

impl CategoryListPayload {
    fn into_vec(self) -> Vec<Category> {
        match self {
            CategoryListPayload::Wrapped { categories } => categories,
            CategoryListPayload::Bare(categories) => categories,
        }
    }
}

/// Descriptor for a new library upload.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl NewFile {
    /// Load a document from disk, deriving the upload filename from the
    /// path.
    pub fn from_path(path: impl AsRef<Path>, title: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("unable to derive filename from {:?}", path))?;
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
        Ok(Self {
            title: title.into(),
            description: None,
            category: None,
            file_name: file_name.to_string(),
            bytes,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Partial update for file metadata. Absent fields are left untouched
/// server-side.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

pub async fn list(client: &ApiClient) -> ApiResult<Vec<FileRecord>> {
    client
        .get_json::<FileListPayload>("/files")
        .await
        .map(FileListPayload::into_vec)
}

pub async fn search(client: &ApiClient, query: &str) -> ApiResult<Vec<FileRecord>> {
    client
        .get_json_query::<FileListPayload>("/files/search", &[("q", query)])
        .await
        .map(FileListPayload::into_vec)
}

pub async fn get(client: &ApiClient, id: &str) -> ApiResult<FileRecord> {
    client.get_json(&format!("/files/{id}")).await
}

/// Upload a document with its metadata as one multipart request.
pub async fn upload(client: &ApiClient, file: NewFile) -> ApiResult<FileRecord> {
    let content_type = content_type_for(&file.file_name);
    let part = Part::bytes(file.bytes)
        .file_name(file.file_name.clone())
        .mime_str(content_type)
        .map_err(|err| {
            warn!(?err, content_type, "rejected upload content type");
            ApiError::local("Unsupported upload content type.")
        })?;

    let mut form = Form::new().text("title", file.title).part("file", part);
    if let Some(description) = file.description {
        form = form.text("description", description);
    }
    if let Some(category) = file.category {
        form = form.text("category", category);
    }
    client.post_multipart("/files", form).await
}

pub async fn update(client: &ApiClient, id: &str, changes: &FileUpdate) -> ApiResult<FileRecord> {
    client.patch_json(&format!("/files/{id}"), changes).await
}

pub async fn delete(client: &ApiClient, id: &str) -> ApiResult<()> {
    client.delete(&format!("/files/{id}")).await
}

/// Download a document into `dest_dir`, named by the sanitized server
/// filename, falling back to the file id.
pub async fn download_to(client: &ApiClient, id: &str, dest_dir: &Path) -> ApiResult<PathBuf> {
    let payload = client.get_binary(&format!("/files/{id}/download")).await?;
    let name = safe_file_name(payload.file_name.as_deref(), id);

    fs::create_dir_all(dest_dir).await.map_err(|err| {
        warn!(?err, dir = %dest_dir.display(), "failed to create download directory");
        ApiError::local("Failed to prepare the download directory.")
    })?;
    let path = dest_dir.join(name);
    fs::write(&path, &payload.bytes).await.map_err(|err| {
        warn!(?err, path = %path.display(), "failed to write download");
        ApiError::local("Failed to write the download to disk.")
    })?;
    Ok(path)
}

/// Stage a document on disk for an external viewer. The caller owns the
/// returned preview and its lifetime.
pub async fn open_preview(client: &ApiClient, id: &str) -> ApiResult<DocumentPreview> {
    let payload = client.get_binary(&format!("/files/{id}/download")).await?;
    let staging = client.config().state_dir.join("previews");
    DocumentPreview::create(&staging, payload).map_err(|err| {
        warn!(?err, "failed to stage preview");
        ApiError::local("Failed to stage the document preview.")
    })
}

pub async fn categories(client: &ApiClient) -> ApiResult<Vec<Category>> {
    client
        .get_json::<CategoryListPayload>("/categories")
        .await
        .map(CategoryListPayload::into_vec)
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub async fn create_category(client: &ApiClient, category: &NewCategory) -> ApiResult<Category> {
    client.post_json("/categories", category).await
}

pub async fn update_category(
    client: &ApiClient,
    id: &str,
    category: &NewCategory,
) -> ApiResult<Category> {
    client.patch_json(&format!("/categories/{id}"), category).await
}

pub async fn delete_category(client: &ApiClient, id: &str) -> ApiResult<()> {
    client.delete(&format!("/categories/{id}")).await
}

/// Flatten whatever name the server offered into something safe to create
/// inside the destination directory.
pub(crate) fn safe_file_name(offered: Option<&str>, fallback: &str) -> String {
    let candidate = offered.unwrap_or(fallback);
    let sanitized = sanitize_filename::sanitize(candidate);
    if !sanitized.trim().is_empty() {
        return sanitized;
    }
    let sanitized = sanitize_filename::sanitize(fallback);
    if !sanitized.trim().is_empty() {
        return sanitized;
    }
    FALLBACK_DOWNLOAD_NAME.to_string()
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
