//! REST resource collection (`/api/resources`).

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::session::{Session, check_status};

/// Server-side description of a stored resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource GUID.
    #[serde(rename = "GUID")]
    pub guid: String,
    /// Display name.
    #[serde(rename = "ResourceName", default)]
    pub name: String,
    /// Free-form description.
    #[serde(rename = "Description", default)]
    pub description: String,
    /// Content size in bytes.
    #[serde(rename = "Size", default)]
    pub size: i64,
    /// Content hash as reported by the server.
    #[serde(rename = "Hash", default)]
    pub hash: String,
    /// Version counter, bumped on each upload.
    #[serde(rename = "VersionNumber", default)]
    pub version: i64,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    #[serde(rename = "ResourceName")]
    name: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Global")]
    global: bool,
}

/// Resource CRUD bound to an authenticated [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceClient<'a> {
    session: &'a Session,
}

impl<'a> ResourceClient<'a> {
    /// Wrap a session.
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// List every resource visible to the user.
    #[tracing::instrument(skip_all)]
    pub async fn list(&self) -> Result<Vec<ResourceDescriptor>> {
        let resp = self
            .session
            .authorized(Method::GET, "/api/resources")?
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    /// Create an empty resource.
    #[tracing::instrument(skip(self, description))]
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        global: bool,
    ) -> Result<ResourceDescriptor> {
        let resp = self
            .session
            .authorized(Method::POST, "/api/resources")?
            .json(&CreateRequest {
                name,
                description,
                global,
            })
            .send()
            .await?;
        let created: ResourceDescriptor = check_status(resp).await?.json().await?;
        tracing::debug!(guid = %created.guid, "resource created");
        Ok(created)
    }

    /// Replace the content of a resource.
    #[tracing::instrument(skip(self, data), fields(len = data.len()))]
    pub async fn upload(&self, guid: &str, data: Vec<u8>) -> Result<ResourceDescriptor> {
        let resp = self
            .session
            .authorized(Method::PUT, &raw_path(guid))?
            .body(data)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    /// Fetch the content of a resource.
    #[tracing::instrument(skip(self))]
    pub async fn download(&self, guid: &str) -> Result<Vec<u8>> {
        let resp = self
            .session
            .authorized(Method::GET, &raw_path(guid))?
            .send()
            .await?;
        Ok(check_status(resp).await?.bytes().await?.to_vec())
    }

    /// Delete a resource.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, guid: &str) -> Result<()> {
        let resp = self
            .session
            .authorized(Method::DELETE, &format!("/api/resources/{guid}"))?
            .send()
            .await?;
        let _ = check_status(resp).await?;
        Ok(())
    }
}

fn raw_path(guid: &str) -> String {
    format!("/api/resources/{guid}/raw")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
