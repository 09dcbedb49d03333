//! Epic listing, creation and updates.

use anyhow::{Context, Result};

use super::client::ApiClient;
use super::ApiError;
use crate::models::{Epic, EpicUpdate, NewEpic};

impl ApiClient {
    /// Epics of a project, with creator and assignee embedded
    pub async fn list_epics(&self, project_id: &str) -> Result<Vec<Epic>> {
        self.get(&format!("/rest/v1/project_epics?project_id=eq.{}", project_id))
            .await
            .context("Failed to load epics")
    }

    /// Create an epic. The returned row is the raw `epics` record, so the
    /// embedded people are not populated.
    pub async fn create_epic(&self, epic: &NewEpic) -> Result<Epic> {
        let rows: Vec<Epic> = self
            .post("/rest/v1/epics", epic)
            .await
            .context("Failed to create epic")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::InvalidResponse("Created epic not returned".into()).into())
    }

    /// Update an epic with the signed-in user's credentials.
    pub async fn update_epic(&self, id: &str, update: &EpicUpdate) -> Result<Epic> {
        let rows: Vec<Epic> = self
            .patch(&format!("/rest/v1/epics?id=eq.{}", id), update)
            .await
            .context("Failed to update epic")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("epic {}", id)).into())
    }
}
