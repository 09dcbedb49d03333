//! Project CRUD.

use anyhow::{Context, Result};

use super::client::ApiClient;
use super::ApiError;
use crate::models::{NewProject, Project, ProjectUpdate};

fn project_filter(id: &str) -> String {
    format!("/rest/v1/projects?id=eq.{}", id)
}

impl ApiClient {
    /// Projects visible to the signed-in user
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get("/rest/v1/rpc/get_projects")
            .await
            .context("Failed to load projects")
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        let rows: Vec<Project> = self
            .get(&project_filter(id))
            .await
            .context("Failed to load project")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("project {}", id)).into())
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
        let rows: Vec<Project> = self
            .post("/rest/v1/projects", project)
            .await
            .context("Failed to create project")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::InvalidResponse("Created project not returned".into()).into())
    }

    pub async fn update_project(&self, id: &str, update: &ProjectUpdate) -> Result<Project> {
        let rows: Vec<Project> = self
            .patch(&project_filter(id), update)
            .await
            .context("Failed to update project")?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("project {}", id)).into())
    }

    pub async fn delete_project(&self, id: &str) -> Result<()> {
        self.delete(&project_filter(id))
            .await
            .context("Failed to delete project")
    }
}
