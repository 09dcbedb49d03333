use anyhow::{Context, Result};

use super::client::ApiClient;
use crate::models::Member;

impl ApiClient {
    pub async fn list_members(&self, project_id: &str) -> Result<Vec<Member>> {
        self.get(&format!(
            "/rest/v1/get_project_members?project_id=eq.{}",
            project_id
        ))
        .await
        .context("Failed to load project members")
    }
}
