use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creator or assignee of an epic, as embedded by the `project_epics` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicPerson {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub id: String,
    /// Human-readable key such as `E-12`
    #[serde(default)]
    pub epic_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<EpicPerson>,
    #[serde(default)]
    pub assignee: Option<EpicPerson>,
}

impl Epic {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map(|d| d < now).unwrap_or(false)
    }

    pub fn assignee_name(&self) -> &str {
        self.assignee
            .as_ref()
            .and_then(|a| a.name.as_deref())
            .unwrap_or("Unassigned")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEpic {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub project_id: String,
}

/// Partial update; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EpicUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl EpicUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assignee_id.is_none()
            && self.deadline.is_none()
    }
}
