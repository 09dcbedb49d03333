use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn description_display(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => "No description",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
}

/// Partial update; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_project_list() {
        let json = r#"[{"id":"5f0c","name":"Website","description":"Relaunch","created_at":"2025-09-28T10:15:00.123456+00:00"},
                       {"id":"9a1b","name":"Mobile","description":null,"created_at":null}]"#;
        let projects: Vec<Project> = serde_json::from_str(json).unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "Website");
        assert!(projects[0].created_at.is_some());
        assert_eq!(projects[1].description_display(), "No description");
    }

    #[test]
    fn test_update_skips_unset_fields() {
        let update = ProjectUpdate {
            name: Some("Renamed".into()),
            description: None,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"name": "Renamed"})
        );
        assert!(ProjectUpdate::default().is_empty());
    }
}
