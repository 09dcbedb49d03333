use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.user_metadata
            .name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }

    /// Job title, defaulting to "Member"
    pub fn job_title_display(&self) -> &str {
        match self.user_metadata.job_title.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => "Member",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults() {
        let user: User = serde_json::from_str(r#"{"id":"u1","email":"x@y.z"}"#).unwrap();
        assert_eq!(user.display_name(), "x@y.z");
        assert_eq!(user.job_title_display(), "Member");
    }
}
