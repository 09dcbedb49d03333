use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub user_id: String,
    #[serde(default)]
    pub metadata: MemberMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Member {
    /// Name if known, otherwise email, otherwise the user id.
    pub fn display_name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.metadata.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_members() {
        let json = r#"[{"member_id":"m1","user_id":"u1","metadata":{"name":"Ada","email":"ada@example.com"}},
                       {"member_id":"m2","user_id":"u2","metadata":{"email":"bob@example.com"}},
                       {"member_id":"m3","user_id":"u3"}]"#;
        let members: Vec<Member> = serde_json::from_str(json).unwrap();
        assert_eq!(members[0].display_name(), "Ada");
        assert_eq!(members[1].display_name(), "bob@example.com");
        assert_eq!(members[2].display_name(), "u3");
    }
}
