use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::credentials::{CookieAttributes, CredentialStore, ACCESS_TOKEN, REFRESH_TOKEN};

/// Lifetime of "remember me" logins, in days.
const REMEMBER_ME_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Login/refresh/logout view over a credential store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn CredentialStore>,
    secure: bool,
}

impl Session {
    /// `secure` marks entries as secure-transport-only.
    pub fn new(store: Arc<dyn CredentialStore>, secure: bool) -> Self {
        Self { store, secure }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    fn attributes(&self, persistent: bool) -> CookieAttributes {
        if persistent {
            CookieAttributes::persistent(self.secure, REMEMBER_ME_DAYS)
        } else {
            CookieAttributes::session(self.secure)
        }
    }

    /// Save the pair returned by a login.
    pub fn persist(&self, pair: &CredentialPair, remember_me: bool) -> Result<()> {
        let attributes = self.attributes(remember_me);
        self.store
            .set(ACCESS_TOKEN, &pair.access_token, attributes.clone())?;
        if let Some(ref refresh) = pair.refresh_token {
            self.store.set(REFRESH_TOKEN, refresh, attributes)?;
        }
        Ok(())
    }

    /// Save a rotated access token (and refresh token, if the server issued
    /// one). Entries keep the persistent/session lifetime they had.
    pub fn rotate(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let access_persistent = self
            .store
            .load(ACCESS_TOKEN)?
            .map(|c| c.attributes.is_persistent());
        let refresh_persistent = self
            .store
            .load(REFRESH_TOKEN)?
            .map(|c| c.attributes.is_persistent())
            .unwrap_or(false);

        let access_persistent = access_persistent.unwrap_or(refresh_persistent);
        self.store
            .set(ACCESS_TOKEN, access_token, self.attributes(access_persistent))?;
        if let Some(refresh) = refresh_token {
            self.store
                .set(REFRESH_TOKEN, refresh, self.attributes(refresh_persistent))?;
        }
        Ok(())
    }

    /// Evict both tokens.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.store.get(REFRESH_TOKEN)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.access_token(), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;

    fn session() -> (Arc<MemoryCredentialStore>, Session) {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = Session::new(store.clone(), true);
        (store, session)
    }

    #[test]
    fn test_remember_me_sets_expiry() {
        let (store, session) = session();
        let pair = CredentialPair {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
        };
        session.persist(&pair, true).unwrap();

        let access = store.load(ACCESS_TOKEN).unwrap().unwrap();
        assert!(access.attributes.is_persistent());
        assert!(access.attributes.secure);
        let remaining = access.attributes.expires.unwrap() - chrono::Utc::now();
        assert!(remaining.num_days() >= 6);
    }

    #[test]
    fn test_without_remember_me_is_session_only() {
        let (store, session) = session();
        let pair = CredentialPair {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
        };
        session.persist(&pair, false).unwrap();
        let refresh = store.load(REFRESH_TOKEN).unwrap().unwrap();
        assert!(!refresh.attributes.is_persistent());
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_rotate_keeps_refresh_token_when_none_returned() {
        let (_store, session) = session();
        let pair = CredentialPair {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
        };
        session.persist(&pair, true).unwrap();

        session.rotate("A2", None).unwrap();
        assert_eq!(session.access_token().unwrap().as_deref(), Some("A2"));
        assert_eq!(session.refresh_token().unwrap().as_deref(), Some("R1"));

        session.rotate("A3", Some("R2")).unwrap();
        assert_eq!(session.refresh_token().unwrap().as_deref(), Some("R2"));
    }

    #[test]
    fn test_rotate_preserves_lifetime() {
        let (store, session) = session();
        let pair = CredentialPair {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
        };
        session.persist(&pair, false).unwrap();
        session.rotate("A2", Some("R2")).unwrap();
        assert!(!store.load(ACCESS_TOKEN).unwrap().unwrap().attributes.is_persistent());
        assert!(!store.load(REFRESH_TOKEN).unwrap().unwrap().attributes.is_persistent());
    }

    #[test]
    fn test_clear_logs_out() {
        let (_store, session) = session();
        session
            .persist(
                &CredentialPair {
                    access_token: "A1".into(),
                    refresh_token: Some("R1".into()),
                },
                false,
            )
            .unwrap();
        session.clear().unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.refresh_token().unwrap(), None);
    }
}
