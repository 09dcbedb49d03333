//! Account operations: sign up, log in/out, password recovery.

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::client::ApiClient;
use super::ApiError;
use crate::auth::CredentialPair;
use crate::models::User;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<User>,
}

/// Error body shape returned by the auth service
#[derive(Debug, Deserialize, Default)]
struct AuthErrorBody {
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

/// Best human-readable message from an auth error body.
fn auth_error_message(body: &str) -> Option<String> {
    let parsed: AuthErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error_description
        .or(parsed.message)
        .or(parsed.msg)
        .filter(|m| !m.is_empty())
}

impl ApiClient {
    /// Register a new account. Name and job title go into user metadata.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
        job_title: Option<&str>,
    ) -> Result<()> {
        let request = self.request(Method::POST, "/auth/v1/signup").with_json(json!({
            "email": email,
            "password": password,
            "data": {
                "name": name,
                "job_title": job_title.unwrap_or(""),
            },
        }));
        let response = self.send(request).await.context("Failed to send signup request")?;
        if !response.is_success() {
            let body = response.text();
            let message = auth_error_message(&body)
                .unwrap_or_else(|| "Failed to register".to_string());
            return Err(anyhow::Error::new(ApiError::from_status(response.status, &body))
                .context(message));
        }
        info!("Account registered");
        Ok(())
    }

    /// Log in with email and password and store the issued tokens.
    /// With `remember_me` the tokens persist for 7 days, otherwise until
    /// logout.
    pub async fn log_in(&self, email: &str, password: &str, remember_me: bool) -> Result<User> {
        let request = self
            .request(Method::POST, "/auth/v1/token?grant_type=password")
            .with_json(json!({ "email": email, "password": password }));
        let response = self.send(request).await.context("Failed to send login request")?;

        if !response.is_success() {
            let body = response.text();
            let message = auth_error_message(&body)
                .unwrap_or_else(|| "Email or password is incorrect".to_string());
            return Err(anyhow::Error::new(ApiError::from_status(response.status, &body))
                .context(message));
        }

        let login: LoginResponse = response.json().context("Failed to parse login response")?;
        let (access_token, user) = match (login.access_token, login.user) {
            (Some(token), Some(user)) if !token.is_empty() => (token, user),
            _ => {
                return Err(
                    ApiError::InvalidResponse("Missing authentication data".into()).into(),
                )
            }
        };

        let pair = CredentialPair {
            access_token,
            refresh_token: login.refresh_token,
        };
        self.session()
            .persist(&pair, remember_me)
            .context("Failed to store credentials")?;

        info!(remember_me = remember_me, "Logged in");
        Ok(user)
    }

    /// Revoke the session server-side (best effort) and drop both tokens.
    pub async fn log_out(&self) -> Result<()> {
        if self.session().access_token()?.is_some() {
            let request = self.request(Method::POST, "/auth/v1/logout");
            match self.send(request).await {
                Ok(response) if !response.is_success() => {
                    warn!(status = %response.status, "Logout request rejected");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Logout request failed"),
            }
        }
        self.session().clear().context("Failed to clear credentials")?;
        info!("Logged out");
        Ok(())
    }

    /// Ask the auth service to email a password reset link.
    pub async fn recover_password(&self, email: &str) -> Result<()> {
        let request = self
            .request(Method::POST, "/auth/v1/recover")
            .with_json(json!({ "email": email }));
        self.execute(request).await.context("Failed to request password reset")?;
        Ok(())
    }

    /// Set a new password using the access token from a reset link.
    pub async fn update_password(&self, recovery_token: &str, new_password: &str) -> Result<()> {
        let request = self
            .request(Method::PUT, "/auth/v1/user")
            .with_bearer(recovery_token)
            .without_refresh()
            .with_json(json!({ "password": new_password }));
        self.execute(request).await.context("Failed to reset password")?;
        Ok(())
    }

    /// Fetch the signed-in user.
    pub async fn current_user(&self) -> Result<User> {
        self.get("/auth/v1/user").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_message_prefers_description() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(
            auth_error_message(body).as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(
            auth_error_message(r#"{"msg":"User already registered"}"#).as_deref(),
            Some("User already registered")
        );
        assert_eq!(auth_error_message("<html>"), None);
        assert_eq!(auth_error_message(r#"{"message":""}"#), None);
    }
}
