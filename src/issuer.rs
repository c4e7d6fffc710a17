use crate::token::Role;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub role: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str, role: Role) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
            role: role.as_str().to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Exchanges credentials for a token. Mockable so the CLI can be tested offline.
pub trait IdentityIssuer {
    fn authenticate(&self, credentials: &Credentials) -> Result<String>;
}

pub struct HttpIssuer {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpIssuer {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new(),
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/auth/login", self.base_url)
    }
}

impl IdentityIssuer for HttpIssuer {
    fn authenticate(&self, credentials: &Credentials) -> Result<String> {
        let url = self.login_url();
        log::debug!("POST {} as {}", url, credentials.role);

        let resp = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(serde_json::to_value(credentials)?);

        match resp {
            Ok(r) => {
                let body: LoginResponse = r.into_json()?;
                Ok(body.token)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(anyhow!("Login failed ({}): {}", code, body))
            }
            Err(e) => Err(anyhow!("Request failed: {}", e)),
        }
    }
}
