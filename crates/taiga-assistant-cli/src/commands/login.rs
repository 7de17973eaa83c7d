use anyhow::{bail, Result};
use cliclack::spinner;
use console::style;
use serde::{Deserialize, Serialize};

use crate::profile::{profile_path, Profile, DEFAULT_BACKEND_URL, DEFAULT_SERVER_URL};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
    backend_url: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Exchange Taiga credentials for a token through the assistant server
pub async fn authenticate(
    server_url: &str,
    backend_url: &str,
    username: &str,
    password: &str,
) -> Result<AuthResponse> {
    let url = format!("{}/auth", server_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(url)
        .json(&AuthRequest {
            username,
            password,
            backend_url,
        })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("Authentication failed ({})", status));
        bail!(message);
    }
    Ok(response.json().await?)
}

pub async fn handle_login() -> Result<()> {
    cliclack::intro(style(" taiga-assistant login ").on_cyan().black())?;

    let path = profile_path()?;
    let existing = Profile::load(&path)?;
    let default_server = existing
        .as_ref()
        .map_or(DEFAULT_SERVER_URL, |p| p.server_url.as_str());
    let default_backend = existing
        .as_ref()
        .map_or(DEFAULT_BACKEND_URL, |p| p.backend_url.as_str());

    let server_url: String = cliclack::input("Assistant server URL")
        .default_input(default_server)
        .interact()?;
    let backend_url: String = cliclack::input("Taiga API URL")
        .default_input(default_backend)
        .interact()?;
    let mut username_input = cliclack::input("Username");
    if let Some(profile) = &existing {
        username_input = username_input.default_input(&profile.username);
    }
    let username: String = username_input.interact()?;
    let password: String = cliclack::password("Password").mask('▪').interact()?;

    let spin = spinner();
    spin.start("Signing in...");
    let auth = match authenticate(&server_url, &backend_url, &username, &password).await {
        Ok(auth) => auth,
        Err(e) => {
            spin.stop(style("Sign in failed").red());
            cliclack::outro_cancel("Login failed")?;
            return Err(e);
        }
    };
    spin.stop(format!("Signed in as {}", auth.user.full_name));

    Profile {
        server_url,
        backend_url,
        username: auth.user.username,
        token: auth.token,
    }
    .save(&path)?;

    cliclack::outro(format!("Profile saved to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_authenticate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_json(json!({
                "username": "ana",
                "password": "pw",
                "backendUrl": "https://taiga.example/api/v1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "user": {"id": 7, "username": "ana", "full_name": "Ana Pérez", "email": "a@x", "photo": null},
                "token": "secret"
            })))
            .mount(&server)
            .await;

        let auth = authenticate(&server.uri(), "https://taiga.example/api/v1", "ana", "pw")
            .await
            .unwrap();
        assert_eq!(auth.token, "secret");
        assert_eq!(auth.user.id, 7);
        assert_eq!(auth.user.full_name, "Ana Pérez");
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": "Username or password does not matches user."})),
            )
            .mount(&server)
            .await;

        let err = authenticate(&server.uri(), "https://taiga.example/api/v1", "ana", "bad")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Username or password does not matches user.");
    }
}
