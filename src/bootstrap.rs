//! One-time Google consent flow producing `token.json`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::services::google::{
    authorization_url, exchange_code, parse_redirect, refresh, ClientSecretsFile, GoogleToken,
};

/// How the token on disk was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    AlreadyValid,
    Refreshed,
    Authorized,
}

/// Make sure `token_path` holds a usable token, refreshing it or running the
/// browser consent flow as needed.
pub async fn ensure_token(
    http: &reqwest::Client,
    credentials_path: &Path,
    token_path: &Path,
) -> Result<TokenStatus> {
    let credentials = tokio::fs::read_to_string(credentials_path)
        .await
        .with_context(|| format!("Failed to read {}", credentials_path.display()))?;
    let secrets = ClientSecretsFile::parse(&credentials)?;

    if let Some(status) = reuse_existing(http, token_path).await? {
        return Ok(status);
    }

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind local redirect listener")?;
    let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
    let state = uuid::Uuid::new_v4().to_string();
    let client = secrets.client()?;

    let url = authorization_url(client, &redirect_uri, &state)?;
    println!("Please visit this URL to authorize this application:\n\n{}\n", url);

    let code = receive_redirect(&listener, &state).await?;
    let token = exchange_code(http, client, &code, &redirect_uri).await?;
    write_token(token_path, &token).await?;
    Ok(TokenStatus::Authorized)
}

async fn reuse_existing(http: &reqwest::Client, token_path: &Path) -> Result<Option<TokenStatus>> {
    if !token_path.exists() {
        return Ok(None);
    }

    let raw = tokio::fs::read_to_string(token_path)
        .await
        .with_context(|| format!("Failed to read {}", token_path.display()))?;
    let mut token: GoogleToken = match serde_json::from_str(&raw) {
        Ok(token) => token,
        Err(e) => {
            log::warn!("Bootstrap: ignoring unreadable {}: {}", token_path.display(), e);
            return Ok(None);
        }
    };

    if token.is_valid(Utc::now()) {
        return Ok(Some(TokenStatus::AlreadyValid));
    }
    if token.refresh_token.is_none() {
        return Ok(None);
    }

    match refresh(http, &mut token).await {
        Ok(()) => {
            write_token(token_path, &token).await?;
            Ok(Some(TokenStatus::Refreshed))
        }
        Err(e) => {
            log::warn!("Bootstrap: refresh failed, running consent flow: {}", e);
            Ok(None)
        }
    }
}

/// Accept browser connections until one carries the OAuth redirect, and
/// return its authorization code. Other requests (favicon fetches and the
/// like) get a 404 and are ignored.
pub async fn receive_redirect(listener: &TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept redirect")?;

        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        if let Err(e) = reader.read_line(&mut request_line).await {
            log::warn!("Bootstrap: unreadable request from {}: {}", peer, e);
            continue;
        }
        let mut stream = reader.into_inner();

        if !is_oauth_callback(&request_line) {
            log::debug!("Bootstrap: ignoring '{}' from {}", request_line.trim_end(), peer);
            answer(&mut stream, "404 Not Found", "Not found.").await;
            continue;
        }
        log::debug!("Bootstrap: redirect from {}", peer);

        let result = parse_redirect(&request_line, expected_state);
        let page = match &result {
            Ok(_) => "Authentication complete. You may close this window.",
            Err(_) => "Authentication failed. Return to the terminal for details.",
        };
        answer(&mut stream, "200 OK", page).await;

        return Ok(result?);
    }
}

/// True when the request target carries any of `code`, `error` or `state`.
fn is_oauth_callback(request_line: &str) -> bool {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return false;
    };
    let Ok(url) = url::Url::parse(&format!("http://localhost{}", target)) else {
        return false;
    };
    url.query_pairs()
        .any(|(k, _)| k == "code" || k == "error" || k == "state")
}

async fn answer(stream: &mut tokio::net::TcpStream, status: &str, page: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        page.len(),
        page
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        log::warn!("Bootstrap: failed to answer the browser: {}", e);
    }
}

async fn write_token(path: &Path, token: &GoogleToken) -> Result<()> {
    let json = serde_json::to_string_pretty(token).context("Failed to serialize token")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Bootstrap: token saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    const CREDENTIALS: &str = r#"{"installed":{"client_id":"cid","client_secret":"cs"}}"#;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_valid_token_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let creds = write(dir.path(), "credentials.json", CREDENTIALS);
        let original = r#"{"token":"ya29.ok","expiry":"2099-01-01T00:00:00Z"}"#;
        let token = write(dir.path(), "token.json", original);

        let status = ensure_token(&reqwest::Client::new(), &creds, &token).await.unwrap();
        assert_eq!(status, TokenStatus::AlreadyValid);
        assert_eq!(std::fs::read_to_string(&token).unwrap(), original);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_rewritten() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"ya29.fresh","expires_in":3599}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let creds = write(dir.path(), "credentials.json", CREDENTIALS);
        let expired = serde_json::json!({
            "token": "ya29.old",
            "refresh_token": "1//r",
            "token_uri": format!("{}/token", server.url()),
            "client_id": "cid",
            "client_secret": "cs",
            "expiry": "2000-01-01T00:00:00Z"
        });
        let token = write(dir.path(), "token.json", &expired.to_string());

        let status = ensure_token(&reqwest::Client::new(), &creds, &token).await.unwrap();
        assert_eq!(status, TokenStatus::Refreshed);

        let saved: GoogleToken = serde_json::from_str(&std::fs::read_to_string(&token).unwrap()).unwrap();
        assert_eq!(saved.token, "ya29.fresh");
        assert_eq!(saved.refresh_token.as_deref(), Some("1//r"));
    }

    #[tokio::test]
    async fn test_receive_redirect_returns_code_and_answers_browser() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /?state=s1&code=4%2Fabc HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.unwrap();
            reply
        });

        let code = receive_redirect(&listener, "s1").await.unwrap();
        assert_eq!(code, "4/abc");
        assert!(browser.await.unwrap().contains("Authentication complete"));
    }

    #[tokio::test]
    async fn test_receive_redirect_rejects_wrong_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /?state=forged&code=x HTTP/1.1\r\n\r\n")
                .await
                .unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.unwrap();
            reply
        });

        assert!(receive_redirect(&listener, "s1").await.is_err());
        assert!(browser.await.unwrap().contains("Authentication failed"));
    }

    #[tokio::test]
    async fn test_receive_redirect_skips_unrelated_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut favicon = TcpStream::connect(addr).await.unwrap();
            favicon
                .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
                .await
                .unwrap();
            let mut first = String::new();
            favicon.read_to_string(&mut first).await.unwrap();

            let mut redirect = TcpStream::connect(addr).await.unwrap();
            redirect
                .write_all(b"GET /?state=s1&code=real HTTP/1.1\r\n\r\n")
                .await
                .unwrap();
            let mut second = String::new();
            redirect.read_to_string(&mut second).await.unwrap();
            (first, second)
        });

        let code = receive_redirect(&listener, "s1").await.unwrap();
        assert_eq!(code, "real");
        let (first, second) = browser.await.unwrap();
        assert!(first.starts_with("HTTP/1.1 404"));
        assert!(second.contains("Authentication complete"));
    }

    #[test]
    fn test_is_oauth_callback() {
        assert!(is_oauth_callback("GET /?code=x&state=s HTTP/1.1\r\n"));
        assert!(is_oauth_callback("GET /?error=access_denied HTTP/1.1\r\n"));
        assert!(!is_oauth_callback("GET /favicon.ico HTTP/1.1\r\n"));
        assert!(!is_oauth_callback(""));
    }
}
