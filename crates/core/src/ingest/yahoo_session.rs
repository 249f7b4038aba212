use crate::ingest::provider::{HttpStatusError, BROWSER_USER_AGENT};
use anyhow::{ensure, Context, Result};
use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use tokio::sync::Mutex;

const COOKIE_URL: &str = "https://fc.yahoo.com";

/// Cookie plus crumb pair required by the Yahoo quote-summary and screener endpoints.
#[derive(Debug, Clone)]
pub struct Crumb {
    cookie: String,
    value: String,
}

/// Lazily negotiated Yahoo session shared by every request of one provider.
///
/// The crumb is fetched once and reused; a 401/403 drops it and renegotiates
/// a single time before the error is surfaced.
#[derive(Debug)]
pub struct YahooSession {
    http: reqwest::Client,
    base_url: String,
    cookie_url: String,
    crumb: Mutex<Option<Crumb>>,
}

impl YahooSession {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie_url: COOKIE_URL.to_string(),
            crumb: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `url` with the session cookie and crumb attached.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.send(|crumb| self.http.get(url).query(&[("crumb", crumb.value.as_str())]))
            .await
    }

    /// POST a JSON body to `url` with the session cookie and crumb attached.
    pub async fn post_json_text(&self, url: &str, body: &serde_json::Value) -> Result<String> {
        self.send(|crumb| {
            self.http
                .post(url)
                .query(&[("crumb", crumb.value.as_str())])
                .json(body)
        })
        .await
    }

    async fn send<F>(&self, build: F) -> Result<String>
    where
        F: Fn(&Crumb) -> RequestBuilder,
    {
        let mut renegotiated = false;
        loop {
            let crumb = self.crumb().await?;
            let res = build(&crumb)
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .header(COOKIE, &crumb.cookie)
                .send()
                .await?;

            let status = res.status();
            let text = res.text().await?;
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) && !renegotiated {
                tracing::debug!(%status, "yahoo crumb rejected; renegotiating session");
                *self.crumb.lock().await = None;
                renegotiated = true;
                continue;
            }
            if !status.is_success() {
                return Err(HttpStatusError { status, body: text }.into());
            }
            return Ok(text);
        }
    }

    async fn crumb(&self) -> Result<Crumb> {
        let mut slot = self.crumb.lock().await;
        if let Some(crumb) = slot.as_ref() {
            return Ok(crumb.clone());
        }
        let crumb = self.negotiate().await?;
        *slot = Some(crumb.clone());
        Ok(crumb)
    }

    async fn negotiate(&self) -> Result<Crumb> {
        // The cookie endpoint answers 404 but still sets the session cookie.
        let res = self
            .http
            .get(&self.cookie_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .context("yahoo cookie request failed")?;
        let cookie = cookie_header(
            res.headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        ensure!(!cookie.is_empty(), "yahoo cookie endpoint set no cookie");

        let res = self
            .http
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(COOKIE, &cookie)
            .send()
            .await
            .context("yahoo crumb request failed")?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(HttpStatusError { status, body }.into());
        }

        let value = parse_crumb(&body)?;
        tracing::debug!("negotiated yahoo session");
        Ok(Crumb { cookie, value })
    }
}

/// Joins the `name=value` part of each `Set-Cookie` header into one `Cookie` header.
fn cookie_header<'a>(set_cookies: impl Iterator<Item = &'a str>) -> String {
    set_cookies
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|kv| kv.contains('='))
        .collect::<Vec<_>>()
        .join("; ")
}

fn parse_crumb(body: &str) -> Result<String> {
    let crumb = body.trim();
    ensure!(
        !crumb.is_empty() && !crumb.contains(['<', '{', ' ']),
        "unexpected crumb response: {}",
        crumb.chars().take(80).collect::<String>()
    );
    Ok(crumb.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_cookie_pairs_and_drops_attributes() {
        let header = cookie_header(
            [
                "A3=d=AQABBK8&S=AQAAAj; Expires=Sun, 15 Oct 2027 09:00:00 GMT; Domain=.yahoo.com; Secure",
                "A1S=d=AQABBK8&j=WORLD; Domain=.yahoo.com",
                "garbage",
            ]
            .into_iter(),
        );
        assert_eq!(header, "A3=d=AQABBK8&S=AQAAAj; A1S=d=AQABBK8&j=WORLD");
    }

    #[test]
    fn accepts_plain_crumbs_only() {
        assert_eq!(parse_crumb("Xy7.abc/Def\n").unwrap(), "Xy7.abc/Def");
        assert!(parse_crumb("").is_err());
        assert!(parse_crumb("<html>Too Many Requests</html>").is_err());
        assert!(parse_crumb(r#"{"finance":{"error":{}}}"#).is_err());
    }
}
