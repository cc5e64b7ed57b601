//! Minimal client for the Weblate REST API: paginated listings of units and
//! screenshots, screenshot upload, and unit linking.

pub mod models;
pub mod pagination;

use std::path::{Path, PathBuf};
use std::time::Duration;

use core_types::{RemoteUnitId, ScreenshotId};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

pub use models::{RemoteScreenshot, RemoteUnit, ScreenshotInfo, UnitInfo};
pub use pagination::{Page, Paginated};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const CLIENT_AGENT: &str = concat!("ImaPo/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum WeblateError {
    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, WeblateError>;

/// Blocking API client. Calls made before [`WeblateClient::set_token`] go out
/// unauthenticated; the server decides what that means.
#[derive(Debug, Clone)]
pub struct WeblateClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl WeblateClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|source| WeblateError::Http {
                url: base_url.to_string(),
                source,
            })?;
        Self::with_http_client(base_url, http)
    }

    pub fn with_http_client(base_url: &str, http: Client) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized).map_err(|err| WeblateError::InvalidUrl {
            url: base_url.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            http,
            base,
            token: None,
        })
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|err| WeblateError::InvalidUrl {
            url: format!("{}{path}", self.base),
            message: err.to_string(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_AGENT);
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Token {token}")),
            None => request,
        }
    }

    fn send(&self, method: &'static str, url: &str, request: RequestBuilder) -> Result<Response> {
        debug!(method, url, "weblate request");
        let response = self
            .authorize(request)
            .send()
            .map_err(|source| WeblateError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(WeblateError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn read_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
        let text = response.text().map_err(|source| WeblateError::Http {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|err| WeblateError::Malformed {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    /// Fetch a single page of a list endpoint.
    pub fn fetch_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>> {
        let response = self.send("GET", url, self.http.get(url))?;
        Self::read_json(url, response)
    }

    /// Lazily walk every page starting at `url`.
    pub fn fetch_all<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Paginated<T, impl FnMut(&str) -> Result<Page<T>> + '_> {
        Paginated::new(url, move |next: &str| self.fetch_page(next))
    }

    pub fn list_screenshots(
        &self,
        project: &str,
        component: &str,
    ) -> Result<impl Iterator<Item = Result<RemoteScreenshot>> + '_> {
        let url = self.endpoint(&format!("api/components/{project}/{component}/screenshots/"))?;
        Ok(self
            .fetch_all::<ScreenshotInfo>(url.as_str())
            .map(|item| item.and_then(RemoteScreenshot::try_from)))
    }

    pub fn list_units(
        &self,
        project: &str,
        component: &str,
        language: &str,
    ) -> Result<impl Iterator<Item = Result<RemoteUnit>> + '_> {
        let url = self.endpoint(&format!(
            "api/translations/{project}/{component}/{language}/units/"
        ))?;
        Ok(self
            .fetch_all::<UnitInfo>(url.as_str())
            .map(|item| item.map(RemoteUnit::from)))
    }

    /// Create a screenshot resource from an image file.
    pub fn upload_screenshot(
        &self,
        file: &Path,
        name: &str,
        project: &str,
        component: &str,
        language: &str,
    ) -> Result<RemoteScreenshot> {
        let url = self.endpoint("api/screenshots/")?;
        let form = multipart::Form::new()
            .file("image", file)
            .map_err(|source| WeblateError::Io {
                path: file.to_path_buf(),
                source,
            })?
            .text("name", name.to_string())
            .text("project_slug", project.to_string())
            .text("component_slug", component.to_string())
            .text("language_code", language.to_string());

        let response = self.send("POST", url.as_str(), self.http.post(url.clone()).multipart(form))?;
        let info: ScreenshotInfo = Self::read_json(url.as_str(), response)?;
        let screenshot = RemoteScreenshot::try_from(info)?;
        info!(name, id = %screenshot.id, "uploaded screenshot");
        Ok(screenshot)
    }

    /// Attach a unit to a screenshot. The server does not deduplicate links.
    pub fn link_unit(&self, screenshot: ScreenshotId, unit: RemoteUnitId) -> Result<()> {
        let url = self.endpoint(&format!("api/screenshots/{screenshot}/units/"))?;
        let unit_id = unit.to_string();
        self.send(
            "POST",
            url.as_str(),
            self.http
                .post(url.clone())
                .form(&[("unit_id", unit_id.as_str())]),
        )?;
        info!(%screenshot, %unit, "linked unit to screenshot");
        Ok(())
    }
}
