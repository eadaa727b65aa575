use std::{collections::BTreeMap, time::Duration};

use log::{debug, error, trace, warn};
use regex_lite::Regex;
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    Method, StatusCode,
};
use url::Url;

use crate::{
    model::VersionedModule,
    repository::{
        transport::{checked_path, Transport, TransportError},
        Credentials,
    },
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// A repository reached over HTTP(S). Publications write through, the
/// transaction calls only log.
pub struct HttpTransport {
    base: Url,
    client: Client,
    credentials: Option<Credentials>,
    headers: BTreeMap<String, BTreeMap<String, String>>,
}

impl HttpTransport {
    pub fn new(
        base: Url,
        credentials: Option<Credentials>,
        headers: BTreeMap<String, BTreeMap<String, String>>,
        settings: &HttpSettings,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()?;
        Ok(HttpTransport {
            base,
            client,
            credentials,
            headers,
        })
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base.join(checked_path(path)?)?)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let mut request = self.client.request(method, url.clone());
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        for (prefix, headers) in &self.headers {
            if url.as_str().starts_with(prefix.as_str()) {
                for (name, value) in headers {
                    request = request.header(name.as_str(), value.as_str());
                }
            }
        }
        request
    }

    /// Maps the status of a response: success keeps it, not found gives `None`.
    fn check(&self, url: &Url, response: Response) -> Result<Option<Response>, TransportError> {
        let status = response.status();
        trace!("{} answered {}", url, status);
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.as_u16() < 400 {
            return Ok(Some(response));
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::PROXY_AUTHENTICATION_REQUIRED => {
                warn!(
                    "Access to {} requires authentication (status {}), check the repository credentials",
                    url, status
                );
                Err(TransportError::AuthRequired(url.to_string(), status.as_u16()))
            }
            status if status.is_client_error() => {
                warn!("Request to {} was rejected with status {}", url, status);
                Err(TransportError::Client(url.to_string(), status.as_u16()))
            }
            status => {
                error!("Server error for {}: status {}", url, status);
                Err(TransportError::Server(url.to_string(), status.as_u16()))
            }
        }
    }

    fn send(&self, method: Method, path: &str) -> Result<Option<Response>, TransportError> {
        let url = self.url(path)?;
        let response = self.request(method, &url).send()?;
        self.check(&url, response)
    }
}

impl Transport for HttpTransport {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    fn exists(&self, path: &str) -> Result<bool, TransportError> {
        Ok(self.send(Method::HEAD, path)?.is_some())
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, TransportError> {
        match self.send(Method::GET, path)? {
            Some(response) => Ok(Some(response.bytes()?.to_vec())),
            None => Ok(None),
        }
    }

    fn put(&self, path: &str, content: &[u8], overwrite: bool) -> Result<(), TransportError> {
        if !overwrite && self.exists(path)? {
            return Err(TransportError::AlreadyExists(path.to_string()));
        }
        let url = self.url(path)?;
        debug!("Uploading {} ({} bytes)", url, content.len());
        let response = self
            .request(Method::PUT, &url)
            .body(content.to_vec())
            .send()?;
        match self.check(&url, response)? {
            Some(_) => Ok(()),
            None => Err(TransportError::Client(
                url.to_string(),
                StatusCode::NOT_FOUND.as_u16(),
            )),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let directory = format!("{}/", path.trim_end_matches('/'));
        let Some(response) = self.send(Method::GET, &directory)? else {
            return Ok(Vec::new());
        };
        Ok(parse_directory_listing(&response.text()?))
    }

    fn begin_publish_transaction(&self, module: &VersionedModule) -> Result<(), TransportError> {
        debug!("Publishing {} to {}", module, self.base);
        Ok(())
    }

    fn commit_publish_transaction(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn abort_publish_transaction(&self) -> Result<(), TransportError> {
        warn!(
            "Publication to {} was interrupted, files already uploaded are left in place",
            self.base
        );
        Ok(())
    }
}

/// Entry names linked from an HTML directory index.
fn parse_directory_listing(html: &str) -> Vec<String> {
    let Ok(href) = Regex::new(r#"href="([^"?#:]+?)/?""#) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for captures in href.captures_iter(html) {
        let Some(name) = captures.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if name.is_empty() || name.starts_with('.') || name.contains('/') {
            continue;
        }
        if !entries.iter().any(|e| e == name) {
            entries.push(name.to_string());
        }
    }
    entries
}
