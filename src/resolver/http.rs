use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::compression::Encoding;
use crate::error::{Error, Result};
use crate::id::VolumeId;
use crate::layout::Scheme;
use crate::stream::{ResourceReader, ResourceWriter};

use super::{Request, Resolver};

pub const DEFAULT_URL: &str = "http://data.analytics.hathitrust.org/features-2020.03/{stubbypath}";

const PLACEHOLDERS: [&str; 3] = ["id", "stubbypath", "pairtreepath"];

/// Read-only resolver that GETs resources from a URL template.
///
/// The template must contain at least one of `{id}`, `{stubbypath}` or
/// `{pairtreepath}`; each is replaced with the raw identifier or the
/// corresponding tree path of the requested file.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    template: String,
    client: Client,
    encoding: Encoding,
}

impl HttpResolver {
    pub fn new(template: impl Into<String>, encoding: Encoding) -> Result<Self> {
        Self::with_timeout(template, None, encoding)
    }

    pub fn with_timeout(
        template: impl Into<String>,
        timeout: Option<Duration>,
        encoding: Encoding,
    ) -> Result<Self> {
        let template = template.into();
        let fields = template_fields(&template)?;
        if !fields.iter().any(|field| PLACEHOLDERS.contains(&field.as_str())) {
            return Err(Error::Misconfigured(format!(
                "url template {template:?} needs one of {{id}}, {{stubbypath}} or {{pairtreepath}}"
            )));
        }
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| Error::Misconfigured(format!("http client: {err}")))?;
        Ok(Self {
            template,
            client,
            encoding,
        })
    }

    /// Substitute the template for one resource.
    pub fn url(&self, id: &str, request: &Request) -> Result<String> {
        let volume = VolumeId::parse(id)?;
        let mut url = self.template.clone();
        for (placeholder, scheme) in [
            ("{stubbypath}", Scheme::Stubbytree),
            ("{pairtreepath}", Scheme::Pairtree),
        ] {
            if url.contains(placeholder) {
                let path =
                    scheme.url_path(&volume, request.format, request.compression, request.suffix())?;
                url = url.replace(placeholder, &path);
            }
        }
        url = url.replace("{id}", volume.as_str());
        url::Url::parse(&url)
            .map_err(|err| Error::Misconfigured(format!("invalid url {url:?}: {err}")))?;
        Ok(url)
    }
}

impl Resolver for HttpResolver {
    fn method(&self) -> &str {
        "http"
    }

    fn location(&self) -> String {
        self.template.clone()
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn writable(&self) -> bool {
        false
    }

    fn open_raw_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        let url = self.url(id, request)?;
        debug!("http GET {url}");
        let response = self.client.get(&url).send().map_err(|err| {
            warn!("http request for {url} failed: {err}");
            Error::Http {
                url: url.clone(),
                status: None,
                detail: err.to_string(),
            }
        })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::NotFound(url));
        }
        if !status.is_success() {
            warn!("http GET {url} returned {status}");
            return Err(Error::Http {
                url,
                status: Some(status.as_u16()),
                detail: status.to_string(),
            });
        }
        Ok(Box::new(response))
    }

    fn open_raw_write(&self, id: &str, _request: &Request) -> Result<ResourceWriter> {
        Err(Error::Unsupported(format!(
            "http resolver is read-only; cannot write {id}"
        )))
    }
}

/// Names of every `{field}` in a template. Unknown fields are rejected.
fn template_fields(template: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            Error::Misconfigured(format!("unterminated placeholder in {template:?}"))
        })?;
        let field = &after[..end];
        if !PLACEHOLDERS.contains(&field) {
            return Err(Error::Misconfigured(format!(
                "unknown placeholder {{{field}}} in {template:?}"
            )));
        }
        fields.push(field.to_string());
        rest = &after[end + 1..];
    }
    Ok(fields)
}
