//! Tier configuration and chain-file discovery.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::compression::{Compression, Encoding, Format};
use crate::error::{Error, Result};

pub const CONFIG_YAML: &str = ".htrc-config.yaml";
pub const CONFIG_JSON: &str = ".htrc-config.json";

/// One cache tier.
///
/// `format` and `compression` are always required; `dir` or `url` is required
/// depending on the method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    pub method: String,

    #[serde(default, alias = "directory", skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub format: Format,

    pub compression: Compression,

    /// Ziptree only: number of sha1 hex characters naming an archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_len: Option<usize>,

    /// Http only: request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ResolverConfig {
    pub fn new(method: impl Into<String>, format: Format, compression: Compression) -> Self {
        Self {
            method: method.into(),
            dir: None,
            url: None,
            format,
            compression,
            shard_len: None,
            timeout_secs: None,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_shard_len(mut self, shard_len: usize) -> Self {
        self.shard_len = Some(shard_len);
        self
    }

    pub fn encoding(&self) -> Encoding {
        Encoding::new(self.format, self.compression)
    }

    pub fn require_dir(&self) -> Result<&Path> {
        self.dir.as_deref().ok_or_else(|| {
            Error::Misconfigured(format!("{} tier requires a 'dir'", self.method))
        })
    }

    pub fn require_url(&self) -> Result<&str> {
        self.url.as_deref().ok_or_else(|| {
            Error::Misconfigured(format!("{} tier requires a 'url'", self.method))
        })
    }

    /// Directory or URL, whichever the tier has.
    pub fn location(&self) -> String {
        match (&self.dir, &self.url) {
            (Some(dir), _) => dir.display().to_string(),
            (None, Some(url)) => url.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Ordered tiers, nearest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigFile", into = "Vec<ResolverConfig>")]
pub struct ChainConfig {
    pub tiers: Vec<ResolverConfig>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Wrapped { resolver: Vec<ResolverConfig> },
    Bare(Vec<ResolverConfig>),
}

impl From<ConfigFile> for ChainConfig {
    fn from(value: ConfigFile) -> Self {
        let tiers = match value {
            ConfigFile::Wrapped { resolver } => resolver,
            ConfigFile::Bare(tiers) => tiers,
        };
        Self { tiers }
    }
}

impl From<ChainConfig> for Vec<ResolverConfig> {
    fn from(value: ChainConfig) -> Self {
        value.tiers
    }
}

impl ChainConfig {
    pub fn new(tiers: Vec<ResolverConfig>) -> Self {
        Self { tiers }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::Misconfigured(format!("invalid chain config: {err}")))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|err| Error::Misconfigured(format!("invalid chain config: {err}")))
    }

    /// Load a config file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::Misconfigured(format!("cannot read {}: {err}", path.display()))
        })?;
        let is_json = path.extension().map_or(false, |ext| ext == "json");
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Find the chain config for `cwd`.
    ///
    /// Candidates are the home directory, then each ancestor of `cwd` from the
    /// root down, then `cwd` itself. The last directory holding a config wins;
    /// within one directory the JSON file wins over the YAML one.
    pub fn discover(cwd: &Path, home: Option<&Path>) -> Result<Self> {
        let mut found = None;
        for dir in candidate_dirs(cwd, home) {
            for name in [CONFIG_YAML, CONFIG_JSON] {
                let path = dir.join(name);
                if path.is_file() {
                    found = Some(path);
                }
            }
        }
        let path = found.ok_or_else(|| {
            Error::Misconfigured(format!(
                "no {CONFIG_YAML} or {CONFIG_JSON} found above {}",
                cwd.display()
            ))
        })?;
        debug!("using chain config {}", path.display());
        Self::load(&path)
    }

    /// `discover` from the process working directory and `$HOME`.
    pub fn discover_default() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::discover(&cwd, home.as_deref())
    }
}

fn candidate_dirs(cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = home.into_iter().map(Path::to_path_buf).collect();
    let mut ancestors: Vec<PathBuf> = cwd.ancestors().skip(1).map(Path::to_path_buf).collect();
    ancestors.reverse();
    dirs.extend(ancestors);
    dirs.push(cwd.to_path_buf());
    dirs
}
