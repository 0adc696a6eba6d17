//! Maps method nicknames to resolver constructors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
#[cfg(feature = "http")]
use std::time::Duration;

use log::debug;

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::layout::DEFAULT_SHARD_LEN;
#[cfg(feature = "http")]
use crate::resolver::HttpResolver;
use crate::resolver::{FsResolver, Resolver, StubbyTarResolver, ZiptreeResolver};

pub type Factory = fn(&ResolverConfig) -> Result<Arc<dyn Resolver>>;

/// Backends shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Path,
    Local,
    Pairtree,
    Stubbytree,
    Ziptree,
    StubbyTar,
    #[cfg(feature = "http")]
    Http,
}

impl BackendKind {
    pub const ALL: &'static [BackendKind] = &[
        BackendKind::Path,
        BackendKind::Local,
        BackendKind::Pairtree,
        BackendKind::Stubbytree,
        BackendKind::Ziptree,
        BackendKind::StubbyTar,
        #[cfg(feature = "http")]
        BackendKind::Http,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Path => "path",
            BackendKind::Local => "local",
            BackendKind::Pairtree => "pairtree",
            BackendKind::Stubbytree => "stubbytree",
            BackendKind::Ziptree => "ziptree",
            BackendKind::StubbyTar => "stubbytar",
            #[cfg(feature = "http")]
            BackendKind::Http => "http",
        }
    }

    pub fn factory(&self) -> Factory {
        match self {
            BackendKind::Path => build_path,
            BackendKind::Local => build_local,
            BackendKind::Pairtree => build_pairtree,
            BackendKind::Stubbytree => build_stubbytree,
            BackendKind::Ziptree => build_ziptree,
            BackendKind::StubbyTar => build_stubbytar,
            #[cfg(feature = "http")]
            BackendKind::Http => build_http,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone)]
pub struct Registry {
    factories: BTreeMap<String, Factory>,
}

impl Registry {
    /// Every built-in backend under its usual nickname.
    pub fn standard() -> Self {
        let mut builder = Self::builder();
        for kind in BackendKind::ALL {
            builder = builder.register(kind.name(), kind.factory());
        }
        builder.build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.factories.contains_key(method)
    }

    /// Construct the resolver a single tier describes.
    pub fn build(&self, config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
        let factory = self.factories.get(config.method.as_str()).ok_or_else(|| {
            let known: Vec<&str> = self.methods().collect();
            Error::Misconfigured(format!(
                "unknown resolver method {:?} (known: {})",
                config.method,
                known.join(", ")
            ))
        })?;
        debug!("building {} resolver at {:?}", config.method, config.location());
        factory(config)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    factories: BTreeMap<String, Factory>,
}

impl RegistryBuilder {
    /// Add or replace the constructor for `method`.
    pub fn register(mut self, method: impl Into<String>, factory: Factory) -> Self {
        self.factories.insert(method.into(), factory);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            factories: self.factories,
        }
    }
}

fn reject_url(config: &ResolverConfig) -> Result<()> {
    if config.url.is_some() {
        return Err(Error::Misconfigured(format!(
            "{} tier does not take a 'url'",
            config.method
        )));
    }
    Ok(())
}

fn build_path(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    reject_url(config)?;
    if config.dir.is_some() {
        return Err(Error::Misconfigured(
            "path tier takes identifiers as paths and has no 'dir'".to_string(),
        ));
    }
    Ok(Arc::new(FsResolver::literal(config.encoding())))
}

fn build_local(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    reject_url(config)?;
    Ok(Arc::new(FsResolver::local(config.require_dir()?, config.encoding())))
}

fn build_pairtree(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    reject_url(config)?;
    Ok(Arc::new(FsResolver::pairtree(config.require_dir()?, config.encoding())))
}

fn build_stubbytree(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    reject_url(config)?;
    Ok(Arc::new(FsResolver::stubbytree(config.require_dir()?, config.encoding())))
}

fn build_ziptree(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    reject_url(config)?;
    let shard_len = config.shard_len.unwrap_or(DEFAULT_SHARD_LEN);
    Ok(Arc::new(ZiptreeResolver::with_shard_len(
        config.require_dir()?,
        shard_len,
        config.encoding(),
    )?))
}

fn build_stubbytar(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    reject_url(config)?;
    Ok(Arc::new(StubbyTarResolver::new(config.require_dir()?, config.encoding())))
}

#[cfg(feature = "http")]
fn build_http(config: &ResolverConfig) -> Result<Arc<dyn Resolver>> {
    if config.dir.is_some() {
        return Err(Error::Misconfigured(
            "http tier takes a 'url', not a 'dir'".to_string(),
        ));
    }
    let template = config.url.as_deref().unwrap_or(crate::resolver::DEFAULT_URL);
    let timeout = config.timeout_secs.map(Duration::from_secs);
    Ok(Arc::new(HttpResolver::with_timeout(
        template,
        timeout,
        config.encoding(),
    )?))
}
