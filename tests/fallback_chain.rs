use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use htrc_store::resolver::{FsResolver, ZiptreeResolver};
use htrc_store::{
    build_chain, Compression, Encoding, Error, ErrorKind, FallbackResolver, Format, Registry,
    Request, ResolverConfig, ResourceReader, ResourceWriter, Resolver, Result,
};
use tempfile::tempdir;

const ID: &str = "mdp.39015012345";
const BODY: &[u8] = b"{\"id\":\"mdp.39015012345\"}";

/// Origin that serves one resource and panics if asked twice.
struct OneShotOrigin {
    hits: AtomicUsize,
}

impl OneShotOrigin {
    fn new() -> Self {
        Self {
            hits: AtomicUsize::new(0),
        }
    }
}

impl Resolver for OneShotOrigin {
    fn method(&self) -> &str {
        "origin"
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    fn encoding(&self) -> Encoding {
        Encoding::new(Format::Json, Compression::None)
    }

    fn writable(&self) -> bool {
        false
    }

    fn open_raw_read(&self, id: &str, _request: &Request) -> Result<ResourceReader> {
        let previous = self.hits.fetch_add(1, Ordering::SeqCst);
        assert_eq!(previous, 0, "origin consulted twice for {id}");
        if id != ID {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(Box::new(Cursor::new(BODY.to_vec())))
    }

    fn open_raw_write(&self, id: &str, _request: &Request) -> Result<ResourceWriter> {
        Err(Error::Unsupported(format!("origin is read-only: {id}")))
    }
}

/// Origin whose every read fails with a server error.
struct FailingOrigin;

impl Resolver for FailingOrigin {
    fn method(&self) -> &str {
        "origin"
    }

    fn location(&self) -> String {
        "https://origin.invalid".to_string()
    }

    fn encoding(&self) -> Encoding {
        Encoding::new(Format::Json, Compression::Bz2)
    }

    fn writable(&self) -> bool {
        false
    }

    fn open_raw_read(&self, id: &str, _request: &Request) -> Result<ResourceReader> {
        Err(Error::Http {
            url: format!("https://origin.invalid/{id}"),
            status: Some(500),
            detail: "internal server error".to_string(),
        })
    }

    fn open_raw_write(&self, id: &str, _request: &Request) -> Result<ResourceWriter> {
        Err(Error::Unsupported(format!("origin is read-only: {id}")))
    }
}

/// A ziptree whose lookups always miss, standing in for a cache whose index
/// lags behind its archives.
struct StaleZiptree(ZiptreeResolver);

impl Resolver for StaleZiptree {
    fn method(&self) -> &str {
        self.0.method()
    }

    fn location(&self) -> String {
        self.0.location()
    }

    fn encoding(&self) -> Encoding {
        self.0.encoding()
    }

    fn open_raw_read(&self, id: &str, _request: &Request) -> Result<ResourceReader> {
        Err(Error::NotFound(id.to_string()))
    }

    fn open_raw_write(&self, id: &str, request: &Request) -> Result<ResourceWriter> {
        self.0.open_raw_write(id, request)
    }
}

fn read(resolver: &dyn Resolver, id: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    resolver
        .open_read(id, &resolver.request())?
        .read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn miss_is_filled_once_and_then_served_locally() {
    let dir = tempdir().expect("tempdir");
    let cache = Arc::new(FsResolver::pairtree(
        dir.path(),
        Encoding::new(Format::Json, Compression::Gz),
    ));
    let origin = Arc::new(OneShotOrigin::new());
    let resolver = FallbackResolver::new(cache.clone(), origin.clone());

    assert_eq!(read(&resolver, ID).expect("first read"), BODY);
    assert_eq!(read(&resolver, ID).expect("second read"), BODY);
    assert_eq!(origin.hits.load(Ordering::SeqCst), 1);

    // The cache stores its own compression, not the origin's.
    let cached = cache.path(ID, &cache.request()).expect("path");
    let raw = std::fs::read(cached).expect("cached file");
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);
}

#[test]
fn miss_in_origin_leaves_cache_untouched() {
    let dir = tempdir().expect("tempdir");
    let cache = Arc::new(FsResolver::local(
        dir.path(),
        Encoding::new(Format::Json, Compression::Bz2),
    ));
    let resolver = FallbackResolver::new(cache, Arc::new(OneShotOrigin::new()));
    let err = read(&resolver, "mdp.404").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn three_tier_chain_backfills_every_level() {
    let dir = tempdir().expect("tempdir");
    let l1 = dir.path().join("l1");
    let l2 = dir.path().join("l2");
    let l3 = dir.path().join("l3");

    // Seed the deepest tier directly.
    let origin = FsResolver::stubbytree(&l3, Encoding::new(Format::Json, Compression::Bz2));
    let mut writer = origin.open_write(ID, &origin.request()).expect("seed");
    writer.write_all(BODY).expect("write");
    writer.finish().expect("finish");

    let tiers = vec![
        ResolverConfig::new("local", Format::Json, Compression::None).with_dir(&l1),
        ResolverConfig::new("ziptree", Format::Json, Compression::Gz).with_dir(&l2),
        ResolverConfig::new("stubbytree", Format::Json, Compression::Bz2).with_dir(&l3),
    ];
    let chain = build_chain(&Registry::standard(), &tiers).expect("chain");
    assert_eq!(read(chain.as_ref(), ID).expect("read"), BODY);

    assert_eq!(
        std::fs::read(l1.join("mdp.39015012345.json")).expect("l1 copy"),
        BODY
    );
    let l2_tier = ZiptreeResolver::new(&l2, Encoding::new(Format::Json, Compression::Gz))
        .expect("ziptree");
    assert_eq!(read(&l2_tier, ID).expect("l2 copy"), BODY);
}

#[test]
fn chain_writes_land_in_the_nearest_tier_only() {
    let dir = tempdir().expect("tempdir");
    let near = dir.path().join("near");
    let far = dir.path().join("far");
    let tiers = vec![
        ResolverConfig::new("pairtree", Format::Json, Compression::Gz).with_dir(&near),
        ResolverConfig::new("local", Format::Json, Compression::Gz).with_dir(&far),
    ];
    let chain = build_chain(&Registry::standard(), &tiers).expect("chain");
    let mut writer = chain.open_write(ID, &chain.request()).expect("open");
    writer.write_all(BODY).expect("write");
    writer.finish().expect("finish");

    assert!(near.join("mdp").is_dir());
    assert!(!far.exists());
}

#[test]
fn unfinished_write_through_chain_leaves_nothing_behind() {
    let dir = tempdir().expect("tempdir");
    let tiers = vec![ResolverConfig::new("local", Format::Json, Compression::Gz).with_dir(dir.path())];
    let chain = build_chain(&Registry::standard(), &tiers).expect("chain");
    {
        let mut writer = chain.open_write(ID, &chain.request()).expect("open");
        writer.write_all(BODY).expect("write");
    }
    let err = read(chain.as_ref(), ID).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn fallback_failure_reaches_caller_and_cache_stays_empty() {
    let dir = tempdir().expect("tempdir");
    let cache = Arc::new(FsResolver::stubbytree(
        dir.path(),
        Encoding::new(Format::Json, Compression::Gz),
    ));
    let resolver = FallbackResolver::new(cache, Arc::new(FailingOrigin));

    let err = read(&resolver, ID).unwrap_err();
    assert!(matches!(err, Error::Http { status: Some(500), .. }));
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn failed_materialization_propagates_and_keeps_primary_intact() {
    let dir = tempdir().expect("tempdir");
    let encoding = Encoding::new(Format::Json, Compression::None);
    let tier = ZiptreeResolver::new(dir.path(), encoding).expect("ziptree");
    let mut writer = tier.open_write(ID, &tier.request()).expect("seed");
    writer.write_all(b"original").expect("write");
    writer.finish().expect("finish");

    let origin = Arc::new(OneShotOrigin::new());
    let resolver = FallbackResolver::new(
        Arc::new(StaleZiptree(tier.clone())),
        origin.clone(),
    );
    let err = read(&resolver, ID).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(origin.hits.load(Ordering::SeqCst), 1);

    assert_eq!(read(&tier, ID).expect("primary copy"), b"original");
}
