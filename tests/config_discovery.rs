use std::io::{Read, Write};

use htrc_store::config::CONFIG_YAML;
use htrc_store::{ChainConfig, ErrorKind, Registry, Resolver};
use tempfile::tempdir;

#[test]
fn discovered_config_builds_a_working_chain() {
    let root = tempdir().expect("tempdir");
    let cache = root.path().join("cache");
    let mirror = root.path().join("mirror");
    let project = root.path().join("project").join("notebooks");
    std::fs::create_dir_all(&project).expect("project");

    let yaml = format!(
        "resolver:\n  - method: pairtree\n    dir: {}\n    format: json\n    compression: gz\n  - method: local\n    directory: {}\n    format: json\n    compression: bz2\n",
        cache.display(),
        mirror.display()
    );
    std::fs::write(root.path().join("project").join(CONFIG_YAML), yaml).expect("config");

    let config = ChainConfig::discover(&project, None).expect("discover");
    assert_eq!(config.tiers.len(), 2);
    let chain = config.build(&Registry::standard()).expect("chain");
    assert_eq!(chain.method(), "pairtree");

    let mut writer = chain
        .open_write("uc1.b3342759", &chain.request())
        .expect("open write");
    writer.write_all(b"volume").expect("write");
    writer.finish().expect("finish");

    let mut out = String::new();
    chain
        .open_read("uc1.b3342759", &chain.request())
        .expect("open read")
        .read_to_string(&mut out)
        .expect("read");
    assert_eq!(out, "volume");
    assert!(!mirror.exists());
}

#[test]
fn unknown_keys_and_methods_are_rejected() {
    let err = ChainConfig::from_yaml_str(
        "- {method: local, dir: /x, format: json, compression: gz, colour: blue}\n",
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Misconfigured);

    let config = ChainConfig::from_yaml_str(
        "- {method: s3, dir: /x, format: json, compression: gz}\n",
    )
    .expect("parses");
    let err = config.build(&Registry::standard()).err().expect("unknown method");
    assert_eq!(err.kind(), ErrorKind::Misconfigured);
}

#[test]
fn json_config_is_loaded_by_extension() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tiers.json");
    std::fs::write(
        &path,
        r#"{"resolver": [{"method": "ziptree", "dir": "/tmp/z", "format": "parquet", "compression": "none"}]}"#,
    )
    .expect("write");
    let config = ChainConfig::load(&path).expect("load");
    assert_eq!(config.tiers[0].method, "ziptree");
}
