use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use htrc_store::layout::rsync_path;
use htrc_store::{ChainConfig, Compression, Format, Registry, Resolver, Scheme, VolumeId};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chain config file; defaults to the nearest .htrc-config.yaml or .htrc-config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tree-relative path of a volume file
    Path {
        scheme: Scheme,
        id: String,
        #[arg(long, default_value = "json")]
        format: Format,
        #[arg(long, default_value = "bz2")]
        compression: Compression,
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Print the rsync path of the canonical json.bz2 file
    Rsync {
        id: String,
        #[arg(long, default_value = "stubbytree")]
        scheme: Scheme,
    },
    /// Stream a decompressed volume file to stdout through the resolver chain
    Cat {
        id: String,
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Write a decompressed volume file to `out` through the resolver chain
    Fetch {
        id: String,
        out: PathBuf,
        #[arg(long)]
        suffix: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Path {
            scheme,
            id,
            format,
            compression,
            suffix,
        } => {
            let id = VolumeId::parse(&id)?;
            let path = scheme.url_path(&id, format, compression, suffix.as_deref())?;
            println!("{path}");
        }
        Command::Rsync { id, scheme } => {
            let id = VolumeId::parse(&id)?;
            println!("{}", rsync_path(&id, scheme)?);
        }
        Command::Cat { id, suffix } => {
            let chain = load_chain(args.config)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let copied = copy_out(&*chain, &id, suffix, &mut out)?;
            out.flush()?;
            info!("wrote {copied} bytes of {id} to stdout");
        }
        Command::Fetch { id, out, suffix } => {
            let chain = load_chain(args.config)?;
            let file = File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let mut writer = BufWriter::new(file);
            let copied = copy_out(&*chain, &id, suffix, &mut writer)?;
            writer.flush()?;
            info!("wrote {copied} bytes of {id} to {}", out.display());
        }
    }
    Ok(())
}

fn load_chain(config: Option<PathBuf>) -> Result<Arc<dyn Resolver>> {
    let config = match config {
        Some(path) => ChainConfig::load(&path)
            .with_context(|| format!("Failed to load chain config {}", path.display()))?,
        None => ChainConfig::discover_default().context("Failed to discover chain config")?,
    };
    let chain = config
        .build(&Registry::standard())
        .context("Failed to build resolver chain")?;
    Ok(chain)
}

fn copy_out(
    chain: &dyn Resolver,
    id: &str,
    suffix: Option<String>,
    out: &mut dyn Write,
) -> Result<u64> {
    let mut request = chain.request();
    request.suffix = suffix;
    let mut reader = chain
        .open_read(id, &request)
        .with_context(|| format!("Failed to open {id}"))?;
    let copied = io::copy(&mut reader, out)?;
    Ok(copied)
}
