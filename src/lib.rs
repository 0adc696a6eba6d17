//! Identifier resolution and storage backends for HTRC extracted-features volumes.
//!
//! A volume identifier such as `mdp.39015012345` is mapped onto a file, a tree
//! path, a zip or tar member, or a URL by a [`Resolver`]. Resolvers can be
//! stacked into a read-through cache chain with [`build_chain`], usually from a
//! `.htrc-config.yaml` discovered next to the caller.

pub mod chain;
pub mod compression;
pub mod config;
pub mod error;
pub mod id;
pub mod layout;
pub mod registry;
pub mod resolver;
pub mod stream;

pub use chain::build_chain;
pub use compression::{Compression, Encoding, Format};
pub use config::{ChainConfig, ResolverConfig};
pub use error::{Error, ErrorKind, Result};
pub use id::{EncodedId, VolumeId};
pub use layout::Scheme;
pub use registry::{BackendKind, Registry};
pub use resolver::{copy_resource, FallbackResolver, Request, Resolver};
pub use stream::{Mode, ResourceReader, ResourceSink, ResourceWriter, Stream};
