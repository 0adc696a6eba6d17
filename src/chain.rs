//! Assembles configured tiers into one nested fallback resolver.

use std::collections::HashSet;
use std::sync::Arc;

use log::info;

use crate::config::{ChainConfig, ResolverConfig};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::resolver::{FallbackResolver, Resolver};

/// Build `tiers` (nearest first) into a single resolver.
///
/// A one-tier chain is that tier itself. Longer chains nest: tier `i` becomes
/// the primary of a `FallbackResolver` whose fallback is the chain of tiers
/// `i+1..`, so a miss in tier `i` is filled from the first deeper tier that
/// has the resource and then lands in every tier on the way back.
pub fn build_chain(registry: &Registry, tiers: &[ResolverConfig]) -> Result<Arc<dyn Resolver>> {
    validate(tiers)?;

    let resolvers = tiers
        .iter()
        .map(|tier| registry.build(tier))
        .collect::<Result<Vec<_>>>()?;
    for (depth, resolver) in resolvers.iter().enumerate() {
        if !resolver.writable() && depth + 1 < resolvers.len() {
            return Err(Error::Misconfigured(format!(
                "read-only {} tier can only be the last tier",
                resolver.method()
            )));
        }
    }

    let mut resolvers = resolvers.into_iter().rev();
    let Some(mut chain) = resolvers.next() else {
        return Err(Error::Misconfigured("resolver chain is empty".to_string()));
    };
    for primary in resolvers {
        let nested: Arc<dyn Resolver> = Arc::new(FallbackResolver::new(primary, chain));
        chain = nested;
    }
    info!(
        "resolver chain: {}",
        tiers
            .iter()
            .map(|tier| tier.method.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(chain)
}

fn validate(tiers: &[ResolverConfig]) -> Result<()> {
    let Some(first) = tiers.first() else {
        return Err(Error::Misconfigured("resolver chain is empty".to_string()));
    };
    let mut seen = HashSet::new();
    for tier in tiers {
        if tier.format != first.format {
            return Err(Error::Misconfigured(format!(
                "all tiers must share one format; {} tier stores {} but {} tier stores {}",
                first.method, first.format, tier.method, tier.format
            )));
        }
        if !seen.insert((tier.method.as_str(), tier.location())) {
            return Err(Error::Misconfigured(format!(
                "{} tier at {:?} appears twice",
                tier.method,
                tier.location()
            )));
        }
    }
    Ok(())
}

impl ChainConfig {
    pub fn build(&self, registry: &Registry) -> Result<Arc<dyn Resolver>> {
        build_chain(registry, &self.tiers)
    }
}
