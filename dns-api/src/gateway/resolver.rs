//! CIDR to backend network id resolution.
//!
//! The backend cannot look up the network containing a CIDR, only
//! addresses that are already allocated. So the first few addresses of
//! the block are probed; the first one found leads to its network via
//! the parent link.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

use super::{EntityGateway, GatewayError};

/// Number of leading addresses probed before giving up.
pub const CANARY_PROBE_LIMIT: usize = 10;

pub struct NetworkResolver<'g> {
    gateway: &'g EntityGateway,
}

impl<'g> NetworkResolver<'g> {
    pub fn new(gateway: &'g EntityGateway) -> Self {
        Self { gateway }
    }

    /// Network id containing `cidr`, or `None` when none of the probed
    /// addresses is allocated. Only NotFound moves on to the next
    /// candidate; any other failure is returned.
    pub async fn resolve(&self, cidr: &str) -> Result<Option<i64>, GatewayError> {
        let block: Ipv4Network = cidr
            .trim()
            .parse()
            .map_err(|e| GatewayError::bad_request(format!("Invalid CIDR {}: {}", cidr, e)))?;

        for candidate in block.iter().take(CANARY_PROBE_LIMIT) {
            tracing::info!(%candidate, cidr, "Trying address as canary");
            match self.probe(candidate).await {
                Ok(network_id) => {
                    tracing::debug!(%candidate, network_id, "Canary resolved network");
                    return Ok(Some(network_id));
                }
                Err(GatewayError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(cidr, "No allocated canary address in block");
        Ok(None)
    }

    async fn probe(&self, candidate: Ipv4Addr) -> Result<i64, GatewayError> {
        let address = self.gateway.get_ip4_address(&candidate.to_string()).await?;
        self.gateway.parent_id(address.id).await
    }
}
