// ABOUTME: Maps Ethereum addresses to messaging member identifiers
// ABOUTME: Unreachable or unresolvable addresses are dropped, never fatal to the batch

use crate::deadline::Deadline;
use crate::traits::SharedTransport;
use anyhow::Result;
use std::collections::BTreeSet;

/// An address the transport can deliver to, with its member identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMember {
    pub address: String,
    pub inbox_id: String,
}

#[derive(Clone)]
pub struct ReachabilityResolver {
    transport: SharedTransport,
    deadline: Deadline,
}

impl ReachabilityResolver {
    pub fn new(transport: SharedTransport, deadline: Deadline) -> Self {
        Self {
            transport,
            deadline,
        }
    }

    /// Reachable addresses with resolved identifiers, in input order.
    ///
    /// Fails only when the batch reachability check itself fails.
    pub async fn resolve_reachable(&self, addresses: &[String]) -> Result<Vec<ResolvedMember>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let reachability = self
            .deadline
            .run("can_message", self.transport.can_message(addresses))
            .await?;

        let reachable: Vec<String> = addresses
            .iter()
            .filter(|address| {
                let ok = reachability.get(*address).copied().unwrap_or(false);
                if !ok {
                    tracing::debug!(address = %address, "Address is not reachable");
                }
                ok
            })
            .cloned()
            .collect();

        Ok(self.resolve_identifiers(&reachable).await)
    }

    /// Identifiers for `addresses` without a reachability check
    pub async fn resolve_identifiers(&self, addresses: &[String]) -> Vec<ResolvedMember> {
        let mut resolved = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self
                .deadline
                .run("inbox_id_for", self.transport.inbox_id_for(address))
                .await
            {
                Ok(Some(inbox_id)) => resolved.push(ResolvedMember {
                    address: address.to_lowercase(),
                    inbox_id,
                }),
                Ok(None) => {
                    tracing::debug!(address = %address, "No member identifier for address");
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Member identifier lookup failed");
                }
            }
        }
        resolved
    }
}

/// Distinct identifiers in first-seen order, for transport calls
pub fn inbox_ids(members: &[ResolvedMember]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    members
        .iter()
        .filter(|m| seen.insert(m.inbox_id.as_str()))
        .map(|m| m.inbox_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    const AGENT: &str = "0x00000000000000000000000000000000000a6e47";

    #[tokio::test]
    async fn test_unreachable_and_unresolvable_are_dropped() {
        let transport = MockTransport::new(AGENT)
            .with_user("0x01", "inbox-1")
            .with_user("0x02", "inbox-2")
            .with_unreachable("0x03");
        transport.fail_inbox_lookup("0x02");
        let resolver = ReachabilityResolver::new(Arc::new(transport), Deadline::from_secs(5));

        let resolved = resolver
            .resolve_reachable(&["0x01".to_string(), "0x02".to_string(), "0x03".to_string(), "0x04".to_string()])
            .await
            .unwrap();

        assert_eq!(
            resolved,
            vec![ResolvedMember {
                address: "0x01".to_string(),
                inbox_id: "inbox-1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_input_skips_transport() {
        let transport = Arc::new(MockTransport::new(AGENT));
        let resolver = ReachabilityResolver::new(transport.clone(), Deadline::from_secs(5));
        assert!(resolver.resolve_reachable(&[]).await.unwrap().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_identifiers_ignore_reachability() {
        let transport = MockTransport::new(AGENT).with_unreachable("0x03");
        let resolver = ReachabilityResolver::new(Arc::new(transport), Deadline::from_secs(5));
        let resolved = resolver.resolve_identifiers(&["0x03".to_string()]).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(inbox_ids(&resolved), vec!["inbox-0x03".to_string()]);
    }

    #[test]
    fn test_inbox_ids_are_distinct() {
        let member = |address: &str, inbox_id: &str| ResolvedMember {
            address: address.to_string(),
            inbox_id: inbox_id.to_string(),
        };
        let resolved = vec![
            member("0x01", "inbox-m"),
            member("0x02", "inbox-2"),
            member("0x03", "inbox-m"),
        ];
        assert_eq!(
            inbox_ids(&resolved),
            vec!["inbox-m".to_string(), "inbox-2".to_string()]
        );
    }
}
