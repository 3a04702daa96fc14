// ABOUTME: EventContracts implementation that ABI-encodes calls and decodes return data
// ABOUTME: Targets the event factory, individual event contracts, and the L2 name registry

use super::client::RpcClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use raduno_core::abi::{self, Token};
use raduno_core::chain::EventContracts;
use std::sync::Arc;

/// Contract reads over JSON-RPC
#[derive(Clone)]
pub struct RpcEventContracts {
    rpc: Arc<RpcClient>,
    factory: String,
    registry: String,
}

impl RpcEventContracts {
    pub fn new(rpc: Arc<RpcClient>, factory: &str, registry: &str) -> Result<Self> {
        abi::parse_address(factory).context("Invalid factory address")?;
        abi::parse_address(registry).context("Invalid registry address")?;
        Ok(Self {
            rpc,
            factory: factory.to_lowercase(),
            registry: registry.to_lowercase(),
        })
    }

    async fn call(&self, to: &str, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        let data = abi::encode_call(signature, args);
        self.rpc
            .eth_call(to, &data)
            .await
            .with_context(|| format!("{} on {}", signature, to))
    }
}

#[async_trait]
impl EventContracts for RpcEventContracts {
    async fn deployed_events(&self) -> Result<Vec<String>> {
        let data = self.call(&self.factory, "getDeployedEvents()", &[]).await?;
        abi::decode_address_array(&data)
    }

    async fn owner(&self, event: &str) -> Result<String> {
        let data = self.call(event, "owner()", &[]).await?;
        abi::decode_address(&data)
    }

    async fn label(&self, event: &str) -> Result<String> {
        let data = self.call(event, "label()", &[]).await?;
        abi::decode_string(&data)
    }

    async fn participants(&self, event: &str) -> Result<Vec<String>> {
        let data = self.call(event, "getAllParticipants()", &[]).await?;
        abi::decode_address_array(&data)
    }

    async fn is_participant(&self, event: &str, account: &str) -> Result<bool> {
        let account = abi::parse_address(account).context("Invalid participant address")?;
        let data = self
            .call(event, "isParticipant(address)", &[Token::Address(account)])
            .await?;
        abi::decode_bool(&data)
    }

    async fn participant_count(&self, event: &str) -> Result<u64> {
        let data = self.call(event, "getParticipantCount()", &[]).await?;
        abi::decode_uint(&data)
    }

    async fn capacity(&self, event: &str) -> Result<u64> {
        let data = self.call(event, "capacity()", &[]).await?;
        abi::decode_uint(&data)
    }

    async fn text_record(&self, node: [u8; 32], key: &str) -> Result<String> {
        let data = self
            .call(
                &self.registry,
                "text(bytes32,string)",
                &[Token::FixedBytes32(node), Token::String(key.to_string())],
            )
            .await?;
        abi::decode_string(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rpc() -> Arc<RpcClient> {
        Arc::new(RpcClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap())
    }

    #[test]
    fn test_rejects_invalid_addresses() {
        assert!(RpcEventContracts::new(rpc(), "0x1234", "0xC02f3b4CbE3431a46A19416211AeE7F004d829C3").is_err());
        assert!(RpcEventContracts::new(
            rpc(),
            "0x1111111111111111111111111111111111111111",
            "registry"
        )
        .is_err());
    }

    #[test]
    fn test_addresses_are_lowercased() {
        let contracts = RpcEventContracts::new(
            rpc(),
            "0xABCDEF0000000000000000000000000000000001",
            "0xC02f3b4CbE3431a46A19416211AeE7F004d829C3",
        )
        .unwrap();
        assert_eq!(contracts.factory, "0xabcdef0000000000000000000000000000000001");
        assert_eq!(contracts.registry, "0xc02f3b4cbe3431a46a19416211aee7f004d829c3");
    }
}
