// ABOUTME: Core trait for the group-messaging transport and the data types it carries
// ABOUTME: Conversations, group members, outbound content, and inbound messages

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

// =============================================================================
// Message Content Types
// =============================================================================

/// Content that can be sent to a conversation
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Plain text message
    Plain(String),
    /// Markdown-formatted text
    Markdown(String),
    /// Wallet transaction request the recipient signs in their wallet
    WalletSendCalls(WalletSendCalls),
}

impl MessageContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown(text.into())
    }

    /// Text body, if this is a text message
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Plain(text) | Self::Markdown(text) => Some(text),
            Self::WalletSendCalls(_) => None,
        }
    }

    pub fn is_wallet_send_calls(&self) -> bool {
        matches!(self, Self::WalletSendCalls(_))
    }
}

/// Batch of contract calls for the recipient's wallet to sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSendCalls {
    pub version: String,
    pub from: String,
    /// Hex chain id, e.g. "0x2105" for Base
    pub chain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<WalletCapabilities>,
    pub calls: Vec<WalletCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_service: Option<PaymasterService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymasterService {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletCall {
    pub to: String,
    pub data: String,
    pub metadata: CallMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub description: String,
    pub transaction_type: String,
    pub event_name: String,
    pub event_label: String,
    pub hostname: String,
    pub title: String,
}

// =============================================================================
// Conversations and Members
// =============================================================================

/// Snapshot of a conversation's identity and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationInfo {
    /// Opaque conversation identifier
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// False for 1:1 DMs
    pub is_group: bool,
}

/// A member of a group conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    /// Transport-level member identifier
    pub inbox_id: String,
    /// Ethereum identities linked to this member, in transport order
    pub addresses: Vec<String>,
}

impl GroupMember {
    /// Lowercased primary Ethereum address, if the member has one
    pub fn primary_address(&self) -> Option<String> {
        self.addresses.first().map(|a| a.to_lowercase())
    }
}

// =============================================================================
// Incoming Message
// =============================================================================

/// Body of an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingContent {
    /// Text content
    Text(String),
    /// Transaction reference sent back after the user approved a wallet call.
    /// Shape varies by wallet; see `receipt::ExtractorChain`.
    TransactionReference(serde_json::Value),
}

/// Incoming message from the transport
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Conversation this message was sent in
    pub conversation_id: String,
    /// Sender's transport-level member identifier
    pub sender_inbox_id: String,
    /// Sender's Ethereum address, when the transport could resolve it
    pub sender_address: Option<String>,
    pub content: IncomingContent,
    /// Whether this is a direct message (1:1 conversation)
    pub is_direct: bool,
    /// Timestamp in seconds since Unix epoch
    pub timestamp: i64,
}

/// Boxed stream type for inbound messages
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

// =============================================================================
// Messaging Transport
// =============================================================================

/// Group-messaging network the agent is connected to.
///
/// Addresses are Ethereum addresses; member identifiers (inbox ids) are opaque
/// handles obtained only through `inbox_id_for`.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// The agent's own Ethereum address, lowercased
    fn agent_address(&self) -> &str;

    /// Batch reachability check. Keys are the addresses as given.
    async fn can_message(&self, addresses: &[String]) -> Result<HashMap<String, bool>>;

    /// Resolve the member identifier for an address
    async fn inbox_id_for(&self, address: &str) -> Result<Option<String>>;

    /// Pull the latest conversation list from the network
    async fn sync_conversations(&self) -> Result<()>;

    /// All known conversations, groups and DMs
    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>>;

    /// Create an empty group owned by the agent
    async fn create_group(&self) -> Result<ConversationInfo>;

    /// Refresh one group's state and return its current metadata
    async fn sync_group(&self, group_id: &str) -> Result<ConversationInfo>;

    /// Current members of a group, including the agent
    async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>>;

    async fn add_members(&self, group_id: &str, inbox_ids: &[String]) -> Result<()>;

    async fn remove_members(&self, group_id: &str, inbox_ids: &[String]) -> Result<()>;

    async fn update_name(&self, group_id: &str, name: &str) -> Result<()>;

    async fn update_description(&self, group_id: &str, description: &str) -> Result<()>;

    /// Send a message to a conversation by ID
    async fn send(&self, conversation_id: &str, content: MessageContent) -> Result<()>;

    /// Receive incoming messages as a stream
    async fn event_stream(&self) -> Result<EventStream>;

    /// Check if an address is the agent itself
    fn is_self(&self, address: &str) -> bool {
        address.eq_ignore_ascii_case(self.agent_address())
    }
}

/// Shared transport handle
pub type SharedTransport = Arc<dyn MessagingTransport>;
