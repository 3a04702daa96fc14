// ABOUTME: JSON wire types exchanged with the XMTP bridge sidecar
// ABOUTME: Converts bridge conversations, members, and messages into raduno-core types

use raduno_core::receipt::ExtractorChain;
use raduno_core::traits::{
    ConversationInfo, GroupMember, IncomingContent, IncomingMessage, MessageContent,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct ConnectRequest<'a> {
    pub wallet_key: &'a str,
    pub env: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectResponse {
    pub address: String,
    pub inbox_id: String,
}

#[derive(Debug, Serialize)]
pub struct AddressesRequest<'a> {
    pub addresses: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct CanMessageResponse {
    #[serde(default)]
    pub results: HashMap<String, bool>,
}

#[derive(Debug, Deserialize)]
pub struct InboxIdResponse {
    #[serde(default)]
    pub inbox_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InboxIdsRequest<'a> {
    pub inbox_ids: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct NameRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DescriptionRequest<'a> {
    pub description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDto {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// "group" or "dm"
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "group".to_string()
}

impl From<ConversationDto> for ConversationInfo {
    fn from(dto: ConversationDto) -> Self {
        ConversationInfo {
            id: dto.id,
            name: dto.name.filter(|n| !n.is_empty()),
            description: dto.description.filter(|d| !d.is_empty()),
            is_group: dto.kind != "dm",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversationsResponse {
    #[serde(default)]
    pub conversations: Vec<ConversationDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountIdentifier {
    pub identifier: String,
    pub identifier_kind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub inbox_id: String,
    #[serde(default)]
    pub account_identifiers: Vec<AccountIdentifier>,
}

impl From<MemberDto> for GroupMember {
    /// Only Ethereum identifiers count as addresses
    fn from(dto: MemberDto) -> Self {
        GroupMember {
            inbox_id: dto.inbox_id,
            addresses: dto
                .account_identifiers
                .into_iter()
                .filter(|id| id.identifier_kind.eq_ignore_ascii_case("ethereum"))
                .map(|id| id.identifier.to_lowercase())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MembersResponse {
    #[serde(default)]
    pub members: Vec<MemberDto>,
}

/// Outbound message body, tagged by content type
#[derive(Debug, Serialize)]
#[serde(tag = "content_type", content = "content")]
pub enum OutgoingContent<'a> {
    #[serde(rename = "text")]
    Text(&'a str),
    #[serde(rename = "markdown")]
    Markdown(&'a str),
    #[serde(rename = "walletSendCalls")]
    WalletSendCalls(&'a raduno_core::traits::WalletSendCalls),
}

impl<'a> From<&'a MessageContent> for OutgoingContent<'a> {
    fn from(content: &'a MessageContent) -> Self {
        match content {
            MessageContent::Plain(text) => OutgoingContent::Text(text),
            MessageContent::Markdown(text) => OutgoingContent::Markdown(text),
            MessageContent::WalletSendCalls(calls) => OutgoingContent::WalletSendCalls(calls),
        }
    }
}

/// One inbound message envelope as the bridge reports it
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDto {
    pub conversation_id: String,
    pub sender_inbox_id: String,
    pub content_type: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub is_dm: bool,
    #[serde(default)]
    pub sent_at_ns: i64,
    /// Whatever identity data the bridge attached; probed by `ExtractorChain::sender_address`
    #[serde(default)]
    pub sender: Value,
}

impl MessageDto {
    /// Convert to a core message. Unsupported content types yield `None`.
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let content = match self.content_type.as_str() {
            "text" | "markdown" => IncomingContent::Text(self.content.as_str()?.to_string()),
            "transactionReference" => IncomingContent::TransactionReference(self.content),
            other => {
                tracing::debug!(content_type = other, "Skipping unsupported message content type");
                return None;
            }
        };

        let sender_address = ExtractorChain::sender_address()
            .extract(&self.sender)
            .map(|found| found.value);

        Some(IncomingMessage {
            conversation_id: self.conversation_id,
            sender_inbox_id: self.sender_inbox_id,
            sender_address,
            content,
            is_direct: self.is_dm,
            timestamp: self.sent_at_ns / 1_000_000_000,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<MessageDto>,
    #[serde(default)]
    pub cursor: Option<String>,
}
