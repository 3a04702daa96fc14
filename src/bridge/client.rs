// ABOUTME: MessagingTransport implementation backed by the XMTP bridge sidecar's REST API
// ABOUTME: Group management, sends, and a long-poll inbound message stream

use super::wire::{
    AddressesRequest, CanMessageResponse, ConnectRequest, ConnectResponse, ConversationDto,
    ConversationsResponse, DescriptionRequest, InboxIdResponse, InboxIdsRequest, MembersResponse,
    MessagesResponse, NameRequest, OutgoingContent,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use raduno_core::config::XmtpConfig;
use raduno_core::traits::{
    ConversationInfo, EventStream, GroupMember, IncomingMessage, MessageContent,
    MessagingTransport,
};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Server-side hold time for one message poll
const POLL_WAIT_SECS: u64 = 25;
/// Pause after a failed poll before trying again
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Thin JSON client for the bridge
#[derive(Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BridgeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        self.http.request(method, self.endpoint(path)).timeout(timeout)
    }

    async fn send_raw<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut request = self.request(method.clone(), path, timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        execute(request, &method, path).await
    }

    async fn call<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send_raw(method, path, body, self.timeout)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse bridge response for {}", path))
    }

    async fn call_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        self.send_raw(method, path, body, self.timeout).await?;
        Ok(())
    }

    fn poll_request(&self, cursor: Option<&str>) -> RequestBuilder {
        let timeout = self.timeout + Duration::from_secs(POLL_WAIT_SECS);
        let request = self
            .request(Method::GET, "messages", timeout)
            .query(&[("wait", POLL_WAIT_SECS)]);
        match cursor {
            Some(cursor) => request.query(&[("cursor", cursor)]),
            None => request,
        }
    }

    async fn poll_messages(&self, cursor: Option<&str>) -> Result<MessagesResponse> {
        execute(self.poll_request(cursor), &Method::GET, "messages")
            .await?
            .json()
            .await
            .context("Failed to parse bridge message batch")
    }
}

async fn execute(request: RequestBuilder, method: &Method, path: &str) -> Result<reqwest::Response> {
    let response = request
        .send()
        .await
        .with_context(|| format!("Bridge request {} {} failed", method, path))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Bridge {} {} returned {}: {}", method, path, status, text);
    }
    Ok(response)
}

/// Connected agent identity on the bridge
pub struct BridgeTransport {
    client: BridgeClient,
    agent_address: String,
    agent_inbox_id: String,
    stream_taken: AtomicBool,
}

impl BridgeTransport {
    /// Register the wallet with the bridge and return a transport bound to it
    pub async fn connect(config: &XmtpConfig, timeout: Duration) -> Result<Self> {
        let wallet_key = config
            .wallet_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("xmtp.wallet_key is required to connect to the bridge")?;

        let client = BridgeClient::new(&config.bridge_url, timeout)?;
        let request = ConnectRequest {
            wallet_key,
            env: &config.env,
            db_path: config.db_path.as_deref(),
        };
        let identity: ConnectResponse = client
            .call(Method::POST, "connect", Some(&request))
            .await
            .with_context(|| format!("Failed to connect to XMTP bridge at {}", config.bridge_url))?;

        tracing::info!(
            address = %identity.address,
            inbox_id = %identity.inbox_id,
            env = %config.env,
            "Connected to XMTP bridge"
        );

        Ok(Self::from_identity(client, identity.address, identity.inbox_id))
    }

    fn from_identity(client: BridgeClient, address: String, inbox_id: String) -> Self {
        Self {
            client,
            agent_address: address.to_lowercase(),
            agent_inbox_id: inbox_id,
            stream_taken: AtomicBool::new(false),
        }
    }

    pub fn agent_inbox_id(&self) -> &str {
        &self.agent_inbox_id
    }
}

struct PollState {
    client: BridgeClient,
    agent_inbox_id: String,
    cursor: Option<String>,
    buffered: VecDeque<IncomingMessage>,
}

#[async_trait]
impl MessagingTransport for BridgeTransport {
    fn agent_address(&self) -> &str {
        &self.agent_address
    }

    async fn can_message(&self, addresses: &[String]) -> Result<HashMap<String, bool>> {
        let response: CanMessageResponse = self
            .client
            .call(Method::POST, "can-message", Some(&AddressesRequest { addresses }))
            .await?;

        // Keys come back in whatever case the bridge used; re-key to the caller's spelling
        let by_lower: HashMap<String, bool> = response
            .results
            .into_iter()
            .map(|(address, ok)| (address.to_lowercase(), ok))
            .collect();
        Ok(addresses
            .iter()
            .map(|address| {
                let ok = by_lower
                    .get(&address.to_lowercase())
                    .copied()
                    .unwrap_or(false);
                (address.clone(), ok)
            })
            .collect())
    }

    async fn inbox_id_for(&self, address: &str) -> Result<Option<String>> {
        let response: InboxIdResponse = self
            .client
            .call::<(), _>(Method::GET, &format!("inbox-id/{}", address), None)
            .await?;
        Ok(response.inbox_id.filter(|id| !id.is_empty()))
    }

    async fn sync_conversations(&self) -> Result<()> {
        self.client
            .call_unit::<()>(Method::POST, "conversations/sync", None)
            .await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>> {
        let response: ConversationsResponse = self
            .client
            .call::<(), _>(Method::GET, "conversations", None)
            .await?;
        Ok(response.conversations.into_iter().map(Into::into).collect())
    }

    async fn create_group(&self) -> Result<ConversationInfo> {
        let group: ConversationDto = self
            .client
            .call::<(), _>(Method::POST, "groups", None)
            .await?;
        Ok(group.into())
    }

    async fn sync_group(&self, group_id: &str) -> Result<ConversationInfo> {
        let group: ConversationDto = self
            .client
            .call::<(), _>(Method::POST, &format!("groups/{}/sync", group_id), None)
            .await?;
        Ok(group.into())
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let response: MembersResponse = self
            .client
            .call::<(), _>(Method::GET, &format!("groups/{}/members", group_id), None)
            .await?;
        Ok(response.members.into_iter().map(Into::into).collect())
    }

    async fn add_members(&self, group_id: &str, inbox_ids: &[String]) -> Result<()> {
        self.client
            .call_unit(
                Method::POST,
                &format!("groups/{}/members", group_id),
                Some(&InboxIdsRequest { inbox_ids }),
            )
            .await
    }

    async fn remove_members(&self, group_id: &str, inbox_ids: &[String]) -> Result<()> {
        self.client
            .call_unit(
                Method::POST,
                &format!("groups/{}/members/remove", group_id),
                Some(&InboxIdsRequest { inbox_ids }),
            )
            .await
    }

    async fn update_name(&self, group_id: &str, name: &str) -> Result<()> {
        self.client
            .call_unit(
                Method::PUT,
                &format!("groups/{}/name", group_id),
                Some(&NameRequest { name }),
            )
            .await
    }

    async fn update_description(&self, group_id: &str, description: &str) -> Result<()> {
        self.client
            .call_unit(
                Method::PUT,
                &format!("groups/{}/description", group_id),
                Some(&DescriptionRequest { description }),
            )
            .await
    }

    async fn send(&self, conversation_id: &str, content: MessageContent) -> Result<()> {
        let body = OutgoingContent::from(&content);
        self.client
            .call_unit(
                Method::POST,
                &format!("conversations/{}/messages", conversation_id),
                Some(&body),
            )
            .await
    }

    async fn event_stream(&self) -> Result<EventStream> {
        if self.stream_taken.swap(true, Ordering::SeqCst) {
            anyhow::bail!("Message stream already taken");
        }

        let state = PollState {
            client: self.client.clone(),
            agent_inbox_id: self.agent_inbox_id.clone(),
            cursor: None,
            buffered: VecDeque::new(),
        };

        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(message) = state.buffered.pop_front() {
                    return Some((message, state));
                }

                match state.client.poll_messages(state.cursor.as_deref()).await {
                    Ok(batch) => {
                        if batch.cursor.is_some() {
                            state.cursor = batch.cursor;
                        }
                        for dto in batch.messages {
                            // Our own sends echo back through the stream
                            if dto.sender_inbox_id == state.agent_inbox_id {
                                continue;
                            }
                            if let Some(message) = dto.into_incoming() {
                                state.buffered.push_back(message);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Message poll failed, retrying");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BridgeClient {
        BridgeClient::new("http://127.0.0.1:1/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = client();
        assert_eq!(client.endpoint("connect"), "http://127.0.0.1:1/v1/connect");
        assert_eq!(
            client.endpoint("/groups/g1/sync"),
            "http://127.0.0.1:1/v1/groups/g1/sync"
        );
    }

    #[test]
    fn test_poll_cursor_is_query_encoded() {
        let request = client().poll_request(Some("a b&c=d/e")).build().unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://127.0.0.1:1/v1/messages?wait=25&cursor=a+b%26c%3Dd%2Fe"
        );
        assert_eq!(
            request.timeout(),
            Some(&Duration::from_secs(1 + POLL_WAIT_SECS))
        );

        let first = client().poll_request(None).build().unwrap();
        assert_eq!(first.url().as_str(), "http://127.0.0.1:1/v1/messages?wait=25");
    }

    #[test]
    fn test_agent_address_is_lowercased() {
        let transport = BridgeTransport::from_identity(
            client(),
            "0xABCDEF0000000000000000000000000000000001".to_string(),
            "inbox-agent".to_string(),
        );
        assert_eq!(
            transport.agent_address(),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert!(transport.is_self("0xAbCdEf0000000000000000000000000000000001"));
        assert_eq!(transport.agent_inbox_id(), "inbox-agent");
    }

    #[tokio::test]
    async fn test_event_stream_can_only_be_taken_once() {
        let transport = BridgeTransport::from_identity(
            client(),
            "0x0000000000000000000000000000000000000001".to_string(),
            "inbox-agent".to_string(),
        );
        assert!(transport.event_stream().await.is_ok());
        assert!(transport.event_stream().await.is_err());
    }

    #[tokio::test]
    async fn test_connect_requires_wallet_key() {
        let config = XmtpConfig {
            wallet_key: Some("   ".to_string()),
            env: "dev".to_string(),
            db_path: None,
            bridge_url: "http://127.0.0.1:1".to_string(),
        };
        let err = BridgeTransport::connect(&config, Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("wallet_key"));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_fails_with_context() {
        let transport = BridgeTransport::from_identity(
            client(),
            "0x0000000000000000000000000000000000000001".to_string(),
            "inbox-agent".to_string(),
        );
        let err = transport.sync_conversations().await.unwrap_err();
        assert!(format!("{:#}", err).contains("conversations/sync"));
    }
}
