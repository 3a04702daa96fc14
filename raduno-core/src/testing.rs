// ABOUTME: In-memory doubles for the messaging transport and event contracts
// ABOUTME: Call-recording and scriptable failures for reconciler and assistant tests

use crate::abi::namehash;
use crate::chain::EventContracts;
use crate::traits::{
    ConversationInfo, EventStream, GroupMember, IncomingMessage, MessageContent,
    MessagingTransport,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Inbox id the mock assigns to the agent itself
pub const AGENT_INBOX_ID: &str = "inbox-agent";

// =============================================================================
// MockTransport
// =============================================================================

/// One recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    CanMessage(Vec<String>),
    InboxIdFor(String),
    SyncConversations,
    ListConversations,
    CreateGroup(String),
    SyncGroup(String),
    GroupMembers(String),
    AddMembers { group_id: String, inbox_ids: Vec<String> },
    RemoveMembers { group_id: String, inbox_ids: Vec<String> },
    UpdateName { group_id: String, name: String },
    UpdateDescription { group_id: String, description: String },
    Send { conversation_id: String, content: MessageContent },
}

#[derive(Debug, Clone)]
struct MockUser {
    inbox_id: String,
    reachable: bool,
}

#[derive(Debug, Clone)]
struct MockGroup {
    info: ConversationInfo,
    members: Vec<GroupMember>,
}

struct TransportState {
    users: HashMap<String, MockUser>,
    failing_lookups: HashSet<String>,
    failing_adds: HashSet<String>,
    failing_calls: HashSet<&'static str>,
    hanging_calls: HashSet<&'static str>,
    groups: Vec<MockGroup>,
    next_group: usize,
    calls: Vec<TransportCall>,
    incoming_tx: mpsc::UnboundedSender<IncomingMessage>,
    incoming_rx: Option<mpsc::UnboundedReceiver<IncomingMessage>>,
}

/// Transport double. Clones share state, so a test can keep a handle after
/// passing an `Arc` to the code under test.
#[derive(Clone)]
pub struct MockTransport {
    agent_address: String,
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new(agent_address: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent_address = agent_address.to_lowercase();
        let mut users = HashMap::new();
        users.insert(
            agent_address.clone(),
            MockUser {
                inbox_id: AGENT_INBOX_ID.to_string(),
                reachable: true,
            },
        );
        Self {
            agent_address,
            state: Arc::new(Mutex::new(TransportState {
                users,
                failing_lookups: HashSet::new(),
                failing_adds: HashSet::new(),
                failing_calls: HashSet::new(),
                hanging_calls: HashSet::new(),
                groups: Vec::new(),
                next_group: 0,
                calls: Vec::new(),
                incoming_tx: tx,
                incoming_rx: Some(rx),
            })),
        }
    }

    /// A reachable user with a known inbox id
    pub fn with_user(self, address: &str, inbox_id: &str) -> Self {
        self.state().users.insert(
            address.to_lowercase(),
            MockUser {
                inbox_id: inbox_id.to_string(),
                reachable: true,
            },
        );
        self
    }

    /// A user with identity `inbox-<address>` that cannot receive messages
    pub fn with_unreachable(self, address: &str) -> Self {
        let address = address.to_lowercase();
        self.state().users.insert(
            address.clone(),
            MockUser {
                inbox_id: format!("inbox-{}", address),
                reachable: false,
            },
        );
        self
    }

    /// Link another reachable address to an existing inbox. Group members with
    /// that inbox list the new address first.
    pub fn link_address(&self, inbox_id: &str, address: &str) {
        let address = address.to_lowercase();
        let mut state = self.state();
        state.users.insert(
            address.clone(),
            MockUser {
                inbox_id: inbox_id.to_string(),
                reachable: true,
            },
        );
        for group in state.groups.iter_mut() {
            for member in group.members.iter_mut().filter(|m| m.inbox_id == inbox_id) {
                if !member.addresses.contains(&address) {
                    member.addresses.insert(0, address.clone());
                }
            }
        }
    }

    /// Make `inbox_id_for(address)` return an error
    pub fn fail_inbox_lookup(&self, address: &str) {
        self.state().failing_lookups.insert(address.to_lowercase());
    }

    /// Make any `add_members` batch containing `inbox_id` fail
    pub fn fail_add_members_containing(&self, inbox_id: &str) {
        self.state().failing_adds.insert(inbox_id.to_string());
    }

    /// Make every call named `call` (e.g. "sync_conversations") fail
    pub fn fail_call(&self, call: &'static str) {
        self.state().failing_calls.insert(call);
    }

    /// Make every call named `call` never complete
    pub fn hang_call(&self, call: &'static str) {
        self.state().hanging_calls.insert(call);
    }

    /// Seed an existing group; members are given by address, the agent is always included
    pub fn insert_group(&self, group_id: &str, name: &str, member_addresses: &[&str]) {
        let mut state = self.state();
        let mut members = vec![agent_member(&self.agent_address)];
        for address in member_addresses {
            members.push(member_for(&state.users, address));
        }
        state.groups.push(MockGroup {
            info: ConversationInfo {
                id: group_id.to_string(),
                name: Some(name.to_string()),
                description: None,
                is_group: true,
            },
            members,
        });
    }

    /// Queue a message for `event_stream`
    pub fn push_incoming(&self, message: IncomingMessage) {
        let _ = self.state().incoming_tx.send(message);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Messages sent, as (conversation id, content)
    pub fn sent_messages(&self) -> Vec<(String, MessageContent)> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Send {
                    conversation_id,
                    content,
                } => Some((conversation_id.clone(), content.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn group(&self, group_id: &str) -> Option<ConversationInfo> {
        self.state()
            .groups
            .iter()
            .find(|g| g.info.id == group_id)
            .map(|g| g.info.clone())
    }

    pub fn groups(&self) -> Vec<ConversationInfo> {
        self.state().groups.iter().map(|g| g.info.clone()).collect()
    }

    /// Sorted primary addresses of a group's members, agent included
    pub fn member_addresses(&self, group_id: &str) -> Vec<String> {
        let state = self.state();
        let mut addresses: Vec<String> = state
            .groups
            .iter()
            .find(|g| g.info.id == group_id)
            .map(|g| g.members.iter().filter_map(|m| m.primary_address()).collect())
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, name: &'static str, call: TransportCall) -> Result<()> {
        let hang = {
            let mut state = self.state();
            state.calls.push(call);
            if state.failing_calls.contains(name) {
                bail!("mock transport: {} failed", name);
            }
            state.hanging_calls.contains(name)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn with_group<T>(&self, group_id: &str, f: impl FnOnce(&mut MockGroup) -> T) -> Result<T> {
        let mut state = self.state();
        match state.groups.iter_mut().find(|g| g.info.id == group_id) {
            Some(group) => Ok(f(group)),
            None => bail!("mock transport: unknown group {}", group_id),
        }
    }
}

fn agent_member(agent_address: &str) -> GroupMember {
    GroupMember {
        inbox_id: AGENT_INBOX_ID.to_string(),
        addresses: vec![agent_address.to_string()],
    }
}

fn member_for(users: &HashMap<String, MockUser>, address: &str) -> GroupMember {
    let address = address.to_lowercase();
    let inbox_id = users
        .get(&address)
        .map(|u| u.inbox_id.clone())
        .unwrap_or_else(|| format!("inbox-{}", address));
    GroupMember {
        inbox_id,
        addresses: vec![address],
    }
}

#[async_trait]
impl MessagingTransport for MockTransport {
    fn agent_address(&self) -> &str {
        &self.agent_address
    }

    async fn can_message(&self, addresses: &[String]) -> Result<HashMap<String, bool>> {
        self.enter("can_message", TransportCall::CanMessage(addresses.to_vec()))
            .await?;
        let state = self.state();
        Ok(addresses
            .iter()
            .map(|a| {
                let reachable = state
                    .users
                    .get(&a.to_lowercase())
                    .map(|u| u.reachable)
                    .unwrap_or(false);
                (a.clone(), reachable)
            })
            .collect())
    }

    async fn inbox_id_for(&self, address: &str) -> Result<Option<String>> {
        self.enter("inbox_id_for", TransportCall::InboxIdFor(address.to_string()))
            .await?;
        let state = self.state();
        let address = address.to_lowercase();
        if state.failing_lookups.contains(&address) {
            bail!("mock transport: identity lookup failed for {}", address);
        }
        Ok(state.users.get(&address).map(|u| u.inbox_id.clone()))
    }

    async fn sync_conversations(&self) -> Result<()> {
        self.enter("sync_conversations", TransportCall::SyncConversations)
            .await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>> {
        self.enter("list_conversations", TransportCall::ListConversations)
            .await?;
        Ok(self.groups())
    }

    async fn create_group(&self) -> Result<ConversationInfo> {
        let id = {
            let mut state = self.state();
            state.next_group += 1;
            format!("group-{}", state.next_group)
        };
        self.enter("create_group", TransportCall::CreateGroup(id.clone()))
            .await?;
        let info = ConversationInfo {
            id,
            name: None,
            description: None,
            is_group: true,
        };
        self.state().groups.push(MockGroup {
            info: info.clone(),
            members: vec![agent_member(&self.agent_address)],
        });
        Ok(info)
    }

    async fn sync_group(&self, group_id: &str) -> Result<ConversationInfo> {
        self.enter("sync_group", TransportCall::SyncGroup(group_id.to_string()))
            .await?;
        self.with_group(group_id, |g| g.info.clone())
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        self.enter("group_members", TransportCall::GroupMembers(group_id.to_string()))
            .await?;
        self.with_group(group_id, |g| g.members.clone())
    }

    async fn add_members(&self, group_id: &str, inbox_ids: &[String]) -> Result<()> {
        self.enter(
            "add_members",
            TransportCall::AddMembers {
                group_id: group_id.to_string(),
                inbox_ids: inbox_ids.to_vec(),
            },
        )
        .await?;

        let new_members: Vec<GroupMember> = {
            let state = self.state();
            if let Some(bad) = inbox_ids.iter().find(|id| state.failing_adds.contains(*id)) {
                bail!("mock transport: cannot add {}", bad);
            }
            inbox_ids
                .iter()
                .map(|inbox_id| {
                    let mut addresses: Vec<String> = state
                        .users
                        .iter()
                        .filter(|(_, u)| &u.inbox_id == inbox_id)
                        .map(|(a, _)| a.clone())
                        .collect();
                    addresses.sort();
                    GroupMember {
                        inbox_id: inbox_id.clone(),
                        addresses,
                    }
                })
                .collect()
        };

        self.with_group(group_id, |g| {
            for member in new_members {
                if !g.members.iter().any(|m| m.inbox_id == member.inbox_id) {
                    g.members.push(member);
                }
            }
        })
    }

    async fn remove_members(&self, group_id: &str, inbox_ids: &[String]) -> Result<()> {
        self.enter(
            "remove_members",
            TransportCall::RemoveMembers {
                group_id: group_id.to_string(),
                inbox_ids: inbox_ids.to_vec(),
            },
        )
        .await?;
        self.with_group(group_id, |g| {
            g.members.retain(|m| !inbox_ids.contains(&m.inbox_id))
        })
    }

    async fn update_name(&self, group_id: &str, name: &str) -> Result<()> {
        self.enter(
            "update_name",
            TransportCall::UpdateName {
                group_id: group_id.to_string(),
                name: name.to_string(),
            },
        )
        .await?;
        self.with_group(group_id, |g| g.info.name = Some(name.to_string()))
    }

    async fn update_description(&self, group_id: &str, description: &str) -> Result<()> {
        self.enter(
            "update_description",
            TransportCall::UpdateDescription {
                group_id: group_id.to_string(),
                description: description.to_string(),
            },
        )
        .await?;
        self.with_group(group_id, |g| g.info.description = Some(description.to_string()))
    }

    async fn send(&self, conversation_id: &str, content: MessageContent) -> Result<()> {
        self.enter(
            "send",
            TransportCall::Send {
                conversation_id: conversation_id.to_string(),
                content,
            },
        )
        .await
    }

    async fn event_stream(&self) -> Result<EventStream> {
        let rx = self.state().incoming_rx.take();
        match rx {
            Some(rx) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => bail!("mock transport: event stream already taken"),
        }
    }
}

// =============================================================================
// MockContracts
// =============================================================================

/// One scripted event contract
#[derive(Debug, Clone)]
pub struct MockEvent {
    address: String,
    owner: String,
    label: String,
    participants: Vec<String>,
    capacity: u64,
    texts: HashMap<String, String>,
}

impl MockEvent {
    pub fn new(address: &str, owner: &str, label: &str) -> Self {
        Self {
            address: address.to_lowercase(),
            owner: owner.to_lowercase(),
            label: label.to_string(),
            participants: Vec::new(),
            capacity: 0,
            texts: HashMap::new(),
        }
    }

    pub fn participants(mut self, participants: &[&str]) -> Self {
        self.participants = participants.iter().map(|p| p.to_lowercase()).collect();
        self
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.texts.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Default)]
struct ContractsState {
    events: Vec<MockEvent>,
    failing_events: HashSet<String>,
    factory_fails: bool,
    hanging: bool,
}

/// Event contracts double. Clones share state.
#[derive(Clone)]
pub struct MockContracts {
    root_domain: String,
    state: Arc<Mutex<ContractsState>>,
}

impl Default for MockContracts {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContracts {
    pub fn new() -> Self {
        Self {
            root_domain: "raduno.eth".to_string(),
            state: Arc::new(Mutex::new(ContractsState::default())),
        }
    }

    /// Root domain used to match registry nodes to events
    pub fn with_root_domain(mut self, root_domain: &str) -> Self {
        self.root_domain = root_domain.to_string();
        self
    }

    pub fn with_event(self, event: MockEvent) -> Self {
        self.state().events.push(event);
        self
    }

    /// Every read on `address` fails
    pub fn fail_event(&self, address: &str) {
        self.state().failing_events.insert(address.to_lowercase());
    }

    pub fn fail_factory(&self) {
        self.state().factory_fails = true;
    }

    /// Every read never completes
    pub fn hang(&self) {
        self.state().hanging = true;
    }

    /// Replace an event's participant list
    pub fn set_participants(&self, address: &str, participants: &[&str]) {
        let address = address.to_lowercase();
        if let Some(event) = self.state().events.iter_mut().find(|e| e.address == address) {
            event.participants = participants.iter().map(|p| p.to_lowercase()).collect();
        }
    }

    /// Set or replace one text record on an event
    pub fn set_text(&self, address: &str, key: &str, value: &str) {
        let address = address.to_lowercase();
        if let Some(event) = self.state().events.iter_mut().find(|e| e.address == address) {
            event.texts.insert(key.to_string(), value.to_string());
        }
    }

    /// Drop an event from the factory listing
    pub fn remove_event(&self, address: &str) {
        let address = address.to_lowercase();
        self.state().events.retain(|e| e.address != address);
    }

    fn state(&self) -> MutexGuard<'_, ContractsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn read<T>(&self, event: &str, f: impl FnOnce(&MockEvent) -> T) -> Result<T> {
        let result = {
            let state = self.state();
            if state.hanging {
                None
            } else {
                let address = event.to_lowercase();
                if state.failing_events.contains(&address) {
                    Some(Err(anyhow::anyhow!("mock contracts: read failed for {}", address)))
                } else {
                    Some(match state.events.iter().find(|e| e.address == address) {
                        Some(e) => Ok(f(e)),
                        None => Err(anyhow::anyhow!("mock contracts: unknown event {}", address)),
                    })
                }
            }
        };
        match result {
            Some(r) => r,
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl EventContracts for MockContracts {
    async fn deployed_events(&self) -> Result<Vec<String>> {
        let result = {
            let state = self.state();
            if state.hanging {
                None
            } else if state.factory_fails {
                Some(Err(anyhow::anyhow!("mock contracts: factory read failed")))
            } else {
                Some(Ok(state.events.iter().map(|e| e.address.clone()).collect()))
            }
        };
        match result {
            Some(r) => r,
            None => std::future::pending().await,
        }
    }

    async fn owner(&self, event: &str) -> Result<String> {
        self.read(event, |e| e.owner.clone()).await
    }

    async fn label(&self, event: &str) -> Result<String> {
        self.read(event, |e| e.label.clone()).await
    }

    async fn participants(&self, event: &str) -> Result<Vec<String>> {
        self.read(event, |e| e.participants.clone()).await
    }

    async fn is_participant(&self, event: &str, account: &str) -> Result<bool> {
        let account = account.to_lowercase();
        self.read(event, |e| e.participants.contains(&account)).await
    }

    async fn participant_count(&self, event: &str) -> Result<u64> {
        self.read(event, |e| e.participants.len() as u64).await
    }

    async fn capacity(&self, event: &str) -> Result<u64> {
        self.read(event, |e| e.capacity).await
    }

    async fn text_record(&self, node: [u8; 32], key: &str) -> Result<String> {
        let value = {
            let state = self.state();
            state
                .events
                .iter()
                .find(|e| namehash(&format!("{}.{}", e.label, self.root_domain)) == node)
                .map(|e| e.texts.get(key).cloned().unwrap_or_default())
        };
        match value {
            Some(v) => Ok(v),
            None => bail!("mock contracts: no registry entry for node"),
        }
    }
}
