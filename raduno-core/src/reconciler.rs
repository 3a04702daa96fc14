// ABOUTME: Group reconciler that keeps one messaging group per onchain event in sync
// ABOUTME: Looks up or creates each event's group, then diffs membership against the chain

use crate::chain::ChainReader;
use crate::deadline::Deadline;
use crate::events::EventDescriptor;
use crate::metrics;
use crate::reachability::{inbox_ids, ReachabilityResolver};
use crate::store::{GroupStore, ManagedGroup};
use crate::traits::{ConversationInfo, GroupMember, MessageContent, SharedTransport};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Result of reconciling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A new group was created with this many members (agent excluded)
    Created { group_id: String, members: usize },
    /// Too few reachable members; retried next pass
    Deferred { reachable: usize },
    /// Existing group brought in line with the chain
    Synced { added: usize, removed: usize },
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub listed: usize,
    pub created: usize,
    pub synced: usize,
    pub deferred: usize,
    pub failed: usize,
    /// Events with a managed group that are no longer listed by the factory
    pub archived: Vec<String>,
}

/// Addresses to add, and member identifiers to remove, to match the group to its event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Lowercased target addresses not linked to any current member
    pub to_add: Vec<String>,
    /// Inbox ids of members with no linked address in the target set
    pub to_remove: Vec<String>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare group members against target addresses.
///
/// A member is present when any of its linked addresses is a target. Members
/// with no linked address, or linked to the agent, are never removed. The agent
/// is never added.
pub fn membership_diff(members: &[GroupMember], target: &[String], agent_address: &str) -> MembershipDiff {
    let agent = agent_address.to_lowercase();
    let target: BTreeSet<String> = target
        .iter()
        .map(|a| a.to_lowercase())
        .filter(|a| *a != agent)
        .collect();

    let mut linked_anywhere = BTreeSet::new();
    let mut to_remove = Vec::new();
    for member in members {
        let linked: BTreeSet<String> = member.addresses.iter().map(|a| a.to_lowercase()).collect();
        if linked.is_empty() || linked.contains(&agent) {
            continue;
        }
        if !linked.iter().any(|a| target.contains(a)) && !to_remove.contains(&member.inbox_id) {
            to_remove.push(member.inbox_id.clone());
        }
        linked_anywhere.extend(linked);
    }

    MembershipDiff {
        to_add: target.difference(&linked_anywhere).cloned().collect(),
        to_remove,
    }
}

/// Reconciles every listed event with its messaging group, one event at a time.
///
/// Owns the in-memory group map; nothing else mutates it.
pub struct Reconciler {
    transport: SharedTransport,
    chain: ChainReader,
    store: GroupStore,
    resolver: ReachabilityResolver,
    deadline: Deadline,
    allow_small_groups: bool,
    groups: HashMap<String, ManagedGroup>,
}

impl Reconciler {
    pub fn new(
        transport: SharedTransport,
        chain: ChainReader,
        store: GroupStore,
        deadline: Deadline,
        allow_small_groups: bool,
    ) -> Self {
        let resolver = ReachabilityResolver::new(transport.clone(), deadline);
        Self {
            transport,
            chain,
            store,
            resolver,
            deadline,
            allow_small_groups,
            groups: HashMap::new(),
        }
    }

    /// Groups currently held in memory, keyed by event address
    pub fn managed_groups(&self) -> &HashMap<String, ManagedGroup> {
        &self.groups
    }

    pub fn managed_group(&self, event_address: &str) -> Option<&ManagedGroup> {
        self.groups.get(&event_address.to_lowercase())
    }

    fn minimum_members(&self) -> usize {
        if self.allow_small_groups {
            1
        } else {
            2
        }
    }

    /// One full pass over every listed event.
    ///
    /// Fails only when conversations cannot be synced or the factory cannot be
    /// read; per-event failures are counted and logged.
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        let started = Instant::now();

        self.deadline
            .run("sync_conversations", self.transport.sync_conversations())
            .await
            .context("Failed to sync conversations")?;

        let events = self.chain.list_events().await?;
        let mut report = PassReport {
            listed: events.len(),
            ..PassReport::default()
        };

        for event in &events {
            match self.reconcile_event(event).await {
                Ok(EventOutcome::Created { .. }) => report.created += 1,
                Ok(EventOutcome::Synced { .. }) => report.synced += 1,
                Ok(EventOutcome::Deferred { .. }) => report.deferred += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::record_event_failure();
                    tracing::error!(
                        event = %event.address,
                        error = %format!("{:#}", e),
                        "Failed to reconcile event"
                    );
                }
            }
        }

        report.archived = self.archived_events(&events);

        metrics::record_sync_pass(started.elapsed());
        metrics::set_managed_groups(self.groups.len());

        tracing::info!(
            listed = report.listed,
            created = report.created,
            synced = report.synced,
            deferred = report.deferred,
            failed = report.failed,
            archived = report.archived.len(),
            managed = self.groups.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    /// Bring one event's group in line with the chain, creating it if needed
    pub async fn reconcile_event(&mut self, event: &EventDescriptor) -> Result<EventOutcome> {
        match self.lookup(event).await? {
            Some(managed) => self.sync_members(event, managed).await,
            None => self.create_group(event).await,
        }
    }

    /// Memory first, then the store (ownership-guarded), then the live conversation list
    async fn lookup(&mut self, event: &EventDescriptor) -> Result<Option<ManagedGroup>> {
        if let Some(managed) = self.groups.get(&event.address) {
            return Ok(Some(managed.clone()));
        }

        let agent = self.transport.agent_address().to_string();
        let Some(group_id) = self.store.find_group_id(&event.address, &agent)? else {
            return Ok(None);
        };

        let conversations = self
            .deadline
            .run("list_conversations", self.transport.list_conversations())
            .await
            .context("Failed to list conversations")?;

        match conversations.into_iter().find(|c| c.id == group_id) {
            Some(group) => {
                tracing::info!(
                    event = %event.address,
                    group_id = %group.id,
                    "Restored group from stored mapping"
                );
                let managed = ManagedGroup {
                    group,
                    primary_address: event.address.clone(),
                    last_synced_at: DateTime::<Utc>::MIN_UTC,
                };
                self.groups.insert(event.address.clone(), managed.clone());
                Ok(Some(managed))
            }
            None => {
                tracing::warn!(
                    event = %event.address,
                    group_id = %group_id,
                    "Stored group not found among conversations, will create a new one"
                );
                Ok(None)
            }
        }
    }

    async fn create_group(&mut self, event: &EventDescriptor) -> Result<EventOutcome> {
        let agent = self.transport.agent_address().to_string();
        let candidates: Vec<String> = event
            .member_addresses
            .iter()
            .filter(|a| !self.transport.is_self(a))
            .cloned()
            .collect();

        let resolved = self
            .resolver
            .resolve_reachable(&candidates)
            .await
            .context("Reachability check failed")?;

        // Several addresses can link to one inbox; the threshold counts distinct members
        let ids = inbox_ids(&resolved);
        if ids.is_empty() || ids.len() < self.minimum_members() {
            tracing::info!(
                event = %event.address,
                reachable = ids.len(),
                required = self.minimum_members(),
                "Not enough reachable members to create a group yet"
            );
            return Ok(EventOutcome::Deferred {
                reachable: ids.len(),
            });
        }

        let group = self
            .deadline
            .run("create_group", self.transport.create_group())
            .await
            .context("Failed to create group")?;

        let name = event.name();
        self.deadline
            .run("update_name", self.transport.update_name(&group.id, &name))
            .await
            .context("Failed to set group name")?;

        let description = event.description();
        if !description.is_empty() {
            self.deadline
                .run(
                    "update_description",
                    self.transport.update_description(&group.id, &description),
                )
                .await
                .context("Failed to set group description")?;
        }

        self.deadline
            .run("add_members", self.transport.add_members(&group.id, &ids))
            .await
            .context("Failed to add members to new group")?;

        let welcome = format!("Welcome to {}! This group is managed by an XMTP agent.", name);
        self.deadline
            .run("send", self.transport.send(&group.id, MessageContent::plain(welcome)))
            .await
            .context("Failed to send welcome message")?;

        let managed = ManagedGroup {
            group: ConversationInfo {
                name: Some(name.clone()),
                description: Some(description),
                ..group
            },
            primary_address: event.address.clone(),
            last_synced_at: Utc::now(),
        };
        self.store
            .save(&event.address, &managed, &agent)
            .context("Failed to persist group mapping")?;

        let group_id = managed.group.id.clone();
        self.groups.insert(event.address.clone(), managed);

        metrics::record_group_created();
        metrics::record_members_added(ids.len());
        tracing::info!(
            event = %event.address,
            group_id = %group_id,
            name = %name,
            members = ids.len(),
            "Created group for event"
        );

        Ok(EventOutcome::Created {
            group_id,
            members: ids.len(),
        })
    }

    async fn sync_members(
        &mut self,
        event: &EventDescriptor,
        managed: ManagedGroup,
    ) -> Result<EventOutcome> {
        let group_id = managed.group.id.clone();
        let agent = self.transport.agent_address().to_string();

        let info = self
            .deadline
            .run("sync_group", self.transport.sync_group(&group_id))
            .await
            .context("Failed to sync group")?;

        let members = self
            .deadline
            .run("group_members", self.transport.group_members(&group_id))
            .await
            .context("Failed to read group members")?;

        let diff = membership_diff(&members, &event.member_addresses, &agent);
        let current_ids: BTreeSet<&str> = members.iter().map(|m| m.inbox_id.as_str()).collect();

        let mut added = 0;
        if !diff.to_add.is_empty() {
            let resolved = self
                .resolver
                .resolve_reachable(&diff.to_add)
                .await
                .context("Reachability check failed")?;
            // An address may resolve to an inbox that is already in the group
            let ids: Vec<String> = inbox_ids(&resolved)
                .into_iter()
                .filter(|id| !current_ids.contains(id.as_str()))
                .collect();
            if !ids.is_empty() {
                self.deadline
                    .run("add_members", self.transport.add_members(&group_id, &ids))
                    .await
                    .context("Failed to add members")?;
                added = ids.len();
                metrics::record_members_added(added);
                tracing::info!(event = %event.address, group_id = %group_id, added, "Added members");

                let notice = format!("👋 {} new member(s) have been added to the group!", added);
                self.deadline
                    .run("send", self.transport.send(&group_id, MessageContent::plain(notice)))
                    .await
                    .context("Failed to send member-added notice")?;
            }
        }

        let mut removed = 0;
        if !diff.to_remove.is_empty() {
            let ids = diff.to_remove;
            self.deadline
                .run("remove_members", self.transport.remove_members(&group_id, &ids))
                .await
                .context("Failed to remove members")?;
            removed = ids.len();
            metrics::record_members_removed(removed);
            tracing::info!(event = %event.address, group_id = %group_id, removed, "Removed members");

            let notice = format!("👋 {} member(s) have been removed from the group.", removed);
            self.deadline
                .run("send", self.transport.send(&group_id, MessageContent::plain(notice)))
                .await
                .context("Failed to send member-removed notice")?;
        }

        let name = event.name();
        if info.name.as_deref() != Some(name.as_str()) {
            self.deadline
                .run("update_name", self.transport.update_name(&group_id, &name))
                .await
                .context("Failed to update group name")?;
            tracing::info!(group_id = %group_id, name = %name, "Updated group name");
        }

        let description = event.description();
        if info.description.as_deref() != Some(description.as_str()) {
            self.deadline
                .run(
                    "update_description",
                    self.transport.update_description(&group_id, &description),
                )
                .await
                .context("Failed to update group description")?;
            tracing::debug!(group_id = %group_id, "Updated group description");
        }

        let now = Utc::now();
        self.groups.insert(
            event.address.clone(),
            ManagedGroup {
                group: ConversationInfo {
                    name: Some(name),
                    description: Some(description),
                    ..info
                },
                primary_address: managed.primary_address,
                last_synced_at: now,
            },
        );
        self.store
            .touch_last_synced(&event.address, now)
            .context("Failed to record sync time")?;

        if added == 0 && removed == 0 {
            tracing::debug!(event = %event.address, group_id = %group_id, "Group already in sync");
        }
        Ok(EventOutcome::Synced { added, removed })
    }

    /// Managed events missing from this pass's listing. Their groups are kept.
    fn archived_events(&self, listed: &[EventDescriptor]) -> Vec<String> {
        let listed: BTreeSet<&str> = listed.iter().map(|e| e.address.as_str()).collect();
        let agent = self.transport.agent_address();

        let mut managed: BTreeSet<String> = self.groups.keys().cloned().collect();
        match self.store.list_all() {
            Ok(rows) => managed.extend(
                rows.into_iter()
                    .filter(|r| r.is_owned_by(agent))
                    .map(|r| r.event_address),
            ),
            Err(e) => tracing::warn!(error = %e, "Could not read stored mappings for archive check"),
        }

        let archived: Vec<String> = managed
            .into_iter()
            .filter(|address| !listed.contains(address.as_str()))
            .collect();

        for address in &archived {
            tracing::info!(event = %address, "Event no longer listed, retaining its group");
        }
        archived
    }
}
