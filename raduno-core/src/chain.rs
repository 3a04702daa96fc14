// ABOUTME: Chain reader building event descriptors from the factory, event contracts, and name registry
// ABOUTME: Raw contract reads sit behind the EventContracts trait so the RPC client can be swapped out

use crate::abi;
use crate::deadline::Deadline;
use crate::events::{
    resolve_capacity, resolve_participant_count, EventDescriptor, TextRecords, TEXT_RECORD_KEYS,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

pub use crate::abi::namehash;

/// Read-only view of the event factory, event contracts, and text-record registry.
///
/// Addresses are returned lowercased.
#[async_trait]
pub trait EventContracts: Send + Sync {
    /// `getDeployedEvents()` on the factory
    async fn deployed_events(&self) -> Result<Vec<String>>;

    async fn owner(&self, event: &str) -> Result<String>;

    async fn label(&self, event: &str) -> Result<String>;

    /// `getAllParticipants()`
    async fn participants(&self, event: &str) -> Result<Vec<String>>;

    async fn is_participant(&self, event: &str, account: &str) -> Result<bool>;

    /// `getParticipantCount()`
    async fn participant_count(&self, event: &str) -> Result<u64>;

    /// `capacity()`, where zero means unlimited
    async fn capacity(&self, event: &str) -> Result<u64>;

    /// Registry `text(node, key)`
    async fn text_record(&self, node: [u8; 32], key: &str) -> Result<String>;
}

pub type SharedContracts = Arc<dyn EventContracts>;

/// Produces normalized [`EventDescriptor`]s from raw contract reads
#[derive(Clone)]
pub struct ChainReader {
    contracts: SharedContracts,
    root_domain: String,
    deadline: Deadline,
}

impl ChainReader {
    pub fn new(contracts: SharedContracts, root_domain: impl Into<String>, deadline: Deadline) -> Self {
        Self {
            contracts,
            root_domain: root_domain.into(),
            deadline,
        }
    }

    /// All deployed events in factory order.
    ///
    /// Fails only when the factory itself cannot be read; a failure on one
    /// event skips that event.
    pub async fn list_events(&self) -> Result<Vec<EventDescriptor>> {
        let addresses = self
            .deadline
            .run("get_deployed_events", self.contracts.deployed_events())
            .await
            .context("Failed to read deployed events from factory")?;

        tracing::debug!(count = addresses.len(), "Factory returned deployed events");

        let mut events = Vec::with_capacity(addresses.len());
        for address in &addresses {
            match self.describe(address).await {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(event = %address, error = %e, "Skipping event that could not be read");
                }
            }
        }

        tracing::info!(
            deployed = addresses.len(),
            described = events.len(),
            "Fetched event descriptors"
        );
        Ok(events)
    }

    /// Build one descriptor. Owner, participants, and label are required;
    /// everything else degrades to its resolver fallback.
    pub async fn describe(&self, address: &str) -> Result<EventDescriptor> {
        let (owner, participants, label) = tokio::try_join!(
            self.deadline.run("owner", self.contracts.owner(address)),
            self.deadline.run("get_all_participants", self.contracts.participants(address)),
            self.deadline.run("label", self.contracts.label(address)),
        )?;

        let (count, capacity, records) = tokio::join!(
            self.deadline
                .run("get_participant_count", self.contracts.participant_count(address)),
            self.deadline.run("capacity", self.contracts.capacity(address)),
            self.text_records(&label),
        );

        let count = count
            .map_err(|e| tracing::debug!(event = %address, error = %e, "Participant count unavailable"))
            .ok();
        let capacity = capacity
            .map_err(|e| tracing::debug!(event = %address, error = %e, "Capacity unavailable"))
            .ok();

        let mut event = EventDescriptor::new(address, &owner, &label, &participants).with_records(records);
        event.participant_count = resolve_participant_count(count, participants.len());
        event.capacity = capacity.and_then(resolve_capacity);

        tracing::debug!(
            event = %event.address,
            label = %event.label,
            members = event.member_addresses.len(),
            nickname = ?event.records.nickname,
            "Described event"
        );
        Ok(event)
    }

    /// Fetch every known text record for `<label>.<root_domain>`; each failure
    /// leaves only that field missing.
    pub async fn text_records(&self, label: &str) -> TextRecords {
        let mut records = TextRecords::default();
        if label.trim().is_empty() {
            return records;
        }

        let name = format!("{}.{}", label, self.root_domain);
        let node = namehash(&name);

        let reads = TEXT_RECORD_KEYS.iter().map(|key| async move {
            let value = self
                .deadline
                .run("text_record", self.contracts.text_record(node, key))
                .await;
            (*key, value)
        });

        for (key, value) in join_all(reads).await {
            match value {
                Ok(v) => records.set(key, Some(v)),
                Err(e) => {
                    tracing::debug!(name = %name, key, error = %e, "Text record unavailable");
                }
            }
        }
        records
    }

    /// Whether `account` is already registered for `event`
    pub async fn is_participant(&self, event: &str, account: &str) -> Result<bool> {
        self.deadline
            .run("is_participant", self.contracts.is_participant(event, account))
            .await
    }

    /// Calldata for the no-argument `register()` call
    pub fn register_calldata() -> String {
        abi::to_hex(&abi::selector("register()"))
    }
}
