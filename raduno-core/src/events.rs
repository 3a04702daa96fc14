// ABOUTME: Normalized event descriptors built from chain reads, plus per-field fallback resolvers
// ABOUTME: Every optional field has exactly one function deciding what a missing value means

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Displayed when an event has no usable date record
pub const DATE_UNKNOWN: &str = "date unknown";
/// Displayed when an event has no location record
pub const LOCATION_TBA: &str = "TBA";
/// Category used when an event has none
pub const DEFAULT_CATEGORY: &str = "other";
/// Prefix applied to nicknames for display and group names
pub const NAME_PREFIX: &str = "Raduno - ";

/// Text-record keys read from the name registry for every event
pub const TEXT_RECORD_KEYS: [&str; 6] = [
    "nickname",
    "description",
    "category",
    "date",
    "location",
    "host",
];

/// Raw text records for one event. `None` means missing, empty, or unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRecords {
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub host: Option<String>,
}

impl TextRecords {
    /// Store a value read for `key`; blank values count as missing.
    pub fn set(&mut self, key: &str, value: Option<String>) {
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        match key {
            "nickname" => self.nickname = value,
            "description" => self.description = value,
            "category" => self.category = value,
            "date" => self.date = value,
            "location" => self.location = value,
            "host" => self.host = value,
            other => tracing::debug!(key = other, "Ignoring unknown text record key"),
        }
    }
}

/// Whether an event is still ahead, relative to a reference time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTiming {
    Upcoming,
    Past,
    /// Date missing or unparseable
    Unknown,
}

impl EventTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Past => "past",
            Self::Unknown => DATE_UNKNOWN,
        }
    }
}

/// One onchain event, rebuilt on every chain query
#[derive(Debug, Clone, PartialEq)]
pub struct EventDescriptor {
    /// Event contract address, lowercased
    pub address: String,
    /// Slug used in URLs and as the registry subdomain
    pub label: String,
    /// Owner (host) address, lowercased
    pub owner: String,
    pub records: TextRecords,
    /// `None` means unlimited
    pub capacity: Option<u64>,
    pub participant_count: u64,
    /// Owner plus participants, lowercased, deduplicated, owner first
    pub member_addresses: Vec<String>,
}

impl EventDescriptor {
    pub fn new(address: &str, owner: &str, label: &str, participants: &[String]) -> Self {
        Self {
            address: address.to_lowercase(),
            label: label.to_string(),
            owner: owner.to_lowercase(),
            records: TextRecords::default(),
            capacity: None,
            participant_count: participants.len() as u64,
            member_addresses: merge_members(owner, participants),
        }
    }

    pub fn with_records(mut self, records: TextRecords) -> Self {
        self.records = records;
        self
    }

    /// Display and group name
    pub fn name(&self) -> String {
        resolve_name(self.records.nickname.as_deref(), &self.label, &self.address)
    }

    pub fn description(&self) -> String {
        resolve_description(self.records.description.as_deref(), &self.label, &self.address)
    }

    pub fn category(&self) -> &str {
        resolve_category(self.records.category.as_deref())
    }

    pub fn location(&self) -> &str {
        resolve_location(self.records.location.as_deref())
    }

    pub fn host(&self) -> String {
        resolve_host(self.records.host.as_deref(), &self.owner)
    }

    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        self.records.date.as_deref().and_then(parse_event_date)
    }

    /// Human-readable date, or the raw record when it does not parse
    pub fn date_display(&self) -> String {
        resolve_date_display(self.records.date.as_deref())
    }

    pub fn timing(&self, now: DateTime<Utc>) -> EventTiming {
        match self.starts_at() {
            Some(at) if at < now => EventTiming::Past,
            Some(_) => EventTiming::Upcoming,
            None => EventTiming::Unknown,
        }
    }

    /// True only when a parseable date lies before `now`
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        self.timing(now) == EventTiming::Past
    }

    /// True when a finite capacity has been reached
    pub fn is_full(&self) -> bool {
        self.capacity
            .map(|cap| self.participant_count >= cap)
            .unwrap_or(false)
    }

    /// Public event page for `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/events/{}", base_url.trim_end_matches('/'), self.label)
    }
}

/// Union of owner and participants, lowercased, first occurrence wins
pub fn merge_members(owner: &str, participants: &[String]) -> Vec<String> {
    let mut members: Vec<String> = Vec::with_capacity(participants.len() + 1);
    for address in std::iter::once(owner).chain(participants.iter().map(String::as_str)) {
        let address = address.to_lowercase();
        if !members.contains(&address) {
            members.push(address);
        }
    }
    members
}

/// `"Raduno - <nickname>"`, else the label, else `"Event 0x123456..."`
pub fn resolve_name(nickname: Option<&str>, label: &str, address: &str) -> String {
    match nickname {
        Some(nick) => format!("{}{}", NAME_PREFIX, nick),
        None if !label.trim().is_empty() => label.to_string(),
        None => format!("Event {}...", address.get(..8).unwrap_or(address)),
    }
}

/// The record, else `"Event group for <label or address>"`
pub fn resolve_description(description: Option<&str>, label: &str, address: &str) -> String {
    match description {
        Some(d) => d.to_string(),
        None => {
            let subject = if label.trim().is_empty() { address } else { label };
            format!("Event group for {}", subject)
        }
    }
}

/// Formatted date, the raw record if it does not parse, else [`DATE_UNKNOWN`]
pub fn resolve_date_display(date: Option<&str>) -> String {
    match date {
        Some(raw) => match parse_event_date(raw) {
            Some(at) => at.format("%A, %B %-d, %Y %H:%M UTC").to_string(),
            None => raw.to_string(),
        },
        None => DATE_UNKNOWN.to_string(),
    }
}

/// Missing category means [`DEFAULT_CATEGORY`]
pub fn resolve_category(category: Option<&str>) -> &str {
    category.unwrap_or(DEFAULT_CATEGORY)
}

/// Missing location means [`LOCATION_TBA`]
pub fn resolve_location(location: Option<&str>) -> &str {
    location.unwrap_or(LOCATION_TBA)
}

/// Missing host means the shortened owner address (`0x1234...abcd`)
pub fn resolve_host(host: Option<&str>, owner: &str) -> String {
    match host {
        Some(h) => h.to_string(),
        None => shorten_address(owner),
    }
}

/// Onchain capacity of zero means unlimited
pub fn resolve_capacity(raw: u64) -> Option<u64> {
    (raw > 0).then_some(raw)
}

/// Contract count when readable, else the length of the participant list
pub fn resolve_participant_count(read: Option<u64>, participants: usize) -> u64 {
    read.unwrap_or(participants as u64)
}

pub fn shorten_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Parse an event date record.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM[:SS]` (read as UTC), and bare
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
