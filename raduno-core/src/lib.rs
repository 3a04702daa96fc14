// ABOUTME: Platform-agnostic group-membership sync and DM assistant for onchain events
// ABOUTME: Provides transport and contract traits plus the reconciler and assistant built on them

pub mod abi;
pub mod assistant;
pub mod chain;
pub mod config;
pub mod deadline;
pub mod events;
pub mod metrics;
pub mod paths;
pub mod reachability;
pub mod receipt;
pub mod reconciler;
pub mod store;
pub mod testing;
pub mod traits;

pub use assistant::{Assistant, AssistantOptions, Handled, Intent, RegistrationOutcome};
pub use chain::{ChainReader, EventContracts, SharedContracts};
pub use config::Config;
pub use deadline::{Deadline, DeadlineExceeded};
pub use events::EventDescriptor;
pub use reconciler::{EventOutcome, PassReport, Reconciler};
pub use store::{GroupMapping, GroupStore, ManagedGroup};

// Re-export core traits for convenient access
pub use traits::{
    ConversationInfo, EventStream, GroupMember, IncomingContent, IncomingMessage,
    MessageContent, MessagingTransport, SharedTransport, WalletSendCalls,
};
