// ABOUTME: Direct-message assistant that recommends events or prepares registration transactions
// ABOUTME: Classifies intent with the completion backend and always answers with a human reply

use crate::chain::ChainReader;
use crate::config::Config;
use crate::deadline::Deadline;
use crate::events::{EventDescriptor, EventTiming};
use crate::metrics;
use crate::receipt::ExtractorChain;
use crate::traits::{
    CallMetadata, IncomingContent, IncomingMessage, MessageContent, PaymasterService,
    SharedTransport, WalletCall, WalletCapabilities, WalletSendCalls,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use raduno_llm::{CompletionRequest, SharedBackend};

pub const UNAVAILABLE_REPLY: &str = "Sorry, the AI event recommendation service is currently unavailable. Please check back later or contact the administrator.";
pub const NO_EVENTS_REPLY: &str =
    "I'm sorry, but there are currently no events available. Please check back later!";
pub const EMPTY_COMPLETION_REPLY: &str =
    "I'm sorry, I couldn't process your request. Please try again.";
pub const RECOMMEND_ERROR_REPLY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again later.";
pub const NO_SUITABLE_EVENT_REPLY: &str = "I'm sorry, but there are no suitable upcoming events for you to register for at the moment. The events that match your interests have already passed. Please check back later for new events!";
pub const CLARIFY_EVENT_REPLY: &str = "I couldn't tell which event you'd like to register for. Could you tell me the event's name?";
pub const REGISTRATION_ERROR_REPLY: &str =
    "❌ Sorry, there was an error preparing your registration. Please try again later.";
pub const CATCH_ALL_REPLY: &str =
    "Sorry, I encountered an error processing your message. Please try again.";

/// Token the selection prompt uses for "no suitable event"
const NONE_TOKEN: &str = "none";

/// What the user wants, as classified by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Register,
    Recommend,
}

impl Intent {
    /// Anything other than an exact `REGISTER` is a recommendation request.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("REGISTER") {
            Self::Register
        } else {
            Self::Recommend
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Recommend => "recommend",
        }
    }
}

/// How the register path ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Wallet payload and confirmation sent
    PayloadSent { event: String },
    AlreadyPassed { event: String },
    AlreadyRegistered { event: String },
    Full { event: String },
    /// The model answered the no-suitable-event token
    NoSuitableEvent,
    /// The model named no known event and fallback is disabled
    NeedsClarification,
    /// Something failed while preparing the payload; the user was told
    Failed,
}

/// How an inbound message was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Group message, missing sender, or nothing to answer
    Ignored,
    TransactionAcknowledged { hash: Option<String> },
    Unavailable,
    NoEvents,
    Recommended,
    Registration(RegistrationOutcome),
    /// An unexpected failure answered with the catch-all reply
    Failed,
}

/// Knobs the assistant reads from configuration
#[derive(Debug, Clone)]
pub struct AssistantOptions {
    pub base_url: String,
    pub hostname: String,
    pub paymaster_url: Option<String>,
    pub chain_id: u64,
    pub fallback_to_first_event: bool,
    pub explorer_url: String,
    pub intent_temperature: f32,
    pub selection_temperature: f32,
    pub recommend_temperature: f32,
}

impl Default for AssistantOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AssistantOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.assistant.base_url.clone(),
            hostname: config.assistant.hostname.clone(),
            paymaster_url: config.assistant.paymaster_url.clone(),
            chain_id: config.chain.chain_id,
            fallback_to_first_event: config.assistant.fallback_to_first_event,
            explorer_url: config.assistant.explorer_url.clone(),
            intent_temperature: config.llm.intent_temperature,
            selection_temperature: config.llm.selection_temperature,
            recommend_temperature: config.llm.recommend_temperature,
        }
    }
}

/// Handles direct messages: recommendations, registrations, and receipts.
///
/// Cloning is cheap; each inbound message may be handled on its own task.
#[derive(Clone)]
pub struct Assistant {
    transport: SharedTransport,
    chain: ChainReader,
    llm: Option<SharedBackend>,
    deadline: Deadline,
    options: AssistantOptions,
}

impl Assistant {
    pub fn new(
        transport: SharedTransport,
        chain: ChainReader,
        llm: Option<SharedBackend>,
        deadline: Deadline,
        options: AssistantOptions,
    ) -> Self {
        Self {
            transport,
            chain,
            llm,
            deadline,
            options,
        }
    }

    /// Handle one inbound message. Every answered failure ends in a plain reply;
    /// the error is returned only when even that reply could not be sent.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<Handled> {
        if !message.is_direct {
            tracing::debug!(
                conversation_id = %message.conversation_id,
                "Ignoring group message"
            );
            return Ok(Handled::Ignored);
        }

        let Some(sender) = message.sender_address.as_deref() else {
            tracing::warn!(
                conversation_id = %message.conversation_id,
                sender_inbox_id = %message.sender_inbox_id,
                "Could not identify sender in direct message"
            );
            return Ok(Handled::Ignored);
        };
        let sender = sender.to_lowercase();

        let result = match &message.content {
            IncomingContent::Text(text) => self.handle_text(&message.conversation_id, &sender, text).await,
            IncomingContent::TransactionReference(payload) => {
                self.acknowledge_transaction(&message.conversation_id, payload)
                    .await
            }
        };

        match result {
            Ok(handled) => Ok(handled),
            Err(e) => {
                tracing::error!(
                    conversation_id = %message.conversation_id,
                    error = %format!("{:#}", e),
                    "Error handling direct message"
                );
                metrics::record_assistant_message("error");
                self.reply(&message.conversation_id, MessageContent::plain(CATCH_ALL_REPLY))
                    .await
                    .context("Failed to send error reply")?;
                Ok(Handled::Failed)
            }
        }
    }

    async fn handle_text(&self, conversation_id: &str, sender: &str, text: &str) -> Result<Handled> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Handled::Ignored);
        }
        tracing::info!(
            sender = %sender,
            conversation_id = %conversation_id,
            chars = text.len(),
            "Received direct message"
        );

        let Some(llm) = self.llm.as_ref() else {
            metrics::record_assistant_message("unavailable");
            self.reply(conversation_id, MessageContent::markdown(UNAVAILABLE_REPLY))
                .await?;
            return Ok(Handled::Unavailable);
        };

        let events = match self.chain.list_events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "Could not fetch events for assistant");
                Vec::new()
            }
        };
        if events.is_empty() {
            metrics::record_assistant_message("no_events");
            self.reply(conversation_id, MessageContent::markdown(NO_EVENTS_REPLY))
                .await?;
            return Ok(Handled::NoEvents);
        }

        let intent = self.classify(llm, text).await;
        metrics::record_assistant_message(intent.as_str());
        tracing::info!(sender = %sender, intent = intent.as_str(), "Intent detected");

        match intent {
            Intent::Recommend => {
                let reply = self.recommend(llm, text, &events).await;
                self.reply(conversation_id, MessageContent::markdown(reply))
                    .await?;
                Ok(Handled::Recommended)
            }
            Intent::Register => {
                let outcome = self.register(llm, conversation_id, sender, text, &events).await?;
                Ok(Handled::Registration(outcome))
            }
        }
    }

    /// Ambiguous or failed classification takes the read-only branch.
    async fn classify(&self, llm: &SharedBackend, text: &str) -> Intent {
        let request = CompletionRequest::new(intent_prompt(text), text)
            .temperature(self.options.intent_temperature)
            .max_tokens(10);
        match self.deadline.run("classify_intent", llm.complete(&request)).await {
            Ok(raw) => Intent::parse(&raw),
            Err(e) => {
                tracing::warn!(error = %e, "Intent classification failed, defaulting to recommend");
                Intent::Recommend
            }
        }
    }

    async fn recommend(&self, llm: &SharedBackend, text: &str, events: &[EventDescriptor]) -> String {
        let now = Utc::now();
        let request = CompletionRequest::new(
            recommend_prompt(events, now, &self.options.base_url),
            text,
        )
        .temperature(self.options.recommend_temperature)
        .max_tokens(500);

        match self.deadline.run("recommend", llm.complete(&request)).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => EMPTY_COMPLETION_REPLY.to_string(),
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Recommendation completion failed");
                RECOMMEND_ERROR_REPLY.to_string()
            }
        }
    }

    async fn register(
        &self,
        llm: &SharedBackend,
        conversation_id: &str,
        sender: &str,
        text: &str,
        events: &[EventDescriptor],
    ) -> Result<RegistrationOutcome> {
        let now = Utc::now();
        let request = CompletionRequest::new(selection_prompt(events, now), text)
            .temperature(self.options.selection_temperature)
            .max_tokens(100);
        let answer = self
            .deadline
            .run("select_event", llm.complete(&request))
            .await
            .context("Event selection failed")?
            .trim()
            .to_lowercase();

        if answer == NONE_TOKEN {
            tracing::info!(sender = %sender, "No suitable upcoming event for registration");
            self.reply(conversation_id, MessageContent::markdown(NO_SUITABLE_EVENT_REPLY))
                .await?;
            return Ok(RegistrationOutcome::NoSuitableEvent);
        }

        let event = match select_event(events, &answer) {
            Some(event) => event,
            None if self.options.fallback_to_first_event => {
                tracing::info!(answer = %answer, "Selection matched no event, using the first listed");
                events.first().context("No events to fall back to")?
            }
            None => {
                tracing::info!(answer = %answer, "Selection matched no event, asking user to clarify");
                self.reply(conversation_id, MessageContent::markdown(CLARIFY_EVENT_REPLY))
                    .await?;
                return Ok(RegistrationOutcome::NeedsClarification);
            }
        };

        match self.prepare_registration(conversation_id, sender, event, now).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(
                    event = %event.address,
                    error = %format!("{:#}", e),
                    "Error preparing registration"
                );
                self.reply(conversation_id, MessageContent::markdown(REGISTRATION_ERROR_REPLY))
                    .await?;
                Ok(RegistrationOutcome::Failed)
            }
        }
    }

    async fn prepare_registration(
        &self,
        conversation_id: &str,
        sender: &str,
        event: &EventDescriptor,
        now: DateTime<Utc>,
    ) -> Result<RegistrationOutcome> {
        let name = event.name();

        if event.has_passed(now) {
            tracing::info!(event = %event.address, "Refusing registration for past event");
            self.reply(
                conversation_id,
                MessageContent::markdown(format!(
                    "❌ Sorry, but **{}** has already passed. You cannot register for past events.",
                    name
                )),
            )
            .await?;
            return Ok(RegistrationOutcome::AlreadyPassed {
                event: event.address.clone(),
            });
        }

        if self.chain.is_participant(&event.address, sender).await? {
            tracing::info!(event = %event.address, sender = %sender, "Sender already registered");
            self.reply(
                conversation_id,
                MessageContent::markdown(format!("✅ You're already registered for **{}**!", name)),
            )
            .await?;
            return Ok(RegistrationOutcome::AlreadyRegistered {
                event: event.address.clone(),
            });
        }

        if event.is_full() {
            tracing::info!(event = %event.address, "Refusing registration for full event");
            self.reply(
                conversation_id,
                MessageContent::markdown(format!(
                    "❌ Sorry, **{}** is full. No more spots are available.",
                    name
                )),
            )
            .await?;
            return Ok(RegistrationOutcome::Full {
                event: event.address.clone(),
            });
        }

        let payload = self.registration_payload(sender, event);
        self.reply(conversation_id, MessageContent::WalletSendCalls(payload))
            .await?;
        self.reply(
            conversation_id,
            MessageContent::markdown(format!(
                "🎉 I've prepared your registration for **{}**!\n\nPlease approve the transaction in your Base app to complete your registration.",
                name
            )),
        )
        .await?;

        tracing::info!(event = %event.address, sender = %sender, "Registration payload sent");
        Ok(RegistrationOutcome::PayloadSent {
            event: event.address.clone(),
        })
    }

    /// `register()` call on `event`, signed by `sender`
    pub fn registration_payload(&self, sender: &str, event: &EventDescriptor) -> WalletSendCalls {
        let name = event.name();
        WalletSendCalls {
            version: "1.0".to_string(),
            from: sender.to_string(),
            chain_id: format!("{:#x}", self.options.chain_id),
            capabilities: self.options.paymaster_url.as_ref().map(|url| WalletCapabilities {
                paymaster_service: Some(PaymasterService { url: url.clone() }),
            }),
            calls: vec![WalletCall {
                to: event.address.clone(),
                data: ChainReader::register_calldata(),
                metadata: CallMetadata {
                    description: format!("Register for {}", name),
                    transaction_type: "register".to_string(),
                    event_name: name,
                    event_label: event.label.clone(),
                    hostname: self.options.hostname.clone(),
                    title: "Raduno Event Registration".to_string(),
                },
            }],
        }
    }

    async fn acknowledge_transaction(
        &self,
        conversation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Handled> {
        metrics::record_assistant_message("transaction_reference");
        let hash = ExtractorChain::transaction_hash().extract(payload);

        let reply = match &hash {
            Some(found) => {
                tracing::info!(
                    hash = %found.value,
                    extractor = found.extractor,
                    "Received transaction reference"
                );
                format!(
                    "✅ Transaction received! You can follow it here: {}/{}",
                    self.options.explorer_url.trim_end_matches('/'),
                    found.value
                )
            }
            None => {
                tracing::info!("Received transaction reference with unrecognized shape");
                "✅ Transaction received! Your registration will appear once it is confirmed."
                    .to_string()
            }
        };

        self.reply(conversation_id, MessageContent::markdown(reply))
            .await?;
        Ok(Handled::TransactionAcknowledged {
            hash: hash.map(|h| h.value),
        })
    }

    async fn reply(&self, conversation_id: &str, content: MessageContent) -> Result<()> {
        self.deadline
            .run("send", self.transport.send(conversation_id, content))
            .await
            .context("Failed to send reply")
    }
}

/// Event whose address matches the model's answer exactly
fn select_event<'a>(events: &'a [EventDescriptor], answer: &str) -> Option<&'a EventDescriptor> {
    events.iter().find(|e| e.address == answer)
}

fn intent_prompt(text: &str) -> String {
    format!(
        r#"Analyze the user's message and determine if they want to register for a specific event.

User message: "{}"

Respond with ONLY one of these two words:
- "REGISTER" if the user clearly wants to register/sign up/join a specific event
- "RECOMMEND" if the user is asking for recommendations or general information about events

Be strict: only respond "REGISTER" if they explicitly indicate they want to register for an event."#,
        text
    )
}

/// Numbered event list handed to the model, one block per event
pub fn events_context(events: &[EventDescriptor], now: DateTime<Utc>) -> String {
    if events.is_empty() {
        return "No events are currently available.".to_string();
    }
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            format!(
                "{}. {}\n   Label: {}\n   Address: {}\n   Date: {}\n   Description: {}\n   Number of participants: {}",
                i + 1,
                event.name(),
                event.label,
                event.address,
                date_with_timing(event, now),
                event.description(),
                event.participant_count,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn date_with_timing(event: &EventDescriptor, now: DateTime<Utc>) -> String {
    match event.timing(now) {
        EventTiming::Unknown => event.date_display(),
        timing => format!("{} ({})", event.date_display(), timing.as_str()),
    }
}

fn recommend_prompt(events: &[EventDescriptor], now: DateTime<Utc>, base_url: &str) -> String {
    let today = now.format("%Y-%m-%d");
    let base_url = base_url.trim_end_matches('/');
    format!(
        r#"You are a helpful event recommendation assistant for Raduno, a decentralized event management platform on the Base app. Your role is to help users find the best events based on their interests and needs.

Today's date is: {today}

You have access to the following events:

{context}

When recommending events:
1. Understand what the user is looking for
2. Match their interests with available events
3. IMPORTANT: Check the event dates against today's date ({today}). Do NOT recommend past events for registration. If a user asks about a past event, you can provide information about it but clearly state that it has already happened and they cannot register.
4. Recommend 1-3 most suitable UPCOMING events with their names
5. Be friendly and conversational
6. For each recommended upcoming event, include the registration link using the event's label: {base_url}/events/<label>
7. Format it nicely, like: "**Event Name** - Description here. Date: [date]. [Register here]({base_url}/events/label)"

Important:
- Use the event's Label field (not the name) in the URL. The name is for display only.
- Never recommend registration for events that have already passed.
- If a user asks about a past event, provide the information but make it clear it has already happened."#,
        today = today,
        context = events_context(events, now),
        base_url = base_url,
    )
}

fn selection_prompt(events: &[EventDescriptor], now: DateTime<Utc>) -> String {
    format!(
        r#"You are an event selection assistant. Based on the user's message, select the MOST SUITABLE UPCOMING event for them.

Today's date is: {today}

Available events:
{context}

IMPORTANT: Only select events that have NOT passed yet (check the date). Do not select past events.

Respond with ONLY the event's address (42-char hex starting with 0x). Nothing else. If there are no suitable upcoming events, respond with "NONE"."#,
        today = now.format("%Y-%m-%d"),
        context = events_context(events, now),
    )
}
