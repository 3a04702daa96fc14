// ABOUTME: Integration tests for the direct-message assistant
// ABOUTME: Scripts the completion backend with MockBackend and checks replies and wallet payloads

use raduno_core::assistant::{
    Assistant, AssistantOptions, Handled, RegistrationOutcome, CATCH_ALL_REPLY,
    CLARIFY_EVENT_REPLY, EMPTY_COMPLETION_REPLY, NO_EVENTS_REPLY, NO_SUITABLE_EVENT_REPLY,
    RECOMMEND_ERROR_REPLY, UNAVAILABLE_REPLY,
};
use raduno_core::chain::ChainReader;
use raduno_core::deadline::Deadline;
use raduno_core::testing::{MockContracts, MockEvent, MockTransport};
use raduno_core::traits::{IncomingContent, IncomingMessage, MessageContent};
use raduno_llm::backends::mock::MockBackend;
use serde_json::json;
use std::sync::Arc;

const AGENT: &str = "0x00000000000000000000000000000000000a6e47";
const USER: &str = "0x0000000000000000000000000000000000005e4d";
const OWNER: &str = "0x0000000000000000000000000000000000000a11";
const HACKATHON: &str = "0xaaa0000000000000000000000000000000000001";
const MEETUP: &str = "0xbbb0000000000000000000000000000000000002";

const INTENT: &str = "determine if they want to register";
const RECOMMEND: &str = "event recommendation assistant";
const SELECT: &str = "event selection assistant";

fn hackathon(date: &str) -> MockEvent {
    MockEvent::new(HACKATHON, OWNER, "hackathon")
        .text("nickname", "Hackathon")
        .text("date", date)
}

fn meetup() -> MockEvent {
    MockEvent::new(MEETUP, OWNER, "meetup")
        .text("nickname", "Meetup")
        .text("date", "2099-03-01T18:00:00Z")
}

fn options() -> AssistantOptions {
    AssistantOptions {
        paymaster_url: Some("https://paymaster.example/rpc".to_string()),
        ..AssistantOptions::default()
    }
}

fn assistant(
    transport: &MockTransport,
    contracts: MockContracts,
    llm: Option<&MockBackend>,
    options: AssistantOptions,
) -> Assistant {
    let deadline = Deadline::from_secs(5);
    Assistant::new(
        Arc::new(transport.clone()),
        ChainReader::new(Arc::new(contracts), "raduno.eth", deadline),
        llm.map(|m| m.shared()),
        deadline,
        options,
    )
}

fn dm(text: &str) -> IncomingMessage {
    IncomingMessage {
        conversation_id: "dm-1".to_string(),
        sender_inbox_id: "inbox-user".to_string(),
        sender_address: Some(USER.to_string()),
        content: IncomingContent::Text(text.to_string()),
        is_direct: true,
        timestamp: 0,
    }
}

fn replies(transport: &MockTransport) -> Vec<MessageContent> {
    transport
        .sent_messages()
        .into_iter()
        .map(|(conversation_id, content)| {
            assert_eq!(conversation_id, "dm-1");
            content
        })
        .collect()
}

fn payload_count(transport: &MockTransport) -> usize {
    replies(transport)
        .iter()
        .filter(|m| m.is_wallet_send_calls())
        .count()
}

#[tokio::test]
async fn test_recommendation_question_gets_model_reply() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new()
        .with_event(hackathon("2099-01-10"))
        .with_event(meetup());
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("RECOMMEND")
        .on_prompt(RECOMMEND)
        .respond_text("**Raduno - Hackathon** - [Register here](https://raduno.reza.dev/events/hackathon)");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant
        .handle_message(&dm("what events are happening this weekend?"))
        .await
        .unwrap();
    assert_eq!(handled, Handled::Recommended);

    let recommend_calls: Vec<_> = llm
        .calls()
        .into_iter()
        .filter(|c| c.system.contains(RECOMMEND))
        .collect();
    assert_eq!(recommend_calls.len(), 1);
    assert_eq!(recommend_calls[0].user, "what events are happening this weekend?");
    assert!(recommend_calls[0].system.contains("Address: 0xaaa0000000000000000000000000000000000001"));
    assert!(recommend_calls[0].system.contains("Label: meetup"));

    let sent = replies(&transport);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].text(),
        Some("**Raduno - Hackathon** - [Register here](https://raduno.reza.dev/events/hackathon)")
    );
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_registration_for_past_event_is_refused() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(hackathon("2020-01-01"));
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text(HACKATHON);
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant
        .handle_message(&dm("sign me up for the hackathon"))
        .await
        .unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::AlreadyPassed {
            event: HACKATHON.to_string()
        })
    );

    let sent = replies(&transport);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].text(),
        Some("❌ Sorry, but **Raduno - Hackathon** has already passed. You cannot register for past events.")
    );
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_registered_sender_is_told_so() {
    let transport = MockTransport::new(AGENT);
    let contracts =
        MockContracts::new().with_event(hackathon("2099-01-10").participants(&[USER]));
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text(HACKATHON);
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("sign me up")).await.unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::AlreadyRegistered {
            event: HACKATHON.to_string()
        })
    );

    let sent = replies(&transport);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].text(),
        Some("✅ You're already registered for **Raduno - Hackathon**!")
    );
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_registration_sends_wallet_payload_then_confirmation() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new()
        .with_event(meetup())
        .with_event(hackathon("2099-01-10"));
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text("  0xAAA0000000000000000000000000000000000001\n");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant
        .handle_message(&dm("Register me for the hackathon please"))
        .await
        .unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::PayloadSent {
            event: HACKATHON.to_string()
        })
    );

    let sent = replies(&transport);
    assert_eq!(sent.len(), 2);
    let MessageContent::WalletSendCalls(payload) = &sent[0] else {
        panic!("expected wallet payload first, got {:?}", sent[0]);
    };
    assert_eq!(payload.version, "1.0");
    assert_eq!(payload.from, USER);
    assert_eq!(payload.chain_id, "0x2105");
    assert_eq!(payload.calls.len(), 1);
    assert_eq!(payload.calls[0].to, HACKATHON);
    assert_eq!(payload.calls[0].data, ChainReader::register_calldata());
    assert_eq!(payload.calls[0].metadata.description, "Register for Raduno - Hackathon");
    assert_eq!(payload.calls[0].metadata.event_label, "hackathon");
    assert_eq!(payload.calls[0].metadata.hostname, "raduno.reza.dev");

    let wire = serde_json::to_value(payload).unwrap();
    assert_eq!(
        wire["capabilities"]["paymasterService"]["url"],
        "https://paymaster.example/rpc"
    );

    assert_eq!(
        sent[1].text(),
        Some("🎉 I've prepared your registration for **Raduno - Hackathon**!\n\nPlease approve the transaction in your Base app to complete your registration.")
    );
}

#[tokio::test]
async fn test_full_event_is_refused() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(
        hackathon("2099-01-10")
            .participants(&[OWNER])
            .capacity(1),
    );
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text(HACKATHON);
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("sign me up")).await.unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::Full {
            event: HACKATHON.to_string()
        })
    );
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_none_selection_gets_no_suitable_event_reply() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(hackathon("2020-01-01"));
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text("NONE");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("register me")).await.unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::NoSuitableEvent)
    );
    assert_eq!(replies(&transport)[0].text(), Some(NO_SUITABLE_EVENT_REPLY));
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_unmatched_selection_falls_back_to_first_event() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new()
        .with_event(meetup())
        .with_event(hackathon("2099-01-10"));
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text("the hackathon one");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("register me")).await.unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::PayloadSent {
            event: MEETUP.to_string()
        })
    );
}

#[tokio::test]
async fn test_unmatched_selection_asks_for_clarification_when_fallback_disabled() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text("0x0000000000000000000000000000000000000bad");
    let options = AssistantOptions {
        fallback_to_first_event: false,
        ..options()
    };
    let assistant = assistant(&transport, contracts, Some(&llm), options);

    let handled = assistant.handle_message(&dm("register me")).await.unwrap();
    assert_eq!(
        handled,
        Handled::Registration(RegistrationOutcome::NeedsClarification)
    );
    assert_eq!(replies(&transport)[0].text(), Some(CLARIFY_EVENT_REPLY));
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_payload_omits_paymaster_when_unconfigured() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_text(MEETUP);
    let assistant = assistant(&transport, contracts, Some(&llm), AssistantOptions::default());

    assistant.handle_message(&dm("register me")).await.unwrap();
    let MessageContent::WalletSendCalls(payload) = &replies(&transport)[0] else {
        panic!("expected wallet payload");
    };
    assert!(payload.capabilities.is_none());
}

#[tokio::test]
async fn test_missing_credential_gets_unavailable_reply() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    let assistant = assistant(&transport, contracts, None, options());

    let handled = assistant.handle_message(&dm("hello")).await.unwrap();
    assert_eq!(handled, Handled::Unavailable);
    assert_eq!(replies(&transport)[0].text(), Some(UNAVAILABLE_REPLY));
}

#[tokio::test]
async fn test_no_events_reply() {
    let transport = MockTransport::new(AGENT);
    let llm = MockBackend::new();
    let assistant = assistant(&transport, MockContracts::new(), Some(&llm), options());

    let handled = assistant.handle_message(&dm("anything on?")).await.unwrap();
    assert_eq!(handled, Handled::NoEvents);
    assert_eq!(replies(&transport)[0].text(), Some(NO_EVENTS_REPLY));
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_unreadable_factory_is_treated_as_no_events() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    contracts.fail_factory();
    let llm = MockBackend::new();
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("anything on?")).await.unwrap();
    assert_eq!(handled, Handled::NoEvents);
}

#[tokio::test]
async fn test_group_messages_are_ignored() {
    let transport = MockTransport::new(AGENT);
    let llm = MockBackend::new();
    let assistant = assistant(&transport, MockContracts::new().with_event(meetup()), Some(&llm), options());

    let mut message = dm("sign me up");
    message.is_direct = false;
    assert_eq!(assistant.handle_message(&message).await.unwrap(), Handled::Ignored);
    assert!(transport.calls().is_empty());
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_sender_is_ignored() {
    let transport = MockTransport::new(AGENT);
    let assistant = assistant(&transport, MockContracts::new(), None, options());

    let mut message = dm("hi");
    message.sender_address = None;
    assert_eq!(assistant.handle_message(&message).await.unwrap(), Handled::Ignored);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_ambiguous_intent_takes_recommend_branch() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER or RECOMMEND")
        .on_prompt(RECOMMEND)
        .respond_text("Try the meetup!");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("register?")).await.unwrap();
    assert_eq!(handled, Handled::Recommended);
    assert_eq!(payload_count(&transport), 0);
}

#[tokio::test]
async fn test_classification_error_takes_recommend_branch() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_error("rate limited")
        .on_prompt(RECOMMEND)
        .respond_text("Try the meetup!");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("sign me up")).await.unwrap();
    assert_eq!(handled, Handled::Recommended);
    assert_eq!(replies(&transport)[0].text(), Some("Try the meetup!"));
}

#[tokio::test]
async fn test_recommend_failures_use_fixed_replies() {
    let transport = MockTransport::new(AGENT);
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("RECOMMEND")
        .on_prompt(RECOMMEND)
        .respond_error("upstream down")
        .on_prompt(INTENT)
        .respond_text("RECOMMEND")
        .on_prompt(RECOMMEND)
        .respond_text("   ");
    let assistant = assistant(
        &transport,
        MockContracts::new().with_event(meetup()),
        Some(&llm),
        options(),
    );

    assistant.handle_message(&dm("what's on?")).await.unwrap();
    assistant.handle_message(&dm("what's on?")).await.unwrap();

    let texts: Vec<String> = replies(&transport)
        .iter()
        .filter_map(|m| m.text().map(str::to_string))
        .collect();
    assert_eq!(
        texts,
        vec![
            RECOMMEND_ERROR_REPLY.to_string(),
            EMPTY_COMPLETION_REPLY.to_string()
        ]
    );
}

#[tokio::test]
async fn test_unexpected_failure_ends_in_plain_catch_all_reply() {
    let transport = MockTransport::new(AGENT);
    let contracts = MockContracts::new().with_event(meetup());
    let llm = MockBackend::new()
        .on_prompt(INTENT)
        .respond_text("REGISTER")
        .on_prompt(SELECT)
        .respond_error("selection backend exploded");
    let assistant = assistant(&transport, contracts, Some(&llm), options());

    let handled = assistant.handle_message(&dm("sign me up")).await.unwrap();
    assert_eq!(handled, Handled::Failed);

    let sent = replies(&transport);
    assert_eq!(sent, vec![MessageContent::plain(CATCH_ALL_REPLY)]);
}

#[tokio::test]
async fn test_transaction_reference_is_acknowledged_with_explorer_link() {
    let transport = MockTransport::new(AGENT);
    let assistant = assistant(&transport, MockContracts::new(), None, options());
    let hash = "0x8f4bd3e9a1c2b7f0e6d5c4b3a29180716f5e4d3c2b1a09f8e7d6c5b4a3928170";

    let mut message = dm("");
    message.content = IncomingContent::TransactionReference(json!({
        "namespace": "eip155",
        "networkId": "0x2105",
        "reference": hash
    }));

    let handled = assistant.handle_message(&message).await.unwrap();
    assert_eq!(
        handled,
        Handled::TransactionAcknowledged {
            hash: Some(hash.to_string())
        }
    );
    let sent = replies(&transport);
    assert!(sent[0]
        .text()
        .unwrap()
        .contains(&format!("https://basescan.org/tx/{}", hash)));
}

#[tokio::test]
async fn test_unrecognized_transaction_reference_gets_generic_ack() {
    let transport = MockTransport::new(AGENT);
    let assistant = assistant(&transport, MockContracts::new(), None, options());

    let mut message = dm("");
    message.content = IncomingContent::TransactionReference(json!({ "status": "ok" }));

    let handled = assistant.handle_message(&message).await.unwrap();
    assert_eq!(handled, Handled::TransactionAcknowledged { hash: None });
    assert_eq!(replies(&transport).len(), 1);
}
