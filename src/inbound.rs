// ABOUTME: Inbound message loop feeding direct messages to the assistant
// ABOUTME: Each message is handled on its own task; in-flight handlers are drained on shutdown

use futures_util::StreamExt;
use raduno_core::assistant::{Assistant, Handled};
use raduno_core::traits::EventStream;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Dispatch messages from `stream` until shutdown or the stream ends.
/// Returns the number of messages dispatched.
pub async fn run_message_loop(
    assistant: Assistant,
    mut stream: EventStream,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut handlers = JoinSet::new();
    let mut dispatched = 0usize;

    loop {
        tokio::select! {
            next = stream.next() => {
                let Some(message) = next else {
                    tracing::warn!("Inbound message stream ended");
                    break;
                };
                dispatched += 1;
                let assistant = assistant.clone();
                handlers.spawn(async move {
                    match assistant.handle_message(&message).await {
                        Ok(Handled::Ignored) => {}
                        Ok(handled) => {
                            tracing::debug!(
                                conversation_id = %message.conversation_id,
                                outcome = ?handled,
                                "Direct message handled"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                conversation_id = %message.conversation_id,
                                error = %format!("{:#}", e),
                                "Failed to answer direct message"
                            );
                        }
                    }
                });
            }
            // Reap finished handlers so the set does not grow unbounded
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Message handler task panicked");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let in_flight = handlers.len();
    if in_flight > 0 {
        tracing::info!(in_flight, "Waiting for message handlers to finish");
    }
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Message handler task panicked");
        }
    }

    dispatched
}
