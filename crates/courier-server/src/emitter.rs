//! Synthetic message traffic.

use std::time::Duration;

use courier_shared::protocol::NewMessageEvent;
use courier_shared::types::now_millis;
use courier_store::{Database, Message, StoreError};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

const SENDERS: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Iris", "Jack",
];

const BODIES: &[&str] = &[
    "Just pushed the latest changes.",
    "Can someone take a look at this?",
    "Meeting in ten minutes.",
    "Build is green on main.",
    "Found the cause of that flaky test.",
    "Deploying to staging now.",
    "Who owns the billing service these days?",
    "Thanks, that fixed it!",
    "Lunch anyone?",
    "Logs look clean since the restart.",
    "I'll write up the incident notes.",
    "Benchmarks are in the doc.",
];

/// A uniformly random delay in `[min, max]`.
pub fn next_delay(rng: &mut impl Rng, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// A message from a random sender with a random body, stamped now.
pub fn synthesize(rng: &mut impl Rng, chat_id: &str) -> Message {
    Message {
        id: Uuid::new_v4().to_string(),
        chat_id: chat_id.to_string(),
        ts: now_millis(),
        sender: SENDERS.choose(rng).copied().unwrap_or("Courier").to_string(),
        body: BODIES.choose(rng).copied().unwrap_or("ping").to_string(),
    }
}

/// One emission: pick a chat, persist a synthesized message into it, and
/// return the event to broadcast. `None` when the database has no chats.
pub fn emit_once(db: &mut Database) -> Result<Option<NewMessageEvent>, StoreError> {
    let Some(chat) = db.random_chat()? else {
        return Ok(None);
    };

    let message = synthesize(&mut rand::thread_rng(), &chat.id);
    db.insert_message(&message)?;

    Ok(Some(NewMessageEvent::new(message.into(), chat.title)))
}
