//! Demo data generation.

use courier_shared::constants::{
    SEED_MESSAGES_PER_CHAT_MAX, SEED_MESSAGES_PER_CHAT_MIN, SEED_TOTAL_CHATS,
};
use courier_shared::metrics::{MetricsSink, QueryTimer};
use courier_shared::types::now_millis;
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::params;
use uuid::Uuid;

use crate::database::{seal, Database};
use crate::error::Result;
use crate::models::{SeedReport, Table};

const SEVEN_DAYS_MS: i64 = 7 * 24 * 60 * 60 * 1000;

const NAMES: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Iris", "Jack",
    "Karen", "Leo", "Mia", "Noah", "Olivia", "Paul", "Quinn", "Rose", "Sam", "Tina", "Uma",
    "Victor", "Wendy", "Xavier", "Yara", "Zane", "Amara", "Björn", "Chiara", "Dmitri",
];

const TITLE_PREFIXES: &[&str] = &[
    "Project", "Team", "Design", "Platform", "Security", "Ops", "Frontend", "Backend",
    "Mobile", "QA", "Research", "Infra",
];

const TITLE_SUFFIXES: &[&str] = &[
    "Standup", "Review", "Planning", "Retro", "Sync", "Updates", "Hub", "Room", "Thread",
];

const BODIES: &[&str] = &[
    "Has anyone looked at the open pull request?",
    "Pushed a fix for the login timeout.",
    "Can we talk through the schema change tomorrow?",
    "The pipeline is green again.",
    "Spotted something odd in the API error paths.",
    "Nice work on the new settings page.",
    "How are we handling reconnects on flaky networks?",
    "All tests pass on every target now.",
    "The chat list query needs an index.",
    "Docs are updated with the new endpoints.",
    "A user reported duplicated messages after sync.",
    "Sharing my screen in five minutes.",
    "Release branch is cut.",
    "Could someone review the encryption changes?",
    "Scrolling stays smooth with ten thousand rows.",
    "WAL mode fixed the reader stalls.",
    "Morning all, what is on the board today?",
    "Search is wired up end to end.",
    "Reminder: freeze starts Friday at noon.",
    "The backoff caps at thirty seconds as planned.",
];

/// Volume of generated demo data.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub total_chats: usize,
    pub messages_per_chat_min: usize,
    pub messages_per_chat_max: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            total_chats: SEED_TOTAL_CHATS,
            messages_per_chat_min: SEED_MESSAGES_PER_CHAT_MIN,
            messages_per_chat_max: SEED_MESSAGES_PER_CHAT_MAX,
        }
    }
}

fn pick<'a>(rng: &mut impl Rng, pool: &[&'a str]) -> &'a str {
    pool.choose(rng).copied().unwrap_or_default()
}

fn chat_title(rng: &mut impl Rng, index: usize) -> String {
    match NAMES.get(index) {
        Some(name) => name.to_string(),
        None => format!("{} {}", pick(rng, TITLE_PREFIXES), pick(rng, TITLE_SUFFIXES)),
    }
}

impl Database {
    /// Fill an empty database with demo chats and encrypted messages.
    ///
    /// Does nothing when any chat already exists, reporting the existing chat
    /// count and zero messages. Everything is written in one transaction.
    pub fn seed_database(&mut self, config: &SeedConfig) -> Result<SeedReport> {
        let existing = self.count_rows(Table::Chats)? as usize;
        if existing > 0 {
            tracing::info!(chats = existing, "database already seeded");
            return Ok(SeedReport {
                chats: existing,
                messages: 0,
            });
        }

        let Self {
            conn,
            cipher,
            metrics,
        } = self;
        let metrics: &dyn MetricsSink = &**metrics;
        let _timer = QueryTimer::start(metrics, "seed_database");

        let mut rng = rand::thread_rng();
        let now = now_millis();
        let window_start = now - SEVEN_DAYS_MS;
        let min = config.messages_per_chat_min;
        let max = config.messages_per_chat_max.max(min);
        let mut total_messages = 0usize;

        let tx = conn.transaction()?;
        {
            let mut insert_chat = tx.prepare(
                "INSERT INTO chats (id, title, last_message_at, unread_count)
                 VALUES (?1, ?2, 0, ?3)",
            )?;
            let mut insert_message = tx.prepare(
                "INSERT INTO messages (id, chat_id, ts, sender, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut set_last_message = tx.prepare(
                "UPDATE chats SET last_message_at = ?1 WHERE id = ?2",
            )?;

            for index in 0..config.total_chats {
                let chat_id = Uuid::new_v4().to_string();
                let message_count = rng.gen_range(min..=max);
                let unread = rng.gen_range(0..=message_count.min(10)) as u32;

                // Chat first: messages reference it.
                insert_chat.execute(params![chat_id, chat_title(&mut rng, index), unread])?;

                let mut last_ts = 0i64;
                for j in 0..message_count {
                    let progress = j as f64 / message_count as f64;
                    // Jitter never pushes a message past `now`, where the
                    // default page cursor would hide it.
                    let ts = (window_start
                        + (progress * SEVEN_DAYS_MS as f64) as i64
                        + rng.gen_range(0..=60_000))
                    .min(now);
                    let body = seal(cipher, metrics, pick(&mut rng, BODIES))?;

                    insert_message.execute(params![
                        Uuid::new_v4().to_string(),
                        chat_id,
                        ts,
                        pick(&mut rng, NAMES),
                        body,
                    ])?;
                    last_ts = last_ts.max(ts);
                }
                total_messages += message_count;

                set_last_message.execute(params![last_ts, chat_id])?;
            }
        }
        tx.commit()?;

        tracing::info!(
            chats = config.total_chats,
            messages = total_messages,
            "seeded database"
        );

        Ok(SeedReport {
            chats: config.total_chats,
            messages: total_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use courier_shared::crypto::generate_symmetric_key;
    use courier_shared::MessageCipher;

    use super::*;

    fn small() -> SeedConfig {
        SeedConfig {
            total_chats: 5,
            messages_per_chat_min: 3,
            messages_per_chat_max: 6,
        }
    }

    #[test]
    fn test_seed_populates_and_is_idempotent() {
        let mut db =
            Database::open_in_memory(MessageCipher::from_key(generate_symmetric_key())).unwrap();

        let report = db.seed_database(&small()).unwrap();
        assert_eq!(report.chats, 5);
        assert!((15..=30).contains(&report.messages));
        assert_eq!(db.count_rows(Table::Messages).unwrap() as usize, report.messages);

        let again = db.seed_database(&small()).unwrap();
        assert_eq!(again, SeedReport { chats: 5, messages: 0 });
        assert_eq!(db.count_rows(Table::Chats).unwrap(), 5);
    }

    #[test]
    fn test_seeded_chats_are_consistent() {
        let mut db =
            Database::open_in_memory(MessageCipher::from_key(generate_symmetric_key())).unwrap();
        db.seed_database(&small()).unwrap();

        let chats = db.list_chats(0, 10).unwrap();
        assert_eq!(chats.len(), 5);
        assert!(chats.iter().all(|c| !c.title.is_empty()));

        for chat in &chats {
            assert!(chat.unread_count <= 10);

            let newest = db.list_messages(&chat.id, i64::MAX, 1).unwrap();
            assert_eq!(newest[0].ts, chat.last_message_at);
            assert!(BODIES.contains(&newest[0].body.as_str()));
        }

        let titles: Vec<&str> = chats.iter().map(|c| c.title.as_str()).collect();
        for name in &NAMES[..5] {
            assert!(titles.contains(name));
        }
    }

    #[test]
    fn test_seeded_messages_are_never_in_the_future() {
        let mut db =
            Database::open_in_memory(MessageCipher::from_key(generate_symmetric_key())).unwrap();
        db.seed_database(&small()).unwrap();
        let cursor = now_millis() + 1;

        for chat in db.list_chats(0, 10).unwrap() {
            assert!(chat.last_message_at < cursor);
            let newest = db.list_messages(&chat.id, cursor, 1).unwrap();
            assert_eq!(newest[0].ts, chat.last_message_at);
        }
    }
}
