//! Aggregate queries over the message store.
//!
//! Every function is a fresh scan of the current record set; nothing is
//! cached between calls. Soft-deleted records still count everywhere, with
//! the deletion surfaced only where a query reports it explicitly.

use crate::model::MessageRecord;
use crate::store::MessageStore;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

/// One calendar day in the reference time zone, covering
/// `[00:00:00.000, 23:59:59.999]` inclusive.
#[derive(Clone, Copy, Debug)]
pub struct LocalDay {
    date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl LocalDay {
    pub fn new(date: NaiveDate, offset: FixedOffset) -> Self {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let utc_start = local_midnight - Duration::seconds(offset.local_minus_utc() as i64);
        let start = DateTime::<Utc>::from_naive_utc_and_offset(utc_start, Utc);
        Self {
            date,
            start,
            end: start + Duration::days(1) - Duration::milliseconds(1),
        }
    }

    pub fn today(offset: FixedOffset) -> Self {
        Self::new(Utc::now().with_timezone(&offset).date_naive(), offset)
    }

    pub fn yesterday(offset: FixedOffset) -> Self {
        let date = Utc::now().with_timezone(&offset).date_naive() - Duration::days(1);
        Self::new(date, offset)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

fn matches(
    record: &MessageRecord,
    guild_id: Option<&str>,
    channel_id: Option<&str>,
    day: Option<&LocalDay>,
) -> bool {
    guild_id.map_or(true, |g| record.guild_id == g)
        && channel_id.map_or(true, |c| record.channel_id == c)
        && day.map_or(true, |d| d.contains(record.timestamp))
}

/// Real-user messages, optionally scoped to a guild and/or a calendar day.
pub fn count_messages(
    store: &MessageStore,
    guild_id: Option<&str>,
    day: Option<LocalDay>,
) -> usize {
    store.with_messages(|records| {
        records
            .iter()
            .filter(|r| r.is_real_user() && matches(r, guild_id, None, day.as_ref()))
            .count()
    })
}

/// Real-user messages by one author, optionally scoped to a day and channel.
pub fn count_user_messages(
    store: &MessageStore,
    guild_id: &str,
    author_id: &str,
    day: Option<LocalDay>,
    channel_id: Option<&str>,
) -> usize {
    store.with_messages(|records| {
        records
            .iter()
            .filter(|r| {
                r.is_real_user()
                    && r.author_id == author_id
                    && matches(r, Some(guild_id), channel_id, day.as_ref())
            })
            .count()
    })
}

/// Real-user messages in one channel across all authors.
pub fn count_channel_messages(
    store: &MessageStore,
    channel_id: &str,
    day: Option<LocalDay>,
) -> usize {
    store.with_messages(|records| {
        records
            .iter()
            .filter(|r| r.is_real_user() && matches(r, None, Some(channel_id), day.as_ref()))
            .count()
    })
}

/// One `(moderator, channel)` group of the daily breakdown.
#[derive(Clone, Debug)]
pub struct ModeratorChannelCount {
    pub author_id: String,
    pub author_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub count: usize,
    pub deleted_count: usize,
}

/// Moderator activity for the day, grouped by `(author, channel)` and sorted
/// by raw count descending. Ties keep discovery order.
pub fn moderator_breakdown(
    store: &MessageStore,
    guild_id: &str,
    mod_ids: &[String],
    day: LocalDay,
) -> Vec<ModeratorChannelCount> {
    store.with_messages(|records| {
        let mut groups: Vec<ModeratorChannelCount> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();

        for record in records {
            if !record.is_real_user()
                || !matches(record, Some(guild_id), None, Some(&day))
                || !mod_ids.contains(&record.author_id)
            {
                continue;
            }
            let key = (record.author_id.clone(), record.channel_id.clone());
            let idx = *index.entry(key).or_insert_with(|| {
                groups.push(ModeratorChannelCount {
                    author_id: record.author_id.clone(),
                    author_name: record.author_name.clone(),
                    channel_id: record.channel_id.clone(),
                    channel_name: record.channel_name.clone(),
                    count: 0,
                    deleted_count: 0,
                });
                groups.len() - 1
            });
            groups[idx].count += 1;
            if record.deleted || record.channel_deleted {
                groups[idx].deleted_count += 1;
            }
        }

        groups.sort_by(|a, b| b.count.cmp(&a.count));
        groups
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModMemberSplit {
    pub mod_count: usize,
    pub member_count: usize,
}

/// Partitions the day's real-user messages by moderator membership. Bots and
/// webhook relays appear on neither side.
pub fn mod_member_split(
    store: &MessageStore,
    guild_id: &str,
    mod_ids: &[String],
    day: LocalDay,
    channel_id: Option<&str>,
) -> ModMemberSplit {
    store.with_messages(|records| {
        let mut split = ModMemberSplit::default();
        for record in records {
            if !record.is_real_user() || !matches(record, Some(guild_id), channel_id, Some(&day)) {
                continue;
            }
            if mod_ids.contains(&record.author_id) {
                split.mod_count += 1;
            } else {
                split.member_count += 1;
            }
        }
        split
    })
}

/// All-time record counts per channel name, raw traffic included (bots and
/// relays too), sorted by count descending.
pub fn counts_by_channel(store: &MessageStore) -> Vec<(String, usize)> {
    store.with_messages(|records| {
        let mut by_channel: HashMap<String, usize> = HashMap::new();
        for record in records {
            *by_channel.entry(record.channel_name.clone()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, usize)> = by_channel.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageRecord, WEBHOOK_DISCRIMINATOR};
    use crate::store::tests::{open_temp, record};
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> LocalDay {
        LocalDay::new(NaiveDate::from_ymd_opt(y, m, d).unwrap(), utc())
    }

    fn record_at(id: &str, author: &str, channel: &str, ts: DateTime<Utc>) -> MessageRecord {
        let mut message = record(id, author, channel);
        message.timestamp = ts;
        message
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_bots_and_relays_are_not_real_activity() {
        let store = open_temp("q-real").await;
        store.upsert(record("1", "u1", "c1"));

        let mut bot = record("2", "bot", "c1");
        bot.is_bot = true;
        store.upsert(bot);

        let mut relay = record("3", "hook", "c1");
        relay.author_discriminator = WEBHOOK_DISCRIMINATOR.to_string();
        store.upsert(relay);

        assert_eq!(count_messages(&store, Some("g1"), None), 1);
        assert_eq!(count_user_messages(&store, "g1", "bot", None, None), 0);
        assert_eq!(count_channel_messages(&store, "c1", None), 1);

        let split = mod_member_split(&store, "g1", &["u1".to_string()], day(2024, 3, 1), None);
        assert_eq!(split.mod_count, 1);
        assert_eq!(split.member_count, 0);

        // Raw traffic still sees all three.
        assert_eq!(counts_by_channel(&store), vec![("chan-c1".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_deletion_does_not_change_raw_counts() {
        let store = open_temp("q-deletion").await;
        store.upsert(record("1", "u1", "c1"));
        store.upsert(record("2", "u1", "c1"));

        let today = day(2024, 3, 1);
        let before = count_messages(&store, Some("g1"), Some(today));
        store.mark_deleted("1");
        assert_eq!(count_messages(&store, Some("g1"), Some(today)), before);

        let breakdown = moderator_breakdown(&store, "g1", &["u1".to_string()], today);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].count, 2);
        assert_eq!(breakdown[0].deleted_count, 1);
    }

    #[tokio::test]
    async fn test_channel_deletion_counts_as_deleted_in_breakdown() {
        let store = open_temp("q-channel-deletion").await;
        store.upsert(record("1", "u1", "c1"));
        store.mark_channel_deleted("c1");

        let breakdown = moderator_breakdown(&store, "g1", &["u1".to_string()], day(2024, 3, 1));
        assert_eq!(breakdown[0].deleted_count, 1);
    }

    #[tokio::test]
    async fn test_calendar_day_boundary_is_millisecond_exact() {
        let store = open_temp("q-boundary").await;
        let last_instant =
            Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap() + Duration::milliseconds(999);
        let next_midnight = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        store.upsert(record_at("1", "u1", "c1", last_instant));
        store.upsert(record_at("2", "u1", "c1", next_midnight));

        assert_eq!(count_messages(&store, Some("g1"), Some(day(2024, 3, 1))), 1);
        assert_eq!(count_messages(&store, Some("g1"), Some(day(2024, 3, 2))), 1);
    }

    #[tokio::test]
    async fn test_day_bucket_follows_reference_offset() {
        let store = open_temp("q-offset").await;
        // 22:30 UTC on Feb 29 is already March 1st at UTC+2.
        store.upsert(record_at(
            "1",
            "u1",
            "c1",
            Utc.with_ymd_and_hms(2024, 2, 29, 22, 30, 0).unwrap(),
        ));

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let march_first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let shifted = LocalDay::new(march_first, plus_two);
        assert_eq!(count_messages(&store, Some("g1"), Some(shifted)), 1);

        let utc_day = LocalDay::new(march_first, utc());
        assert_eq!(count_messages(&store, Some("g1"), Some(utc_day)), 0);
    }

    #[tokio::test]
    async fn test_channel_count_scenario() {
        let store = open_temp("q-scenario").await;
        let mut relay = record_at("3", "U2", "10", noon(2024, 3, 1));
        relay.author_discriminator = WEBHOOK_DISCRIMINATOR.to_string();
        store.upsert_batch(vec![
            record_at("1", "U1", "10", noon(2024, 3, 1)),
            record_at("2", "U1", "10", noon(2024, 3, 1)),
            relay,
        ]);

        assert_eq!(
            count_channel_messages(&store, "10", Some(day(2024, 3, 1))),
            2
        );
    }

    #[tokio::test]
    async fn test_breakdown_groups_and_sorts_by_count() {
        let store = open_temp("q-breakdown").await;
        let ts = noon(2024, 3, 1);
        store.upsert(record_at("1", "m1", "c1", ts));
        store.upsert(record_at("2", "m1", "c1", ts));
        store.upsert(record_at("3", "m1", "c2", ts));
        store.upsert(record_at("4", "m2", "c1", ts));
        store.upsert(record_at("5", "member", "c1", ts));

        let mods = vec!["m1".to_string(), "m2".to_string()];
        let breakdown = moderator_breakdown(&store, "g1", &mods, day(2024, 3, 1));

        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown[0].author_id, "m1");
        assert_eq!(breakdown[0].channel_id, "c1");
        assert_eq!(breakdown[0].count, 2);
        // Ties keep discovery order: m1/c2 was seen before m2/c1.
        assert_eq!(breakdown[1].author_id, "m1");
        assert_eq!(breakdown[1].channel_id, "c2");
        assert_eq!(breakdown[2].author_id, "m2");
    }

    #[tokio::test]
    async fn test_split_partitions_by_moderator_set() {
        let store = open_temp("q-split").await;
        let ts = noon(2024, 3, 1);
        store.upsert(record_at("1", "m1", "c1", ts));
        store.upsert(record_at("2", "member", "c1", ts));
        store.upsert(record_at("3", "member", "c2", ts));

        let mods = vec!["m1".to_string()];
        let split = mod_member_split(&store, "g1", &mods, day(2024, 3, 1), None);
        assert_eq!(
            split,
            ModMemberSplit {
                mod_count: 1,
                member_count: 2
            }
        );

        let scoped = mod_member_split(&store, "g1", &mods, day(2024, 3, 1), Some("c1"));
        assert_eq!(
            scoped,
            ModMemberSplit {
                mod_count: 1,
                member_count: 1
            }
        );
    }

    #[tokio::test]
    async fn test_user_count_scopes_to_guild_and_channel() {
        let store = open_temp("q-user").await;
        store.upsert(record("1", "u1", "c1"));
        store.upsert(record("2", "u1", "c2"));
        let mut other_guild = record("3", "u1", "c3");
        other_guild.guild_id = "g2".to_string();
        store.upsert(other_guild);

        assert_eq!(count_user_messages(&store, "g1", "u1", None, None), 2);
        assert_eq!(count_user_messages(&store, "g1", "u1", None, Some("c1")), 1);
        assert_eq!(count_user_messages(&store, "g2", "u1", None, None), 1);
    }

    #[tokio::test]
    async fn test_counts_by_channel_sorted_descending() {
        let store = open_temp("q-by-channel").await;
        store.upsert(record("1", "u1", "c1"));
        store.upsert(record("2", "u1", "c2"));
        store.upsert(record("3", "u1", "c2"));

        assert_eq!(
            counts_by_channel(&store),
            vec![("chan-c2".to_string(), 2), ("chan-c1".to_string(), 1)]
        );
    }
}
