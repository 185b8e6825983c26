pub mod access;
pub mod count;
pub mod scan;
pub mod stats;

use crate::queries::LocalDay;
use crate::report;
use crate::{Context, Error};
use chrono::{FixedOffset, NaiveDate};
use poise::serenity_prelude as serenity;

/// Command gate: the owner or anyone on the stored access list.
pub async fn has_access(ctx: Context<'_>) -> Result<bool, Error> {
    let user_id = ctx.author().id.get();
    if ctx.data().config.owner_id == Some(user_id) {
        return Ok(true);
    }
    Ok(ctx.data().store.is_allowed(&user_id.to_string()))
}

/// Command gate: the owner only.
pub async fn is_owner(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(ctx.data().config.owner_id == Some(ctx.author().id.get()))
}

/// Accepts the date formats people actually type. Day-first formats win
/// over month-first when both could match.
pub fn parse_day(input: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 5] = ["%d/%m/%Y", "%d%m%Y", "%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];
    let input = input.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
}

/// Optional date argument → calendar day, defaulting to today.
pub(crate) fn resolve_day(
    date: Option<&str>,
    offset: FixedOffset,
) -> Result<LocalDay, &'static str> {
    match date {
        None => Ok(LocalDay::today(offset)),
        Some(raw) => parse_day(raw).map(|d| LocalDay::new(d, offset)).ok_or(
            "Could not parse that date. Supported formats: DD/MM/YYYY, DDMMYYYY, YYYY-MM-DD.",
        ),
    }
}

/// Resolves the configured moderator role to its member ids.
pub(crate) async fn moderator_ids(ctx: &Context<'_>) -> anyhow::Result<Vec<String>> {
    let Some(role_id) = ctx.data().config.mod_role_id else {
        anyhow::bail!("MOD_ROLE_ID is not configured");
    };
    let guild_id = serenity::GuildId::new(ctx.data().config.target_guild_id);
    report::fetch_role_member_ids(
        &ctx.serenity_context().http,
        guild_id,
        serenity::RoleId::new(role_id),
    )
    .await
}

/// Caps `text` at `max_length` bytes (ellipsis included), cutting on a char
/// boundary so multi-byte content never splits or overshoots the limit.
pub(crate) fn truncate(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        return text.to_string();
    }
    let mut end = max_length.saturating_sub(3);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_day("01/03/2024"), Some(expected));
        assert_eq!(parse_day("01032024"), Some(expected));
        assert_eq!(parse_day("2024-03-01"), Some(expected));
        assert_eq!(parse_day("01-03-2024"), Some(expected));
        assert_eq!(parse_day(" 2024-03-01 "), Some(expected));
        assert_eq!(parse_day("yesterday"), None);
    }

    #[test]
    fn test_parse_day_prefers_day_first() {
        // Ambiguous between DD/MM and MM/DD: day-first wins.
        let parsed = parse_day("02/03/2024").unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        let long = "x".repeat(20);
        let cut = truncate(&long, 10);
        assert_eq!(cut.len(), 10);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_is_byte_safe_on_multibyte_text() {
        let emoji = "📊".repeat(10);
        let cut = truncate(&emoji, 10);
        assert!(cut.len() <= 10, "byte length must not exceed the limit");
        assert!(cut.ends_with("..."));
        assert!(cut.starts_with('📊'));
    }
}
