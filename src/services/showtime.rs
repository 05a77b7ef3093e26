//! Next-show lookups and time formatting.
//!
//! Each show's site answers `GET /nextshow/` with the Unix timestamp of the
//! next scheduled episode.

use anyhow::{Context, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::{Community, Show};

/// Where the IANA zone list lives, for the "unknown timezone" reply.
pub const TZ_LIST_URL: &str = "https://en.wikipedia.org/wiki/List_of_tz_database_time_zones";

/// Fetch the next show time from the show's site.
pub async fn fetch_showtime(
    http: &reqwest::Client,
    url_template: &str,
    show: &Show,
) -> anyhow::Result<DateTime<Utc>> {
    let url = url_template.replace("{domain}", &show.domain);
    debug!("Fetching next show time for {} from {}", show.slug, url);

    let response = http.get(&url).send().await?;
    if !response.status().is_success() {
        bail!("API returned {}", response.status().as_u16());
    }
    let body = response.text().await?;
    parse_timestamp(&body)
}

/// Parse the API body: a Unix timestamp in seconds.
pub fn parse_timestamp(body: &str) -> anyhow::Result<DateTime<Utc>> {
    let secs: i64 = body
        .trim()
        .parse()
        .with_context(|| format!("API returned a non-timestamp body: {:?}", body.trim()))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .with_context(|| format!("timestamp out of range: {secs}"))
}

/// How to render a show date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateStyle {
    Zone(Tz),
    Discordian,
    Beat,
}

/// Resolve a user-supplied zone argument.
///
/// Order: calendar keywords, configured aliases, short abbreviations
/// (upper-cased, e.g. `est`), then the name verbatim.
pub fn resolve_style(arg: &str, community: &Community) -> Option<DateStyle> {
    let lower = arg.to_lowercase();
    match lower.as_str() {
        "ddate" | "discordian" => return Some(DateStyle::Discordian),
        "beat" | "swatch" | "internet" => return Some(DateStyle::Beat),
        _ => {}
    }

    let name = if let Some(canonical) = community.timezone_alias(&lower) {
        canonical.to_string()
    } else if arg.len() < 5 {
        arg.to_uppercase()
    } else {
        arg.to_string()
    };

    name.parse::<Tz>().ok().map(DateStyle::Zone)
}

/// Render the show time in the requested style.
pub fn format_show_date(showtime: DateTime<Utc>, style: DateStyle) -> String {
    match style {
        DateStyle::Zone(tz) => showtime
            .with_timezone(&tz)
            .format("%a %e %b, %H:%M %Z")
            .to_string()
            .replace("  ", " "),
        DateStyle::Discordian => discordian_date(showtime.date_naive()),
        DateStyle::Beat => beat_time(showtime),
    }
}

/// Swatch Internet Time, e.g. `d01.05.24 @541`.
///
/// Beats count thousandths of a day from midnight in UTC+1.
pub fn beat_time(time: DateTime<Utc>) -> String {
    let local = time.naive_utc() + Duration::hours(1);
    let seconds = f64::from(local.num_seconds_from_midnight());
    let beats = (seconds / 86.4).round() as u32;
    format!("{} @{:03}", local.format("d%d.%m.%y"), beats)
}

const DISCORDIAN_WEEKDAYS: [&str; 5] = [
    "Sweetmorn",
    "Boomtime",
    "Pungenday",
    "Prickle-Prickle",
    "Setting Orange",
];
const DISCORDIAN_SEASONS: [&str; 5] = [
    "Chaos",
    "Discord",
    "Confusion",
    "Bureaucracy",
    "The Aftermath",
];
const APOSTLE_HOLYDAYS: [&str; 5] = ["Mungday", "Mojoday", "Syaday", "Zaraday", "Maladay"];
const SEASON_HOLYDAYS: [&str; 5] = ["Chaoflux", "Discoflux", "Confuflux", "Bureflux", "Afflux"];

/// Discordian calendar date, e.g.
/// `Setting Orange, the 5th day of Chaos in the YOLD 3190. Celebrate Mungday!`
pub fn discordian_date(date: NaiveDate) -> String {
    let yold = date.year() + 1166;
    let leap = NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some();

    if date.month() == 2 && date.day() == 29 {
        return format!("St. Tib's Day in the YOLD {}", yold);
    }

    // St. Tib's Day sits outside the week and season count.
    let mut ordinal = date.ordinal0() as usize;
    if leap && ordinal > 59 {
        ordinal -= 1;
    }

    let season = ordinal / 73;
    let day = ordinal % 73 + 1;
    let weekday = DISCORDIAN_WEEKDAYS[ordinal % 5];

    let mut text = format!(
        "{}, the {}{} day of {} in the YOLD {}",
        weekday,
        day,
        ordinal_suffix(day),
        DISCORDIAN_SEASONS[season],
        yold
    );
    match day {
        5 => text.push_str(&format!(". Celebrate {}!", APOSTLE_HOLYDAYS[season])),
        50 => text.push_str(&format!(". Celebrate {}!", SEASON_HOLYDAYS[season])),
        _ => {}
    }
    text
}

fn ordinal_suffix(n: usize) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Clock-style time until the show: `[N day(s), ]HH:MM`, with `:SS`
/// appended while the minute field is ten or less.
pub fn format_clock_delta(delta: Duration) -> String {
    let days = delta.num_days();
    let rest = delta.num_seconds() - days * 86_400;
    let hours = rest / 3600;
    let minutes = (rest / 60) % 60;
    let seconds = rest % 60;

    let mut text = day_prefix(days);
    text.push_str(&format!("{:02}:{:02}", hours, minutes));
    if minutes <= 10 {
        text.push_str(&format!(":{:02}", seconds));
    }
    text
}

/// `""`, `"1 day, "` or `"N days, "`.
pub fn day_prefix(days: i64) -> String {
    match days {
        0 => String::new(),
        1 => "1 day, ".to_string(),
        n => format!("{} days, ", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn community() -> Community {
        Community::from_toml_str(
            "[timezones]\n\"America/Chicago\" = [\"central\"]\n",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_timestamp() {
        let time = parse_timestamp(" 1714564800\n").unwrap();
        assert_eq!(time, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        assert!(parse_timestamp("soon").is_err());
    }

    #[test]
    fn test_resolve_style() {
        let community = community();

        assert_eq!(resolve_style("DDate", &community), Some(DateStyle::Discordian));
        assert_eq!(resolve_style("swatch", &community), Some(DateStyle::Beat));
        assert_eq!(
            resolve_style("Central", &community),
            Some(DateStyle::Zone(chrono_tz::America::Chicago))
        );
        assert_eq!(resolve_style("utc", &community), Some(DateStyle::Zone(chrono_tz::UTC)));
        assert_eq!(
            resolve_style("Europe/Berlin", &community),
            Some(DateStyle::Zone(chrono_tz::Europe::Berlin))
        );
        assert_eq!(resolve_style("Mars/Olympus", &community), None);
    }

    #[test]
    fn test_format_zone_date() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
        let text = format_show_date(time, DateStyle::Zone(chrono_tz::America::New_York));
        assert_eq!(text, "Wed 1 May, 19:30 EDT");
    }

    #[test]
    fn test_beat_time() {
        // 23:00 UTC is midnight in UTC+1, the start of the next beat day.
        let midnight = Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
        assert_eq!(beat_time(midnight), "d02.05.24 @000");

        // 11:00 UTC is noon BMT: 500 beats.
        let noon = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        assert_eq!(beat_time(noon), "d01.05.24 @500");
    }

    #[test]
    fn test_discordian_date() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        assert_eq!(
            discordian_date(date(2024, 1, 1)),
            "Sweetmorn, the 1st day of Chaos in the YOLD 3190"
        );
        assert_eq!(
            discordian_date(date(2024, 1, 5)),
            "Setting Orange, the 5th day of Chaos in the YOLD 3190. Celebrate Mungday!"
        );
        assert_eq!(discordian_date(date(2024, 2, 29)), "St. Tib's Day in the YOLD 3190");
        assert_eq!(
            discordian_date(date(2024, 3, 1)),
            "Setting Orange, the 60th day of Chaos in the YOLD 3190"
        );
        assert_eq!(
            discordian_date(date(2023, 3, 15)),
            "Prickle-Prickle, the 1st day of Discord in the YOLD 3189"
        );
        assert_eq!(
            discordian_date(date(2023, 12, 31)),
            "Setting Orange, the 73rd day of The Aftermath in the YOLD 3189"
        );
    }

    #[test]
    fn test_clock_delta_across_boundaries() {
        let delta = Duration::days(2) + Duration::hours(3) + Duration::minutes(15) + Duration::seconds(20);
        assert_eq!(format_clock_delta(delta), "2 days, 03:15");

        assert_eq!(format_clock_delta(Duration::minutes(45)), "00:45");
        assert_eq!(
            format_clock_delta(Duration::days(1) + Duration::minutes(5) + Duration::seconds(7)),
            "1 day, 00:05:07"
        );
        assert_eq!(format_clock_delta(Duration::seconds(59)), "00:00:59");
    }
}
