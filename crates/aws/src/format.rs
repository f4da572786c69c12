use aws_smithy_types::DateTime as SmithyDateTime;
use chrono::{DateTime, SecondsFormat, Utc};

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Render a byte count with binary prefixes. Sub-kilobyte values carry no
/// decimals ("512 B"); everything above gets two ("1.50 KB").
pub fn human_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else if bytes < TIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else {
        format!("{:.2} TB", bytes as f64 / TIB as f64)
    }
}

pub fn to_chrono(ts: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

/// Normalize a provider timestamp to one textual representation (RFC 3339,
/// UTC, second precision).
pub fn iso8601(ts: &SmithyDateTime) -> String {
    to_chrono(ts)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts.to_string())
}

/// Whole elapsed days between a timestamp and `now`, floored. A timestamp
/// outside chrono's representable range counts as zero days old.
pub fn age_days(ts: &SmithyDateTime, now: DateTime<Utc>) -> i64 {
    match to_chrono(ts) {
        Some(then) => (now - then).num_days(),
        None => 0,
    }
}

/// Final path segment of an ARN ("…/task-def:3" → "task-def:3"). Values
/// without a slash pass through unchanged.
pub fn arn_tail(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_SECS: i64 = 86_400;

    #[test]
    fn human_size_branches() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(human_size(1_073_741_824), "1.00 GB");
        assert_eq!(human_size(2 * 1024 * 1024 * 1024 * 1024), "2.00 TB");
    }

    #[test]
    fn iso8601_is_utc_second_precision() {
        let ts = SmithyDateTime::from_secs(1_700_000_000);
        assert_eq!(iso8601(&ts), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn arn_tail_takes_the_final_segment() {
        assert_eq!(
            arn_tail("arn:aws:ecs:us-east-1:123:task-definition/web:42"),
            "web:42"
        );
        assert_eq!(arn_tail("plain-name"), "plain-name");
    }

    #[test]
    fn age_is_floored_to_whole_days() {
        let created = SmithyDateTime::from_secs(0);

        let almost_91 = DateTime::from_timestamp(91 * DAY_SECS - 1, 0).unwrap();
        assert_eq!(age_days(&created, almost_91), 90);

        let exactly_91 = DateTime::from_timestamp(91 * DAY_SECS, 0).unwrap();
        assert_eq!(age_days(&created, exactly_91), 91);
    }
}
