//! Deterministic artifact naming.
//!
//! Names sort by capture time and carry microsecond resolution, so two
//! exports of the same table only collide if their timestamps are identical.

use chrono::{DateTime, Utc};

/// `%Y%m%d%H%M%S` followed by six fractional digits: 20 digits in total.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// Returns `<table>_<timestamp>.csv` for a timestamp captured once per request.
pub fn artifact_name(table: &str, captured_at: DateTime<Utc>) -> String {
    format!("{}_{}.csv", table, captured_at.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap() + Duration::microseconds(micros as i64)
    }

    #[test]
    fn test_name_layout() {
        assert_eq!(
            artifact_name("users", ts(42)),
            "users_20240309070502000042.csv"
        );
    }

    #[test]
    fn test_timestamp_is_fixed_width_digits() {
        for micros in [0, 1, 999_999] {
            let name = artifact_name("orders", ts(micros));
            let stamp = name
                .strip_prefix("orders_")
                .and_then(|s| s.strip_suffix(".csv"))
                .unwrap();
            assert_eq!(stamp.len(), 20, "{}", name);
            assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_one_microsecond_apart_is_unique() {
        let a = artifact_name("users", ts(10));
        let b = artifact_name("users", ts(11));
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_sub_microsecond_is_truncated() {
        let base = ts(7);
        let later = base + Duration::nanoseconds(400);
        assert_eq!(artifact_name("t", base), artifact_name("t", later));
    }
}
