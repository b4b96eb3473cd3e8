//! Formatting helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp as RFC 3339 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time, formatted with [`format_timestamp`].
pub fn now_timestamp() -> String {
	format_timestamp(Utc::now())
}

/// Shortens an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_format_timestamp() {
		let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 0).unwrap();
		assert_eq!(format_timestamp(at), "2024-03-09T07:05:00.000Z");
	}

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("short"), "short");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(
			truncate_id("0f5c2a9e-4b1d-4c59-9a55-3d2f1e0b7c11"),
			"0f5c2a9e.."
		);
	}
}
