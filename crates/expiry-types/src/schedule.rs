//! Scheduled job definitions.
//!
//! A [`ScheduledJob`] is a plain description of "call this HTTP target on
//! this cron schedule". Scheduler backends translate it into whatever job
//! syntax their cron facility understands.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronParseError {
	#[error("Expected 5 fields in cron expression, found {0}")]
	FieldCount(usize),
	#[error("Invalid {field} field '{value}': {reason}")]
	InvalidField {
		field: &'static str,
		value: String,
		reason: String,
	},
}

/// One parsed field of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
	/// `*`
	Any,
	/// `*/n`
	Every(u32),
	/// Explicit values from numbers, lists and ranges.
	Values(BTreeSet<u32>),
}

impl CronField {
	fn parse(name: &'static str, raw: &str, min: u32, max: u32) -> Result<Self, CronParseError> {
		let invalid = |reason: String| CronParseError::InvalidField {
			field: name,
			value: raw.to_string(),
			reason,
		};
		let number = |s: &str| -> Result<u32, CronParseError> {
			let n: u32 = s
				.parse()
				.map_err(|_| invalid(format!("'{}' is not a number", s)))?;
			if n < min || n > max {
				return Err(invalid(format!("{} is outside {}-{}", n, min, max)));
			}
			Ok(n)
		};

		if raw == "*" {
			return Ok(CronField::Any);
		}
		if let Some(step) = raw.strip_prefix("*/") {
			let step: u32 = step
				.parse()
				.map_err(|_| invalid(format!("'{}' is not a step", step)))?;
			if step == 0 || step > max {
				return Err(invalid(format!("step {} is outside 1-{}", step, max)));
			}
			return Ok(CronField::Every(step));
		}

		let mut values = BTreeSet::new();
		for part in raw.split(',') {
			let (range, step) = match part.split_once('/') {
				Some((range, step)) => {
					let step: u32 = step
						.parse()
						.ok()
						.filter(|s| *s > 0)
						.ok_or_else(|| invalid(format!("'{}' is not a step", step)))?;
					(range, step)
				},
				None => (part, 1),
			};
			let (start, end) = match range.split_once('-') {
				Some((start, end)) => (number(start)?, number(end)?),
				None => {
					let n = number(range)?;
					(n, n)
				},
			};
			if start > end {
				return Err(invalid(format!("range {}-{} is reversed", start, end)));
			}
			values.extend((start..=end).step_by(step as usize));
		}
		Ok(CronField::Values(values))
	}

	fn matches(&self, value: u32, min: u32) -> bool {
		match self {
			CronField::Any => true,
			CronField::Every(step) => (value - min) % step == 0,
			CronField::Values(values) => values.contains(&value),
		}
	}

	fn single(&self) -> Option<u32> {
		match self {
			CronField::Values(values) if values.len() == 1 => values.iter().next().copied(),
			_ => None,
		}
	}
}

/// A validated five-field cron expression (minute hour day-of-month month day-of-week).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
	expression: String,
	minute: CronField,
	hour: CronField,
	day_of_month: CronField,
	month: CronField,
	day_of_week: CronField,
}

impl CronSchedule {
	/// The expression exactly as it was written.
	pub fn expression(&self) -> &str {
		&self.expression
	}

	/// Returns true if the schedule fires in the minute containing `at`.
	pub fn matches(&self, at: DateTime<Utc>) -> bool {
		self.minute.matches(at.minute(), 0)
			&& self.hour.matches(at.hour(), 0)
			&& self.day_of_month.matches(at.day(), 1)
			&& self.month.matches(at.month(), 1)
			&& self.day_of_week_matches(at.weekday().num_days_from_sunday())
	}

	fn day_of_week_matches(&self, dow: u32) -> bool {
		// 7 is an alias for Sunday
		self.day_of_week.matches(dow, 0) || (dow == 0 && self.day_of_week.matches(7, 0))
	}

	/// Next firing time strictly after `after`, searching at most one year ahead.
	pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
		(0..366 * 24 * 60)
			.map(|offset| start + Duration::minutes(offset))
			.find(|candidate| self.matches(*candidate))
	}

	/// Human readable description of the schedule.
	pub fn describe(&self) -> String {
		let daily = self.day_of_month == CronField::Any
			&& self.month == CronField::Any
			&& self.day_of_week == CronField::Any;

		if daily {
			match (&self.minute, &self.hour) {
				(CronField::Any, CronField::Any) => return "every minute".to_string(),
				(CronField::Every(n), CronField::Any) => {
					return format!("every {} minutes", n);
				},
				(minute, CronField::Any) if minute.single().is_some() => {
					return format!("every hour at minute {}", minute.single().unwrap_or(0));
				},
				(minute, CronField::Every(n)) if minute.single().is_some() => {
					return format!(
						"every {} hours at minute {}",
						n,
						minute.single().unwrap_or(0)
					);
				},
				(minute, hour) => {
					if let (Some(m), Some(h)) = (minute.single(), hour.single()) {
						return format!("every day at {:02}:{:02} UTC", h, m);
					}
				},
			}
		}
		format!("cron schedule '{}'", self.expression)
	}
}

impl FromStr for CronSchedule {
	type Err = CronParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let fields: Vec<&str> = s.split_whitespace().collect();
		if fields.len() != 5 {
			return Err(CronParseError::FieldCount(fields.len()));
		}
		Ok(Self {
			expression: fields.join(" "),
			minute: CronField::parse("minute", fields[0], 0, 59)?,
			hour: CronField::parse("hour", fields[1], 0, 23)?,
			day_of_month: CronField::parse("day-of-month", fields[2], 1, 31)?,
			month: CronField::parse("month", fields[3], 1, 12)?,
			day_of_week: CronField::parse("day-of-week", fields[4], 0, 7)?,
		})
	}
}

impl fmt::Display for CronSchedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.expression)
	}
}

/// HTTP methods a job target may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	Get,
	Post,
}

impl HttpMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
		}
	}
}

/// The HTTP call a scheduled job performs when it fires.
///
/// Headers are captured at registration time, so credentials embedded here
/// are only refreshed by registering the job again.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTarget {
	pub method: HttpMethod,
	pub url: String,
	/// Header name/value pairs in insertion order.
	pub headers: Vec<(String, String)>,
	pub body: serde_json::Value,
}

impl JobTarget {
	/// Builds an authenticated JSON POST target.
	pub fn post_json(url: impl Into<String>, bearer_token: &str, body: serde_json::Value) -> Self {
		Self {
			method: HttpMethod::Post,
			url: url.into(),
			headers: vec![
				("Content-Type".to_string(), "application/json".to_string()),
				(
					"Authorization".to_string(),
					format!("Bearer {}", bearer_token),
				),
			],
			body,
		}
	}

	/// Looks up a header value, ignoring ASCII case of the name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

impl fmt::Debug for JobTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Header values may carry bearer tokens
		let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
		f.debug_struct("JobTarget")
			.field("method", &self.method)
			.field("url", &self.url)
			.field("headers", &header_names)
			.field("body", &self.body)
			.finish()
	}
}

/// A named recurring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
	/// Unique job name. Registering the same name again replaces the job.
	pub name: String,
	/// Five-field cron expression.
	pub schedule: String,
	pub target: JobTarget,
}

impl ScheduledJob {
	pub fn new(name: impl Into<String>, schedule: impl Into<String>, target: JobTarget) -> Self {
		Self {
			name: name.into(),
			schedule: schedule.into(),
			target,
		}
	}

	/// Parses the cron expression of this job.
	pub fn cron(&self) -> Result<CronSchedule, CronParseError> {
		self.schedule.parse()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_hourly_schedule() {
		let cron: CronSchedule = "0 * * * *".parse().unwrap();
		assert_eq!(cron.describe(), "every hour at minute 0");

		let top = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
		let quarter = Utc.with_ymd_and_hms(2024, 5, 1, 13, 15, 0).unwrap();
		assert!(cron.matches(top));
		assert!(!cron.matches(quarter));

		let next = cron.next_after(quarter).unwrap();
		assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap());
		// Strictly after: a time exactly on the hour moves to the next hour
		assert_eq!(
			cron.next_after(top).unwrap(),
			Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap()
		);
	}

	#[test]
	fn test_descriptions() {
		let describe = |s: &str| s.parse::<CronSchedule>().unwrap().describe();

		assert_eq!(describe("* * * * *"), "every minute");
		assert_eq!(describe("*/15 * * * *"), "every 15 minutes");
		assert_eq!(describe("30 */6 * * *"), "every 6 hours at minute 30");
		assert_eq!(describe("5 3 * * *"), "every day at 03:05 UTC");
		assert_eq!(describe("0 9 * * 1-5"), "cron schedule '0 9 * * 1-5'");
	}

	#[test]
	fn test_lists_ranges_and_sunday_alias() {
		let cron: CronSchedule = "0,30 8-10 * * 7".parse().unwrap();
		// 2024-05-05 is a Sunday
		assert!(cron.matches(Utc.with_ymd_and_hms(2024, 5, 5, 9, 30, 0).unwrap()));
		assert!(!cron.matches(Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap()));
		assert!(!cron.matches(Utc.with_ymd_and_hms(2024, 5, 5, 11, 0, 0).unwrap()));
	}

	#[test]
	fn test_rejects_invalid_expressions() {
		assert_eq!(
			"0 * * *".parse::<CronSchedule>(),
			Err(CronParseError::FieldCount(4))
		);
		assert!(matches!(
			"60 * * * *".parse::<CronSchedule>(),
			Err(CronParseError::InvalidField { field: "minute", .. })
		));
		assert!("*/0 * * * *".parse::<CronSchedule>().is_err());
		assert!("0 5-2 * * *".parse::<CronSchedule>().is_err());
		assert!("0 * 0 * *".parse::<CronSchedule>().is_err());
		assert!("a * * * *".parse::<CronSchedule>().is_err());
	}

	#[test]
	fn test_expression_is_normalised() {
		let cron: CronSchedule = "  0   *  * * *".parse().unwrap();
		assert_eq!(cron.expression(), "0 * * * *");
		assert_eq!(cron.to_string(), "0 * * * *");
	}

	#[test]
	fn test_job_target_headers_and_debug() {
		let target = JobTarget::post_json(
			"https://example.test/functions/v1/expire-orders",
			"anon-token",
			serde_json::json!({ "scheduled": true }),
		);

		assert_eq!(target.header("authorization"), Some("Bearer anon-token"));
		assert_eq!(target.header("content-type"), Some("application/json"));

		let debug = format!("{:?}", target);
		assert!(debug.contains("Authorization"));
		assert!(!debug.contains("anon-token"));
	}
}
