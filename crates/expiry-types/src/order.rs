//! Order types for the expiration subsystem.
//!
//! Orders are owned by the external data store and created by the order
//! posting flows. This subsystem only ever flips `is_expired` from false to
//! true on orders whose deadline has passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A marketplace order as stored in the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Set once the deadline has passed. Never cleared by this subsystem.
	#[serde(default)]
	pub is_expired: bool,
	/// Point in time after which an open order expires.
	/// Orders without a deadline never expire.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deadline: Option<DateTime<Utc>>,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
	/// Timestamp when this order was last updated.
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Creates a new active order with the given deadline.
	pub fn new(id: impl Into<String>, deadline: Option<DateTime<Utc>>) -> Self {
		let now = Utc::now();
		Self {
			id: id.into(),
			status: OrderStatus::Active,
			is_expired: false,
			deadline,
			created_at: now,
			updated_at: now,
		}
	}

	/// Sets the status, returning the modified order.
	pub fn with_status(mut self, status: OrderStatus) -> Self {
		self.status = status;
		self
	}

	/// Returns true if this order matches the expiration predicate at `now`.
	///
	/// An order is due when it is not yet expired, its status is open, and its
	/// deadline lies strictly before `now`.
	pub fn is_due(&self, now: DateTime<Utc>) -> bool {
		!self.is_expired
			&& self.status.is_open()
			&& self.deadline.is_some_and(|deadline| deadline < now)
	}

	/// Marks this order expired if it is due, returning whether it changed.
	pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
		if !self.is_due(now) {
			return false;
		}
		self.is_expired = true;
		self.updated_at = now;
		true
	}
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Posted and accepting bids.
	Active,
	/// A bid was accepted and work is under way.
	InProgress,
	/// Finished. Terminal.
	Completed,
	/// Withdrawn by its author. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// Returns true for statuses the expiration predicate applies to.
	pub fn is_open(&self) -> bool {
		matches!(self, OrderStatus::Active | OrderStatus::InProgress)
	}

	/// Returns the wire representation used by the data store.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Active => "active",
			OrderStatus::InProgress => "in_progress",
			OrderStatus::Completed => "completed",
			OrderStatus::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Projection of an order used for statistics: `{status, is_expired}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatsRow {
	/// Raw status string as returned by the data store.
	pub status: String,
	#[serde(default)]
	pub is_expired: bool,
}

/// Counts of non-completed orders, split by the expired flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
	/// Every order whose status is not `completed`.
	pub total: u64,
	/// Non-completed orders that are not expired.
	pub active: u64,
	/// Non-completed orders that are expired.
	pub expired: u64,
}

impl OrderStats {
	/// Tallies `(status, is_expired)` pairs, skipping completed orders.
	pub fn tally<'a, I>(rows: I) -> Self
	where
		I: IntoIterator<Item = (&'a str, bool)>,
	{
		rows.into_iter()
			.filter(|(status, _)| *status != OrderStatus::Completed.as_str())
			.fold(Self::default(), |mut stats, (_, is_expired)| {
				stats.total += 1;
				if is_expired {
					stats.expired += 1;
				} else {
					stats.active += 1;
				}
				stats
			})
	}

	/// Tallies full order records.
	pub fn from_orders<'a, I>(orders: I) -> Self
	where
		I: IntoIterator<Item = &'a Order>,
	{
		Self::tally(
			orders
				.into_iter()
				.map(|order| (order.status.as_str(), order.is_expired)),
		)
	}
}

impl fmt::Display for OrderStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"total={} active={} expired={}",
			self.total, self.active, self.expired
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn test_past_deadline_open_order_is_due() {
		let now = Utc::now();
		let order = Order::new("o-1", Some(now - Duration::hours(1)));
		assert!(order.is_due(now));

		let in_progress = order.clone().with_status(OrderStatus::InProgress);
		assert!(in_progress.is_due(now));
	}

	#[test]
	fn test_terminal_or_future_orders_are_not_due() {
		let now = Utc::now();
		let past = Some(now - Duration::minutes(5));

		assert!(!Order::new("a", past)
			.with_status(OrderStatus::Completed)
			.is_due(now));
		assert!(!Order::new("b", past)
			.with_status(OrderStatus::Cancelled)
			.is_due(now));
		assert!(!Order::new("c", Some(now + Duration::minutes(5))).is_due(now));
		assert!(!Order::new("d", None).is_due(now));
		// Deadline exactly at `now` has not elapsed yet
		assert!(!Order::new("e", Some(now)).is_due(now));
	}

	#[test]
	fn test_expire_if_due_is_one_way() {
		let now = Utc::now();
		let mut order = Order::new("o-1", Some(now - Duration::hours(2)));

		assert!(order.expire_if_due(now));
		assert!(order.is_expired);
		assert_eq!(order.updated_at, now);

		let later = now + Duration::minutes(1);
		assert!(!order.expire_if_due(later));
		assert!(order.is_expired);
		assert_eq!(order.updated_at, now);
	}

	#[test]
	fn test_status_wire_format() {
		let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
		assert_eq!(json, "\"in_progress\"");

		let status: OrderStatus = serde_json::from_str("\"completed\"").unwrap();
		assert_eq!(status, OrderStatus::Completed);
	}

	#[test]
	fn test_order_defaults_missing_flag_to_not_expired() {
		let order: Order = serde_json::from_value(serde_json::json!({
			"id": "o-9",
			"status": "active",
			"created_at": "2024-01-01T00:00:00Z",
			"updated_at": "2024-01-01T00:00:00Z"
		}))
		.unwrap();

		assert!(!order.is_expired);
		assert!(order.deadline.is_none());
	}

	#[test]
	fn test_tally_skips_completed() {
		let stats = OrderStats::tally([
			("active", false),
			("active", true),
			("in_progress", true),
			("completed", false),
			("completed", true),
			("cancelled", false),
		]);

		assert_eq!(
			stats,
			OrderStats {
				total: 4,
				active: 2,
				expired: 2,
			}
		);
		assert_eq!(stats.to_string(), "total=4 active=2 expired=2");
	}
}
