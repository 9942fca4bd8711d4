use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback invoked with the clock's id each day at its trigger time.
pub type ClockCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct ClockEntry {
	trigger_time: NaiveTime,
	callback: ClockCallback,
	handle: JoinHandle<()>,
}

/// Named daily triggers that fire at a local time-of-day.
///
/// After firing, a clock re-arms itself for the same time on the next day.
/// If the target time has already passed when the clock starts, the first
/// fire is the next day.
#[derive(Clone, Default)]
pub struct ClockService {
	clocks: Arc<Mutex<HashMap<String, ClockEntry>>>,
}

/// How long until `target` next comes around, strictly after `now`.
pub fn until_next_occurrence(now: NaiveDateTime, target: NaiveTime) -> Duration {
	let mut next = now.date().and_time(target);
	if next <= now {
		next += chrono::Duration::days(1);
	}
	(next - now).to_std().unwrap_or(Duration::ZERO)
}

impl ClockService {
	pub fn new() -> Self {
		Self::default()
	}

	/// Arm a daily trigger, replacing any existing clock with this id.
	pub async fn start(&self, id: &str, trigger_time: NaiveTime, callback: ClockCallback) {
		let mut clocks = self.clocks.lock().await;
		if let Some(existing) = clocks.remove(id) {
			existing.handle.abort();
			debug!(clock = id, "replacing existing clock");
		}
		let handle = Self::spawn_clock(id.to_string(), trigger_time, callback.clone());
		clocks.insert(
			id.to_string(),
			ClockEntry {
				trigger_time,
				callback,
				handle,
			},
		);
	}

	/// Cancel a clock. Returns whether it existed.
	pub async fn cancel(&self, id: &str) -> bool {
		match self.clocks.lock().await.remove(id) {
			Some(entry) => {
				entry.handle.abort();
				true
			}
			None => false,
		}
	}

	/// Re-arm a clock from scratch with its stored time and callback.
	pub async fn reset(&self, id: &str) -> bool {
		let mut clocks = self.clocks.lock().await;
		let Some(entry) = clocks.remove(id) else {
			return false;
		};
		entry.handle.abort();
		let handle = Self::spawn_clock(id.to_string(), entry.trigger_time, entry.callback.clone());
		clocks.insert(
			id.to_string(),
			ClockEntry {
				trigger_time: entry.trigger_time,
				callback: entry.callback,
				handle,
			},
		);
		true
	}

	pub async fn len(&self) -> usize {
		self.clocks.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.clocks.lock().await.is_empty()
	}

	fn spawn_clock(id: String, trigger_time: NaiveTime, callback: ClockCallback) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				let wait = until_next_occurrence(Local::now().naive_local(), trigger_time);
				tokio::time::sleep(wait).await;
				callback(id.clone()).await;
			}
		})
	}
}
