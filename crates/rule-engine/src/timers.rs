use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback invoked with the timer's id when it expires.
pub type TimerCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct TimerEntry {
	duration: Duration,
	callback: TimerCallback,
	handle: JoinHandle<()>,
}

/// Named one-shot timers with cancel and reset.
///
/// Each timer owns a spawned task. On expiry the entry is removed before the
/// callback is dispatched, so a timer cannot fire twice and cancelling after
/// the fire is a no-op.
#[derive(Clone, Default)]
pub struct TimerService {
	timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
}

impl TimerService {
	pub fn new() -> Self {
		Self::default()
	}

	/// Schedule `callback(id)` to run after `duration`.
	///
	/// If a timer with this id already exists it is cancelled first.
	pub async fn start(&self, id: &str, duration: Duration, callback: TimerCallback) {
		let mut timers = self.timers.lock().await;
		if let Some(existing) = timers.remove(id) {
			existing.handle.abort();
			debug!(timer = id, "replacing existing timer");
		}
		let handle = Self::spawn_timer(Arc::clone(&self.timers), id.to_string(), duration, callback.clone());
		timers.insert(id.to_string(), TimerEntry { duration, callback, handle });
	}

	/// Cancel a timer. Returns whether it existed.
	pub async fn cancel(&self, id: &str) -> bool {
		match self.timers.lock().await.remove(id) {
			Some(entry) => {
				entry.handle.abort();
				true
			}
			None => false,
		}
	}

	/// Restart a timer with its stored duration and callback.
	///
	/// Returns whether it existed.
	pub async fn reset(&self, id: &str) -> bool {
		let mut timers = self.timers.lock().await;
		let Some(entry) = timers.remove(id) else {
			return false;
		};
		entry.handle.abort();
		let handle = Self::spawn_timer(Arc::clone(&self.timers), id.to_string(), entry.duration, entry.callback.clone());
		timers.insert(
			id.to_string(),
			TimerEntry {
				duration: entry.duration,
				callback: entry.callback,
				handle,
			},
		);
		true
	}

	pub async fn len(&self) -> usize {
		self.timers.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.timers.lock().await.is_empty()
	}

	fn spawn_timer(timers: Arc<Mutex<HashMap<String, TimerEntry>>>, id: String, duration: Duration, callback: TimerCallback) -> JoinHandle<()> {
		tokio::spawn(async move {
			tokio::time::sleep(duration).await;
			// The entry comes out of the map before dispatch; a cancel that
			// loses this race finds nothing and reports false.
			let fired = timers.lock().await.remove(&id).is_some();
			if fired {
				callback(id).await;
			}
		})
	}
}
