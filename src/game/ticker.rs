//! Layered periodic callback scheduler driving a running match

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

type TickCallback = Box<dyn Fn() + Send + Sync>;

/// Callbacks grouped by layer; BTreeMap iteration yields layers in ascending order
type Layers = BTreeMap<u8, Vec<TickCallback>>;

/// Invokes registered callbacks every tick, layer by layer.
///
/// Tick execution, registration and [`Ticker::reset`] share one lock. The
/// clock only runs between [`Ticker::start`] and the next reset or stop, so
/// callbacks registered before `start` are all in place for the first tick.
pub struct Ticker {
    period: Option<Duration>,
    layers: Arc<Mutex<Layers>>,
    /// Bumped on every reset/stop; a tick loop exits once it sees a newer epoch
    epoch: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    /// Ticker driven by a tokio interval of the given period
    pub fn new(period: Duration) -> Self {
        Self {
            period: Some(period),
            layers: Arc::new(Mutex::new(BTreeMap::new())),
            epoch: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Ticker without a clock, advanced only through [`Ticker::tick`]
    pub fn manual() -> Self {
        Self {
            period: None,
            layers: Arc::new(Mutex::new(BTreeMap::new())),
            epoch: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Register a callback; callbacks of one layer run in registration order
    pub fn on_tick<F>(&self, layer: u8, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.layers
            .lock()
            .entry(layer)
            .or_default()
            .push(Box::new(callback));
    }

    /// Run one tick synchronously on the caller's thread
    pub fn tick(&self) {
        run_layers(&self.layers.lock());
    }

    /// Halt the tick clock and drop every registered callback.
    ///
    /// Returns only after any in-flight tick has finished.
    pub fn reset(&self) {
        let mut layers = self.layers.lock();
        layers.clear();

        let epoch = self.halt();
        debug!(epoch, "Ticker reset");
    }

    /// Start (or restart) the tick clock over the registered callbacks
    pub fn start(&self) {
        let epoch = self.halt();
        self.spawn_loop(epoch);
    }

    /// Halt ticking; registered callbacks are kept until the next reset
    pub fn stop(&self) {
        self.halt();
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    fn halt(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        epoch
    }

    fn spawn_loop(&self, epoch: u64) {
        let Some(period) = self.period else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime available, ticker will not advance");
                return;
            }
        };

        let layers = self.layers.clone();
        let current_epoch = self.epoch.clone();

        let task = runtime.spawn(async move {
            let mut clock = interval(period);
            // A slow tick pushes the next one back instead of bursting to catch up
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            clock.tick().await;

            loop {
                clock.tick().await;

                {
                    let registered = layers.lock();
                    if current_epoch.load(Ordering::Acquire) != epoch {
                        break;
                    }
                    run_layers(&registered);
                }
            }
        });

        *self.task.lock() = Some(task);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run_layers(layers: &Layers) {
    for callbacks in layers.values() {
        for callback in callbacks {
            callback();
        }
    }
}
