//! Registration engine
//!
//! The RegistrationEngine is responsible for:
//! - Writing the leaf key with the rendered value
//! - Re-arming the TTL of the leaf and every directory below the keep root
//!   on each refresh tick
//! - Deleting the leaf key when a termination signal arrives
//!
//! ## State Machine
//!
//! ```text
//!  Initializing ──write──▶ Registered ──tick──▶ Refreshing
//!        │                  │    ▲                  │
//!        │                  │    └────all ok────────┤
//!        │               signal                     │
//!        │                  ▼                       │
//!        │            Deregistering                 │
//!        │                  │                       │
//!        │               delete                     │
//!        │                  ▼                       │
//!        │             Terminated                   │
//!        │                                          │
//!        └──────────── error ──▶ Failed ◀── error ──┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Initial write of the leaf (fatal on failure, no deregistration)
//! 2. Wait for whichever fires first: refresh tick or shutdown
//! 3. On tick, refresh every segment outer-to-inner; the first failure is fatal
//! 4. On shutdown, delete the leaf (failure is logged only) and return

use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::path::{Decomposition, decompose};
use crate::shutdown::ShutdownSignal;
use crate::traits::{KeyValueRegistry, SetOptions};
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

/// Capacity of the engine event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle state of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationState {
    /// Before the leaf has been written
    Initializing,
    /// Leaf written, waiting for the next tick or a signal
    Registered,
    /// Re-arming TTLs for the current tick
    Refreshing,
    /// Deleting the leaf after a signal
    Deregistering,
    /// Leaf deleted (or deletion attempted); the engine has stopped
    Terminated,
    /// A registry operation failed; the engine has stopped
    Failed,
}

impl RegistrationState {
    /// True once the engine has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Registered => "registered",
            Self::Refreshing => "refreshing",
            Self::Deregistering => "deregistering",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events emitted by the RegistrationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine moved to a new state
    StateChanged { state: RegistrationState },

    /// Leaf key written
    Registered { key: String, value: String },

    /// One segment's TTL re-armed
    SegmentRefreshed { path: String, is_dir: bool },

    /// Every segment of a tick re-armed
    TickCompleted { tick: u64, segments: usize },

    /// Leaf key deleted
    Deregistered { key: String },

    /// Leaf deletion failed (non-fatal)
    DeregistrationFailed { key: String, error: String },

    /// Fatal registry failure
    Failed { error: String },
}

/// Registration engine
///
/// Owns the registry client and the immutable registration settings. All
/// registry calls are made sequentially from the task that calls
/// [`RegistrationEngine::run`].
///
/// ## Lifecycle
///
/// 1. Create with [`RegistrationEngine::new()`]
/// 2. Start with [`RegistrationEngine::run()`] (OS signals) or
///    [`RegistrationEngine::run_with()`] (caller-supplied ticks and shutdown)
/// 3. `run` returns `Ok(())` after a graceful deregistration, or the fatal error
///
/// Every tick emits several events. A caller that keeps the event receiver
/// must drain it; one that does not care should drop it.
pub struct RegistrationEngine {
    /// Registry client
    registry: Box<dyn KeyValueRegistry>,

    /// Absolute leaf key
    key: String,

    /// Rendered value written to the leaf
    value: String,

    /// Configured keep root ("" means the key's parent)
    keep_root: String,

    /// Refresh interval
    interval: Duration,

    /// Attach the TTL on the initial write
    initial_ttl: bool,

    /// Retries per registry operation
    max_retries: usize,

    /// Delay between retries
    retry_delay: Duration,

    /// Current state
    state: watch::Sender<RegistrationState>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,

    /// Events lost to a full channel
    dropped_events: AtomicU64,
}

impl RegistrationEngine {
    /// Create a new registration engine
    ///
    /// # Parameters
    ///
    /// - `registry`: Key-value registry implementation
    /// - `config`: Registration configuration
    /// - `address`: The selected workload address, substituted into the value template
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        registry: Box<dyn KeyValueRegistry>,
        config: RegistrationConfig,
        address: IpAddr,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(RegistrationState::Initializing);

        let keep_root = config.keep_root_or_default().to_string();
        let plan = decompose(&config.key, &keep_root);
        if plan.fallback {
            warn!(
                "Keep root {} is not an ancestor of {}; managing TTLs from {} instead",
                keep_root, config.key, plan.keep_root
            );
        }

        let engine = Self {
            registry,
            value: config.render_value(address),
            key: config.key,
            keep_root,
            interval: config.interval,
            initial_ttl: config.initial_ttl,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            state,
            event_tx: tx,
            dropped_events: AtomicU64::new(0),
        };

        Ok((engine, rx))
    }

    /// The leaf key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value written to the leaf
    pub fn value(&self) -> &str {
        &self.value
    }

    /// TTL attached to every entry on refresh (twice the interval)
    pub fn ttl(&self) -> Duration {
        self.interval.saturating_mul(2)
    }

    /// Current state
    pub fn state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    /// Whether an event receiver is still attached
    pub fn has_event_listener(&self) -> bool {
        !self.event_tx.is_closed()
    }

    /// Number of events dropped because the receiver fell behind
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<RegistrationState> {
        self.state.subscribe()
    }

    /// Segments refreshed on each tick
    pub fn segments(&self) -> Decomposition {
        decompose(&self.key, &self.keep_root)
    }

    /// Run the engine until SIGINT/SIGTERM
    ///
    /// The first refresh happens right after registration, then every
    /// interval. Ticks that fall behind are delayed rather than bunched.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self, mut signal: ShutdownSignal) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.run_with(IntervalStream::new(interval), async move {
            let name = signal.recv().await;
            info!("Received shutdown signal: {}", name);
        })
        .await
    }

    /// Run the engine with caller-supplied tick and shutdown sources
    ///
    /// Each item of `ticks` triggers one refresh. `shutdown` completing
    /// triggers deregistration; it is checked before every tick but never
    /// interrupts a refresh already in progress. A tick stream that ends is
    /// treated like shutdown.
    pub async fn run_with<T, F>(&self, mut ticks: T, shutdown: F) -> Result<()>
    where
        T: Stream + Unpin,
        F: Future<Output = ()>,
    {
        if let Err(e) = self.register().await {
            return Err(self.fail(e));
        }

        tokio::pin!(shutdown);
        let mut tick = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                next = ticks.next() => match next {
                    Some(_) => {
                        tick += 1;
                        // Runs to completion even if shutdown fires meanwhile
                        if let Err(e) = self.refresh_tick(tick).await {
                            return Err(self.fail(e));
                        }
                    }
                    None => {
                        warn!("Refresh timer stopped");
                        break;
                    }
                },
            }
        }

        self.deregister().await;
        Ok(())
    }

    /// Write the leaf key with its value
    async fn register(&self) -> Result<()> {
        let options = if self.initial_ttl {
            SetOptions::default().with_ttl(self.ttl())
        } else {
            SetOptions::default()
        };

        info!(
            "Registering {} = {} via {}",
            self.key,
            self.value,
            self.registry.registry_name()
        );

        let node = self
            .with_retry("register", &self.key, || {
                self.registry.set(&self.key, &self.value, &options)
            })
            .await
            .map_err(|e| Error::write_failed(&self.key, e))?;
        debug!("Registry accepted {} (ttl: {:?})", node.key, node.ttl);

        self.emit_event(EngineEvent::Registered {
            key: self.key.clone(),
            value: self.value.clone(),
        });
        self.transition(RegistrationState::Registered);
        Ok(())
    }

    /// Re-arm the TTL of every segment, outer directories first
    async fn refresh_tick(&self, tick: u64) -> Result<()> {
        self.transition(RegistrationState::Refreshing);

        let ttl = self.ttl();
        let plan = decompose(&self.key, &self.keep_root);

        for segment in &plan.segments {
            debug!("Setting ttl for {} (dir: {})", segment.path, segment.is_dir);

            let options = SetOptions::refresh(ttl, segment.is_dir);
            self.with_retry("refresh", &segment.path, || {
                self.registry.set(&segment.path, "", &options)
            })
            .await
            .map_err(|e| Error::refresh_failed(&segment.path, e))?;

            self.emit_event(EngineEvent::SegmentRefreshed {
                path: segment.path.clone(),
                is_dir: segment.is_dir,
            });
        }

        debug!("Tick {}: refreshed {} segment(s)", tick, plan.segments.len());
        self.emit_event(EngineEvent::TickCompleted {
            tick,
            segments: plan.segments.len(),
        });
        self.transition(RegistrationState::Registered);
        Ok(())
    }

    /// Delete the leaf key; failures are logged, never returned
    ///
    /// Intermediate directories are left to expire on their own TTL.
    async fn deregister(&self) {
        self.transition(RegistrationState::Deregistering);

        match self.registry.delete(&self.key).await {
            Ok(()) => {
                info!("Deregistered {}", self.key);
                self.emit_event(EngineEvent::Deregistered {
                    key: self.key.clone(),
                });
            }
            Err(e) => {
                warn!("Failed to delete {} on shutdown: {}", self.key, e);
                self.emit_event(EngineEvent::DeregistrationFailed {
                    key: self.key.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.transition(RegistrationState::Terminated);
    }

    /// Run a registry operation, retrying up to `max_retries` times
    async fn with_retry<T, F, Fut>(&self, operation: &str, path: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} of {} failed (attempt {}/{}): {}",
                        operation,
                        path,
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record a fatal error and hand it back
    fn fail(&self, e: Error) -> Error {
        error!("Registration of {} failed: {}", self.key, e);
        self.emit_event(EngineEvent::Failed {
            error: e.to_string(),
        });
        self.transition(RegistrationState::Failed);
        e
    }

    fn transition(&self, state: RegistrationState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Registration state: {} -> {}", previous, state);
            self.emit_event(EngineEvent::StateChanged { state });
        }
    }

    /// Emit an engine event
    ///
    /// Events are dropped silently when nobody is listening. When the
    /// receiver falls behind they are dropped and counted; only the first
    /// drop is logged at warn level.
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 {
                    warn!("Event channel full, dropping events");
                } else {
                    debug!("Event channel full, {} events dropped so far", dropped);
                }
            }
        }
    }
}
