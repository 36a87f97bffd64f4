use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events buffered per subscriber before the slowest one starts lagging
const HUB_CAPACITY: usize = 256;

/// How long `rdev::listen` gets to report a startup failure
const LISTENER_STARTUP_GRACE: Duration = Duration::from_millis(500);

static GLOBAL_HUB: OnceLock<KeyHub> = OnceLock::new();
static GLOBAL_LISTENER: OnceLock<Result<(), String>> = OnceLock::new();

/// Direction of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Key pressed (auto-repeat included)
    Down,
    /// Key released
    Up,
}

/// A single key-down or key-up with its normalized name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Press or release
    pub action: KeyAction,
    /// Lowercase key name, see [`key_name`]
    pub key: String,
}

impl KeyEvent {
    /// Key-down event
    pub fn down(key: impl Into<String>) -> Self {
        Self {
            action: KeyAction::Down,
            key: key.into(),
        }
    }

    /// Key-up event
    pub fn up(key: impl Into<String>) -> Self {
        Self {
            action: KeyAction::Up,
            key: key.into(),
        }
    }
}

/// Normalized name for an `rdev` key
///
/// Left/right modifiers collapse to one name (`ctrl`, `alt`, `shift`,
/// `meta`); letters and digits map to themselves; everything else is its
/// lowercase variant name.
#[must_use]
pub fn key_name(key: rdev::Key) -> String {
    use rdev::Key;

    let name = match key {
        Key::ControlLeft | Key::ControlRight => "ctrl",
        Key::Alt | Key::AltGr => "alt",
        Key::ShiftLeft | Key::ShiftRight => "shift",
        Key::MetaLeft | Key::MetaRight => "meta",
        Key::Return | Key::KpReturn => "enter",
        Key::Escape => "escape",
        Key::Space => "space",
        Key::Tab => "tab",
        Key::CapsLock => "capslock",
        Key::Backspace => "backspace",
        other => {
            let debug_name = format!("{other:?}");
            let short = debug_name
                .strip_prefix("Key")
                .or_else(|| debug_name.strip_prefix("Num"))
                .filter(|rest| rest.chars().count() == 1);
            return short.unwrap_or(&debug_name).to_lowercase();
        }
    };
    name.to_owned()
}

/// Process-wide fan-out of key events
///
/// Each controller holds its own [`KeySubscription`]; the hub itself never
/// filters events.
pub struct KeyHub {
    sender: broadcast::Sender<KeyEvent>,
    subscribers: Arc<AtomicUsize>,
}

impl KeyHub {
    /// Hub with no OS listener attached (events come from [`Self::publish`])
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            sender,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The hub fed by the global OS key listener
    ///
    /// The listener thread is started on first call and lives until process
    /// exit.
    ///
    /// # Errors
    /// Returns error if the OS refused global key capture
    pub fn global() -> Result<&'static Self> {
        let hub = GLOBAL_HUB.get_or_init(Self::new);
        GLOBAL_LISTENER
            .get_or_init(|| spawn_listener(hub.sender.clone()))
            .clone()
            .map_err(|e| anyhow!("failed to capture global key events: {e}"))?;
        Ok(hub)
    }

    /// Delivers an event to every live subscription
    pub fn publish(&self, event: KeyEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Installs a new subscription, released when dropped
    #[must_use]
    pub fn subscribe(&self) -> KeySubscription {
        let active = self.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(active, "key subscription installed");
        KeySubscription {
            receiver: self.sender.subscribe(),
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }
}

impl Default for KeyHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped receiver of key events
pub struct KeySubscription {
    receiver: broadcast::Receiver<KeyEvent>,
    subscribers: Arc<AtomicUsize>,
}

impl KeySubscription {
    /// Next event, or `None` once the hub is gone
    ///
    /// Events dropped because this subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<KeyEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "key subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for KeySubscription {
    fn drop(&mut self) {
        let remaining = self
            .subscribers
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        debug!(remaining, "key subscription released");
    }
}

fn spawn_listener(sender: broadcast::Sender<KeyEvent>) -> Result<(), String> {
    let (startup_tx, startup_rx) = mpsc::channel::<String>();

    thread::Builder::new()
        .name("key-listener".to_owned())
        .spawn(move || {
            let callback = move |event: rdev::Event| {
                let key_event = match event.event_type {
                    rdev::EventType::KeyPress(key) => KeyEvent::down(key_name(key)),
                    rdev::EventType::KeyRelease(key) => KeyEvent::up(key_name(key)),
                    _ => return,
                };
                let _ = sender.send(key_event);
            };

            // Blocks for the life of the process on success
            if let Err(e) = rdev::listen(callback) {
                let _ = startup_tx.send(format!("{e:?}"));
            }
        })
        .map_err(|e| e.to_string())?;

    match startup_rx.recv_timeout(LISTENER_STARTUP_GRACE) {
        Ok(error) => Err(error),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            info!("global key listener running");
            Ok(())
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err("key listener thread terminated unexpectedly".to_owned())
        }
    }
}
