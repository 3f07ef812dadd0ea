//! Integration tests for the host runtime
//!
//! Full lifecycle: manifests on disk, static plugin activation, per-tick
//! updates, message flow into plugin hooks, and reverse-order teardown.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use kiln_message::{current_dispatcher, Message};
use kiln_plugin::{Plugin, PluginHost, StaticPluginRegistration};
use kiln_runtime::Host;

fn write_manifest(root: &Path, id: &str, entry_point: &str, deps: &[&str]) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).unwrap();
    let deps = deps
        .iter()
        .map(|dep| format!("\"{}\"", dep))
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(
        dir.join("plugin.toml"),
        format!(
            r#"
            [plugin]
            id = "{id}"
            version = "0.1.0"
            entry_point = "{entry_point}"
            dependencies = [{deps}]
        "#
        ),
    )
    .unwrap();
}

// ========== Lifecycle ==========

static LIFECYCLE_TICKS: AtomicU32 = AtomicU32::new(0);
static LIFECYCLE_DETACHES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct LifecyclePlugin {
    name: &'static str,
}

impl Plugin for LifecyclePlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn on_update(&mut self, _delta_time: f32) {
        LIFECYCLE_TICKS.fetch_add(1, Ordering::SeqCst);
    }

    fn on_detach(&mut self) {
        LIFECYCLE_DETACHES.lock().push(self.name);
    }
}

#[test]
fn test_lifecycle_updates_and_reverse_teardown() {
    let _ = env_logger::builder().is_test(true).try_init();
    let _a = StaticPluginRegistration::new("life_a", || {
        Box::new(LifecyclePlugin { name: "life_a" })
    });
    let _b = StaticPluginRegistration::new("life_b", || {
        Box::new(LifecyclePlugin { name: "life_b" })
    });

    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "life-b", "life_b", &["life-a"]);
    write_manifest(dir.path(), "life-a", "life_a", &[]);

    let mut host = Host::new();
    let activated = host.load_plugins(dir.path(), &[]).unwrap();
    assert_eq!(activated, 2);
    assert_eq!(host.active_count(), 2);

    host.tick(0.016);
    host.tick(0.016);
    assert_eq!(LIFECYCLE_TICKS.load(Ordering::SeqCst), 4);

    host.shutdown();
    // Dependent detaches before its dependency
    assert_eq!(*LIFECYCLE_DETACHES.lock(), vec!["life_b", "life_a"]);
    assert_eq!(host.dispatcher().handler_count(), 0);
    assert!(host.registry().is_empty());
}

// ========== Message flow ==========

struct DamageEvent {
    amount: u32,
}

struct RespawnCommand;

static DAMAGE_SEEN: AtomicU32 = AtomicU32::new(0);

struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn name(&self) -> &str {
        "combat"
    }

    fn on_message(&mut self, message: &mut Message) {
        if let Some(damage) = message.payload_ref::<DamageEvent>() {
            DAMAGE_SEEN.fetch_add(damage.amount, Ordering::SeqCst);
        }
        if message.payload_is::<RespawnCommand>() {
            message.mark_handled();
        }
    }
}

#[test]
fn test_messages_reach_plugin_hooks() {
    let _combat = StaticPluginRegistration::new("combat", || Box::new(CombatPlugin));

    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "combat", "combat", &[]);

    let mut host = Host::new();
    host.load_plugins(dir.path(), &[]).unwrap();

    // Deferred event: delivered on the next tick
    host.dispatcher().post(Message::event(DamageEvent { amount: 7 }));
    assert_eq!(DAMAGE_SEEN.load(Ordering::SeqCst), 0);
    host.tick(0.016);
    assert_eq!(DAMAGE_SEEN.load(Ordering::SeqCst), 7);

    // Synchronous command: claimed by the plugin
    let mut command = Message::command(RespawnCommand);
    let result = host.dispatcher().send(&mut command);
    assert!(result.succeeded());
}

// ========== Dispatcher context ==========

struct HeartbeatEvent;

static HEARTBEATS: AtomicU32 = AtomicU32::new(0);

struct HeartbeatPlugin;

impl Plugin for HeartbeatPlugin {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn on_update(&mut self, _delta_time: f32) {
        // Reaches the host's coordinator through the thread-local context
        if let Some(dispatcher) = current_dispatcher() {
            dispatcher.post(Message::event(HeartbeatEvent));
        }
    }

    fn on_message(&mut self, message: &mut Message) {
        if message.payload_is::<HeartbeatEvent>() {
            HEARTBEATS.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_update_posts_through_dispatcher_context() {
    let _heartbeat = StaticPluginRegistration::new("heartbeat", || Box::new(HeartbeatPlugin));

    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "heartbeat", "heartbeat", &[]);

    let mut host = Host::new();
    host.load_plugins(dir.path(), &[]).unwrap();

    // The update posts, the same tick's drain delivers
    host.tick(0.016);
    assert_eq!(HEARTBEATS.load(Ordering::SeqCst), 1);
    host.tick(0.016);
    assert_eq!(HEARTBEATS.load(Ordering::SeqCst), 2);

    // The context does not leak out of the tick
    assert!(current_dispatcher().is_none());
}

// ========== Failure reporting ==========

#[test]
fn test_failed_plugin_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "ghost", "ghost_entry_never_registered", &[]);

    let mut host = Host::new();
    let activated = host.load_plugins(dir.path(), &[]).unwrap();

    assert_eq!(activated, 0);
    assert_eq!(host.active_count(), 0);
    let failed: Vec<_> = host.failed_plugins().iter().map(|m| m.id.clone()).collect();
    assert_eq!(failed, vec!["ghost"]);

    // A dead plugin never joins the handler chain
    assert_eq!(host.dispatcher().handler_count(), 0);
}

// ========== Registry lookup ==========

struct NamedPlugin;

impl Plugin for NamedPlugin {
    fn name(&self) -> &str {
        "audio-backend"
    }

    fn on_attach(&mut self, host: &PluginHost) {
        // The registry is reachable from inside hooks as well
        assert!(host.registry().find_plugin("audio-backend").is_none());
    }
}

#[test]
fn test_find_plugin_after_activation() {
    let _named = StaticPluginRegistration::new("named", || Box::new(NamedPlugin));

    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), "named", "named", &[]);

    let mut host = Host::new();
    host.load_plugins(dir.path(), &[]).unwrap();

    let found = host.find_plugin("Audio-Backend").unwrap();
    assert_eq!(found.lock().name(), "audio-backend");

    host.shutdown();
    assert!(host.find_plugin("audio-backend").is_none());
}
