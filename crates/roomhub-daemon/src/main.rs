//! Hub daemon entry point.
//!
//! Wires together the input reader, event pipeline, activity dispatcher,
//! config reloaders, and the text command router, then runs until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load hub.toml / hid_keymap.toml / activities.toml / remote.toml
//!  └─ input::run()          -- evdev read + reconnect loop → pipeline
//!  └─ run_consumer()        -- pipeline + control lane → Dispatcher
//!  └─ Reloader::run() ×2    -- hot reload of keymaps and activities
//!  └─ stdin line loop       -- text commands (atv:on, atv:off, sys:restart)
//! ```
//!
//! Startup misconfiguration (missing files, bad TOML, absent `room`) exits
//! with status 2 so the service manager reports a config failure rather than
//! crash-looping.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomhub_daemon::application::commands::CommandRouter;
use roomhub_daemon::application::dispatch::Dispatcher;
use roomhub_daemon::application::hid_output::HidOutput;
use roomhub_daemon::application::pipeline::{self, EventPipeline};
use roomhub_daemon::application::ControlMsg;
use roomhub_daemon::infrastructure::config::{
    self,
    reload::Reloader,
};
use roomhub_daemon::infrastructure::sinks::{
    LoggingGestureSink, LoggingHidTransport, LoggingServiceSink,
};

const CONFIG_EXIT_CODE: i32 = 2;

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/roomhub"))
}

macro_rules! load_or_exit {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => {
                eprintln!("roomhubd: {e}");
                std::process::exit(CONFIG_EXIT_CODE);
            }
        }
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = config_dir();
    let hub_path = dir.join("hub.toml");
    let keymap_path = dir.join("hid_keymap.toml");
    let activities_path = dir.join("activities.toml");
    let remote_path = dir.join("remote.toml");

    let hub = load_or_exit!(config::load_hub_config(&hub_path));
    let room = load_or_exit!(hub.room(&hub_path)).to_string();
    let keymaps = Arc::new(load_or_exit!(config::load_keymaps(&keymap_path)));
    let activities = Arc::new(load_or_exit!(config::load_activities(&activities_path)));
    let remote = load_or_exit!(config::load_remote_config(&remote_path));

    // Initialise structured logging. RUST_LOG wins over the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(hub.log_level.clone())),
        )
        .init();

    info!(room = %room, device_name = %hub.device_name, "roomhub daemon starting");
    if !hub.ble.enabled {
        warn!("BLE HID disabled in config; reports go to the log only");
    }

    // ── Shared plumbing ───────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    let (control_tx, control_rx) = mpsc::unbounded_channel::<ControlMsg>();
    let event_pipeline = Arc::new(EventPipeline::new(pipeline::DEFAULT_CAPACITY));

    let hid = Arc::new(Mutex::new(HidOutput::new(Arc::new(LoggingHidTransport))));
    let services = Arc::new(LoggingServiceSink::new(room.clone()));

    let dispatcher = Dispatcher::new(
        Arc::clone(&hid),
        services,
        Arc::clone(&keymaps),
        Arc::clone(&activities),
        control_tx.clone(),
    )
    .with_gesture_sink(Arc::new(LoggingGestureSink));

    // ── Config reloaders ──────────────────────────────────────────────────────
    let keymap_reloader = Reloader::new(
        keymap_path,
        keymaps,
        Box::new(|p| config::load_keymaps(p)),
        Box::new({
            let tx = control_tx.clone();
            move |maps| {
                let _ = tx.send(ControlMsg::Keymaps(maps));
            }
        }),
    );
    let activities_reloader = Reloader::new(
        activities_path,
        activities,
        Box::new(|p| config::load_activities(p)),
        Box::new({
            let tx = control_tx.clone();
            move |table| {
                let _ = tx.send(ControlMsg::Activities(table));
            }
        }),
    );
    tokio::spawn(keymap_reloader.run(stop_rx.clone()));
    tokio::spawn(activities_reloader.run(stop_rx.clone()));

    // ── Input reader ──────────────────────────────────────────────────────────
    #[cfg(target_os = "linux")]
    let reader = {
        use roomhub_daemon::infrastructure::input::{self, ConnectionHooks};

        let push = {
            let pipeline = Arc::clone(&event_pipeline);
            move |button: String, edge| pipeline.push(button, edge)
        };
        tokio::spawn(input::run(
            remote.device.path.clone(),
            remote.device.grab,
            remote.mapping.clone(),
            push,
            stop_rx.clone(),
            ConnectionHooks::default(),
        ))
    };
    #[cfg(not(target_os = "linux"))]
    let reader = {
        let _ = &remote;
        warn!("input capture requires Linux evdev; running without a remote");
        tokio::spawn(async {})
    };

    // ── Text command loop ─────────────────────────────────────────────────────
    let router = CommandRouter::new(Arc::clone(&hid), hub.service_unit.clone(), control_tx.clone());
    tokio::spawn({
        let mut stop = stop_rx.clone();
        async move {
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) if !line.trim().is_empty() => {
                            router.handle_text_command(line.trim());
                        }
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => break,
                    },
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    tokio::spawn({
        let stop_tx = stop_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = stop_tx.send(true);
            }
        }
    });

    // ── Dispatch loop ─────────────────────────────────────────────────────────
    info!("roomhub daemon ready");
    pipeline::run_consumer(event_pipeline, control_rx, dispatcher, stop_rx).await;

    reader.await.ok();
    info!("roomhub daemon stopped");
    Ok(())
}
