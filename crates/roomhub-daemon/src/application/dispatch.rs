//! Activity-scoped action dispatcher.
//!
//! The dispatcher owns the current activity, the activity/keymap snapshots,
//! and the per-button held/timer state. It depends only on traits
//! ([`ServiceSink`], [`GestureSink`]) and on the HID output state machine;
//! all infrastructure is injected at construction time, so the whole layer is
//! unit-testable with recording sinks.
//!
//! Concurrency model: one task mutates the dispatcher, the pipeline
//! consumer. Timers (long-hold gates, hold-to-repeat) are spawned tasks that
//! either publish through an owned sink handle (repeat) or re-enter the
//! dispatcher by message (hold), never by shared mutation. Every timer is
//! cancelled *and joined* before a replacement for the same button starts and
//! before shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use roomhub_core::{
    Action, ActivityTable, Edge, EdgeSelector, GatedAction, GestureCmd, Keymaps, RepeatSpec,
};

use super::hid_output::HidOutput;
use super::ControlMsg;

/// Error from executing a mapped action. The remaining actions of the same
/// edge's sequence are abandoned; the dispatcher itself continues unaffected.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("service sink error: {0}")]
    Service(String),
    #[error("gesture sink error: {0}")]
    Gesture(String),
}

/// Outbound seam to the home-automation broker bridge.
#[async_trait]
pub trait ServiceSink: Send + Sync {
    /// Publishes a `domain.service` call with its payload.
    async fn publish_service_call(
        &self,
        domain: &str,
        service: &str,
        data: &Map<String, Value>,
    ) -> Result<(), String>;

    /// Asks the external activity authority to switch activities. The local
    /// activity is only updated when the authority echoes the change back.
    async fn publish_activity_intent(&self, activity: &str) -> Result<(), String>;
}

/// Outbound seam to the media-player gesture client.
#[async_trait]
pub trait GestureSink: Send + Sync {
    async fn tap(&self, key: &str) -> Result<(), String>;
    async fn hold(&self, key: &str, duration: Option<Duration>) -> Result<(), String>;
    async fn double_tap(&self, key: &str) -> Result<(), String>;
}

/// Callback invoked after the activity changes; an `Err` is logged and
/// swallowed.
pub type ActivityChangeHook = Box<dyn Fn(&str) -> Result<(), String> + Send>;

/// Per-button hold phase while the button is physically down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldPhase {
    /// Down observed; a gate timer may be pending.
    Holding,
    /// The gated action already fired for this press.
    FiredAfterHold,
}

/// What caused an action to run.
///
/// A hold-timer elapse fires its action unconditionally: the user already
/// expressed the intent by holding past the threshold, so edge selectors do
/// not apply. Kinds that branch on the edge treat it as a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Edge(Edge),
    HoldFire,
}

impl Trigger {
    fn edge(self) -> Edge {
        match self {
            Trigger::Edge(e) => e,
            Trigger::HoldFire => Edge::Down,
        }
    }

    fn selected_by(self, when: Option<EdgeSelector>, default: EdgeSelector) -> bool {
        match self {
            Trigger::HoldFire => true,
            Trigger::Edge(e) => when.unwrap_or(default).matches(e),
        }
    }
}

pub struct Dispatcher {
    hid: Arc<Mutex<HidOutput>>,
    services: Arc<dyn ServiceSink>,
    gestures: Option<Arc<dyn GestureSink>>,
    keymaps: Arc<Keymaps>,
    activities: Arc<ActivityTable>,
    activity: String,
    held: HashMap<String, HoldPhase>,
    hold_timers: HashMap<String, JoinHandle<()>>,
    repeat_timers: HashMap<String, JoinHandle<()>>,
    control_tx: mpsc::UnboundedSender<ControlMsg>,
    on_activity_change: Option<ActivityChangeHook>,
}

impl Dispatcher {
    pub fn new(
        hid: Arc<Mutex<HidOutput>>,
        services: Arc<dyn ServiceSink>,
        keymaps: Arc<Keymaps>,
        activities: Arc<ActivityTable>,
        control_tx: mpsc::UnboundedSender<ControlMsg>,
    ) -> Self {
        let activity = activities.default_activity.clone();
        Self {
            hid,
            services,
            gestures: None,
            keymaps,
            activities,
            activity,
            held: HashMap::new(),
            hold_timers: HashMap::new(),
            repeat_timers: HashMap::new(),
            control_tx,
            on_activity_change: None,
        }
    }

    pub fn with_gesture_sink(mut self, gestures: Arc<dyn GestureSink>) -> Self {
        self.gestures = Some(gestures);
        self
    }

    pub fn with_activity_change_hook(mut self, hook: ActivityChangeHook) -> Self {
        self.on_activity_change = Some(hook);
        self
    }

    pub fn current_activity(&self) -> &str {
        &self.activity
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    /// Handles one logical-button edge: looks up the mapping for the current
    /// activity, tracks held state, and executes the ordered action list.
    ///
    /// An unmapped (activity, button) pair is a silent no-op. On the first
    /// failing action the remainder of the sequence is abandoned.
    pub async fn handle(&mut self, button: &str, edge: Edge) -> Result<(), DispatchError> {
        let actions: Vec<GatedAction> = match self.activities.actions_for(&self.activity, button)
        {
            Some(list) => list.to_vec(),
            None => {
                debug!("no action for {button} in activity {:?}", self.activity);
                return Ok(());
            }
        };

        match edge {
            Edge::Down => {
                self.held.insert(button.to_string(), HoldPhase::Holding);
            }
            Edge::Up => {
                self.held.remove(button);
                self.cancel_hold_timer(button).await;
                // A gated service_call returns at the gate on Up, so a
                // repeater started by the hold fire is stopped here.
                self.stop_repeat(button).await;
            }
        }

        for gated in &actions {
            self.run_action(gated, button, Trigger::Edge(edge)).await?;
        }
        Ok(())
    }

    /// Accepts an activity change from the external authority.
    ///
    /// Empty and unchanged names are ignored.
    pub fn set_activity(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() || name == self.activity {
            return;
        }
        self.activity = name.to_string();
        info!("activity -> {name}");
        if let Some(hook) = &self.on_activity_change {
            if let Err(e) = hook(name) {
                warn!("activity-change hook failed: {e}");
            }
        }
    }

    /// Swaps in a new activity snapshot. The current activity is preserved
    /// when the new table still defines it; otherwise the dispatcher falls
    /// back to the new table's default.
    pub fn replace_activities(&mut self, table: Arc<ActivityTable>) {
        self.activities = table;
        if !self.activities.contains(&self.activity) {
            let fallback = self.activities.default_activity.clone();
            self.set_activity(&fallback);
        }
        debug!(
            "activities updated ({} sections)",
            self.activities.activities.len()
        );
    }

    /// Swaps in a new keymap snapshot.
    pub fn replace_keymaps(&mut self, keymaps: Arc<Keymaps>) {
        self.keymaps = keymaps;
        debug!(
            "keymaps updated ({} keyboard, {} consumer)",
            self.keymaps.keyboard_len(),
            self.keymaps.consumer_len()
        );
    }

    /// Applies one control-lane message.
    pub async fn apply_control(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::SetActivity(name) => self.set_activity(&name),
            ControlMsg::Activities(table) => self.replace_activities(table),
            ControlMsg::Keymaps(km) => self.replace_keymaps(km),
            ControlMsg::HoldElapsed { button, action } => {
                self.on_hold_elapsed(&button, &action).await;
            }
        }
    }

    /// Cancels all timers and resets the output state machine.
    pub async fn shutdown(&mut self) {
        for (_, task) in self.hold_timers.drain() {
            task.abort();
            let _ = task.await;
        }
        for (_, task) in self.repeat_timers.drain() {
            task.abort();
            let _ = task.await;
        }
        self.held.clear();
        self.hid.lock().await.close().await;
    }

    // ── Action execution ──────────────────────────────────────────────────────

    async fn run_action(
        &mut self,
        gated: &GatedAction,
        button: &str,
        trigger: Trigger,
    ) -> Result<(), DispatchError> {
        // Long-hold gate: only fire once the button has stayed down past the
        // threshold. Early release cancels; re-press restarts the timer.
        if let Some(min_ms) = gated.min_hold_ms {
            if trigger == Trigger::Edge(Edge::Down) {
                self.restart_hold_timer(button, gated.ungated(), Duration::from_millis(min_ms))
                    .await;
            }
            // The Up edge already cancelled the timer in `handle`.
            return Ok(());
        }

        let edge = trigger.edge();
        match &gated.action {
            Action::HidKeyboard { name } => {
                let Some(code) = self.keymaps.keyboard_code(name) else {
                    debug!("keyboard key {name:?} not in keymap");
                    return Ok(());
                };
                let mut hid = self.hid.lock().await;
                match edge {
                    Edge::Down => hid.key_down(code, 0),
                    Edge::Up => hid.key_up(Some(code)),
                }
            }

            Action::HidConsumer { name } => {
                let Some(usage) = self.keymaps.consumer_usage(name) else {
                    debug!("consumer control {name:?} not in keymap");
                    return Ok(());
                };
                let mut hid = self.hid.lock().await;
                match edge {
                    Edge::Down => hid.consumer_down(usage).await,
                    Edge::Up => hid.consumer_up().await,
                }
            }

            Action::ServiceCall {
                domain,
                service,
                data,
                repeat,
                when,
            } => {
                if let Some(rep) = repeat {
                    match edge {
                        Edge::Down => {
                            // A re-press supersedes any timer still running
                            // for this button.
                            self.stop_repeat(button).await;
                            info!("{button} {edge} -> {domain}.{service} (repeat)");
                            self.services
                                .publish_service_call(domain, service, data)
                                .await
                                .map_err(DispatchError::Service)?;
                            self.start_repeat(button, domain, service, data, rep);
                        }
                        Edge::Up => self.stop_repeat(button).await,
                    }
                } else if trigger.selected_by(*when, EdgeSelector::Up) {
                    info!("{button} {edge} -> {domain}.{service}");
                    self.services
                        .publish_service_call(domain, service, data)
                        .await
                        .map_err(DispatchError::Service)?;
                }
            }

            Action::SetActivity { to, when } => {
                if trigger.selected_by(*when, EdgeSelector::Down) {
                    self.services
                        .publish_activity_intent(&to.to_lowercase())
                        .await
                        .map_err(DispatchError::Service)?;
                }
            }

            Action::Gesture {
                cmd,
                key,
                when,
                hold_ms,
                delay_ms,
            } => {
                if trigger.selected_by(*when, EdgeSelector::Up) {
                    let Some(gestures) = &self.gestures else {
                        debug!("gesture sink not configured; dropping {cmd:?} {key}");
                        return Ok(());
                    };
                    match cmd {
                        GestureCmd::Tap => gestures.tap(key).await,
                        GestureCmd::Hold => {
                            gestures
                                .hold(key, hold_ms.map(Duration::from_millis))
                                .await
                        }
                        GestureCmd::Double => gestures.double_tap(key).await,
                    }
                    .map_err(DispatchError::Gesture)?;
                    if let Some(ms) = delay_ms {
                        tokio::time::sleep(Duration::from_millis(*ms)).await;
                    }
                }
            }

            Action::Sleep { ms } => {
                if edge == Edge::Down {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                }
            }

            Action::Noop => {}
        }
        Ok(())
    }

    /// Fired by the control lane when a hold timer elapsed. The action runs
    /// only if the button is still in its original press.
    async fn on_hold_elapsed(&mut self, button: &str, action: &GatedAction) {
        if self.held.get(button) != Some(&HoldPhase::Holding) {
            // Released (or already fired) before the message was consumed.
            return;
        }
        self.held
            .insert(button.to_string(), HoldPhase::FiredAfterHold);
        self.hold_timers.remove(button);
        if let Err(e) = self.run_action(action, button, Trigger::HoldFire).await {
            warn!("hold-gated action for {button} failed: {e}");
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    async fn restart_hold_timer(&mut self, button: &str, action: GatedAction, after: Duration) {
        self.cancel_hold_timer(button).await;
        let tx = self.control_tx.clone();
        let name = button.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Still-held is re-checked at delivery; a message racing a
            // release is discarded there.
            let _ = tx.send(ControlMsg::HoldElapsed {
                button: name,
                action: Box::new(action),
            });
        });
        self.hold_timers.insert(button.to_string(), task);
    }

    async fn cancel_hold_timer(&mut self, button: &str) {
        if let Some(task) = self.hold_timers.remove(button) {
            task.abort();
            let _ = task.await;
        }
    }

    fn start_repeat(
        &mut self,
        button: &str,
        domain: &str,
        service: &str,
        data: &Map<String, Value>,
        rep: &RepeatSpec,
    ) {
        let services = Arc::clone(&self.services);
        let (domain, service, data) = (domain.to_string(), service.to_string(), data.clone());
        let initial = Duration::from_millis(rep.initial_ms);
        let every = Duration::from_millis(rep.every_ms);
        let task = tokio::spawn(async move {
            tokio::time::sleep(initial).await;
            loop {
                if let Err(e) = services
                    .publish_service_call(&domain, &service, &data)
                    .await
                {
                    warn!("repeat publish {domain}.{service} failed: {e}");
                }
                tokio::time::sleep(every).await;
            }
        });
        self.repeat_timers.insert(button.to_string(), task);
    }

    async fn stop_repeat(&mut self, button: &str) {
        if let Some(task) = self.repeat_timers.remove(button) {
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::hid_output::HidTransport;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::task::yield_now;

    // ── Recording doubles ─────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingServiceSink {
        calls: StdMutex<Vec<(String, String)>>,
        intents: StdMutex<Vec<String>>,
        fail_calls: AtomicBool,
    }

    impl RecordingServiceSink {
        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn intents(&self) -> Vec<String> {
            self.intents.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServiceSink for RecordingServiceSink {
        async fn publish_service_call(
            &self,
            domain: &str,
            service: &str,
            _data: &Map<String, Value>,
        ) -> Result<(), String> {
            if self.fail_calls.load(Ordering::Relaxed) {
                return Err("broker offline".to_string());
            }
            self.calls
                .lock()
                .unwrap()
                .push((domain.to_string(), service.to_string()));
            Ok(())
        }

        async fn publish_activity_intent(&self, activity: &str) -> Result<(), String> {
            self.intents.lock().unwrap().push(activity.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        consumer: StdMutex<Vec<[u8; 2]>>,
    }

    impl HidTransport for RecordingTransport {
        fn send_keyboard_report(&self, _report: &[u8; 8]) -> Result<(), String> {
            Ok(())
        }

        fn send_consumer_report(&self, payload: &[u8; 2]) -> Result<(), String> {
            self.consumer.lock().unwrap().push(*payload);
            Ok(())
        }

        fn is_subscribed(&self) -> bool {
            true
        }
    }

    // ── Fixture ───────────────────────────────────────────────────────────────

    fn activities(toml_src: &str) -> Arc<ActivityTable> {
        Arc::new(toml::from_str(toml_src).expect("test table must parse"))
    }

    fn keymaps() -> Arc<Keymaps> {
        let kb = [("enter".to_string(), 0x28u32)].into_iter().collect();
        let cc = [("vol_up".to_string(), 0xE9u32)].into_iter().collect();
        Arc::new(Keymaps::from_tables(kb, cc).unwrap())
    }

    struct Fixture {
        dispatcher: Dispatcher,
        services: Arc<RecordingServiceSink>,
        transport: Arc<RecordingTransport>,
        control_rx: mpsc::UnboundedReceiver<ControlMsg>,
    }

    fn fixture(table_src: &str) -> Fixture {
        let services = Arc::new(RecordingServiceSink::default());
        let transport = Arc::new(RecordingTransport::default());
        let hid = Arc::new(Mutex::new(HidOutput::new(
            Arc::clone(&transport) as Arc<dyn HidTransport>
        )));
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            hid,
            Arc::clone(&services) as Arc<dyn ServiceSink>,
            keymaps(),
            activities(table_src),
            tx,
        );
        Fixture {
            dispatcher,
            services,
            transport,
            control_rx: rx,
        }
    }

    /// Pumps queued control messages into the dispatcher. Yields afterwards
    /// so tasks spawned while applying a message register their timers with
    /// the paused clock before the test advances time.
    async fn pump(fx: &mut Fixture) {
        while let Ok(msg) = fx.control_rx.try_recv() {
            fx.dispatcher.apply_control(msg).await;
        }
        yield_now().await;
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unmapped_button_is_a_silent_noop() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            "#,
        );

        fx.dispatcher.handle("mystery", Edge::Down).await.unwrap();
        fx.dispatcher.handle("mystery", Edge::Up).await.unwrap();

        assert!(fx.services.calls().is_empty());
        assert!(fx.transport.consumer.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consumer_action_mirrors_edges() {
        // Scenario A: vol_up → usage 0x00E9
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            vol_up = { do = "hid_consumer", name = "vol_up" }
            "#,
        );

        fx.dispatcher.handle("vol_up", Edge::Down).await.unwrap();
        fx.dispatcher.handle("vol_up", Edge::Up).await.unwrap();

        let sends = fx.transport.consumer.lock().unwrap().clone();
        assert_eq!(sends, vec![[0xE9, 0x00], [0x00, 0x00]]);
    }

    #[tokio::test]
    async fn test_unknown_keymap_name_is_a_noop() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            oddball = { do = "hid_consumer", name = "not_in_keymap" }
            "#,
        );

        fx.dispatcher.handle("oddball", Edge::Down).await.unwrap();

        assert!(fx.transport.consumer.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_service_call_defaults_to_firing_on_up() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            play = { do = "service_call", domain = "media_player", service = "play_pause" }
            "#,
        );

        fx.dispatcher.handle("play", Edge::Down).await.unwrap();
        assert!(fx.services.calls().is_empty());

        fx.dispatcher.handle("play", Edge::Up).await.unwrap();
        assert_eq!(
            fx.services.calls(),
            vec![("media_player".to_string(), "play_pause".to_string())]
        );
    }

    #[tokio::test]
    async fn test_service_call_when_both_fires_on_each_edge() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            play = { do = "service_call", domain = "light", service = "toggle", when = "both" }
            "#,
        );

        fx.dispatcher.handle("play", Edge::Down).await.unwrap();
        fx.dispatcher.handle("play", Edge::Up).await.unwrap();

        assert_eq!(fx.services.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_activity_intent_publishes_lowercase_and_keeps_local_state() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            listen = { do = "set_activity", to = "Listen" }
            "#,
        );

        fx.dispatcher.handle("listen", Edge::Down).await.unwrap();

        assert_eq!(fx.services.intents(), vec!["listen".to_string()]);
        // The authority echoes the change back; nothing changed locally.
        assert_eq!(fx.dispatcher.current_activity(), "watch");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_gate_fires_exactly_once_after_threshold() {
        // Scenario B: power_hold with a 1500 ms gate
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            power_hold = { do = "service_call", domain = "media_player", service = "turn_off", min_hold_ms = 1500 }
            "#,
        );

        fx.dispatcher.handle("power_hold", Edge::Down).await.unwrap();
        // Let the spawned gate task arm its sleep before moving the clock.
        yield_now().await;
        tokio::time::advance(Duration::from_millis(1500)).await;
        yield_now().await;
        pump(&mut fx).await;

        assert_eq!(fx.services.calls().len(), 1, "gate must fire exactly once");

        // Holding longer fires nothing further.
        tokio::time::advance(Duration::from_millis(1500)).await;
        yield_now().await;
        pump(&mut fx).await;
        assert_eq!(fx.services.calls().len(), 1);

        fx.dispatcher.handle("power_hold", Edge::Up).await.unwrap();
        pump(&mut fx).await;
        assert_eq!(fx.services.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_gate_released_early_never_fires() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            power_hold = { do = "service_call", domain = "media_player", service = "turn_off", min_hold_ms = 1500 }
            "#,
        );

        fx.dispatcher.handle("power_hold", Edge::Down).await.unwrap();
        yield_now().await;
        tokio::time::advance(Duration::from_millis(800)).await;
        fx.dispatcher.handle("power_hold", Edge::Up).await.unwrap();

        tokio::time::advance(Duration::from_millis(2000)).await;
        yield_now().await;
        pump(&mut fx).await;

        assert!(fx.services.calls().is_empty(), "early release fires nothing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repress_restarts_the_hold_timer() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            power_hold = { do = "service_call", domain = "media_player", service = "turn_off", min_hold_ms = 1000 }
            "#,
        );

        fx.dispatcher.handle("power_hold", Edge::Down).await.unwrap();
        yield_now().await;
        tokio::time::advance(Duration::from_millis(700)).await;

        // Second Down before any Up restarts the timer instead of stacking.
        fx.dispatcher.handle("power_hold", Edge::Down).await.unwrap();
        yield_now().await;
        tokio::time::advance(Duration::from_millis(700)).await;
        yield_now().await;
        pump(&mut fx).await;
        assert!(fx.services.calls().is_empty(), "restarted timer has not elapsed");

        tokio::time::advance(Duration::from_millis(300)).await;
        yield_now().await;
        pump(&mut fx).await;
        assert_eq!(fx.services.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_fires_immediately_then_on_cadence_until_up() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            vol = { do = "service_call", domain = "media_player", service = "volume_up", repeat = { initial_ms = 400, every_ms = 250 } }
            "#,
        );

        // Down: one immediate fire.
        fx.dispatcher.handle("vol", Edge::Down).await.unwrap();
        yield_now().await;
        assert_eq!(fx.services.calls().len(), 1);

        // First repeat at initial_ms, next at every_ms cadence.
        tokio::time::advance(Duration::from_millis(400)).await;
        yield_now().await;
        assert_eq!(fx.services.calls().len(), 2);

        tokio::time::advance(Duration::from_millis(250)).await;
        yield_now().await;
        tokio::time::advance(Duration::from_millis(250)).await;
        yield_now().await;
        assert_eq!(fx.services.calls().len(), 4);

        // Up stops the repeater; no further fires.
        fx.dispatcher.handle("vol", Edge::Up).await.unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;
        yield_now().await;
        assert_eq!(fx.services.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_up_stops_a_repeater_started_by_a_hold_fire() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            vol_hold = { do = "service_call", domain = "media_player", service = "volume_up", min_hold_ms = 500, repeat = { initial_ms = 400, every_ms = 250 } }
            "#,
        );

        // Gate fire runs the call once and starts the repeater.
        fx.dispatcher.handle("vol_hold", Edge::Down).await.unwrap();
        yield_now().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        yield_now().await;
        pump(&mut fx).await;
        assert_eq!(fx.services.calls().len(), 1);

        tokio::time::advance(Duration::from_millis(400)).await;
        yield_now().await;
        assert_eq!(fx.services.calls().len(), 2);

        // Up returns at the gate but still has to stop the repeater.
        fx.dispatcher.handle("vol_hold", Edge::Up).await.unwrap();
        tokio::time::advance(Duration::from_millis(2000)).await;
        yield_now().await;
        assert_eq!(fx.services.calls().len(), 2, "release stops the repeater");
    }

    #[tokio::test]
    async fn test_failing_action_abandons_the_rest_of_the_sequence() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            combo = [
                { do = "service_call", domain = "scene", service = "movie", when = "down" },
                { do = "set_activity", to = "watch" },
            ]
            "#,
        );
        fx.services.fail_calls.store(true, Ordering::Relaxed);

        let result = fx.dispatcher.handle("combo", Edge::Down).await;

        assert!(result.is_err());
        assert!(
            fx.services.intents().is_empty(),
            "actions after the failure must not run"
        );
    }

    #[tokio::test]
    async fn test_set_activity_ignores_empty_and_unchanged() {
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_hook = Arc::clone(&seen);
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            [activities.listen.map]
            "#,
        );
        fx.dispatcher = fx.dispatcher.with_activity_change_hook(Box::new(move |name| {
            seen_hook.lock().unwrap().push(name.to_string());
            Ok(())
        }));

        fx.dispatcher.set_activity("");
        fx.dispatcher.set_activity("  ");
        fx.dispatcher.set_activity("watch"); // unchanged
        fx.dispatcher.set_activity("listen");
        fx.dispatcher.set_activity("listen"); // unchanged

        assert_eq!(fx.dispatcher.current_activity(), "listen");
        assert_eq!(*seen.lock().unwrap(), vec!["listen".to_string()]);
    }

    #[tokio::test]
    async fn test_hook_error_is_swallowed() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            [activities.listen.map]
            "#,
        );
        fx.dispatcher = fx
            .dispatcher
            .with_activity_change_hook(Box::new(|_| Err("hook exploded".to_string())));

        fx.dispatcher.set_activity("listen");

        assert_eq!(fx.dispatcher.current_activity(), "listen");
    }

    #[tokio::test]
    async fn test_reload_keeps_current_activity_when_still_defined() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            [activities.listen.map]
            "#,
        );
        fx.dispatcher.set_activity("listen");

        fx.dispatcher.replace_activities(activities(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            [activities.listen.map]
            [activities.game.map]
            "#,
        ));

        assert_eq!(fx.dispatcher.current_activity(), "listen");
    }

    #[tokio::test]
    async fn test_reload_falls_back_to_new_default_when_activity_vanished() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            [activities.listen.map]
            "#,
        );
        fx.dispatcher.set_activity("listen");

        fx.dispatcher.replace_activities(activities(
            r#"
            default_activity = "game"
            [activities.watch.map]
            [activities.game.map]
            "#,
        ));

        assert_eq!(fx.dispatcher.current_activity(), "game");
    }

    // ── Gestures ──────────────────────────────────────────────────────────────

    mockall::mock! {
        Gestures {}

        #[async_trait]
        impl GestureSink for Gestures {
            async fn tap(&self, key: &str) -> Result<(), String>;
            async fn hold(&self, key: &str, duration: Option<Duration>) -> Result<(), String>;
            async fn double_tap(&self, key: &str) -> Result<(), String>;
        }
    }

    #[tokio::test]
    async fn test_gesture_tap_fires_on_release_only() {
        // Arrange
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            skip = { do = "gesture", cmd = "tap", key = "right" }
            "#,
        );
        let mut gestures = MockGestures::new();
        gestures
            .expect_tap()
            .withf(|key| key == "right")
            .once()
            .returning(|_| Ok(()));
        fx.dispatcher = fx.dispatcher.with_gesture_sink(Arc::new(gestures));

        // Act
        fx.dispatcher.handle("skip", Edge::Down).await.unwrap();
        fx.dispatcher.handle("skip", Edge::Up).await.unwrap();

        // Assert – the mock panics on drop if tap did not fire exactly once.
    }

    #[tokio::test]
    async fn test_gesture_hold_passes_duration() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            rewind = { do = "gesture", cmd = "hold", key = "left", hold_ms = 800 }
            "#,
        );
        let mut gestures = MockGestures::new();
        gestures
            .expect_hold()
            .withf(|key, duration| key == "left" && *duration == Some(Duration::from_millis(800)))
            .once()
            .returning(|_, _| Ok(()));
        fx.dispatcher = fx.dispatcher.with_gesture_sink(Arc::new(gestures));

        fx.dispatcher.handle("rewind", Edge::Up).await.unwrap();
    }

    #[tokio::test]
    async fn test_gesture_without_sink_is_dropped_quietly() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            skip = { do = "gesture", cmd = "tap", key = "right" }
            "#,
        );

        let result = fx.dispatcher.handle("skip", Edge::Up).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_gesture_sink_error_abandons_rest_of_sequence() {
        let mut fx = fixture(
            r#"
            default_activity = "watch"
            [activities.watch.map]
            skip = [
                { do = "gesture", cmd = "tap", key = "right" },
                { do = "service_call", domain = "light", service = "toggle" },
            ]
            "#,
        );
        let mut gestures = MockGestures::new();
        gestures
            .expect_tap()
            .once()
            .returning(|_| Err("player unreachable".to_string()));
        fx.dispatcher = fx.dispatcher.with_gesture_sink(Arc::new(gestures));

        let result = fx.dispatcher.handle("skip", Edge::Up).await;

        assert!(matches!(result, Err(DispatchError::Gesture(_))));
        assert!(fx.services.calls().is_empty(), "sequence must stop at the failure");
    }
}
