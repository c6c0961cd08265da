//! The shared director engine.
//!
//! One [`Engine`] serves every connection. Locks are always taken in this
//! order, and each is released before anything earlier in the list is taken:
//!
//! 1. connection gate (dispatch and eviction of one connection)
//! 2. game state (catalogue, coordinator, context of one game)
//! 3. rng
//! 4. connection registry
//! 5. outbound queue
//!
//! Game state lives as long as at least one connection is bound to the game.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use director_core::envelope::{ContextData, ResultData};
use director_core::{Action, ConnectionId, Envelope, InvocationId, OutboundQueue};
use director_settings::DirectorSettings;
use metrics::counter;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalogue::ActionCatalogue;
use crate::coordinator::{Effect, ForceRequest, Invocation, InvocationCoordinator};
use crate::dispatcher::{CommandContext, CommandDispatcher, CommandHandler};
use crate::errors::EngineError;
use crate::handlers;
use crate::metrics::{
    COMMAND_ERRORS_TOTAL, FORCE_DROPPED_TOTAL, HEARTBEAT_EVICTIONS_TOTAL, INVOCATION_RESULTS_TOTAL,
    INVOCATIONS_SENT_TOTAL, OUTBOUND_DROPS_TOTAL,
};
use crate::registry::{Binding, ConnectionRegistry, HeartbeatSweep};
use crate::scheduler::{Scheduler, TimerPurpose};
use crate::transport::Transport;

/// Context messages kept per game.
pub const DEFAULT_CONTEXT_HISTORY: usize = 32;

/// Engine tunables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between choosing an action and sending the invoke.
    pub settle_delay: Duration,
    /// Retry cap for failing invocations; `None` retries forever.
    pub max_retries: Option<u32>,
    /// Context messages retained per game.
    pub context_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            max_retries: None,
            context_history: DEFAULT_CONTEXT_HISTORY,
        }
    }
}

impl From<&DirectorSettings> for EngineConfig {
    fn from(settings: &DirectorSettings) -> Self {
        Self {
            settle_delay: settings.invocation.settle_delay(),
            max_retries: settings.invocation.max_retries,
            context_history: DEFAULT_CONTEXT_HISTORY,
        }
    }
}

/// A context message reported by a game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    /// Message text.
    pub message: String,
    /// Whether the game asked for no reaction.
    pub silent: bool,
    /// When the director received it.
    pub received_at: DateTime<Utc>,
}

/// Read-only view of one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    /// Game name.
    pub name: String,
    /// Connections bound to it.
    pub connections: usize,
    /// Registered actions.
    pub actions: usize,
    /// Outstanding invocation ID, if any.
    pub outstanding_id: Option<InvocationId>,
    /// Outstanding action, if any.
    pub outstanding_action: Option<String>,
    /// Parked force requests.
    pub backlog: usize,
}

/// Result of [`Engine::force`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForceOutcome {
    /// An action was chosen; the invoke goes out after the settle delay.
    Scheduled {
        /// Invocation ID.
        id: InvocationId,
        /// Chosen action.
        action: String,
    },
    /// Another invocation is outstanding; the request waits its turn.
    Queued {
        /// Backlog length after queueing.
        depth: usize,
    },
}

#[derive(Debug)]
struct GameState {
    catalogue: ActionCatalogue,
    coordinator: InvocationCoordinator,
    context: VecDeque<ContextEntry>,
}

impl GameState {
    fn new(game: &str, config: &EngineConfig) -> Self {
        Self {
            catalogue: ActionCatalogue::new(),
            coordinator: InvocationCoordinator::new(game, config.max_retries),
            context: VecDeque::new(),
        }
    }
}

/// Builds an [`Engine`].
pub struct EngineBuilder {
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    seed: Option<u64>,
    dispatcher: CommandDispatcher,
}

impl EngineBuilder {
    /// Defaults plus every built-in command handler.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let mut dispatcher = CommandDispatcher::new();
        handlers::register_builtin(&mut dispatcher);
        Self {
            transport,
            config: EngineConfig::default(),
            seed: None,
            dispatcher,
        }
    }

    /// Replace the tunables.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed action selection for reproducible runs.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add or replace a command handler.
    #[must_use]
    pub fn handler(mut self, command: &str, handler: impl CommandHandler + 'static) -> Self {
        self.dispatcher.register(command, handler);
        self
    }

    /// Finish.
    pub fn build(self) -> Arc<Engine> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Arc::new_cyclic(|this| Engine {
            config: self.config,
            transport: self.transport,
            dispatcher: self.dispatcher,
            registry: Mutex::new(ConnectionRegistry::new()),
            games: DashMap::new(),
            outbound: Mutex::new(OutboundQueue::new()),
            scheduler: Scheduler::new(),
            rng: Mutex::new(rng),
            this: this.clone(),
        })
    }
}

/// Director-side protocol engine shared by every connection.
pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    dispatcher: CommandDispatcher,
    registry: Mutex<ConnectionRegistry>,
    games: DashMap<String, Arc<Mutex<GameState>>>,
    outbound: Mutex<OutboundQueue<ConnectionId>>,
    scheduler: Scheduler,
    rng: Mutex<StdRng>,
    this: Weak<Engine>,
}

impl Engine {
    /// Active tunables.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Track a new connection and queue `reregister_all` for it.
    ///
    /// The envelope goes out on the next [`flush`](Self::flush), so the
    /// transport must be able to reach the ID before flushing.
    pub fn accept(&self) -> ConnectionId {
        self.accept_with(|_| {})
    }

    /// Like [`accept`](Self::accept); `attach` runs with the new ID before
    /// anything is queued for it.
    pub fn accept_with(&self, attach: impl FnOnce(&ConnectionId)) -> ConnectionId {
        let id = self.registry.lock().accept();
        attach(&id);
        let _ = self
            .outbound
            .lock()
            .enqueue(id.clone(), Envelope::reregister_all());
        info!(connection = %id, "connection accepted");
        id
    }

    /// Hand every queued envelope to the transport, in order.
    pub fn flush(&self) {
        let mut outbound = self.outbound.lock();
        for (connection, envelopes) in outbound.drain_all() {
            for envelope in envelopes {
                let text = match envelope.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(connection = %connection, command = %envelope.command, error = %err, "failed to encode outbound envelope");
                        continue;
                    }
                };
                if !self.transport.send(&connection, text) {
                    counter!(OUTBOUND_DROPS_TOTAL).increment(1);
                    warn!(connection = %connection, command = %envelope.command, "transport refused outbound envelope");
                }
            }
        }
    }

    /// Decode and dispatch one inbound text frame, then flush.
    ///
    /// Malformed frames and unknown commands are logged and dropped; the
    /// connection stays open.
    pub fn handle_text(&self, connection: &ConnectionId, text: &str) {
        let gate = self.registry.lock().gate(connection);
        let Some(gate) = gate else {
            debug!(connection = %connection, "frame for unknown connection dropped");
            return;
        };
        {
            let _gate = gate.lock();
            if !self.registry.lock().contains(connection) {
                debug!(connection = %connection, "frame for evicted connection dropped");
                return;
            }
            match Envelope::decode(text) {
                Ok(envelope) => {
                    let ctx = CommandContext {
                        engine: self,
                        connection,
                    };
                    let _ = self.dispatcher.dispatch(&envelope, &ctx);
                }
                Err(err) => {
                    counter!(COMMAND_ERRORS_TOTAL, "command" => "malformed", "code" => err.code()).increment(1);
                    warn!(connection = %connection, error = %err, "malformed frame dropped");
                }
            }
        }
        self.flush();
    }

    /// Record a probe acknowledgement.
    pub fn on_pong(&self, connection: &ConnectionId) {
        if !self.registry.lock().mark_alive(connection) {
            debug!(connection = %connection, "pong from unknown connection");
        }
    }

    /// The transport reports the connection is gone.
    pub fn close(&self, connection: &ConnectionId) {
        let gate = self.registry.lock().gate(connection);
        let Some(gate) = gate else {
            return;
        };
        let _gate = gate.lock();
        let _ = self.release(connection, "closed");
    }

    /// Close a connection from the director side. Returns whether it was tracked.
    pub fn evict(&self, connection: &ConnectionId) -> bool {
        let gate = self.registry.lock().gate(connection);
        let Some(gate) = gate else {
            return false;
        };
        let _gate = gate.lock();
        if !self.release(connection, "evicted") {
            return false;
        }
        self.transport.close(connection);
        true
    }

    /// One heartbeat tick: probe live connections, evict silent ones.
    pub fn heartbeat_tick(&self) -> HeartbeatSweep {
        let sweep = self.registry.lock().sweep();
        for id in &sweep.probe {
            self.transport.ping(id);
        }
        for id in &sweep.evict {
            if self.evict(id) {
                counter!(HEARTBEAT_EVICTIONS_TOTAL).increment(1);
                warn!(connection = %id, "connection evicted: probe not acknowledged");
            }
        }
        debug!(
            probed = sweep.probe.len(),
            evicted = sweep.evict.len(),
            "heartbeat tick"
        );
        sweep
    }

    /// Cancel every pending timer.
    pub fn shutdown(&self) {
        let timers = self.scheduler.cancel_all();
        info!(timers, "engine shut down");
    }

    /// Forget a connection. Must be called under its gate.
    fn release(&self, connection: &ConnectionId, reason: &str) -> bool {
        let (game, game_released) = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.remove(connection) else {
                return false;
            };
            let game = entry.game().map(str::to_owned);
            let released = match game.as_deref() {
                Some(name) if !registry.serves(name) => self.games.remove(name).is_some(),
                _ => false,
            };
            (game, released)
        };

        let discarded = self.outbound.lock().release(connection);
        info!(connection = %connection, game = ?game, reason, discarded, "connection released");

        if game_released {
            if let Some(game) = game.as_deref() {
                let timers = self.scheduler.cancel_game(game);
                info!(game, timers, "game state released");
            }
        }
        true
    }

    // ── Game binding and catalogue ──────────────────────────────────

    /// Bind a connection to `game`. The first bind resets the game's catalogue.
    pub fn bind(&self, connection: &ConnectionId, game: &str) -> Result<Binding, EngineError> {
        let binding = self.registry.lock().bind(connection, game)?;
        match binding {
            Binding::New => {
                let state = self.game_state_or_create(game);
                let cleared = {
                    let mut state = state.lock();
                    let cleared = state.catalogue.len();
                    state.catalogue.reset();
                    cleared
                };
                info!(connection = %connection, game, cleared, "connection bound to game");
            }
            Binding::Unchanged => {
                debug!(connection = %connection, game, "repeat handshake ignored");
            }
        }
        Ok(binding)
    }

    /// Insert or replace actions in `game`'s catalogue.
    pub fn register_actions(&self, game: &str, actions: Vec<Action>) -> Result<usize, EngineError> {
        let state = self.game_state(game)?;
        let names: Vec<String> = actions.iter().map(|a| a.name.clone()).collect();
        let applied = state.lock().catalogue.register(actions);
        info!(game, count = applied, ?names, "actions registered");
        Ok(applied)
    }

    /// Remove actions from `game`'s catalogue.
    pub fn unregister_actions(&self, game: &str, names: &[String]) -> Result<usize, EngineError> {
        let state = self.game_state(game)?;
        let removed = state.lock().catalogue.unregister(names);
        info!(game, removed, ?names, "actions unregistered");
        Ok(removed)
    }

    // ── Invocation ──────────────────────────────────────────────────

    /// Choose one of `request.candidates` and schedule its invoke, or park
    /// the request if an invocation is already outstanding.
    pub fn force(&self, game: &str, request: ForceRequest) -> Result<ForceOutcome, EngineError> {
        let state = self.game_state(game)?;
        let outcome = {
            let mut guard = state.lock();
            let GameState {
                catalogue,
                coordinator,
                ..
            } = &mut *guard;
            let effects = coordinator
                .on_force(request, catalogue, &mut *self.rng.lock())
                .inspect_err(|_| counter!(FORCE_DROPPED_TOTAL).increment(1))?;
            let outcome = effects
                .iter()
                .find_map(|effect| match effect {
                    Effect::Schedule(inv) => Some(ForceOutcome::Scheduled {
                        id: inv.id.clone(),
                        action: inv.action.clone(),
                    }),
                    _ => None,
                })
                .unwrap_or(ForceOutcome::Queued {
                    depth: coordinator.backlog_len(),
                });
            self.apply(game, effects);
            outcome
        };
        self.flush();
        Ok(outcome)
    }

    /// Apply a result reported by the game.
    pub fn complete(&self, game: &str, result: &ResultData) -> Result<(), EngineError> {
        let state = self.game_state(game)?;
        {
            let mut guard = state.lock();
            let GameState {
                catalogue,
                coordinator,
                ..
            } = &mut *guard;
            let effects = coordinator.on_result(result, catalogue, &mut *self.rng.lock())?;
            if !result.success {
                counter!(INVOCATION_RESULTS_TOTAL, "outcome" => "failure").increment(1);
                info!(
                    game,
                    invocation = %result.id,
                    message = result.message.as_deref().unwrap_or_default(),
                    "invocation failed"
                );
            }
            self.apply(game, effects);
        }
        self.flush();
        Ok(())
    }

    /// Settle timer callback.
    fn fire_invoke(&self, game: &str, id: &InvocationId) {
        let Ok(state) = self.game_state(game) else {
            debug!(game, invocation = %id, "settle timer fired for released game");
            return;
        };
        {
            let mut guard = state.lock();
            let GameState {
                catalogue,
                coordinator,
                ..
            } = &mut *guard;
            let effects = coordinator.on_due(id, catalogue, &mut *self.rng.lock());
            if effects.is_empty() {
                debug!(game, invocation = %id, "stale settle timer ignored");
            }
            self.apply(game, effects);
        }
        self.flush();
    }

    /// Carry out coordinator effects. Called with the game's state locked.
    fn apply(&self, game: &str, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Schedule(invocation) => self.schedule_invoke(&invocation),
                Effect::Send(invocation) => self.send_invoke(&invocation),
                Effect::Queued { depth } => {
                    info!(game, depth, "force request queued behind outstanding invocation");
                }
                Effect::Dropped { candidates } => {
                    counter!(FORCE_DROPPED_TOTAL).increment(1);
                    warn!(game, ?candidates, "backlogged force request dropped: no registered candidate");
                }
                Effect::Completed(invocation) => {
                    counter!(INVOCATION_RESULTS_TOTAL, "outcome" => "success").increment(1);
                    info!(
                        game,
                        invocation = %invocation.id,
                        action = %invocation.action,
                        attempt = invocation.attempt,
                        "invocation succeeded"
                    );
                }
                Effect::Abandoned { invocation, reason } => {
                    counter!(INVOCATION_RESULTS_TOTAL, "outcome" => "abandoned").increment(1);
                    warn!(
                        game,
                        invocation = %invocation.id,
                        action = %invocation.action,
                        attempt = invocation.attempt,
                        reason = reason.as_str(),
                        "invocation abandoned"
                    );
                }
            }
        }
    }

    fn schedule_invoke(&self, invocation: &Invocation) {
        let this = self.this.clone();
        let game = invocation.game.clone();
        let id = invocation.id.clone();
        self.scheduler.schedule(
            &invocation.game,
            TimerPurpose::Invoke,
            self.config.settle_delay,
            move || {
                if let Some(engine) = this.upgrade() {
                    engine.fire_invoke(&game, &id);
                }
            },
        );
        debug!(
            game = %invocation.game,
            invocation = %invocation.id,
            action = %invocation.action,
            attempt = invocation.attempt,
            delay_ms = u64::try_from(self.config.settle_delay.as_millis()).unwrap_or(u64::MAX),
            "invoke scheduled"
        );
    }

    fn send_invoke(&self, invocation: &Invocation) {
        let targets = self.registry.lock().connections(Some(&invocation.game));
        if targets.is_empty() {
            warn!(game = %invocation.game, invocation = %invocation.id, "no connection bound; invoke skipped");
            return;
        }
        let envelope = Envelope::invoke(&invocation.to_invoke());
        let count = targets.len();
        {
            let mut outbound = self.outbound.lock();
            for target in targets {
                let _ = outbound.enqueue(target, envelope.clone());
            }
        }
        counter!(INVOCATIONS_SENT_TOTAL).increment(1);
        info!(
            game = %invocation.game,
            invocation = %invocation.id,
            action = %invocation.action,
            attempt = invocation.attempt,
            connections = count,
            "invoke sent"
        );
    }

    // ── Context ─────────────────────────────────────────────────────

    /// Store a context message in `game`'s bounded history.
    pub fn record_context(&self, game: &str, context: ContextData) -> Result<(), EngineError> {
        let state = self.game_state(game)?;
        info!(game, silent = context.silent, message = %context.message, "context received");
        let cap = self.config.context_history;
        if cap == 0 {
            return Ok(());
        }
        let mut state = state.lock();
        while state.context.len() >= cap {
            let _ = state.context.pop_front();
        }
        state.context.push_back(ContextEntry {
            message: context.message,
            silent: context.silent,
            received_at: Utc::now(),
        });
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Game a connection is bound to.
    pub fn game_of(&self, connection: &ConnectionId) -> Option<String> {
        self.registry.lock().game_of(connection).map(str::to_owned)
    }

    /// Connections bound to `game`, or every connection for `None`.
    pub fn connections(&self, game: Option<&str>) -> Vec<ConnectionId> {
        self.registry.lock().connections(game)
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Snapshot of `game`'s catalogue.
    pub fn actions(&self, game: &str) -> Option<Vec<Action>> {
        self.game_state(game).ok().map(|state| state.lock().catalogue.list())
    }

    /// `game`'s retained context messages, oldest first.
    pub fn context(&self, game: &str) -> Option<Vec<ContextEntry>> {
        self.game_state(game)
            .ok()
            .map(|state| state.lock().context.iter().cloned().collect())
    }

    /// Outstanding invocation for `game`.
    pub fn outstanding(&self, game: &str) -> Option<Invocation> {
        self.game_state(game)
            .ok()
            .and_then(|state| state.lock().coordinator.outstanding().cloned())
    }

    /// Every live game, sorted by name.
    pub fn games(&self) -> Vec<GameSummary> {
        let states: Vec<(String, Arc<Mutex<GameState>>)> = self
            .games
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut summaries: Vec<GameSummary> = states
            .into_iter()
            .map(|(name, state)| {
                let (actions, outstanding, backlog) = {
                    let state = state.lock();
                    (
                        state.catalogue.len(),
                        state.coordinator.outstanding().cloned(),
                        state.coordinator.backlog_len(),
                    )
                };
                let connections = self.registry.lock().connections(Some(&name)).len();
                GameSummary {
                    name,
                    connections,
                    actions,
                    outstanding_id: outstanding.as_ref().map(|inv| inv.id.clone()),
                    outstanding_action: outstanding.map(|inv| inv.action),
                    backlog,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    fn game_state(&self, game: &str) -> Result<Arc<Mutex<GameState>>, EngineError> {
        self.games
            .get(game)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::UnknownGame(game.to_owned()))
    }

    fn game_state_or_create(&self, game: &str) -> Arc<Mutex<GameState>> {
        let entry = self
            .games
            .entry(game.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(GameState::new(game, &self.config))));
        Arc::clone(entry.value())
    }
}
