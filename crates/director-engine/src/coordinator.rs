//! Per-game invocation state machine.
//!
//! A game has at most one invocation outstanding. A force request arriving
//! while one is outstanding waits in a FIFO backlog. Each transition returns
//! the list of [`Effect`]s the caller must carry out (arm a timer, send an
//! invoke, log a drop); the coordinator itself never touches I/O or timers,
//! so every transition is testable without a runtime.
//!
//! ```text
//!            force (valid candidate)
//!   Idle ───────────────────────────────▶ Awaiting(dispatched = false)
//!    ▲                                       │ timer due
//!    │ success / abandon, backlog empty      ▼
//!    └─────────────────────────────────── Awaiting(dispatched = true)
//!                                            │ failure → fresh ID, same action
//!                                            └──────▶ Awaiting(dispatched = false)
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use director_core::InvocationId;
use director_core::envelope::{ForceData, InvokeData, ResultData};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::catalogue::ActionCatalogue;
use crate::errors::CoordinatorError;

/// A request to invoke one of several candidate actions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForceRequest {
    /// Candidate action names.
    pub candidates: Vec<String>,
    /// Prompt describing what the game wants done.
    pub query: String,
    /// Optional serialized game state.
    pub state: Option<String>,
    /// Forget query/state once the invocation completes.
    pub ephemeral_context: bool,
    /// JSON-encoded arguments forwarded in the invoke.
    pub data: Option<String>,
}

impl ForceRequest {
    /// Request choosing among `candidates` with no query or arguments.
    pub fn new<S: Into<String>>(candidates: impl IntoIterator<Item = S>) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Attach JSON-encoded arguments.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Attach the prompt.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

impl From<ForceData> for ForceRequest {
    fn from(force: ForceData) -> Self {
        Self {
            candidates: force.action_names,
            query: force.query,
            state: force.state,
            ephemeral_context: force.ephemeral_context,
            data: None,
        }
    }
}

/// One attempt at executing an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Fresh per attempt; retries get a new one.
    pub id: InvocationId,
    /// Game the invocation belongs to.
    pub game: String,
    /// Chosen action.
    pub action: String,
    /// JSON-encoded arguments.
    pub data: Option<String>,
    /// When this attempt was created.
    pub created_at: DateTime<Utc>,
    /// Zero for the first attempt, incremented per retry.
    pub attempt: u32,
}

impl Invocation {
    fn new(game: &str, action: &str, data: Option<String>) -> Self {
        Self {
            id: InvocationId::new(),
            game: game.to_owned(),
            action: action.to_owned(),
            data,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Next attempt at the same action, with a fresh ID.
    fn retry(&self) -> Self {
        Self {
            id: InvocationId::new(),
            created_at: Utc::now(),
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Wire payload for this invocation.
    pub fn to_invoke(&self) -> InvokeData {
        InvokeData {
            id: self.id.clone(),
            name: self.action.clone(),
            data: self.data.clone(),
        }
    }
}

/// Where the coordinator is in its cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Nothing outstanding.
    Idle,
    /// Waiting on `invocation`; `dispatched` once the invoke went out.
    Awaiting {
        /// The outstanding invocation.
        invocation: Invocation,
        /// Whether the settle timer has fired and the invoke was sent.
        dispatched: bool,
    },
}

/// Why an invocation was given up on without a success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbandonReason {
    /// The configured retry cap was reached.
    RetryLimit,
    /// The action was unregistered before the invoke could go out.
    Unregistered,
}

impl AbandonReason {
    /// Label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RetryLimit => "retry_limit",
            Self::Unregistered => "unregistered",
        }
    }
}

/// Side effect requested by a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Arm the settle timer; when it fires call [`InvocationCoordinator::on_due`].
    Schedule(Invocation),
    /// Transmit the invoke now.
    Send(Invocation),
    /// Request parked in the backlog.
    Queued {
        /// Backlog length after queueing.
        depth: usize,
    },
    /// A backlogged request was discarded; none of its candidates is registered.
    Dropped {
        /// Names the request offered.
        candidates: Vec<String>,
    },
    /// The outstanding invocation completed successfully.
    Completed(Invocation),
    /// The outstanding invocation was given up on.
    Abandoned {
        /// The invocation.
        invocation: Invocation,
        /// Why.
        reason: AbandonReason,
    },
}

/// Invocation state machine for a single game.
#[derive(Debug)]
pub struct InvocationCoordinator {
    game: String,
    state: CoordinatorState,
    backlog: VecDeque<ForceRequest>,
    max_retries: Option<u32>,
}

impl InvocationCoordinator {
    /// Idle coordinator for `game`. `max_retries: None` retries failures forever.
    pub fn new(game: impl Into<String>, max_retries: Option<u32>) -> Self {
        Self {
            game: game.into(),
            state: CoordinatorState::Idle,
            backlog: VecDeque::new(),
            max_retries,
        }
    }

    /// Current state.
    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// The outstanding invocation, if any.
    pub fn outstanding(&self) -> Option<&Invocation> {
        match &self.state {
            CoordinatorState::Idle => None,
            CoordinatorState::Awaiting { invocation, .. } => Some(invocation),
        }
    }

    /// Whether nothing is outstanding.
    pub fn is_idle(&self) -> bool {
        self.state == CoordinatorState::Idle
    }

    /// Number of parked force requests.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Handle a force request.
    ///
    /// While awaiting, the request is parked. When idle, one valid candidate is
    /// picked uniformly at random and scheduled; with no valid candidate the
    /// request is rejected and the state is unchanged.
    pub fn on_force<R: Rng + ?Sized>(
        &mut self,
        request: ForceRequest,
        catalogue: &ActionCatalogue,
        rng: &mut R,
    ) -> Result<Vec<Effect>, CoordinatorError> {
        if !self.is_idle() {
            self.backlog.push_back(request);
            return Ok(vec![Effect::Queued {
                depth: self.backlog.len(),
            }]);
        }

        match self.start(&request, catalogue, rng) {
            Some(invocation) => Ok(vec![Effect::Schedule(invocation)]),
            None => Err(CoordinatorError::NoValidCandidates {
                candidates: request.candidates,
            }),
        }
    }

    /// Handle the settle timer firing for `id`.
    ///
    /// Stale timers (a different ID is outstanding, or it was already sent)
    /// produce no effects. An action unregistered in the meantime is abandoned.
    pub fn on_due<R: Rng + ?Sized>(
        &mut self,
        id: &InvocationId,
        catalogue: &ActionCatalogue,
        rng: &mut R,
    ) -> Vec<Effect> {
        let CoordinatorState::Awaiting {
            invocation,
            dispatched,
        } = &mut self.state
        else {
            return Vec::new();
        };
        if invocation.id != *id || *dispatched {
            return Vec::new();
        }

        if !catalogue.contains(&invocation.action) {
            let mut effects = vec![Effect::Abandoned {
                invocation: invocation.clone(),
                reason: AbandonReason::Unregistered,
            }];
            self.advance(catalogue, rng, &mut effects);
            return effects;
        }

        *dispatched = true;
        vec![Effect::Send(invocation.clone())]
    }

    /// Handle a result reported by the game.
    ///
    /// Success completes the invocation and starts the next backlogged request.
    /// Failure re-arms the same action under a fresh ID, unless a retry cap is
    /// configured and reached, in which case it is abandoned like a success.
    pub fn on_result<R: Rng + ?Sized>(
        &mut self,
        result: &ResultData,
        catalogue: &ActionCatalogue,
        rng: &mut R,
    ) -> Result<Vec<Effect>, CoordinatorError> {
        let Some(outstanding) = self.outstanding() else {
            return Err(CoordinatorError::NoOutstanding {
                received: result.id.clone(),
            });
        };
        if outstanding.id != result.id {
            return Err(CoordinatorError::Mismatch {
                expected: outstanding.id.clone(),
                received: result.id.clone(),
            });
        }
        let finished = outstanding.clone();

        let mut effects = Vec::new();
        if result.success {
            effects.push(Effect::Completed(finished));
            self.advance(catalogue, rng, &mut effects);
        } else if self.max_retries.is_some_and(|cap| finished.attempt >= cap) {
            effects.push(Effect::Abandoned {
                invocation: finished,
                reason: AbandonReason::RetryLimit,
            });
            self.advance(catalogue, rng, &mut effects);
        } else {
            let retry = finished.retry();
            self.state = CoordinatorState::Awaiting {
                invocation: retry.clone(),
                dispatched: false,
            };
            effects.push(Effect::Schedule(retry));
        }
        Ok(effects)
    }

    /// Drop the outstanding invocation and the backlog.
    pub fn reset(&mut self) -> usize {
        self.state = CoordinatorState::Idle;
        let dropped = self.backlog.len();
        self.backlog.clear();
        dropped
    }

    fn start<R: Rng + ?Sized>(
        &mut self,
        request: &ForceRequest,
        catalogue: &ActionCatalogue,
        rng: &mut R,
    ) -> Option<Invocation> {
        let action = select_action(&request.candidates, catalogue, rng)?;
        let invocation = Invocation::new(&self.game, action, request.data.clone());
        self.state = CoordinatorState::Awaiting {
            invocation: invocation.clone(),
            dispatched: false,
        };
        Some(invocation)
    }

    /// Go idle, then start the first backlogged request that still has a valid candidate.
    fn advance<R: Rng + ?Sized>(
        &mut self,
        catalogue: &ActionCatalogue,
        rng: &mut R,
        effects: &mut Vec<Effect>,
    ) {
        self.state = CoordinatorState::Idle;
        while let Some(next) = self.backlog.pop_front() {
            if let Some(invocation) = self.start(&next, catalogue, rng) {
                effects.push(Effect::Schedule(invocation));
                return;
            }
            effects.push(Effect::Dropped {
                candidates: next.candidates,
            });
        }
    }
}

/// Pick uniformly among the distinct candidates present in `catalogue`.
pub fn select_action<'a, R: Rng + ?Sized>(
    candidates: &'a [String],
    catalogue: &ActionCatalogue,
    rng: &mut R,
) -> Option<&'a str> {
    let mut valid: Vec<&str> = Vec::with_capacity(candidates.len());
    for name in candidates {
        if catalogue.contains(name) && !valid.contains(&name.as_str()) {
            valid.push(name);
        }
    }
    valid.choose(rng).copied()
}
