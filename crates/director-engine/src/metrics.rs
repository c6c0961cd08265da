//! Metric names recorded by the engine.

/// Commands received (counter, labels: command).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Commands that failed or were dropped (counter, labels: command, code).
pub const COMMAND_ERRORS_TOTAL: &str = "command_errors_total";
/// Invoke envelopes handed to the transport (counter).
pub const INVOCATIONS_SENT_TOTAL: &str = "invocations_sent_total";
/// Invocation outcomes (counter, labels: outcome).
pub const INVOCATION_RESULTS_TOTAL: &str = "invocation_results_total";
/// Force requests discarded for lack of a registered candidate (counter).
pub const FORCE_DROPPED_TOTAL: &str = "force_dropped_total";
/// Connections evicted by the heartbeat (counter).
pub const HEARTBEAT_EVICTIONS_TOTAL: &str = "heartbeat_evictions_total";
/// Outbound envelopes the transport refused (counter).
pub const OUTBOUND_DROPS_TOTAL: &str = "outbound_drops_total";
