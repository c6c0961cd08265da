//! Per-destination outbound buffer with catalogue-mutation coalescing.
//!
//! Envelopes wait here until the transport drains them. `register` and
//! `unregister` envelopes never occupy more than one slot per destination:
//! a new one merges into the queued entry of the same kind, which keeps the
//! position of its first occurrence.
//!
//! Because a merge can move a mutation ahead of an opposite-kind entry queued
//! in between, the merged names are also removed from any later entry of the
//! opposite kind. Applying the drained sequence therefore yields the same
//! catalogue as applying every enqueued mutation one at a time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use serde_json::json;
use tracing::debug;

use crate::action::Action;
use crate::envelope::{CommandKind, Envelope, RegisterData, UnregisterData};

/// Outcome of [`OutboundQueue::enqueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued as a new entry at the back.
    Appended,
    /// Folded into an already-queued entry of the same kind.
    Merged,
}

/// Buffer of not-yet-sent envelopes, keyed by destination.
#[derive(Debug)]
pub struct OutboundQueue<D> {
    queues: HashMap<D, VecDeque<Envelope>>,
}

impl<D: Eq + Hash> OutboundQueue<D> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    /// Queue an envelope for `destination`, merging catalogue mutations.
    pub fn enqueue(&mut self, destination: D, mut envelope: Envelope) -> Enqueued {
        let queue = self.queues.entry(destination).or_default();

        let kind = envelope.kind();
        if let Some(mut incoming) = Mutation::decode(&envelope) {
            if let Some(pos) = queue.iter().position(|e| e.kind() == kind) {
                match merge_at(queue, pos, incoming) {
                    Ok(()) => {
                        debug!(command = %envelope.command, position = pos, "coalesced queued envelope");
                        return Enqueued::Merged;
                    }
                    Err(unmerged) => incoming = unmerged,
                }
            }
            if incoming.collapse() {
                incoming.write_into(&mut envelope);
            }
        }

        queue.push_back(envelope);
        Enqueued::Appended
    }

    /// Remove and return everything queued for `destination`, in order.
    pub fn drain(&mut self, destination: &D) -> Vec<Envelope> {
        self.queues
            .remove(destination)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop everything queued for `destination`. Returns how many entries were discarded.
    pub fn release(&mut self, destination: &D) -> usize {
        self.queues.remove(destination).map_or(0, |q| q.len())
    }

    /// Number of entries queued for `destination`.
    pub fn len(&self, destination: &D) -> usize {
        self.queues.get(destination).map_or(0, VecDeque::len)
    }

    /// Whether nothing is queued for any destination.
    pub fn is_empty(&self) -> bool {
        self.queues.values().all(VecDeque::is_empty)
    }

    /// Remove and return everything queued for every destination.
    pub fn drain_all(&mut self) -> Vec<(D, Vec<Envelope>)> {
        self.queues
            .drain()
            .filter(|(_, q)| !q.is_empty())
            .map(|(d, q)| (d, Vec::from(q)))
            .collect()
    }
}

impl<D: Eq + Hash> Default for OutboundQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `incoming` into the entry at `pos`. Hands `incoming` back, leaving
/// the queue untouched, if the queued entry cannot be decoded.
fn merge_at(queue: &mut VecDeque<Envelope>, pos: usize, incoming: Mutation) -> Result<(), Mutation> {
    let Some(mut existing) = Mutation::decode(&queue[pos]) else {
        return Err(incoming);
    };
    let touched = incoming.names();
    existing.absorb(incoming);
    existing.write_into(&mut queue[pos]);

    // Later opposite-kind entries must not override the names just moved forward.
    let mut idx = pos + 1;
    while idx < queue.len() {
        let opposite = queue[idx].kind().is_coalescible() && queue[idx].kind() != queue[pos].kind();
        if opposite {
            if let Some(mut later) = Mutation::decode(&queue[idx]) {
                later.remove_names(&touched);
                if later.is_empty() {
                    let _ = queue.remove(idx);
                    continue;
                }
                later.write_into(&mut queue[idx]);
            }
        }
        idx += 1;
    }
    Ok(())
}

/// Decoded view of a catalogue-mutation envelope.
enum Mutation {
    Register(Vec<Action>),
    Unregister(Vec<String>),
}

impl Mutation {
    fn decode(envelope: &Envelope) -> Option<Self> {
        match envelope.kind() {
            CommandKind::Register => envelope
                .payload::<RegisterData>()
                .ok()
                .map(|d| Self::Register(d.actions)),
            CommandKind::Unregister => envelope
                .payload::<UnregisterData>()
                .ok()
                .map(|d| Self::Unregister(d.action_names)),
            _ => None,
        }
    }

    fn names(&self) -> HashSet<String> {
        match self {
            Self::Register(actions) => actions.iter().map(|a| a.name.clone()).collect(),
            Self::Unregister(names) => names.iter().cloned().collect(),
        }
    }

    /// Union by name; the incoming definition wins for names present in both.
    fn absorb(&mut self, incoming: Self) {
        match (&mut *self, incoming) {
            (Self::Register(existing), Self::Register(new)) => existing.extend(new),
            (Self::Unregister(existing), Self::Unregister(new)) => existing.extend(new),
            _ => return,
        }
        let _ = self.collapse();
    }

    /// One entry per name, at the position of its first occurrence. For
    /// registers the last definition of a name is kept. Returns whether
    /// anything was dropped.
    fn collapse(&mut self) -> bool {
        match self {
            Self::Register(actions) => {
                let before = actions.len();
                let mut slots: HashMap<String, usize> = HashMap::with_capacity(before);
                let mut kept: Vec<Action> = Vec::with_capacity(before);
                for action in actions.drain(..) {
                    if let Some(&slot) = slots.get(&action.name) {
                        kept[slot] = action;
                    } else {
                        let _ = slots.insert(action.name.clone(), kept.len());
                        kept.push(action);
                    }
                }
                *actions = kept;
                actions.len() != before
            }
            Self::Unregister(names) => {
                let before = names.len();
                let mut seen = HashSet::with_capacity(before);
                names.retain(|name| seen.insert(name.clone()));
                names.len() != before
            }
        }
    }

    fn remove_names(&mut self, names: &HashSet<String>) {
        match self {
            Self::Register(actions) => actions.retain(|a| !names.contains(&a.name)),
            Self::Unregister(existing) => existing.retain(|n| !names.contains(n)),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Register(actions) => actions.is_empty(),
            Self::Unregister(names) => names.is_empty(),
        }
    }

    fn write_into(self, envelope: &mut Envelope) {
        envelope.data = Some(match self {
            Self::Register(actions) => json!({ "actions": actions }),
            Self::Unregister(names) => json!({ "action_names": names }),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ForceData, commands};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const DEST: &str = "conn_1";

    fn action(name: &str, version: u32) -> Action {
        Action::new(name, format!("v{version}"))
    }

    fn register(actions: &[Action]) -> Envelope {
        Envelope::register("G", actions)
    }

    fn unregister(names: &[&str]) -> Envelope {
        let names: Vec<String> = names.iter().map(|s| (*s).to_owned()).collect();
        Envelope::unregister("G", &names)
    }

    fn registered_names(env: &Envelope) -> Vec<(String, String)> {
        env.payload::<RegisterData>()
            .unwrap()
            .actions
            .into_iter()
            .map(|a| (a.name, a.description))
            .collect()
    }

    fn unregistered_names(env: &Envelope) -> Vec<String> {
        env.payload::<UnregisterData>().unwrap().action_names
    }

    #[test]
    fn registers_merge_newest_wins() {
        let mut q = OutboundQueue::new();
        assert_eq!(
            q.enqueue(DEST, register(&[action("a", 1), action("b", 1)])),
            Enqueued::Appended
        );
        assert_eq!(
            q.enqueue(DEST, register(&[action("b", 2), action("c", 2)])),
            Enqueued::Merged
        );

        let drained = q.drain(&DEST);
        assert_eq!(drained.len(), 1);
        assert_eq!(
            registered_names(&drained[0]),
            vec![
                ("a".to_owned(), "v1".to_owned()),
                ("b".to_owned(), "v2".to_owned()),
                ("c".to_owned(), "v2".to_owned()),
            ]
        );
    }

    #[test]
    fn repeated_name_in_queued_register_still_yields_newest() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, register(&[action("a", 1), action("a", 2)]));
        assert_eq!(q.enqueue(DEST, register(&[action("a", 3)])), Enqueued::Merged);

        let drained = q.drain(&DEST);
        assert_eq!(
            registered_names(&drained[0]),
            vec![("a".to_owned(), "v3".to_owned())]
        );
    }

    #[test]
    fn appended_entries_collapse_repeated_names() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, register(&[action("a", 1), action("b", 1), action("a", 2)]));
        let _ = q.enqueue(DEST, unregister(&["x", "y", "x"]));

        let drained = q.drain(&DEST);
        assert_eq!(
            registered_names(&drained[0]),
            vec![
                ("a".to_owned(), "v2".to_owned()),
                ("b".to_owned(), "v1".to_owned()),
            ]
        );
        assert_eq!(unregistered_names(&drained[1]), vec!["x", "y"]);
    }

    #[test]
    fn unregisters_merge_as_set_union() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, unregister(&["a"]));
        assert_eq!(q.enqueue(DEST, unregister(&["a", "b"])), Enqueued::Merged);

        let drained = q.drain(&DEST);
        assert_eq!(drained.len(), 1);
        assert_eq!(unregistered_names(&drained[0]), vec!["a", "b"]);
    }

    #[test]
    fn other_commands_never_merge() {
        let mut q = OutboundQueue::new();
        let force = ForceData {
            action_names: vec!["a".into()],
            ..ForceData::default()
        };
        let _ = q.enqueue(DEST, Envelope::force("G", &force));
        assert_eq!(
            q.enqueue(DEST, Envelope::force("G", &force)),
            Enqueued::Appended
        );
        let _ = q.enqueue(DEST, Envelope::reregister_all());
        let _ = q.enqueue(DEST, Envelope::reregister_all());
        assert_eq!(q.len(&DEST), 4);
    }

    #[test]
    fn merged_entry_keeps_first_position() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, register(&[action("a", 1)]));
        let _ = q.enqueue(DEST, Envelope::context("G", "hello", true));
        let _ = q.enqueue(DEST, register(&[action("b", 1)]));

        let drained = q.drain(&DEST);
        let commands: Vec<&str> = drained.iter().map(|e| e.command.as_str()).collect();
        assert_eq!(commands, vec![commands::REGISTER, commands::CONTEXT]);
        assert_eq!(registered_names(&drained[0]).len(), 2);
    }

    #[test]
    fn register_after_unregister_survives_merge() {
        // register(a) → unregister(a) → register(a') leaves a' registered.
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, register(&[action("a", 1)]));
        let _ = q.enqueue(DEST, unregister(&["a", "z"]));
        let _ = q.enqueue(DEST, register(&[action("a", 2)]));

        let drained = q.drain(&DEST);
        assert_eq!(drained.len(), 2);
        assert_eq!(
            registered_names(&drained[0]),
            vec![("a".to_owned(), "v2".to_owned())]
        );
        assert_eq!(unregistered_names(&drained[1]), vec!["z"]);
    }

    #[test]
    fn emptied_opposite_entry_is_dropped() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, unregister(&["a"]));
        let _ = q.enqueue(DEST, register(&[action("a", 1)]));
        let _ = q.enqueue(DEST, unregister(&["a"]));

        let drained = q.drain(&DEST);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].command, commands::UNREGISTER);
    }

    #[test]
    fn destinations_are_independent() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue("c1", register(&[action("a", 1)]));
        assert_eq!(q.enqueue("c2", register(&[action("b", 1)])), Enqueued::Appended);
        assert_eq!(q.len(&"c1"), 1);
        assert_eq!(q.len(&"c2"), 1);
    }

    #[test]
    fn drain_empties_destination() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, Envelope::reregister_all());
        assert!(!q.is_empty());
        assert_eq!(q.drain(&DEST).len(), 1);
        assert!(q.drain(&DEST).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn drain_all_takes_every_destination() {
        let mut q: OutboundQueue<u32> = OutboundQueue::new();
        let _ = q.enqueue(1, Envelope::reregister_all());
        let _ = q.enqueue(2, Envelope::reregister_all());
        let _ = q.enqueue(2, Envelope::context("G", "hi", true));
        let mut drained = q.drain_all();
        drained.sort_by_key(|(d, _)| *d);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].1.len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn release_discards_everything() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, Envelope::reregister_all());
        let _ = q.enqueue(DEST, register(&[action("a", 1)]));
        assert_eq!(q.release(&DEST), 2);
        assert_eq!(q.len(&DEST), 0);
        assert_eq!(q.release(&DEST), 0);
    }

    #[test]
    fn undecodable_entry_is_not_merged() {
        let mut q = OutboundQueue::new();
        let _ = q.enqueue(DEST, Envelope::new(commands::REGISTER));
        assert_eq!(
            q.enqueue(DEST, register(&[action("a", 1)])),
            Enqueued::Appended
        );
        assert_eq!(q.len(&DEST), 2);
    }

    // ── Catalogue law ───────────────────────────────────────────────

    #[derive(Clone, Debug)]
    enum Op {
        Register(Vec<(u8, u32)>),
        Unregister(Vec<u8>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec((0u8..5, 0u32..100), 1..4).prop_map(Op::Register),
            prop::collection::vec(0u8..5, 1..4).prop_map(Op::Unregister),
        ]
    }

    fn name(n: u8) -> String {
        format!("action_{n}")
    }

    fn to_envelope(op: &Op) -> Envelope {
        match op {
            Op::Register(defs) => register(
                &defs
                    .iter()
                    .map(|(n, v)| action(&name(*n), *v))
                    .collect::<Vec<_>>(),
            ),
            Op::Unregister(names) => {
                Envelope::unregister("G", &names.iter().map(|n| name(*n)).collect::<Vec<_>>())
            }
        }
    }

    fn apply(catalogue: &mut BTreeMap<String, String>, envelope: &Envelope) {
        match envelope.kind() {
            CommandKind::Register => {
                for a in envelope.payload::<RegisterData>().unwrap().actions {
                    let _ = catalogue.insert(a.name, a.description);
                }
            }
            CommandKind::Unregister => {
                for n in envelope.payload::<UnregisterData>().unwrap().action_names {
                    let _ = catalogue.remove(&n);
                }
            }
            _ => {}
        }
    }

    proptest! {
        #[test]
        fn coalesced_application_matches_sequential(ops in prop::collection::vec(op_strategy(), 0..20)) {
            let mut sequential = BTreeMap::new();
            let mut q = OutboundQueue::new();
            for op in &ops {
                let env = to_envelope(op);
                apply(&mut sequential, &env);
                let _ = q.enqueue(DEST, env);
            }

            let drained = q.drain(&DEST);
            prop_assert!(drained.iter().filter(|e| e.kind() == CommandKind::Register).count() <= 1);
            prop_assert!(drained.iter().filter(|e| e.kind() == CommandKind::Unregister).count() <= 1);

            let mut coalesced = BTreeMap::new();
            for env in &drained {
                apply(&mut coalesced, env);
            }
            prop_assert_eq!(sequential, coalesced);
        }
    }
}
