//! Connection and invocation identifiers.
//!
//! Both wrap a `String` but are distinct types. Generated values are a short
//! prefix (`conn_`, `inv_`) followed by a UUID v7, so they sort by creation
//! time and never repeat within a process. Values received from a game are
//! accepted verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix carried by generated values.
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh, time-ordered value.
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, Uuid::now_v7().simple()))
            }

            /// Borrow the wire form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

prefixed_id!(
    /// One open channel between a game and the director.
    ConnectionId,
    "conn_"
);

prefixed_id!(
    /// One director-issued call of an action. Retries get a new one.
    InvocationId,
    "inv_"
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_invocation_ids_never_repeat() {
        let ids: HashSet<InvocationId> = (0..10_000).map(|_| InvocationId::new()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn generated_ids_carry_prefix_and_sort_by_age() {
        let older = ConnectionId::new();
        let newer = ConnectionId::new();
        assert!(older.as_str().starts_with(ConnectionId::PREFIX));
        assert!(InvocationId::default().as_str().starts_with("inv_"));
        assert!(older < newer);
    }

    #[test]
    fn wire_form_is_a_bare_string() {
        let id = InvocationId::from("from-the-game");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"from-the-game\"");
        let back: InvocationId = serde_json::from_str("\"from-the-game\"").unwrap();
        assert_eq!(back, id);
        assert_eq!(back.to_string(), "from-the-game");
    }
}
