//! Stable identities for entity-tree nodes and viewers.
//!
//! Every level of the tree matches mirror nodes against live nodes by one
//! of these ids, so ids must stay stable for the lifetime of the node they
//! name. Reused numbers are fine once the previous owner is gone.

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from its raw value.
            #[inline]
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

id_newtype!(
    /// Identity of a map (second-level container).
    MapId
);
id_newtype!(
    /// Identity of a robot (third-level actor).
    RobotId
);
id_newtype!(
    /// Identity of a sensor (fourth-level detector).
    SensorId
);
id_newtype!(
    /// Identity of a landmark. Assigned once at initialization and never
    /// reused while the landmark lives.
    LandmarkId
);
id_newtype!(
    /// Identity of a viewer attached to an entity tree.
    ViewerId
);
