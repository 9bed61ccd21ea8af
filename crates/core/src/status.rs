//! Lifecycle status enums stored as lowercase TEXT columns.
//!
//! Every enum round-trips through [`as_str`](BeaconStatus::as_str) and
//! [`FromStr`](std::str::FromStr) so the database layer can persist the
//! value verbatim and reject anything it does not recognise.

use std::str::FromStr;

use crate::error::StoreError;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the persisted string form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $val ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $val => Ok($name::$variant), )+
                    other => Err(StoreError::Integrity(format!(
                        "unknown {} '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Beacon lifecycle status.
    BeaconStatus {
        Draft = "draft",
        Active = "active",
        Paused = "paused",
        Expired = "expired",
        Archived = "archived",
    }
}

define_status_enum! {
    /// Ticket status. `scanned` and `transferred` are terminal.
    TicketStatus {
        Valid = "valid",
        Scanned = "scanned",
        Transferred = "transferred",
    }
}

define_status_enum! {
    /// Peer-to-peer resale record status.
    ResaleStatus {
        Active = "active",
        Sold = "sold",
        Withdrawn = "withdrawn",
    }
}

define_status_enum! {
    /// Marketplace listing status.
    ListingStatus {
        Draft = "draft",
        Active = "active",
        SoldOut = "sold_out",
        Closed = "closed",
    }
}

define_status_enum! {
    /// Order status. `refunded` and `cancelled` are terminal.
    OrderStatus {
        Created = "created",
        Paid = "paid",
        Refunded = "refunded",
        Cancelled = "cancelled",
    }
}

define_status_enum! {
    /// One-way connection request status.
    ConnectionStatus {
        Pending = "pending",
        Accepted = "accepted",
        Declined = "declined",
    }
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Refunded | OrderStatus::Cancelled)
    }
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TicketStatus::Valid)
    }
}
