//! Connection states (RFC 3501, section 3).
//!
//! ```text
//!    +----------------------+
//!    |connection established|
//!    +----------------------+
//!               ||
//!               \/
//!    +-----------------+
//!    |Not Authenticated|
//!    +-----------------+
//!     ||        || (LOGIN / AUTHENTICATE)
//!     ||        \/
//!     ||   +---------------+
//!     ||   | Authenticated |<=++
//!     ||   +---------------+  || (CLOSE / UNSELECT,
//!     ||     ||       ||      ||  failed SELECT)
//!     ||     ||       \/      ||
//!     ||     ||   +--------+  ||
//!     ||     ||   |Selected|==++
//!     ||     ||   +--------+
//!     ||     ||       ||
//!     \/     \/       \/ (LOGOUT, shutdown, timeout)
//!    +--------------------------------------+
//!    |               Logout                 |
//!    +--------------------------------------+
//! ```
//!
//! Transitions only ever run down this list, except for Selected, which drops
//! back to Authenticated.

use std::fmt::{Display, Formatter};

/// State of an IMAP4rev1 connection, as seen by the server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    /// The client must supply authentication credentials before most commands
    /// will be permitted.
    NotAuthenticated,

    /// The client is authenticated and must select a mailbox before commands
    /// that affect messages will be permitted.
    Authenticated,

    /// A mailbox has been selected to access.
    Selected,

    /// The connection is being terminated.
    Logout,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotAuthenticated => "not authenticated",
            Self::Authenticated => "authenticated",
            Self::Selected => "selected",
            Self::Logout => "logout",
        })
    }
}
