//! `ripple-users` — user identity and the follow graph.
//!
//! The `User` entity owns registration validation, password checks, and the
//! API-token lifecycle. Storage goes through the [`store::UserStore`] port;
//! an in-memory implementation lives here for dev/test, the Postgres one in
//! `ripple-infra`.

pub mod store;
pub mod user;

pub use store::{InMemoryUserStore, UserStore, UserStoreError};
pub use user::{NewUser, User, UserUpdate};
