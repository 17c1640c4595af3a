//! PostgreSQL source: snapshot coordination and catalog queries.

mod postgres;
mod tls;

pub use postgres::{PgSession, PgSnapshot, PgSnapshotSource};
pub use tls::make_tls_connect;
