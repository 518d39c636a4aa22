// M&C database adapter
//
// The observatory's monitor-and-control database is PostgreSQL and owned by
// the site; this crate only registers observations and files into it.

mod connection;
mod registry;

pub use connection::create_pool;
pub use registry::PgObservatoryDb;
