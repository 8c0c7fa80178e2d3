pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod store;
pub mod wal;

pub use engine::{BookingError, Engine, ErrorKind};
pub use store::{DurableStore, InMemoryStore, Store};
