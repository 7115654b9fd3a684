//! A process-global pool of idle, logged-in sessions kept around so a new
//! job opening the same site doesn't pay the connect/login round trip
//! again, plus the mechanism by which a higher-priority job can reclaim a
//! connection a lower-priority job is sitting on but not using.

mod pool;
mod slot;

pub use pool::Pool;
pub use slot::PooledSession;
