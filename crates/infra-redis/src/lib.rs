// Redis adapter: queues, purgatory, telescope state and the hashpipe
// control bus all live in the same Redis instance on site.

mod connection;
mod store;

pub use connection::connect;
pub use store::RedisStore;
