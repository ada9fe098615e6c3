pub mod db;
pub mod realtime;

pub use db::DbAdapter;
pub use realtime::BroadcastChangeFeed;
