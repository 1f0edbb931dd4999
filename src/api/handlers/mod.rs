pub mod auth;
pub mod health;
pub mod me;
pub mod permissions;
pub mod root;

pub use self::health::health;
pub use self::me::me;
pub use self::root::root;
