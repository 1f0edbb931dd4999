//! Session endpoints: login and token refresh.

pub mod login;
pub mod refresh;
pub mod types;
pub mod utils;

pub use self::login::login;
pub use self::refresh::refresh;
