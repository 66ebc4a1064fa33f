pub use sessions::{Sessions, Stamp};
pub use token::{SessionToken, SESSION_TOKEN_COOKIE, SESSION_TOKEN_HEADER};

mod sessions;
mod token;
