use std::convert::Infallible;

use chrono::Duration;
use rocket::{
    http::{Cookie, SameSite},
    request::{self, FromRequest},
    Request,
};

pub const SESSION_TOKEN_COOKIE: &str = "session_token";
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// The opaque token a client presents to prove its session.
///
/// Read from the `session_token` cookie, falling back to the
/// `X-Session-Token` header. A request carrying neither yields the empty
/// token, so that the authorization guard and not routing decides how to
/// reject it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken(pub String);

impl SessionToken {
    /// Wrap this token into a cookie living as long as the session.
    pub fn into_cookie(self, ttl: Duration) -> Cookie<'static> {
        Cookie::build((SESSION_TOKEN_COOKIE, self.0))
            .max_age(rocket::time::Duration::seconds(ttl.num_seconds()))
            .same_site(SameSite::Strict)
            .http_only(true)
            .build()
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionToken {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = req
            .cookies()
            .get(SESSION_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .or_else(|| req.headers().get_one(SESSION_TOKEN_HEADER).map(str::to_string))
            .unwrap_or_default();
        request::Outcome::Success(Self(token))
    }
}
