use std::sync::Arc;

use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{Link, LinkReply, Login, LoginReply, Ping},
        auth::SessionToken,
    },
    service::Service,
};

pub fn routes() -> Vec<Route> {
    routes![ping, link, login]
}

#[post("/ping", data = "<ping>", format = "json")]
fn ping(service: &State<Arc<Service>>, ping: Json<Ping>) -> Json<Ping> {
    Json(service.ping(ping.into_inner()))
}

#[post("/link", data = "<link>", format = "json")]
async fn link(service: &State<Arc<Service>>, link: Json<Link>) -> Result<Json<LinkReply>> {
    Ok(Json(service.link(link.into_inner()).await?))
}

#[post("/login", data = "<login>", format = "json")]
async fn login(
    service: &State<Arc<Service>>,
    cookies: &CookieJar<'_>,
    login: Json<Login>,
) -> Result<Json<LoginReply>> {
    let reply = service.login(login.into_inner()).await?;
    let token = SessionToken::from(reply.token.clone());
    cookies.add(token.into_cookie(service.config().session_ttl()));
    Ok(Json(reply))
}
