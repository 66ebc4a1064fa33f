use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{Open, OpenReply, OpenRequest, Shuffle, ShuffleReply},
        auth::SessionToken,
        id::LedgerId,
    },
    service::Service,
};

pub fn routes() -> Vec<Route> {
    #[allow(unused_mut)]
    let mut routes = routes![open, shuffle];
    #[cfg(feature = "decrypt")]
    routes.extend(routes![decrypt]);
    routes
}

#[post("/elections", data = "<request>", format = "json")]
async fn open(
    service: &State<Arc<Service>>,
    token: SessionToken,
    request: Json<OpenRequest>,
) -> Result<Json<OpenReply>> {
    let req = Open::new(token.0, request.into_inner());
    Ok(Json(service.open(req).await?))
}

#[post("/elections/<id>/shuffle")]
async fn shuffle(
    service: &State<Arc<Service>>,
    token: SessionToken,
    id: LedgerId,
) -> Result<Json<ShuffleReply>> {
    let req = Shuffle { token: token.0, id };
    Ok(Json(service.shuffle(req).await?))
}

#[cfg(feature = "decrypt")]
#[post("/elections/<id>/decrypt")]
async fn decrypt(
    service: &State<Arc<Service>>,
    token: SessionToken,
    id: LedgerId,
) -> Result<Json<crate::model::api::DecryptReply>> {
    let req = crate::model::api::Decrypt { token: token.0, id };
    Ok(Json(service.decrypt(req).await?))
}
