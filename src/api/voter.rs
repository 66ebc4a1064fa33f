use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{Cast, CastReply, GetBox, GetBoxReply, GetMixes, GetMixesReply},
        auth::SessionToken,
        election::Ballot,
        id::LedgerId,
    },
    service::Service,
};

pub fn routes() -> Vec<Route> {
    routes![cast, get_box, get_mixes]
}

#[post("/elections/<id>/ballots", data = "<ballot>", format = "json")]
async fn cast(
    service: &State<Arc<Service>>,
    token: SessionToken,
    id: LedgerId,
    ballot: Json<Ballot>,
) -> Result<Json<CastReply>> {
    let req = Cast {
        token: token.0,
        id,
        ballot: ballot.into_inner(),
    };
    Ok(Json(service.cast(req).await?))
}

#[get("/elections/<id>/box")]
async fn get_box(
    service: &State<Arc<Service>>,
    token: SessionToken,
    id: LedgerId,
) -> Result<Json<GetBoxReply>> {
    let req = GetBox { token: token.0, id };
    Ok(Json(service.get_box(req).await?))
}

#[get("/elections/<id>/mixes")]
async fn get_mixes(
    service: &State<Arc<Service>>,
    token: SessionToken,
    id: LedgerId,
) -> Result<Json<GetMixesReply>> {
    let req = GetMixes { token: token.0, id };
    Ok(Json(service.get_mixes(req).await?))
}
