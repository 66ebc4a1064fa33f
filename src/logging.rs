//! Per-node access logging for the HTTP front.

use std::{
    fmt::{Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

use crate::overlay::ServerIdentity;

/// Identifies one request among those handled by a node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request-local bookkeeping, cached on the request when it arrives.
#[derive(Debug, Clone, Copy)]
struct Arrival {
    id: RequestId,
    at: Instant,
}

/// Logs every request and response of one node, tagged with the node's
/// address, a per-node request number and the handling time.
#[derive(Debug)]
pub struct LoggerFairing {
    node: ServerIdentity,
    counter: AtomicUsize,
}

impl LoggerFairing {
    pub fn new(node: ServerIdentity) -> Self {
        Self {
            node,
            counter: AtomicUsize::new(0),
        }
    }

    /// Take the next request number. Wraps around on overflow.
    fn next(&self) -> RequestId {
        RequestId(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    fn arrival(&self, req: &Request<'_>) -> Arrival {
        *req.local_cache(|| Arrival {
            id: self.next(),
            at: Instant::now(),
        })
    }
}

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let protocol = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let ip = &rocket.config().address;
        let port = &rocket.config().port;
        info!("[{}] Listening on {protocol}://{ip}:{port}", self.node);
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let Arrival { id, .. } = self.arrival(req);
        info!("[{}] ->req{id} {} {}", self.node, req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let Arrival { id, at } = self.arrival(req);
        let code = res.status();
        let route = match req.route() {
            Some(r) => match r.name {
                Some(ref name) => format!("{name} ({})", r.uri),
                None => r.uri.to_string(),
            },
            None => "UNKNOWN ROUTE".to_string(),
        };
        let elapsed = at.elapsed().as_millis();
        let log_msg = format!("[{}] <-rsp{id} {code} {route} in {elapsed}ms", self.node);
        match code.class() {
            StatusClass::ServerError => error!("{log_msg}"),
            StatusClass::ClientError => warn!("{log_msg}"),
            _ => info!("{log_msg}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("[{}] Shutdown requested, stopping gracefully...", self.node);
    }
}
