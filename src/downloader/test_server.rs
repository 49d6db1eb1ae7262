//! Serveur HTTP local pour les tests: `HEAD` + `GET` avec `Range`, pannes injectables.
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hyper::header::{CONTENT_LENGTH, CONTENT_RANGE, ETAG, RANGE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use md5::{Digest, Md5};

/// Comportements anormaux du serveur.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// répond toujours 500 au segment qui commence à cet offset
    pub failing_start: Option<u64>,
    /// les N premiers GET répondent 503
    pub flaky_gets: usize,
    /// le segment qui commence à cet offset ne répond qu'après `stall`
    pub stalled_start: Option<u64>,
    pub stall: Duration,
    /// ignore l'en-tête Range et renvoie le fichier complet en 200
    pub ignore_range: bool,
    pub omit_etag: bool,
    pub etag_override: Option<String>,
    pub head_status: Option<StatusCode>,
    /// délai avant la réponse à un HEAD
    pub head_delay: Duration,
    /// décale le début du segment servi (et de son Content-Range) de N octets
    pub range_shift: u64,
    /// délai appliqué à chaque GET, pour mesurer la concurrence
    pub latency: Duration,
}

struct State {
    data: Vec<u8>,
    etag: String,
    behaviour: Behaviour,
    gets: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct TestServer {
    pub url: String,
    state: Arc<State>,
}

impl TestServer {
    pub async fn start(data: Vec<u8>, behaviour: Behaviour) -> Self {
        let etag = behaviour
            .etag_override
            .clone()
            .unwrap_or_else(|| format!("{:x}", Md5::digest(&data)));
        let state = Arc::new(State {
            data,
            etag,
            behaviour,
            gets: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let service_state = Arc::clone(&state);
        let make_service = make_service_fn(move |_conn| {
            let state = Arc::clone(&service_state);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle(req, Arc::clone(&state))))
            }
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let addr = server.local_addr();
        tokio::spawn(server);

        Self {
            url: format!("http://{}/fixture.bin", addr),
            state,
        }
    }

    pub fn get_count(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

fn status_only(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

async fn handle(req: Request<Body>, state: Arc<State>) -> Result<Response<Body>, Infallible> {
    let behaviour = &state.behaviour;
    let total = state.data.len();

    let method = req.method().clone();
    match method {
        Method::HEAD => {
            if !behaviour.head_delay.is_zero() {
                tokio::time::sleep(behaviour.head_delay).await;
            }
            let mut resp = status_only(behaviour.head_status.unwrap_or(StatusCode::OK));
            resp.headers_mut().insert(CONTENT_LENGTH, total.into());
            if !behaviour.omit_etag {
                let etag = format!("\"{}\"", state.etag);
                if let Ok(value) = etag.parse() {
                    resp.headers_mut().insert(ETAG, value);
                }
            }
            Ok(resp)
        }
        Method::GET => {
            let n = state.gets.fetch_add(1, Ordering::SeqCst);
            let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_in_flight.fetch_max(current, Ordering::SeqCst);
            let range = req
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range);
            let resp = serve_get(range, &state, n).await;
            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(resp)
        }
        _ => Ok(status_only(StatusCode::METHOD_NOT_ALLOWED)),
    }
}

async fn serve_get(range: Option<(u64, u64)>, state: &State, n: usize) -> Response<Body> {
    let behaviour = &state.behaviour;
    if !behaviour.latency.is_zero() {
        tokio::time::sleep(behaviour.latency).await;
    }
    if n < behaviour.flaky_gets {
        return status_only(StatusCode::SERVICE_UNAVAILABLE);
    }

    let total = state.data.len() as u64;
    match range {
        Some((start, end)) if !behaviour.ignore_range && start < total => {
            if behaviour.failing_start == Some(start) {
                return status_only(StatusCode::INTERNAL_SERVER_ERROR);
            }
            if behaviour.stalled_start == Some(start) {
                tokio::time::sleep(behaviour.stall).await;
            }
            let start = (start + behaviour.range_shift).min(total - 1);
            let end = end.min(total - 1).max(start);
            let body = state.data[start as usize..=end as usize].to_vec();
            let mut resp = status_only(StatusCode::PARTIAL_CONTENT);
            resp.headers_mut().insert(CONTENT_LENGTH, body.len().into());
            if let Ok(value) = format!("bytes {}-{}/{}", start, end, total).parse() {
                resp.headers_mut().insert(CONTENT_RANGE, value);
            }
            *resp.body_mut() = Body::from(body);
            resp
        }
        Some(_) if !behaviour.ignore_range => status_only(StatusCode::RANGE_NOT_SATISFIABLE),
        _ => Response::new(Body::from(state.data.clone())),
    }
}
