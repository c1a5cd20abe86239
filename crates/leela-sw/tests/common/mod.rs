//! Scripted in-memory fetcher shared by the scenario tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use http::{HeaderMap, HeaderValue, StatusCode};
use leela_net::{Fetcher, NetError, Request, Response, Url};
use leela_sw::{ServiceWorker, WorkerConfig};
use tokio::sync::watch;

pub const ORIGIN: &str = "https://leela.test/";

#[derive(Clone)]
struct Scripted {
    status: StatusCode,
    body: String,
    content_type: &'static str,
}

/// Fetcher answering from a script, with an offline switch and a gate that
/// holds every fetch until released.
#[derive(Clone)]
pub struct ScriptedFetcher {
    routes: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<Request>>>,
    online: Arc<AtomicBool>,
    gate: Arc<watch::Sender<bool>>,
    waiting: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            online: Arc::new(AtomicBool::new(true)),
            gate: Arc::new(gate),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script a response for a path (relative to [`ORIGIN`]) or absolute URL.
    pub fn respond(&self, target: &str, status: u16, body: &str) -> &Self {
        self.respond_typed(target, status, body, "text/plain")
    }

    pub fn respond_html(&self, target: &str, body: &str) -> &Self {
        self.respond_typed(target, 200, body, "text/html")
    }

    fn respond_typed(
        &self,
        target: &str,
        status: u16,
        body: &str,
        content_type: &'static str,
    ) -> &Self {
        self.routes.lock().unwrap().insert(
            url(target).to_string(),
            Scripted {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
                content_type,
            },
        );
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Hold every fetch until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Fetches currently parked at the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Yield until `count` fetches are parked at the gate, or give up.
    pub async fn wait_for_parked(&self, count: usize) -> usize {
        for _ in 0..100 {
            if self.waiting() >= count {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.waiting()
    }

    /// Number of fetches that reached the network, by URL.
    pub fn calls_to(&self, target: &str) -> usize {
        let wanted = url(target);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == wanted)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, request: Request) -> impl Future<Output = Result<Response, NetError>> + Send {
        let this = self.clone();
        async move {
            let mut gate = this.gate.subscribe();
            this.waiting.fetch_add(1, Ordering::SeqCst);
            let _ = gate.wait_for(|open| *open).await;
            this.waiting.fetch_sub(1, Ordering::SeqCst);

            this.calls.lock().unwrap().push(request.clone());

            if !this.online.load(Ordering::SeqCst) {
                return Err(NetError::Offline(request.url.to_string()));
            }

            let scripted = this
                .routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned();
            Ok(match scripted {
                Some(s) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(
                        http::header::CONTENT_TYPE,
                        HeaderValue::from_static(s.content_type),
                    );
                    Response::new(request.url, s.status, headers, s.body)
                }
                None => Response::new(request.url, StatusCode::NOT_FOUND, HeaderMap::new(), ""),
            })
        }
    }
}

pub fn url(target: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(target).unwrap()
}

pub fn get(target: &str) -> Request {
    Request::get(url(target))
}

pub fn navigate(target: &str) -> Request {
    get(target).accept("text/html,application/xhtml+xml,*/*;q=0.8")
}

/// Default configuration for [`ORIGIN`].
pub fn config() -> WorkerConfig {
    WorkerConfig::for_origin(Url::parse(ORIGIN).unwrap())
}

/// Route worker logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("leela_sw=debug")
        .with_test_writer()
        .try_init();
}

pub fn worker(fetcher: &ScriptedFetcher) -> ServiceWorker<ScriptedFetcher> {
    init_tracing();
    ServiceWorker::new(config(), fetcher.clone()).unwrap()
}

pub fn body(response: &Response) -> String {
    response.text().unwrap()
}
