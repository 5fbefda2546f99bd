//! Hierarchical request dispatcher.
//!
//! A `Router` holds a table of locally registered endpoints plus a table of
//! mounted child routers. Dispatch is longest-prefix-wins among mounted
//! children, then exact local match, then trailing-slash-stripped match,
//! then a fallback not-found handler.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::main_thread::MainThread;
use crate::message::{Request, Response};
#[cfg(test)]
use crate::message::Status;

pub type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub default_value: Option<String>,
    pub examples: Vec<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
            default_value: None,
            examples: Vec::new(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "description": self.description,
            "required": self.required,
            "defaultValue": self.default_value,
            "examples": self.examples,
        })
    }
}

#[derive(Clone)]
struct RouteEntry {
    description: String,
    parameters: Vec<Parameter>,
    runs_on_main_thread: bool,
    handler: Handler,
}

impl RouteEntry {
    fn to_json(&self, path: &str) -> serde_json::Value {
        json!({
            "path": path,
            "description": self.description,
            "runsOnMainThread": self.runs_on_main_thread,
            "parameters": self.parameters.iter().map(Parameter::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Timeout applied to handlers trampolined onto the main-thread executor
/// (see the module-level main-thread discipline below).
pub const MAIN_THREAD_TIMEOUT: Duration = Duration::from_secs(30);

/// The request dispatcher. Both the root dispatcher and every sub-router
/// mounted beneath it are instances of this same type.
pub struct Router {
    description: String,
    base_path: std::sync::RwLock<String>,
    routes: HashMap<String, RouteEntry>,
    children: HashMap<String, Arc<Router>>,
    not_found_handler: Handler,
    main_thread: Arc<MainThread>,
    main_thread_timeout: Duration,
}

fn default_not_found_handler() -> Handler {
    Arc::new(|_req: &Request| Response::not_found())
}

impl Router {
    pub fn new(description: impl Into<String>, main_thread: Arc<MainThread>) -> Self {
        Self {
            description: description.into(),
            base_path: std::sync::RwLock::new(String::new()),
            routes: HashMap::new(),
            children: HashMap::new(),
            not_found_handler: default_not_found_handler(),
            main_thread,
            main_thread_timeout: MAIN_THREAD_TIMEOUT,
        }
    }

    /// Override the main-thread trampoline timeout (default 30s, matching
    /// the main-thread trampoline's production timeout). Exposed mainly so
    /// tests can exercise the timeout path without waiting 30 real seconds.
    pub fn set_main_thread_timeout(&mut self, timeout: Duration) {
        self.main_thread_timeout = timeout;
    }

    pub fn base_path(&self) -> String {
        self.base_path.read().unwrap().clone()
    }

    /// Register a local endpoint. Overwrites any existing entry at `path`.
    pub fn register(
        &mut self,
        path: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<Parameter>,
        runs_on_main_thread: bool,
        handler: Handler,
    ) {
        self.routes.insert(
            path.into(),
            RouteEntry {
                description: description.into(),
                parameters,
                runs_on_main_thread,
                handler,
            },
        );
    }

    /// Mount a child router at `prefix`. The trailing slash is stripped and
    /// the child's `base_path` is set to the normalized prefix.
    pub fn mount(&mut self, prefix: impl Into<String>, child: Arc<Router>) {
        let prefix = normalize_prefix(&prefix.into());
        *child.base_path.write().unwrap() = prefix.clone();
        self.children.insert(prefix, child);
    }

    pub fn set_not_found_handler(&mut self, handler: Handler) {
        self.not_found_handler = handler;
    }

    pub fn total_endpoint_count(&self) -> usize {
        self.routes.len()
            + self
                .children
                .values()
                .map(|c| c.total_endpoint_count())
                .sum::<usize>()
    }

    /// Longest mounted-prefix match against `path`. Returns the child and the
    /// stripped remainder path (empty remainder becomes `"/"`).
    fn match_child(&self, path: &str) -> Option<(&Arc<Router>, String)> {
        self.children
            .iter()
            .filter_map(|(prefix, child)| {
                if path == prefix {
                    Some((prefix.len(), child, "/".to_string()))
                } else if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                    if let Some(remainder) = rest.strip_prefix('/') {
                        let remainder = if remainder.is_empty() {
                            "/".to_string()
                        } else {
                            format!("/{remainder}")
                        };
                        Some((prefix.len(), child, remainder))
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .max_by_key(|(len, _, _)| *len)
            .map(|(_, child, remainder)| (child, remainder))
    }

    /// Dispatch a request. Never panics: handler panics are caught and
    /// surfaced as an `InternalError` response rather than a transport crash.
    pub async fn handle(&self, request: &Request) -> Response {
        if let Some((child, remainder)) = self.match_child(&request.path) {
            let child_request = request.with_path(remainder);
            return Box::pin(child.handle(&child_request)).await;
        }

        if let Some(entry) = self.routes.get(&request.path) {
            return self.invoke(entry, request).await;
        }

        if request.path.len() > 1 && request.path.ends_with('/') {
            let stripped = request.path.trim_end_matches('/');
            if let Some(entry) = self.routes.get(stripped) {
                return self.invoke(entry, request).await;
            }
        }

        if request.path == "/" {
            return Response::ok_json(self.router_info(self.index_deep(request)));
        }

        (self.not_found_handler)(request)
    }

    /// Root's `/` defaults to a deep listing but honors `?depth=shallow`.
    /// Every mounted sub-router's local `/` is always deep, per convention.
    fn index_deep(&self, request: &Request) -> bool {
        if !self.base_path().is_empty() {
            return true;
        }
        request
            .query_params
            .get("depth")
            .map(|d| d != "shallow")
            .unwrap_or(true)
    }

    async fn invoke(&self, entry: &RouteEntry, request: &Request) -> Response {
        if !entry.runs_on_main_thread || self.main_thread.is_current() {
            return run_handler_catching_panics(&entry.handler, request);
        }

        let handler = entry.handler.clone();
        let request = request.clone();
        let result = self
            .main_thread
            .run_with_timeout(self.main_thread_timeout, move || {
                run_handler_catching_panics(&handler, &request)
            })
            .await;

        match result {
            Some(response) => response,
            None => Response::internal_error("Request handler timed out"),
        }
    }

    /// Discoverable description of this router: own endpoints (always
    /// expanded) and children (summarized unless `deep`).
    pub fn router_info(&self, deep: bool) -> serde_json::Value {
        let endpoints: Vec<_> = self
            .routes
            .iter()
            .map(|(path, entry)| entry.to_json(path))
            .collect();

        let routers: Vec<_> = self
            .children
            .iter()
            .map(|(prefix, child)| {
                if deep {
                    let mut info = child.router_info(true);
                    info["path"] = json!(prefix);
                    info
                } else {
                    json!({
                        "path": prefix,
                        "description": child.description,
                        "endpointCount": child.total_endpoint_count(),
                    })
                }
            })
            .collect();

        json!({
            "path": self.base_path(),
            "description": self.description,
            "endpointCount": self.total_endpoint_count(),
            "endpoints": endpoints,
            "routers": routers,
        })
    }
}

fn normalize_prefix(prefix: &str) -> String {
    if prefix.len() > 1 {
        prefix.trim_end_matches('/').to_string()
    } else {
        prefix.to_string()
    }
}

fn run_handler_catching_panics(handler: &Handler, request: &Request) -> Response {
    let result = panic::catch_unwind(AssertUnwindSafe(|| handler(request)));
    match result {
        Ok(response) => response,
        Err(_) => {
            log::error!("request handler panicked while handling {}", request.path);
            Response::internal_error("Internal handler error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mt() -> Arc<MainThread> {
        Arc::new(MainThread::spawn())
    }

    fn echo_handler() -> Handler {
        Arc::new(|req: &Request| Response::ok_json(json!({ "path": req.path })))
    }

    #[tokio::test]
    async fn exact_and_trailing_slash_normalize_to_same_route() {
        let mut router = Router::new("root", mt());
        router.register("/stats", "stats", vec![], false, echo_handler());

        for path in ["/stats", "/stats/"] {
            let resp = router.handle(&Request::new(path)).await;
            assert_eq!(resp.status, Status::Ok);
        }
    }

    #[tokio::test]
    async fn root_trailing_slash_is_not_normalized_away() {
        let mut router = Router::new("root", mt());
        router.register("/", "root index", vec![], false, echo_handler());
        let resp = router.handle(&Request::new("/")).await;
        assert_eq!(resp.status, Status::Ok);
    }

    #[tokio::test]
    async fn sub_router_dispatch_preserves_query_body_metadata() {
        let mut child = Router::new("child", mt());
        child.register("/widgets", "widgets", vec![], false, echo_handler());
        let mut parent = Router::new("parent", mt());
        parent.mount("/files", Arc::new(child));

        let mut query = HashMap::new();
        query.insert("x".to_string(), "1".to_string());
        let req = Request::new("/files/widgets")
            .with_query_params(query)
            .with_body(vec![9, 9]);

        let resp = parent.handle(&req).await;
        assert_eq!(resp.status, Status::Ok);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["path"], "/widgets");
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let mut files = Router::new("files", mt());
        files.register("/", "files index", vec![], false, echo_handler());
        let mut files_nested = Router::new("files-nested", mt());
        files_nested.register("/", "nested index", vec![], false, {
            Arc::new(|_req: &Request| Response::ok_json(json!({ "who": "nested" })))
        });

        let mut parent = Router::new("parent", mt());
        parent.mount("/files", Arc::new(files));
        parent.mount("/files/nested", Arc::new(files_nested));

        let resp = parent.handle(&Request::new("/files/nested")).await;
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["who"], "nested");
    }

    #[tokio::test]
    async fn unmatched_path_uses_not_found_handler() {
        let router = Router::new("root", mt());
        let resp = router.handle(&Request::new("/does-not-exist")).await;
        assert_eq!(resp.status, Status::NotFound);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "Endpoint not found");
    }

    #[tokio::test]
    async fn panicking_handler_becomes_internal_error() {
        let mut router = Router::new("root", mt());
        router.register(
            "/boom",
            "boom",
            vec![],
            false,
            Arc::new(|_req: &Request| panic!("kaboom")),
        );
        let resp = router.handle(&Request::new("/boom")).await;
        assert_eq!(resp.status, Status::InternalError);
    }

    #[tokio::test]
    async fn main_thread_handler_observes_main_thread() {
        let mt = mt();
        let mut router = Router::new("root", mt.clone());
        let observed = Arc::new(AtomicUsize::new(0));
        let observed2 = observed.clone();
        let mt_for_check = mt.clone();
        router.register(
            "/ui",
            "ui-only",
            vec![],
            true,
            Arc::new(move |_req: &Request| {
                if mt_for_check.is_current() {
                    observed2.store(1, Ordering::SeqCst);
                }
                Response::ok_json(json!({}))
            }),
        );

        let resp = router.handle(&Request::new("/ui")).await;
        assert_eq!(resp.status, Status::Ok);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn main_thread_handler_timeout_yields_internal_error() {
        let mt = mt();
        let mut router = Router::new("root", mt);
        router.set_main_thread_timeout(Duration::from_millis(200));
        router.register(
            "/slow",
            "slow",
            vec![],
            true,
            Arc::new(|_req: &Request| {
                std::thread::sleep(Duration::from_secs(2));
                Response::ok_json(json!({}))
            }),
        );

        let started = std::time::Instant::now();
        let resp = router.handle(&Request::new("/slow")).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(resp.status, Status::InternalError);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn total_endpoint_count_sums_children() {
        let mut child = Router::new("child", mt());
        child.register("/a", "a", vec![], false, echo_handler());
        child.register("/b", "b", vec![], false, echo_handler());

        let mut parent = Router::new("parent", mt());
        parent.register("/c", "c", vec![], false, echo_handler());
        parent.mount("/child", Arc::new(child));

        assert_eq!(parent.total_endpoint_count(), 3);
    }
}
