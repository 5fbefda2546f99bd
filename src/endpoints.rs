//! Demo handlers standing in for the host app's real hierarchy/files/
//! userdefaults/permissions endpoints. These exercise the router, log
//! store, and address lookup end-to-end but carry no domain logic of
//! their own; the core treats every handler as opaque.

use std::sync::Arc;

use crate::address::{self, Registry};
use crate::log_store::{FetchOptions, LogStore};
use crate::message::{Request, Response};
use crate::router::{Handler, Parameter, Router};

/// Registers `/info`, `/echo`, `/logs`, and `/objects` on `router`, plus
/// placeholder sub-routers at `/files`, `/hierarchy`, `/userdefaults`, and
/// `/permissions` so the root's `routerInfo` advertises the same top-level
/// shape the host application exposes.
pub fn register_demo_endpoints(
    router: &mut Router,
    main_thread: Arc<crate::main_thread::MainThread>,
    log_store: Arc<LogStore>,
    registry: Arc<Registry>,
) {
    router.register(
        "/info",
        "Process and build information",
        vec![],
        false,
        info_handler(),
    );

    router.register(
        "/echo",
        "Echoes the `message` query parameter back as JSON",
        vec![Parameter::new(
            "message",
            "text to echo back",
            false,
        )],
        false,
        echo_handler(),
    );

    router.register(
        "/logs",
        "Fetch session log entries",
        vec![
            Parameter::new("type", "exact-match type filter", false),
            Parameter::new("textPattern", "SQL LIKE pattern over text", false),
            Parameter::new("newestFirst", "\"true\" or \"false\", default true", false),
        ],
        false,
        logs_handler(log_store),
    );

    router.register(
        "/objects",
        "Resolve a live object by hex address",
        vec![
            Parameter::new("address", "hex address, e.g. 0x1008", true),
            Parameter::new("class", "expected class name", true),
        ],
        false,
        objects_handler(registry),
    );

    for prefix in ["/files", "/hierarchy", "/userdefaults", "/permissions"] {
        let name = prefix.trim_start_matches('/');
        let child = Router::new(format!("{name} introspection (demo)"), main_thread.clone());
        router.mount(prefix, Arc::new(child));
    }
}

fn info_handler() -> Handler {
    Arc::new(|_req: &Request| {
        Response::ok_json(serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }))
    })
}

fn echo_handler() -> Handler {
    Arc::new(|req: &Request| {
        let message = req.query_params.get("message").cloned().unwrap_or_default();
        Response::ok_json(serde_json::json!({ "message": message }))
    })
}

fn logs_handler(log_store: Arc<LogStore>) -> Handler {
    Arc::new(move |req: &Request| {
        let mut options = FetchOptions::new();
        options.entry_type = req.query_params.get("type").cloned();
        options.text_pattern = req.query_params.get("textPattern").cloned();
        if let Some(flag) = req.query_params.get("newestFirst") {
            options.newest_first = flag != "false";
        }

        match log_store.fetch(&options) {
            Ok(entries) => Response::ok_json(serde_json::json!({ "entries": entries })),
            Err(err) => Response::internal_error(err.to_string()),
        }
    })
}

fn objects_handler(registry: Arc<Registry>) -> Handler {
    Arc::new(move |req: &Request| {
        let (Some(address_param), Some(class)) = (
            req.query_params.get("address"),
            req.query_params.get("class"),
        ) else {
            return Response::bad_request("both address and class are required");
        };

        let Some(parsed) = address::parse_address(address_param) else {
            return Response::bad_request("address is not valid hex");
        };

        match registry.lookup(parsed, class) {
            Some(handle) => Response::ok_json(serde_json::json!({
                "address": address::address_string(parsed),
                "class": handle.class(),
            })),
            None => Response::not_found(),
        }
    })
}
