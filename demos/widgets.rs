//! In-memory widget service.
//!
//! ```text
//! cargo run --example widgets
//! curl -s localhost:5000/widgets
//! curl -s -XPOST -H 'content-type: application/json' -d '{"name":"cog"}' localhost:5000/widgets
//! curl -s -XPUT  -H 'content-type: application/json' -d '{"name":"gear"}' localhost:5000/widgets/1
//! curl -s -XDELETE localhost:5000/widgets/1
//! curl -s localhost:5000/networks/10.0.0.0/8
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use http::StatusCode;
use http::header::{CACHE_CONTROL, HeaderValue, LOCATION};
use restle::{
    restle, ApiError, ApiRoute, Call, Document, Method, Reply, Resource, Router, Server,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Widget {
    #[serde(default)]
    id: u64,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Default)]
struct Store {
    widgets: Mutex<BTreeMap<u64, Widget>>,
}

impl Store {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Widget>> {
        self.widgets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn widget_id(call: &Call) -> Result<u64, ApiError> {
    call.arg("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ApiError::new("widget id must be an integer"))
}

fn missing(id: u64) -> ApiError {
    let mut payload = serde_json::Map::new();
    payload.insert("id".to_owned(), id.into());
    ApiError::not_found(format!("widget {id} does not exist")).with_payload(payload)
}

fn widgets(store: Arc<Store>) -> Resource {
    let (get_store, post_store, put_store, delete_store) =
        (Arc::clone(&store), Arc::clone(&store), Arc::clone(&store), store);

    Resource::builder("widgets")
        .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .get(move |call: Call| {
            let store = Arc::clone(&get_store);
            async move {
                let widgets = store.lock();
                if call.args().is_null("id") {
                    let all: Vec<&Widget> = widgets.values().collect();
                    return Ok(Reply::from_serde(&all));
                }
                let id = widget_id(&call)?;
                let widget = widgets.get(&id).ok_or_else(|| missing(id))?;
                Ok::<_, ApiError>(Reply::from_serde(widget))
            }
        })
        .post(move |call: Call| {
            let store = Arc::clone(&post_store);
            async move {
                let mut widget: Widget = call.json_as()?;
                let mut widgets = store.lock();
                widget.id = widgets.keys().next_back().map_or(1, |last| last + 1);
                let location = HeaderValue::try_from(format!("/widgets/{}", widget.id))
                    .map_err(|_| ApiError::new("bad widget id"))?;
                widgets.insert(widget.id, widget.clone());
                Ok::<_, ApiError>(
                    Reply::from_serde(&widget)
                        .with_status(StatusCode::CREATED)
                        .with_header(LOCATION, location),
                )
            }
        })
        .put(move |call: Call| {
            let store = Arc::clone(&put_store);
            async move {
                let id = widget_id(&call)?;
                let mut widget: Widget = call.json_as()?;
                widget.id = id;
                store.lock().insert(id, widget);
                Ok::<_, ApiError>(())
            }
        })
        .delete(move |call: Call| {
            let store = Arc::clone(&delete_store);
            async move {
                let id = widget_id(&call)?;
                store.lock().remove(&id).map(|_| ()).ok_or_else(|| missing(id))
            }
        })
        .build()
}

fn networks() -> Resource {
    Resource::builder("networks")
        .get(|call: Call| async move {
            let net = call.args().get_str("net").unwrap_or_default().to_owned();
            let (addr, prefix) = net.split_once('/').unwrap_or((net.as_str(), "32"));
            Ok::<_, ApiError>(Document::from(vec![
                Document::from(addr),
                Document::from(prefix.parse::<i64>().unwrap_or(32)),
                Document::from(Utc::now()),
            ]))
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), restle::Error> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(Store::default());
    let app = restle(Router::new())
        .api(ApiRoute::new("widgets", "/widgets"), widgets(store))?
        .resource(&[Method::Get], "/networks/{net:cidr}", networks())?;

    for route in app.routes() {
        tracing::info!(method = %route.method, rule = %route.rule, endpoint = %route.endpoint, "route");
    }

    Server::bind("127.0.0.1:5000")?.serve(app).await
}
