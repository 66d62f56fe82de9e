//! REST resources: one handler per HTTP verb, JSON in and out.
//!
//! A [`Resource`] is built once and shared by every route it is registered
//! under. Per-request state never lives on it: the handler receives a
//! fresh [`Call`] and answers with a [`Reply`], which is where a status
//! override or extra headers for this one response go.
//!
//! Dispatch runs in a fixed order:
//!
//! 1. a non-empty body must be `application/json`, else 415;
//! 2. the verb must be GET/POST/PUT/PATCH/DELETE with a handler, else 405;
//! 3. the pre-dispatch hook may rewrite the arguments or fail;
//! 4. the handler runs;
//! 5. a [`Response`] it returns is passed through untouched, anything else
//!    is encoded by the router's [`JsonCodec`] and given a status.
//!
//! Status selection: the reply's override, else the resource's, else the
//! per-verb default (PUT 201, everything else 200). A 200 with no body
//! becomes 204.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, error};

use crate::api_error::ApiError;
use crate::args::Args;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::json::{Document, JsonCodec};
use crate::method::Method;
use crate::request::Request;
use crate::response::{APPLICATION_JSON, Response};

// ── Call ──────────────────────────────────────────────────────────────────────

/// The request-scoped input of a resource handler.
#[derive(Debug)]
pub struct Call {
    method: Method,
    req: Request,
    args: Args,
}

impl Call {
    pub fn method(&self) -> Method { self.method }
    pub fn request(&self) -> &Request { &self.req }
    pub fn args(&self) -> &Args { &self.args }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Decodes the body with the router's codec.
    pub fn json(&self) -> Result<Value, ApiError> {
        self.req.codec().decode(self.req.body()).map_err(|_| invalid_json())
    }

    /// Decodes the body into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.req.codec().decode_as(self.req.body()).map_err(|_| invalid_json())
    }

    pub fn into_parts(self) -> (Request, Args) {
        (self.req, self.args)
    }
}

fn invalid_json() -> ApiError {
    ApiError::new("Request payload is not valid JSON")
}

// ── Reply ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Output {
    Empty,
    Document(Document),
    Response(Response),
}

/// What a resource handler answers with.
///
/// ```rust
/// use http::StatusCode;
/// use restle::Reply;
/// use serde_json::json;
///
/// Reply::json(json!({"id": 7})).with_status(StatusCode::CREATED);
/// Reply::empty();
/// ```
#[derive(Debug)]
pub struct Reply {
    output: Output,
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl Reply {
    /// No body: 204 unless a non-200 status applies.
    pub fn empty() -> Self {
        Self::from_output(Output::Empty)
    }

    /// A body for the codec. JSON `null` counts as no body.
    pub fn json(doc: impl Into<Document>) -> Self {
        Self::from_output(Output::Document(doc.into()))
    }

    pub fn from_serde<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::json(Document::from_serde(value))
    }

    /// A finished response; status, headers and encoding are left alone.
    pub fn response(res: Response) -> Self {
        Self::from_output(Output::Response(res))
    }

    /// Overrides the status for this response only.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds a header on top of the resource's headers.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    fn from_output(output: Output) -> Self {
        Self { output, status: None, headers: HeaderMap::new() }
    }
}

/// Conversion into a [`Reply`] for resource handler results.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply { Reply::response(self) }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply { Reply::empty() }
}

impl IntoReply for Document {
    fn into_reply(self) -> Reply { Reply::json(self) }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply { Reply::json(self) }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Reply {
        self.map_or_else(Reply::empty, IntoReply::into_reply)
    }
}

// ── Resource ──────────────────────────────────────────────────────────────────

type ReplyFuture = Pin<Box<dyn Future<Output = Result<Reply, ApiError>> + Send + 'static>>;
type MethodHandler = Arc<dyn Fn(Call) -> ReplyFuture + Send + Sync>;
type InitHook = Arc<dyn Fn(&Request, Args) -> Result<Args, ApiError> + Send + Sync>;

/// One API resource: a handler per verb plus response settings.
///
/// ```rust
/// use restle::{ApiError, Call, Reply, Resource};
/// use serde_json::json;
///
/// async fn fetch(call: Call) -> Result<Reply, ApiError> {
///     match call.args().get_i64("id") {
///         Some(id) => Ok(Reply::json(json!({"id": id}))),
///         None => Ok(Reply::json(json!([]))),
///     }
/// }
///
/// let widgets = Resource::builder("widgets").get(fetch).build();
/// assert_eq!(widgets.name(), "widgets");
/// ```
pub struct Resource {
    name: String,
    handlers: HashMap<Method, MethodHandler>,
    status_defaults: HashMap<Method, StatusCode>,
    status: Option<StatusCode>,
    headers: HeaderMap,
    mimetype: HeaderValue,
    init: Option<InitHook>,
}

impl Resource {
    pub fn builder(name: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource {
                name: name.into(),
                handlers: HashMap::new(),
                status_defaults: default_statuses(),
                status: None,
                headers: HeaderMap::new(),
                mimetype: APPLICATION_JSON,
                init: None,
            },
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Verbs with a handler, sorted.
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().copied().collect();
        methods.sort();
        methods
    }

    /// The status used when neither the reply nor the resource overrides it.
    pub fn default_status(&self, method: Method) -> StatusCode {
        self.status_defaults.get(&method).copied().unwrap_or(StatusCode::OK)
    }

    /// Turns one request into a response. `args` are the converted path
    /// parameters and route defaults.
    pub async fn dispatch(&self, req: Request, args: Args) -> Result<Response, Error> {
        let span = debug_span!("dispatch", resource = %self.name, method = req.method());
        self.dispatch_inner(req, args).instrument(span).await
    }

    async fn dispatch_inner(&self, req: Request, args: Args) -> Result<Response, Error> {
        if !req.body().is_empty()
            && !req.media_type().is_some_and(|m| m.eq_ignore_ascii_case("application/json"))
        {
            debug!(media_type = ?req.media_type(), "payload is not json");
            return Err(ApiError::unsupported_media_type().into());
        }

        let resolved = req.method()
            .parse::<Method>()
            .ok()
            .filter(|m| m.is_restful())
            .and_then(|m| self.handlers.get(&m).map(|h| (m, Arc::clone(h))));
        let Some((method, handler)) = resolved else {
            debug!("method not supported");
            return Err(ApiError::method_not_allowed().into());
        };

        let args = match &self.init {
            Some(init) => init(&req, args)?,
            None => args,
        };

        let codec = Arc::clone(&req.codec);
        let reply = handler(Call { method, req, args }).await?;
        self.build_response(method, reply, &codec)
    }

    fn build_response(&self, method: Method, reply: Reply, codec: &JsonCodec) -> Result<Response, Error> {
        let Reply { output, status, headers } = reply;
        let body = match output {
            Output::Response(res) => return Ok(res),
            Output::Empty => None,
            Output::Document(doc) if doc.is_null() => None,
            Output::Document(doc) => Some(codec.encode(&doc).inspect_err(|e| {
                error!(error = %e, "response is not encodable");
            })?),
        };

        let mut status = status
            .or(self.status)
            .unwrap_or_else(|| self.default_status(method));
        if status == StatusCode::OK && body.is_none() {
            status = StatusCode::NO_CONTENT;
        }
        debug!(status = status.as_u16(), "dispatched");

        let builder = Response::builder()
            .status(status)
            .headers(&self.headers)
            .headers(&headers);
        Ok(match body {
            Some(body) => builder.bytes(self.mimetype.clone(), body),
            None => builder.no_body(),
        })
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("methods", &self.methods())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("mimetype", &self.mimetype)
            .field("init", &self.init.is_some())
            .finish()
    }
}

fn default_statuses() -> HashMap<Method, StatusCode> {
    HashMap::from([
        (Method::Delete, StatusCode::OK),
        (Method::Get, StatusCode::OK),
        (Method::Patch, StatusCode::OK),
        (Method::Post, StatusCode::OK),
        (Method::Put, StatusCode::CREATED),
    ])
}

/// Router-side wrapper; the router stores resources behind [`BoxedHandler`].
struct Bound(Arc<Resource>);

impl ErasedHandler for Bound {
    fn call(&self, req: Request, args: Args) -> BoxFuture {
        let resource = Arc::clone(&self.0);
        Box::pin(async move { resource.dispatch(req, args).await })
    }
}

pub(crate) fn bind(resource: Arc<Resource>) -> BoxedHandler {
    Arc::new(Bound(resource))
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`Resource`].
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    pub fn get<F, Fut, R>(self, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.handler(Method::Get, handler)
    }

    pub fn post<F, Fut, R>(self, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.handler(Method::Post, handler)
    }

    pub fn put<F, Fut, R>(self, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.handler(Method::Put, handler)
    }

    pub fn patch<F, Fut, R>(self, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.handler(Method::Patch, handler)
    }

    pub fn delete<F, Fut, R>(self, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        self.handler(Method::Delete, handler)
    }

    /// Registers `handler` for `method`. Handlers for verbs outside
    /// GET/POST/PUT/PATCH/DELETE are stored but never dispatched to.
    pub fn handler<F, Fut, R>(mut self, method: Method, handler: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
        R: IntoReply + 'static,
    {
        let boxed: MethodHandler = Arc::new(move |call: Call| -> ReplyFuture {
            let fut = handler(call);
            Box::pin(async move { fut.await.map(IntoReply::into_reply) })
        });
        self.resource.handlers.insert(method, boxed);
        self
    }

    /// Pre-dispatch hook: runs after the content-type and method checks,
    /// before the handler. Returns the arguments the handler will see.
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, Args) -> Result<Args, ApiError> + Send + Sync + 'static,
    {
        self.resource.init = Some(Arc::new(hook));
        self
    }

    /// Status for every response of this resource, unless a reply overrides it.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.resource.status = Some(status);
        self
    }

    pub fn status_default(mut self, method: Method, status: StatusCode) -> Self {
        self.resource.status_defaults.insert(method, status);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.resource.headers.append(name, value);
        self
    }

    /// Content type of encoded bodies. Defaults to `application/json`.
    pub fn mimetype(mut self, mimetype: HeaderValue) -> Self {
        self.resource.mimetype = mimetype;
        self
    }

    pub fn build(self) -> Resource {
        self.resource
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION};
    use serde_json::json;

    use super::*;

    async fn nothing(_call: Call) -> Result<(), ApiError> {
        Ok(())
    }

    async fn widget(call: Call) -> Result<Value, ApiError> {
        Ok(json!({"id": call.arg("id").cloned().unwrap_or(Value::Null), "name": "gear"}))
    }

    fn silent() -> Resource {
        Resource::builder("silent")
            .get(nothing)
            .post(nothing)
            .put(nothing)
            .patch(nothing)
            .delete(nothing)
            .build()
    }

    async fn run(resource: &Resource, req: Request) -> Result<Response, Error> {
        resource.dispatch(req, Args::new()).await
    }

    fn api_status(result: Result<Response, Error>) -> StatusCode {
        match result {
            Err(Error::Api(err)) => err.status(),
            other => panic!("expected an api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_verbs_are_405() {
        let resource = silent();
        for method in ["OPTIONS", "HEAD", "TRACE", "CONNECT", "PURGE", "get"] {
            let status = api_status(run(&resource, Request::new(method, "/")).await);
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
        }
    }

    #[tokio::test]
    async fn missing_handler_is_405() {
        let resource = Resource::builder("ro").get(nothing).build();
        let status = api_status(run(&resource, Request::new("DELETE", "/")).await);
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn non_json_payload_is_415_for_every_verb() {
        let resource = silent();
        for method in ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"] {
            let req = Request::new(method, "/")
                .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
                .with_body("hello");
            let status = api_status(run(&resource, req).await);
            assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE, "{method}");
        }

        let untyped = Request::new("POST", "/").with_body("{}");
        assert_eq!(api_status(run(&resource, untyped).await), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn json_with_charset_is_accepted() {
        let resource = silent();
        let req = Request::new("POST", "/")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"))
            .with_body("{}");
        assert_eq!(run(&resource, req).await.unwrap().status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn empty_output_status_depends_on_verb() {
        let resource = silent();
        for method in ["GET", "POST", "PATCH", "DELETE"] {
            let res = run(&resource, Request::new(method, "/")).await.unwrap();
            assert_eq!(res.status(), StatusCode::NO_CONTENT, "{method}");
            assert!(res.body().is_empty());
            assert!(res.content_type().is_none());
        }
        let res = run(&resource, Request::new("PUT", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(res.body().is_empty());
        assert!(res.content_type().is_none());
    }

    #[tokio::test]
    async fn value_is_encoded_with_default_status() {
        let resource = Resource::builder("widgets").get(widget).put(widget).build();
        let mut args = Args::new();
        args.insert("id", 3);

        let res = resource.dispatch(Request::new("GET", "/"), args.clone()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.content_type(), Some("application/json"));
        let expected = JsonCodec::default().encode_value(&json!({"id": 3, "name": "gear"})).unwrap();
        assert_eq!(res.body(), expected.as_slice());

        let res = resource.dispatch(Request::new("PUT", "/"), args).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn null_counts_as_empty() {
        async fn null(_call: Call) -> Result<Value, ApiError> {
            Ok(Value::Null)
        }
        let resource = Resource::builder("n").get(null).build();
        let res = run(&resource, Request::new("GET", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn reply_override_beats_resource_override() {
        async fn accepted(_call: Call) -> Result<Reply, ApiError> {
            Ok(Reply::json(json!({"queued": true})).with_status(StatusCode::ACCEPTED))
        }
        let resource = Resource::builder("jobs")
            .post(accepted)
            .get(widget)
            .delete(nothing)
            .status(StatusCode::CREATED)
            .build();

        let res = run(&resource, Request::new("POST", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let res = run(&resource, Request::new("GET", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let res = run(&resource, Request::new("DELETE", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn explicit_200_without_body_is_still_204() {
        async fn ok_empty(_call: Call) -> Result<Reply, ApiError> {
            Ok(Reply::empty().with_status(StatusCode::OK))
        }
        let resource = Resource::builder("r").put(ok_empty).build();
        let res = run(&resource, Request::new("PUT", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn responses_pass_through() {
        async fn teapot(_call: Call) -> Result<Response, ApiError> {
            Ok(Response::builder().status(StatusCode::IM_A_TEAPOT).text("short and stout"))
        }
        let resource = Resource::builder("pot")
            .get(teapot)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
            .build();
        let res = run(&resource, Request::new("GET", "/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
        assert!(res.headers().get(CACHE_CONTROL).is_none());
    }

    #[tokio::test]
    async fn headers_and_mimetype_apply() {
        async fn created(_call: Call) -> Result<Reply, ApiError> {
            Ok(Reply::json(json!({"id": 1}))
                .with_header(LOCATION, HeaderValue::from_static("/widgets/1")))
        }
        let resource = Resource::builder("w")
            .post(created)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
            .mimetype(HeaderValue::from_static("application/vnd.widgets+json"))
            .build();
        let res = run(&resource, Request::new("POST", "/")).await.unwrap();
        assert_eq!(res.headers()[CACHE_CONTROL], "no-store");
        assert_eq!(res.headers()[LOCATION], "/widgets/1");
        assert_eq!(res.content_type(), Some("application/vnd.widgets+json"));
    }

    #[tokio::test]
    async fn init_runs_after_checks_and_rewrites_args() {
        async fn echo_id(call: Call) -> Result<Value, ApiError> {
            Ok(call.arg("id").cloned().unwrap_or(Value::Null))
        }
        let resource = Resource::builder("r")
            .get(echo_id)
            .init(|_req, mut args| {
                match args.get_i64("id") {
                    Some(id) if id < 0 => return Err(ApiError::new("negative id")),
                    Some(id) => { args.insert("id", id * 10); }
                    None => {}
                }
                Ok(args)
            })
            .build();

        let mut args = Args::new();
        args.insert("id", 4);
        let res = resource.dispatch(Request::new("GET", "/"), args).await.unwrap();
        assert_eq!(res.body(), b"40");

        let mut args = Args::new();
        args.insert("id", -1);
        let err = resource.dispatch(Request::new("GET", "/"), args).await.unwrap_err();
        assert!(matches!(err, Error::Api(e) if e.status() == StatusCode::BAD_REQUEST));

        // method check wins over the hook
        let status = api_status(run(&resource, Request::new("POST", "/")).await);
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        async fn missing(_call: Call) -> Result<Value, ApiError> {
            Err(ApiError::not_found("Widget not found"))
        }
        let resource = Resource::builder("w").get(missing).build();
        let status = api_status(run(&resource, Request::new("GET", "/")).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sets_encode_and_unknown_types_fail() {
        async fn tags(_call: Call) -> Result<Document, ApiError> {
            Ok(HashSet::from(["a"]).into())
        }
        async fn socket(_call: Call) -> Result<Document, ApiError> {
            Ok(Document::opaque::<std::net::TcpStream>())
        }
        let resource = Resource::builder("t").get(tags).post(socket).build();

        let res = run(&resource, Request::new("GET", "/")).await.unwrap();
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!(["a"]));

        let err = run(&resource, Request::new("POST", "/")).await.unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[tokio::test]
    async fn call_decodes_body() {
        #[derive(serde::Deserialize)]
        struct NewWidget { name: String }

        async fn create(call: Call) -> Result<Value, ApiError> {
            let new: NewWidget = call.json_as()?;
            Ok(json!({"name": new.name}))
        }
        let resource = Resource::builder("w").post(create).build();

        let res = run(&resource, Request::new("POST", "/").with_json(r#"{"name":"cog"}"#)).await.unwrap();
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["name"], "cog");

        let status = api_status(run(&resource, Request::new("POST", "/").with_json("{")).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
