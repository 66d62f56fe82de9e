//! Radix-tree request router with typed path segments.
//!
//! One matchit tree per HTTP method. Rules use `{name}` or
//! `{name:converter}` segments; the converter's pattern is checked after
//! the tree lookup and a mismatch makes the route miss. Converters whose
//! values contain `/` (`path`, `cidr`) compile to a catch-all and must end
//! the rule.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::header::ALLOW;
use http::{HeaderValue, StatusCode};
use indexmap::IndexMap;
use matchit::Router as MatchitRouter;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error};

use crate::api_error::ApiError;
use crate::args::Args;
use crate::converters::{Converter, Converters};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::json::JsonCodec;
use crate::method::Method;
use crate::request::Request;
use crate::resource::{self, Resource};
use crate::response::Response;

type ErrorHandler = Arc<dyn Fn(&ApiError, &JsonCodec) -> Response + Send + Sync>;

/// One registered `(method, rule)` pair, as reported by [`Router::routes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub rule: String,
    pub endpoint: String,
}

struct Param {
    name: String,
    converter: Arc<dyn Converter>,
    pattern: Regex,
}

struct Route {
    params: Vec<Param>,
    defaults: IndexMap<String, Value>,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Besides the routing table it owns the pieces every request needs: the
/// converter registry, the [`JsonCodec`] and the [`ApiError`] handler.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Route>>>,
    registered: Vec<RouteInfo>,
    converters: Converters,
    codec: Arc<JsonCodec>,
    error_handler: Option<ErrorHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            registered: Vec::new(),
            converters: Converters::new(),
            codec: Arc::new(JsonCodec::default()),
            error_handler: None,
        }
    }

    /// Register a plain handler for a method + rule pair. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics on an invalid rule; use [`route`](Self::route) to get the error.
    ///
    /// ```rust,no_run
    /// # use restle::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/users/{id:int}", get_user)
    ///     .on(Method::Post, "/users",          create_user);
    /// ```
    pub fn on(self, method: Method, rule: &str, handler: impl Handler) -> Self {
        self.route(method, rule, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible form of [`on`](Self::on).
    pub fn route(mut self, method: Method, rule: &str, handler: impl Handler) -> Result<Self, Error> {
        self.add_rule(rule, &[method], rule, IndexMap::new(), handler.into_boxed_handler())?;
        Ok(self)
    }

    /// Register a resource under `rule` for the given methods. This is the
    /// way to expose PATCH, which [`register_api`](crate::register_api)
    /// leaves out.
    pub fn resource<R>(mut self, methods: &[Method], rule: &str, resource: R) -> Result<Self, Error>
    where
        R: Into<Arc<Resource>>,
    {
        let resource = resource.into();
        let endpoint = resource.name().to_owned();
        self.add_rule(rule, methods, &endpoint, IndexMap::new(), resource::bind(resource))?;
        Ok(self)
    }

    pub fn converters_mut(&mut self) -> &mut Converters {
        &mut self.converters
    }

    /// Replaces the codec handed to every request and used for error bodies.
    pub fn json_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    /// Installs the converter for [`ApiError`]s. Without one they are
    /// unhandled failures and answer `500`.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ApiError, &JsonCodec) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Every registration, in order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.registered
    }

    pub(crate) fn add_rule(
        &mut self,
        rule: &str,
        methods: &[Method],
        endpoint: &str,
        defaults: IndexMap<String, Value>,
        handler: BoxedHandler,
    ) -> Result<(), Error> {
        let (tree_path, params) = compile_rule(rule, &self.converters)?;
        let route = Arc::new(Route { params, defaults, handler });
        for &method in methods {
            self.routes
                .entry(method)
                .or_default()
                .insert(tree_path.clone(), Arc::clone(&route))
                .map_err(|e| Error::route(rule, e.to_string()))?;
            self.registered.push(RouteInfo {
                method,
                rule: rule.to_owned(),
                endpoint: endpoint.to_owned(),
            });
        }
        Ok(())
    }

    fn find(&self, method: Method, path: &str) -> Option<(Arc<Route>, HashMap<String, String>, Args)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);

        let mut raw = HashMap::with_capacity(route.params.len());
        let mut args = Args::new();
        for (name, value) in &route.defaults {
            args.named.insert(name.clone(), value.clone());
        }
        for param in &route.params {
            let value = matched.params.get(&param.name)?;
            let value = urlencoding::decode(value).ok()?;
            if !param.pattern.is_match(&value) {
                return None;
            }
            args.named.insert(param.name.clone(), param.converter.to_value(&value));
            raw.insert(param.name.clone(), value.into_owned());
        }
        Some((route, raw, args))
    }

    fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routes
            .keys()
            .copied()
            .filter(|&m| self.find(m, path).is_some())
            .collect();
        methods.sort();
        methods
    }

    /// Routes one request and produces one response.
    ///
    /// Unknown paths answer 404, paths registered only under other methods
    /// answer 405 with an `Allow` header. [`ApiError`]s go through the error
    /// handler; any other failure is logged and answered with a bare 500.
    pub async fn handle(&self, mut req: Request) -> Response {
        let method = req.method().parse::<Method>().ok();
        let found = method.and_then(|m| self.find(m, req.path()));

        let Some((route, params, args)) = found else {
            return self.miss(&req);
        };

        req.params = params;
        req.codec = Arc::clone(&self.codec);
        let method_name = req.method.clone();
        let path = req.path.clone();

        let response = match route.handler.call(req, args).await {
            Ok(res) => res,
            Err(Error::Api(err)) => match &self.error_handler {
                Some(handler) => handler(&err, &self.codec),
                None => {
                    error!(method = %method_name, path = %path, error = %err, "unhandled api error");
                    Response::with_status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            Err(err) => {
                error!(method = %method_name, path = %path, error = %err, "request failed");
                Response::with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        debug!(method = %method_name, path = %path, status = response.status().as_u16(), "handled");
        response
    }

    fn miss(&self, req: &Request) -> Response {
        let allowed = self.allowed(req.path());
        let err = if allowed.is_empty() {
            ApiError::not_found("The requested URL was not found on the server")
        } else {
            ApiError::method_not_allowed()
        };
        debug!(method = req.method(), path = req.path(), status = err.status().as_u16(), "no route");

        let mut res = match &self.error_handler {
            Some(handler) => handler(&err, &self.codec),
            None => Response::with_status(err.status()),
        };
        if !allowed.is_empty() {
            let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                res.headers.insert(ALLOW, value);
            }
        }
        res
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.registered)
            .field("converters", &self.converters)
            .field("codec", &self.codec)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

// ── Rule compilation ──────────────────────────────────────────────────────────

/// Turns `/nets/{net:cidr}` into the matchit path `/nets/{*net}` plus the
/// converters to check afterwards.
fn compile_rule(rule: &str, converters: &Converters) -> Result<(String, Vec<Param>), Error> {
    if !rule.starts_with('/') {
        return Err(Error::route(rule, "must start with `/`"));
    }

    let segments: Vec<&str> = rule.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    let mut path = String::with_capacity(rule.len());
    let mut params: Vec<Param> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        path.push('/');
        let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            if segment.contains(['{', '}']) {
                return Err(Error::route(rule, "a parameter must span a whole segment"));
            }
            path.push_str(segment);
            continue;
        };

        let (name, spec) = inner.split_once(':').unwrap_or((inner, "default"));
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::route(rule, format!("bad parameter name `{name}`")));
        }
        if params.iter().any(|p| p.name == name) {
            return Err(Error::route(rule, format!("duplicate parameter `{name}`")));
        }

        let (conv_name, arg) = split_converter(spec);
        let converter = converters.build(rule, conv_name, arg)?;
        let pattern = Regex::new(&format!("^(?:{})$", converter.regex()))
            .map_err(|e| Error::route(rule, format!("bad pattern for `{name}`: {e}")))?;

        if converter.spans_segments() {
            if i != last {
                return Err(Error::route(rule, format!("`{name}` spans segments and must come last")));
            }
            path.push_str(&format!("{{*{name}}}"));
        } else {
            path.push_str(&format!("{{{name}}}"));
        }
        params.push(Param { name: name.to_owned(), converter, pattern });
    }

    Ok((path, params))
}

/// `regex("[a-z]+")` → (`regex`, `[a-z]+`); `int` → (`int`, none).
fn split_converter(spec: &str) -> (&str, Option<&str>) {
    let Some((name, rest)) = spec.split_once('(') else {
        return (spec.trim(), None);
    };
    let Some(arg) = rest.strip_suffix(')') else {
        return (spec.trim(), None);
    };
    let arg = arg.trim();
    let unquoted = arg
        .strip_prefix('"').and_then(|a| a.strip_suffix('"'))
        .or_else(|| arg.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')))
        .unwrap_or(arg);
    (name.trim(), Some(unquoted))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok(_req: Request) -> Response {
        Response::text("ok")
    }

    async fn echo(req: Request) -> Response {
        Response::text(req.param("name").unwrap_or("").to_owned())
    }

    #[test]
    fn split_converter_args() {
        assert_eq!(split_converter("int"), ("int", None));
        assert_eq!(split_converter(r#"regex("[a-z]{3}")"#), ("regex", Some("[a-z]{3}")));
        assert_eq!(split_converter("regex('a+')"), ("regex", Some("a+")));
        assert_eq!(split_converter("regex(a+)"), ("regex", Some("a+")));
    }

    #[test]
    fn compiles_catch_all_for_spanning_converters() {
        let mut converters = Converters::new();
        converters.extend_restle();
        let (path, params) = compile_rule("/nets/{net:cidr}", &converters).unwrap();
        assert_eq!(path, "/nets/{*net}");
        assert_eq!(params.len(), 1);

        let Err(err) = compile_rule("/nets/{net:cidr}/hosts", &converters) else {
            panic!("spanning parameter before the last segment compiled");
        };
        assert!(err.to_string().contains("must come last"), "{err}");
    }

    #[test]
    fn rejects_bad_rules() {
        let converters = Converters::new();
        assert!(compile_rule("widgets", &converters).is_err());
        assert!(compile_rule("/w/x{id}", &converters).is_err());
        assert!(compile_rule("/w/{id:nope}", &converters).is_err());
        assert!(compile_rule("/w/{id}/{id}", &converters).is_err());
        assert!(compile_rule("/w/{}", &converters).is_err());
    }

    #[tokio::test]
    async fn converter_mismatch_is_a_miss() {
        let router = Router::new().on(Method::Get, "/w/{id:int}", ok);
        assert_eq!(router.handle(Request::new("GET", "/w/12")).await.status(), StatusCode::OK);
        assert_eq!(router.handle(Request::new("GET", "/w/abc")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn params_are_percent_decoded() {
        let mut router = Router::new();
        router.converters_mut().extend_restle();
        let router = router.on(Method::Get, "/users/{name:email}", echo);
        let res = router.handle(Request::new("GET", "/users/ben%40example.com")).await;
        assert_eq!(res.body(), b"ben@example.com");
    }

    #[tokio::test]
    async fn other_methods_answer_405_with_allow() {
        let router = Router::new()
            .on(Method::Get, "/w", ok)
            .on(Method::Post, "/w", ok);
        let res = router.handle(Request::new("DELETE", "/w")).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[ALLOW], "GET, POST");

        let res = router.handle(Request::new("BREW", "/w")).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn conflicting_rules_fail() {
        let err = Router::new()
            .route(Method::Get, "/w/{id:int}", ok)
            .and_then(|r| r.route(Method::Get, "/w/{name}", ok))
            .unwrap_err();
        assert!(matches!(err, Error::Route { .. }));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn on_panics_on_invalid_rule() {
        let _ = Router::new().on(Method::Get, "no-slash", ok);
    }
}
