//! Conventional CRUD routes for a resource.
//!
//! | Method | Rule | Meaning |
//! |---|---|---|
//! | `GET` | `/widgets` | list, `id` is `null` |
//! | `POST` | `/widgets` | create |
//! | `GET` | `/widgets/{id:int}` | fetch one |
//! | `PUT` | `/widgets/{id:int}` | replace |
//! | `DELETE` | `/widgets/{id:int}` | delete |
//!
//! PATCH is not wired up; register it explicitly with
//! [`Router::resource`](crate::Router::resource).

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Error;
use crate::method::Method;
use crate::resource::{self, Resource};
use crate::router::Router;

/// Where and how a resource is mounted by [`register_api`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRoute {
    endpoint: String,
    url: String,
    pk: String,
    pk_type: String,
}

impl ApiRoute {
    /// Primary key `id` of type `int`. `url` may end in `/` or not.
    pub fn new(endpoint: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            url: url.into(),
            pk: "id".to_owned(),
            pk_type: "int".to_owned(),
        }
    }

    pub fn pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = pk.into();
        self
    }

    /// Converter name for the primary key segment, e.g. `string` or `email`.
    pub fn pk_type(mut self, pk_type: impl Into<String>) -> Self {
        self.pk_type = pk_type.into();
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    /// The list/create rule.
    pub fn collection_rule(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if base.is_empty() { "/".to_owned() } else { base.to_owned() }
    }

    /// The fetch/update/delete rule.
    pub fn item_rule(&self) -> String {
        let base = self.url.trim_end_matches('/');
        format!("{base}/{{{}:{}}}", self.pk, self.pk_type)
    }
}

/// Mounts `resource` under the five conventional routes. All of them share
/// the one resource instance.
///
/// ```rust
/// use restle::{register_api, ApiRoute, Method, Resource, Router};
///
/// let widgets = Resource::builder("widgets").build();
/// let router = register_api(Router::new(), ApiRoute::new("widgets", "/widgets"), widgets).unwrap();
/// assert_eq!(router.routes().len(), 5);
/// assert_eq!(router.routes()[2].method, Method::Get);
/// assert_eq!(router.routes()[2].rule, "/widgets/{id:int}");
/// ```
pub fn register_api<R>(mut router: Router, route: ApiRoute, resource: R) -> Result<Router, Error>
where
    R: Into<Arc<Resource>>,
{
    let handler = resource::bind(resource.into());
    let collection = route.collection_rule();
    let item = route.item_rule();

    let list_defaults = IndexMap::from([(route.pk.clone(), Value::Null)]);
    router.add_rule(&collection, &[Method::Get], &route.endpoint, list_defaults, Arc::clone(&handler))?;
    router.add_rule(&collection, &[Method::Post], &route.endpoint, IndexMap::new(), Arc::clone(&handler))?;
    router.add_rule(
        &item,
        &[Method::Get, Method::Put, Method::Delete],
        &route.endpoint,
        IndexMap::new(),
        handler,
    )?;
    Ok(router)
}

/// Adds the `regex`, `email`, `ip` and `cidr` converters to `router`.
pub fn extend_converters(mut router: Router) -> Router {
    router.converters_mut().extend_restle();
    router
}

/// Prepares a router for resources: the extra converters plus an error
/// handler that renders [`ApiError`](crate::ApiError)s as JSON.
///
/// ```rust
/// use restle::{restle, Router};
///
/// let router = restle(Router::new());
/// # let _ = router;
/// ```
pub fn restle(router: Router) -> Router {
    extend_converters(router).error_handler(|err, codec| err.respond(codec))
}

impl Router {
    /// Method form of [`register_api`].
    pub fn api<R>(self, route: ApiRoute, resource: R) -> Result<Self, Error>
    where
        R: Into<Arc<Resource>>,
    {
        register_api(self, route, resource)
    }
}
