//! Ordered route table
//!
//! First matching route wins; unmatched requests go to the default
//! handler.

use std::sync::Arc;

use axum::http::Method;
use reqwest::Url;
use tracing::debug;

use super::Matcher;
use crate::error::Result;
use crate::request::AgentRequest;
use crate::strategy::{Strategy, StrategyResponse};

/// A matcher bound to a strategy.
#[derive(Clone)]
pub struct Route {
    pub matcher: Matcher,
    pub method: Method,
    pub strategy: Arc<dyn Strategy>,
}

impl Route {
    /// Route for GET requests.
    pub fn new(matcher: Matcher, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            matcher,
            method: Method::GET,
            strategy,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Route matcher for strategy selection
pub struct Router {
    routes: Vec<Route>,
    default_handler: Arc<dyn Strategy>,
    site_origin: Option<String>,
}

impl Router {
    pub fn new(default_handler: Arc<dyn Strategy>) -> Self {
        Self {
            routes: Vec::new(),
            default_handler,
            site_origin: None,
        }
    }

    /// Origin treated as same-origin by regex routes. Stored in the same
    /// serialized form as request origins, so default ports and trailing
    /// paths are dropped.
    pub fn with_site_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        let normalized = Url::parse(&origin)
            .ok()
            .map(|url| url.origin())
            .filter(|o| o.is_tuple())
            .map(|o| o.ascii_serialization())
            .unwrap_or_else(|| origin.trim_end_matches('/').to_string());
        self.site_origin = Some(normalized);
        self
    }

    pub fn site_origin(&self) -> Option<&str> {
        self.site_origin.as_deref()
    }

    /// Appends a route; earlier routes take precedence.
    pub fn register(&mut self, route: Route) {
        debug!(
            "Registered route {:?} -> {} ({})",
            route.matcher,
            route.strategy.kind(),
            route.strategy.store_name().unwrap_or("-")
        );
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route whose method and matcher accept the request.
    pub fn route(&self, request: &AgentRequest) -> Option<&Route> {
        self.routes.iter().find(|route| {
            route.method == request.method
                && route
                    .matcher
                    .matches(request, self.site_origin.as_deref())
        })
    }

    /// Strategy for the request, the default handler when nothing matches.
    pub fn strategy_for(&self, request: &AgentRequest) -> &Arc<dyn Strategy> {
        self.route(request)
            .map(|route| &route.strategy)
            .unwrap_or(&self.default_handler)
    }

    pub async fn handle(&self, request: &AgentRequest) -> Result<StrategyResponse> {
        let strategy = self.strategy_for(request);
        debug!("Routing {} {} via {}", request.method, request.url, strategy.kind());
        strategy.handle(request).await
    }
}
