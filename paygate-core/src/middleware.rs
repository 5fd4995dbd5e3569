// Middleware system for request/response processing

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Type alias for the next handler in the middleware chain
pub type Next = Box<
    dyn FnOnce(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send,
>;

/// Type alias for handler functions
pub type HandlerFn = Arc<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send
        + Sync,
>;

/// Middleware trait for processing requests before they reach the handler
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Middleware chain executor
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: HttpRequest,
        handler: HandlerFn,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>> {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            handler(req)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                middleware
                    .handle(
                        req,
                        Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                    )
                    .await
            })
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Built-in Middleware ==========

/// Request logging middleware
pub struct LoggerMiddleware;

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();

        paygate_log::debug!(target: "paygate::http", "→ {} {}", method, path);

        let result = next(req).await;
        let elapsed = format!("{:?}", start.elapsed());

        match &result {
            Ok(response) => paygate_log::log_with_fields(
                paygate_log::Level::Info,
                "paygate::http",
                "request completed",
                &[
                    ("method", method),
                    ("path", path),
                    ("status", response.status.to_string()),
                    ("elapsed", elapsed),
                ],
            ),
            Err(e) => paygate_log::log_with_fields(
                paygate_log::Level::Warn,
                "paygate::http",
                "request failed",
                &[
                    ("method", method),
                    ("path", path),
                    ("error", e.to_string()),
                    ("elapsed", elapsed),
                ],
            ),
        }

        result
    }
}

/// Request ID middleware
pub struct RequestIdMiddleware;

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let request_id = req
            .header("x-request-id")
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        req.headers
            .retain(|k, _| !k.eq_ignore_ascii_case("x-request-id"));
        req.headers
            .insert("x-request-id".to_string(), request_id.clone());

        let mut response = next(req).await?;
        response
            .headers
            .insert("x-request-id".to_string(), request_id);

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler() -> HandlerFn {
        Arc::new(|_req: HttpRequest| {
            Box::pin(async { Ok(HttpResponse::ok()) })
                as Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        })
    }

    #[tokio::test]
    async fn test_middleware_chain() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(LoggerMiddleware);
        chain.use_middleware(RequestIdMiddleware);
        assert_eq!(chain.len(), 2);

        let req = HttpRequest::new("GET", "/test");
        let response = chain.apply(req, ok_handler()).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::default();
        assert!(chain.is_empty());

        let response = chain
            .apply(HttpRequest::new("GET", "/"), ok_handler())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_request_id_is_preserved() {
        let req = HttpRequest::new("GET", "/").with_header("X-Request-Id", "abc-123");

        let response = RequestIdMiddleware
            .handle(
                req,
                Box::new(|req: HttpRequest| {
                    let seen = req.header("x-request-id").map(str::to_string);
                    Box::pin(async move {
                        assert_eq!(seen.as_deref(), Some("abc-123"));
                        Ok(HttpResponse::ok())
                    }) as Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers.get("x-request-id"),
            Some(&"abc-123".to_string())
        );
    }

    struct Reject;

    #[async_trait]
    impl Middleware for Reject {
        async fn handle(&self, _req: HttpRequest, _next: Next) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::unauthorized())
        }
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(Reject);

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let handler: HandlerFn = Arc::new(move |_req: HttpRequest| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async { Ok(HttpResponse::ok()) })
                as Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        });

        let response = chain
            .apply(HttpRequest::new("GET", "/"), handler)
            .await
            .unwrap();
        assert_eq!(response.status, 401);
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }
}
