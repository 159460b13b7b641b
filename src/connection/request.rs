//! Requests and response delegates.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::connection::response::Response;
use crate::protocol::Headers;

/// Header carrying the id that correlates a response with its request.
pub const CORRELATION_HEADER: &str = "apns-id";

/// Opaque caller data handed back with the response.
pub type Context = Arc<dyn Any + Send + Sync>;

/// Receives the response for a posted request.
///
/// Delegates of requests posted straight to a connection run on that
/// connection's worker task and must not block. Closures with the matching
/// signature implement this trait.
pub trait Delegate: Send + Sync + 'static {
    fn handle_response(&self, response: Response, context: Option<Context>);
}

impl<F> Delegate for F
where
    F: Fn(Response, Option<Context>) + Send + Sync + 'static,
{
    fn handle_response(&self, response: Response, context: Option<Context>) {
        self(response, context)
    }
}

/// A POST to the gateway.
///
/// Headers are kept in order: `:method`, `:path`, `content-length`, then
/// caller headers in insertion order with lower-cased names.
#[derive(Clone)]
pub struct Request {
    headers: Headers,
    body: Vec<u8>,
    delegate: Option<Arc<dyn Delegate>>,
    context: Option<Context>,
}

impl Request {
    pub fn post(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let mut headers = Headers::new();
        headers.insert(":method", "POST");
        headers.insert(":path", path);
        headers.insert("content-length", body.len().to_string());
        Self {
            headers,
            body,
            delegate: None,
            context: None,
        }
    }

    /// Add a caller header. Values are stringified.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl ToString) -> Self {
        self.headers.insert(name, value.to_string());
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn Delegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn path(&self) -> Option<&str> {
        self.headers.get(":path")
    }

    /// Value of the correlation header, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.headers.get(CORRELATION_HEADER)
    }

    pub fn delegate(&self) -> Option<&Arc<dyn Delegate>> {
        self.delegate.as_ref()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("has_delegate", &self.delegate.is_some())
            .field("has_context", &self.context.is_some())
            .finish()
    }
}
