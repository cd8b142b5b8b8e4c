//! Interceptor chain applied to every RPC.
//!
//! Tonic's generated server code does not expose the invoked method to
//! request-level interceptors, so the chain is implemented as a tower
//! middleware sitting in front of the gRPC router, where the HTTP path
//! (`/package.Service/Method`) identifies the call.
//!
//! Hooks run in registration order on the way in and in reverse order on
//! the way out. Chain composition always places tracing first, metrics
//! second and auth (when enabled) last, so rejected calls are still traced
//! and counted.
//!
//! A call is finished when its response stream ends, not when the response
//! head is produced: gRPC carries the final status of a streaming call in
//! trailers, and duration and inflight accounting must cover the whole
//! stream. The chain wraps the response body to fire completion hooks at
//! end-of-stream; a body dropped early (caller went away) completes as
//! `Cancelled`.

pub mod auth;
pub mod observability;

pub use auth::AuthHook;
pub use observability::{MetricsHook, TracingHook};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderValue, Request, Response};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::any::Any;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tonic::body::Body;
use tonic::{Code, Status};
use tower::{Layer, Service};

/// Dispatch shape of a call, derived from the method path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    ServerStreaming,
    BidiStreaming,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::ServerStreaming => "server_stream",
            CallKind::BidiStreaming => "bidi_stream",
        }
    }

    pub fn is_streaming(&self) -> bool {
        !matches!(self, CallKind::Unary)
    }
}

/// Identity of the RPC currently flowing through the chain.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Fully qualified service name, e.g. `matchfunction.MatchFunction`.
    pub service: String,
    /// Bare method name, e.g. `MakeMatches`.
    pub method: String,
    /// Full path as seen on the wire.
    pub full_method: String,
    pub kind: CallKind,
}

impl CallInfo {
    fn from_path(path: &str, kind: CallKind) -> Self {
        let trimmed = path.trim_start_matches('/');
        let (service, method) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        Self {
            service: service.to_string(),
            method: method.to_string(),
            full_method: path.to_string(),
            kind,
        }
    }
}

/// Per-call state a hook threads from `on_call` to `on_complete`.
pub type HookState = Option<Box<dyn Any + Send>>;

/// One stage of the interceptor chain.
///
/// `on_call` observes the inbound request and may reject it with a
/// [`Status`]; `on_complete` observes the outcome once the response stream
/// ends. When a hook rejects, `on_complete` fires immediately for every
/// hook that already ran, in reverse order, with the rejection code.
pub trait CallHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_call(
        &self,
        call: &CallInfo,
        headers: &HeaderMap,
        extensions: &mut http::Extensions,
    ) -> Result<HookState, Status>;

    fn on_complete(&self, _state: HookState, _call: &CallInfo, _code: Code, _elapsed: std::time::Duration) {}
}

/// Ordered hook sequences for unary and streaming calls.
#[derive(Clone)]
pub struct InterceptorChain {
    unary: Arc<Vec<Arc<dyn CallHook>>>,
    streaming: Arc<Vec<Arc<dyn CallHook>>>,
    streaming_methods: Arc<Vec<(&'static str, CallKind)>>,
}

impl InterceptorChain {
    /// Composes the chain in its fixed order: tracing, metrics, then auth
    /// when an auth hook is supplied.
    pub fn build(
        tracing_hook: Arc<dyn CallHook>,
        metrics_hook: Arc<dyn CallHook>,
        auth_hook: Option<Arc<dyn CallHook>>,
        streaming_methods: &'static [(&'static str, CallKind)],
    ) -> Self {
        let mut hooks: Vec<Arc<dyn CallHook>> = vec![tracing_hook, metrics_hook];
        if let Some(auth) = auth_hook {
            hooks.push(auth);
        }
        Self {
            unary: Arc::new(hooks.clone()),
            streaming: Arc::new(hooks),
            streaming_methods: Arc::new(streaming_methods.to_vec()),
        }
    }

    /// Hook names in execution order for the given kind.
    pub fn hook_names(&self, kind: CallKind) -> Vec<&'static str> {
        self.hooks_for(kind).iter().map(|h| h.name()).collect()
    }

    fn hooks_for(&self, kind: CallKind) -> Arc<Vec<Arc<dyn CallHook>>> {
        if kind.is_streaming() {
            Arc::clone(&self.streaming)
        } else {
            Arc::clone(&self.unary)
        }
    }

    fn kind_of(&self, path: &str) -> CallKind {
        self.streaming_methods
            .iter()
            .find(|(method, _)| *method == path)
            .map(|(_, kind)| *kind)
            .unwrap_or(CallKind::Unary)
    }
}

/// Tower layer installing the interceptor chain on the gRPC router.
#[derive(Clone)]
pub struct ChainLayer {
    chain: InterceptorChain,
}

impl ChainLayer {
    pub fn new(chain: InterceptorChain) -> Self {
        Self { chain }
    }
}

impl<S> Layer<S> for ChainLayer {
    type Service = ChainService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ChainService {
            inner,
            chain: self.chain.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ChainService<S> {
    inner: S,
    chain: InterceptorChain,
}

impl<S> Service<Request<Body>> for ChainService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the ready inner service and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let chain = self.chain.clone();

        Box::pin(async move {
            let kind = chain.kind_of(req.uri().path());
            let call = CallInfo::from_path(req.uri().path(), kind);
            let started = Instant::now();

            let (mut parts, body) = req.into_parts();
            let hooks = chain.hooks_for(kind);

            let mut states: Vec<HookState> = Vec::with_capacity(hooks.len());
            for hook in hooks.iter() {
                match hook.on_call(&call, &parts.headers, &mut parts.extensions) {
                    Ok(state) => states.push(state),
                    Err(status) => {
                        let code = status.code();
                        complete_reverse(&hooks, states, &call, code, started);
                        return Ok(status_response(&status));
                    }
                }
            }

            let req = Request::from_parts(parts, body);
            let response = inner.call(req).await?;

            // Defer completion to end-of-stream; trailers-only error
            // responses carry their code in the head.
            let (parts, body) = response.into_parts();
            let completion = Completion {
                hooks,
                states,
                call,
                started,
                head_code: code_from_headers(&parts.headers),
            };
            let body = Body::new(CompletionBody {
                inner: body,
                completion: Some(completion),
                trailer_code: None,
            });
            Ok(Response::from_parts(parts, body))
        })
    }
}

fn complete_reverse(
    hooks: &[Arc<dyn CallHook>],
    states: Vec<HookState>,
    call: &CallInfo,
    code: Code,
    started: Instant,
) {
    let elapsed = started.elapsed();
    for (hook, state) in hooks.iter().zip(states).rev() {
        hook.on_complete(state, call, code, elapsed);
    }
}

/// Pending completion hooks for a call whose response is still streaming.
struct Completion {
    hooks: Arc<Vec<Arc<dyn CallHook>>>,
    states: Vec<HookState>,
    call: CallInfo,
    started: Instant,
    head_code: Option<Code>,
}

impl Completion {
    fn finish(self, code: Code) {
        let elapsed = self.started.elapsed();
        for (hook, state) in self.hooks.iter().zip(self.states).rev() {
            hook.on_complete(state, &self.call, code, elapsed);
        }
    }
}

/// Response body wrapper firing completion hooks when the stream ends.
///
/// The final code is taken from the trailers (`grpc-status`), falling back
/// to the head code for trailers-only responses. Dropping the body before
/// end-of-stream completes as `Cancelled`.
struct CompletionBody<B> {
    inner: B,
    completion: Option<Completion>,
    trailer_code: Option<Code>,
}

impl<B> HttpBody for CompletionBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(trailers) = frame.trailers_ref() {
                    if let Some(code) = code_from_headers(trailers) {
                        this.trailer_code = Some(code);
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(err))) => {
                if let Some(completion) = this.completion.take() {
                    completion.finish(this.trailer_code.unwrap_or(Code::Unknown));
                }
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if let Some(completion) = this.completion.take() {
                    let code = this.trailer_code.or(completion.head_code).unwrap_or(Code::Ok);
                    completion.finish(code);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for CompletionBody<B> {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.finish(self.trailer_code.unwrap_or(Code::Cancelled));
        }
    }
}

/// Reads the gRPC status code from a header or trailer map.
fn code_from_headers(headers: &HeaderMap) -> Option<Code> {
    headers.get("grpc-status").map(|value| {
        value
            .to_str()
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .map(Code::from_i32)
            .unwrap_or(Code::Unknown)
    })
}

/// Encodes a rejection as a trailers-only gRPC response.
fn status_response(status: &Status) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/grpc"));
    response
        .headers_mut()
        .insert("grpc-status", HeaderValue::from(status.code() as i32));
    if let Ok(message) = HeaderValue::from_str(status.message()) {
        response.headers_mut().insert("grpc-message", message);
    }
    response
}
