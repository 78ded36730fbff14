//! The cascading dispatch engine.
//!
//! A [`Router`] holds an ordered list of [`Route`]s. Each route pairs a path
//! specification with a sequence of [`Reducer`]s (handlers, OR-groups,
//! nested routers) and a map of named exit points. Dispatch walks routes in
//! registration order and reducers depth-first, driven by the
//! [`ReducerResult`] signals:
//!
//! 1. Routes are matched against the turn's resolved absolute action
//!    (route paths joined to the router's current location).
//! 2. `Break` from a reducer aborts the current route only; the next
//!    registered route is tried.
//! 3. `Continue` proceeds to the next reducer; from the last reducer it
//!    falls through to the next route.
//! 4. An exit signal resolves against the owning route's exit points; an
//!    unresolved signal propagates to the caller unchanged.
//! 5. `End` stops all processing — the turn is handled.
//!
//! Reducers may be synchronous or asynchronous; the loop awaits each result
//! before touching the next reducer, so ordering is strict.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_router::{Route, Router};
//!
//! let mut router = Router::new();
//! router.add(
//!     Route::new("/start")
//!         .handler(|_req, res, _pb| async move {
//!             res.text("welcome");
//!             Router::end()
//!         })
//!         .on_exit("done", |_data, _req, res, _pb| async move {
//!             res.text("finished");
//!             Router::end()
//!         }),
//! );
//! router.add(Route::any().handler(fallback));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};

use trellis_core::{PathSpec, normalize_path};

use crate::error::{HandlerResult, RouterResult};
use crate::postback::PostBack;
use crate::request::Request;
use crate::response::Response;
use crate::signal::{ExitSignal, ReducerResult, RouteOutcome};

/// A type-erased reducer handler.
pub type BoxedHandler =
    Arc<dyn Fn(Arc<Request>, Response, PostBack) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A type-erased exit-point handler, invoked with the exit signal's data.
pub type BoxedExitHandler = Arc<
    dyn Fn(Value, Arc<Request>, Response, PostBack) -> BoxFuture<'static, HandlerResult>
        + Send
        + Sync,
>;

/// Converts a handler function into a boxed handler.
pub fn into_handler<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Arc<Request>, Response, PostBack) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |req, res, pb| Box::pin(f(req, res, pb)))
}

/// Converts an exit handler function into its boxed form.
pub fn into_exit_handler<F, Fut>(f: F) -> BoxedExitHandler
where
    F: Fn(Value, Arc<Request>, Response, PostBack) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |data, req, res, pb| Box::pin(f(data, req, res, pb)))
}

/// The execution unit inside a route, classified once at registration.
#[derive(Clone)]
pub enum Reducer {
    /// A plain handler.
    Handler(BoxedHandler),
    /// An OR-group: alternatives tried in order, `Break` falling through to
    /// the next alternative.
    Group(Vec<Reducer>),
    /// A nested router, delegated to transparently.
    SubRouter(Router),
}

impl Reducer {
    /// Wraps a handler function.
    pub fn handler<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Request>, Response, PostBack) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Handler(into_handler(f))
    }

    /// Wraps a nested router.
    pub fn router(router: Router) -> Self {
        Self::SubRouter(router)
    }

    /// Builds an OR-group from alternatives.
    pub fn group(items: impl IntoIterator<Item = Reducer>) -> Self {
        Self::Group(items.into_iter().collect())
    }
}

/// One registered handler sequence plus its exit points.
#[derive(Clone)]
pub struct Route {
    path: PathSpec,
    reducers: Vec<Reducer>,
    exits: HashMap<String, BoxedExitHandler>,
}

impl Route {
    /// Creates a route matching a literal path spec (`/*` for the wildcard).
    pub fn new(spec: &str) -> Self {
        Self {
            path: PathSpec::parse(spec),
            reducers: Vec::new(),
            exits: HashMap::new(),
        }
    }

    /// Creates a catch-all route.
    pub fn any() -> Self {
        Self::new(trellis_core::WILDCARD)
    }

    /// Creates a free-text pattern route; the regex is tested against
    /// normalized message text.
    pub fn pattern(regex: Regex) -> Self {
        Self {
            path: PathSpec::pattern(regex),
            reducers: Vec::new(),
            exits: HashMap::new(),
        }
    }

    /// Appends a handler reducer.
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Request>, Response, PostBack) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.reducers.push(Reducer::handler(f));
        self
    }

    /// Appends a pre-built reducer.
    pub fn reducer(mut self, reducer: Reducer) -> Self {
        self.reducers.push(reducer);
        self
    }

    /// Appends an OR-group of alternatives.
    pub fn group(mut self, items: impl IntoIterator<Item = Reducer>) -> Self {
        self.reducers.push(Reducer::group(items));
        self
    }

    /// Mounts a nested router under this route's path.
    pub fn mount(mut self, router: Router) -> Self {
        self.reducers.push(Reducer::SubRouter(router));
        self
    }

    /// Registers a named exit point on this route.
    pub fn on_exit<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Arc<Request>, Response, PostBack) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.exits.insert(name.into(), into_exit_handler(f));
        self
    }
}

/// Listener invoked when a route is selected for a non-delegated reducer.
/// Receives the resolved absolute action path (empty for pure free text)
/// and the original message text.
pub type ActionListener = Arc<dyn Fn(&str, Option<&str>) + Send + Sync>;

/// "Action observed" telemetry fan-out. Nested routers forward their
/// emissions to the router that mounted them.
#[derive(Clone, Default)]
pub struct ActionEmitter {
    inner: Arc<EmitterInner>,
}

#[derive(Default)]
struct EmitterInner {
    listeners: Mutex<Vec<ActionListener>>,
    forward: Mutex<Vec<ActionEmitter>>,
}

impl ActionEmitter {
    fn subscribe(&self, listener: ActionListener) {
        self.inner.listeners.lock().push(listener);
    }

    fn forward_to(&self, parent: ActionEmitter) {
        self.inner.forward.lock().push(parent);
    }

    fn emit(&self, action: &str, text: Option<&str>) {
        let listeners: Vec<_> = self.inner.listeners.lock().clone();
        for listener in listeners {
            listener(action, text);
        }
        let forward: Vec<_> = self.inner.forward.lock().clone();
        for parent in forward {
            parent.emit(action, text);
        }
    }
}

/// The dispatch engine.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
    emitter: ActionEmitter,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route. Routes are tried strictly in registration order.
    /// Nested routers inside the route start forwarding their telemetry to
    /// this router.
    pub fn add(&mut self, route: Route) {
        hook_subrouters(&route.reducers, &self.emitter);
        self.routes.push(route);
    }

    /// Appends a route (builder form).
    pub fn with(mut self, route: Route) -> Self {
        self.add(route);
        self
    }

    /// Registers an "action observed" telemetry listener.
    pub fn on_action<F>(&self, f: F)
    where
        F: Fn(&str, Option<&str>) + Send + Sync + 'static,
    {
        self.emitter.subscribe(Arc::new(f));
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Handler shorthand: proceed to the next reducer.
    pub fn cont() -> HandlerResult {
        Ok(ReducerResult::Continue)
    }

    /// Handler shorthand: this route does not match.
    pub fn brk() -> HandlerResult {
        Ok(ReducerResult::Break)
    }

    /// Handler shorthand: the turn is handled.
    pub fn end() -> HandlerResult {
        Ok(ReducerResult::End)
    }

    /// Handler shorthand: jump to a named exit point.
    pub fn exit(name: impl Into<String>, data: Value) -> HandlerResult {
        Ok(ReducerResult::exit(name, data))
    }

    /// Dispatches one turn against this router's routes.
    ///
    /// `location` is the absolute path this router is mounted at (`/` at the
    /// top level); route paths and relative postback targets resolve against
    /// it.
    pub fn reduce<'a>(
        &'a self,
        req: Arc<Request>,
        res: Response,
        post_back: PostBack,
        location: &str,
    ) -> BoxFuture<'a, RouterResult<RouteOutcome>> {
        let location = normalize_path(location);
        Box::pin(async move {
            trace!(
                location = %location,
                action = req.action().unwrap_or("-"),
                routes = self.routes.len(),
                "Reducing"
            );
            for route in &self.routes {
                if !route.path.matches(&location, req.action(), req.normalized_text()) {
                    continue;
                }
                match self.run_route(route, &location, &req, &res, &post_back).await? {
                    // Break: the route refused the request after all.
                    // Continue: the route fell through the cascade.
                    ReducerResult::Break | ReducerResult::Continue => continue,
                    ReducerResult::End => return Ok(RouteOutcome::End),
                    ReducerResult::Exit(sig) => return Ok(RouteOutcome::Exit(sig)),
                }
            }
            Ok(RouteOutcome::Continue)
        })
    }

    /// Runs a pre-built flat reducer list with the same loop semantics as a
    /// single unnamed route with an empty exit map. Supports dynamically
    /// composed resolvers that are not registered as routes.
    pub async fn process_reducers(
        &self,
        reducers: &[Reducer],
        req: Arc<Request>,
        res: Response,
        post_back: PostBack,
        location: &str,
    ) -> RouterResult<ReducerResult> {
        let location = normalize_path(location);
        // No route selection happened, so no telemetry is emitted here.
        let mut emitted = true;
        let mut last = ReducerResult::End;
        for reducer in reducers {
            match self
                .run_reducer(reducer, &location, &req, &res, &post_back, &mut emitted)
                .await?
            {
                ReducerResult::Continue => last = ReducerResult::Continue,
                other => return Ok(other),
            }
        }
        Ok(last)
    }

    async fn run_route(
        &self,
        route: &Route,
        location: &str,
        req: &Arc<Request>,
        res: &Response,
        post_back: &PostBack,
    ) -> RouterResult<ReducerResult> {
        let base = route.path.absolute_under(location);
        let mut emitted = false;
        // An empty route is considered handled; a trailing Continue falls
        // through to the next route.
        let mut last = ReducerResult::End;
        for reducer in &route.reducers {
            match self
                .run_reducer(reducer, &base, req, res, post_back, &mut emitted)
                .await?
            {
                ReducerResult::Continue => last = ReducerResult::Continue,
                ReducerResult::Break => return Ok(ReducerResult::Break),
                ReducerResult::End => return Ok(ReducerResult::End),
                ReducerResult::Exit(sig) => {
                    return self.resolve_exit(route, sig, req, res, post_back).await;
                }
            }
        }
        Ok(last)
    }

    fn run_reducer<'a>(
        &'a self,
        reducer: &'a Reducer,
        base: &'a str,
        req: &'a Arc<Request>,
        res: &'a Response,
        post_back: &'a PostBack,
        emitted: &'a mut bool,
    ) -> BoxFuture<'a, RouterResult<ReducerResult>> {
        Box::pin(async move {
            match reducer {
                Reducer::Handler(handler) => {
                    if !*emitted {
                        *emitted = true;
                        self.emit_action(req);
                    }
                    Ok(handler(Arc::clone(req), res.clone(), post_back.clone()).await?)
                }
                Reducer::Group(items) => {
                    for item in items {
                        match self
                            .run_reducer(item, base, req, res, post_back, emitted)
                            .await?
                        {
                            // Break from an alternative falls through to the
                            // next one; anything else is the group's result.
                            ReducerResult::Break => continue,
                            other => return Ok(other),
                        }
                    }
                    Ok(ReducerResult::Break)
                }
                Reducer::SubRouter(sub) => {
                    let outcome = sub
                        .reduce(
                            Arc::clone(req),
                            res.with_location(base),
                            post_back.rebased(base),
                            base,
                        )
                        .await?;
                    Ok(match outcome {
                        RouteOutcome::Continue => ReducerResult::Continue,
                        RouteOutcome::End => ReducerResult::End,
                        RouteOutcome::Exit(sig) => ReducerResult::Exit(sig),
                    })
                }
            }
        })
    }

    /// Resolves an exit signal against `route`'s exit points. An exit
    /// handler's return value is re-resolved the same way, so exits can
    /// chain; a path-shaped name is a redirect re-entering dispatch as a
    /// postback; an unknown name propagates to the caller unchanged.
    async fn resolve_exit(
        &self,
        route: &Route,
        mut sig: ExitSignal,
        req: &Arc<Request>,
        res: &Response,
        post_back: &PostBack,
    ) -> RouterResult<ReducerResult> {
        loop {
            if let Some(handler) = route.exits.get(&sig.name) {
                debug!(exit = %sig.name, "Running exit point");
                match handler(sig.data.clone(), Arc::clone(req), res.clone(), post_back.clone())
                    .await?
                {
                    ReducerResult::Exit(next) => sig = next,
                    other => return Ok(other),
                }
                continue;
            }
            if sig.name.starts_with('/') {
                post_back.send(&sig.name, sig.data);
                return Ok(ReducerResult::End);
            }
            return Ok(ReducerResult::Exit(sig));
        }
    }

    fn emit_action(&self, req: &Request) {
        let action = req.action().unwrap_or("");
        let text = req.event().text.as_deref();
        if action.is_empty() && text.is_none() {
            return;
        }
        self.emitter.emit(action, text);
    }
}

fn hook_subrouters(reducers: &[Reducer], emitter: &ActionEmitter) {
    for reducer in reducers {
        match reducer {
            Reducer::SubRouter(sub) => sub.emitter.forward_to(emitter.clone()),
            Reducer::Group(items) => hook_subrouters(items, emitter),
            Reducer::Handler(_) => {}
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("route_count", &self.routes.len())
            .finish()
    }
}
