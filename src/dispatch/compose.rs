//! Handler chain execution.
//!
//! # Responsibilities
//! - Run matched handlers in order, each deciding whether to call `next`
//! - Reject a second `next` call from the same handler
//! - Catch errors at the level that raised them and hand them to the error handler
//! - Invoke the not-found handler when the chain runs out unanswered

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::dispatch::{ErrorHandler, Handler, HandlerResult, NotFoundHandler};
use crate::error::Error;
use crate::http::Context;

/// One request's walk over its matched handlers.
pub struct Dispatcher<'a> {
    chain: &'a [Arc<dyn Handler>],
    error_handler: Option<&'a ErrorHandler>,
    not_found: Option<&'a NotFoundHandler>,
    /// Highest chain index entered so far; -1 before the first handler.
    cursor: AtomicIsize,
}

/// Continuation passed to a handler; runs the rest of the chain.
pub struct Next<'a> {
    dispatcher: &'a Dispatcher<'a>,
    index: usize,
}

impl<'a> Next<'a> {
    /// Run the downstream handlers. Afterwards the context holds their
    /// response, if any. Calling this twice fails with
    /// [`Error::NextCalledMultipleTimes`].
    pub async fn run(&self, ctx: &mut Context) -> Result<(), Error> {
        self.dispatcher.dispatch(self.index, ctx).await
    }
}

impl<'a> Dispatcher<'a> {
    pub fn compose(
        chain: &'a [Arc<dyn Handler>],
        error_handler: Option<&'a ErrorHandler>,
        not_found: Option<&'a NotFoundHandler>,
    ) -> Self {
        Self {
            chain,
            error_handler,
            not_found,
            cursor: AtomicIsize::new(-1),
        }
    }

    /// Run the chain against `ctx`. Errors surface here only when no
    /// error handler is configured.
    pub async fn run(&self, ctx: &mut Context) -> Result<(), Error> {
        if self.chain.len() == 1 {
            return self.run_single(ctx).await;
        }
        self.dispatch(0, ctx).await
    }

    /// Single match: call the handler directly; its `next` goes straight to
    /// the not-found handler.
    async fn run_single(&self, ctx: &mut Context) -> Result<(), Error> {
        let Some(handler) = self.chain.first() else {
            return Ok(());
        };
        self.cursor.store(0, Ordering::SeqCst);
        ctx.set_route_index(0);

        let outcome = handler
            .call(
                ctx,
                Next {
                    dispatcher: self,
                    index: 1,
                },
            )
            .await;
        self.settle(outcome, ctx).await
    }

    fn dispatch<'b>(&'b self, index: usize, ctx: &'b mut Context) -> BoxFuture<'b, Result<(), Error>> {
        Box::pin(async move {
            let position = index as isize;
            if self
                .cursor
                .fetch_max(position, Ordering::SeqCst)
                >= position
            {
                return Err(Error::NextCalledMultipleTimes);
            }

            let Some(handler) = self.chain.get(index) else {
                if !ctx.finalized() {
                    if let Some(not_found) = self.not_found {
                        let res = not_found(ctx).await;
                        ctx.set_res(res);
                    }
                }
                return Ok(());
            };

            let caller = ctx.route_index();
            ctx.set_route_index(index);
            let outcome = handler
                .call(
                    ctx,
                    Next {
                        dispatcher: self,
                        index: index + 1,
                    },
                )
                .await;
            let settled = self.settle(outcome, ctx).await;
            ctx.set_route_index(caller);
            settled
        })
    }

    /// Apply one handler's outcome to the context.
    async fn settle(&self, outcome: HandlerResult, ctx: &mut Context) -> Result<(), Error> {
        match outcome {
            Ok(Some(res)) => {
                if !ctx.finalized() {
                    ctx.set_res(res);
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                let Some(on_error) = self.error_handler else {
                    return Err(err);
                };
                tracing::debug!(error = %err, path = %ctx.path(), "handler error routed to error handler");
                let err = Arc::new(err);
                ctx.set_error(err.clone());
                let res = on_error(err, ctx).await;
                ctx.set_res(res);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use super::*;
    use crate::dispatch::{error_handler_fn, handler_fn, not_found_fn};

    fn ctx() -> Context {
        Context::new(Request::builder().uri("/").body(Body::empty()).unwrap())
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<dyn Handler> {
        let log = log.clone();
        Arc::new(handler_fn(move |c, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                next.run(c).await?;
                log.lock().unwrap().push(name);
                Ok(None)
            })
        }))
    }

    fn answer(text: &'static str) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |c, _next| Box::pin(async move { Ok(Some(c.text(text))) })))
    }

    fn failing() -> Arc<dyn Handler> {
        Arc::new(handler_fn(|_c, _next| {
            Box::pin(async move { Err(Error::http(StatusCode::IM_A_TEAPOT, "teapot")) })
        }))
    }

    fn status_of(c: &Context) -> Option<StatusCode> {
        c.res().map(|r| r.status())
    }

    #[tokio::test]
    async fn runs_as_an_onion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recorder(&log, "outer"), recorder(&log, "inner"), answer("done")];
        let mut c = ctx();
        Dispatcher::compose(&handlers, None, None).run(&mut c).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner", "inner", "outer"]);
        assert_eq!(status_of(&c), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn early_return_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![answer("first"), recorder(&log, "never")];
        let mut c = ctx();
        Dispatcher::compose(&handlers, None, None).run(&mut c).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(c.finalized());
    }

    #[tokio::test]
    async fn middleware_sees_downstream_response() {
        let inspect: Arc<dyn Handler> = Arc::new(handler_fn(|c, next| {
            Box::pin(async move {
                next.run(c).await?;
                let status = c.res().map(|r| r.status().as_u16()).unwrap_or_default();
                c.header("x-downstream-status", &status.to_string())?;
                Ok(None)
            })
        }));
        let handlers = vec![inspect, answer("ok")];
        let mut c = ctx();
        Dispatcher::compose(&handlers, None, None).run(&mut c).await.unwrap();
        assert_eq!(c.res().unwrap().headers()["x-downstream-status"], "200");
    }

    #[tokio::test]
    async fn calling_next_twice_fails() {
        let twice: Arc<dyn Handler> = Arc::new(handler_fn(|c, next| {
            Box::pin(async move {
                next.run(c).await?;
                next.run(c).await?;
                Ok(None)
            })
        }));
        let handlers = vec![twice, answer("ok")];
        let mut c = ctx();
        let err = Dispatcher::compose(&handlers, None, None)
            .run(&mut c)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NextCalledMultipleTimes));
    }

    #[tokio::test]
    async fn error_goes_to_error_handler() {
        let on_error = error_handler_fn(|err, c| {
            Box::pin(async move {
                c.status(err.status());
                c.text(err.to_string())
            })
        });
        let handlers = vec![failing(), answer("unused")];
        let mut c = ctx();
        Dispatcher::compose(&handlers, Some(&on_error), None)
            .run(&mut c)
            .await
            .unwrap();
        assert_eq!(status_of(&c), Some(StatusCode::IM_A_TEAPOT));
        assert!(c.error().is_some());
    }

    #[tokio::test]
    async fn error_without_handler_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recorder(&log, "outer"), failing()];
        let mut c = ctx();
        let err = Dispatcher::compose(&handlers, None, None)
            .run(&mut c)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(*log.lock().unwrap(), vec!["outer"]);
    }

    #[tokio::test]
    async fn error_handled_downstream_is_visible_upstream() {
        let on_error = error_handler_fn(|_err, c| {
            Box::pin(async move {
                c.status(StatusCode::SERVICE_UNAVAILABLE);
                c.text("down")
            })
        });
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recorder(&log, "outer"), failing()];
        let mut c = ctx();
        Dispatcher::compose(&handlers, Some(&on_error), None)
            .run(&mut c)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["outer", "outer"]);
        assert_eq!(status_of(&c), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn end_of_chain_runs_not_found() {
        let not_found = not_found_fn(|c| {
            Box::pin(async move {
                c.status(StatusCode::NOT_FOUND);
                c.text("nothing here")
            })
        });
        let log = Arc::new(Mutex::new(Vec::new()));

        let empty: Vec<Arc<dyn Handler>> = Vec::new();
        let mut c = ctx();
        Dispatcher::compose(&empty, None, Some(&not_found))
            .run(&mut c)
            .await
            .unwrap();
        assert_eq!(status_of(&c), Some(StatusCode::NOT_FOUND));

        // Single match whose next falls through.
        let handlers = vec![recorder(&log, "only")];
        let mut c = ctx();
        Dispatcher::compose(&handlers, None, Some(&not_found))
            .run(&mut c)
            .await
            .unwrap();
        assert_eq!(status_of(&c), Some(StatusCode::NOT_FOUND));
        assert_eq!(*log.lock().unwrap(), vec!["only", "only"]);
    }

    #[tokio::test]
    async fn returned_response_does_not_replace_a_finalized_one() {
        let late: Arc<dyn Handler> = Arc::new(handler_fn(|c, next| {
            Box::pin(async move {
                next.run(c).await?;
                c.status(StatusCode::ACCEPTED);
                Ok(Some(c.text("late")))
            })
        }));
        let handlers = vec![late, answer("first")];
        let mut c = ctx();
        Dispatcher::compose(&handlers, None, None).run(&mut c).await.unwrap();
        assert_eq!(status_of(&c), Some(StatusCode::OK));
    }
}
