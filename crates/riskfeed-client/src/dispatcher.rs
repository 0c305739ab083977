//! Topic → handler fan-out.
//!
//! The subscription table maps a topic name to an ordered list of handler
//! handles. Registration order is dispatch order, and registering the same
//! handle twice yields two invocations per dispatch.
//!
//! [`TopicDispatcher::dispatch`] snapshots the handler list under the read
//! lock and invokes handlers after releasing it. A handler registered or
//! removed while a dispatch is running (including from inside a handler)
//! takes effect from the next dispatch; the running one neither skips nor
//! repeats anyone.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{trace, warn};

/// A subscriber callback.
///
/// Implemented for every `Fn(&Value) -> anyhow::Result<()>` closure, so most
/// callers never name this trait directly; see [`handler`].
pub trait Handler: Send + Sync {
    /// Handle one decoded payload. Errors are logged by the dispatcher.
    fn invoke(&self, payload: &Value) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, payload: &Value) -> anyhow::Result<()> {
        self(payload)
    }
}

/// Shared handler handle. Identity (for `unsubscribe`) is pointer identity.
pub type HandlerRef = Arc<dyn Handler>;

/// Wrap a closure into a [`HandlerRef`].
pub fn handler<F>(f: F) -> HandlerRef
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Outcome counts of one dispatch call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that ran to completion without error.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    /// Total handlers attempted.
    pub fn total(&self) -> usize {
        self.invoked + self.failed
    }
}

/// Registry of per-topic handlers.
#[derive(Default)]
pub struct TopicDispatcher {
    table: RwLock<HashMap<String, Vec<HandlerRef>>>,
}

impl TopicDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to `topic`'s list, creating the entry if needed.
    pub fn subscribe(&self, topic: impl Into<String>, handler: HandlerRef) {
        let topic = topic.into();
        let mut table = self.table.write();
        let handlers = table.entry(topic.clone()).or_default();
        handlers.push(handler);
        trace!(topic = %topic, handlers = handlers.len(), "handler subscribed");
    }

    /// Remove the first registration of `handler` under `topic`.
    ///
    /// Returns whether anything was removed. Topics left without handlers
    /// are dropped from the table.
    pub fn unsubscribe(&self, topic: &str, handler: &HandlerRef) -> bool {
        let mut table = self.table.write();
        let Some(handlers) = table.get_mut(topic) else {
            return false;
        };
        let Some(pos) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) else {
            return false;
        };
        let _ = handlers.remove(pos);
        if handlers.is_empty() {
            let _ = table.remove(topic);
        }
        trace!(topic = %topic, "handler unsubscribed");
        true
    }

    /// Invoke every handler registered for `topic`, in order.
    ///
    /// Handler errors and panics are logged and counted; they never stop
    /// later handlers and never reach the caller.
    pub fn dispatch(&self, topic: &str, payload: &Value) -> DispatchReport {
        let snapshot: Vec<HandlerRef> = match self.table.read().get(topic) {
            Some(handlers) => handlers.clone(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for (index, handler) in snapshot.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(payload)));
            match outcome {
                Ok(Ok(())) => report.invoked += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    metrics::counter!("riskfeed_handler_failures_total", "kind" => "error")
                        .increment(1);
                    warn!(topic = %topic, index, error = %error, "handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    metrics::counter!("riskfeed_handler_failures_total", "kind" => "panic")
                        .increment(1);
                    warn!(
                        topic = %topic,
                        index,
                        panic = %panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of registrations under `topic` (duplicates counted).
    pub fn handler_count(&self, topic: &str) -> usize {
        self.table.read().get(topic).map_or(0, Vec::len)
    }

    /// Topics that currently have at least one handler, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.table.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether no topic has any handler.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl fmt::Debug for TopicDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        let mut map = f.debug_map();
        for (topic, handlers) in table.iter() {
            let _ = map.entry(topic, &handlers.len());
        }
        map.finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    /// Handler that appends `label` to a shared log.
    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> HandlerRef {
        let log = Arc::clone(log);
        handler(move |_| {
            log.lock().push(label);
            Ok(())
        })
    }

    // -- subscribe / dispatch --

    #[test]
    fn dispatch_runs_handlers_in_subscription_order() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe("jobs", recording(&log, "a"));
        dispatcher.subscribe("jobs", recording(&log, "b"));
        dispatcher.subscribe("jobs", recording(&log, "c"));

        let report = dispatcher.dispatch("jobs", &json!({}));

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(report, DispatchReport { invoked: 3, failed: 0 });
    }

    #[test]
    fn dispatch_to_unknown_topic_is_noop() {
        let dispatcher = TopicDispatcher::new();
        let report = dispatcher.dispatch("nobody", &json!(null));
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn dispatch_passes_payload_through() {
        let dispatcher = TopicDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.subscribe(
            "job.status_changed",
            handler(move |payload| {
                sink.lock().push(payload.clone());
                Ok(())
            }),
        );

        let payload = json!({"job_id": "j1", "status": "done"});
        let _ = dispatcher.dispatch("job.status_changed", &payload);

        assert_eq!(*seen.lock(), vec![payload]);
    }

    #[test]
    fn duplicate_registration_invokes_twice() {
        let dispatcher = TopicDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let h = handler(move |_| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        dispatcher.subscribe("jobs", Arc::clone(&h));
        dispatcher.subscribe("jobs", Arc::clone(&h));

        let _ = dispatcher.dispatch("jobs", &json!({}));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.handler_count("jobs"), 2);
    }

    #[test]
    fn topics_are_isolated() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe("jobs", recording(&log, "jobs"));
        dispatcher.subscribe("exports", recording(&log, "exports"));

        let _ = dispatcher.dispatch("exports", &json!({}));

        assert_eq!(*log.lock(), vec!["exports"]);
    }

    // -- unsubscribe --

    #[test]
    fn unsubscribe_removes_first_occurrence_only() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recording(&log, "a");
        let b = recording(&log, "b");
        dispatcher.subscribe("jobs", Arc::clone(&a));
        dispatcher.subscribe("jobs", Arc::clone(&b));
        dispatcher.subscribe("jobs", Arc::clone(&a));

        assert!(dispatcher.unsubscribe("jobs", &a));
        let _ = dispatcher.dispatch("jobs", &json!({}));

        assert_eq!(*log.lock(), vec!["b", "a"]);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recording(&log, "a");
        let stranger = recording(&log, "stranger");
        dispatcher.subscribe("jobs", Arc::clone(&a));

        assert!(!dispatcher.unsubscribe("jobs", &stranger));
        assert!(!dispatcher.unsubscribe("missing", &a));
        assert_eq!(dispatcher.handler_count("jobs"), 1);
    }

    #[test]
    fn empty_topics_are_dropped() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recording(&log, "a");
        dispatcher.subscribe("jobs", Arc::clone(&a));
        assert_eq!(dispatcher.topics(), vec!["jobs".to_string()]);

        assert!(dispatcher.unsubscribe("jobs", &a));
        assert!(dispatcher.is_empty());
        assert!(dispatcher.topics().is_empty());
    }

    // -- failure isolation --

    #[test]
    fn erroring_handler_does_not_stop_others() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe("jobs", handler(|_| anyhow::bail!("boom")));
        dispatcher.subscribe("jobs", recording(&log, "second"));

        let report = dispatcher.dispatch("jobs", &json!({}));

        assert_eq!(*log.lock(), vec!["second"]);
        assert_eq!(report, DispatchReport { invoked: 1, failed: 1 });
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let dispatcher = TopicDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.subscribe("jobs", handler(|_| panic!("handler blew up")));
        dispatcher.subscribe("jobs", recording(&log, "second"));

        let report = dispatcher.dispatch("jobs", &json!({}));

        assert_eq!(*log.lock(), vec!["second"]);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    // -- mutation during dispatch --

    #[test]
    fn mutation_inside_handler_applies_to_next_dispatch() {
        let dispatcher = Arc::new(TopicDispatcher::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let b = recording(&log, "b");
        let c = recording(&log, "c");

        let first_run = Arc::new(AtomicBool::new(true));
        let a = {
            let dispatcher = Arc::clone(&dispatcher);
            let log = Arc::clone(&log);
            let b = Arc::clone(&b);
            let c = Arc::clone(&c);
            let first_run = Arc::clone(&first_run);
            handler(move |_| {
                log.lock().push("a");
                if first_run.swap(false, Ordering::SeqCst) {
                    let _ = dispatcher.unsubscribe("jobs", &b);
                    dispatcher.subscribe("jobs", Arc::clone(&c));
                }
                Ok(())
            })
        };
        dispatcher.subscribe("jobs", a);
        dispatcher.subscribe("jobs", Arc::clone(&b));

        let _ = dispatcher.dispatch("jobs", &json!({}));
        assert_eq!(*log.lock(), vec!["a", "b"]);

        log.lock().clear();
        let _ = dispatcher.dispatch("jobs", &json!({}));
        assert_eq!(*log.lock(), vec!["a", "c"]);
    }

    #[test]
    fn concurrent_mutation_and_dispatch() {
        let dispatcher = Arc::new(TopicDispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let stable = {
            let calls = Arc::clone(&calls);
            handler(move |_| {
                let _ = calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        dispatcher.subscribe("jobs", stable);

        std::thread::scope(|scope| {
            let churn = Arc::clone(&dispatcher);
            let _ = scope.spawn(move || {
                for _ in 0..500 {
                    let h = handler(|_| Ok(()));
                    churn.subscribe("jobs", Arc::clone(&h));
                    assert!(churn.unsubscribe("jobs", &h));
                }
            });
            for _ in 0..500 {
                let report = dispatcher.dispatch("jobs", &json!({}));
                assert!(report.invoked >= 1);
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 500);
        assert_eq!(dispatcher.handler_count("jobs"), 1);
    }

    #[test]
    fn debug_lists_topic_counts() {
        let dispatcher = TopicDispatcher::new();
        dispatcher.subscribe("jobs", handler(|_| Ok(())));
        assert_eq!(format!("{dispatcher:?}"), r#"{"jobs": 1}"#);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        const POOL: usize = 4;

        #[derive(Clone, Debug)]
        enum Op {
            Subscribe(usize),
            Unsubscribe(usize),
            Dispatch,
            /// Dispatch while an extra handler subscribes `pool[i]` mid-call.
            SubscribeDuringDispatch(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0..POOL).prop_map(Op::Subscribe),
                (0..POOL).prop_map(Op::Unsubscribe),
                Just(Op::Dispatch),
                (0..POOL).prop_map(Op::SubscribeDuringDispatch),
            ]
        }

        proptest! {
            #[test]
            fn behaves_like_an_ordered_list(ops in proptest::collection::vec(op(), 1..64)) {
                let dispatcher = Arc::new(TopicDispatcher::new());
                let log = Arc::new(Mutex::new(Vec::new()));
                let pool: Vec<HandlerRef> = (0..POOL)
                    .map(|i| {
                        let log = Arc::clone(&log);
                        handler(move |_| {
                            log.lock().push(i);
                            Ok(())
                        })
                    })
                    .collect();
                let mut model: Vec<usize> = Vec::new();

                for op in ops {
                    match op {
                        Op::Subscribe(i) => {
                            dispatcher.subscribe("jobs", Arc::clone(&pool[i]));
                            model.push(i);
                        }
                        Op::Unsubscribe(i) => {
                            let expected = match model.iter().position(|&m| m == i) {
                                Some(at) => {
                                    let _ = model.remove(at);
                                    true
                                }
                                None => false,
                            };
                            prop_assert_eq!(dispatcher.unsubscribe("jobs", &pool[i]), expected);
                        }
                        Op::Dispatch => {
                            log.lock().clear();
                            let report = dispatcher.dispatch("jobs", &json!({}));
                            prop_assert_eq!(report.invoked, model.len());
                            prop_assert_eq!(&*log.lock(), &model);
                        }
                        Op::SubscribeDuringDispatch(i) => {
                            let target = Arc::clone(&pool[i]);
                            let inner = Arc::clone(&dispatcher);
                            let mutator = handler(move |_| {
                                inner.subscribe("jobs", Arc::clone(&target));
                                Ok(())
                            });
                            dispatcher.subscribe("jobs", Arc::clone(&mutator));

                            log.lock().clear();
                            let report = dispatcher.dispatch("jobs", &json!({}));
                            prop_assert_eq!(report.invoked, model.len() + 1);
                            prop_assert_eq!(&*log.lock(), &model);

                            prop_assert!(dispatcher.unsubscribe("jobs", &mutator));
                            model.push(i);
                        }
                    }
                    prop_assert_eq!(dispatcher.handler_count("jobs"), model.len());
                }
            }
        }
    }
}
