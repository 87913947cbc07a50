//! End-to-end accept loop tests over the in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use sockmux_core::{BindError, TransportError};
use sockmux_server::namespace::{ChannelConn, OutboundEvent};
use sockmux_server::transport::{MemoryOptions, MemoryTransport};
use sockmux_server::{
    Conn, ConnectionBinder, EventHandler, EventOutcome, NamespaceRegistry, Server, ServerState,
    SocketRef,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// What a test client "sends" once connected.
#[derive(Clone, Debug)]
struct Script {
    namespace: String,
    events: Vec<(String, Value)>,
    reject: bool,
}

impl Script {
    fn join(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            events: Vec::new(),
            reject: false,
        }
    }

    fn emit(mut self, event: &str, payload: Value) -> Self {
        self.events.push((event.to_owned(), payload));
        self
    }

    fn rejected() -> Self {
        Self {
            reject: true,
            ..Self::join("/")
        }
    }
}

/// What the binder produced for one script.
struct Session {
    conn: Arc<ChannelConn>,
    outbound: mpsc::Receiver<OutboundEvent>,
    joined: bool,
    outcomes: Vec<EventOutcome>,
}

/// Plays a [`Script`] against the registry the way a protocol binder would.
struct ScriptBinder {
    sessions: mpsc::UnboundedSender<Session>,
    seq: AtomicUsize,
}

#[async_trait]
impl ConnectionBinder<Script> for ScriptBinder {
    type Connection = ();

    async fn bind(&self, script: Script, registry: Arc<NamespaceRegistry>) -> Result<(), BindError> {
        if script.reject {
            return Err(BindError::Handshake("client sent garbage".into()));
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let handler = registry.get_or_create(&script.namespace);
        let (tx, outbound) = mpsc::channel(16);
        let conn = Arc::new(ChannelConn::new(
            format!("conn-{n}"),
            &script.namespace,
            None,
            tx,
        ));
        let socket: SocketRef = conn.clone();

        let joined = handler.dispatch_connect(socket.clone()).is_ok();
        let mut outcomes = Vec::new();
        if joined {
            for (event, payload) in script.events {
                let outcome = handler.dispatch_event(socket.clone(), &event, payload);
                if let EventOutcome::Acked(ack) = &outcome {
                    let _ = socket.emit("ack", ack.clone());
                }
                outcomes.push(outcome);
            }
        }

        let _ = self.sessions.send(Session {
            conn,
            outbound,
            joined,
            outcomes,
        });
        Ok(())
    }
}

type TestServer = Server<MemoryTransport<Script>, ScriptBinder>;

struct Harness {
    server: Arc<TestServer>,
    sessions: mpsc::UnboundedReceiver<Session>,
}

impl Harness {
    fn new() -> Self {
        let (tx, sessions) = mpsc::unbounded_channel();
        let binder = ScriptBinder {
            sessions: tx,
            seq: AtomicUsize::new(0),
        };
        let server = Server::new(MemoryOptions::default(), binder).unwrap();
        Self {
            server: Arc::new(server),
            sessions,
        }
    }

    fn serve(&self) -> tokio::task::JoinHandle<Result<std::convert::Infallible, TransportError>> {
        let server = self.server.clone();
        tokio::spawn(async move { server.serve().await })
    }

    async fn dial(&self, script: Script) {
        self.server.transport().dialer().dial(script).await.unwrap();
    }

    async fn next_session(&mut self) -> Session {
        timeout(TIMEOUT, self.sessions.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("binder dropped")
    }
}

#[tokio::test]
async fn connect_callback_runs_once_for_routed_namespace() {
    let mut h = Harness::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    {
        let calls = calls.clone();
        h.server.on_connect("/chat", move |conn| {
            calls.lock().push(conn.id().to_owned());
            Ok(())
        });
    }
    let root_calls = Arc::new(AtomicUsize::new(0));
    {
        let root_calls = root_calls.clone();
        h.server.on_connect("/", move |_| {
            let _ = root_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let serving = h.serve();
    h.dial(Script::join("/chat")).await;
    let session = h.next_session().await;

    assert!(session.joined);
    assert_eq!(*calls.lock(), vec![session.conn.id().to_owned()]);
    assert_eq!(root_calls.load(Ordering::SeqCst), 0);

    h.server.close().await.unwrap();
    let _ = timeout(TIMEOUT, serving).await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_connect_skips_events() {
    let mut h = Harness::new();
    h.server.on_connect("/admin", |_| {
        Err(sockmux_core::HandlerError::new("not authorized"))
    });
    let pings = Arc::new(AtomicUsize::new(0));
    {
        let pings = pings.clone();
        h.server.on_event(
            "/admin",
            "ping",
            EventHandler::bare(move |_| {
                let _ = pings.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let _serving = h.serve();
    h.dial(Script::join("/admin").emit("ping", Value::Null)).await;
    let session = h.next_session().await;

    assert!(!session.joined);
    assert!(session.outcomes.is_empty());
    assert_eq!(pings.load(Ordering::SeqCst), 0);
    h.server.close().await.unwrap();
}

#[tokio::test]
async fn bind_failure_does_not_stop_accepting() {
    let mut h = Harness::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = errors.clone();
        h.server
            .on_error("", move |err| errors.lock().push(err.to_string()));
    }

    let serving = h.serve();
    h.dial(Script::rejected()).await;
    h.dial(Script::join("/chat")).await;
    h.dial(Script::rejected()).await;
    h.dial(Script::join("/news")).await;

    let first = h.next_session().await;
    let second = h.next_session().await;
    let mut namespaces = vec![
        first.conn.namespace().to_owned(),
        second.conn.namespace().to_owned(),
    ];
    namespaces.sort();
    assert_eq!(namespaces, vec!["/chat", "/news"]);

    timeout(TIMEOUT, async {
        while errors.lock().len() < 2 || h.server.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both failures should be reported");
    let errors = errors.lock().clone();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.contains("client sent garbage")));
    assert_eq!(h.server.state(), ServerState::Serving);

    h.server.close().await.unwrap();
    let _ = timeout(TIMEOUT, serving).await.unwrap().unwrap();
}

#[tokio::test]
async fn bind_failure_without_root_error_callback_is_silent() {
    let mut h = Harness::new();
    let serving = h.serve();

    h.dial(Script::rejected()).await;
    h.dial(Script::join("/")).await;
    let session = h.next_session().await;
    assert!(session.joined);

    timeout(TIMEOUT, async {
        while h.server.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers should finish");
    assert!(!serving.is_finished());

    h.server.close().await.unwrap();
    let result = timeout(TIMEOUT, serving).await.unwrap().unwrap();
    assert_matches!(result, Err(TransportError::Closed));
}

#[tokio::test]
async fn close_fails_in_progress_and_future_serve() {
    let h = Harness::new();
    let serving = h.serve();
    tokio::task::yield_now().await;

    h.server.close().await.unwrap();
    let in_progress = timeout(Duration::from_secs(1), serving)
        .await
        .expect("in-progress serve should return promptly")
        .unwrap();
    assert_matches!(in_progress, Err(TransportError::Closed));

    let later = timeout(Duration::from_secs(1), h.server.serve())
        .await
        .expect("later serve should return promptly");
    assert_matches!(later, Err(TransportError::Closed));
    assert_eq!(h.server.state(), ServerState::Closed);
}

#[tokio::test]
async fn ping_on_root_invokes_registered_instance_only() {
    let mut h = Harness::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let ping = {
        let seen = seen.clone();
        EventHandler::payload(move |conn, payload| {
            seen.lock().push((conn.namespace().to_owned(), payload));
        })
    };
    h.server.on_event("", "ping", ping.clone());

    let other_calls = Arc::new(AtomicUsize::new(0));
    {
        let other_calls = other_calls.clone();
        h.server.on_event(
            "/other",
            "ping",
            EventHandler::bare(move |_| {
                let _ = other_calls.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let registered = h.server.registry().get("/").unwrap().event_handler("ping").unwrap();
    assert!(registered.ptr_eq(&ping));

    let _serving = h.serve();
    h.dial(Script::join("/").emit("ping", json!({"seq": 1}))).await;
    let session = h.next_session().await;

    assert_eq!(session.outcomes, vec![EventOutcome::Handled]);
    assert_eq!(*seen.lock(), vec![("/".to_owned(), json!({"seq": 1}))]);
    assert_eq!(other_calls.load(Ordering::SeqCst), 0);

    // the handler stored under "" is still the same instance
    let after = h.server.registry().get("").unwrap().event_handler("ping").unwrap();
    assert!(after.ptr_eq(&ping));
    h.server.close().await.unwrap();
}

#[tokio::test]
async fn ack_handler_reply_reaches_connection() {
    let mut h = Harness::new();
    h.server.on_event(
        "/rpc",
        "add",
        EventHandler::with_ack(|_, payload| {
            let a = payload["a"].as_i64().unwrap_or(0);
            let b = payload["b"].as_i64().unwrap_or(0);
            json!({ "sum": a + b })
        }),
    );

    let _serving = h.serve();
    h.dial(
        Script::join("/rpc")
            .emit("add", json!({"a": 2, "b": 3}))
            .emit("unknown", Value::Null),
    )
    .await;
    let mut session = h.next_session().await;

    assert_eq!(
        session.outcomes,
        vec![
            EventOutcome::Acked(json!({"sum": 5})),
            EventOutcome::Unhandled
        ]
    );
    let ack = session.outbound.try_recv().unwrap();
    assert_eq!(ack.namespace, "/rpc");
    assert_eq!(ack.event, "ack");
    assert_eq!(ack.payload, json!({"sum": 5}));
    h.server.close().await.unwrap();
}

#[tokio::test]
async fn later_registration_overwrites_earlier() {
    let mut h = Harness::new();
    let hits = Arc::new(Mutex::new(Vec::new()));
    for label in ["first", "second"] {
        let hits = hits.clone();
        h.server.on_connect("/chat", move |_| {
            hits.lock().push(label);
            Ok(())
        });
    }

    let _serving = h.serve();
    h.dial(Script::join("/chat")).await;
    let _ = h.next_session().await;

    assert_eq!(*hits.lock(), vec!["second"]);
    h.server.close().await.unwrap();
}

#[tokio::test]
async fn namespace_created_by_binder_is_shared_with_later_registration() {
    let mut h = Harness::new();
    let _serving = h.serve();

    h.dial(Script::join("/late")).await;
    let first = h.next_session().await;
    assert!(first.joined);
    assert!(h.server.registry().contains("/late"));

    let joined = Arc::new(AtomicUsize::new(0));
    {
        let joined = joined.clone();
        h.server.on_connect("/late", move |_| {
            let _ = joined.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    h.dial(Script::join("/late")).await;
    let _ = h.next_session().await;

    assert_eq!(joined.load(Ordering::SeqCst), 1);
    assert_eq!(h.server.registry().len(), 1);
    h.server.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registration_yields_one_handler_per_namespace() {
    let h = Harness::new();
    let mut tasks = Vec::new();
    for i in 0..32 {
        let server = h.server.clone();
        tasks.push(tokio::spawn(async move {
            let name = if i % 2 == 0 { "" } else { "/" };
            server.on_event(name, &format!("e{i}"), EventHandler::bare(|_| {}));
            server.on_event("/shared", &format!("e{i}"), EventHandler::bare(|_| {}));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let registry = h.server.registry();
    assert_eq!(registry.namespaces(), vec!["/", "/shared"]);
    assert_eq!(registry.root().unwrap().event_names().len(), 32);
    assert_eq!(registry.get("/shared").unwrap().event_names().len(), 32);
}

#[tokio::test]
async fn independent_servers_do_not_share_namespaces() {
    let a = Harness::new();
    let b = Harness::new();
    a.server.on_connect("/only-a", |_| Ok(()));

    assert!(a.server.registry().contains("/only-a"));
    assert!(!b.server.registry().contains("/only-a"));
    assert!(b.server.registry().is_empty());
}
