//! Record-replay round-trip integration tests.
//!
//! Records exchanges against a scripted transport, saves the chain to disk,
//! then replays it through a fresh transport that has no responses of its
//! own, so every answer must come from the saved chain.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use httpreel::cassette::format::PersistedChain;
use httpreel::{
    CannedResponse, Caller, CallerId, CallerKey, ChainConfig, Error, FakeTransport, HttpVersion,
    InterceptingTransport, Player, Recorder, Request, SharedRegistry, Transport,
};

fn scripted_server() -> FakeTransport {
    FakeTransport::new("www.example.com")
        .respond(CannedResponse::ok("hello").with_header("Content-Type", "text/plain"))
        .respond(CannedResponse::new(201, "Created").with_body("created"))
}

fn offline(registry: &SharedRegistry) -> InterceptingTransport<FakeTransport> {
    InterceptingTransport::new(FakeTransport::new("www.example.com"), registry.clone())
}

fn record_example(dir: &Path) {
    let registry = SharedRegistry::new();
    let mut transport = InterceptingTransport::new(scripted_server(), registry.clone());
    let recorder = Recorder::global();

    recorder
        .recording(&registry, || {
            transport.send(&Request::get("/")).unwrap();
            transport.send(&Request::post("/", "x=1")).unwrap();
        })
        .unwrap();

    assert_eq!(recorder.len(), 2);
    recorder.save(dir).unwrap();
}

#[test]
fn record_then_replay_serves_responses_in_order() {
    let dir = tempfile::tempdir().unwrap();
    record_example(dir.path());

    let read = |name: &str| std::fs::read(dir.path().join(name)).unwrap();
    assert!(dir.path().join("chain.yaml").is_file());
    assert!(!dir.path().join("step_0_request.body").exists());
    assert_eq!(read("step_1_request.body"), b"x=1");
    assert_eq!(read("step_0_response.body"), b"hello");
    assert_eq!(read("step_1_response.body"), b"created");

    let registry = SharedRegistry::new();
    let mut offline = offline(&registry);
    let player = Player::global(dir.path());
    player.start(&registry).unwrap();

    let mut first = offline.send(&Request::get("/")).unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.reason, "OK");
    assert_eq!(first.header("content-type"), Some("text/plain"));
    assert_eq!(first.text().unwrap(), "hello");

    let mut second = offline.send(&Request::post("/", "x=1")).unwrap();
    assert_eq!(second.status, 201);
    assert_eq!(second.text().unwrap(), "created");

    assert!(matches!(
        offline.issue(&Request::get("/")),
        Err(Error::ChainExhausted)
    ));
    player.stop(&registry).unwrap();

    assert!(
        offline.inner().issued().is_empty(),
        "playback must not reach the real transport"
    );
}

#[test]
fn replayed_response_matches_recorded_response_exactly() {
    let body = b"\0tea\r\n\xEF\xBB\xBFpot\r\n".to_vec();
    let mut teapot = CannedResponse::new(418, "I'm a teapot")
        .with_header("Set-Cookie", "a=1")
        .with_header("Set-Cookie", "b=2")
        .with_header("Content-Type", "application/octet-stream")
        .with_body(body.clone());
    teapot.version = HttpVersion::Http10;

    let dir = tempfile::tempdir().unwrap();
    let registry = SharedRegistry::new();
    let server = FakeTransport::new("www.example.com").respond(teapot.clone());
    let mut transport = InterceptingTransport::new(server, registry.clone());
    let recorder = Recorder::global();
    let mut live = recorder
        .recording(&registry, || transport.send(&Request::get("/brew")))
        .unwrap()
        .unwrap();
    assert_eq!(live.bytes().unwrap(), body);
    recorder.save(dir.path()).unwrap();

    let registry = SharedRegistry::new();
    let mut offline = offline(&registry);
    let mut replayed = Player::global(dir.path())
        .playing(&registry, || offline.send(&Request::get("/brew")))
        .unwrap()
        .unwrap();

    assert_eq!(replayed.status, 418);
    assert_eq!(replayed.reason, "I'm a teapot");
    assert_eq!(replayed.version, HttpVersion::Http10);
    assert_eq!(replayed.headers, teapot.headers);
    assert_eq!(replayed.headers.len(), 3);
    assert_eq!(replayed.bytes().unwrap(), body);
}

#[test]
fn replay_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    record_example(dir.path());

    for _ in 0..2 {
        let registry = SharedRegistry::new();
        let mut offline = offline(&registry);
        let bodies = Player::global(dir.path())
            .playing(&registry, || {
                let mut first = offline.send(&Request::get("/")).unwrap();
                let mut second = offline.send(&Request::post("/", "x=1")).unwrap();
                (first.text().unwrap(), second.text().unwrap())
            })
            .unwrap();
        assert_eq!(bodies, ("hello".to_string(), "created".to_string()));
    }
}

#[test]
fn recorded_chain_has_one_step_per_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SharedRegistry::new();
    let mut server = FakeTransport::new("api.example.com");
    for n in 0..5 {
        server = server.respond(CannedResponse::ok(format!("reply {n}")));
    }
    let mut transport = InterceptingTransport::new(server, registry.clone());
    let recorder = Recorder::global();
    recorder
        .recording(&registry, || {
            for n in 0..5 {
                transport.send(&Request::get(format!("/items/{n}"))).unwrap();
            }
        })
        .unwrap();
    recorder.save(dir.path()).unwrap();

    let chain = PersistedChain::read(dir.path(), &ChainConfig::default()).unwrap();
    let ids: Vec<_> = chain.steps.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(ids, ["step_0", "step_1", "step_2", "step_3", "step_4"]);
    let nexts: Vec<_> = chain.steps.iter().map(|step| step.next.as_deref()).collect();
    assert_eq!(
        nexts,
        [
            Some("step_1"),
            Some("step_2"),
            Some("step_3"),
            Some("step_4"),
            None
        ]
    );
    assert!(chain.steps.iter().all(|step| step.host == "api.example.com"));
}

#[test]
fn stopped_player_resumes_where_it_left_off() {
    let dir = tempfile::tempdir().unwrap();
    record_example(dir.path());

    let registry = SharedRegistry::new();
    let mut offline = offline(&registry);
    let player = Player::global(dir.path());

    player.start(&registry).unwrap();
    offline.send(&Request::get("/")).unwrap();
    player.stop(&registry).unwrap();

    player.start(&registry).unwrap();
    let mut second = offline.send(&Request::post("/", "x=1")).unwrap();
    assert_eq!(second.text().unwrap(), "created");
    player.stop(&registry).unwrap();
}

#[test]
fn divergent_request_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    record_example(dir.path());

    let registry = SharedRegistry::new();
    let mut offline = offline(&registry);
    let player = Player::global(dir.path());
    player.start(&registry).unwrap();

    let err = offline.send(&Request::get("/elsewhere")).unwrap_err();
    match err {
        Error::Mismatch {
            step,
            expected,
            actual,
        } => {
            assert_eq!(step, "step_0");
            assert!(expected.contains("GET /"));
            assert!(actual.contains("/elsewhere"));
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
    assert_eq!(player.current_step().as_deref(), Some("step_0"));
}

#[test]
fn stopping_global_session_restores_per_caller_interception() {
    let dir = tempfile::tempdir().unwrap();
    record_example(dir.path());

    let registry = SharedRegistry::new();
    let mut watched = InterceptingTransport::new(scripted_server(), registry.clone());

    let per_caller = Recorder::new(CallerKey::instance(&watched));
    per_caller.start(&registry).unwrap();
    assert!(!registry.lock().unwrap().is_global());

    let global = Player::global(dir.path());
    global.start(&registry).unwrap();
    assert!(registry.lock().unwrap().is_global());

    let mut replayed = watched.send(&Request::get("/")).unwrap();
    assert_eq!(replayed.text().unwrap(), "hello");
    assert!(per_caller.is_empty());

    global.stop(&registry).unwrap();
    assert!(!registry.lock().unwrap().is_global());

    let mut live = watched.send(&Request::get("/")).unwrap();
    assert_eq!(live.text().unwrap(), "hello");
    assert_eq!(per_caller.len(), 1);
    assert_eq!(watched.inner().issued().len(), 1);

    per_caller.stop(&registry).unwrap();
    assert!(registry.lock().unwrap().is_empty());
}

struct BillingClient {
    id: CallerId,
}

impl Caller for BillingClient {
    fn caller_id(&self) -> CallerId {
        self.id
    }
}

#[test]
fn entered_caller_kind_routes_calls() {
    let registry = SharedRegistry::new();
    let mut transport = InterceptingTransport::new(scripted_server(), registry.clone());
    let recorder = Recorder::new(CallerKey::kind::<BillingClient>());
    recorder.start(&registry).unwrap();

    transport.send(&Request::get("/unattributed")).unwrap();
    assert!(recorder.is_empty());

    let client = BillingClient {
        id: CallerId::new(),
    };
    {
        let _frame = registry.enter(&client).unwrap();
        transport.send(&Request::post("/invoices", "x=1")).unwrap();
    }
    assert_eq!(recorder.len(), 1);
    assert_eq!(recorder.steps().unwrap()[0].request_url, "/invoices");
    assert!(registry.lock().unwrap().frames().is_empty());

    recorder.stop(&registry).unwrap();
}

#[test]
fn caller_entered_on_another_thread_does_not_claim_calls() {
    let registry = SharedRegistry::new();
    let recorder = Recorder::new(CallerKey::kind::<BillingClient>());
    recorder.start(&registry).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let worker_registry = registry.clone();
    let worker = thread::spawn(move || {
        let client = BillingClient {
            id: CallerId::new(),
        };
        let _frame = worker_registry.enter(&client).unwrap();
        entered_tx.send(()).unwrap();
        done_rx.recv().unwrap();

        let mut own = InterceptingTransport::new(scripted_server(), worker_registry.clone());
        own.send(&Request::get("/worker")).unwrap();
    });

    entered_rx.recv().unwrap();
    let mut transport = InterceptingTransport::new(scripted_server(), registry.clone());
    transport.send(&Request::get("/main")).unwrap();
    assert!(recorder.is_empty());

    done_tx.send(()).unwrap();
    worker.join().unwrap();

    let steps = recorder.steps().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].request_url, "/worker");
    recorder.stop(&registry).unwrap();
}

#[test]
fn pass_through_leaves_responses_untouched() {
    let registry = SharedRegistry::new();
    let mut transport = InterceptingTransport::new(scripted_server(), registry);

    let mut response = transport.send(&Request::get("/")).unwrap();
    assert!(!response.body_mut().is_deferred());
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert_eq!(response.text().unwrap(), "hello");
    assert_eq!(transport.into_inner().remaining(), 1);
}
