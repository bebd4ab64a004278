use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kman_bootstrap::{AsyncStart, Bootstrap, BootstrapError};
use tokio::sync::Barrier;

type Journal = Arc<Mutex<Vec<String>>>;

enum Behavior {
    Ok,
    Sleep(Duration),
    Fail(&'static str),
    Panic,
    Rendezvous(Arc<Barrier>),
}

struct Component {
    name: &'static str,
    phase: i32,
    behavior: Behavior,
    journal: Journal,
    started: AtomicBool,
}

impl Component {
    fn new(name: &'static str, phase: i32, behavior: Behavior, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            phase,
            behavior,
            journal: journal.clone(),
            started: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl AsyncStart for Component {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> i32 {
        self.phase
    }

    async fn start_async(&self) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        self.journal.lock().unwrap().push(format!("begin {}", self.name));
        match &self.behavior {
            Behavior::Ok => {}
            Behavior::Sleep(d) => tokio::time::sleep(*d).await,
            Behavior::Fail(msg) => anyhow::bail!("{}", msg),
            Behavior::Panic => panic!("component exploded"),
            Behavior::Rendezvous(barrier) => {
                barrier.wait().await;
            }
        }
        self.journal.lock().unwrap().push(format!("end {}", self.name));
        Ok(())
    }
}

#[tokio::test]
async fn phases_run_in_ascending_order() {
    let journal = Journal::default();
    let mut bootstrap = Bootstrap::new(Duration::from_secs(5));
    bootstrap
        .register(Component::new("late", 10, Behavior::Ok, &journal))
        .register(Component::new("first", -5, Behavior::Sleep(Duration::from_millis(20)), &journal))
        .register(Component::new("middle", 0, Behavior::Ok, &journal));

    let report = bootstrap.run().await.unwrap();
    assert_eq!(report.started(), vec!["first", "middle", "late"]);
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["begin first", "end first", "begin middle", "end middle", "begin late", "end late"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn components_of_one_phase_start_concurrently() {
    let journal = Journal::default();
    let barrier = Arc::new(Barrier::new(3));
    let mut bootstrap = Bootstrap::new(Duration::from_secs(5));
    for name in ["a", "b", "c"] {
        bootstrap.register(Component::new(name, 0, Behavior::Rendezvous(barrier.clone()), &journal));
    }

    // Sequential starts would never pass the barrier and hit the timeout.
    let report = bootstrap.run().await.unwrap();
    assert_eq!(report.component_count(), 3);
    assert_eq!(report.phases.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_in_phase_zero_stops_later_phases() {
    let journal = Journal::default();
    let quick = Component::new("A", 0, Behavior::Ok, &journal);
    let stuck = Component::new("B", 0, Behavior::Sleep(Duration::from_secs(3_600)), &journal);
    let next = Component::new("C", 1, Behavior::Ok, &journal);

    let mut bootstrap = Bootstrap::new(Duration::from_secs(10));
    bootstrap.register(quick.clone()).register(stuck).register(next.clone());

    let err = bootstrap.run().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Timeout { .. }));
    assert_eq!(err.component(), "B");
    assert_eq!(err.phase(), 0);
    assert!(err.to_string().contains("'B'"));

    assert!(quick.started.load(Ordering::SeqCst));
    assert!(!next.started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failure_reports_first_failed_component_in_registration_order() {
    let journal = Journal::default();
    let mut bootstrap = Bootstrap::new(Duration::from_secs(5));
    bootstrap
        .register(Component::new("ok", 0, Behavior::Ok, &journal))
        .register(Component::new("broken", 0, Behavior::Fail("no brokers"), &journal))
        .register(Component::new("also-broken", 0, Behavior::Fail("bad config"), &journal));

    let err = bootstrap.run().await.unwrap_err();
    assert_eq!(err.component(), "broken");
    assert!(err.to_string().contains("no brokers"));
    // Every component of the failing phase still ran to completion.
    assert!(journal.lock().unwrap().contains(&"end ok".to_string()));
}

#[tokio::test]
async fn panicking_component_is_named() {
    let journal = Journal::default();
    let mut bootstrap = Bootstrap::new(Duration::from_secs(5));
    bootstrap.register(Component::new("fragile", 2, Behavior::Panic, &journal));

    let err = bootstrap.run().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Panicked { .. }));
    assert_eq!(err.component(), "fragile");
    assert_eq!(err.phase(), 2);
}
