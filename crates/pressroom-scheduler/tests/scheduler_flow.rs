// End-to-end flows through the store, dispatcher and polling loop using an
// in-memory SQLite database and stub publish targets.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pressroom_core::{
    PublishError, PublishResolver, PublishTarget, Publishable, SchedulerConfig,
};
use pressroom_scheduler::{
    Dispatcher, ExecutionOutcome, ScheduleFrequency, ScheduleStatus, ScheduleStore, ScheduledItem,
    SchedulerLoop, SqliteScheduleStore,
};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};

/// Resolver over an in-memory "content database": publishing records the
/// content ID; IDs absent from the set fail to resolve.
struct FakeContent {
    known: HashSet<String>,
    published: Arc<Mutex<Vec<String>>>,
}

struct FakePost {
    id: String,
    published: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Publishable for FakePost {
    async fn publish(&self) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(self.id.clone());
        Ok(())
    }
}

#[async_trait]
impl PublishResolver for FakeContent {
    async fn resolve(&self, target: &PublishTarget) -> Option<Box<dyn Publishable>> {
        let id = target.content_id();
        if !self.known.contains(id) {
            return None;
        }
        Some(Box::new(FakePost {
            id: id.to_string(),
            published: self.published.clone(),
        }))
    }
}

type Fixture = (
    Arc<SqliteScheduleStore>,
    Arc<FakeContent>,
    Arc<Mutex<Vec<String>>>,
);

fn fixture(known: &[&str]) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store =
        Arc::new(SqliteScheduleStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let published = Arc::new(Mutex::new(Vec::new()));
    let resolver = Arc::new(FakeContent {
        known: known.iter().map(|s| s.to_string()).collect(),
        published: published.clone(),
    });
    (store, resolver, published)
}

#[tokio::test]
async fn once_item_full_lifecycle() {
    let (store, resolver, published) = fixture(&["blog-1"]);
    let dispatcher = Dispatcher::new(store.clone(), resolver, Duration::from_secs(5));

    let item = ScheduledItem::new(
        Utc::now() + chrono::Duration::hours(1),
        Some("blog-1".into()),
        None,
    )
    .unwrap();
    store.save(&item).unwrap();

    // Not due yet.
    assert!(store.get_due_items(Utc::now()).unwrap().is_empty());

    // Due two hours on; one dispatch completes it.
    let now = Utc::now() + chrono::Duration::hours(2);
    let due = store.get_due_items(now).unwrap();
    assert_eq!(due.len(), 1);

    let mut due_item = due.into_iter().next().unwrap();
    let outcome = dispatcher.execute(&mut due_item, now).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(published.lock().unwrap().as_slice(), ["blog-1"]);

    let loaded = store.get_by_id(&item.id).unwrap();
    assert_eq!(loaded.status, ScheduleStatus::Completed);
    assert_eq!(loaded.next_execution, None);

    // Completed items never show up as due again.
    assert!(store
        .get_due_items(now + chrono::Duration::days(1))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn weekly_item_with_max_executions_completes_after_third_run() {
    let (store, resolver, published) = fixture(&["soc-7"]);
    let dispatcher = Dispatcher::new(store.clone(), resolver, Duration::from_secs(5));

    let item = ScheduledItem::new(
        Utc::now() + chrono::Duration::hours(1),
        None,
        Some("soc-7".into()),
    )
    .unwrap()
    .with_frequency(ScheduleFrequency::Weekly)
    .with_max_executions(3);
    store.save(&item).unwrap();

    let mut now = Utc::now() + chrono::Duration::hours(2);
    for run in 1..=3u32 {
        let due = store.get_due_items(now).unwrap();
        assert_eq!(due.len(), 1, "run {run} should have one due item");
        let mut due_item = due.into_iter().next().unwrap();
        let outcome = dispatcher.execute(&mut due_item, now).await.unwrap();

        if run < 3 {
            let ExecutionOutcome::Rescheduled { next_execution } = outcome else {
                panic!("run {run}: expected Rescheduled, got {outcome:?}");
            };
            assert!(next_execution > now);
            now = next_execution;
        } else {
            assert_eq!(outcome, ExecutionOutcome::Completed);
        }
    }

    assert_eq!(published.lock().unwrap().len(), 3);
    let loaded = store.get_by_id(&item.id).unwrap();
    assert_eq!(loaded.status, ScheduleStatus::Completed);
    assert_eq!(loaded.execution_count, 3);
}

#[tokio::test]
async fn deleted_content_retries_then_abandons() {
    // "blog-gone" is scheduled but no longer exists in the content database.
    let (store, resolver, published) = fixture(&[]);
    let dispatcher = Dispatcher::new(store.clone(), resolver, Duration::from_secs(5));

    let item = ScheduledItem::new(
        Utc::now() + chrono::Duration::hours(1),
        Some("blog-gone".into()),
        None,
    )
    .unwrap()
    .with_max_retries(2);
    store.save(&item).unwrap();

    let mut now = Utc::now() + chrono::Duration::hours(2);
    for attempt in 1..=2u32 {
        let mut due_item = store.get_due_items(now).unwrap().into_iter().next().unwrap();
        let outcome = dispatcher.execute(&mut due_item, now).await.unwrap();
        let ExecutionOutcome::Retrying { next_execution, .. } = outcome else {
            panic!("attempt {attempt}: expected Retrying, got {outcome:?}");
        };
        // Backoff doubles: 5 min, then 10 min.
        let expected = now + chrono::Duration::minutes(5 * 2i64.pow(attempt - 1));
        assert_eq!(next_execution, expected);
        now = next_execution;
    }

    let mut due_item = store.get_due_items(now).unwrap().into_iter().next().unwrap();
    let outcome = dispatcher.execute(&mut due_item, now).await.unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Abandoned { .. }));

    let loaded = store.get_by_id(&item.id).unwrap();
    assert_eq!(loaded.status, ScheduleStatus::Failed);
    assert_eq!(loaded.next_execution, None);
    assert!(published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn one_bad_target_does_not_block_the_pass() {
    let (store, resolver, published) = fixture(&["blog-ok"]);
    let config = SchedulerConfig {
        db_path: ":memory:".into(),
        poll_interval_secs: 1,
        dispatch_timeout_secs: 5,
    };
    let (tx, mut rx) = mpsc::channel(16);
    let scheduler = SchedulerLoop::new(store.clone(), resolver, config, Some(tx));

    let broken = ScheduledItem::new(
        Utc::now() + chrono::Duration::milliseconds(200),
        Some("blog-gone".into()),
        None,
    )
    .unwrap();
    let healthy = ScheduledItem::new(
        Utc::now() + chrono::Duration::milliseconds(250),
        Some("blog-ok".into()),
        None,
    )
    .unwrap();
    store.save(&broken).unwrap();
    store.save(&healthy).unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.pass().await;

    // Both items were dispatched; the broken one retried, the healthy one
    // published.
    assert_eq!(published.lock().unwrap().as_slice(), ["blog-ok"]);
    let mut outcomes = Vec::new();
    while let Ok(record) = rx.try_recv() {
        outcomes.push(record);
    }
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().any(
        |r| r.item_id == broken.id && matches!(r.outcome, ExecutionOutcome::Retrying { .. })
    ));
    assert!(outcomes.iter().any(
        |r| r.item_id == healthy.id && matches!(r.outcome, ExecutionOutcome::Completed)
    ));
}

#[tokio::test]
async fn scheduler_loop_honours_shutdown() {
    let (store, resolver, _) = fixture(&[]);
    let config = SchedulerConfig {
        db_path: ":memory:".into(),
        poll_interval_secs: 1,
        dispatch_timeout_secs: 5,
    };
    let scheduler = SchedulerLoop::new(store, resolver, config, None);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop must exit promptly on shutdown")
        .unwrap();
}

#[tokio::test]
async fn cancelling_schedules_for_deleted_content() {
    let (store, resolver, _) = fixture(&["blog-1"]);
    let _ = resolver; // cancellation is store-side only

    let first = ScheduledItem::new(
        Utc::now() + chrono::Duration::hours(1),
        Some("blog-1".into()),
        None,
    )
    .unwrap();
    let second = ScheduledItem::new(
        Utc::now() + chrono::Duration::hours(2),
        Some("blog-1".into()),
        None,
    )
    .unwrap();
    store.save(&first).unwrap();
    store.save(&second).unwrap();

    // The content-deletion flow: look up by owning post, cancel each.
    for mut item in store.get_by_blog_post("blog-1").unwrap() {
        item.cancel().unwrap();
        store.save(&item).unwrap();
    }

    assert!(store.get_pending().unwrap().is_empty());
    assert!(store
        .get_due_items(Utc::now() + chrono::Duration::days(1))
        .unwrap()
        .is_empty());
    for item in store.get_by_blog_post("blog-1").unwrap() {
        assert_eq!(item.status, ScheduleStatus::Cancelled);
    }
}
