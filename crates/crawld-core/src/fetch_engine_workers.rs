use crate::errbag::ErrBag;
use crate::fetch_engine_item::process_item;
use crate::fetch_engine_types::{CycleSummary, ItemOutcome, WorkItem};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) bag: ErrBag,
    pub(crate) archive_repos: bool,
    pub(crate) completions: mpsc::Sender<u64>,
}

/// Runs `workers` tasks over a queue pre-loaded with `work_items` and closed
/// before the first worker starts, then waits for all of them.
pub(crate) async fn run_work_items(
    work_items: Vec<WorkItem>,
    workers: usize,
    ctx: WorkerContext,
) -> CycleSummary {
    let (tx, rx) = mpsc::channel::<WorkItem>(work_items.len().max(1));
    for item in work_items {
        // capacity covers every item, so this never waits
        if tx.send(item).await.is_err() {
            break;
        }
    }
    drop(tx);

    let queue = Arc::new(Mutex::new(rx));
    let mut pool = JoinSet::new();
    for worker_id in 0..workers.max(1) {
        let queue = Arc::clone(&queue);
        let ctx = ctx.clone();
        pool.spawn(worker_loop(worker_id, queue, ctx));
    }

    let mut summary = CycleSummary::default();
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(worker_summary) => summary.merge(worker_summary),
            Err(err) => warn!(error = %err, "fetch worker terminated abnormally"),
        }
    }
    summary
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    ctx: WorkerContext,
) -> CycleSummary {
    let mut summary = CycleSummary::default();
    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(item) = next else {
            break;
        };
        let repo_id = item.id;
        let bag = ctx.bag.clone();
        let archive_repos = ctx.archive_repos;
        let outcome =
            match tokio::task::spawn_blocking(move || process_item(&item, &bag, archive_repos))
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(repo_id, error = %err, "repo processing panicked");
                    ctx.bag.record(&err);
                    ItemOutcome::Abandoned
                }
            };
        summary.record(outcome);
        if outcome.is_completed() && ctx.completions.send(repo_id).await.is_err() {
            debug!(repo_id, "completion stream closed; checkpoint not updated");
        }
    }
    debug!(worker_id, processed = summary.total(), "fetch worker done");
    summary
}
