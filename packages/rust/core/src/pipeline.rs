//! The pipeline runner: tree × elements × rows → committed targets + report.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use importkit_operators::ConfigElement;
use importkit_shared::{
    ColumnIndex, Context, Element, ElementId, ImportKitError, Persister, Result, RowData, RunId,
    RunSettings, Target,
};

use crate::cancel::CancelToken;
use crate::report::{ElementOutcome, RowError, RowFailure, RunReport};

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called once, before any element starts.
    fn run_started(&self, run_id: &RunId, elements: usize);
    /// Called when a row fails.
    fn row_failed(&self, failure: &RowFailure);
    /// Called when all rows of an element have been attempted.
    fn element_finished(&self, element: &ElementId, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn run_started(&self, _run_id: &RunId, _elements: usize) {}
    fn row_failed(&self, _failure: &RowFailure) {}
    fn element_finished(&self, _element: &ElementId, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Runs a built transform tree over element batches.
///
/// The tree is shared read-only between element tasks; every row gets its own
/// [`Context`] and [`Target`].
pub struct Pipeline {
    root: Arc<ConfigElement>,
    persister: Arc<dyn Persister>,
    settings: RunSettings,
    progress: Arc<dyn ProgressReporter>,
}

/// Per-element slot, kept in batch order so the report is deterministic.
enum Slot {
    Skipped,
    Running(JoinHandle<Result<ElementOutcome>>),
}

impl Pipeline {
    pub fn new(root: ConfigElement, persister: Arc<dyn Persister>, settings: RunSettings) -> Self {
        Self {
            root: Arc::new(root),
            persister,
            settings,
            progress: Arc::new(SilentProgress),
        }
    }

    /// Report progress to `progress` instead of discarding it.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn root(&self) -> &ConfigElement {
        &self.root
    }

    /// Run the tree over every row of every element under a fresh run ID.
    pub async fn run(
        &self,
        elements: Vec<Element>,
        rows_per_element: Vec<Vec<RowData>>,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        self.run_as(RunId::new(), elements, rows_per_element, cancel)
            .await
    }

    /// Run the tree under a caller-chosen run ID.
    ///
    /// `rows_per_element[i]` holds the rows of `elements[i]`. Row failures are
    /// collected in the report; only a malformed batch or a crashed worker
    /// fails the whole run.
    #[instrument(skip_all, fields(run_id = %run_id, elements = elements.len()))]
    pub async fn run_as(
        &self,
        run_id: RunId,
        elements: Vec<Element>,
        rows_per_element: Vec<Vec<RowData>>,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        if elements.len() != rows_per_element.len() {
            return Err(ImportKitError::validation(format!(
                "got {} elements but {} row sets",
                elements.len(),
                rows_per_element.len()
            )));
        }
        if self.settings.concurrency == 0 {
            return Err(ImportKitError::validation("concurrency must be at least 1"));
        }

        let started_at = Utc::now();
        let total = elements.len();
        info!(
            concurrency = self.settings.concurrency,
            admin_mode = self.settings.admin_mode,
            dry_run = self.settings.dry_run,
            "starting run"
        );
        self.progress.run_started(&run_id, total);

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency as usize));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut slots = Vec::with_capacity(total);

        for (element, rows) in elements.into_iter().zip(rows_per_element) {
            if !element.published && !self.settings.admin_mode {
                debug!(element = %element.id, "skipping unpublished element");
                slots.push(Slot::Skipped);
                continue;
            }

            let sem = semaphore.clone();
            let cancel = cancel.clone();
            let root = self.root.clone();
            let persister = self.persister.clone();
            let progress = self.progress.clone();
            let finished = finished.clone();
            let dry_run = self.settings.dry_run;

            slots.push(Slot::Running(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| ImportKitError::Worker(e.to_string()))?;

                if cancel.is_cancelled() {
                    return Ok(ElementOutcome {
                        skipped: true,
                        cancelled: true,
                        ..Default::default()
                    });
                }

                let outcome =
                    run_element(&root, persister.as_ref(), progress.as_ref(), &element, rows, dry_run)
                        .await;
                let current = finished.fetch_add(1, Ordering::SeqCst) + 1;
                progress.element_finished(&element.id, current, total);
                Ok(outcome)
            })));
        }

        let mut report = RunReport {
            run_id,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            elements_skipped: 0,
            cancelled: false,
            started_at,
            finished_at: started_at,
        };

        let mut slots = slots.into_iter();
        while let Some(slot) = slots.next() {
            let outcome = match slot {
                Slot::Skipped => ElementOutcome {
                    skipped: true,
                    ..Default::default()
                },
                Slot::Running(handle) => {
                    let joined = handle
                        .await
                        .map_err(|e| ImportKitError::Worker(e.to_string()))
                        .and_then(|outcome| outcome);
                    match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(error = %e, "worker failed, stopping remaining elements");
                            halt(slots).await;
                            return Err(e);
                        }
                    }
                }
            };
            report.attempted += outcome.attempted;
            report.succeeded += outcome.succeeded;
            report.failed += outcome.failures.len();
            report.failures.extend(outcome.failures);
            if outcome.skipped {
                report.elements_skipped += 1;
            }
            report.cancelled |= outcome.cancelled;
        }
        report.finished_at = Utc::now();

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.elements_skipped,
            cancelled = report.cancelled,
            "run finished"
        );
        self.progress.done(&report);
        Ok(report)
    }
}

/// Abort every remaining element task and wait until none of them can still
/// reach the persister.
async fn halt(slots: impl Iterator<Item = Slot>) {
    let handles: Vec<_> = slots
        .filter_map(|slot| match slot {
            Slot::Running(handle) => {
                handle.abort();
                Some(handle)
            }
            Slot::Skipped => None,
        })
        .collect();
    for handle in handles {
        let _ = handle.await;
    }
}

/// Attempt every row of one element in order.
async fn run_element(
    root: &ConfigElement,
    persister: &dyn Persister,
    progress: &dyn ProgressReporter,
    element: &Element,
    rows: Vec<RowData>,
    dry_run: bool,
) -> ElementOutcome {
    let mut outcome = ElementOutcome::default();

    for (row_index, mut row) in rows.into_iter().enumerate() {
        outcome.attempted += 1;
        let mut target = Target::new();
        let mut context = Context::new();

        let result = match root.process(element, &mut target, &mut row, ColumnIndex(0), &mut context)
        {
            Err(e) => Err(RowError::Transform(e)),
            Ok(()) if dry_run => Ok(()),
            Ok(()) => persister
                .save(&element.id, &target)
                .await
                .map_err(RowError::Persist),
        };

        match result {
            Ok(()) => outcome.succeeded += 1,
            Err(cause) => {
                warn!(element = %element.id, row = row_index, %cause, "row failed");
                let failure = RowFailure {
                    element: element.id.clone(),
                    row_index,
                    cause,
                };
                progress.row_failed(&failure);
                outcome.failures.push(failure);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use importkit_operators::Operator;
    use importkit_operators::leaf::{ConstantOperator, UppercaseOperator};
    use importkit_shared::{PersistError, TransformError};
    use serde_json::json;
    use std::sync::Mutex;

    use crate::memory::MemoryStore;

    /// Fails on rows whose first cell is "bad"; otherwise copies it to `raw`.
    #[derive(Debug)]
    struct PickyOperator;

    impl Operator for PickyOperator {
        fn kind(&self) -> &str {
            "picky"
        }

        fn process(
            &self,
            _element: &Element,
            target: &mut Target,
            row: &mut RowData,
            column: ColumnIndex,
            _context: &mut Context,
        ) -> std::result::Result<(), TransformError> {
            match row.cell(column) {
                Some("bad") => Err(TransformError::new("picky", column, "bad format")),
                Some(cell) => {
                    target.set("raw", json!(cell), None);
                    Ok(())
                }
                None => Err(TransformError::new("picky", column, "missing cell")),
            }
        }
    }

    /// Fails if the context already holds a marker, then sets it.
    #[derive(Debug)]
    struct MarkContext;

    impl Operator for MarkContext {
        fn kind(&self) -> &str {
            "mark"
        }

        fn process(
            &self,
            _element: &Element,
            _target: &mut Target,
            _row: &mut RowData,
            column: ColumnIndex,
            context: &mut Context,
        ) -> std::result::Result<(), TransformError> {
            if context.insert("seen", json!(true)).is_some() {
                return Err(TransformError::new("mark", column, "context leaked"));
            }
            Ok(())
        }
    }

    /// Panics when processing the named element.
    #[derive(Debug)]
    struct ExplodesOn(&'static str);

    impl Operator for ExplodesOn {
        fn kind(&self) -> &str {
            "explodes"
        }

        fn process(
            &self,
            element: &Element,
            target: &mut Target,
            _row: &mut RowData,
            _column: ColumnIndex,
            _context: &mut Context,
        ) -> std::result::Result<(), TransformError> {
            if element.id.0 == self.0 {
                panic!("operator bug");
            }
            target.set("ok", json!(true), None);
            Ok(())
        }
    }

    /// Rejects saves for one element.
    struct RejectingStore {
        reject: ElementId,
        saved: Mutex<Vec<ElementId>>,
    }

    #[async_trait]
    impl Persister for RejectingStore {
        async fn save(
            &self,
            element: &ElementId,
            _target: &Target,
        ) -> std::result::Result<(), PersistError> {
            if *element == self.reject {
                return Err(PersistError::new(element.clone(), "constraint violated"));
            }
            self.saved.lock().unwrap().push(element.clone());
            Ok(())
        }
    }

    fn rows(cells: &[&str]) -> Vec<RowData> {
        cells.iter().map(|c| RowData::from(&[*c][..])).collect()
    }

    fn picky_tree() -> ConfigElement {
        ConfigElement::iterator(vec![ConfigElement::leaf(PickyOperator)])
    }

    fn settings(concurrency: u32) -> RunSettings {
        RunSettings {
            concurrency,
            admin_mode: false,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn commits_transformed_target() {
        let store = Arc::new(MemoryStore::new());
        let tree = ConfigElement::iterator(vec![
            ConfigElement::leaf(UppercaseOperator::new("name", None)),
            ConfigElement::leaf(ConstantOperator::new("status", json!("imported"))),
        ]);
        let pipeline = Pipeline::new(tree, store.clone(), settings(1));

        let report = pipeline
            .run(
                vec![Element::new("p-1", "Product")],
                vec![rows(&["alice"])],
                &CancelToken::new(),
            )
            .await
            .expect("run");

        assert_eq!((report.attempted, report.succeeded, report.failed), (1, 1, 0));
        assert!(report.is_clean());
        let saved = store.targets(&ElementId::from("p-1")).await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].get("name"), Some(&json!("ALICE")));
        assert_eq!(saved[0].get("status"), Some(&json!("imported")));
    }

    #[tokio::test]
    async fn failing_row_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(picky_tree(), store.clone(), settings(2));

        let report = pipeline
            .run(
                vec![Element::new("p-1", "Product")],
                vec![rows(&["a", "bad", "c", "d"])],
                &CancelToken::new(),
            )
            .await
            .expect("run");

        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].row_index, 1);
        assert!(matches!(
            &report.failures[0].cause,
            RowError::Transform(e) if e.cause == "bad format"
        ));
        assert_eq!(store.save_count().await, 3);
    }

    #[tokio::test]
    async fn persist_failure_is_a_row_failure() {
        let store = Arc::new(RejectingStore {
            reject: ElementId::from("p-2"),
            saved: Mutex::new(Vec::new()),
        });
        let pipeline = Pipeline::new(picky_tree(), store.clone(), settings(2));

        let report = pipeline
            .run(
                vec![Element::new("p-1", "Product"), Element::new("p-2", "Product")],
                vec![rows(&["a"]), rows(&["b", "c"])],
                &CancelToken::new(),
            )
            .await
            .expect("run");

        assert_eq!((report.attempted, report.succeeded, report.failed), (3, 1, 2));
        assert!(report
            .failures
            .iter()
            .all(|f| f.element == ElementId::from("p-2") && matches!(f.cause, RowError::Persist(_))));
        assert_eq!(*store.saved.lock().unwrap(), vec![ElementId::from("p-1")]);
    }

    #[tokio::test]
    async fn context_is_fresh_per_row() {
        let store = Arc::new(MemoryStore::new());
        let tree = ConfigElement::iterator(vec![ConfigElement::leaf(MarkContext)]);
        let pipeline = Pipeline::new(tree, store, settings(1));

        let report = pipeline
            .run(
                vec![Element::new("p-1", "Product")],
                vec![rows(&["a", "b", "c"])],
                &CancelToken::new(),
            )
            .await
            .expect("run");
        assert_eq!(report.succeeded, 3);
    }

    #[tokio::test]
    async fn unpublished_skipped_unless_admin() {
        let mut hidden = Element::new("p-2", "Product");
        hidden.published = false;
        let elements = vec![Element::new("p-1", "Product"), hidden];
        let batch = vec![rows(&["a"]), rows(&["b"])];

        let store = Arc::new(MemoryStore::new());
        let report = Pipeline::new(picky_tree(), store.clone(), settings(2))
            .run(elements.clone(), batch.clone(), &CancelToken::new())
            .await
            .expect("run");
        assert_eq!(report.attempted, 1);
        assert_eq!(report.elements_skipped, 1);
        assert!(store.targets(&ElementId::from("p-2")).await.is_empty());

        let admin = RunSettings {
            admin_mode: true,
            ..settings(2)
        };
        let store = Arc::new(MemoryStore::new());
        let report = Pipeline::new(picky_tree(), store.clone(), admin)
            .run(elements, batch, &CancelToken::new())
            .await
            .expect("run");
        assert_eq!(report.attempted, 2);
        assert_eq!(report.elements_skipped, 0);
        assert_eq!(store.targets(&ElementId::from("p-2")).await.len(), 1);
    }

    #[tokio::test]
    async fn dry_run_saves_nothing() {
        let store = Arc::new(MemoryStore::new());
        let dry = RunSettings {
            dry_run: true,
            ..settings(1)
        };
        let report = Pipeline::new(picky_tree(), store.clone(), dry)
            .run(
                vec![Element::new("p-1", "Product")],
                vec![rows(&["a", "bad"])],
                &CancelToken::new(),
            )
            .await
            .expect("run");

        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(store.save_count().await, 0);
    }

    #[tokio::test]
    async fn cancelled_run_skips_unstarted_elements() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let store = Arc::new(MemoryStore::new());

        let report = Pipeline::new(picky_tree(), store.clone(), settings(2))
            .run(
                vec![Element::new("p-1", "Product"), Element::new("p-2", "Product")],
                vec![rows(&["a"]), rows(&["b"])],
                &cancel,
            )
            .await
            .expect("run");

        assert!(report.cancelled);
        assert_eq!(report.elements_skipped, 2);
        assert_eq!(report.attempted, 0);
        assert_eq!(store.save_count().await, 0);
    }

    #[tokio::test]
    async fn mismatched_batch_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = Pipeline::new(picky_tree(), store.clone(), settings(1))
            .run(
                vec![Element::new("p-1", "Product")],
                vec![rows(&["a"]), rows(&["b"])],
                &CancelToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ImportKitError::Validation { .. }));
        assert_eq!(store.save_count().await, 0);
    }

    #[tokio::test]
    async fn zero_concurrency_rejected() {
        let err = Pipeline::new(picky_tree(), Arc::new(MemoryStore::new()), settings(0))
            .run(Vec::new(), Vec::new(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportKitError::Validation { .. }));
    }

    #[tokio::test]
    async fn failures_ordered_by_element_then_row() {
        let elements: Vec<Element> = (0..20)
            .map(|i| Element::new(format!("p-{i:02}"), "Product"))
            .collect();
        let batch: Vec<Vec<RowData>> = (0..20).map(|_| rows(&["bad", "ok", "bad"])).collect();

        let report = Pipeline::new(picky_tree(), Arc::new(MemoryStore::new()), settings(4))
            .run(elements, batch, &CancelToken::new())
            .await
            .expect("run");

        assert_eq!(report.attempted, 60);
        assert_eq!(report.failed, 40);
        let order: Vec<(String, usize)> = report
            .failures
            .iter()
            .map(|f| (f.element.0.clone(), f.row_index))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[tokio::test]
    async fn panicking_operator_fails_run() {
        let tree = ConfigElement::iterator(vec![ConfigElement::leaf(ExplodesOn("p-1"))]);
        let err = Pipeline::new(tree, Arc::new(MemoryStore::new()), settings(1))
            .run(
                vec![Element::new("p-1", "Product")],
                vec![rows(&["a"])],
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ImportKitError::Worker(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_failure_stops_other_elements() {
        let store = Arc::new(MemoryStore::new());
        let tree = ConfigElement::iterator(vec![ConfigElement::leaf(ExplodesOn("p-0"))]);
        let elements: Vec<Element> = (0..4)
            .map(|i| Element::new(format!("p-{i}"), "Product"))
            .collect();
        let batch: Vec<Vec<RowData>> = (0..4)
            .map(|_| rows(&["a", "b", "c", "d", "e"]))
            .collect();

        let err = Pipeline::new(tree, store.clone(), settings(4))
            .run(elements, batch, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportKitError::Worker(_)));

        let saves_at_return = store.save_count().await;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(store.save_count().await, saves_at_return);
        assert!(store.targets(&ElementId::from("p-0")).await.is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_committed_rows() {
        /// Cancels the run as soon as the first element finishes.
        struct CancelAfterFirst(CancelToken);

        impl ProgressReporter for CancelAfterFirst {
            fn run_started(&self, _run_id: &RunId, _elements: usize) {}
            fn row_failed(&self, _failure: &RowFailure) {}
            fn element_finished(&self, _element: &ElementId, _current: usize, _total: usize) {
                self.0.cancel();
            }
            fn done(&self, _report: &RunReport) {}
        }

        let cancel = CancelToken::new();
        let store = Arc::new(MemoryStore::new());
        let elements = vec![
            Element::new("p-1", "Product"),
            Element::new("p-2", "Product"),
            Element::new("p-3", "Product"),
        ];
        let batch = vec![rows(&["a", "b"]), rows(&["c", "d"]), rows(&["e", "f"])];

        let report = Pipeline::new(picky_tree(), store.clone(), settings(1))
            .with_progress(Arc::new(CancelAfterFirst(cancel.clone())))
            .run(elements, batch, &cancel)
            .await
            .expect("run");

        assert!(report.cancelled);
        assert_eq!(report.elements_skipped, 2);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(store.save_count().await, 2);

        let mut committed = 0;
        for id in ["p-1", "p-2", "p-3"] {
            let saved = store.targets(&ElementId::from(id)).await.len();
            assert!(saved == 0 || saved == 2, "element {id} partially committed");
            committed += saved;
        }
        assert_eq!(committed, 2);
    }

    #[tokio::test]
    async fn progress_sees_every_element() {
        #[derive(Default)]
        struct Counting {
            finished: AtomicUsize,
            failed: AtomicUsize,
            done: AtomicUsize,
        }

        impl ProgressReporter for Counting {
            fn run_started(&self, _run_id: &RunId, _elements: usize) {}
            fn row_failed(&self, _failure: &RowFailure) {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            fn element_finished(&self, _element: &ElementId, _current: usize, _total: usize) {
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
            fn done(&self, _report: &RunReport) {
                self.done.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counting = Arc::new(Counting::default());
        Pipeline::new(picky_tree(), Arc::new(MemoryStore::new()), settings(3))
            .with_progress(counting.clone())
            .run(
                vec![Element::new("p-1", "Product"), Element::new("p-2", "Product")],
                vec![rows(&["a", "bad"]), rows(&["b"])],
                &CancelToken::new(),
            )
            .await
            .expect("run");

        assert_eq!(counting.finished.load(Ordering::SeqCst), 2);
        assert_eq!(counting.failed.load(Ordering::SeqCst), 1);
        assert_eq!(counting.done.load(Ordering::SeqCst), 1);
    }
}
