mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use pagediff::{
    BatchComparator, BatchOptions, BatchTask, ReportWriterRegistry, TestStatus,
};

use common::{strip_registry, write_strip};

#[tokio::test]
async fn batch_aggregates_statuses_and_writes_a_report() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let report_dir = dir.path().join("report");

    let same = [(8, 8, [10, 20, 30])];
    write_strip(&dir.path().join("ok-base.strip"), &same);
    write_strip(&dir.path().join("ok-out.strip"), &same);
    write_strip(&dir.path().join("bad-base.strip"), &same);
    write_strip(&dir.path().join("bad-out.strip"), &[(8, 8, [0, 0, 0])]);
    write_strip(&dir.path().join("lonely-base.strip"), &same);

    let registry = strip_registry(Arc::new(AtomicUsize::new(0)));
    let options = BatchOptions {
        cache_dir: Some(dir.path().join("cache")),
        title: Some("nightly".into()),
        ..BatchOptions::default()
    };
    let mut batch = BatchComparator::new(registry, &report_dir, options);
    batch.add_task(BatchTask::new(
        "ok",
        dir.path().join("ok-base.strip"),
        dir.path().join("ok-out.strip"),
    ));
    batch.add_task(BatchTask::new(
        "bad",
        dir.path().join("bad-base.strip"),
        dir.path().join("bad-out.strip"),
    ));
    batch.add_task(BatchTask::new(
        "expected-missing",
        dir.path().join("ghost.strip"),
        dir.path().join("ok-out.strip"),
    ));
    batch.add_task(BatchTask::new(
        "actual-missing",
        dir.path().join("lonely-base.strip"),
        dir.path().join("ghost.strip"),
    ));

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    batch.on_progress(move |p| sink.lock().unwrap().push((p.current, p.limit, p.name.clone())));

    let report = batch.exec().await?;
    assert_eq!(report.title, "nightly");
    assert_eq!(report.cases.len(), 4);
    assert_eq!(report.cases[0].status, TestStatus::Matched);
    assert_eq!(report.cases[1].status, TestStatus::Mismatched);
    assert_eq!(report.cases[2].status, TestStatus::ExpectedNotFound);
    assert_eq!(report.cases[3].status, TestStatus::ActualNotFound);

    // per-page details only exist for cases that actually ran
    assert_eq!(report.cases[0].details.len(), 1);
    assert_eq!(report.cases[0].details[0].ratio, 0.0);
    assert!(report.cases[1].details[0].ratio > 0.001);
    assert!(report.cases[2].details.is_empty());

    // artifacts landed under the report's image directory
    assert!(report_dir.join("image/bad/0.png").exists());
    assert!(!report_dir.join("image/ok/0.png").exists());

    let progress = progress.lock().unwrap();
    assert_eq!(progress.len(), 4);
    assert_eq!(progress[0], (1, 4, "ok".to_string()));
    assert_eq!(progress[3].0, 4);

    // report writer registered at configuration time
    let writers = ReportWriterRegistry::with_defaults();
    writers.write("json", &report, &report_dir)?;
    let raw = std::fs::read(report_dir.join("report.json"))?;
    let value: serde_json::Value = serde_json::from_slice(&raw)?;
    assert_eq!(value["cases"][1]["status"], "Mismatched");
    Ok(())
}

#[tokio::test]
async fn batch_reuses_the_baseline_cache_across_tasks() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("base.strip");
    let out = dir.path().join("out.strip");
    let pages = [(8, 8, [10, 20, 30]), (8, 8, [200, 100, 0])];
    write_strip(&base, &pages);
    write_strip(&out, &pages);

    let renders = Arc::new(AtomicUsize::new(0));
    let registry = strip_registry(renders.clone());
    let options = BatchOptions {
        cache_dir: Some(dir.path().join("cache")),
        ..BatchOptions::default()
    };
    let mut batch = BatchComparator::new(registry, dir.path().join("report"), options);
    batch.add_task(BatchTask::new("first", &base, &out));
    batch.add_task(BatchTask::new("second", &base, &out));
    let report = batch.exec().await?;

    assert!(report
        .cases
        .iter()
        .all(|case| case.status == TestStatus::Matched));
    // baseline rendered once (2 pages); the actual side twice (4 pages)
    assert_eq!(renders.load(std::sync::atomic::Ordering::SeqCst), 6);
    Ok(())
}
