//! End-to-end pipeline tests with an in-process parser and an in-memory database

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resume_ingest::error::{Error, Result};
use resume_ingest::processing::{
    CancellationRegistry, IngestWorker, JobQueue, PipelineCoordinator, StatusStore,
};
use resume_ingest::providers::{DocumentParser, LocalCandidateStore};
use resume_ingest::storage::IngestDb;
use resume_ingest::types::{
    JobIntake, PipelineStage, PipelineStatus, ProcessingJob, RawSkill, SkillCategory,
    StructuredResume, WorkExperience,
};
use resume_ingest::IngestConfig;

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Parser double with call counters and scripted behavior
#[derive(Default)]
struct FakeParser {
    extract_calls: AtomicUsize,
    structure_calls: AtomicUsize,
    /// Extraction fails with a rate limit this many times first
    rate_limit_first: usize,
    extract_delay: Option<Duration>,
    /// Runs after extraction, with the file location
    after_extract: Option<Hook>,
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_resume() -> StructuredResume {
    StructuredResume {
        skills: vec![
            RawSkill::new("javascript").with_proficiency(60.0),
            RawSkill::new("JavaScript").with_proficiency(80.0),
            RawSkill::new("react"),
        ],
        work_experience: vec![
            WorkExperience::between(date(2020, 1, 1), date(2022, 1, 1)),
            WorkExperience::current_since(date(2022, 6, 1)),
        ],
        summary: Some("Frontend engineer".to_string()),
        confidence: 0.87,
        ..Default::default()
    }
}

#[async_trait]
impl DocumentParser for FakeParser {
    async fn extract_text(&self, file_location: &str, _mime_type: &str) -> Result<String> {
        let call = self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.rate_limit_first {
            return Err(Error::rate_limited("429 Too Many Requests"));
        }
        if let Some(ref hook) = self.after_extract {
            hook(file_location);
        }
        Ok(format!("resume text from {}", file_location))
    }

    async fn structure(&self, _raw_text: &str, _mime_type: &str) -> Result<StructuredResume> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(sample_resume())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct Harness {
    db: Arc<IngestDb>,
    statuses: Arc<StatusStore>,
    parser: Arc<FakeParser>,
    coordinator: Arc<PipelineCoordinator>,
}

fn fast_config() -> IngestConfig {
    let mut config = IngestConfig::default();
    config.processing.retry_backoff_ms = 1;
    config.processing.workers = Some(3);
    config
}

fn harness_with(parser: FakeParser, statuses: Arc<StatusStore>, config: IngestConfig) -> Harness {
    let db = Arc::new(IngestDb::in_memory().unwrap());
    let parser = Arc::new(parser);
    let coordinator = PipelineCoordinator::new(
        Arc::new(config),
        statuses.clone(),
        parser.clone(),
        Arc::new(LocalCandidateStore::new(db.clone())),
    )
    .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));

    Harness {
        db,
        statuses,
        parser,
        coordinator: Arc::new(coordinator),
    }
}

fn harness(parser: FakeParser) -> Harness {
    harness_with(parser, Arc::new(StatusStore::new()), fast_config())
}

fn job(job_id: &str, candidate_id: &str) -> ProcessingJob {
    ProcessingJob::from_intake(intake(job_id, candidate_id))
}

fn intake(job_id: &str, candidate_id: &str) -> JobIntake {
    JobIntake {
        job_id: Some(job_id.to_string()),
        candidate_id: Some(candidate_id.to_string()),
        file_url: Some(format!("https://uploads.example.com/{}.pdf", job_id)),
        original_name: format!("{}.pdf", job_id),
        mime_type: "application/pdf".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_valid_job_end_to_end() {
    let h = harness(FakeParser::default());
    h.db.register_candidate("c-1").unwrap();
    let mut events = h.statuses.subscribe();

    let result = h.coordinator.process(&job("job-1", "c-1"), 1).await.unwrap();

    assert!(result.success);
    assert_eq!(result.candidate_id, "c-1");
    assert!(result.error.is_none());

    assert_eq!(h.db.count_parsed_resume_data().unwrap(), 1);
    assert_eq!(h.db.total_experience("c-1").unwrap(), Some(4.0));

    let stored = h.db.get_parsed_resume_data("c-1").unwrap().unwrap();
    assert_eq!(stored.skills.len(), 2);
    assert_eq!(stored.skills[0].name, "JavaScript");
    assert_eq!(stored.skills[0].proficiency, Some(80.0));
    assert_eq!(stored.skills[0].category, SkillCategory::ProgrammingLanguages);
    assert_eq!(stored.raw_text, "resume text from https://uploads.example.com/job-1.pdf");

    let status = h.statuses.get("job-1").unwrap();
    assert_eq!(status.stage, PipelineStage::Completed);
    assert_eq!(status.progress, 100);

    // Progress events never regress and end in the terminal state
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.progress);
    }
    assert_eq!(seen, vec![5, 10, 20, 40, 60, 80, 100]);

    // Late progress after completion is ignored
    assert!(!h.coordinator.report_progress("job-1", 40));
    assert_eq!(h.statuses.get("job-1").unwrap().progress, 100);
}

#[tokio::test]
async fn test_missing_candidate_id_fails_without_collaborators() {
    let h = harness(FakeParser::default());
    let mut job = job("job-1", "c-1");
    job.candidate_id = None;

    let result = h.coordinator.process(&job, 1).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Validation"));
    assert_eq!(h.parser.extract_calls.load(Ordering::SeqCst), 0);

    let status = h.statuses.get("job-1").unwrap();
    assert_eq!(status.stage, PipelineStage::Failed);
    assert!(status.progress <= 10);
}

#[tokio::test]
async fn test_unsupported_mime_type_fails_without_collaborators() {
    let h = harness(FakeParser::default());
    h.db.register_candidate("c-1").unwrap();
    let mut job = job("job-1", "c-1");
    job.mime_type = "image/png".to_string();

    let result = h.coordinator.process(&job, 1).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("image/png"));
    assert_eq!(h.parser.extract_calls.load(Ordering::SeqCst), 0);
    assert!(h.statuses.get("job-1").unwrap().progress <= 10);
}

#[tokio::test]
async fn test_second_resume_is_fatal_conflict() {
    let h = harness(FakeParser::default());
    h.db.register_candidate("c-1").unwrap();

    assert!(h.coordinator.process(&job("job-1", "c-1"), 1).await.unwrap().success);

    // Retryable attempts remain, but a conflict is never retried
    let second = h.coordinator.process(&job("job-2", "c-1"), 1).await.unwrap();
    assert!(!second.success);
    assert!(second.error.unwrap().contains("already exists"));

    assert_eq!(h.parser.extract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.db.count_parsed_resume_data().unwrap(), 1);
    assert_eq!(h.statuses.get("job-2").unwrap().stage, PipelineStage::Failed);
}

#[tokio::test]
async fn test_unknown_candidate_is_fatal() {
    let h = harness(FakeParser::default());

    let result = h.coordinator.process(&job("job-1", "ghost"), 1).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("ghost"));
    assert_eq!(h.parser.extract_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limit_rethrown_until_last_attempt() {
    let h = harness(FakeParser {
        rate_limit_first: usize::MAX,
        ..Default::default()
    });
    h.db.register_candidate("c-1").unwrap();
    let job = job("job-1", "c-1");

    let err = h.coordinator.process(&job, 1).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited(_)));
    assert!(!h.statuses.get("job-1").unwrap().is_terminal());

    let err = h.coordinator.process(&job, 2).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited(_)));

    let result = h.coordinator.process(&job, 3).await.unwrap();
    assert!(!result.success);

    let status = h.statuses.get("job-1").unwrap();
    assert_eq!(status.stage, PipelineStage::Failed);
    assert_eq!(status.attempt, 3);
}

#[tokio::test]
async fn test_retry_resumes_status_without_regressing() {
    let h = harness(FakeParser {
        rate_limit_first: 1,
        ..Default::default()
    });
    h.db.register_candidate("c-1").unwrap();
    let job = job("job-1", "c-1");
    let mut events = h.statuses.subscribe();

    assert!(h.coordinator.process(&job, 1).await.is_err());
    let first = h.statuses.get("job-1").unwrap();

    let result = h.coordinator.process(&job, 2).await.unwrap();
    assert!(result.success);

    let mut seen = Vec::new();
    while let Ok(status) = events.try_recv() {
        seen.push(status);
    }

    let progress: Vec<u8> = seen.iter().map(|s| s.progress).collect();
    assert!(
        progress.windows(2).all(|pair| pair[0] <= pair[1]),
        "progress went backwards across attempts: {:?}",
        progress
    );
    assert_eq!(progress.last(), Some(&100));
    assert!(seen.iter().any(|s| s.attempt == 2));
    assert!(seen.iter().all(|s| s.started_at == first.started_at));

    let last = h.statuses.get("job-1").unwrap();
    assert_eq!(last.attempt, 2);
    assert_eq!(last.started_at, first.started_at);
}

#[tokio::test]
async fn test_stage_timeout_is_fatal() {
    let mut config = fast_config();
    config.processing.stage_timeout_secs = 1;
    let h = harness_with(
        FakeParser {
            extract_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        },
        Arc::new(StatusStore::new()),
        config,
    );
    h.db.register_candidate("c-1").unwrap();

    let result = h.coordinator.process(&job("job-1", "c-1"), 1).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    let status = h.statuses.get("job-1").unwrap();
    assert_eq!(status.stage, PipelineStage::Failed);
    assert_eq!(status.progress, 20);
}

#[tokio::test]
async fn test_cancelled_candidate_discards_parser_result() {
    let cancellations = Arc::new(CancellationRegistry::new());
    let hook_registry = cancellations.clone();
    let once = std::sync::Once::new();
    let parser = FakeParser {
        after_extract: Some(Box::new(move |_| {
            once.call_once(|| {
                hook_registry.cancel_candidate("c-1");
            });
        })),
        ..Default::default()
    };

    let h = harness(parser);
    let coordinator = Arc::new(
        PipelineCoordinator::new(
            Arc::new(fast_config()),
            h.statuses.clone(),
            h.parser.clone(),
            Arc::new(LocalCandidateStore::new(h.db.clone())),
        )
        .with_cancellations(cancellations),
    );
    h.db.register_candidate("c-1").unwrap();

    let result = coordinator.process(&job("job-1", "c-1"), 1).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("cancelled"));
    assert_eq!(h.parser.extract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.parser.structure_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.db.count_parsed_resume_data().unwrap(), 0);
    assert_eq!(h.statuses.get("job-1").unwrap().stage, PipelineStage::Failed);

    // A job started after the request is not affected by it
    tokio::time::sleep(Duration::from_millis(5)).await;
    let result = coordinator.process(&job("job-2", "c-1"), 1).await.unwrap();
    assert!(result.success);
    assert_eq!(h.db.count_parsed_resume_data().unwrap(), 1);

    // The watchdog sweep drops the spent request
    coordinator.fail_stalled(Utc::now() + chrono::Duration::hours(1));
    assert!(coordinator.cancellations().is_empty());
}

#[tokio::test]
async fn test_force_failed_job_stops_at_next_boundary() {
    let statuses = Arc::new(StatusStore::new());
    let hook_statuses = statuses.clone();
    let parser = FakeParser {
        after_extract: Some(Box::new(move |_| {
            hook_statuses.update("job-1", |current| {
                current.map(|s| s.failed("stalled: exceeded max job duration"))
            });
        })),
        ..Default::default()
    };

    let h = harness_with(parser, statuses, fast_config());
    h.db.register_candidate("c-1").unwrap();

    let result = h.coordinator.process(&job("job-1", "c-1"), 1).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("stalled"));
    assert_eq!(h.parser.structure_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.db.count_parsed_resume_data().unwrap(), 0);
}

#[tokio::test]
async fn test_watchdog_finalizes_stalled_status() {
    let h = harness(FakeParser::default());
    let mut stuck = PipelineStatus::started("job-9", "c-9", 1).advanced_to(40);
    stuck.started_at = Utc::now() - chrono::Duration::hours(2);
    h.statuses.upsert("job-9", stuck);

    let failed = h.coordinator.fail_stalled(Utc::now());

    assert_eq!(failed, vec!["job-9".to_string()]);
    let status = h.statuses.get("job-9").unwrap();
    assert_eq!(status.stage, PipelineStage::Failed);
    assert_eq!(status.progress, 40);
}

#[tokio::test]
async fn test_sync_work_experience_rewrites_total() {
    let h = harness(FakeParser::default());
    h.db.register_candidate("c-1").unwrap();
    h.coordinator.process(&job("job-1", "c-1"), 1).await.unwrap();

    let history = vec![WorkExperience::between(date(2018, 1, 1), date(2024, 1, 1))];
    let aggregate = h.coordinator.sync_work_experience("c-1", &history).await.unwrap();

    assert_eq!(aggregate.total_experience, 6.0);
    assert_eq!(h.db.total_experience("c-1").unwrap(), Some(6.0));
    let stored = h.db.get_parsed_resume_data("c-1").unwrap().unwrap();
    assert_eq!(stored.work_experience, history);

    let err = h.coordinator.sync_work_experience("nobody", &history).await.unwrap_err();
    assert!(matches!(err, Error::CandidateNotFound(_)));
}

#[tokio::test]
async fn test_skill_update_is_copy_on_write() {
    let h = harness(FakeParser::default());
    h.db.register_candidate("c-1").unwrap();
    h.coordinator.process(&job("job-1", "c-1"), 1).await.unwrap();

    let original = h.db.get_parsed_resume_data("c-1").unwrap().unwrap().skills;
    let updated = h
        .coordinator
        .update_skill_proficiency("c-1", &original, "React", 95.0)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(original[1].proficiency, None);
    assert_eq!(updated[1].proficiency, Some(95.0));

    let stored = h.db.get_parsed_resume_data("c-1").unwrap().unwrap().skills;
    assert_eq!(stored, updated);

    let missing = h
        .coordinator
        .update_skill_proficiency("c-1", &original, "Haskell", 10.0)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_durable_status_survives_restart() {
    let db = Arc::new(IngestDb::in_memory().unwrap());
    db.register_candidate("c-1").unwrap();
    let statuses = Arc::new(StatusStore::with_database(db.clone()).unwrap());

    let coordinator = PipelineCoordinator::new(
        Arc::new(fast_config()),
        statuses,
        Arc::new(FakeParser::default()),
        Arc::new(LocalCandidateStore::new(db.clone())),
    );
    assert!(coordinator.process(&job("job-1", "c-1"), 1).await.unwrap().success);

    let reloaded = StatusStore::with_database(db).unwrap();
    let status = reloaded.get("job-1").unwrap();
    assert_eq!(status.stage, PipelineStage::Completed);
    assert_eq!(status.progress, 100);
}

#[tokio::test]
async fn test_worker_pool_retries_and_finishes_all_jobs() {
    let h = harness(FakeParser {
        rate_limit_first: 1,
        ..Default::default()
    });

    let config = fast_config();
    let (queue, receiver) = JobQueue::new(&config.processing);
    let pool = IngestWorker::new(h.coordinator.clone(), queue.clone()).spawn(receiver);
    assert_eq!(pool.worker_count(), 3);

    for i in 0..5 {
        let candidate = format!("c-{}", i);
        h.db.register_candidate(&candidate).unwrap();
        queue.submit(intake(&format!("job-{}", i), &candidate)).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .unwrap();

    let stats = queue.stats();
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.succeeded, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.retried, 1);
    assert_eq!(h.parser.extract_calls.load(Ordering::SeqCst), 6);
    assert_eq!(h.db.count_parsed_resume_data().unwrap(), 5);

    for i in 0..5 {
        let result = queue.result(&format!("job-{}", i)).unwrap();
        assert!(result.success);
    }

    pool.shutdown().await;
}
