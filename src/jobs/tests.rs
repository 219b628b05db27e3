//! Jobs Module Tests
//!
//! ## Test Scopes
//! - **Lifecycle**: status transitions, retry budget, illegal calls.
//! - **Parser**: keywords, comments, quoting, substitution.
//! - **Pool**: lookups by current worker.
//! - **Scheduling**: claiming, lost workers, outcome reports, a full run.

#[cfg(test)]
mod tests {
    use crate::error::SwarmError;
    use crate::executor::types::RunJobTask;
    use crate::jobs::parser::{parse_job, tokenize};
    use crate::jobs::pool::JobPool;
    use crate::jobs::types::{DEFAULT_MAX_RETRIES, Job, JobDescription, JobStatus};
    use crate::membership::types::{NodeId, NodeRole, NodeStatus};
    use crate::secrets::types::SwarmSecrets;
    use crate::testing::{LocalNetwork, create_node, eventually, join_node, test_config};
    use std::time::Duration;
    use tempfile::TempDir;

    fn description(id: &str) -> JobDescription {
        JobDescription {
            id: id.to_string(),
            setup: vec![],
            execute: vec![],
            collect: vec![],
            result: format!("results/{}.zip", id),
        }
    }

    fn worker(id: &str) -> NodeId {
        NodeId::from(id)
    }

    // ============================================================
    // LIFECYCLE TESTS
    // ============================================================

    #[test]
    fn test_successful_run() {
        // ARRANGE
        let job = Job::create(description("job-1"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);

        // ACT
        let running = job.with_start(&worker("w1")).unwrap();
        let done = running.with_succeeded().unwrap();

        // ASSERT
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.runs, 1);
        assert!(running.is_running_on(&worker("w1")));
        assert_eq!(done.status, JobStatus::Succeeded);
        assert!(done.started.contains_key(&0));
        assert!(done.stopped.contains_key(&0));
        assert_eq!(done.worker_node_id.get(&0), Some(&worker("w1")));
        assert!(done.current_worker().is_none());
    }

    #[test]
    fn test_lost_worker_returns_job_to_pending() {
        let job = Job::create(description("job-1"))
            .with_start(&worker("w1"))
            .unwrap();

        let lost = job.with_lost_node(&worker("w1")).unwrap();

        assert_eq!(lost.status, JobStatus::Pending);
        assert_eq!(lost.max_retries, DEFAULT_MAX_RETRIES + 1);
        assert!(lost.errors[&0].contains("w1"));
        assert!(lost.stopped.contains_key(&0));
    }

    #[test]
    fn test_each_lost_worker_extends_budget() {
        let mut job = Job::create(description("job-1"));
        for i in 0..5 {
            let id = worker(&format!("w{}", i));
            job = job.with_start(&id).unwrap().with_lost_node(&id).unwrap();
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES + i + 1);
        }
        assert_eq!(job.runs, 5);
    }

    #[test]
    fn test_lost_worker_on_last_run_fails_job() {
        // ARRANGE: two failed runs use up all but the last retry
        let mut job = Job::create(description("job-1"));
        for _ in 0..2 {
            job = job
                .with_start(&worker("w1"))
                .unwrap()
                .with_failed("exit 1")
                .unwrap();
        }
        assert_eq!(job.status, JobStatus::Pending);

        // ACT
        let lost = job
            .with_start(&worker("w2"))
            .unwrap()
            .with_lost_node(&worker("w2"))
            .unwrap();

        // ASSERT
        assert_eq!(lost.runs, DEFAULT_MAX_RETRIES);
        assert_eq!(lost.status, JobStatus::Failed);
        assert_eq!(lost.max_retries, DEFAULT_MAX_RETRIES + 1);
        assert!(lost.errors[&2].contains("w2"));
    }

    #[test]
    fn test_lost_worker_before_last_run_is_retried() {
        let job = Job::create(description("job-1"))
            .with_start(&worker("w1"))
            .unwrap()
            .with_failed("exit 1")
            .unwrap()
            .with_start(&worker("w2"))
            .unwrap()
            .with_lost_node(&worker("w2"))
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);

        // The extra budget from the lost run allows two more attempts.
        let third = job.with_start(&worker("w3")).unwrap().with_failed("exit 1").unwrap();
        assert_eq!(third.status, JobStatus::Pending);
        let fourth = third.with_start(&worker("w4")).unwrap().with_failed("exit 1").unwrap();
        assert_eq!(fourth.status, JobStatus::Failed);
    }

    #[test]
    fn test_failures_exhaust_retries() {
        let mut job = Job::create(description("job-1"));
        let mut statuses = Vec::new();
        for i in 0..DEFAULT_MAX_RETRIES {
            job = job
                .with_start(&worker("w1"))
                .unwrap()
                .with_failed(&format!("exit {}", i))
                .unwrap();
            statuses.push(job.status);
        }

        assert_eq!(
            statuses,
            vec![JobStatus::Pending, JobStatus::Pending, JobStatus::Failed]
        );
        assert_eq!(job.errors.len(), 3);
        assert_eq!(job.errors[&2], "exit 2");
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let pending = Job::create(description("job-1"));
        let running = pending.with_start(&worker("w1")).unwrap();

        let err = pending.with_succeeded().unwrap_err();
        assert!(matches!(
            err,
            SwarmError::IllegalTransition { from: JobStatus::Pending, operation: "WithSucceeded", .. }
        ));
        assert!(running.with_start(&worker("w2")).is_err());
        assert!(pending.with_failed("boom").is_err());
        assert!(pending.with_lost_node(&worker("w1")).is_err());

        let done = running.with_succeeded().unwrap();
        assert!(done.with_failed("late").is_err());
    }

    // ============================================================
    // PARSER TESTS
    // ============================================================

    #[test]
    fn test_parse_full_description() {
        // ARRANGE
        let src = r#"
            # render a scene
            SETUP apps/render.zip
            Execute
              render.exe
              --scene "my scene.blend" --id {jobid}   # trailing comment
            COLLECT out
            result results/{JOBID}.zip
        "#;

        // ACT
        let job = parse_job(src, &SwarmSecrets::new()).unwrap();

        // ASSERT
        assert!(job.id.starts_with("job-"));
        assert_eq!(job.setup, vec!["apps/render.zip"]);
        assert_eq!(job.execute.len(), 1);
        assert_eq!(job.execute[0].exe, "render.exe");
        assert_eq!(
            job.execute[0].args,
            format!("--scene \"my scene.blend\" --id {}", job.id)
        );
        assert_eq!(job.collect, vec!["out"]);
        assert_eq!(job.result, format!("results/{}.zip", job.id));
    }

    #[test]
    fn test_parse_substitutes_secrets() {
        let secrets = SwarmSecrets::new().set("TOKEN", "s3cr3t");
        let src = "EXECUTE\nupload\n--token {token}\nRESULT out.zip";

        let job = parse_job(src, &secrets).unwrap();

        assert_eq!(job.execute[0].args, "--token s3cr3t");
    }

    #[test]
    fn test_parse_requires_exactly_one_result() {
        let secrets = SwarmSecrets::new();

        let missing = parse_job("SETUP a.zip", &secrets).unwrap_err();
        assert!(missing.to_string().contains("RESULT"));

        assert!(parse_job("RESULT a.zip\nRESULT b.zip", &secrets).is_err());
        assert!(parse_job("RESULT a.zip b.zip", &secrets).is_err());
        assert!(parse_job("EXECUTE\nonly-exe\n", &secrets).is_err());
    }

    #[test]
    fn test_tokenize_respects_quotes() {
        assert_eq!(
            tokenize(r#"a "b c"  d"#),
            vec!["a".to_string(), "b c".to_string(), "d".to_string()]
        );
        assert!(tokenize("   ").is_empty());
    }

    // ============================================================
    // POOL TESTS
    // ============================================================

    #[test]
    fn test_pool_finds_jobs_by_current_worker() {
        let pool = JobPool::new();
        pool.upsert(Job::create(description("job-a")).with_start(&worker("w1")).unwrap());
        pool.upsert(Job::create(description("job-b")).with_start(&worker("w2")).unwrap());
        pool.upsert(
            Job::create(description("job-c"))
                .with_start(&worker("w1"))
                .unwrap()
                .with_succeeded()
                .unwrap(),
        );

        let lost = pool.lost_jobs_for_worker(&worker("w1"));

        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].id(), "job-a");
        assert_eq!(
            pool.list().iter().map(|j| j.id()).collect::<Vec<_>>(),
            vec!["job-a", "job-b", "job-c"]
        );
    }

    // ============================================================
    // SCHEDULING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_run_job_claims_idle_worker_once() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;
        let job = Job::create(description("job-1")).with_start(a.self_id()).unwrap();

        assert!(a.handle_run_job(RunJobTask::create(job.clone())));
        assert_eq!(a.directory.self_node().status, NodeStatus::Busy);
        assert!(!a.handle_run_job(RunJobTask::create(job)));
        assert_eq!(a.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_run_job_rejected_by_client_node() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let mut config = test_config("node-a", "localhost", 7001, dir.path());
        config.role = NodeRole::Client;
        let a = create_node(&net, config).await;
        let job = Job::create(description("job-1")).with_start(a.self_id()).unwrap();

        assert!(!a.handle_run_job(RunJobTask::create(job)));
        assert!(a.queue.is_empty());
    }

    #[tokio::test]
    async fn test_submit_on_non_primary_lands_on_primary() {
        let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir_a.path())).await;
        let b = join_node(&net, test_config("node-b", "localhost", 7002, dir_b.path()), &a).await;

        let job_id = b.handle_submit_job("RESULT out/{JOBID}.zip").await.unwrap();

        let job = a.jobs.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(b.jobs.is_empty());
        assert_eq!(a.queue.try_dequeue().unwrap().kind(), "ScheduleJob");
    }

    #[tokio::test]
    async fn test_lost_worker_reschedules_job() {
        // ARRANGE
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;
        let running = Job::create(description("job-1")).with_start(&worker("gone")).unwrap();
        a.jobs.upsert(running);

        // ACT
        a.handle_lost_workers(&[worker("gone")]).await;

        // ASSERT
        let job = a.jobs.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES + 1);
        assert_eq!(a.queue.try_dequeue().unwrap().kind(), "ScheduleJob");
    }

    #[tokio::test]
    async fn test_outcome_from_stale_worker_is_ignored() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;
        let running = Job::create(description("job-1")).with_start(&worker("w2")).unwrap();
        a.jobs.upsert(running.clone());

        let report = crate::executor::types::JobFinishedTask::create(running, worker("w1"), None);
        a.apply_job_finished(report).await.unwrap();

        let job = a.jobs.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.is_running_on(&worker("w2")));
    }

    #[tokio::test]
    async fn test_failed_outcome_is_retried() {
        let dir = TempDir::new().unwrap();
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir.path())).await;
        let running = Job::create(description("job-1")).with_start(&worker("w1")).unwrap();
        a.jobs.upsert(running.clone());

        let report = crate::executor::types::JobFinishedTask::create(
            running,
            worker("w1"),
            Some("exit 1".to_string()),
        );
        a.apply_job_finished(report).await.unwrap();

        let job = a.jobs.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.errors[&0], "exit 1");
        assert_eq!(a.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        // ARRANGE
        let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let net = LocalNetwork::new();
        let a = create_node(&net, test_config("node-a", "localhost", 7001, dir_a.path())).await;
        let b = join_node(&net, test_config("node-b", "localhost", 7002, dir_b.path()), &a).await;
        let mut handles = a.start();
        handles.extend(b.start());

        // ACT
        let job_id = a
            .handle_submit_job("# nothing to run\nCOLLECT missing\nRESULT results/{JOBID}.zip")
            .await
            .unwrap();
        let finished = eventually(Duration::from_secs(10), || {
            a.jobs
                .get(&job_id)
                .is_some_and(|j| j.status == JobStatus::Succeeded)
        })
        .await;

        // ASSERT
        assert!(finished);
        let job = a.jobs.get(&job_id).unwrap();
        let result_name = format!("results/{}.zip", job_id);
        let ran_on = job.worker_node_id[&0].clone();
        let runner = if &ran_on == a.self_id() { &a } else { &b };
        assert!(runner.store.read(&result_name).await.unwrap().is_some());
        assert!(runner.directory.self_node().files.contains_key(&result_name));

        let idle = eventually(Duration::from_secs(5), || {
            runner.directory.self_node().status == NodeStatus::Idle
        })
        .await;
        assert!(idle);

        a.shutdown();
        b.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
