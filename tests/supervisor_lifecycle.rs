//! Pipeline lifecycle against real child processes

#![cfg(target_os = "linux")]

mod common;

use common::*;
use multicam_streamer::supervisor::{EnsureOutcome, StopOutcome, StreamHealth, SupervisorConfig};
use multicam_streamer::viewer_feed::FeedConfig;
use multicam_streamer::Error;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_spawns_one_process() {
    let marker = marker_file();
    let sup = supervisor(inventory(&[(1, &[1])]), &recording(&marker, FRAMES), 4);

    let results =
        futures::future::join_all((0..8).map(|_| sup.ensure_streaming(1))).await;
    let started = results
        .iter()
        .filter(|r| matches!(r, Ok(h) if h.outcome == EnsureOutcome::Started))
        .count();
    assert_eq!(started, 1);
    assert!(results.iter().all(|r| r.is_ok()));

    assert!(wait_until(Duration::from_secs(2), || spawn_count(&marker) >= 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(spawn_count(&marker), 1);
    assert_eq!(sup.live_count().await, 1);

    sup.shutdown_all().await;
    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
async fn test_capacity_cap_rejects_and_frees() {
    let sup = supervisor(inventory(&[(1, &[1, 2, 3, 4])]), FRAMES, 3);

    for id in 1..=3 {
        sup.ensure_streaming(id).await.unwrap();
    }
    assert!(matches!(
        sup.ensure_streaming(4).await,
        Err(Error::CapacityExceeded { limit: 3 })
    ));
    assert_eq!(sup.live_count().await, 3);
    assert!(!sup.is_streaming(4).await);

    // Existing cameras are not affected by the rejection
    for id in 1..=3 {
        assert!(sup.is_streaming(id).await);
    }

    assert_eq!(sup.stop(1).await.unwrap(), StopOutcome::Stopped);
    assert_eq!(
        sup.ensure_streaming(4).await.unwrap().outcome,
        EnsureOutcome::Started
    );

    sup.shutdown_all().await;
}

#[tokio::test]
async fn test_stalled_decoder_restarts_then_stops() {
    let sup = supervisor(inventory(&[(1, &[1])]), SILENT, 4);
    sup.ensure_streaming(1).await.unwrap();

    let mut seen_pids = BTreeSet::new();
    let mut saw_unresponsive = false;
    let deadline = Instant::now() + Duration::from_secs(15);

    loop {
        let snapshot = sup.snapshot().await;
        let status = &snapshot[0].status;
        if let Some(pid) = status.pid {
            seen_pids.insert(pid);
        }
        if status.health == StreamHealth::Unresponsive {
            saw_unresponsive = true;
        }
        if status.health == StreamHealth::Stopped {
            // Initial launch plus two restarts
            assert_eq!(status.launches, 3);
            break;
        }
        assert!(Instant::now() < deadline, "pipeline never reached Stopped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(saw_unresponsive);
    assert_eq!(seen_pids.len(), 3);
    for pid in &seen_pids {
        assert!(!process_exists(*pid), "decoder {} still running", pid);
    }
    assert_eq!(sup.live_count().await, 0);
}

#[tokio::test]
async fn test_healthy_pipeline_recovers_after_stall() {
    // One frame, then silence: Healthy → Unresponsive → Starting → Healthy
    let script = r#"printf "%012d" 0; exec sleep 30"#;
    let sup = supervisor_with(
        inventory(&[(1, &[1])]),
        script,
        4,
        SupervisorConfig {
            max_restart_attempts: 5,
            ..fast_config()
        },
    );
    let handle = sup.ensure_streaming(1).await.unwrap();

    assert!(
        wait_for_status(&sup, 1, Duration::from_secs(5), |s| {
            s.health == StreamHealth::Healthy
        })
        .await
    );
    let first_pid = sup.snapshot().await[0].status.pid;

    // The restarted decoder emits a frame again, resetting the attempt counter
    assert!(
        wait_for_status(&sup, 1, Duration::from_secs(5), |s| {
            s.launches >= 2 && s.health == StreamHealth::Healthy && s.restart_attempts == 0
        })
        .await
    );
    assert_ne!(sup.snapshot().await[0].status.pid, first_pid);

    // Sequence numbers keep increasing across the restart
    assert!(handle.buffer.latest().unwrap().seq >= 1);

    sup.shutdown_all().await;
}

#[tokio::test]
async fn test_stop_interrupts_in_flight_read() {
    let sup = supervisor_with(
        inventory(&[(1, &[1])]),
        SILENT,
        4,
        SupervisorConfig {
            frame_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(10),
            ..fast_config()
        },
    );
    sup.ensure_streaming(1).await.unwrap();
    let pid = sup.snapshot().await[0].status.pid.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    assert_eq!(sup.stop(1).await.unwrap(), StopOutcome::Stopped);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!process_exists(pid));
    assert!(sup.health(1).await.is_none());
}

#[tokio::test]
async fn test_two_viewers_share_one_process() {
    let marker = marker_file();
    let sup = supervisor(inventory(&[(1, &[1])]), &recording(&marker, FRAMES), 4);
    let feed_config = FeedConfig {
        max_fps: 10,
        idle_timeout: Duration::from_secs(5),
    };

    let mut a = sup.open_feed(1, &feed_config).await.unwrap();
    let mut b = sup.open_feed(1, &feed_config).await.unwrap();

    let frame_a = a.next_chunk().await.unwrap();
    let frame_b = b.next_chunk().await.unwrap();
    assert_eq!(&frame_a.data[..2], &[0xFF, 0xD8]);
    assert_eq!(&frame_b.data[..2], &[0xFF, 0xD8]);

    let snapshot = sup.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].viewers, 2);
    assert_eq!(spawn_count(&marker), 1);

    drop(a);
    assert_eq!(sup.snapshot().await[0].viewers, 1);

    // Stopping the pipeline ends the remaining viewer
    sup.stop(1).await.unwrap();
    let started = Instant::now();
    while b.next_chunk().await.is_some() {
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
async fn test_shutdown_all_terminates_every_decoder() {
    let sup = supervisor(inventory(&[(1, &[1, 2, 3])]), SILENT, 4);
    for id in 1..=3 {
        sup.ensure_streaming(id).await.unwrap();
    }
    let pids: Vec<u32> = sup
        .snapshot()
        .await
        .iter()
        .filter_map(|v| v.status.pid)
        .collect();
    assert_eq!(pids.len(), 3);

    sup.shutdown_all().await;

    assert_eq!(sup.live_count().await, 0);
    for pid in pids {
        assert!(!process_exists(pid));
    }
}

#[tokio::test]
async fn test_viewer_outlives_restarts_until_budget_exhausted() {
    // First launch emits one frame, every relaunch stays silent
    let flag = marker_file();
    let script = format!(
        r#"if [ -e {f} ]; then exec sleep 30; fi; touch {f}; printf "%012d" 0; exec sleep 30"#,
        f = flag.display()
    );
    let sup = supervisor_with(
        inventory(&[(1, &[1])]),
        &script,
        4,
        SupervisorConfig {
            restart_cooldown: Duration::from_millis(200),
            max_restart_attempts: 3,
            ..fast_config()
        },
    );
    let feed_config = FeedConfig {
        max_fps: 0,
        idle_timeout: Duration::from_secs(1),
    };

    let mut feed = sup.open_feed(1, &feed_config).await.unwrap();
    assert_eq!(feed.next_chunk().await.unwrap().seq, 0);

    let started = Instant::now();
    assert!(feed.next_chunk().await.is_none());

    // The feed only ended once the pipeline gave up
    assert!(started.elapsed() > Duration::from_millis(1500));
    let snapshot = sup.snapshot().await;
    assert_eq!(snapshot[0].status.health, StreamHealth::Stopped);
    assert_eq!(snapshot[0].status.launches, 4);

    let _ = std::fs::remove_file(&flag);
}

#[tokio::test]
async fn test_stall_detection_and_restart_timing() {
    // A short burst of frames, then silence
    let script = r#"i=0; while [ $i -lt 5 ]; do printf "%012d" 0; sleep 0.05; i=$((i+1)); done; exec sleep 30"#;
    let config = SupervisorConfig {
        frame_timeout: Duration::from_millis(500),
        read_timeout: Duration::from_millis(100),
        restart_cooldown: Duration::from_millis(300),
        max_restart_attempts: 2,
        ..fast_config()
    };
    let sup = supervisor_with(inventory(&[(1, &[1])]), script, 4, config.clone());
    sup.ensure_streaming(1).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut frames_published = 0;
    let mut last_frame_seen = Instant::now();
    let mut saw_healthy = false;
    let mut unresponsive_at = None;

    let relaunched_at = loop {
        assert!(Instant::now() < deadline, "no restart observed");
        let status = sup.snapshot().await[0].status.clone();
        let now = Instant::now();

        if status.frames_published != frames_published {
            frames_published = status.frames_published;
            last_frame_seen = now;
        }
        match status.health {
            StreamHealth::Healthy => saw_healthy = true,
            StreamHealth::Unresponsive if saw_healthy && unresponsive_at.is_none() => {
                unresponsive_at = Some(now)
            }
            _ => {}
        }
        if status.launches >= 2 {
            break now;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let unresponsive_at = unresponsive_at.expect("Unresponsive never observed");
    let stall = unresponsive_at - last_frame_seen;
    assert!(
        stall >= config.frame_timeout - Duration::from_millis(100),
        "marked unresponsive too early: {:?}",
        stall
    );
    assert!(
        stall <= config.frame_timeout + config.read_timeout + Duration::from_millis(250),
        "stall detected late: {:?}",
        stall
    );

    let relaunch = relaunched_at - unresponsive_at;
    assert!(
        relaunch >= config.restart_cooldown - Duration::from_millis(50),
        "relaunch skipped cooldown: {:?}",
        relaunch
    );
    assert!(
        relaunch <= config.restart_cooldown + Duration::from_millis(400),
        "relaunch late: {:?}",
        relaunch
    );

    sup.shutdown_all().await;
}
