#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use futures::future::join_all;
    use parking_lot::Mutex;
    use crate::config::{Config, TransportConfig};
    use crate::core::*;

    fn manager_with(transport: TransportConfig) -> UploadManager {
        let config = Config {
            transport,
            ..Default::default()
        };
        UploadManager::from_config(&config).unwrap()
    }

    fn fast_manager(tick_interval_ms: u64) -> UploadManager {
        manager_with(TransportConfig {
            tick_interval_ms,
            ..Default::default()
        })
    }

    async fn add_file(manager: &UploadManager, name: &str, size: u64) -> UploadFile {
        manager
            .create_file(FileMeta::new(name, size, "application/octet-stream"), vec![0u8; 16])
            .await
            .unwrap()
    }

    // 等待进度达到 min
    async fn wait_for_progress(manager: &UploadManager, id: FileId, min: u8) -> UploadFile {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let file = manager.get_by_id(id).unwrap();
                if file.progress >= min {
                    return file;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap()
    }

    fn assert_non_decreasing(values: &[u8]) {
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {:?}", values);
    }

    #[tokio::test]
    async fn test_created_file_is_pending() {
        let manager = fast_manager(5);
        let file = add_file(&manager, "a.bin", 16).await;

        assert_eq!(file.status, UploadStatus::Pending);
        assert_eq!(file.progress, 0);
        assert_eq!(manager.state(file.id), TaskState::Live(UploadStatus::Pending));
    }

    #[tokio::test]
    async fn test_upload_progress_ends_at_100() {
        let manager = fast_manager(5);
        let file = add_file(&manager, "a.bin", 16).await;

        let mut seen = Vec::new();
        let done = manager.start_upload(file.id, |p| seen.push(p)).await.unwrap();

        assert!(!seen.is_empty());
        assert_non_decreasing(&seen);
        assert_eq!(seen.last(), Some(&100));

        assert_eq!(done.status, UploadStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.uploaded_at.is_some());
        assert_eq!(
            done.remote_url.as_deref(),
            Some(format!("https://example.com/files/{}", file.id).as_str())
        );
        assert_eq!(manager.get_by_id(file.id).unwrap(), done);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let manager = fast_manager(5);
        let file = add_file(&manager, "a.bin", 16).await;
        manager.start_upload(file.id, |_| {}).await.unwrap();

        let err = manager.start_upload(file.id, |_| {}).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidTransition { from: UploadStatus::Completed, event: TaskEvent::Start }
        ));
    }

    #[tokio::test]
    async fn test_start_unknown_file() {
        let manager = fast_manager(5);
        let err = manager.start_upload(FileId::new(), |_| {}).await.unwrap_err();
        assert!(matches!(err, UploadError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pause_while_pending_is_invalid() {
        let manager = fast_manager(5);
        let file = add_file(&manager, "a.bin", 16).await;

        let err = manager.pause(file.id).unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidTransition { from: UploadStatus::Pending, event: TaskEvent::Pause }
        ));
        assert!(matches!(manager.resume(file.id), Err(UploadError::InvalidTransition { .. })));
        assert_eq!(manager.get_by_id(file.id).unwrap().status, UploadStatus::Pending);
    }

    #[tokio::test]
    async fn test_pause_freezes_and_resume_continues() {
        let manager = Arc::new(fast_manager(20));
        let file = add_file(&manager, "a.bin", 16).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = manager.spawn_upload(file.id, {
            let seen = seen.clone();
            move |p| seen.lock().push(p)
        });

        wait_for_progress(&manager, file.id, 1).await;
        let paused = manager.pause(file.id).unwrap();
        assert_eq!(paused.status, UploadStatus::Paused);
        assert!(matches!(manager.resume(paused.id), Ok(_)));
        let paused = manager.pause(file.id).unwrap();

        // several ticks worth of waiting
        tokio::time::sleep(Duration::from_millis(120)).await;
        let frozen = manager.get_by_id(file.id).unwrap();
        assert_eq!(frozen.status, UploadStatus::Paused);
        assert_eq!(frozen.progress, paused.progress);
        assert!(seen.lock().iter().all(|p| *p <= paused.progress));

        manager.resume(file.id).unwrap();
        let done = handle.await.unwrap().unwrap();
        assert_eq!(done.status, UploadStatus::Completed);

        let seen = seen.lock();
        assert_non_decreasing(&seen);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.iter().any(|p| *p > paused.progress));
    }

    #[tokio::test]
    async fn test_fault_marks_failed_and_keeps_progress() {
        let manager = manager_with(TransportConfig {
            tick_interval_ms: 2,
            fail_at: Some(50),
            ..Default::default()
        });
        let file = add_file(&manager, "a.bin", 16).await;

        let mut seen = Vec::new();
        let err = manager.start_upload(file.id, |p| seen.push(p)).await.unwrap_err();
        assert!(matches!(err, UploadError::TransportFailure(_)));

        let failed = manager.get_by_id(file.id).unwrap();
        assert_eq!(failed.status, UploadStatus::Failed);
        assert!(failed.progress < 50);
        assert_eq!(failed.progress, seen.last().copied().unwrap_or(0));
        assert!(failed.error.as_deref().unwrap().contains("injected fault"));
        assert!(failed.uploaded_at.is_none());
        assert!(failed.remote_url.is_none());

        let retried = manager.retry(file.id).unwrap();
        assert_eq!(retried.status, UploadStatus::Pending);
        assert_eq!(retried.progress, 0);
        assert!(retried.error.is_none());
    }

    #[tokio::test]
    async fn test_retry_rules() {
        let manager = fast_manager(5);
        let file = add_file(&manager, "a.bin", 16).await;

        // never started: uniform reset
        assert_eq!(manager.retry(file.id).unwrap().status, UploadStatus::Pending);

        manager.start_upload(file.id, |_| {}).await.unwrap();
        assert!(matches!(
            manager.retry(file.id),
            Err(UploadError::InvalidTransition { from: UploadStatus::Completed, event: TaskEvent::Retry })
        ));
    }

    #[tokio::test]
    async fn test_cancel_mid_transfer() {
        let tick = Duration::from_millis(50);
        let manager = Arc::new(fast_manager(50));
        let file = add_file(&manager, "a.bin", 16).await;
        let other = add_file(&manager, "b.bin", 16).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = manager.spawn_upload(file.id, {
            let seen = seen.clone();
            move |p| seen.lock().push(p)
        });

        wait_for_progress(&manager, file.id, 1).await;
        assert!(manager.cancel(file.id).unwrap());

        assert!(matches!(manager.get_by_id(file.id), Err(UploadError::NotFound(_))));
        assert_eq!(manager.state(file.id), TaskState::Removed);
        assert_eq!(
            manager.get_all().iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![other.id]
        );

        // the transfer stops within one tick of the cancel
        let result = tokio::time::timeout(tick * 2, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(UploadError::NotFound(id)) if id == file.id));

        let fired = seen.lock().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), fired);
    }

    #[tokio::test]
    async fn test_cancel_paused_upload() {
        let tick = Duration::from_millis(50);
        let manager = Arc::new(fast_manager(50));
        let file = add_file(&manager, "a.bin", 16).await;
        let handle = manager.spawn_upload(file.id, |_| {});

        wait_for_progress(&manager, file.id, 1).await;
        manager.pause(file.id).unwrap();
        assert!(manager.cancel(file.id).unwrap());

        let result = tokio::time::timeout(tick * 2, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(UploadError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_any_state_and_twice() {
        let manager = fast_manager(5);
        let pending = add_file(&manager, "a.bin", 16).await;
        let completed = add_file(&manager, "b.bin", 16).await;
        manager.start_upload(completed.id, |_| {}).await.unwrap();

        assert!(manager.cancel(pending.id).unwrap());
        assert!(manager.cancel(completed.id).unwrap());
        assert!(matches!(manager.cancel(pending.id), Err(UploadError::NotFound(_))));
        assert!(matches!(manager.delete(completed.id), Err(UploadError::NotFound(_))));
        assert!(manager.get_all().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_are_independent() {
        let manager = manager_with(TransportConfig {
            tick_interval_ms: 5,
            ..Default::default()
        });

        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(add_file(&manager, &format!("{i}.bin"), 16).await.id);
        }

        let results = join_all(ids.iter().map(|id| manager.start_upload(*id, |_| {}))).await;
        for (id, result) in ids.iter().zip(results) {
            let file = result.unwrap();
            assert_eq!(file.id, *id);
            assert_eq!(file.status, UploadStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_pausing_one_file_does_not_block_another() {
        let manager = Arc::new(fast_manager(5));
        let slow = add_file(&manager, "slow.bin", 16).await;
        let fast = add_file(&manager, "fast.bin", 16).await;

        let slow_handle = manager.spawn_upload(slow.id, |_| {});
        wait_for_progress(&manager, slow.id, 1).await;
        manager.pause(slow.id).unwrap();

        let done = tokio::time::timeout(Duration::from_secs(2), manager.start_upload(fast.id, |_| {}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, UploadStatus::Completed);
        assert_eq!(manager.get_by_id(slow.id).unwrap().status, UploadStatus::Paused);

        manager.resume(slow.id).unwrap();
        assert_eq!(slow_handle.await.unwrap().unwrap().status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn test_two_file_summary() {
        let manager = fast_manager(2);
        let a = add_file(&manager, "one.bin", 1_048_576).await;
        let b = add_file(&manager, "two.bin", 2_097_152).await;

        let mut session = manager.create_session();
        session.attach(a.id);
        session.attach(b.id);

        let before = manager.summarize();
        assert_eq!(before.count, 2);
        assert_eq!(before.completion_ratio, 0.0);

        let (ra, rb) = tokio::join!(
            manager.start_upload(a.id, |_| {}),
            manager.start_upload(b.id, |_| {})
        );
        ra.unwrap();
        rb.unwrap();

        let summary = manager.summarize();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.total_bytes, 3_145_728);
        assert_eq!(summary.completion_ratio, 1.0);
        assert_eq!(manager.summarize_session(&session), summary);

        session.close();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_events_follow_the_lifecycle() {
        let manager = fast_manager(2);
        let mut events = manager.subscribe();
        let file = add_file(&manager, "a.bin", 16).await;
        manager.start_upload(file.id, |_| {}).await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }

        assert!(matches!(received.first(), Some(UploadEvent::Created { file_id }) if *file_id == file.id));
        assert!(matches!(
            received.get(1),
            Some(UploadEvent::StateChanged {
                old_state: UploadStatus::Pending,
                new_state: UploadStatus::Uploading,
                ..
            })
        ));
        let progress: Vec<u8> = received
            .iter()
            .filter_map(|e| match e {
                UploadEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_non_decreasing(&progress);
        assert_eq!(progress.last(), Some(&100));
        assert!(matches!(received.last(), Some(UploadEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_pause_all_resume_all_and_clear() {
        let manager = Arc::new(fast_manager(10));
        let a = add_file(&manager, "a.bin", 16).await;
        let b = add_file(&manager, "b.bin", 16).await;
        let idle = add_file(&manager, "idle.bin", 16).await;

        let ha = manager.spawn_upload(a.id, |_| {});
        let hb = manager.spawn_upload(b.id, |_| {});
        wait_for_progress(&manager, a.id, 1).await;
        wait_for_progress(&manager, b.id, 1).await;

        let mut paused = manager.pause_all();
        paused.sort_by_key(|id| id.to_string());
        let mut expected = vec![a.id, b.id];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(paused, expected);
        assert_eq!(manager.get_by_id(idle.id).unwrap().status, UploadStatus::Pending);

        assert_eq!(manager.resume_all().len(), 2);
        ha.await.unwrap().unwrap();
        hb.await.unwrap().unwrap();

        assert_eq!(manager.clear_finished(), 2);
        assert_eq!(manager.get_all().len(), 1);
        assert_eq!(manager.get_all()[0].id, idle.id);
    }

    #[tokio::test]
    async fn test_abandoned_upload_becomes_failed() {
        let manager = fast_manager(50);
        let file = add_file(&manager, "a.bin", 16).await;

        let dropped = tokio::time::timeout(
            Duration::from_millis(10),
            manager.start_upload(file.id, |_| {}),
        )
        .await;
        assert!(dropped.is_err());

        let failed = manager.get_by_id(file.id).unwrap();
        assert_eq!(failed.status, UploadStatus::Failed);
        assert_eq!(manager.retry(file.id).unwrap().status, UploadStatus::Pending);
    }
}
