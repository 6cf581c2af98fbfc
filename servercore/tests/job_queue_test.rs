//! JobQueueManager 부하 테스트

use servercore::{JobQueue, JobQueueManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUEUE_COUNT: usize = 10;
const JOBS_PER_QUEUE: usize = 1000;

#[test]
fn test_many_queues_run_every_job() {
    let manager = Arc::new(JobQueueManager::new());
    let counters: Vec<Arc<AtomicUsize>> = (0..QUEUE_COUNT).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    // 큐마다 별도 생산자 스레드
    let producers: Vec<_> = (0..QUEUE_COUNT)
        .map(|i| {
            let manager = manager.clone();
            let counter = counters[i].clone();
            std::thread::spawn(move || {
                let name = format!("queue:{}", i);
                for _ in 0..JOBS_PER_QUEUE {
                    let counter = counter.clone();
                    manager.push_job(&name, move || {
                        // 같은 큐의 잡은 겹치지 않으므로 load/store로도 유실이 없어야 함
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                    });
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("Test assertion failed");
    }

    let queues: Vec<JobQueue> = (0..QUEUE_COUNT)
        .map(|i| manager.get_or_create_queue(&format!("queue:{}", i)))
        .collect();
    for queue in &queues {
        assert!(queue.wait_idle(Duration::from_secs(30)));
    }

    let total: usize = counters.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), JOBS_PER_QUEUE);
    }
    assert_eq!(total, QUEUE_COUNT * JOBS_PER_QUEUE);

    assert_eq!(manager.queue_count(), QUEUE_COUNT);
    for (_, pending) in manager.queue_stats() {
        assert_eq!(pending, 0);
    }
    for queue in &queues {
        assert!(!queue.is_running());
        assert_eq!(queue.stats().executed, JOBS_PER_QUEUE as u64);
    }
}

#[test]
fn test_many_producers_share_one_queue() {
    let manager = Arc::new(JobQueueManager::new());
    let counters: Vec<Arc<AtomicUsize>> = (0..QUEUE_COUNT).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let total = Arc::new(AtomicUsize::new(0));

    // 10개의 생산자 스레드가 같은 이름의 큐 하나에 잡을 넣는다
    let producers: Vec<_> = (0..QUEUE_COUNT)
        .map(|i| {
            let manager = manager.clone();
            let counter = counters[i].clone();
            let total = total.clone();
            std::thread::spawn(move || {
                for _ in 0..JOBS_PER_QUEUE {
                    let counter = counter.clone();
                    let total = total.clone();
                    manager.push_job("shared-room", move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                        // 큐 안에서는 직렬 실행이므로 load/store로도 유실이 없어야 함
                        let value = total.load(Ordering::Relaxed);
                        total.store(value + 1, Ordering::Relaxed);
                    });
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("Test assertion failed");
    }

    let queue = manager.get_or_create_queue("shared-room");
    assert!(queue.wait_idle(Duration::from_secs(30)));

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), JOBS_PER_QUEUE);
    }
    assert_eq!(total.load(Ordering::SeqCst), QUEUE_COUNT * JOBS_PER_QUEUE);
    assert_eq!(queue.count(), 0);
    assert_eq!(manager.queue_count(), 1);
    assert_eq!(manager.queue_stats().get("shared-room"), Some(&0));
    assert_eq!(queue.stats().executed, (QUEUE_COUNT * JOBS_PER_QUEUE) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_push_from_async_tasks() {
    let manager = Arc::new(JobQueueManager::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let counter = counter.clone();
                    manager.push_job("shared", move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("Test assertion failed");
    }

    let queue = manager.get_or_create_queue("shared");
    let idle = tokio::task::spawn_blocking(move || queue.wait_idle(Duration::from_secs(10)))
        .await
        .expect("Test assertion failed");
    assert!(idle);
    assert_eq!(counter.load(Ordering::SeqCst), 800);
}
