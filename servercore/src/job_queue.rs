//! 잡 큐
//!
//! 공유 상태(방, 유저 등)에 대한 작업을 락 없이 직렬화합니다.
//! 큐 하나당 드레인 루프는 항상 최대 하나만 돌기 때문에, 같은 큐에 들어간 잡들은
//! 절대 겹쳐 실행되지 않고 생산자별 순서가 보존됩니다.
//!
//! 드레인은 rayon 전역 풀에서 돌며 tokio 런타임 밖에서도 동작합니다.

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::session::panic_message;

/// 큐에 넣을 수 있는 작업 단위
pub trait Job: Send + 'static {
    fn execute(self: Box<Self>);
}

impl<F> Job for F
where
    F: FnOnce() + Send + 'static,
{
    fn execute(self: Box<Self>) {
        (*self)()
    }
}

type FallibleJob = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

enum Entry {
    Job(Box<dyn Job>),
    Fallible(FallibleJob),
}

/// 잡 큐 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobQueueStats {
    pub pushed: u64,
    pub executed: u64,
    pub failed: u64,
}

struct JobQueueInner {
    name: String,
    jobs: SegQueue<Entry>,
    /// 드레인 루프가 살아 있는지 여부
    running: Mutex<bool>,
    pushed: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

/// 직렬 실행 잡 큐 (복제해도 같은 큐를 가리킴)
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<JobQueueInner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.inner.name)
            .field("count", &self.count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl JobQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(JobQueueInner {
                name: name.into(),
                jobs: SegQueue::new(),
                running: Mutex::new(false),
                pushed: AtomicU64::new(0),
                executed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn push<J: Job>(&self, job: J) {
        self.push_entry(Entry::Job(Box::new(job)));
    }

    pub fn push_boxed(&self, job: Box<dyn Job>) {
        self.push_entry(Entry::Job(job));
    }

    /// 실패할 수 있는 작업. `Err`는 로그로 남기고 실패로 집계합니다.
    pub fn push_fallible<F>(&self, f: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.push_entry(Entry::Fallible(Box::new(f)));
    }

    /// 대기 중인 잡 개수
    pub fn count(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.lock()
    }

    pub fn stats(&self) -> JobQueueStats {
        JobQueueStats {
            pushed: self.inner.pushed.load(Ordering::Relaxed),
            executed: self.inner.executed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    /// 큐가 비고 드레인이 끝날 때까지 기다립니다. 시간 안에 끝나면 true.
    ///
    /// 블로킹 호출이므로 async 컨텍스트에서는 `spawn_blocking` 안에서 쓰세요.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.stats();
            if stats.executed + stats.failed == stats.pushed && !self.is_running() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn push_entry(&self, entry: Entry) {
        self.inner.pushed.fetch_add(1, Ordering::Relaxed);
        self.inner.jobs.push(entry);

        let mut running = self.inner.running.lock();
        if !*running {
            *running = true;
            drop(running);
            let inner = self.inner.clone();
            rayon::spawn(move || inner.drain());
        }
    }
}

impl JobQueueInner {
    fn drain(&self) {
        loop {
            while let Some(entry) = self.jobs.pop() {
                self.run(entry);
            }

            // 빈 것을 확인한 직후 들어온 잡을 놓치지 않도록 락 안에서 다시 확인
            let mut running = self.running.lock();
            if self.jobs.is_empty() {
                *running = false;
                return;
            }
        }
    }

    fn run(&self, entry: Entry) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match entry {
            Entry::Job(job) => {
                job.execute();
                Ok(())
            }
            Entry::Fallible(f) => f(),
        }));

        match outcome {
            Ok(Ok(())) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(queue = %self.name, "잡 실패: {:#}", e);
            }
            Err(payload) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(queue = %self.name, "잡 실행 중 패닉: {}", panic_message(payload.as_ref()));
            }
        }
    }
}

static GLOBAL_MANAGER: Lazy<JobQueueManager> = Lazy::new(JobQueueManager::new);

/// 이름으로 잡 큐를 찾거나 만드는 레지스트리
#[derive(Default)]
pub struct JobQueueManager {
    queues: DashMap<String, JobQueue>,
}

impl JobQueueManager {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// 프로세스 전역 매니저
    pub fn global() -> &'static JobQueueManager {
        &GLOBAL_MANAGER
    }

    pub fn get_or_create_queue(&self, name: &str) -> JobQueue {
        if let Some(queue) = self.queues.get(name) {
            return queue.clone();
        }
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(queue = name, "잡 큐 생성");
                JobQueue::new(name)
            })
            .clone()
    }

    /// 이미 만들어 둔 큐를 이름으로 등록합니다. 같은 이름의 기존 큐는 대체됩니다.
    pub fn register_queue(&self, queue: JobQueue) {
        debug!(queue = queue.name(), "잡 큐 등록");
        self.queues.insert(queue.name().to_string(), queue);
    }

    pub fn push_job<J: Job>(&self, name: &str, job: J) {
        self.get_or_create_queue(name).push(job);
    }

    /// 큐 이름별 대기 잡 개수
    pub fn queue_stats(&self) -> HashMap<String, usize> {
        self.queues
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().count()))
            .collect()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// 레지스트리에서 큐를 뺍니다. 이미 들어간 잡은 그대로 실행됩니다.
    pub fn remove_queue(&self, name: &str) -> Option<JobQueue> {
        self.queues.remove(name).map(|(_, queue)| queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn test_jobs_never_overlap_and_keep_producer_order() {
        const PRODUCERS: usize = 4;
        const JOBS_PER_PRODUCER: usize = 50;

        let queue = JobQueue::new("test");
        // (생산자, 순번, 시작 시각, 종료 시각)
        let windows: Arc<Mutex<Vec<(usize, usize, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = queue.clone();
                let windows = windows.clone();
                std::thread::spawn(move || {
                    for seq in 0..JOBS_PER_PRODUCER {
                        let windows = windows.clone();
                        queue.push(move || {
                            let started = Instant::now();
                            std::thread::sleep(Duration::from_micros(500));
                            let finished = Instant::now();
                            windows.lock().push((producer, seq, started, finished));
                        });
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().expect("Test assertion failed");
        }

        assert!(queue.wait_idle(WAIT));

        let mut windows = windows.lock().clone();
        assert_eq!(windows.len(), PRODUCERS * JOBS_PER_PRODUCER);

        for producer in 0..PRODUCERS {
            let order: Vec<usize> = windows
                .iter()
                .filter(|(p, _, _, _)| *p == producer)
                .map(|(_, seq, _, _)| *seq)
                .collect();
            assert_eq!(order, (0..JOBS_PER_PRODUCER).collect::<Vec<_>>());
        }

        // 실행 구간은 서로 겹치지 않아야 함
        windows.sort_by_key(|(_, _, started, _)| *started);
        for pair in windows.windows(2) {
            let (_, _, _, prev_end) = pair[0];
            let (_, _, next_start, _) = pair[1];
            assert!(prev_end <= next_start, "잡 실행 구간이 겹침");
        }
    }

    #[test]
    fn test_panicking_job_does_not_stop_queue() {
        let queue = JobQueue::new("panic");
        let ran = Arc::new(AtomicBool::new(false));

        queue.push(|| panic!("잡 패닉"));
        let flag = ran.clone();
        queue.push(move || flag.store(true, Ordering::SeqCst));

        assert!(queue.wait_idle(WAIT));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(
            queue.stats(),
            JobQueueStats {
                pushed: 2,
                executed: 1,
                failed: 1
            }
        );
        assert!(!queue.is_running());
    }

    #[test]
    fn test_fallible_job_counts_failure() {
        let queue = JobQueue::new("fallible");
        queue.push_fallible(|| Ok(()));
        queue.push_fallible(|| Err(anyhow::anyhow!("의도된 실패")));

        assert!(queue.wait_idle(WAIT));
        let stats = queue.stats();
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_push_boxed() {
        let queue = JobQueue::new("boxed");
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let job: Box<dyn Job> = Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        queue.push_boxed(job);

        assert!(queue.wait_idle(WAIT));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_manager_returns_same_queue() {
        let manager = JobQueueManager::new();
        let a = manager.get_or_create_queue("room:1");
        let b = manager.get_or_create_queue("room:1");
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(manager.queue_count(), 1);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let c = counter.clone();
            manager.push_job("room:1", move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(a.wait_idle(WAIT));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(manager.queue_stats().get("room:1"), Some(&0));

        assert!(manager.remove_queue("room:1").is_some());
        assert_eq!(manager.queue_count(), 0);
    }

    #[test]
    fn test_register_queue_shares_handle() {
        let manager = JobQueueManager::new();
        let queue = JobQueue::new("session:7");
        assert_eq!(manager.queue_count(), 0);

        manager.register_queue(queue.clone());
        let found = manager.get_or_create_queue("session:7");
        assert!(Arc::ptr_eq(&queue.inner, &found.inner));
        assert_eq!(manager.queue_count(), 1);

        // 레지스트리에서 빠져도 핸들은 계속 동작
        manager.remove_queue("session:7");
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queue.push(move || flag.store(true, Ordering::SeqCst));
        assert!(queue.wait_idle(WAIT));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(manager.queue_count(), 0);
    }

    #[test]
    fn test_global_manager_is_shared() {
        let a = JobQueueManager::global().get_or_create_queue("global-test");
        let b = JobQueueManager::global().get_or_create_queue("global-test");
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
