//! 计数汇合屏障
//!
//! 按预期数量创建，全部子操作到达后完成一次；任一子操作失败则立即以该错误完成，
//! 完成之后的到达与失败都会被忽略。完成信号通过只能取出一次的 `oneshot` 发送端
//! 投递，因此等待方恰好收到一次结果。发送端只由到达端持有，全部到达端被丢弃
//! （例如子任务 panic）而未完成时，等待方收到 [`ConfigError::JoinIncomplete`]。

use infrastructure_common::ConfigError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// 汇合屏障的到达端，可克隆后分发给各个子操作
#[derive(Debug, Clone)]
pub struct JoinBarrier {
    trigger: Arc<Trigger>,
}

/// 汇合屏障的等待端
#[derive(Debug)]
pub struct JoinWaiter {
    counts: Arc<Counts>,
    receiver: oneshot::Receiver<Result<(), ConfigError>>,
}

/// 双方共享的计数
#[derive(Debug)]
struct Counts {
    expected: usize,
    arrived: AtomicUsize,
}

/// 仅由到达端持有，最后一个到达端释放时发送端随之释放
#[derive(Debug)]
struct Trigger {
    counts: Arc<Counts>,
    sender: Mutex<Option<oneshot::Sender<Result<(), ConfigError>>>>,
}

impl JoinBarrier {
    /// 创建期望 `expected` 次到达的屏障；`expected` 为 0 时立即完成
    pub fn new(expected: usize) -> (Self, JoinWaiter) {
        let (sender, receiver) = oneshot::channel();
        let counts = Arc::new(Counts {
            expected,
            arrived: AtomicUsize::new(0),
        });
        let trigger = Arc::new(Trigger {
            counts: counts.clone(),
            sender: Mutex::new(Some(sender)),
        });

        if expected == 0 {
            trigger.complete(Ok(()));
        }

        (Self { trigger }, JoinWaiter { counts, receiver })
    }

    /// 记录一次成功到达，返回本次到达是否触发完成
    pub fn arrive(&self) -> bool {
        let mut sender = self.trigger.sender.lock();
        if sender.is_none() {
            return false;
        }
        let arrived = self.trigger.counts.arrived.fetch_add(1, Ordering::SeqCst) + 1;
        if arrived == self.trigger.counts.expected {
            if let Some(sender) = sender.take() {
                let _ = sender.send(Ok(()));
            }
            return true;
        }
        false
    }

    /// 以错误提前完成，返回本次调用是否触发完成
    pub fn fail(&self, error: ConfigError) -> bool {
        self.trigger.complete(Err(error))
    }

    /// 根据子操作结果到达或失败
    pub fn settle(&self, result: Result<(), ConfigError>) -> bool {
        match result {
            Ok(()) => self.arrive(),
            Err(error) => self.fail(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.trigger.sender.lock().is_none()
    }

    pub fn expected(&self) -> usize {
        self.trigger.counts.expected
    }
}

impl Trigger {
    fn complete(&self, result: Result<(), ConfigError>) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }
}

impl JoinWaiter {
    /// 等待屏障完成。所有到达端被丢弃而未完成时返回 [`ConfigError::JoinIncomplete`]
    pub async fn wait(self) -> Result<(), ConfigError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(ConfigError::JoinIncomplete {
                expected: self.counts.expected,
                arrived: self.counts.arrived.load(Ordering::SeqCst),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_expected_completes_immediately() {
        let (barrier, waiter) = JoinBarrier::new(0);
        assert!(barrier.is_complete());
        assert!(!barrier.arrive());
        waiter.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_completes_only_on_last_arrival() {
        let (barrier, waiter) = JoinBarrier::new(3);
        assert!(!barrier.arrive());
        assert!(!barrier.arrive());
        assert!(!barrier.is_complete());
        assert!(barrier.arrive());
        assert!(barrier.is_complete());
        waiter.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_extra_arrivals_are_ignored() {
        let (barrier, waiter) = JoinBarrier::new(1);
        assert!(barrier.arrive());
        assert!(!barrier.arrive());
        assert!(!barrier.fail(ConfigError::store_error("late")));
        waiter.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_completes_early() {
        let (barrier, waiter) = JoinBarrier::new(5);
        barrier.arrive();
        assert!(barrier.fail(ConfigError::store_unavailable("down")));
        assert!(!barrier.arrive());
        let err = waiter.wait().await.unwrap_err();
        assert!(matches!(err, ConfigError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_abandoned_barrier_reports_counts() {
        let (barrier, waiter) = JoinBarrier::new(2);
        barrier.arrive();
        drop(barrier);
        let err = tokio::time::timeout(std::time::Duration::from_secs(2), waiter.wait())
            .await
            .expect("等待方不应挂起")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::JoinIncomplete {
                expected: 2,
                arrived: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_hang_waiter() {
        let (barrier, waiter) = JoinBarrier::new(2);
        barrier.arrive();
        let handle = barrier.clone();
        drop(barrier);
        let task = tokio::spawn(async move {
            let _held = handle;
            panic!("子任务异常");
        });
        assert!(task.await.is_err());

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), waiter.wait())
            .await
            .expect("等待方不应挂起");
        assert!(matches!(
            result,
            Err(ConfigError::JoinIncomplete {
                expected: 2,
                arrived: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_arrivals_across_tasks() {
        let (barrier, waiter) = JoinBarrier::new(32);
        for i in 0..32u64 {
            let barrier = barrier.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(32 - i)).await;
                barrier.arrive();
            });
        }
        drop(barrier);
        waiter.wait().await.unwrap();
    }
}
