// crates/ms_workflow/src/events.rs

//! 事件系统模块
//!
//! 扫描生命周期事件的定义和分发。

use crate::batch::SweepId;
use crate::error::SampleFailure;
use parking_lot::RwLock;
use std::sync::Arc;

/// 扫描事件
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// 扫描已开始
    SweepStarted {
        /// 扫描ID
        sweep_id: SweepId,
        /// 扫描名称
        name: String,
        /// 样本数
        num_samples: usize,
        /// 批次数
        num_batches: usize,
    },
    /// 批次参数场已写入槽位
    BatchStaged {
        /// 扫描ID
        sweep_id: SweepId,
        /// 批次序号
        batch: usize,
        /// 本批次样本数
        samples: usize,
    },
    /// 批次求解器已启动
    BatchLaunched {
        /// 扫描ID
        sweep_id: SweepId,
        /// 批次序号
        batch: usize,
        /// 启动的进程数
        processes: usize,
    },
    /// 批次已结束（屏障返回）
    BatchFinished {
        /// 扫描ID
        sweep_id: SweepId,
        /// 批次序号
        batch: usize,
        /// 成功样本数
        succeeded: usize,
        /// 失败样本数
        failed: usize,
        /// 耗时 (秒)
        duration_secs: f64,
    },
    /// 样本失败
    SampleFailed {
        /// 扫描ID
        sweep_id: SweepId,
        /// 失败记录
        failure: SampleFailure,
    },
    /// 检查点已保存
    CheckpointSaved {
        /// 扫描ID
        sweep_id: SweepId,
        /// 检查点路径
        path: String,
    },
    /// 进度报告
    Progress {
        /// 扫描ID
        sweep_id: SweepId,
        /// 已完成样本数
        completed: usize,
        /// 样本总数
        total: usize,
    },
    /// 扫描已完成
    SweepCompleted {
        /// 扫描ID
        sweep_id: SweepId,
        /// 运行时长 (秒)
        duration_secs: f64,
        /// 失败样本数
        failures: usize,
    },
}

impl SweepEvent {
    /// 获取事件对应的扫描ID
    pub fn sweep_id(&self) -> SweepId {
        match self {
            Self::SweepStarted { sweep_id, .. }
            | Self::BatchStaged { sweep_id, .. }
            | Self::BatchLaunched { sweep_id, .. }
            | Self::BatchFinished { sweep_id, .. }
            | Self::SampleFailed { sweep_id, .. }
            | Self::CheckpointSaved { sweep_id, .. }
            | Self::Progress { sweep_id, .. }
            | Self::SweepCompleted { sweep_id, .. } => *sweep_id,
        }
    }

    /// 获取事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::SweepStarted { .. } => "SweepStarted",
            Self::BatchStaged { .. } => "BatchStaged",
            Self::BatchLaunched { .. } => "BatchLaunched",
            Self::BatchFinished { .. } => "BatchFinished",
            Self::SampleFailed { .. } => "SampleFailed",
            Self::CheckpointSaved { .. } => "CheckpointSaved",
            Self::Progress { .. } => "Progress",
            Self::SweepCompleted { .. } => "SweepCompleted",
        }
    }
}

/// 事件监听器trait
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &SweepEvent);

    /// 获取监听器名称 (用于调试)
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 函数式事件监听器
pub struct FnListener<F>
where
    F: Fn(&SweepEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&SweepEvent) + Send + Sync,
{
    /// 创建函数式监听器
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&SweepEvent) + Send + Sync,
{
    fn on_event(&self, event: &SweepEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 日志事件监听器
pub struct LoggingListener {
    prefix: String,
    verbose: bool,
}

impl LoggingListener {
    /// 创建日志监听器
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            verbose: false,
        }
    }

    /// 设置详细模式
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl EventListener for LoggingListener {
    fn on_event(&self, event: &SweepEvent) {
        let msg = match event {
            SweepEvent::SweepStarted {
                name,
                num_samples,
                num_batches,
                ..
            } => format!("Sweep '{name}' started: {num_samples} samples in {num_batches} batches"),
            SweepEvent::Progress {
                completed, total, ..
            } => format!("{completed} of {total} runs have been completed."),
            SweepEvent::SampleFailed { failure, .. } => {
                tracing::warn!("{}: {}", self.prefix, failure);
                return;
            }
            SweepEvent::SweepCompleted {
                duration_secs,
                failures,
                ..
            } => format!("Sweep completed in {duration_secs:.2}s ({failures} failed samples)"),
            SweepEvent::BatchFinished {
                batch,
                succeeded,
                failed,
                duration_secs,
                ..
            } if self.verbose => format!(
                "Batch {batch} finished in {duration_secs:.2}s: {succeeded} ok, {failed} failed"
            ),
            _ if self.verbose => format!("{event:?}"),
            _ => return,
        };

        tracing::info!("{}: {}", self.prefix, msg);
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建新的事件分发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let name = listener.name().to_string();
        self.listeners.write().push(listener);
        tracing::debug!("Added event listener: {}", name);
    }

    /// 添加函数式监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&SweepEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(name, handler)));
    }

    /// 移除监听器
    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// 清除所有监听器
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// 分发事件
    pub fn emit(&self, event: SweepEvent) {
        let listeners = self.listeners.read();
        tracing::trace!("Emitting event: {}", event.name());
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    /// 获取监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        dispatcher.add_fn_listener("test", move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        let sweep_id = SweepId::new();
        dispatcher.emit(SweepEvent::Progress {
            sweep_id,
            completed: 10,
            total: 25,
        });
        dispatcher.emit(SweepEvent::SweepCompleted {
            sweep_id,
            duration_secs: 1.0,
            failures: 0,
        });

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_sweep_id() {
        let sweep_id = SweepId::new();
        let event = SweepEvent::SampleFailed {
            sweep_id,
            failure: SampleFailure::SlotTimeout { sample: 3, slot: 4 },
        };
        assert_eq!(event.sweep_id(), sweep_id);
        assert_eq!(event.name(), "SampleFailed");
    }

    #[test]
    fn test_remove_listener() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn EventListener> = Arc::new(FnListener::new("names", move |e: &SweepEvent| {
            sink.lock().push(e.name());
        }));

        dispatcher.add_listener(listener.clone());
        dispatcher.add_listener(Arc::new(LoggingListener::new("sweep").verbose()));
        assert_eq!(dispatcher.listener_count(), 2);

        let sweep_id = SweepId::new();
        dispatcher.emit(SweepEvent::BatchStaged {
            sweep_id,
            batch: 0,
            samples: 10,
        });
        dispatcher.remove_listener(&listener);
        dispatcher.emit(SweepEvent::BatchLaunched {
            sweep_id,
            batch: 0,
            processes: 10,
        });

        assert_eq!(*seen.lock(), vec!["BatchStaged"]);
        assert_eq!(dispatcher.listener_count(), 1);
    }
}
