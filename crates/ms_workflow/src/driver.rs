// crates/ms_workflow/src/driver.rs

//! 扫描驱动
//!
//! 单个协调线程按批次推进扫描：
//!
//! ```text
//! INIT → (STAGE → RUN → COLLECT → CHECKPOINT)* → DONE
//! ```
//!
//! - STAGE: 为批次内第 `i` 个样本生成参数场并写入槽位 `i`，
//!   写出本批次清单与运行脚本，执行批次准备命令
//! - RUN: 每个占用槽位启动一个求解器进程，统一等待
//! - COLLECT: 从槽位 `i` 读取输出并记录到全局样本 `start + i`
//!
//! 样本级失败只记录在结果集的样本状态中，扫描继续；
//! 文件系统、检查点与配置错误中止扫描。

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayD, Ix1};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use ms_analysis::dry::reference_for;
use ms_analysis::{correct_dry_view, QoiSampler, Topography};
use ms_config::{OutputsConfig, SweepConfig};
use ms_foundation::{MsError, MsResult};
use ms_io::{CheckpointStore, KindShape, OutputKind, ResultSet, SampleStatus};

use crate::batch::{Batch, SweepId, SweepState};
use crate::collaborators::{CollectedSample, FieldSynthesizer, OutputCollector};
use crate::error::{SampleFailure, SweepError, SweepResult};
use crate::events::{EventDispatcher, SweepEvent};
use crate::launcher::{run_batch, CommandLauncher, ExitReport, SolverLauncher};
use crate::manifest::{BatchManifest, RunScript};
use crate::slots::{Slot, SlotFs, SlotPool};

/// 驱动选项
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// 扫描名称
    pub name: String,
    /// 清单与运行脚本所在目录
    pub work_dir: PathBuf,
    /// 批次超时，None 表示不限
    pub timeout: Option<Duration>,
    /// 子进程轮询间隔
    pub poll_interval: Duration,
    /// 扫描结束后删除槽位
    pub cleanup: bool,
    /// 运行脚本是否保留屏幕输出
    pub screen_output: bool,
    /// 配置中请求的输出类型
    pub kinds: Vec<OutputKind>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            name: "sweep".to_string(),
            work_dir: PathBuf::from("sweep"),
            timeout: None,
            poll_interval: Duration::from_millis(200),
            cleanup: false,
            screen_output: false,
            kinds: Vec::new(),
        }
    }
}

impl DriverOptions {
    /// 由配置创建，输出名须能解析为对应类别的输出类型
    pub fn from_config(config: &SweepConfig) -> SweepResult<Self> {
        Ok(Self {
            name: config.name.clone(),
            work_dir: config.pool.save_dir.clone(),
            timeout: config.launch.timeout(),
            poll_interval: config.launch.poll_interval(),
            cleanup: config.pool.cleanup,
            screen_output: config.launch.screen_output,
            kinds: configured_kinds(&config.outputs)?,
        })
    }
}

/// 解析配置中的输出名
///
/// `time_series` 中只能出现时间序列类型，`non_time_series` 中只能出现
/// 非时间序列类型。
pub fn configured_kinds(outputs: &OutputsConfig) -> SweepResult<Vec<OutputKind>> {
    let classes = [(&outputs.time_series, true), (&outputs.non_time_series, false)];
    let mut kinds = Vec::new();
    for (names, time_series) in classes {
        for name in names {
            let kind: OutputKind = name
                .parse()
                .map_err(|e: ms_io::IoError| SweepError::Configuration(e.to_string()))?;
            if kind.is_time_series() != time_series {
                let list = if time_series { "time_series" } else { "non_time_series" };
                return Err(SweepError::Configuration(format!(
                    "outputs.{list}: {kind} 属于另一类输出"
                )));
            }
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
    }
    Ok(kinds)
}

/// 扫描结果
#[derive(Debug)]
pub struct SweepOutcome {
    /// 扫描ID
    pub sweep_id: SweepId,
    /// 结果集（与最后一次检查点一致）
    pub results: ResultSet,
    /// 样本级失败
    pub failures: Vec<SampleFailure>,
    /// 批次数
    pub batches: usize,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
}

impl SweepOutcome {
    /// 是否全部样本成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 扫描驱动
pub struct SweepDriver {
    pool: SlotPool,
    launcher: Box<dyn SolverLauncher>,
    synthesizer: Arc<dyn FieldSynthesizer>,
    collector: Arc<dyn OutputCollector>,
    store: CheckpointStore,
    options: DriverOptions,
    events: Arc<EventDispatcher>,
}

impl SweepDriver {
    /// 创建驱动
    pub fn new(
        pool: SlotPool,
        launcher: Box<dyn SolverLauncher>,
        synthesizer: Arc<dyn FieldSynthesizer>,
        collector: Arc<dyn OutputCollector>,
        store: CheckpointStore,
        options: DriverOptions,
    ) -> Self {
        Self {
            pool,
            launcher,
            synthesizer,
            collector,
            store,
            options,
            events: Arc::new(EventDispatcher::new()),
        }
    }

    /// 由配置创建，求解器通过 [`CommandLauncher`] 启动
    pub fn from_config(
        config: &SweepConfig,
        fs: Arc<dyn SlotFs>,
        synthesizer: Arc<dyn FieldSynthesizer>,
        collector: Arc<dyn OutputCollector>,
    ) -> SweepResult<Self> {
        let pool = SlotPool::from_config(fs, config)?;
        let store = CheckpointStore::new(config.checkpoint_path(), config.outputs.compression_level);
        Ok(Self::new(
            pool,
            Box::new(CommandLauncher::from_config(&config.launch)),
            synthesizer,
            collector,
            store,
            DriverOptions::from_config(config)?,
        ))
    }

    /// 共享事件分发器
    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    /// 事件分发器
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// 槽位池
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    /// 检查点存储
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// 选项
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// 按样本矩阵的列运行扫描，记录请求的全部输出类型
    ///
    /// `samples` 形状为 (basis_dim, N)。
    pub fn run_points<F>(
        &self,
        samples: Array2<f64>,
        kinds: &[OutputKind],
        shape_fn: F,
    ) -> SweepResult<SweepOutcome>
    where
        F: Fn(OutputKind) -> KindShape,
    {
        let results = ResultSet::allocate(samples, kinds, shape_fn)?;
        self.execute(results, kinds, &mut |results, sample, collected| {
            record_collected(results, sample, kinds, collected)
        })
    }

    /// 按配置中的输出类型运行扫描
    pub fn run_configured<F>(&self, samples: Array2<f64>, shape_fn: F) -> SweepResult<SweepOutcome>
    where
        F: Fn(OutputKind) -> KindShape,
    {
        if self.options.kinds.is_empty() {
            return Err(SweepError::Configuration("outputs 未指定任何输出类型".to_string()));
        }
        self.run_points(samples, &self.options.kinds, shape_fn)
    }

    /// 运行扫描并只保留 QoI
    ///
    /// 每个样本的 `maxele63` 先做干点修正，再插值到查询点，
    /// 结果写入 QoI 矩阵的对应行。
    pub fn run_qoi<T: Topography + ?Sized>(
        &self,
        samples: Array2<f64>,
        sampler: &QoiSampler,
        topography: &T,
    ) -> SweepResult<SweepOutcome> {
        let refs = reference_for(topography, OutputKind::MaxEle63)?;
        let mut results = ResultSet::allocate(samples, &[], |_| KindShape::nodal(0))?;
        results.enable_qoi(sampler.num_points());

        self.execute(results, &[OutputKind::MaxEle63], &mut |results, sample, mut collected| {
            let mut maxele = take_output(&mut collected, OutputKind::MaxEle63)?;
            correct_dry_view(maxele.view_mut(), refs)?;
            let maxele = maxele
                .into_dimensionality::<Ix1>()
                .map_err(|e| MsError::invalid_input(format!("maxele63: {e}")))?;
            let row = sampler.sample(maxele.view())?;
            results.record_qoi(sample, row.view())?;
            Ok(())
        })
    }

    fn emit(&self, event: SweepEvent) {
        self.events.emit(event);
    }

    fn checkpoint(&self, sweep_id: SweepId, results: &ResultSet) -> SweepResult<()> {
        self.store.write(results)?;
        self.emit(SweepEvent::CheckpointSaved {
            sweep_id,
            path: self.store.path().display().to_string(),
        });
        Ok(())
    }

    fn execute(
        &self,
        mut results: ResultSet,
        kinds: &[OutputKind],
        absorb: &mut dyn FnMut(&mut ResultSet, usize, CollectedSample) -> MsResult<()>,
    ) -> SweepResult<SweepOutcome> {
        let started = Instant::now();
        let started_at = Utc::now();
        let sweep_id = SweepId::new();
        let mut state = SweepState::new(results.num_samples(), self.pool.size());

        // INIT
        let work_dir = &self.options.work_dir;
        self.pool
            .fs()
            .create_dir_all(work_dir)
            .map_err(|e| SweepError::staging(work_dir, e))?;
        self.store.begin()?;
        self.pool.initialize(self.launcher.as_ref())?;
        self.checkpoint(sweep_id, &results)?;

        info!(
            %sweep_id,
            name = %self.options.name,
            samples = results.num_samples(),
            batches = state.batches().len(),
            "扫描开始"
        );
        self.emit(SweepEvent::SweepStarted {
            sweep_id,
            name: self.options.name.clone(),
            num_samples: results.num_samples(),
            num_batches: state.batches().len(),
        });

        while let Some(batch) = state.next_batch() {
            let slots = self.pool.slots_for(batch.len());
            self.stage_batch(sweep_id, &batch, &slots, &results)?;

            self.emit(SweepEvent::BatchLaunched {
                sweep_id,
                batch: batch.index,
                processes: slots.len(),
            });
            let batch_started = Instant::now();
            let reports = run_batch(
                self.launcher.as_ref(),
                &slots,
                self.options.timeout,
                self.options.poll_interval,
            );

            let mut failed = 0;
            for ((local, sample), report) in batch.assignments().zip(&reports) {
                let slot = &slots[local];
                let (status, failure) = self.settle(&mut results, sample, slot, report, kinds, absorb);
                results.set_status(sample, status)?;
                if let Some(failure) = failure {
                    warn!(%sweep_id, slot = slot.id, "{failure}");
                    failed += 1;
                    self.emit(SweepEvent::SampleFailed {
                        sweep_id,
                        failure: failure.clone(),
                    });
                    state.record_failure(failure);
                }
            }

            self.emit(SweepEvent::BatchFinished {
                sweep_id,
                batch: batch.index,
                succeeded: batch.len() - failed,
                failed,
                duration_secs: batch_started.elapsed().as_secs_f64(),
            });

            self.checkpoint(sweep_id, &results)?;

            if let Some(mark) = state.complete_batch(&batch) {
                info!(%sweep_id, "{mark}");
                self.emit(SweepEvent::Progress {
                    sweep_id,
                    completed: mark.completed,
                    total: mark.total,
                });
            }
        }

        if self.options.cleanup {
            self.pool.teardown()?;
        }

        let batches = state.batches().len();
        let failures = state.into_failures();
        let duration_secs = started.elapsed().as_secs_f64();
        info!(%sweep_id, duration_secs, failures = failures.len(), "扫描完成");
        self.emit(SweepEvent::SweepCompleted {
            sweep_id,
            duration_secs,
            failures: failures.len(),
        });

        Ok(SweepOutcome {
            sweep_id,
            results,
            failures,
            batches,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// STAGE：参数场、清单、运行脚本与批次准备
    fn stage_batch(
        &self,
        sweep_id: SweepId,
        batch: &Batch,
        slots: &[Slot],
        results: &ResultSet,
    ) -> SweepResult<()> {
        for (local, sample) in batch.assignments() {
            let artifact = self
                .synthesizer
                .synthesize(sample, results.samples().column(sample))
                .map_err(|e| SweepError::staging(&slots[local].path, e))?;
            self.pool.stage(local, &artifact)?;
        }

        let fs = self.pool.fs();
        let work_dir = &self.options.work_dir;
        let manifest = BatchManifest::new(slots).write(fs, work_dir)?;

        let mut script = RunScript::new(!self.options.screen_output);
        for slot in slots {
            let (program, args) = self.launcher.command_for(slot);
            script.push(&slot.path, &program, &args);
        }
        script.write(fs, work_dir)?;

        self.launcher.prepare_batch(work_dir, &manifest, slots)?;
        self.emit(SweepEvent::BatchStaged {
            sweep_id,
            batch: batch.index,
            samples: batch.len(),
        });
        Ok(())
    }

    /// COLLECT：按退出情况决定样本状态
    ///
    /// 只有正常退出的样本才会采集；非零退出、无法启动或超时的样本
    /// 保持预分配的零值，观测时间也不会从这些样本取得。
    fn settle(
        &self,
        results: &mut ResultSet,
        sample: usize,
        slot: &Slot,
        report: &ExitReport,
        kinds: &[OutputKind],
        absorb: &mut dyn FnMut(&mut ResultSet, usize, CollectedSample) -> MsResult<()>,
    ) -> (SampleStatus, Option<SampleFailure>) {
        match report {
            ExitReport::Success => match self
                .collector
                .collect(slot, kinds)
                .and_then(|collected| absorb(results, sample, collected))
            {
                Ok(()) => (SampleStatus::Completed, None),
                Err(e) => (
                    SampleStatus::CollectFailed,
                    Some(SampleFailure::CollectionError {
                        sample,
                        reason: e.to_string(),
                    }),
                ),
            },
            ExitReport::Failed { .. } | ExitReport::SpawnFailed(_) => (
                SampleStatus::RunFailed,
                Some(SampleFailure::RunFailure {
                    sample,
                    reason: report.to_string(),
                }),
            ),
            ExitReport::TimedOut => (
                SampleStatus::TimedOut,
                Some(SampleFailure::SlotTimeout {
                    sample,
                    slot: slot.id,
                }),
            ),
        }
    }
}

impl std::fmt::Debug for SweepDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepDriver")
            .field("pool", &self.pool)
            .field("store", &self.store)
            .field("options", &self.options)
            .finish()
    }
}

fn take_output(collected: &mut CollectedSample, kind: OutputKind) -> MsResult<ArrayD<f64>> {
    collected
        .arrays
        .remove(&kind)
        .ok_or_else(|| MsError::not_found(format!("输出 {kind}")))
}

/// 将采集结果写入结果集，首次出现的观测时间一并记录
///
/// 先检查全部类型都存在且形状匹配，再开始写入，避免半写入的样本。
fn record_collected(
    results: &mut ResultSet,
    sample: usize,
    kinds: &[OutputKind],
    mut collected: CollectedSample,
) -> MsResult<()> {
    let mut arrays = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let array = take_output(&mut collected, kind)?;
        results.check_record(sample, kind, array.view())?;
        arrays.push((kind, array));
    }

    for (kind, array) in arrays {
        results.record(sample, kind, array.view())?;
        if let Some(times) = collected.times.remove(&kind) {
            if kind.is_time_series() {
                results.record_times(kind, times)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, ArrayD, IxDyn};

    fn sample_with(kind: OutputKind, values: &[f64]) -> CollectedSample {
        let mut collected = CollectedSample::default();
        collected
            .arrays
            .insert(kind, ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap());
        collected
    }

    #[test]
    fn test_record_collected_writes_each_kind() {
        let mut results = ResultSet::allocate(Array2::zeros((1, 2)), &[OutputKind::MaxEle63], |_| {
            KindShape::nodal(3)
        })
        .unwrap();
        record_collected(
            &mut results,
            1,
            &[OutputKind::MaxEle63],
            sample_with(OutputKind::MaxEle63, &[1.0, 2.0, 3.0]),
        )
        .unwrap();
        assert_eq!(results.nodal()[&OutputKind::MaxEle63].column(1).to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_record_collected_missing_kind() {
        let mut results = ResultSet::allocate(Array2::zeros((1, 1)), &[OutputKind::MaxEle63], |_| {
            KindShape::nodal(2)
        })
        .unwrap();
        let err = record_collected(&mut results, 0, &[OutputKind::MaxEle63], CollectedSample::default())
            .unwrap_err();
        assert!(matches!(err, MsError::NotFound { .. }));
    }

    #[test]
    fn test_record_collected_partial_sample_writes_nothing() {
        let kinds = [OutputKind::MaxEle63, OutputKind::MaxVel63];
        let mut results =
            ResultSet::allocate(Array2::zeros((1, 1)), &kinds, |_| KindShape::nodal(2)).unwrap();

        let err = record_collected(&mut results, 0, &kinds, sample_with(OutputKind::MaxEle63, &[4.0, 5.0]))
            .unwrap_err();
        assert!(matches!(err, MsError::NotFound { .. }));
        assert_eq!(results.nodal()[&OutputKind::MaxEle63].column(0).to_vec(), vec![0.0, 0.0]);

        let mut complete = sample_with(OutputKind::MaxEle63, &[4.0, 5.0]);
        complete.arrays.insert(
            OutputKind::MaxVel63,
            ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.5, 0.25]).unwrap(),
        );
        record_collected(&mut results, 0, &kinds, complete).unwrap();
        assert_eq!(results.nodal()[&OutputKind::MaxEle63].column(0).to_vec(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_record_collected_shape_mismatch_writes_nothing() {
        let kinds = [OutputKind::MaxEle63, OutputKind::MaxVel63];
        let mut results =
            ResultSet::allocate(Array2::zeros((1, 1)), &kinds, |_| KindShape::nodal(2)).unwrap();
        let mut collected = sample_with(OutputKind::MaxEle63, &[4.0, 5.0]);
        collected
            .arrays
            .insert(OutputKind::MaxVel63, ArrayD::zeros(IxDyn(&[3])));

        assert!(record_collected(&mut results, 0, &kinds, collected).is_err());
        assert_eq!(results.nodal()[&OutputKind::MaxEle63].column(0).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_configured_kinds_parse_by_class() {
        let mut outputs = OutputsConfig::default();
        outputs.time_series = vec!["fort.61".to_string(), "fort63".to_string()];
        outputs.non_time_series = vec!["maxele63".to_string()];
        assert_eq!(
            configured_kinds(&outputs).unwrap(),
            vec![OutputKind::Fort61, OutputKind::Fort63, OutputKind::MaxEle63]
        );

        outputs.non_time_series = vec!["fort.63".to_string()];
        assert!(matches!(configured_kinds(&outputs), Err(SweepError::Configuration(_))));

        outputs.non_time_series = vec!["fort99".to_string()];
        assert!(matches!(configured_kinds(&outputs), Err(SweepError::Configuration(_))));
    }

    #[test]
    fn test_default_options_from_config() {
        let options = DriverOptions::from_config(&SweepConfig::default()).unwrap();
        assert_eq!(options.kinds, vec![OutputKind::Fort61, OutputKind::MaxEle63]);
    }

    #[test]
    fn test_record_collected_times_once() {
        let kind = OutputKind::Fort61;
        let mut results = ResultSet::allocate(Array2::zeros((1, 2)), &[kind], |_| KindShape::series(1, 2))
            .unwrap();
        for sample in 0..2 {
            let mut collected = CollectedSample::default();
            collected
                .arrays
                .insert(kind, ArrayD::from_elem(IxDyn(&[1, 2]), sample as f64 + 1.0));
            collected.times.insert(kind, arr1(&[sample as f64, 10.0]));
            record_collected(&mut results, sample, &[kind], collected).unwrap();
        }
        assert_eq!(results.times()[&kind].to_vec(), vec![0.0, 10.0]);
    }
}
