//! Cleanup run state machine
//!
//! A run moves strictly forward:
//!
//! ```text
//! None -> BackingUp -> Collecting -> Removing -> Counting -> Finalizing -> Complete
//! ```
//!
//! Wipe runs enter `BackingUp` twice: once for the backup, once for a
//! temporary snapshot taken right before the wipe hook runs.
//!
//! The host calls [`CleanupOrchestrator::tick`] once per frame. Every state
//! walks through the sub-phases `None -> Starting -> Started -> Ended`: the
//! phase is announced on entry, held for `message_delay_ticks` ticks so the
//! announcement is visible before heavy work blocks a frame, and moved on
//! once the work is done. Snapshot saves never block a tick; the run waits
//! for their completion signal and re-checks on the next tick.
//!
//! Nothing mutates the heap before the backup snapshot has completed, and
//! every terminal path after pre-clean hooks ran also runs the post-clean
//! hooks.

use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use graphsweep_core::addon::AddonSet;
use graphsweep_core::collector::{EdgeRecorder, GraphCollector, ObjectGraph, TypeHistogram};
use graphsweep_core::config::{CollectionStrategy, RunConfig};
use graphsweep_core::core_types::RunContext;
use graphsweep_core::descriptor::TypeDescriptorProvider;
use graphsweep_core::errors::{ExError, ExErrorKind, SweepError};
use graphsweep_core::persistence::{CompletionNotifier, SaveCompletion, SnapshotService};
use graphsweep_core::resolver::{DependencyResolver, Resolution};
use graphsweep_core::traversal::TraversalVisitor;
use graphsweep_core::unlinker::{RegistryFinalizer, RemovalFinalizer};
use graphsweep_core::{
    log_op_end, log_op_error, log_op_start, AddonRegistry, Heap, NamespacePattern,
};

use crate::progress::{MessageLevel, NoopProgress, ProgressSink};
use crate::report::{BlockedRemoval, RunOutcome, RunReport, RunSnapshots};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    None,
    BackingUp,
    Collecting,
    Removing,
    Counting,
    Finalizing,
    Complete,
}

impl RunState {
    fn next(self) -> Self {
        match self {
            RunState::None => RunState::BackingUp,
            RunState::BackingUp => RunState::Collecting,
            RunState::Collecting => RunState::Removing,
            RunState::Removing => RunState::Counting,
            RunState::Counting => RunState::Finalizing,
            RunState::Finalizing | RunState::Complete => RunState::Complete,
        }
    }

    /// User-facing status line
    pub fn status(self) -> &'static str {
        match self {
            RunState::None => "Idle",
            RunState::BackingUp => "Backing up",
            RunState::Collecting => "Collecting objects",
            RunState::Removing => "Removing objects",
            RunState::Counting => "Counting objects",
            RunState::Finalizing => "Finalizing",
            RunState::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubPhase {
    None,
    Starting,
    Started,
    Ended,
}

/// Everything one run needs, handed over at construction
pub struct CleanupContext<S> {
    /// Registry snapshot; enablement and settings are resolved at `start()`
    pub addons: AddonRegistry,
    pub provider: Box<dyn TypeDescriptorProvider>,
    pub snapshots: S,
    pub progress: Box<dyn ProgressSink>,
    /// Run before an object is detached, after the provider's own finalizers
    pub finalizers: Vec<Box<dyn RemovalFinalizer>>,
    pub config: RunConfig,
    /// Addon whose wipe hook this run executes
    pub wipe: Option<String>,
}

impl<S: SnapshotService> CleanupContext<S> {
    pub fn new(
        addons: AddonRegistry,
        provider: impl TypeDescriptorProvider + 'static,
        snapshots: S,
    ) -> Self {
        Self {
            addons,
            provider: Box::new(provider),
            snapshots,
            progress: Box::new(NoopProgress),
            finalizers: vec![Box::new(RegistryFinalizer)],
            config: RunConfig::default(),
            wipe: None,
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_finalizer(mut self, finalizer: impl RemovalFinalizer + 'static) -> Self {
        self.finalizers.push(Box::new(finalizer));
        self
    }

    /// Make this a wipe run of `addon_id`
    pub fn wiping(mut self, addon_id: &str) -> Self {
        self.wipe = Some(addon_id.to_string());
        self
    }

    fn action(&self) -> String {
        match &self.wipe {
            Some(addon) => format!("wiping_{}", addon),
            None => "cleaning".to_string(),
        }
    }
}

/// Tick-driven cleanup run
pub struct CleanupOrchestrator<S: SnapshotService> {
    context: CleanupContext<S>,
    run: RunContext,
    state: RunState,
    sub_phase: SubPhase,
    message_ticks: u32,
    addons: AddonSet,
    wrappers: Vec<NamespacePattern>,
    notifier: CompletionNotifier,
    completions: Receiver<SaveCompletion>,
    awaiting: Option<String>,
    recorder: Option<EdgeRecorder>,
    graph: Option<ObjectGraph>,
    resolution: Resolution,
    before: TypeHistogram,
    delta: BTreeMap<String, i64>,
    snapshots: RunSnapshots,
    pre_cleaned: bool,
    post_cleaned: bool,
    cleaned: bool,
    removed: usize,
    started_at: Option<Instant>,
    report: Option<RunReport>,
}

impl<S: SnapshotService> CleanupOrchestrator<S> {
    pub fn new(context: CleanupContext<S>) -> Self {
        let (notifier, completions) = CompletionNotifier::channel();
        let run = RunContext::new(context.action());
        Self {
            context,
            run,
            state: RunState::None,
            sub_phase: SubPhase::None,
            message_ticks: 0,
            addons: AddonSet::default(),
            wrappers: Vec::new(),
            notifier,
            completions,
            awaiting: None,
            recorder: None,
            graph: None,
            resolution: Resolution::default(),
            before: TypeHistogram::default(),
            delta: BTreeMap::new(),
            snapshots: RunSnapshots::default(),
            pre_cleaned: false,
            post_cleaned: false,
            cleaned: false,
            removed: 0,
            started_at: None,
            report: None,
        }
    }

    /// Construct and start in one step
    ///
    /// # Errors
    ///
    /// As [`Self::start`].
    pub fn launch(context: CleanupContext<S>) -> Result<Self> {
        let mut orchestrator = Self::new(context);
        orchestrator.start()?;
        Ok(orchestrator)
    }

    /// Begin the run; configuration and addon settings are read here, once
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if this orchestrator has already started,
    /// `InvalidConfig`/`InvalidPattern` for a bad configuration,
    /// `AddonNotFound` when the wipe target is not an enabled addon and
    /// `InvalidInput` when it has no wipe hook. The state is unchanged on
    /// every error.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RunState::None {
            tracing::warn!(
                run_id = self.run.run_id.as_str(),
                state = ?self.state,
                "Cleanup already in flight; start rejected"
            );
            return Err(ExError::from(SweepError::AlreadyRunning).with_run_id(self.run.run_id.clone()));
        }

        let config = &self.context.config;
        config.validate()?;
        let wrappers = config.wrapper_patterns()?;
        let addons = AddonSet::resolve(&self.context.addons, config)?;

        if let Some(addon_id) = &self.context.wipe {
            let active = addons
                .index_of(addon_id)
                .and_then(|i| addons.get(i))
                .ok_or_else(|| SweepError::AddonNotFound {
                    addon_id: addon_id.clone(),
                })?;
            if !active.addon.has_wipe() {
                return Err(ExError::new(ExErrorKind::InvalidInput)
                    .with_op("start")
                    .with_addon(addon_id.as_str())
                    .with_message("Addon has no wipe hook"));
            }
            if config.collection_strategy == CollectionStrategy::Inline {
                tracing::info!(addon = addon_id.as_str(), "Wipe runs collect with the full strategy");
            }
        }

        self.addons = addons;
        self.wrappers = wrappers;
        self.started_at = Some(Instant::now());
        log_op_start!(
            "cleanup_run",
            run_id = self.run.run_id.as_str(),
            action = self.run.action.as_str(),
            addon_count = self.addons.len()
        );
        self.context.progress.set_active(true);
        self.change_state(RunState::BackingUp);
        Ok(())
    }

    /// Advance the run; safe to call every frame, before and after the run
    pub fn tick(&mut self, heap: &mut Heap) {
        self.poll_completion(heap);
        match self.state {
            RunState::None => {}
            RunState::BackingUp => self.tick_backing_up(heap),
            RunState::Collecting => self.tick_collecting(heap),
            RunState::Removing => self.tick_removing(heap),
            RunState::Counting => self.tick_counting(heap),
            RunState::Finalizing => self.tick_finalizing(heap),
            RunState::Complete => self.on_complete(heap),
        }
    }

    /// True once the run reached its terminal state
    pub fn completed(&self) -> bool {
        self.state == RunState::Complete && self.sub_phase == SubPhase::Ended
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn sub_phase(&self) -> SubPhase {
        self.sub_phase
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    /// Removal set computed while collecting
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Available once [`Self::completed`] is true
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    pub fn snapshot_service(&self) -> &S {
        &self.context.snapshots
    }

    pub fn snapshot_service_mut(&mut self) -> &mut S {
        &mut self.context.snapshots
    }

    // ===== Phases =====

    fn tick_backing_up(&mut self, heap: &mut Heap) {
        if self.awaiting.is_some() || self.context.snapshots.is_saving() {
            return;
        }
        if !self.gate() {
            return;
        }

        let taking_backup = self.snapshots.backup.is_none();
        let name = if taking_backup {
            let name = self.free_name("before");
            self.message(MessageLevel::Info, &format!("Creating backup snapshot {}...", name));
            name
        } else {
            let name = self.free_name("temp");
            self.message(MessageLevel::Info, &format!("Creating temporary snapshot {}...", name));
            name
        };

        let observe = taking_backup && self.inline_collection();
        if let Err(err) = self.request_save(name, heap, observe) {
            self.on_error(heap, err);
        }
    }

    fn tick_collecting(&mut self, heap: &mut Heap) {
        if !self.gate() {
            return;
        }
        let start = Instant::now();
        log_op_start!("collecting", run_id = self.run.run_id.as_str());

        if let Err(err) = self.collect_and_resolve(heap) {
            self.on_error(heap, err);
            return;
        }

        log_op_end!(
            "collecting",
            duration_ms = start.elapsed().as_millis() as u64,
            run_id = self.run.run_id.as_str(),
            removable_count = self.resolution.len(),
            blocked_count = self.resolution.blocked().len()
        );

        if self.resolution.is_empty() {
            self.message(MessageLevel::Info, "Nothing to clean");
            if self.context.wipe.is_some() {
                self.change_state(RunState::Finalizing);
            } else {
                self.on_complete(heap);
            }
            return;
        }

        self.message(
            MessageLevel::Info,
            &format!("Found {} removable objects", self.resolution.len()),
        );
        self.finish_state();
    }

    fn collect_and_resolve(&mut self, heap: &mut Heap) -> graphsweep_core::Result<()> {
        self.pre_cleaned = true;
        let failed = self.addons.run_pre_clean(heap);
        if !failed.is_empty() {
            return Err(SweepError::HookFailed {
                hook: "PreClean".to_string(),
                addons: failed,
            });
        }

        let provider = self.context.provider.as_ref();
        let graph = match self.recorder.take() {
            Some(recorder) if self.inline_collection() && !recorder.is_empty() => {
                GraphCollector::from_observed(recorder)
            }
            _ => GraphCollector::collect(heap, provider)?,
        };
        self.before = graph.histogram(heap);

        let resolution = DependencyResolver::new(
            heap,
            &graph,
            provider,
            &self.addons,
            &self.wrappers,
            self.context.config.compatibility_mode,
        )
        .resolve();
        for &(object, ancestor) in resolution.blocked() {
            tracing::info!(
                run_id = self.run.run_id.as_str(),
                object = %object,
                ancestor = %ancestor,
                "Removal blocked: no addon has authority"
            );
        }

        self.graph = Some(graph);
        self.resolution = resolution;
        Ok(())
    }

    fn tick_removing(&mut self, heap: &mut Heap) {
        if !self.gate() {
            return;
        }
        let start = Instant::now();
        log_op_start!(
            "removing",
            run_id = self.run.run_id.as_str(),
            removable_count = self.resolution.len()
        );

        let result = match &self.graph {
            Some(graph) => remove_all(
                heap,
                graph,
                &self.resolution,
                self.context.provider.as_ref(),
                &self.context.finalizers,
                &self.addons,
            ),
            None => Err(SweepError::Internal {
                message: "removal started without a collected graph".to_string(),
            }),
        };

        match result {
            Ok(removed) => {
                self.removed = removed;
                self.cleaned = true;
                log_op_end!(
                    "removing",
                    duration_ms = start.elapsed().as_millis() as u64,
                    run_id = self.run.run_id.as_str(),
                    removed_count = removed
                );
                self.message(MessageLevel::Info, &format!("Cleaned {} objects", removed));
                self.finish_state();
            }
            Err(err) => self.on_error(heap, err),
        }
    }

    fn tick_counting(&mut self, heap: &mut Heap) {
        if !self.gate() {
            return;
        }
        match GraphCollector::collect(heap, self.context.provider.as_ref()) {
            Ok(after) => {
                self.delta = self.before.delta(&after.histogram(heap));
                for (type_name, removed) in self.delta.iter().filter(|(_, d)| **d != 0) {
                    tracing::info!(
                        run_id = self.run.run_id.as_str(),
                        type_name = type_name.as_str(),
                        removed = *removed,
                        "Type count changed"
                    );
                }
            }
            Err(err) => tracing::warn!(
                run_id = self.run.run_id.as_str(),
                error = %err,
                "Recount failed; report carries no histogram delta"
            ),
        }
        self.finish_state();
    }

    fn tick_finalizing(&mut self, heap: &mut Heap) {
        if self.awaiting.is_some() || self.context.snapshots.is_saving() {
            return;
        }
        if !self.gate() {
            return;
        }

        self.post_cleaned = true;
        let failed = self.addons.run_post_clean(heap);
        if !failed.is_empty() {
            self.on_error(
                heap,
                SweepError::HookFailed {
                    hook: "PostClean".to_string(),
                    addons: failed,
                },
            );
            return;
        }

        let name = self.free_name("after");
        self.message(MessageLevel::Info, &format!("Creating closing snapshot {}...", name));
        if let Err(err) = self.request_save(name, heap, false) {
            self.on_error(heap, err);
        }
    }

    // ===== Snapshots =====

    fn request_save(&mut self, name: String, heap: &Heap, observe: bool) -> graphsweep_core::Result<()> {
        let observer = if observe {
            Some(self.recorder.insert(EdgeRecorder::new()) as &mut dyn TraversalVisitor)
        } else {
            None
        };
        self.context.snapshots.save_as(
            &name,
            heap,
            self.context.provider.as_ref(),
            observer,
            self.notifier.clone(),
        )?;
        self.awaiting = Some(name);
        Ok(())
    }

    fn poll_completion(&mut self, heap: &mut Heap) {
        while let Some(expected) = self.awaiting.as_deref() {
            let Ok(completion) = self.completions.try_recv() else {
                return;
            };
            if completion.name == expected {
                self.awaiting = None;
                self.on_save_over(heap, completion);
                return;
            }
            tracing::warn!(
                snapshot = completion.name.as_str(),
                "Ignoring completion of a snapshot this run is not waiting for"
            );
        }
    }

    fn on_save_over(&mut self, heap: &mut Heap, completion: SaveCompletion) {
        if !completion.success {
            self.on_error(
                heap,
                SweepError::SnapshotFailed {
                    name: completion.name,
                },
            );
            return;
        }

        match self.state {
            RunState::BackingUp if self.snapshots.backup.is_none() => {
                self.snapshots.backup = Some(completion.name);
            }
            RunState::BackingUp => {
                self.snapshots.temporary = Some(completion.name);
                if let Some(addon_id) = self.context.wipe.clone() {
                    if let Err(err) = self.run_wipe(&addon_id, heap) {
                        self.on_error(heap, err);
                        return;
                    }
                }
            }
            RunState::Finalizing => self.snapshots.finish = Some(completion.name),
            state => tracing::warn!(
                snapshot = completion.name.as_str(),
                state = ?state,
                "Snapshot completed outside a saving phase"
            ),
        }
        self.finish_state();
    }

    fn run_wipe(&mut self, addon_id: &str, heap: &mut Heap) -> graphsweep_core::Result<()> {
        self.message(MessageLevel::Info, &format!("Wiping {}...", addon_id));
        if self.addons.run_wipe(addon_id, heap)? {
            Ok(())
        } else {
            Err(SweepError::HookFailed {
                hook: "Wipe".to_string(),
                addons: vec![addon_id.to_string()],
            })
        }
    }

    /// First `<prefix>_<action>_<label>_<n>` the service does not know yet
    fn free_name(&self, prefix: &str) -> String {
        let stem = format!(
            "{}_{}_{}_",
            prefix, self.run.action, self.context.config.save_label
        );
        let mut index: u32 = 0;
        loop {
            let name = format!("{}{}", stem, index);
            if self.context.snapshots.get_save_with_name(&name).is_none() {
                return name;
            }
            index += 1;
        }
    }

    fn delete_snapshot(&mut self, name: &str) {
        match self.context.snapshots.delete_save(name) {
            Ok(true) => self.snapshots.deleted.push(name.to_string()),
            Ok(false) => {}
            Err(err) => tracing::warn!(snapshot = name, error = %err, "Could not delete snapshot"),
        }
    }

    fn inline_collection(&self) -> bool {
        self.context.wipe.is_none()
            && self.context.config.collection_strategy == CollectionStrategy::Inline
    }

    // ===== State bookkeeping =====

    /// Sub-phase gate; true on the one tick the phase's work should run
    fn gate(&mut self) -> bool {
        match self.sub_phase {
            SubPhase::None => {
                self.announce();
                self.sub_phase = SubPhase::Starting;
                false
            }
            SubPhase::Starting => {
                self.message_ticks = self.message_ticks.saturating_sub(1);
                if self.message_ticks == 0 {
                    self.sub_phase = SubPhase::Started;
                    true
                } else {
                    false
                }
            }
            SubPhase::Started => false,
            SubPhase::Ended => {
                self.forward_state();
                false
            }
        }
    }

    fn announce(&mut self) {
        let status = self.state.status();
        tracing::debug!(run_id = self.run.run_id.as_str(), phase = ?self.state, "{}", status);
        self.context.progress.set_status(status);
    }

    fn change_state(&mut self, state: RunState) {
        self.state = state;
        self.sub_phase = SubPhase::None;
        self.message_ticks = self.context.config.message_delay_ticks;
    }

    fn finish_state(&mut self) {
        self.sub_phase = SubPhase::Ended;
    }

    fn forward_state(&mut self) {
        let next = match self.state {
            RunState::BackingUp
                if self.context.wipe.is_some() && self.snapshots.temporary.is_none() =>
            {
                RunState::BackingUp
            }
            state => state.next(),
        };
        self.change_state(next);
    }

    fn ensure_post_clean(&mut self, heap: &mut Heap) {
        if self.pre_cleaned && !self.post_cleaned {
            self.post_cleaned = true;
            let failed = self.addons.run_post_clean(heap);
            if !failed.is_empty() {
                tracing::warn!(addons = ?failed, "PostClean failed by addons");
            }
        }
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        let run_id = self.run.run_id.as_str();
        match level {
            MessageLevel::Info => tracing::info!(run_id = run_id, "{}", text),
            MessageLevel::Warning => tracing::warn!(run_id = run_id, "{}", text),
            MessageLevel::Error => tracing::error!(run_id = run_id, "{}", text),
        }
        self.context.progress.message(level, text);
    }

    // ===== Terminal paths =====

    fn on_complete(&mut self, heap: &mut Heap) {
        if self.completed() {
            return;
        }
        self.ensure_post_clean(heap);

        if !self.cleaned && self.context.wipe.is_none() {
            if let Some(backup) = self.snapshots.backup.clone() {
                if self.context.snapshots.get_save_with_name(&backup).is_some() {
                    self.message(MessageLevel::Info, "Removing backup snapshot...");
                    self.delete_snapshot(&backup);
                }
            }
        }
        if let Some(temporary) = self.snapshots.temporary.clone() {
            self.delete_snapshot(&temporary);
        }

        self.change_state(RunState::Complete);
        let seconds = self.elapsed_ms() as f64 / 1000.0;
        self.message(
            MessageLevel::Info,
            &format!("Clean complete. Took {:.2} seconds to finish.", seconds),
        );
        if let Some(finish) = self.snapshots.finish.clone() {
            self.message(
                MessageLevel::Warning,
                &format!("Load snapshot {} before continuing", finish),
            );
        }

        let outcome = if self.cleaned {
            RunOutcome::Cleaned
        } else {
            RunOutcome::NothingToClean
        };
        log_op_end!(
            "cleanup_run",
            duration_ms = self.elapsed_ms(),
            run_id = self.run.run_id.as_str(),
            removed_count = self.removed
        );
        self.finish_run(outcome);
    }

    fn on_error(&mut self, heap: &mut Heap, err: SweepError) {
        if self.completed() {
            return;
        }
        let phase = self.state;
        log_op_error!(
            "cleanup_run",
            ExError::from(err.clone()).with_run_id(self.run.run_id.clone()),
            duration_ms = self.elapsed_ms(),
            run_id = self.run.run_id.as_str(),
            phase = ?phase
        );

        self.ensure_post_clean(heap);
        self.change_state(RunState::Complete);
        self.message(MessageLevel::Error, &format!("Clean terminated: {}", err));
        if let Some(backup) = self.snapshots.backup.clone() {
            self.message(
                MessageLevel::Warning,
                &format!("Load the backup snapshot {} before continuing", backup),
            );
        }
        if let Some(temporary) = self.snapshots.temporary.clone() {
            self.message(
                MessageLevel::Warning,
                &format!("Temporary snapshot {} was kept", temporary),
            );
        }
        self.finish_run(RunOutcome::Failed {
            reason: err.to_string(),
        });
    }

    fn finish_run(&mut self, outcome: RunOutcome) {
        self.finish_state();
        self.context.progress.set_active(false);
        self.graph = None;
        self.recorder = None;

        let by_addon = if self.cleaned {
            self.resolution.counts_by_addon(&self.addons)
        } else {
            BTreeMap::new()
        };
        let blocked = self
            .resolution
            .blocked()
            .iter()
            .map(|&(object, ancestor)| BlockedRemoval { object, ancestor })
            .collect();

        self.report = Some(RunReport {
            run_id: self.run.run_id.clone(),
            action: self.run.action.clone(),
            outcome,
            removed: self.removed,
            by_addon,
            delta: self.delta.clone(),
            blocked,
            snapshots: self.snapshots.clone(),
            elapsed_ms: self.elapsed_ms(),
            finished_at: chrono::Utc::now(),
        });
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Finalize and detach every removable object, in collection order
fn remove_all(
    heap: &mut Heap,
    graph: &ObjectGraph,
    resolution: &Resolution,
    provider: &dyn TypeDescriptorProvider,
    finalizers: &[Box<dyn RemovalFinalizer>],
    addons: &AddonSet,
) -> graphsweep_core::Result<usize> {
    let mut removed = 0;
    for &object in resolution.removable() {
        let plan = resolution.plan(object).ok_or_else(|| SweepError::Internal {
            message: format!("No removal plan for {}", object),
        })?;

        let type_name = heap.type_name(object).unwrap_or_default().to_string();
        let mut applicable: Vec<&dyn RemovalFinalizer> = provider.finalizers(&type_name);
        applicable.extend(finalizers.iter().map(|f| f.as_ref() as &dyn RemovalFinalizer));
        for finalizer in applicable {
            if finalizer.applies_to(heap, object) {
                tracing::debug!(object = %object, finalizer = finalizer.name(), "Finalizing removal");
                finalizer.finalize(heap, object)?;
            }
        }

        plan.execute(heap, graph, provider, addons)?;
        removed += 1;
    }
    Ok(removed)
}
