//! The inference engine.
//!
//! The engine owns the candidate assignment and the work queue. One
//! implementation is verified at a time; refuted candidates flip to false and
//! re-enqueue the implementations that depend on them, per the propagation
//! table. Genuine (non-candidate) errors stop inference and flush the
//! remaining queue for reporting. The assignment is monotone decreasing over
//! a finite domain, so the loop terminates at the greatest fixed point.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use hprove_program::{keys, CallGraph, Cmd, Expr, Program};
use hprove_smt::{CancellationToken, Outcome};

use crate::candidate::{match_candidate, RefutationKind, RefutedAnnotation};
use crate::checker::{CheckerFactory, HoudiniError, ImplementationChecker};
use crate::observer::{HoudiniObserver, ObserverHub};
use crate::queue::WorkQueue;
use crate::Counterexample;

/// Hooks for sharing refutations with peer engines. The bundled
/// implementation is a no-op; concurrent variants override these to exchange
/// progress between solver instances.
pub trait RefutationSharing: Send {
    /// Identifies this engine among its peers.
    fn task_id(&self) -> Option<usize> {
        None
    }

    /// Publishes a locally found refutation.
    fn share_refuted_annotation(&mut self, _refutation: &RefutedAnnotation) {}

    /// Pulls refutations found by peers since the last exchange.
    fn exchange_refuted_annotations(&mut self) -> Vec<RefutedAnnotation> {
        Vec::new()
    }
}

/// The no-op sharing used by the sequential engine.
#[derive(Debug, Default)]
pub struct NoSharing;

impl RefutationSharing for NoSharing {}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct HoudiniConfig {
    /// Track which implementations assume each candidate, and re-verify them
    /// when an assert refutation flips it.
    pub cross_dependencies: bool,
    /// Ask sessions for unsat cores after valid checks to prune propagation.
    pub use_unsat_cores: bool,
    /// Reverse the initial work order.
    pub reverse_initial_queue: bool,
    /// Depth to which implementations are inlined, closing the call graph
    /// accordingly. `None` disables inlining support.
    pub inline_depth: Option<usize>,
    /// The active stage for staged verification.
    pub current_stage: Option<i64>,
    /// Stages already completed, for `stage_complete` candidates.
    pub completed_stages: HashSet<i64>,
    /// Caller-supplied override of the all-true initial assignment.
    pub initial_assignment: Option<HashMap<String, bool>>,
}

impl Default for HoudiniConfig {
    fn default() -> Self {
        HoudiniConfig {
            cross_dependencies: true,
            use_unsat_cores: false,
            reverse_initial_queue: false,
            inline_depth: None,
            current_stage: None,
            completed_stages: HashSet::new(),
            initial_assignment: None,
        }
    }
}

impl HoudiniConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cross_dependencies(mut self, enabled: bool) -> Self {
        self.cross_dependencies = enabled;
        self
    }

    pub fn with_unsat_cores(mut self, enabled: bool) -> Self {
        self.use_unsat_cores = enabled;
        self
    }

    pub fn with_initial_assignment(mut self, assignment: HashMap<String, bool>) -> Self {
        self.initial_assignment = Some(assignment);
        self
    }

    pub fn with_stage(mut self, current: i64, completed: HashSet<i64>) -> Self {
        self.current_stage = Some(current);
        self.completed_stages = completed;
        self
    }
}

/// Counters of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoudiniStatistics {
    pub prover_calls: usize,
    pub refutations: usize,
    pub unsat_core_queries: usize,
    pub elapsed: Duration,
}

/// Outcome of one implementation.
#[derive(Debug)]
pub struct ImplementationOutcome {
    pub outcome: Outcome,
    /// Counterexamples with no matching candidate.
    pub genuine_errors: Vec<Counterexample>,
}

/// Result of a whole inference run.
#[derive(Debug)]
pub struct HoudiniOutcome {
    /// The final (greatest fixed point) assignment.
    pub assignment: IndexMap<String, bool>,
    /// Last recorded outcome per implementation name.
    pub implementation_outcomes: IndexMap<String, ImplementationOutcome>,
    /// Candidates refuted during the run, with the witnessing kind.
    pub refuted: IndexMap<String, RefutationKind>,
    /// Implementations whose VC generation failed.
    pub vcgen_failures: Vec<String>,
    pub statistics: HoudiniStatistics,
}

impl HoudiniOutcome {
    /// True when every scheduled implementation ended valid with no genuine
    /// errors.
    pub fn is_correct(&self) -> bool {
        self.vcgen_failures.is_empty()
            && self.implementation_outcomes.values().all(|o| {
                o.outcome == Outcome::Valid && o.genuine_errors.is_empty()
            })
    }
}

/// The sequential inference engine.
pub struct Houdini {
    program: Program,
    config: HoudiniConfig,
    candidates: HashSet<String>,
    assignment: IndexMap<String, bool>,
    queue: WorkQueue,
    deny_list: HashSet<usize>,
    checkers: HashMap<usize, Box<dyn ImplementationChecker>>,
    call_graph: CallGraph,
    cross_deps: HashMap<String, BTreeSet<usize>>,
    observers: ObserverHub,
    sharing: Box<dyn RefutationSharing>,
    vcgen_failures: Vec<String>,
    statistics: HoudiniStatistics,
}

impl Houdini {
    /// Initializes the engine: candidate collection, call graph, cross
    /// dependencies, one checker per implementation, and the leaves-first
    /// work queue.
    pub fn new(
        mut program: Program,
        config: HoudiniConfig,
        factory: &mut dyn CheckerFactory,
    ) -> Result<Self, HoudiniError> {
        let candidates: HashSet<String> = program
            .constants
            .iter()
            .filter(|c| c.is_existential())
            .map(|c| c.name.clone())
            .collect();
        info!(
            candidates = candidates.len(),
            implementations = program.implementations.len(),
            "initializing inference"
        );

        // Inlining support: non-free ensures become assumable on inlining,
        // and the call graph is closed to the inline depth.
        if config.inline_depth.is_some() {
            for procedure in program.procedures.values_mut() {
                for ensures in &mut procedure.ensures {
                    if !ensures.free {
                        ensures.attributes.set_flag(keys::INLINE_ASSUME);
                    }
                }
            }
        }
        let mut call_graph = program.call_graph();
        if let Some(depth) = config.inline_depth {
            call_graph.close_under_depth(depth);
        }

        let mut cross_deps: HashMap<String, BTreeSet<usize>> = HashMap::new();
        if config.cross_dependencies {
            for (id, implementation) in program.implementations.iter().enumerate() {
                for block in &implementation.blocks {
                    for cmd in &block.cmds {
                        let Cmd::Assume { condition, .. } = cmd else {
                            continue;
                        };
                        for ident in condition.idents() {
                            if candidates.contains(ident) {
                                cross_deps
                                    .entry(ident.to_string())
                                    .or_default()
                                    .insert(id);
                            }
                        }
                    }
                }
            }
        }

        let mut checkers = HashMap::new();
        let mut deny_list = HashSet::new();
        let mut vcgen_failures = Vec::new();
        for id in 0..program.implementations.len() {
            match factory.create(&program, id) {
                Ok(checker) => {
                    checkers.insert(id, checker);
                }
                Err(e) => {
                    let name = program.implementations[id].name.clone();
                    warn!("VC generation failed for {name}: {e}");
                    vcgen_failures.push(name);
                    deny_list.insert(id);
                }
            }
        }

        let mut order = call_graph.reverse_topological_order();
        if config.reverse_initial_queue {
            order.reverse();
        }
        let mut queue = WorkQueue::new();
        for id in order {
            if !deny_list.contains(&id) {
                queue.enqueue(id);
            }
        }

        let mut assignment: IndexMap<String, bool> = program
            .constants
            .iter()
            .filter(|c| c.is_existential())
            .map(|c| (c.name.clone(), true))
            .collect();
        if let Some(initial) = &config.initial_assignment {
            for (name, value) in initial {
                if let Some(slot) = assignment.get_mut(name) {
                    *slot = *value;
                }
            }
        }

        Ok(Houdini {
            program,
            config,
            candidates,
            assignment,
            queue,
            deny_list,
            checkers,
            call_graph,
            cross_deps,
            observers: ObserverHub::new(),
            sharing: Box::new(NoSharing),
            vcgen_failures,
            statistics: HoudiniStatistics::default(),
        })
    }

    /// Registers a lifecycle observer. Duplicate registration is a no-op.
    pub fn register_observer(&mut self, observer: std::sync::Arc<dyn HoudiniObserver>) -> bool {
        self.observers.register(observer)
    }

    /// Installs a refutation-sharing implementation for concurrent setups.
    pub fn set_sharing(&mut self, sharing: Box<dyn RefutationSharing>) {
        self.sharing = sharing;
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Hands the program back, for `apply_assignment` after a run.
    pub fn into_program(self) -> Program {
        self.program
    }

    pub fn assignment(&self) -> &IndexMap<String, bool> {
        &self.assignment
    }

    /// Runs inference to its fixed point.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<HoudiniOutcome, HoudiniError> {
        let started = Instant::now();
        self.observers.notify(|o| o.on_start());
        let mut outcome = HoudiniOutcome {
            assignment: IndexMap::new(),
            implementation_outcomes: IndexMap::new(),
            refuted: IndexMap::new(),
            vcgen_failures: self.vcgen_failures.clone(),
            statistics: HoudiniStatistics::default(),
        };

        let result = self.run_loop(cancel, &mut outcome).await;
        self.observers.notify(|o| o.on_end());
        for checker in self.checkers.values_mut() {
            checker.close().await;
        }

        if let Err(e) = result {
            self.observers.notify(|o| o.on_exception(&e.to_string()));
            return Err(e);
        }

        self.statistics.elapsed = started.elapsed();
        outcome.assignment = self.assignment.clone();
        outcome.statistics = self.statistics.clone();
        info!(
            prover_calls = outcome.statistics.prover_calls,
            refutations = outcome.statistics.refutations,
            "inference finished"
        );
        Ok(outcome)
    }

    async fn run_loop(
        &mut self,
        cancel: &CancellationToken,
        outcome: &mut HoudiniOutcome,
    ) -> Result<(), HoudiniError> {
        while let Some(current) = self.queue.peek() {
            if cancel.is_cancelled() {
                return Err(HoudiniError::Cancelled);
            }
            self.observers.notify(|o| o.on_iteration());
            let name = self.implementation_name(current).to_string();
            self.observers.notify(|o| o.on_implementation(&name));
            debug!("considering {name}");

            for shared in self.sharing.exchange_refuted_annotations() {
                self.apply_shared_refutation(&shared, outcome);
            }

            let flushed = self.process_implementation(current, cancel, outcome).await?;
            if flushed {
                break;
            }
        }
        Ok(())
    }

    /// The inner verify loop for one implementation. Returns true when a
    /// genuine error flushed the work list.
    async fn process_implementation(
        &mut self,
        current: usize,
        cancel: &CancellationToken,
        outcome: &mut HoudiniOutcome,
    ) -> Result<bool, HoudiniError> {
        loop {
            let staged = self.staged_assignment();
            self.observers.notify(|o| o.on_assignment(&staged));

            let result = {
                let checker = self.checkers.get_mut(&current).ok_or_else(|| {
                    HoudiniError::MissingChecker(
                        self.program.implementations[current].name.clone(),
                    )
                })?;
                checker.verify(&staged, cancel).await?
            };
            self.statistics.prover_calls += 1;
            self.observers.notify(|o| o.on_outcome(result.outcome));

            if result.outcome.is_resource_exhaustion() {
                // The implementation is out of budget: its assert-guarding
                // candidates are abandoned and it never runs again.
                let name = self.implementation_name(current).to_string();
                warn!("{name}: {:?}, deny-listing", result.outcome);
                for constant in self.assert_guarding_candidates(current) {
                    self.flip_candidate(&constant, RefutationKind::Assert, outcome);
                }
                self.deny_list.insert(current);
                self.record_outcome(current, result.outcome, Vec::new(), outcome);
                self.dequeue_current(current);
                return Ok(false);
            }

            let mut refutations = Vec::new();
            let mut genuine = Vec::new();
            for cex in &result.counterexamples {
                match self.extract_refutation(cex) {
                    Some(r) => {
                        if !refutations.contains(&r) {
                            refutations.push(r);
                        }
                    }
                    None => genuine.push(cex.clone()),
                }
            }

            if !genuine.is_empty() {
                let name = self.implementation_name(current).to_string();
                info!("{name}: genuine counterexample, stopping inference");
                self.record_outcome(current, result.outcome, genuine, outcome);
                self.dequeue_current(current);
                self.flush_worklist(cancel, outcome).await?;
                return Ok(true);
            }

            let mut applied = false;
            for refutation in &refutations {
                if self.apply_refutation(refutation, current, outcome) {
                    applied = true;
                }
            }
            if applied {
                // Same implementation again, under the weaker assignment.
                continue;
            }

            if result.outcome == Outcome::Valid && self.config.use_unsat_cores {
                let checker = self.checkers.get_mut(&current).ok_or_else(|| {
                    HoudiniError::MissingChecker(
                        self.program.implementations[current].name.clone(),
                    )
                })?;
                checker.request_unsat_core().await?;
                self.statistics.unsat_core_queries += 1;
            }

            self.record_outcome(current, result.outcome, Vec::new(), outcome);
            self.dequeue_current(current);
            return Ok(false);
        }
    }

    /// Verifies and reports everything left in the queue without touching
    /// the assignment again.
    async fn flush_worklist(
        &mut self,
        cancel: &CancellationToken,
        outcome: &mut HoudiniOutcome,
    ) -> Result<(), HoudiniError> {
        self.observers.notify(|o| o.on_flush_start());
        while let Some(current) = self.queue.peek() {
            if cancel.is_cancelled() {
                return Err(HoudiniError::Cancelled);
            }
            let name = self.implementation_name(current).to_string();
            self.observers.notify(|o| o.on_implementation(&name));

            let staged = self.staged_assignment();
            let result = {
                let checker = self.checkers.get_mut(&current).ok_or_else(|| {
                    HoudiniError::MissingChecker(name.clone())
                })?;
                checker.verify(&staged, cancel).await?
            };
            self.statistics.prover_calls += 1;
            self.observers.notify(|o| o.on_outcome(result.outcome));
            self.record_outcome(current, result.outcome, result.counterexamples, outcome);
            self.dequeue_current(current);
        }
        self.observers.notify(|o| o.on_flush_finish());
        Ok(())
    }

    /// Flips a refuted candidate and enqueues the implementations the
    /// propagation table names. Returns false when the candidate was already
    /// false.
    fn apply_refutation(
        &mut self,
        refutation: &RefutedAnnotation,
        current: usize,
        outcome: &mut HoudiniOutcome,
    ) -> bool {
        if !self.flip_candidate(&refutation.constant, refutation.kind, outcome) {
            return false;
        }
        self.sharing.share_refuted_annotation(refutation);

        let related: Vec<usize> = match refutation.kind {
            RefutationKind::Requires => {
                let callee_proc = refutation.callee.as_deref().unwrap_or_default();
                self.call_graph
                    .callees(current)
                    .into_iter()
                    .filter(|&d| self.program.implementations[d].proc == callee_proc)
                    .collect()
            }
            RefutationKind::Ensures => self.call_graph.callers(current),
            RefutationKind::Assert => {
                if self.config.cross_dependencies {
                    self.cross_deps
                        .get(&refutation.constant)
                        .map(|deps| deps.iter().copied().collect())
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            }
        };

        for dep in related {
            if self.deny_list.contains(&dep) {
                continue;
            }
            if !self.in_unsat_core(dep, &refutation.constant) {
                continue;
            }
            if self.queue.enqueue(dep) {
                let dep_name = self.implementation_name(dep);
                self.observers.notify(|o| o.on_enqueue(dep_name));
            }
        }
        true
    }

    /// Applies a refutation received from a peer engine: flip only, no
    /// propagation into the local queue.
    fn apply_shared_refutation(
        &mut self,
        refutation: &RefutedAnnotation,
        outcome: &mut HoudiniOutcome,
    ) {
        self.flip_candidate(&refutation.constant, refutation.kind, outcome);
    }

    fn flip_candidate(
        &mut self,
        name: &str,
        kind: RefutationKind,
        outcome: &mut HoudiniOutcome,
    ) -> bool {
        match self.assignment.get_mut(name) {
            Some(value) if *value => {
                *value = false;
            }
            _ => return false,
        }
        self.statistics.refutations += 1;
        outcome.refuted.insert(name.to_string(), kind);
        self.observers.notify(|o| o.on_constant(name, false));
        info!("refuted candidate {name} ({kind:?})");
        true
    }

    /// The assignment a verify call sees: stage-marked candidates are forced
    /// per the stage context, without mutating the stored assignment.
    fn staged_assignment(&self) -> IndexMap<String, bool> {
        let mut staged = self.assignment.clone();
        for constant in &self.program.constants {
            if !constant.is_existential() {
                continue;
            }
            if let Some(stage) = constant.attributes.get_int(keys::STAGE_ACTIVE) {
                staged.insert(
                    constant.name.clone(),
                    self.config.current_stage == Some(stage),
                );
            } else if let Some(stage) = constant.attributes.get_int(keys::STAGE_COMPLETE) {
                staged.insert(
                    constant.name.clone(),
                    self.config.completed_stages.contains(&stage),
                );
            }
        }
        staged
    }

    /// Candidates guarding assert commands of `id`.
    fn assert_guarding_candidates(&self, id: usize) -> Vec<String> {
        let mut out = Vec::new();
        let Some(implementation) = self.program.implementation(id) else {
            return out;
        };
        for block in &implementation.blocks {
            for cmd in &block.cmds {
                if let Cmd::Assert { condition, .. } = cmd {
                    if let Some(name) = match_candidate(condition, &self.candidates) {
                        if !out.iter().any(|n| n == name) {
                            out.push(name.to_string());
                        }
                    }
                }
            }
        }
        out
    }

    /// Builds the refuted annotation of a counterexample, or `None` when the
    /// failing condition is not candidate-guarded.
    fn extract_refutation(&self, cex: &Counterexample) -> Option<RefutedAnnotation> {
        use crate::counterexample::CexKind;
        match &cex.kind {
            CexKind::Assert(a) => match_candidate(&a.condition, &self.candidates)
                .map(|c| RefutedAnnotation::assertion(c, a.loc)),
            CexKind::Call { call, requires } => {
                match_candidate(&requires.condition, &self.candidates)
                    .map(|c| RefutedAnnotation::requires(c, requires.loc, call.callee.clone()))
            }
            CexKind::Return { ensures, .. } => {
                match_candidate(&ensures.condition, &self.candidates)
                    .map(|c| RefutedAnnotation::ensures(c, ensures.loc))
            }
        }
    }

    /// Whether `constant` is in the last unsat core of `id`'s session. No
    /// core information means everything counts as in-core.
    fn in_unsat_core(&self, id: usize, constant: &str) -> bool {
        match self.checkers.get(&id).and_then(|c| c.last_unsat_core()) {
            Some(core) => core.contains(constant),
            None => true,
        }
    }

    fn record_outcome(
        &mut self,
        id: usize,
        result: Outcome,
        genuine_errors: Vec<Counterexample>,
        outcome: &mut HoudiniOutcome,
    ) {
        let name = self.implementation_name(id).to_string();
        outcome.implementation_outcomes.insert(
            name,
            ImplementationOutcome {
                outcome: result,
                genuine_errors,
            },
        );
    }

    fn dequeue_current(&mut self, current: usize) {
        if self.queue.dequeue().is_some() {
            let name = self.implementation_name(current);
            self.observers.notify(|o| o.on_dequeue(name));
        }
    }

    fn implementation_name(&self, id: usize) -> &str {
        &self.program.implementations[id].name
    }
}

/// Rewrites the program under the final assignment: true candidates turn
/// their guarded assertions into assumptions and their contract clauses into
/// free clauses (with the guard substituted away); false candidates drop
/// guarded assertions and leave contract clauses in place (the guard makes
/// them vacuous). All existential constants are removed.
pub fn apply_assignment(program: &mut Program, assignment: &IndexMap<String, bool>) {
    let candidates: HashSet<String> = assignment.keys().cloned().collect();

    for implementation in &mut program.implementations {
        for block in &mut implementation.blocks {
            let cmds = std::mem::take(&mut block.cmds);
            for cmd in cmds {
                match cmd {
                    Cmd::Assert {
                        condition,
                        attributes,
                        loc,
                    } => {
                        let matched =
                            match_candidate(&condition, &candidates).map(str::to_string);
                        match matched {
                            Some(c) => {
                                if assignment.get(&c).copied().unwrap_or(false) {
                                    let mut map = HashMap::new();
                                    map.insert(c, Expr::TRUE);
                                    block.cmds.push(Cmd::Assume {
                                        condition: condition.substitute(&map),
                                        attributes,
                                    });
                                }
                                // Refuted guard: the assertion disappears.
                            }
                            None => block.cmds.push(Cmd::Assert {
                                condition,
                                attributes,
                                loc,
                            }),
                        }
                    }
                    other => block.cmds.push(other),
                }
            }
        }
    }

    for procedure in program.procedures.values_mut() {
        for clause in procedure
            .requires
            .iter_mut()
            .chain(procedure.ensures.iter_mut())
        {
            let matched = match_candidate(&clause.condition, &candidates).map(str::to_string);
            if let Some(c) = matched {
                if assignment.get(&c).copied().unwrap_or(false) {
                    let mut map = HashMap::new();
                    map.insert(c, Expr::TRUE);
                    clause.condition = clause.condition.substitute(&map);
                    clause.free = true;
                }
            }
        }
    }

    let removed: Vec<String> = program
        .constants
        .iter()
        .filter(|c| c.is_existential())
        .map(|c| c.name.clone())
        .collect();
    for name in removed {
        program.remove_constant(&name);
    }
}
