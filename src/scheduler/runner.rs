//! Decision loop
//!
//! One cycle runs LISTEN, THINK, COORDINATE, ACT and RECORD strictly in
//! order. Every phase is a function returning a value; the only state that
//! crosses phases is the explicit [`CycleContext`] and the phase results.
//! Nothing inside a cycle waits past the cycle deadline.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::{join_all, FutureExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{
    ApprovedAction, Collaborators, ObservationContext, PersonaContext, ReasoningService,
};
use crate::config::DaemonConfig;
use crate::coordination::{
    CoordinationEngine, CoordinationSession, PositionSource, SessionKind, SessionOutcome,
};
use crate::error::{Error, Result};
use crate::ledger::{Outcome, PerformanceLedger, RecordResult};
use crate::persona::{Persona, PersonaRegistry};
use crate::router::{CoordinationReason, RoutingDecision, TaskRouter};
use crate::store::{self, collections, DocumentStore, InsertOutcome};
use crate::types::{
    AssignmentStatus, Decision, DecisionRecord, ImpactTier, Observation, OutcomeStatus, Position,
    ReasoningOutput, TaskAssignment, TaskType,
};

use super::history::DecisionHistory;
use super::summary::{ActionReport, CycleContext, CycleSummary};

// ─────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub name: String,
    pub period: Duration,
    pub reasoning_timeout: Duration,
    pub connector_timeout: Duration,
    pub max_concurrent_reasoning: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            name: config.daemon_name(),
            period: config.cycle_period(),
            reasoning_timeout: config.reasoning_timeout(),
            connector_timeout: config.connector_timeout(),
            max_concurrent_reasoning: config.daemon.max_concurrent_reasoning.max(1),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Phase results
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Route {
    Single { persona_id: String },
    Coordinated {
        candidates: Vec<String>,
        reasons: Vec<CoordinationReason>,
    },
}

#[derive(Debug, Clone)]
struct Routed {
    observation: Observation,
    tier: ImpactTier,
    route: Route,
    assignment: usize,
}

/// One persona's THINK answer; `output` is `None` on abstention
#[derive(Debug, Clone)]
struct Candidate {
    persona_id: String,
    output: Option<ReasoningOutput>,
    latency_ms: u64,
}

/// How one topic was decided
#[derive(Debug, Clone)]
pub struct TopicOutcome {
    pub topic: String,
    /// Highest-priority observation on the topic
    pub observation: Observation,
    pub tier: ImpactTier,
    /// Indexes into [`CycleReport::assignments`]
    pub assignments: Vec<usize>,
    pub positions: Vec<Position>,
    pub latencies: BTreeMap<String, u64>,
    pub abstained: Vec<String>,
    /// Approved decision and the personas it is attributed to
    pub approved: Option<(Decision, Vec<String>)>,
    pub session: Option<CoordinationSession>,
}

impl TopicOutcome {
    fn vetoed(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.outcome.as_ref())
            .is_some_and(SessionOutcome::is_vetoed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Succeeded(serde_json::Value),
    Failed(String),
}

/// Everything decided and executed in one cycle, ready to be recorded
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub ctx: CycleContext,
    pub summary: CycleSummary,
    pub assignments: Vec<TaskAssignment>,
    pub topics: Vec<TopicOutcome>,
    /// Execution result per topic; topics without an executable decision are absent
    pub executions: BTreeMap<String, Execution>,
}

// ─────────────────────────────────────────────────────────────────
// Reasoning with limits
// ─────────────────────────────────────────────────────────────────

/// Calls the reasoning service under the shared concurrency limit and a
/// per-call timeout clamped to the cycle deadline
struct ReasoningSource<'a> {
    reasoning: &'a dyn ReasoningService,
    permits: &'a Semaphore,
    history: &'a DecisionHistory,
    timeout: Duration,
    deadline: Instant,
    context: ObservationContext,
}

impl ReasoningSource<'_> {
    async fn ask(&self, persona: &Persona) -> Result<ReasoningOutput> {
        let limit = std::cmp::min(Instant::now() + self.timeout, self.deadline);
        let mut context = self.context.clone();
        context.recent_decisions = self.history.recent(&persona.id);
        let call = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| Error::Internal("reasoning semaphore closed".to_string()))?;
            self.reasoning
                .reason(&PersonaContext::from(persona), &context)
                .await
        };
        match tokio::time::timeout_at(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::reasoning_failure(format!(
                "no answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl<'a> PositionSource for ReasoningSource<'a> {
    async fn position(&self, persona: &Persona) -> Result<Position> {
        let output = self.ask(persona).await?;
        Ok(Position::from_output(persona.id.clone(), output))
    }
}

// ─────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────

pub struct Scheduler {
    settings: SchedulerSettings,
    registry: Arc<PersonaRegistry>,
    ledger: Arc<PerformanceLedger>,
    router: TaskRouter,
    engine: CoordinationEngine,
    collaborators: Collaborators,
    store: Arc<dyn DocumentStore>,
    history: DecisionHistory,
    permits: Semaphore,
    /// Summary sends still in flight
    notifications: Mutex<JoinSet<()>>,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        registry: Arc<PersonaRegistry>,
        ledger: Arc<PerformanceLedger>,
        router: TaskRouter,
        engine: CoordinationEngine,
        collaborators: Collaborators,
        store: Arc<dyn DocumentStore>,
        history: DecisionHistory,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_reasoning);
        Self {
            settings,
            registry,
            ledger,
            router,
            engine,
            collaborators,
            store,
            history,
            permits,
            notifications: Mutex::new(JoinSet::new()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<PersonaRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<PerformanceLedger> {
        &self.ledger
    }

    /// Run one full cycle
    pub async fn run_cycle(&self, cycle_number: u64) -> Result<CycleSummary> {
        let ctx = CycleContext::new(cycle_number, self.settings.period);
        let report = self.decide_and_act(ctx).await;
        self.record(&report).await
    }

    /// LISTEN, THINK, COORDINATE and ACT for one cycle
    pub async fn decide_and_act(&self, ctx: CycleContext) -> CycleReport {
        info!(cycle_id = %ctx.cycle_id, cycle = ctx.cycle_number, "Cycle started");
        let mut summary = CycleSummary::new(&ctx, self.settings.name.clone());

        let observations = self.listen(&ctx, &mut summary).await;
        let (routed, mut assignments) = self.route_all(&ctx, observations, &mut summary).await;
        let candidates = self.think(&ctx, &routed, &mut assignments).await;
        let topics = self.coordinate(&ctx, &routed, candidates, &mut summary).await;
        let executions = self.act(&ctx, &topics).await;

        CycleReport {
            ctx,
            summary,
            assignments,
            topics,
            executions,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // LISTEN
    // ─────────────────────────────────────────────────────────────

    async fn listen(&self, ctx: &CycleContext, summary: &mut CycleSummary) -> Vec<Observation> {
        let limit = std::cmp::min(Instant::now() + self.settings.connector_timeout, ctx.deadline);

        let polls = self.collaborators.connectors.iter().map(|connector| async move {
            let domain = connector.domain();
            let result = match tokio::time::timeout_at(limit, connector.poll()).await {
                Ok(result) => result,
                Err(_) => Err(Error::connector_unavailable(
                    domain,
                    format!("poll timed out after {}ms", self.settings.connector_timeout.as_millis()),
                )),
            };
            (domain, result)
        });

        let mut observations = Vec::new();
        let mut seen = BTreeSet::new();
        for (domain, result) in join_all(polls).await {
            match result {
                Ok(polled) => {
                    let polled: Vec<Observation> = polled
                        .into_iter()
                        .map(Observation::normalize)
                        .filter(|o| o.domain == domain && seen.insert(o.id.clone()))
                        .collect();
                    *summary.observations.entry(domain).or_default() += polled.len();
                    observations.extend(polled);
                }
                Err(e) => {
                    warn!(%domain, error = %e.format_for_log(), "Connector yielded no observations");
                    summary.observations.entry(domain).or_default();
                    summary.unavailable_domains.push(domain);
                }
            }
        }

        // Most urgent first; stable for equal urgency
        observations.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.observed_at.cmp(&b.observed_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(cycle_id = %ctx.cycle_id, count = observations.len(), "LISTEN complete");
        observations
    }

    // ─────────────────────────────────────────────────────────────
    // THINK
    // ─────────────────────────────────────────────────────────────

    async fn route_all(
        &self,
        ctx: &CycleContext,
        observations: Vec<Observation>,
        summary: &mut CycleSummary,
    ) -> (Vec<Routed>, Vec<TaskAssignment>) {
        let mut routed = Vec::new();
        let mut assignments = Vec::new();

        for observation in observations {
            let (route, tier) = match self.router.route(&observation) {
                RoutingDecision::Assigned { persona_id, tier } => (Route::Single { persona_id }, tier),
                RoutingDecision::RequiresCoordination {
                    candidates,
                    tier,
                    reasons,
                } => (Route::Coordinated { candidates, reasons }, tier),
                RoutingDecision::Unroutable { reason } => {
                    let err = Error::Unroutable {
                        observation_id: observation.id.clone(),
                        reason,
                    };
                    info!(topic = %observation.topic, error = %err.format_for_log(), "Observation dropped");
                    summary.unroutable += 1;
                    continue;
                }
            };

            let (task_type, persona_ids) = match route {
                Route::Single { ref persona_id } => (TaskType::SingleDecision, vec![persona_id.clone()]),
                Route::Coordinated { ref candidates, .. } => {
                    (TaskType::CoordinatedDecision, candidates.clone())
                }
            };
            let assignment = TaskAssignment::new(&ctx.cycle_id, &observation, task_type, persona_ids);
            for persona_id in &assignment.persona_ids {
                self.ledger.note_assigned(persona_id, assignment.assigned_at);
            }
            self.persist_assignment(&assignment).await;

            routed.push(Routed {
                observation,
                tier,
                route,
                assignment: assignments.len(),
            });
            assignments.push(assignment);
        }

        summary.assignments = assignments.len();
        (routed, assignments)
    }

    async fn think(
        &self,
        ctx: &CycleContext,
        routed: &[Routed],
        assignments: &mut [TaskAssignment],
    ) -> Vec<(usize, Candidate)> {
        let now = Utc::now();
        for assignment in assignments.iter_mut() {
            if assignment.start(now) {
                self.persist_assignment(assignment).await;
            }
        }

        let jobs = routed.iter().enumerate().filter_map(|(idx, r)| match r.route {
            Route::Single { ref persona_id } => Some((idx, r, persona_id.clone())),
            Route::Coordinated { .. } => None,
        });

        let calls = jobs.map(|(idx, r, persona_id)| async move {
            let started = Instant::now();
            let output = match self.registry.get(&persona_id) {
                Some(persona) => {
                    let source = self.source(ctx, &r.observation, r.tier, None);
                    source.ask(&persona).await
                }
                None => Err(Error::unknown_persona(&persona_id)),
            };
            let output = match output {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!(
                        persona_id = %persona_id,
                        topic = %r.observation.topic,
                        error = %e.format_for_log(),
                        "Reasoning failed, persona abstains"
                    );
                    None
                }
            };
            (
                idx,
                Candidate {
                    persona_id,
                    output,
                    latency_ms: started.elapsed().as_millis() as u64,
                },
            )
        });

        let candidates = join_all(calls).await;
        debug!(cycle_id = %ctx.cycle_id, answers = candidates.len(), "THINK complete");
        candidates
    }

    fn source<'a>(
        &'a self,
        ctx: &CycleContext,
        observation: &Observation,
        tier: ImpactTier,
        session_kind: Option<SessionKind>,
    ) -> ReasoningSource<'a> {
        ReasoningSource {
            reasoning: self.collaborators.reasoning.as_ref(),
            permits: &self.permits,
            history: &self.history,
            timeout: self.settings.reasoning_timeout,
            deadline: ctx.deadline,
            context: ObservationContext {
                cycle_id: ctx.cycle_id.clone(),
                observation: observation.clone(),
                tier,
                session_kind,
                recent_decisions: Vec::new(),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────
    // COORDINATE
    // ─────────────────────────────────────────────────────────────

    async fn coordinate(
        &self,
        ctx: &CycleContext,
        routed: &[Routed],
        candidates: Vec<(usize, Candidate)>,
        summary: &mut CycleSummary,
    ) -> Vec<TopicOutcome> {
        // Group by topic, keeping each topic's routed entries in priority order
        let mut by_topic: BTreeMap<String, (Vec<usize>, Vec<Candidate>)> = BTreeMap::new();
        for (idx, r) in routed.iter().enumerate() {
            by_topic.entry(r.observation.topic.clone()).or_default().0.push(idx);
        }
        for (idx, candidate) in candidates {
            by_topic
                .entry(routed[idx].observation.topic.clone())
                .or_default()
                .1
                .push(candidate);
        }

        let mut outcomes = Vec::new();
        let mut pending: Vec<(TopicOutcome, CoordinationSession)> = Vec::new();

        for (topic, (indexes, candidates)) in by_topic {
            let lead = &routed[indexes[0]];
            let tier = indexes
                .iter()
                .map(|&i| routed[i].tier)
                .max()
                .unwrap_or(lead.tier);

            let answered = best_answers(&candidates);
            let abstained: Vec<String> = candidates
                .iter()
                .filter(|c| c.output.is_none())
                .map(|c| c.persona_id.clone())
                .filter(|id| !answered.iter().any(|(p, _)| p.persona_id == *id))
                .collect();
            let latencies: BTreeMap<String, u64> = candidates
                .iter()
                .filter(|c| c.output.is_some())
                .map(|c| (c.persona_id.clone(), c.latency_ms))
                .collect();

            let mut coordinated: Vec<String> = Vec::new();
            let mut compliance = false;
            for &i in &indexes {
                if let Route::Coordinated {
                    ref candidates,
                    ref reasons,
                } = routed[i].route
                {
                    coordinated.extend(candidates.iter().cloned());
                    compliance |= reasons.contains(&CoordinationReason::ComplianceTags);
                }
            }
            let conflicting = answered
                .windows(2)
                .any(|w| !w[0].1.decision.agrees_with(&w[1].1.decision));

            let mut outcome = TopicOutcome {
                topic: topic.clone(),
                observation: lead.observation.clone(),
                tier,
                assignments: indexes.iter().map(|&i| routed[i].assignment).collect(),
                positions: answered.iter().map(|(_, p)| p.clone()).collect(),
                latencies,
                abstained,
                approved: None,
                session: None,
            };

            if coordinated.is_empty() && !conflicting {
                // Zero or more personas, all agreeing
                if let Some((_, first)) = answered.first() {
                    let ids = answered.iter().map(|(c, _)| c.persona_id.clone()).collect();
                    outcome.approved = Some((first.decision.clone(), ids));
                }
                outcomes.push(outcome);
                continue;
            }

            let kind = if !coordinated.is_empty() {
                if compliance {
                    SessionKind::ComplianceReview
                } else {
                    SessionKind::HighImpact
                }
            } else {
                SessionKind::TopicConflict
            };
            let mut participants = coordinated;
            participants.extend(answered.iter().map(|(c, _)| c.persona_id.clone()));
            participants.extend(outcome.abstained.iter().cloned());

            let mut session = match self.engine.open_session(
                &ctx.cycle_id,
                kind,
                &lead.observation,
                tier,
                &participants,
            ) {
                Ok(session) => session,
                Err(e) => {
                    warn!(topic = %topic, error = %e.format_for_log(), "Could not open session");
                    outcomes.push(outcome);
                    continue;
                }
            };
            self.engine
                .seed(&mut session, answered.iter().map(|(_, p)| p.clone()).collect());
            self.persist_session(&session).await;

            pending.push((outcome, session));
        }

        summary.sessions = pending.len();
        let deliberations = join_all(pending.iter_mut().map(|(outcome, session)| {
            let source = self.source(ctx, &outcome.observation, outcome.tier, Some(session.kind));
            async move { self.engine.deliberate(session, &source, ctx.deadline).await }
        }))
        .await;

        for ((mut outcome, session), deliberation) in pending.into_iter().zip(deliberations) {
            self.persist_session(&session).await;

            outcome.positions = session.positions.values().cloned().collect();
            outcome.latencies.extend(deliberation.latencies);
            outcome.abstained = deliberation.abstained;
            match deliberation.outcome {
                SessionOutcome::Approved {
                    decision,
                    persona_ids,
                    ..
                } => outcome.approved = Some((decision, persona_ids)),
                SessionOutcome::Cancelled {
                    rule, persona_id, ..
                } => {
                    if let Some(persona_id) = persona_id {
                        let err = Error::VetoedDecision {
                            topic: outcome.topic.clone(),
                            persona_id,
                        };
                        info!(error = %err.format_for_log(), "Decision vetoed");
                        summary.vetoed += 1;
                    } else {
                        info!(topic = %outcome.topic, ?rule, "Session cancelled");
                    }
                }
            }
            outcome.session = Some(session);
            outcomes.push(outcome);
        }

        outcomes.sort_by(|a, b| a.topic.cmp(&b.topic));
        debug!(cycle_id = %ctx.cycle_id, topics = outcomes.len(), "COORDINATE complete");
        outcomes
    }

    // ─────────────────────────────────────────────────────────────
    // ACT
    // ─────────────────────────────────────────────────────────────

    async fn act(&self, ctx: &CycleContext, topics: &[TopicOutcome]) -> BTreeMap<String, Execution> {
        // Keyed by topic: one action per topic at most
        let plan: BTreeMap<String, ApprovedAction> = topics
            .iter()
            .filter_map(|t| {
                let (decision, persona_ids) = t.approved.as_ref()?;
                decision.action.is_executable().then(|| {
                    (
                        t.topic.clone(),
                        ApprovedAction {
                            cycle_id: ctx.cycle_id.clone(),
                            topic: t.topic.clone(),
                            domain: t.observation.domain,
                            observation_id: t.observation.id.clone(),
                            decision: decision.clone(),
                            persona_ids: persona_ids.clone(),
                            tier: t.tier,
                        },
                    )
                })
            })
            .collect();

        let runs = plan.into_values().map(|action| async move {
            let result = self.execute(&action, ctx.deadline).await;
            (action, result)
        });

        let mut executions = BTreeMap::new();
        for (action, result) in join_all(runs).await {
            let execution = match result {
                Ok(receipt) => Execution::Succeeded(receipt),
                Err(e) => {
                    warn!(topic = %action.topic, error = %e.format_for_log(), "Action failed");
                    Execution::Failed(e.to_string())
                }
            };
            executions.insert(action.topic, execution);
        }
        debug!(cycle_id = %ctx.cycle_id, executed = executions.len(), "ACT complete");
        executions
    }

    async fn execute(&self, action: &ApprovedAction, deadline: Instant) -> Result<serde_json::Value> {
        let kind = action.decision.action;
        let executor = self.collaborators.executor(kind).ok_or_else(|| {
            Error::execution_failure(kind.as_str(), &action.topic, "no executor configured")
        })?;
        match tokio::time::timeout_at(deadline, executor.execute(action)).await {
            Ok(result) => result,
            Err(_) => Err(Error::execution_failure(
                kind.as_str(),
                &action.topic,
                "cycle ended before the action completed",
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // RECORD
    // ─────────────────────────────────────────────────────────────

    /// Append decision records, feed the ledger, close assignments and emit
    /// the cycle summary. Safe to replay for the same report.
    pub async fn record(&self, report: &CycleReport) -> Result<CycleSummary> {
        let ctx = &report.ctx;
        let mut summary = report.summary.clone();
        let mut assignments = report.assignments.clone();
        let now = Utc::now();

        for topic in &report.topics {
            let execution = report.executions.get(&topic.topic);
            let vetoed = topic.vetoed();
            let attributed: &[String] = topic
                .approved
                .as_ref()
                .map(|(_, ids)| ids.as_slice())
                .unwrap_or(&[]);

            if let (Some((decision, ids)), Some(execution)) = (&topic.approved, execution) {
                summary.actions.push(ActionReport {
                    topic: topic.topic.clone(),
                    domain: topic.observation.domain,
                    action: decision.action,
                    persona_ids: ids.clone(),
                    success: matches!(execution, Execution::Succeeded(_)),
                    error: match execution {
                        Execution::Failed(e) => Some(e.clone()),
                        Execution::Succeeded(_) => None,
                    },
                });
            }

            for position in &topic.positions {
                let status = position_status(position, topic, attributed, execution, vetoed);
                let record = DecisionRecord {
                    id: DecisionRecord::record_id(&ctx.cycle_id, &topic.topic, &position.persona_id),
                    cycle_id: ctx.cycle_id.clone(),
                    persona_id: position.persona_id.clone(),
                    topic: topic.topic.clone(),
                    context: record_context(topic),
                    decision: position.decision.clone(),
                    reasoning: position.reasoning.clone(),
                    confidence: position.confidence,
                    outcome_status: status,
                    outcome_data: execution_data(execution, status),
                    recorded_at: now,
                };

                let activity = summary.activity(&position.persona_id);
                activity.decisions += 1;
                match status {
                    OutcomeStatus::Executed => activity.executed += 1,
                    OutcomeStatus::ExecutionFailed => activity.failed += 1,
                    _ => {}
                }
                if position.veto && vetoed {
                    activity.vetoes += 1;
                }

                match store::insert_doc(self.store.as_ref(), collections::DECISIONS, &record.id, &record).await {
                    Ok(InsertOutcome::Inserted) => self.history.push(record.clone()),
                    Ok(InsertOutcome::AlreadyExists) => {
                        summary.duplicate_records += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(record_id = %record.id, error = %e.format_for_log(), "Failed to append decision record");
                        continue;
                    }
                }

                let latency = topic.latencies.get(&position.persona_id).copied().unwrap_or(0);
                let outcome = match status {
                    OutcomeStatus::Executed | OutcomeStatus::NoAction => Some(Outcome::success(&record.id, latency)),
                    OutcomeStatus::ExecutionFailed => Some(Outcome::failure(&record.id, latency)),
                    OutcomeStatus::Vetoed if position.decision.action.is_executable() && !position.veto => {
                        Some(Outcome::failure(&record.id, latency).with_violation())
                    }
                    _ => None,
                };
                if let Some(outcome) = outcome {
                    self.apply_outcome(&position.persona_id, outcome, &mut summary).await;
                }
            }

            for persona_id in &topic.abstained {
                summary.activity(persona_id).abstained += 1;
                let key = DecisionRecord::record_id(&ctx.cycle_id, &topic.topic, persona_id);
                self.apply_outcome(persona_id, Outcome::failure(key, 0), &mut summary)
                    .await;
            }

            let (status, result) = assignment_result(topic, execution);
            for &idx in &topic.assignments {
                if let Some(assignment) = assignments.get_mut(idx) {
                    if assignment.finish(status, result.clone(), now) {
                        self.persist_assignment(assignment).await;
                    }
                }
            }
        }

        if let Err(e) = self.ledger.persist_all().await {
            warn!(error = %e.format_for_log(), "Failed to persist performance metrics");
        }

        summary.finished_at = Utc::now();
        if let Err(e) = store::upsert_doc(self.store.as_ref(), collections::CYCLES, &summary.id, &summary).await {
            warn!(cycle_id = %summary.id, error = %e.format_for_log(), "Failed to persist cycle summary");
        }

        let sink = self.collaborators.sink.clone();
        let outgoing = summary.clone();
        {
            let mut pending = self.notifications.lock();
            // Reap sends that already finished
            while let Some(Some(_)) = pending.join_next().now_or_never() {}
            pending.spawn(async move {
                if let Err(e) = sink.send(&outgoing).await {
                    warn!(sink = sink.name(), error = %e.format_for_log(), "Cycle summary notification failed");
                }
            });
        }

        info!(
            cycle_id = %ctx.cycle_id,
            observations = summary.total_observations(),
            sessions = summary.sessions,
            executed = summary.executed(),
            suspended = summary.suspended.len(),
            "Cycle complete"
        );
        Ok(summary)
    }

    /// Wait up to `limit` for summary notifications still in flight.
    ///
    /// Returns how many finished; sends still pending at the limit are
    /// aborted and logged.
    pub async fn flush_notifications(&self, limit: Duration) -> usize {
        let mut pending = std::mem::replace(&mut *self.notifications.lock(), JoinSet::new());
        let deadline = Instant::now() + limit;
        let mut finished = 0;

        while !pending.is_empty() {
            match tokio::time::timeout_at(deadline, pending.join_next()).await {
                Ok(Some(Ok(()))) => finished += 1,
                Ok(Some(Err(e))) => warn!(error = %e, "Cycle summary notification task failed"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = pending.len(),
                        limit_ms = limit.as_millis() as u64,
                        "Cycle summary notifications abandoned"
                    );
                    break;
                }
            }
        }
        finished
    }

    async fn apply_outcome(&self, persona_id: &str, outcome: Outcome, summary: &mut CycleSummary) {
        match self.ledger.record_outcome(persona_id, outcome).await {
            Ok(RecordResult::Applied { suspended: true }) => summary.suspended.push(persona_id.to_string()),
            Ok(_) => {}
            Err(e) => warn!(persona_id, error = %e.format_for_log(), "Failed to update ledger"),
        }
    }

    async fn persist_assignment(&self, assignment: &TaskAssignment) {
        if let Err(e) =
            store::upsert_doc(self.store.as_ref(), collections::ASSIGNMENTS, &assignment.id, assignment).await
        {
            warn!(assignment_id = %assignment.id, error = %e.format_for_log(), "Failed to persist assignment");
        }
    }

    async fn persist_session(&self, session: &CoordinationSession) {
        if let Err(e) = store::upsert_doc(self.store.as_ref(), collections::SESSIONS, &session.id, session).await {
            warn!(session_id = %session.id, error = %e.format_for_log(), "Failed to persist session");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

/// Successful answers, one per persona (highest confidence wins), ordered by
/// descending confidence then id
fn best_answers(candidates: &[Candidate]) -> Vec<(&Candidate, Position)> {
    let mut best: BTreeMap<&str, (&Candidate, Position)> = BTreeMap::new();
    for candidate in candidates {
        let Some(ref output) = candidate.output else {
            continue;
        };
        let position = Position::from_output(candidate.persona_id.clone(), output.clone());
        match best.get(candidate.persona_id.as_str()) {
            Some((_, existing)) if existing.confidence >= position.confidence => {}
            _ => {
                best.insert(candidate.persona_id.as_str(), (candidate, position));
            }
        }
    }
    let mut answers: Vec<_> = best.into_values().collect();
    answers.sort_by(|a, b| {
        b.1.confidence
            .partial_cmp(&a.1.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.persona_id.cmp(&b.1.persona_id))
    });
    answers
}

pub(crate) fn position_status(
    position: &Position,
    topic: &TopicOutcome,
    attributed: &[String],
    execution: Option<&Execution>,
    vetoed: bool,
) -> OutcomeStatus {
    if vetoed {
        return OutcomeStatus::Vetoed;
    }
    let Some((decision, _)) = topic.approved.as_ref() else {
        return OutcomeStatus::NoAction;
    };
    if !attributed.contains(&position.persona_id) {
        return OutcomeStatus::Overruled;
    }
    if !decision.action.is_executable() {
        return OutcomeStatus::NoAction;
    }
    match execution {
        Some(Execution::Succeeded(_)) => OutcomeStatus::Executed,
        Some(Execution::Failed(_)) | None => OutcomeStatus::ExecutionFailed,
    }
}

fn record_context(topic: &TopicOutcome) -> serde_json::Value {
    json!({
        "observation": topic.observation,
        "tier": topic.tier,
        "session_id": topic.session.as_ref().map(|s| s.id.clone()),
        "session_kind": topic.session.as_ref().map(|s| s.kind),
        "rule": topic.session.as_ref().and_then(|s| s.rule()),
    })
}

fn execution_data(execution: Option<&Execution>, status: OutcomeStatus) -> serde_json::Value {
    match (status, execution) {
        (OutcomeStatus::Executed, Some(Execution::Succeeded(receipt))) => json!({ "receipt": receipt }),
        (OutcomeStatus::ExecutionFailed, Some(Execution::Failed(error))) => json!({ "error": error }),
        _ => serde_json::Value::Null,
    }
}

fn assignment_result(topic: &TopicOutcome, execution: Option<&Execution>) -> (AssignmentStatus, serde_json::Value) {
    let session_id = topic.session.as_ref().map(|s| s.id.clone());
    match (&topic.approved, execution) {
        (Some(_), Some(Execution::Succeeded(receipt))) => (
            AssignmentStatus::Completed,
            json!({ "outcome": "executed", "receipt": receipt, "session_id": session_id }),
        ),
        (Some(_), Some(Execution::Failed(error))) => (
            AssignmentStatus::Failed,
            json!({ "outcome": "execution_failed", "error": error, "session_id": session_id }),
        ),
        (Some(_), None) => (
            AssignmentStatus::Completed,
            json!({ "outcome": "no_action", "session_id": session_id }),
        ),
        (None, _) if topic.session.is_some() => (
            AssignmentStatus::Cancelled,
            json!({
                "outcome": if topic.vetoed() { "vetoed" } else { "no_quorum" },
                "session_id": session_id,
            }),
        ),
        (None, _) => (
            AssignmentStatus::Failed,
            json!({ "outcome": "abstained", "personas": topic.abstained }),
        ),
    }
}
