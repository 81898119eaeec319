//! Decision loop integration tests
//!
//! Full cycles against the bundled personas with scripted connectors,
//! reasoning and executors.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{test_config, Harness};
use eliza_daemon::backend::{RecordingSink, ScriptedConnector, ANY_TOPIC};
use eliza_daemon::persona::{Persona, PersonaRole, PersonaStatus};
use eliza_daemon::scheduler::CycleContext;
use eliza_daemon::store::{self, collections, MemoryStore};
use eliza_daemon::types::{
    ActionKind, AssignmentStatus, Decision, Domain, Observation, OutcomeStatus, ReasoningOutput,
    TaskAssignment, TaskType,
};

const SOFIA: &str = "sofia_community";
const MARCUS: &str = "marcus_technical";
const ALEXANDRA: &str = "alexandra_executive";
const DAVID: &str = "david_compliance";

fn connector(domain: Domain, observations: Vec<Observation>) -> Arc<ScriptedConnector> {
    Arc::new(ScriptedConnector::new(domain, observations))
}

fn mention(topic: &str) -> Observation {
    Observation::new(Domain::Social, topic)
        .with_urgency(2)
        .with_requested_action(ActionKind::Notification)
}

fn payout(topic: &str, amount: f64) -> Observation {
    Observation::new(Domain::Mining, topic)
        .with_urgency(3)
        .with_amount(amount)
        .with_requested_action(ActionKind::RewardTransfer)
}

fn reply(decision: Decision, confidence: f64) -> ReasoningOutput {
    ReasoningOutput::new(decision, confidence, "scripted")
}

// ─────────────────────────────────────────────────────────────────
// Routing and execution
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_social_observation_routed_to_community_persona() {
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let h = Harness::new(test_config(), vec![social]).await;

    let summary = h.cycle(1).await;

    assert_eq!(summary.total_observations(), 1);
    assert_eq!(summary.assignments, 1);
    assert_eq!(summary.sessions, 0);
    assert_eq!(summary.executed(), 1);

    let executed = h.notifications.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].topic, "mentions:xmrt");
    assert_eq!(executed[0].persona_ids, vec![SOFIA.to_string()]);
    assert_eq!(h.reasoning.call_count(SOFIA), 1);
    assert_eq!(h.reasoning.total_calls(), 1);

    let record = h.record_for(SOFIA, "mentions:xmrt").await;
    assert_eq!(record.outcome_status, OutcomeStatus::Executed);
    assert_eq!(record.decision.action, ActionKind::Notification);
    assert_eq!(h.ledger().success_rate(SOFIA), Some(1.0));

    let activity = &summary.personas[SOFIA];
    assert_eq!(activity.decisions, 1);
    assert_eq!(activity.executed, 1);
}

#[tokio::test]
async fn test_at_most_one_action_per_topic() {
    let mining = connector(
        Domain::Mining,
        vec![
            payout("payout:w1", 10.0),
            payout("payout:w1", 12.0),
            payout("payout:w2", 8.0),
        ],
    );
    let h = Harness::new(test_config(), vec![mining]).await;

    let summary = h.cycle(1).await;

    assert_eq!(summary.assignments, 3);
    let mut topics: Vec<String> = h.rewards.executed().into_iter().map(|a| a.topic).collect();
    topics.sort();
    assert_eq!(topics, vec!["payout:w1", "payout:w2"]);

    // One record per persona per topic
    assert_eq!(h.records().await.len(), 2);

    let assignments: Vec<TaskAssignment> = store::list_docs(&*h.store, collections::ASSIGNMENTS)
        .await
        .unwrap();
    assert_eq!(assignments.len(), 3);
    assert!(assignments
        .iter()
        .all(|a| a.status == AssignmentStatus::Completed));
}

#[tokio::test]
async fn test_execution_failure_recorded() {
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let h = Harness::new(test_config(), vec![social]).await;
    h.notifications.fail_topic("mentions:xmrt");

    let summary = h.cycle(1).await;

    assert_eq!(summary.executed(), 0);
    assert_eq!(summary.actions.len(), 1);
    assert!(!summary.actions[0].success);
    assert!(summary.actions[0].error.is_some());

    let record = h.record_for(SOFIA, "mentions:xmrt").await;
    assert_eq!(record.outcome_status, OutcomeStatus::ExecutionFailed);
    assert!(record.outcome_data["error"].is_string());
    assert_eq!(h.ledger().success_rate(SOFIA), Some(0.0));

    let assignments: Vec<TaskAssignment> = store::list_docs(&*h.store, collections::ASSIGNMENTS)
        .await
        .unwrap();
    assert_eq!(assignments[0].status, AssignmentStatus::Failed);
}

// ─────────────────────────────────────────────────────────────────
// Coordination
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_compliance_veto_blocks_action() {
    let proposal = Observation::new(Domain::Governance, "proposal:42")
        .with_urgency(5)
        .with_tags(["regulatory_compliance"])
        .with_requested_action(ActionKind::ProposalSubmission);
    let governance = connector(Domain::Governance, vec![proposal]);
    let h = Harness::new(test_config(), vec![governance]).await;
    h.reasoning.reply(
        DAVID,
        "proposal:42",
        reply(Decision::no_action("unregistered securities offering"), 0.9).with_veto(),
    );

    let summary = h.cycle(1).await;

    assert_eq!(summary.sessions, 1);
    assert_eq!(summary.vetoed, 1);
    assert!(h.proposals.executed().is_empty());
    assert_eq!(summary.personas[DAVID].vetoes, 1);

    let alexandra = h.record_for(ALEXANDRA, "proposal:42").await;
    let david = h.record_for(DAVID, "proposal:42").await;
    assert_eq!(alexandra.outcome_status, OutcomeStatus::Vetoed);
    assert_eq!(david.outcome_status, OutcomeStatus::Vetoed);
    assert_eq!(alexandra.context["session_kind"], "compliance_review");
    assert_eq!(alexandra.context["rule"], "compliance_veto");

    // The proposer carries the violation; the vetoing persona is not scored
    let metric = h.ledger().metric(ALEXANDRA);
    assert_eq!(metric.compliance_violations, 1);
    assert_eq!(metric.success_rate, Some(0.0));
    assert_eq!(h.ledger().success_rate(DAVID), None);

    let assignments: Vec<TaskAssignment> = store::list_docs(&*h.store, collections::ASSIGNMENTS)
        .await
        .unwrap();
    assert_eq!(assignments[0].status, AssignmentStatus::Cancelled);
    assert_eq!(assignments[0].task_type, TaskType::CoordinatedDecision);
}

#[tokio::test]
async fn test_equal_authority_resolved_by_confidence() {
    let mining = connector(Domain::Mining, vec![payout("payout:w9", 5000.0)]);
    let h = Harness::new(test_config(), vec![mining]).await;
    h.reasoning
        .reply(
            MARCUS,
            ANY_TOPIC,
            reply(
                Decision::new(ActionKind::RewardTransfer, "pay w9")
                    .with_payload(serde_json::json!({ "amount": 5000.0 })),
                0.7,
            ),
        )
        .reply(DAVID, ANY_TOPIC, reply(Decision::no_action("hold for review"), 0.9));

    let summary = h.cycle(1).await;

    // High amount pulls compliance into the session; both hold authority 8
    assert_eq!(summary.sessions, 1);
    assert!(h.rewards.executed().is_empty());

    let marcus = h.record_for(MARCUS, "payout:w9").await;
    let david = h.record_for(DAVID, "payout:w9").await;
    assert_eq!(marcus.outcome_status, OutcomeStatus::Overruled);
    assert_eq!(david.outcome_status, OutcomeStatus::NoAction);
    assert_eq!(david.context["rule"], "highest_confidence");
    assert_eq!(david.context["session_kind"], "high_impact");

    assert_eq!(h.ledger().success_rate(DAVID), Some(1.0));
    assert_eq!(h.ledger().success_rate(MARCUS), None);
}

#[tokio::test]
async fn test_confident_reward_executed_after_coordination() {
    let mining = connector(Domain::Mining, vec![payout("payout:w9", 5000.0)]);
    let h = Harness::new(test_config(), vec![mining]).await;
    h.reasoning
        .reply(
            MARCUS,
            ANY_TOPIC,
            reply(Decision::new(ActionKind::RewardTransfer, "pay w9"), 0.95),
        )
        .reply(DAVID, ANY_TOPIC, reply(Decision::no_action("fine either way"), 0.5));

    let summary = h.cycle(1).await;

    assert_eq!(summary.executed(), 1);
    let executed = h.rewards.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].persona_ids, vec![MARCUS.to_string()]);
    assert_eq!(
        h.record_for(MARCUS, "payout:w9").await.outcome_status,
        OutcomeStatus::Executed
    );
    assert_eq!(
        h.record_for(DAVID, "payout:w9").await.outcome_status,
        OutcomeStatus::Overruled
    );
}

#[tokio::test]
async fn test_senior_mining_persona_overrides_payout_amount() {
    const VICTOR: &str = "victor_treasury";
    let mining = connector(Domain::Mining, vec![payout("payout:w7", 5000.0)]);
    let mut config = test_config();
    config.impact.include_compliance = false;
    let h = Harness::new(config, vec![mining]).await;
    h.registry()
        .register(
            Persona::new(VICTOR, "Victor", PersonaRole::Technical, 9)
                .unwrap()
                .with_expertise(["mining"]),
        )
        .await
        .unwrap();

    let pay = |amount: f64| {
        reply(
            Decision::new(ActionKind::RewardTransfer, "pay w7")
                .with_payload(serde_json::json!({ "amount": amount })),
            0.8,
        )
    };
    h.reasoning
        .reply(MARCUS, ANY_TOPIC, pay(4000.0))
        .reply(VICTOR, ANY_TOPIC, pay(5000.0));

    let summary = h.cycle(1).await;

    assert_eq!(summary.sessions, 1);
    let executed = h.rewards.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].decision.payload["amount"], 5000.0);
    assert_eq!(executed[0].persona_ids, vec![VICTOR.to_string()]);

    let victor = h.record_for(VICTOR, "payout:w7").await;
    let marcus = h.record_for(MARCUS, "payout:w7").await;
    assert_eq!(victor.outcome_status, OutcomeStatus::Executed);
    assert_eq!(victor.context["rule"], "executive_override");
    assert_eq!(marcus.outcome_status, OutcomeStatus::Overruled);
}

#[tokio::test]
async fn test_conflicting_single_decisions_coordinated() {
    let social = connector(Domain::Social, vec![mention("release:v2")]);
    let governance = connector(
        Domain::Governance,
        vec![Observation::new(Domain::Governance, "release:v2").with_urgency(2)],
    );
    let h = Harness::new(test_config(), vec![social, governance]).await;
    h.reasoning.reply(
        ALEXANDRA,
        "release:v2",
        reply(Decision::no_action("wait for the audit"), 0.8),
    );

    let summary = h.cycle(1).await;

    assert_eq!(summary.assignments, 2);
    assert_eq!(summary.sessions, 1);
    assert!(h.notifications.executed().is_empty());
    // Positions from THINK are reused; nobody is asked twice
    assert_eq!(h.reasoning.total_calls(), 2);

    let sofia = h.record_for(SOFIA, "release:v2").await;
    let alexandra = h.record_for(ALEXANDRA, "release:v2").await;
    assert_eq!(sofia.outcome_status, OutcomeStatus::Overruled);
    assert_eq!(alexandra.outcome_status, OutcomeStatus::NoAction);
    assert_eq!(alexandra.context["session_kind"], "topic_conflict");
    assert_eq!(alexandra.context["rule"], "executive_override");
}

#[tokio::test]
async fn test_agreeing_personas_share_attribution() {
    let social = connector(Domain::Social, vec![mention("release:v3")]);
    let governance = connector(
        Domain::Governance,
        vec![Observation::new(Domain::Governance, "release:v3")
            .with_urgency(2)
            .with_requested_action(ActionKind::Notification)],
    );
    let h = Harness::new(test_config(), vec![social, governance]).await;

    let summary = h.cycle(1).await;

    assert_eq!(summary.sessions, 0);
    let executed = h.notifications.executed();
    assert_eq!(executed.len(), 1);
    let mut ids = executed[0].persona_ids.clone();
    ids.sort();
    assert_eq!(ids, vec![ALEXANDRA.to_string(), SOFIA.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_participant_abstains_at_deadline() {
    let mining = connector(Domain::Mining, vec![payout("payout:w5", 5000.0)]);
    let h = Harness::new(test_config(), vec![mining]).await;
    h.reasoning.delay(DAVID, Duration::from_secs(120));

    let summary = h.cycle(1).await;

    // Marcus answers alone with the default reward reply
    assert_eq!(summary.sessions, 1);
    assert_eq!(summary.executed(), 1);
    assert_eq!(summary.personas[DAVID].abstained, 1);
    assert_eq!(h.ledger().success_rate(DAVID), Some(0.0));
    assert!(h.records().await.iter().all(|r| r.persona_id != DAVID));
}

// ─────────────────────────────────────────────────────────────────
// Degradation
// ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_slow_and_failing_connectors_degrade_to_empty() {
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let mining = Arc::new(
        ScriptedConnector::new(Domain::Mining, vec![payout("payout:w1", 10.0)])
            .with_delay(Duration::from_secs(5)),
    );
    let governance = Arc::new(ScriptedConnector::new(Domain::Governance, Vec::new()).failing());
    let h = Harness::new(test_config(), vec![social, mining.clone(), governance]).await;

    let summary = h.cycle(1).await;

    assert_eq!(mining.poll_count(), 1);
    assert_eq!(summary.observations[&Domain::Social], 1);
    assert_eq!(summary.observations[&Domain::Mining], 0);
    assert_eq!(summary.observations[&Domain::Governance], 0);
    assert!(summary.unavailable_domains.contains(&Domain::Mining));
    assert!(summary.unavailable_domains.contains(&Domain::Governance));
    assert_eq!(summary.executed(), 1);
    assert_eq!(summary.actions_for(Domain::Social), 1);
    assert_eq!(summary.actions_for(Domain::Mining), 0);
    assert_eq!(summary.actions_for(Domain::Governance), 0);
    assert!(h.rewards.executed().is_empty());
}

#[tokio::test]
async fn test_repeated_failures_suspend_persona_and_stop_routing() {
    let mut config = test_config();
    config.ledger.min_samples = 3;
    config.ledger.suspension_threshold = 0.5;

    let mining = connector(
        Domain::Mining,
        vec![Observation::new(Domain::Mining, "hashrate:pool").with_urgency(2)],
    );
    let h = Harness::new(config, vec![mining]).await;
    h.reasoning.fail(MARCUS, ANY_TOPIC, "model unavailable");

    for cycle in 1..=2 {
        let summary = h.cycle(cycle).await;
        assert!(summary.suspended.is_empty());
        assert_eq!(summary.personas[MARCUS].abstained, 1);
    }

    let third = h.cycle(3).await;
    assert_eq!(third.suspended, vec![MARCUS.to_string()]);
    assert_eq!(h.registry().get(MARCUS).unwrap().status, PersonaStatus::Suspended);

    // No other persona covers mining, so the next observation is dropped
    let fourth = h.cycle(4).await;
    assert_eq!(fourth.unroutable, 1);
    assert_eq!(fourth.assignments, 0);
    assert_eq!(h.reasoning.call_count(MARCUS), 3);
}

// ─────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_record_replay_is_idempotent() {
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let h = Harness::new(test_config(), vec![social]).await;

    let ctx = CycleContext::new(7, Duration::from_secs(30));
    let report = h.scheduler().decide_and_act(ctx).await;

    let first = h.scheduler().record(&report).await.unwrap();
    assert_eq!(first.duplicate_records, 0);
    assert_eq!(h.ledger().metric(SOFIA).tasks_completed, 1);

    let second = h.scheduler().record(&report).await.unwrap();
    assert_eq!(second.duplicate_records, 1);
    assert_eq!(h.store.count(collections::DECISIONS), 1);
    assert_eq!(h.ledger().metric(SOFIA).tasks_completed, 1);
    assert_eq!(h.notifications.executed().len(), 1);
}

#[tokio::test]
async fn test_interrupted_work_recovered_on_start() {
    let store = Arc::new(MemoryStore::new());
    let obs = Observation::new(Domain::Mining, "payout:w3");
    let mut interrupted = TaskAssignment::new("c-old", &obs, TaskType::SingleDecision, vec![MARCUS.into()]);
    interrupted.start(chrono::Utc::now());
    store::upsert_doc(&*store, collections::ASSIGNMENTS, &interrupted.id, &interrupted)
        .await
        .unwrap();

    let h = Harness::with_store(test_config(), Vec::new(), store).await;

    assert_eq!(h.daemon.recovery().cancelled_assignments, 1);
    let recovered: TaskAssignment = store::get_doc(&*h.store, collections::ASSIGNMENTS, &interrupted.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered.status, AssignmentStatus::Cancelled);
    assert!(h.rewards.executed().is_empty());
}

#[tokio::test]
async fn test_cycle_summary_persisted_and_notified() {
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let h = Harness::new(test_config(), vec![social]).await;

    let summary = h.cycle(1).await;

    assert_eq!(summary.daemon, "test-daemon");
    assert_eq!(h.store.count(collections::CYCLES), 1);
    let notified = h.wait_for_summaries(1).await;
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].id, summary.id);
}

#[test]
fn test_slow_summary_notification_delivered_on_single_run() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(50)));

    let h = runtime.block_on(async {
        let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
        Harness::with_sink(test_config(), vec![social], sink).await
    });
    runtime.block_on(h.daemon.run(true)).unwrap();
    drop(runtime);

    let notified = h.sink.summaries();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].executed(), 1);
}

#[tokio::test]
async fn test_reasoning_sees_own_previous_decisions() {
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let h = Harness::new(test_config(), vec![social]).await;

    let first = h.cycle(1).await;
    h.cycle(2).await;

    let contexts = h.reasoning.contexts_for(SOFIA);
    assert_eq!(contexts.len(), 2);
    assert!(contexts[0].recent_decisions.is_empty());

    let recent = &contexts[1].recent_decisions;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].cycle_id, first.id);
    assert_eq!(recent[0].persona_id, SOFIA);
    assert_eq!(recent[0].topic, "mentions:xmrt");
    assert_eq!(recent[0].outcome_status, OutcomeStatus::Executed);
}

#[tokio::test]
async fn test_decision_history_reloaded_on_restart() {
    let store = Arc::new(MemoryStore::new());
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let first = Harness::with_store(test_config(), vec![social.clone()], store.clone()).await;
    let earlier = first.cycle(1).await;

    let mut config = test_config();
    config.reasoning.history_limit = 1;
    let second = Harness::with_store(config, vec![social], store).await;
    let later = second.cycle(1).await;
    second.cycle(2).await;

    let contexts = second.reasoning.contexts_for(SOFIA);
    assert_eq!(contexts[0].recent_decisions.len(), 1);
    assert_eq!(contexts[0].recent_decisions[0].cycle_id, earlier.id);
    // Limit of one keeps only the newest
    assert_eq!(contexts[1].recent_decisions.len(), 1);
    assert_eq!(contexts[1].recent_decisions[0].cycle_id, later.id);
}

#[tokio::test]
async fn test_personas_and_metrics_survive_restart() {
    let store = Arc::new(MemoryStore::new());
    let social = connector(Domain::Social, vec![mention("mentions:xmrt")]);
    let first = Harness::with_store(test_config(), vec![social], store.clone()).await;
    first.cycle(1).await;
    first
        .registry()
        .update_status(MARCUS, PersonaStatus::Maintenance)
        .await
        .unwrap();

    let second = Harness::with_store(test_config(), Vec::new(), store).await;
    assert_eq!(second.registry().len(), 4);
    assert_eq!(
        second.registry().get(MARCUS).unwrap().status,
        PersonaStatus::Maintenance
    );
    assert_eq!(second.ledger().success_rate(SOFIA), Some(1.0));
}
