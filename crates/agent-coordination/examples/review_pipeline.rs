//! Review pipeline example
//!
//! Two reviewer agents on a shared bus, an SLA coordinator watching the
//! review deadlines, a monitor fed by agent state events and a pattern
//! library that learns which review strategy works.
//!
//! Run with:
//! ```bash
//! cargo run -p agent-coordination --example review_pipeline
//! # or with a config file
//! cargo run -p agent-coordination --example review_pipeline -- config.toml
//! ```

use agent_comms::{AgentRegistry, MessageBus};
use agent_coordination::{
    AggregationMonitor, EscalationCoordinator, EvolutionOutcome, InMemoryIssueTracker, NewPattern,
    Outcome, OutcomeMetrics, PatternTracker, RecommendContext, WorkflowMetadata,
};
use agent_core::{init_logging, load_config_or_default, AgentConfig};
use agent_runtime::{Agent, Task, TaskError, TaskRouter};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = load_config_or_default(&path);
    init_logging(&config.logging)?;

    let bus = MessageBus::new();
    let registry = AgentRegistry::new();

    let monitor = Arc::new(AggregationMonitor::new(config.monitor.clone()).with_bus(bus.clone()));
    let attached = monitor.attach(&bus);

    let router = TaskRouter::new().task("review", |task, ctx| async move {
        let pr = task.payload["pr"].as_u64().unwrap_or_default();
        if pr % 5 == 0 {
            return Err(TaskError::execution(format!("PR {} does not build", pr)));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.emit("review_completed", json!({"pr": pr, "reviewer": ctx.agent_id}), None);
        Ok(json!({"approved": true}))
    });

    let mut reviewers = Vec::new();
    for id in ["reviewer-1", "reviewer-2"] {
        let agent = Agent::builder(
            id,
            AgentConfig::new("reviewer", "Code Reviewer")
                .with_capabilities(["review"])
                .with_retry_attempts(2)
                .with_timeout(Duration::from_secs(5)),
        )
        .handler(router.clone())
        .bus(bus.clone())
        .registry(registry.clone())
        .publish_state(true)
        .build()
        .await?;
        reviewers.push(agent);
    }

    let tracker = InMemoryIssueTracker::new();
    let escalation = EscalationCoordinator::new(
        config.escalation.clone(),
        bus.clone(),
        registry.clone(),
        Arc::new(tracker.clone()),
    );
    let patterns = PatternTracker::new(config.patterns.clone()).with_bus(bus.clone());
    let strategy = patterns
        .register(
            NewPattern::new("single-reviewer")
                .component("review")
                .tag("code-review")
                .parameter("reviewers", 1.0)
                .expected_duration_ms(50),
        )
        .await?;

    monitor
        .register_workflow("release-1", WorkflowMetadata::new("release", Duration::from_secs(60)))
        .await?;
    monitor.start_workflow("release-1").await?;

    let prs: Vec<u64> = (1..=10).collect();
    for (i, pr) in prs.iter().enumerate() {
        let item = format!("PR-{}", pr);
        // Every third PR is already past its deadline
        let deadline = if pr % 3 == 0 {
            Utc::now() - chrono::Duration::minutes(5)
        } else {
            Utc::now() + chrono::Duration::hours(4)
        };
        let reviewer = &reviewers[i % reviewers.len()];
        escalation
            .track(&item, deadline, vec![reviewer.id().to_string()])
            .await?;

        let application = patterns.apply(&strategy.id, json!({"pr": pr})).await?;
        let result = reviewer.submit(Task::new("review", json!({"pr": pr}))).await;
        let outcome = if result.success { Outcome::Success } else { Outcome::Failure };
        patterns
            .record_outcome(
                &application,
                outcome,
                OutcomeMetrics {
                    duration_ms: Some(result.duration_ms),
                    satisfaction: None,
                },
            )
            .await?;

        // Overdue reviews stay open so the sweep has something to escalate
        if result.success && pr % 3 != 0 {
            escalation.complete(&item).await?;
        }
        monitor
            .update_progress("release-1", (i + 1) as f64 / prs.len() as f64)
            .await?;
    }

    let sweep = escalation.sweep().await?;
    println!(
        "SLA sweep: {} checked, {} escalated, {} at risk",
        sweep.checked, sweep.escalated, sweep.at_risk
    );
    for record in escalation.tracked().await? {
        println!(
            "  {} level {} workers {:?} comments {:?}",
            record.item_id,
            record.escalation_level,
            record.assigned_workers,
            tracker.comments(&record.item_id)
        );
    }

    match patterns.evolve(&strategy.id).await? {
        EvolutionOutcome::Evolved { child, .. } => {
            println!("Pattern evolved to v{} with {:?}", child.version, child.parameters)
        }
        EvolutionOutcome::Unchanged(reason) => println!("Pattern unchanged: {:?}", reason),
    }
    for rec in patterns.recommend(&RecommendContext::new(["code-review"])).await? {
        println!(
            "  {} v{} score {:.3} rank {:.3}",
            rec.pattern.name, rec.pattern.version, rec.pattern.effectiveness_score, rec.rank
        );
    }

    monitor.complete_workflow("release-1").await?;
    attached.detach().await;

    let bottlenecks = monitor.detect_bottlenecks().await?;
    let snapshot = monitor.generate_snapshot().await?;
    println!(
        "Dashboard: {}",
        serde_json::to_string_pretty(&snapshot.summary).unwrap_or_default()
    );
    for b in bottlenecks {
        println!("  bottleneck {} ({:?}): {}", b.id, b.severity, b.description);
    }

    for agent in &reviewers {
        let state = agent.state();
        println!(
            "  {} {}: {} completed, {} failed",
            state.id, state.status, state.completed_count, state.error_count
        );
    }
    Ok(())
}
