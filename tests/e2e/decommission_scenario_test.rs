/// End-to-end decommission scenario
///
/// Drives a complete SNS delivery through envelope parsing, classification,
/// resolution across several partitions, both control-plane actions and the
/// lifecycle acknowledgment, checking the resulting stage trace.
use crate::test_utils::{init_test_env, report_trace};
use crate::{ActionScript, TestHarness};
use decommission_core::{parse_inbound, Disposition, Inbound, PipelineOutcome, StageRecord};

async fn scenario() -> TestHarness {
    let harness = init_test_env(&["p1", "p2", "p3"]).await;
    harness
        .rancher
        .add_host("p1", "h-1", &[("HOSTID", "i-456")])
        .add_host("p1", "h-2", &[])
        .add_host("p2", "h-9", &[("HOSTID", "i-123"), ("io.rancher.host.os", "linux")])
        .add_host("p3", "h-4", &[("HOSTID", "i-789")]);
    harness
        .rancher
        .script("h-9", "deactivate", ActionScript::immediate("inactive"))
        .script("h-9", "remove", ActionScript::converging("removing", &["removing", "removed"]));
    harness
}

#[tokio::test]
async fn test_sns_delivery_decommissions_host_end_to_end() -> anyhow::Result<()> {
    println!("🚀 Starting end-to-end decommission scenario");
    let harness = scenario().await;
    let pipeline = harness.pipeline()?;

    // Step 1: unwrap the SNS envelope
    let body = harness.fixtures.sns_body(&harness.fixtures.terminating_json("i-123"));
    let Inbound::Lifecycle(message) = parse_inbound(&body)? else {
        panic!("envelope did not carry a lifecycle message");
    };
    println!("✅ Step 1: envelope unwrapped for {:?}", message.instance_id);

    // Step 2: run the pipeline
    let outcome = pipeline.handle(&message).await;
    assert_eq!(Disposition::for_outcome(&outcome), Disposition::Acknowledge);
    let PipelineOutcome::Completed(report) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    println!("✅ Step 2: run {} completed", report.run_id);

    // Step 3: verify the trace and remote state
    assert_eq!(report.instance_id, "i-123");
    assert_eq!(report.host_id, "h-9");
    assert_eq!(report.summary(), "[Resolved:h-9, Deactivated:0-polls, Deleted:2-polls, Acknowledged]");
    assert_eq!(
        report.trace,
        vec![
            StageRecord::Resolved { host_id: "h-9".into() },
            StageRecord::Deactivated { polls: 0 },
            StageRecord::Deleted { polls: 2 },
            StageRecord::Acknowledged,
        ]
    );
    assert!(report.finished_at >= report.started_at);
    assert_eq!(harness.rancher.host_state("h-9").as_deref(), Some("removed"));
    assert_eq!(harness.rancher.polls_of("h-9"), 2);
    for other in ["h-1", "h-2", "h-4"] {
        assert_eq!(harness.rancher.host_state(other).as_deref(), Some("active"));
    }
    println!("✅ Step 3: host h-9 removed, neighbours untouched");

    // Step 4: exactly one acknowledgment carrying the message's identifiers
    let completions = harness.acknowledger.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].lifecycle_action_token, "token-i-123");
    assert_eq!(completions[0].instance_id, "i-123");
    println!("✅ Step 4: lifecycle hook released");

    report_trace("sns_delivery_decommissions_host_end_to_end", &report.summary());
    Ok(())
}

#[tokio::test]
async fn test_resolution_only_leaves_everything_in_place() -> anyhow::Result<()> {
    let harness = scenario().await;
    let message = harness.fixtures.terminating("i-123");
    let decommission_core::notification::Classified::Terminating(notification) = message.classify()? else {
        panic!("fixture should classify as terminating");
    };

    let host_id = harness.pipeline()?.resolve(&notification).await?;

    assert_eq!(host_id, "h-9");
    assert!(harness.rancher.mutating_calls().is_empty());
    assert_eq!(harness.acknowledger.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_redelivered_notification_after_success_is_consumed() -> anyhow::Result<()> {
    let harness = scenario().await;
    let pipeline = harness.pipeline()?;
    let body = harness.fixtures.sns_body(&harness.fixtures.terminating_json("i-123"));

    for attempt in 1..=2 {
        let Inbound::Lifecycle(message) = parse_inbound(&body)? else {
            panic!("envelope did not carry a lifecycle message");
        };
        let outcome = pipeline.handle(&message).await;
        println!("📊 Delivery {}: {:?}", attempt, Disposition::for_outcome(&outcome));
        assert_eq!(Disposition::for_outcome(&outcome), Disposition::Acknowledge);
    }

    // only the first delivery mutated anything
    assert_eq!(harness.rancher.mutating_calls().len(), 2);
    assert_eq!(harness.acknowledger.count(), 1);
    Ok(())
}
