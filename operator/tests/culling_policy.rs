//! Parametrized table tests over the three cullers' pure decision
//! functions, covering the boundary cases spec.md §8 calls out explicitly
//! (zero-disables-the-rule, strict vs non-strict threshold crossing).
//! Fixture/case style mirrors the pack's `#[rstest]`/`#[case]` convention
//! for table-driven unit tests (see `other_examples`'s
//! `stackable-operator` builder tests).

use rstest::rstest;

use session_operator::culling::activity_probe::{ActivityProbeResult, ActivitySnapshot};
use session_operator::culling::hibernated_culler::{self, HibernatedVerdict};
use session_operator::culling::idle_culler::{self, HibernateReason, IdleVerdict};
use session_operator::culling::pending_culler::{self, PendingVerdict};

fn ts(seconds: i64) -> k8s_openapi::jiff::Timestamp {
    k8s_openapi::jiff::Timestamp::from_second(seconds).unwrap()
}

#[rstest]
// idle_seconds_threshold=0 never hibernates for idleness regardless of how
// stale last_activity is.
#[case(0, 0, 1_000_000, IdleVerdict::AdvanceActivity(ts(0)))]
// crossing exactly at the threshold hibernates (>=, not >).
#[case(600, 0, 600, IdleVerdict::Hibernate { reason: HibernateReason::Idle })]
#[case(600, 0, 599, IdleVerdict::AdvanceActivity(ts(1_000_000 - 599)))]
fn idle_threshold_boundary(
    #[case] idle_seconds_threshold: u64,
    #[case] max_age_seconds_threshold: u64,
    #[case] last_activity_age: i64,
    #[case] expected: IdleVerdict,
) {
    let now = ts(1_000_000);
    let last_activity = ts(1_000_000 - last_activity_age);
    let probe = ActivityProbeResult::Known(ActivitySnapshot {
        connections: 0,
        last_activity,
        started: ts(0),
    });
    let verdict = idle_culler::decide(
        now,
        false,
        &probe,
        0,
        200,
        std::time::Duration::from_secs(60),
        idle_seconds_threshold,
        max_age_seconds_threshold,
        ts(0),
        false,
    );
    assert_eq!(verdict, expected);
}

#[rstest]
#[case(0, Some(0), HibernatedVerdict::NoOp)]
#[case(60, None, HibernatedVerdict::RecordHibernationDate)]
#[case(60, Some(59), HibernatedVerdict::NoOp)]
#[case(60, Some(60), HibernatedVerdict::Delete)]
fn hibernated_age_threshold_boundary(
    #[case] threshold: u64,
    #[case] hibernated_seconds_ago: Option<i64>,
    #[case] expected: HibernatedVerdict,
) {
    let now = ts(1000);
    let since = hibernated_seconds_ago.map(|ago| ts(1000 - ago));
    assert_eq!(hibernated_culler::decide(now, true, threshold, since), expected);
}

#[rstest]
#[case(0, 1_000_000, PendingVerdict::NoOp)]
#[case(60, 60, PendingVerdict::NoOp)]
#[case(60, 61, PendingVerdict::Delete)]
fn pending_failed_threshold_boundary(
    #[case] threshold: u64,
    #[case] elapsed_seconds: i64,
    #[case] expected: PendingVerdict,
) {
    assert_eq!(pending_culler::decide(elapsed_seconds, threshold), expected);
}

#[rstest]
// both idle and max-age rules configured: age wins when idle hasn't
// crossed its own threshold yet but the server is old enough regardless.
#[case(10_000, 0, IdleVerdict::Hibernate { reason: HibernateReason::Age })]
fn max_age_wins_independent_of_idle_state(
    #[case] server_age: i64,
    #[case] last_activity_age: i64,
    #[case] expected: IdleVerdict,
) {
    let now = ts(10_000);
    let started = ts(10_000 - server_age);
    let last_activity = ts(10_000 - last_activity_age);
    let probe = ActivityProbeResult::Known(ActivitySnapshot {
        connections: 5,
        last_activity,
        started,
    });
    let verdict = idle_culler::decide(
        now,
        false,
        &probe,
        0,
        200,
        std::time::Duration::from_secs(60),
        0,
        5_000,
        started,
        false,
    );
    assert_eq!(verdict, expected);
}
