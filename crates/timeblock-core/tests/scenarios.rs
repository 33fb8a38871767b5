//! End-to-end scheduling scenarios through the public API.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use timeblock_core::{
    AdaptiveLearner, Anomaly, PlannerEngine, PlanningInput, Priority, RescheduleEvent, RescheduleOutcome,
    SchedulingFeedback, Task, TimeBlock,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

#[test]
fn critical_task_is_placed_first_in_empty_day() {
    let tasks = vec![
        Task::new("Low", 60).with_id("low").with_priority(Priority::Low),
        Task::new("Critical", 60).with_id("crit").with_priority(Priority::Critical),
    ];
    let outcome = PlannerEngine::default()
        .generate_daily_plan(&PlanningInput::new(date(), tasks))
        .unwrap();

    let plan = &outcome.plan;
    let critical = plan.block_for_task("crit").unwrap();
    let low = plan.block_for_task("low").unwrap();
    assert_eq!(critical.start, at(8, 0));
    assert_eq!(critical.end, at(9, 0));
    assert!(low.start >= critical.end);
    assert!(outcome.anomalies.is_empty());
}

#[test]
fn deadline_before_window_start_is_met_and_flagged() {
    let tasks = vec![Task::new("Report", 120).with_id("r").with_deadline(at(9, 0))];
    let outcome = PlannerEngine::default()
        .generate_daily_plan(&PlanningInput::new(date(), tasks))
        .unwrap();

    let block = outcome.plan.block_for_task("r").unwrap();
    assert_eq!(block.start, at(7, 0));
    assert_eq!(block.end, at(9, 0));
    assert!(outcome
        .anomalies
        .iter()
        .any(|a| matches!(a, Anomaly::OutsideWindow { task_id, .. } if task_id == "r")));
    assert!(!outcome
        .anomalies
        .iter()
        .any(|a| matches!(a, Anomaly::DeadlineMissed { .. })));
}

#[test]
fn overtime_cascades_to_following_blocks() {
    let engine = PlannerEngine::default();
    let tasks = vec![
        Task::new("First", 60).with_id("a").with_priority(Priority::High),
        Task::new("Second", 30).with_id("b"),
        Task::new("Third", 30).with_id("c").with_priority(Priority::Low),
    ];
    let plan = engine
        .generate_daily_plan(&PlanningInput::new(date(), tasks))
        .unwrap()
        .plan;
    let before_b = plan.block_for_task("b").unwrap().start;
    let before_c = plan.block_for_task("c").unwrap().start;
    assert!(before_b < before_c);

    let mut rescheduler = engine.rescheduler(date()).unwrap();
    let event = RescheduleEvent::Overtime {
        task_id: "a".into(),
        overtime_minutes: 45,
    };
    let outcome = rescheduler
        .handle(&plan, &event, &engine.with_context(&[], &[]))
        .unwrap();

    let RescheduleOutcome::Shifted { plan: shifted, .. } = outcome else {
        panic!("45 minutes should shift locally");
    };
    let after_b = shifted.block_for_task("b").unwrap().start;
    let after_c = shifted.block_for_task("c").unwrap().start;
    assert_eq!(after_b - before_b, Duration::minutes(45));
    assert_eq!(after_c - before_c, Duration::minutes(45));
    assert!(after_b < after_c);
    assert_eq!(shifted.block_for_task("a").unwrap().duration_minutes(), 105);
}

#[test]
fn poor_accuracy_history_extends_block() {
    let task = Task::new("Review", 60).with_id("rev");
    let block = TimeBlock::for_task(&task, at(14, 0), at(15, 0), 5);

    // Ten days of 60 planned vs 100 actual: accuracy 0.6
    let history: Vec<SchedulingFeedback> = (1..=10)
        .map(|day| {
            let start = Utc.with_ymd_and_hms(2026, 2, day, 14, 0, 0).unwrap();
            SchedulingFeedback::new("rev", start, start + Duration::minutes(60))
                .with_actual(start, start + Duration::minutes(100))
        })
        .collect();

    let out = AdaptiveLearner::default().apply_learning(&[block], &[task], &history, date());
    assert_eq!(out[0].duration_minutes(), 72);
}

#[test]
fn slow_history_keeps_dependency_chain_inside_window() {
    let tasks: Vec<Task> = (0..6)
        .map(|k| {
            let task = Task::new(format!("Step {k}"), 60).with_id(format!("s{k}"));
            if k == 0 {
                task
            } else {
                task.with_dependencies([format!("s{}", k - 1)])
            }
        })
        .collect();

    // Every hour of the past week ran at 60% of the estimate.
    let history: Vec<SchedulingFeedback> = (20..=26)
        .flat_map(|day| {
            (0..24).map(move |hour| {
                let start = Utc.with_ymd_and_hms(2026, 2, day, hour, 0, 0).unwrap();
                SchedulingFeedback::new("past", start, start + Duration::minutes(60))
                    .with_actual(start, start + Duration::minutes(100))
            })
        })
        .collect();

    let outcome = PlannerEngine::default()
        .with_feedback(history)
        .generate_daily_plan(&PlanningInput::new(date(), tasks))
        .unwrap();

    assert!(
        !outcome
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::OutsideWindow { .. })),
        "{:?}",
        outcome.anomalies
    );
    let plan = &outcome.plan;
    for k in 0..6 {
        let block = plan.block_for_task(&format!("s{k}")).unwrap();
        assert_eq!(block.start, at(8, 0) + Duration::minutes(77 * k));
        assert_eq!(block.duration_minutes(), 72);
        assert!(block.end <= at(20, 0));
        if k > 0 {
            let previous = plan.block_for_task(&format!("s{}", k - 1)).unwrap();
            assert!(block.start >= previous.end + Duration::minutes(5));
        }
    }
}
