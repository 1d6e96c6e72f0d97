// Property-based tests for session replacement
// For any sequence of session commands, at most one primary and one
// transient session are ever running at the same time, and every
// session is stopped exactly once

mod common;

use common::*;
use peer_bridge::{Command, Orchestrator, Role, StartOptions};
use proptest::prelude::*;
use std::time::Duration;

fn session_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::StartAdvertising(StartOptions::default())),
        Just(Command::StartBrowsing(StartOptions::default())),
        Just(Command::Stop),
        Just(Command::TriggerTransientAdvertise),
        Just(Command::SendData { bytes: vec![1] }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sessions_never_stack(
        commands in prop::collection::vec((session_command(), 0u64..4_000), 1..24),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        let worst = rt.block_on(async {
            let (platform, fakes) = platform();
            let orchestrator = Orchestrator::spawn(config(), platform);
            let mut worst = (0usize, 0usize);

            for (command, pause_ms) in commands {
                orchestrator.dispatch(command).await.unwrap();
                tokio::time::sleep(Duration::from_millis(pause_ms)).await;

                let active = fakes.sessions.active();
                let transient = active.iter().filter(|(_, role)| *role == Role::Transient).count();
                worst.0 = worst.0.max(active.len() - transient);
                worst.1 = worst.1.max(transient);
            }

            orchestrator.shutdown().await;
            prop_assert!(fakes.sessions.active().is_empty());

            // Every handle is stopped exactly once, however many Stops arrived
            let calls = fakes.sessions.calls();
            for start in calls.iter().filter(|c| c.ends_with(":start")) {
                let handle = start.trim_end_matches(":start");
                let stops = calls
                    .iter()
                    .filter(|c| c.as_str() == format!("{}:stop", handle))
                    .count();
                prop_assert_eq!(stops, 1, "{} stopped {} times", handle, stops);
            }
            Ok(worst)
        })?;

        prop_assert!(worst.0 <= 1, "{} primary sessions running at once", worst.0);
        prop_assert!(worst.1 <= 1, "{} transient sessions running at once", worst.1);
    }
}
