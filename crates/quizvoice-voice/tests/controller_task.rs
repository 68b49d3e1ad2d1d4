mod common;

use common::Harness;
use quizvoice_types::{SubmissionOutcome, VoiceStep};
use quizvoice_voice::VoiceError;
use std::time::Duration;

/// Runs the controller on a task and drives it through the handle.
#[tokio::test]
async fn test_spawned_controller_completes_a_flow() {
    let Harness {
        controller,
        events,
        log,
    } = Harness::new();
    let (handle, task) = controller.spawn(events);

    handle.start_flow().unwrap();
    handle
        .wait_for(|s| s.step == VoiceStep::Greeting && s.output_active)
        .await
        .unwrap();
    log.lock().unwrap().output.last().unwrap().done();

    handle.wait_for(|s| s.capture_active).await.unwrap();
    let capture = log.lock().unwrap().capture.last().unwrap().clone();
    capture.started();
    capture.result("quiz one two three four");

    handle
        .wait_for(|s| s.step == VoiceStep::AwaitingConfirmTts)
        .await
        .unwrap();
    handle.submit_typed_code("QUIZ1234").unwrap();
    handle
        .wait_for(|s| s.step == VoiceStep::Accepted && s.output_active)
        .await
        .unwrap();
    log.lock().unwrap().output.last().unwrap().done();

    handle
        .wait_for(|s| s.step == VoiceStep::Submitting)
        .await
        .unwrap();
    log.lock()
        .unwrap()
        .submission
        .last()
        .unwrap()
        .completed(SubmissionOutcome::Accepted {
            redirect: Some("/quiz/7".to_string()),
        });

    let done = handle
        .wait_for(|s| s.step == VoiceStep::Submitted)
        .await
        .unwrap();
    assert_eq!(done.redirect.as_deref(), Some("/quiz/7"));
    assert_eq!(handle.snapshot(), done);

    handle.shutdown().unwrap();
    task.await.unwrap();
    assert!(matches!(
        handle.start_flow(),
        Err(VoiceError::ControllerClosed)
    ));
}

/// A stuck utterance is skipped once its watchdog fires.
#[tokio::test(start_paused = true)]
async fn test_output_watchdog_fires_on_the_task() {
    let Harness {
        controller, events, ..
    } = Harness::new();
    let (handle, _task) = controller.spawn(events);

    handle.start_flow().unwrap();
    let session = tokio::time::timeout(
        Duration::from_secs(60),
        handle.wait_for(|s| s.step == VoiceStep::ListeningForCode && s.capture_active),
    )
    .await
    .expect("watchdog fired")
    .unwrap();
    assert!(!session.output_active);
}

/// Dropping every handle stops the controller.
#[tokio::test]
async fn test_dropping_handles_stops_the_task() {
    let Harness {
        controller, events, ..
    } = Harness::new();
    let (handle, task) = controller.spawn(events);
    let watcher = handle.subscribe();

    handle.start_flow().unwrap();
    drop(handle);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("controller stopped")
        .unwrap();
    drop(watcher);
}
