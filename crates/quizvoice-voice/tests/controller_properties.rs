mod common;

use common::{flow, Harness};
use proptest::prelude::*;
use quizvoice_types::{CaptureErrorKind, SubmissionOutcome, VoiceStep};
use quizvoice_voice::{CodeRules, Command, Event};

const TRANSCRIPTS: &[&str] = &[
    "quiz one two three four",
    "yes",
    "no",
    "maybe",
    "uh",
    "yes no",
    "abcd 9 8 7 6",
];

#[derive(Debug, Clone)]
enum Action {
    Start,
    Cancel,
    Typed(bool),
    Retry,
    Repeat,
    Finish,
    Hear(usize),
    Fail(CaptureErrorKind),
    Accept,
    Reject,
    Unavailable,
    Timeout,
}

fn error_kind() -> impl Strategy<Value = CaptureErrorKind> {
    prop_oneof![
        Just(CaptureErrorKind::NoSpeechDetected),
        Just(CaptureErrorKind::AudioCaptureUnavailable),
        Just(CaptureErrorKind::PermissionDenied),
        Just(CaptureErrorKind::NetworkError),
        Just(CaptureErrorKind::Aborted),
        Just(CaptureErrorKind::Unknown),
    ]
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        2 => Just(Action::Start),
        1 => Just(Action::Cancel),
        1 => any::<bool>().prop_map(Action::Typed),
        1 => Just(Action::Retry),
        1 => Just(Action::Repeat),
        4 => Just(Action::Finish),
        4 => (0..TRANSCRIPTS.len()).prop_map(Action::Hear),
        2 => error_kind().prop_map(Action::Fail),
        1 => Just(Action::Accept),
        1 => Just(Action::Reject),
        1 => Just(Action::Unavailable),
        1 => Just(Action::Timeout),
    ]
}

fn apply(h: &mut Harness, action: &Action) {
    let session = h.session().clone();
    match action {
        Action::Start => h.send(Command::StartFlow),
        Action::Cancel => h.send(Command::CancelFlow),
        Action::Typed(valid) => {
            let code = if *valid { "QUIZ1234" } else { "??" };
            h.send(Command::SubmitTypedCode(code.to_string()));
        }
        Action::Retry => h.send(Command::RetryCapture),
        Action::Repeat => h.send(Command::RepeatPrompt),
        Action::Finish if session.output_active => h.finish_utterance(),
        Action::Hear(i) if session.capture_active => h.hear(TRANSCRIPTS[*i]),
        Action::Fail(kind) if session.capture_active => h.capture_error(*kind),
        Action::Accept if session.step == VoiceStep::Submitting => {
            h.answer(SubmissionOutcome::Accepted { redirect: None })
        }
        Action::Reject if session.step == VoiceStep::Submitting => {
            h.answer(SubmissionOutcome::Rejected {
                reason: "Invalid code".to_string(),
            })
        }
        Action::Unavailable if session.step == VoiceStep::Submitting => {
            h.last_submission().unavailable("offline");
            h.pump();
        }
        Action::Timeout => {
            if let Some(generation) = h.controller.pending_deadline() {
                h.controller.handle(Event::Deadline { generation });
                h.pump();
            }
        }
        _ => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_capture_and_output_never_overlap(actions in prop::collection::vec(action(), 1..60)) {
        let max = 3;
        let mut h = Harness::with(flow(max), CodeRules::join_code(), true);
        for action in &actions {
            apply(&mut h, action);
            let s = h.session();
            prop_assert!(!(s.capture_active && s.output_active), "after {:?}: {:?}", action, s);
            prop_assert!(!h.overlapped(), "fakes overlapped after {:?}", action);
            prop_assert!(s.code_retries <= max);
            prop_assert!(s.confirm_retries <= max);
            prop_assert!((0.0..=1.0).contains(&s.audio_level));
            if s.step.is_committed() {
                prop_assert!(s.candidate_code.is_some());
            }
            if s.step == VoiceStep::Idle {
                prop_assert!(!s.capture_active);
            }
        }
    }

    #[test]
    fn test_nothing_survives_cancel(actions in prop::collection::vec(action(), 1..60)) {
        let mut h = Harness::new();
        for action in &actions {
            apply(&mut h, action);
        }

        h.send(Command::CancelFlow);
        let cancelled = h.session().clone();
        prop_assert_eq!(cancelled.step, VoiceStep::Idle);
        prop_assert!(!cancelled.capture_active && !cancelled.output_active);

        let (captures, outputs, submissions, calls) = {
            let log = h.log.lock().unwrap();
            (
                log.capture.clone(),
                log.output.clone(),
                log.submission.clone(),
                log.calls.len(),
            )
        };
        for reporter in &captures {
            reporter.started();
            reporter.result("quiz one two three four");
            reporter.error(CaptureErrorKind::NoSpeechDetected);
            reporter.ended();
        }
        for reporter in &outputs {
            reporter.done();
        }
        for reporter in &submissions {
            reporter.completed(SubmissionOutcome::Accepted { redirect: None });
        }
        h.pump();

        prop_assert_eq!(h.session(), &cancelled);
        prop_assert_eq!(h.log.lock().unwrap().calls.len(), calls);
        prop_assert_eq!(h.controller.pending_deadline(), None);
    }
}
