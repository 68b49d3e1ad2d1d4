//! HTTP backends against an in-process mock of the join API and the speech
//! server.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Form, Json, Router};
use quizvoice_types::speech::TtsRequest;
use quizvoice_types::SubmissionOutcome;
use quizvoice_voice::events::{Event, OutputEvent, SubmissionEvent};
use quizvoice_voice::submit::DEFAULT_REJECTION;
use quizvoice_voice::{
    CodeSubmitter, HttpSubmitter, OutputReporter, RemoteSynthesizer, SpeechSynthesizer,
    SubmissionReporter, SubmitError,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

const FAKE_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt not really audio";

async fn join(Json(body): Json<Value>) -> impl IntoResponse {
    let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
    match code {
        "QUIZ1234" => (
            StatusCode::OK,
            Json(json!({"status": "success", "redirect": "/quiz/1"})),
        ),
        "ROLL" => (StatusCode::OK, Json(json!({"success": true}))),
        "ENDED000" => (
            StatusCode::OK,
            Json(json!({"status": "error", "message": "Quiz has ended"})),
        ),
        "MISSING0" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Quiz not found"})),
        ),
        "SILENT00" => (StatusCode::BAD_REQUEST, Json(json!({}))),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "database down"})),
        ),
    }
}

async fn tts(Form(request): Form<TtsRequest>) -> impl IntoResponse {
    if request.text == "fail" {
        return (StatusCode::SERVICE_UNAVAILABLE, Vec::new());
    }
    (StatusCode::OK, FAKE_WAV.to_vec())
}

async fn spawn_mock() -> SocketAddr {
    let app = Router::new()
        .route("/join", post(join))
        .route("/tts", post(tts));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn submitter(addr: SocketAddr) -> HttpSubmitter {
    HttpSubmitter::new(
        format!("http://{}/join", addr),
        "code",
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_submit_success_status_accepts_with_redirect() {
    let addr = spawn_mock().await;
    let outcome = submitter(addr).post("QUIZ1234").await.unwrap();
    assert_eq!(
        outcome,
        SubmissionOutcome::Accepted {
            redirect: Some("/quiz/1".to_string())
        }
    );

    let outcome = submitter(addr).post("ROLL").await.unwrap();
    assert_eq!(outcome, SubmissionOutcome::Accepted { redirect: None });
}

#[tokio::test]
async fn test_submit_other_answers_reject() {
    let addr = spawn_mock().await;
    let s = submitter(addr);

    assert_eq!(
        s.post("ENDED000").await.unwrap(),
        SubmissionOutcome::Rejected {
            reason: "Quiz has ended".to_string()
        }
    );
    assert_eq!(
        s.post("MISSING0").await.unwrap(),
        SubmissionOutcome::Rejected {
            reason: "Quiz not found".to_string()
        }
    );
    assert_eq!(
        s.post("SILENT00").await.unwrap(),
        SubmissionOutcome::Rejected {
            reason: DEFAULT_REJECTION.to_string()
        }
    );
}

#[tokio::test]
async fn test_submit_server_error_is_unavailable() {
    let addr = spawn_mock().await;
    let err = submitter(addr).post("BROKEN00").await.unwrap_err();
    assert!(matches!(err, SubmitError::Status(500)));
}

#[tokio::test]
async fn test_submit_unreachable_is_transport_error() {
    let s = HttpSubmitter::new("http://127.0.0.1:1/join", "code", Duration::from_secs(2)).unwrap();
    assert!(matches!(s.post("QUIZ1234").await, Err(SubmitError::Http(_))));
}

#[tokio::test]
async fn test_submitter_reports_through_the_queue() {
    let addr = spawn_mock().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut s = submitter(addr);

    s.submit("QUIZ1234", SubmissionReporter::new(tx.clone(), 7));
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        Event::Submission {
            generation: 7,
            event: SubmissionEvent::Completed(SubmissionOutcome::Accepted {
                redirect: Some("/quiz/1".to_string())
            }),
        }
    );

    s.submit("BROKEN00", SubmissionReporter::new(tx, 8));
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        Event::Submission {
            generation: 8,
            event: SubmissionEvent::Unavailable(_)
        }
    ));
}

#[tokio::test]
async fn test_remote_synthesizer_pipes_audio_to_player() {
    let addr = spawn_mock().await;
    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("played.wav");
    let player = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("cat > '{}'", sink.display()),
    ];
    let mut synth =
        RemoteSynthesizer::new(format!("http://{}/tts", addr), player, Duration::from_secs(5))
            .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    synth
        .speak("Please speak your quiz code.", OutputReporter::new(tx, 3))
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        event,
        Event::Output {
            generation: 3,
            event: OutputEvent::Done
        }
    );
    assert_eq!(std::fs::read(&sink).unwrap(), FAKE_WAV);
}

#[tokio::test]
async fn test_remote_synthesizer_reports_server_failure() {
    let addr = spawn_mock().await;
    let player = vec!["sh".to_string(), "-c".to_string(), "cat > /dev/null".to_string()];
    let mut synth =
        RemoteSynthesizer::new(format!("http://{}/tts", addr), player, Duration::from_secs(5))
            .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    synth.speak("fail", OutputReporter::new(tx, 4)).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    match event {
        Event::Output {
            generation: 4,
            event: OutputEvent::Failed(reason),
        } => assert!(reason.contains("503"), "unexpected reason: {}", reason),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_remote_synthesizer_needs_a_player() {
    assert!(RemoteSynthesizer::new("http://127.0.0.1:5000/tts", Vec::new(), Duration::from_secs(1)).is_err());
}
