use std::sync::Arc;

use kotoba_canvas::{normalize, DrawingSession, NormalizeOptions, PointerEvent, PointerKind};
use kotoba_contracts::api::RecognizeRequest;
use kotoba_contracts::kanji::JlptLevel;
use kotoba_engine::transport::Part;
use kotoba_engine::{EngineConfig, KotobaEngine, ScriptedReply, ScriptedTransport};
use serde_json::json;

/// Pointer paths for 日: left side, top and right side, middle bar, bottom bar.
const STROKES_OF_HI: &[&[(f32, f32)]] = &[
    &[(40.0, 30.0), (40.0, 170.0)],
    &[(40.0, 30.0), (140.0, 30.0), (140.0, 170.0)],
    &[(40.0, 100.0), (140.0, 100.0)],
    &[(40.0, 170.0), (140.0, 170.0)],
];

fn draw(session: &mut DrawingSession, strokes: &[&[(f32, f32)]]) {
    for path in strokes {
        let (start_x, start_y) = path[0];
        session.handle(PointerEvent::new(1, PointerKind::Down, start_x, start_y));
        for pair in path.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            for step in 1..=10 {
                let t = step as f32 / 10.0;
                session.handle(PointerEvent::new(
                    1,
                    PointerKind::Move,
                    x0 + (x1 - x0) * t,
                    y0 + (y1 - y0) * t,
                ));
            }
        }
        let (end_x, end_y) = path[path.len() - 1];
        session.handle(PointerEvent::new(1, PointerKind::Up, end_x, end_y));
    }
}

fn hi_reply() -> String {
    let record = json!({
        "character": "日",
        "onReading": ["ニチ", "ジツ"],
        "kunReading": ["ひ", "か"],
        "meaning": ["sun", "day"],
        "strokeCount": 4,
        "jlptLevel": "N5",
        "examples": [{"word": "日本", "reading": "にほん", "meaning": "Japan"}]
    });
    format!(
        "これは「日」という漢字です。\n```json\n{}\n```\n頑張ってください！",
        serde_json::to_string_pretty(&record).unwrap_or_default()
    )
}

#[test]
fn drawn_hi_is_normalized_sent_inline_and_recognized() -> anyhow::Result<()> {
    let mut session = DrawingSession::new();
    draw(&mut session, STROKES_OF_HI);
    assert_eq!(session.strokes().len(), 4);

    let submission = session.begin_submission()?;
    let bitmap = normalize(&submission.strokes, &NormalizeOptions::default())?;
    let data_url = bitmap.to_data_url()?;
    assert!(data_url.starts_with("data:image/png;base64,"));

    let transport = Arc::new(ScriptedTransport::new([ScriptedReply::text(hi_reply())]));
    let engine = KotobaEngine::with_transport(EngineConfig::default(), transport.clone());
    let request = RecognizeRequest {
        image: data_url.clone(),
        model_hint: None,
    };
    let output = engine.recognize(&request, None)?;
    session.complete_submission(submission, true);

    let record = output.value;
    assert_eq!(record.character, "日");
    assert_eq!(record.jlpt_level, JlptLevel::N5);
    assert!(!record.on_reading.is_empty());
    assert!(!record.meaning.is_empty());
    assert!(record.examples.iter().any(|example| example.word.contains('日')));
    assert!(session.is_empty());

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    let sent = calls[0].parts.iter().find_map(|part| match part {
        Part::InlineData { mime_type, data } => Some((mime_type.clone(), data.clone())),
        Part::Text(_) => None,
    });
    let (mime_type, data) = sent.ok_or_else(|| anyhow::anyhow!("no inline image sent"))?;
    assert_eq!(mime_type, "image/png");
    assert_eq!(format!("data:image/png;base64,{data}"), data_url);
    Ok(())
}

#[test]
fn failed_submission_keeps_the_drawing() -> anyhow::Result<()> {
    let mut session = DrawingSession::new();
    draw(&mut session, STROKES_OF_HI);
    let submission = session.begin_submission()?;
    let bitmap = normalize(&submission.strokes, &NormalizeOptions::default())?;

    let transport = Arc::new(ScriptedTransport::new(
        (0..4).map(|_| ScriptedReply::text("I cannot tell what this is.")),
    ));
    let engine = KotobaEngine::with_transport(EngineConfig::default(), transport.clone());
    let request = RecognizeRequest {
        image: bitmap.to_data_url()?,
        model_hint: None,
    };
    let failure = engine
        .recognize(&request, None)
        .err()
        .ok_or_else(|| anyhow::anyhow!("prose should not be accepted"))?;
    session.complete_submission(submission, false);

    assert_eq!(failure.error.http_status(), 422);
    assert_eq!(failure.attempts.len(), 4);
    assert_eq!(transport.calls().len(), 4);
    assert_eq!(session.strokes().len(), 4);
    assert!(!session.is_submitting());
    Ok(())
}
