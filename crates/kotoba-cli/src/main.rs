mod logging;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand, ValueEnum};
use image::ImageFormat;
use kotoba_canvas::{normalize, DrawingSession, NormalizeOptions, PointerEvent, PointerKind};
use kotoba_contracts::api::{
    encode_data_url, ChatRequest, KanjiImageRequest, Language, LookupRequest, RecognizeRequest,
    TranslateRequest, VocabularyRequest,
};
use kotoba_contracts::kanji::JlptLevel;
use kotoba_engine::{handle, ApiKey, EngineConfig, Endpoint, KotobaEngine, TaskKind, TaskResult};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "kotoba-rs", version, about = "Kanji study assistant backed by Gemini")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// API key for this invocation; overrides GEMINI_API_KEY.
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Use the offline transport instead of the network.
    #[arg(long, global = true)]
    dryrun: bool,
    /// Append pipeline events as JSONL to this file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Per-attempt timeout applied to every task.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Recognize a handwritten kanji from strokes or an image file.
    Recognize(RecognizeArgs),
    /// Look up a single kanji.
    Lookup { character: String },
    Chat(ChatArgs),
    Translate(TranslateArgs),
    /// Generate a vocabulary list for a topic.
    Vocab(VocabArgs),
    /// Generate an illustration for a kanji.
    KanjiImage(KanjiImageArgs),
    /// Invoke an endpoint handler with a raw JSON body.
    Handle(HandleArgs),
}

#[derive(Debug, Parser)]
struct RecognizeArgs {
    /// JSON array of strokes, each an array of [x, y] points.
    #[arg(long, conflicts_with = "image", required_unless_present = "image")]
    strokes: Option<PathBuf>,
    /// PNG or JPEG file.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    model_hint: Option<String>,
    /// Write the normalized bitmap here (strokes input only).
    #[arg(long, requires = "strokes")]
    save_bitmap: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LanguageArg {
    Ja,
    En,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::Ja => Language::Ja,
            LanguageArg::En => Language::En,
        }
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    message: String,
    #[arg(long)]
    context: Option<String>,
    #[arg(long, value_enum)]
    language: Option<LanguageArg>,
}

#[derive(Debug, Parser)]
struct TranslateArgs {
    text: String,
    /// Target language; defaults to the opposite of the input's script.
    #[arg(long, value_enum)]
    to: Option<LanguageArg>,
}

#[derive(Debug, Parser)]
struct VocabArgs {
    topic: String,
    #[arg(long)]
    level: Option<JlptLevel>,
    #[arg(long)]
    count: Option<u32>,
}

#[derive(Debug, Parser)]
struct KanjiImageArgs {
    character: String,
    #[arg(long)]
    style: Option<String>,
    /// Write the decoded image bytes here.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct HandleArgs {
    endpoint: Endpoint,
    /// Request body file, or `-` for stdin.
    #[arg(long, default_value = "-")]
    body: PathBuf,
    #[arg(long, default_value = "application/json")]
    content_type: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("kotoba-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let config = engine_config(&cli, EngineConfig::from_env());
    let api_key = cli.api_key.as_deref().and_then(ApiKey::new);
    let engine = KotobaEngine::new(config);
    info!(transport = engine.transport_name(), "engine ready");
    let key = api_key.as_ref();

    match cli.command {
        Command::Recognize(args) => {
            let image = recognition_image(&args)?;
            let request = RecognizeRequest {
                image,
                model_hint: args.model_hint,
            };
            report(engine.recognize(&request, key))
        }
        Command::Lookup { character } => {
            report(engine.lookup(&LookupRequest { character }, key))
        }
        Command::Chat(args) => {
            let request = ChatRequest {
                message: args.message,
                context: args.context,
                language: args.language.map(Language::from),
            };
            report(engine.chat(&request, key))
        }
        Command::Translate(args) => {
            let request = TranslateRequest {
                text: args.text,
                target_language: args.to.map(Language::from),
            };
            report(engine.translate(&request, key))
        }
        Command::Vocab(args) => {
            let request = VocabularyRequest {
                topic: args.topic,
                level: args.level,
                count: args.count,
            };
            report(engine.vocabulary(&request, key))
        }
        Command::KanjiImage(args) => {
            let request = KanjiImageRequest {
                character: args.character,
                style: args.style,
            };
            let (image, failure) = match engine.kanji_image_or_placeholder(&request, key) {
                Ok(result) => result,
                Err(failure) => return Ok(report_failure(&failure.error, failure.attempts.len())),
            };
            if let Some(failure) = &failure {
                eprintln!("no model produced an image ({}); using placeholder", failure.error);
            }
            if let Some(out) = &args.out {
                write_data_url(&image.data_url, out)?;
                eprintln!("wrote {}", out.display());
            }
            print_json(&json!(image))?;
            Ok(0)
        }
        Command::Handle(args) => {
            let body = read_body(&args.body)?;
            let response = handle(
                &engine,
                args.endpoint,
                &args.content_type,
                &body,
                cli.api_key.as_deref(),
            );
            print_json(&json!({ "status": response.status, "body": response.body }))?;
            Ok(if response.is_success() { 0 } else { 2 })
        }
    }
}

fn engine_config(cli: &Cli, mut config: EngineConfig) -> EngineConfig {
    if cli.dryrun {
        config.dryrun = true;
    }
    if let Some(path) = &cli.events {
        config.events_path = Some(path.clone());
    }
    if let Some(ms) = cli.timeout_ms {
        for task in TaskKind::ALL {
            config.timeouts.set(task, Duration::from_millis(ms.max(1)));
        }
    }
    config
}

fn report<T: Serialize>(result: TaskResult<T>) -> Result<i32> {
    match result {
        Ok(output) => {
            for warning in &output.warnings {
                eprintln!("warning: {warning}");
            }
            print_json(&json!({
                "data": output.value,
                "model": output.model,
                "step": output.step,
                "variant": output.variant.as_str(),
                "attempts": output.attempts.len(),
                "fallbackReason": output.fallback_reason,
            }))?;
            Ok(0)
        }
        Err(failure) => Ok(report_failure(&failure.error, failure.attempts.len())),
    }
}

fn report_failure(error: &kotoba_engine::PipelineError, attempts: usize) -> i32 {
    eprintln!(
        "{} (status {}, {} attempt(s)): {}",
        error.kind(),
        error.http_status(),
        attempts,
        error
    );
    eprintln!("{}", error.fallback_message(Language::En));
    2
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn recognition_image(args: &RecognizeArgs) -> Result<String> {
    if let Some(path) = &args.image {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        return image_data_url(&bytes);
    }
    let Some(path) = &args.strokes else {
        bail!("either --strokes or --image is required");
    };
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let session = session_from_strokes_json(&raw)?;
    let bitmap = normalize(session.strokes(), &NormalizeOptions::default())?;
    if let Some(out) = &args.save_bitmap {
        fs::write(out, bitmap.to_png()?)
            .with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(bitmap.to_data_url()?)
}

/// Replays `[[[x, y], …], …]` through a drawing session as pointer events.
fn session_from_strokes_json(raw: &str) -> Result<DrawingSession> {
    let strokes: Vec<Vec<[f32; 2]>> =
        serde_json::from_str(raw).context("strokes must be an array of [x, y] point arrays")?;
    let mut session = DrawingSession::new();
    for points in strokes.iter().filter(|points| !points.is_empty()) {
        let [x, y] = points[0];
        session.handle(PointerEvent::new(1, PointerKind::Down, x, y));
        for [x, y] in &points[1..] {
            session.handle(PointerEvent::new(1, PointerKind::Move, *x, *y));
        }
        let [x, y] = points[points.len() - 1];
        session.handle(PointerEvent::new(1, PointerKind::Up, x, y));
    }
    if session.is_empty() {
        bail!("no strokes to recognize");
    }
    Ok(session)
}

fn image_data_url(bytes: &[u8]) -> Result<String> {
    let mime_type = match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(other) => bail!("unsupported image format {other:?}; use PNG or JPEG"),
        Err(err) => bail!("unrecognized image data: {err}"),
    };
    Ok(encode_data_url(mime_type, bytes))
}

fn write_data_url(data_url: &str, out: &Path) -> Result<()> {
    let Some((_, encoded)) = data_url.split_once(";base64,") else {
        bail!("image is not a base64 data URL");
    };
    let bytes = BASE64.decode(encoded).context("decoding image data")?;
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, bytes).with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}

fn read_body(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        io::stdin().read_to_end(&mut body)?;
        return Ok(body);
    }
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use clap::Parser;
    use kotoba_engine::{EngineConfig, Endpoint, TaskKind};

    use super::{
        engine_config, image_data_url, session_from_strokes_json, write_data_url, Cli, Command,
    };

    #[test]
    fn global_flags_apply_to_config() {
        let cli = Cli::try_parse_from([
            "kotoba-rs",
            "--dryrun",
            "--timeout-ms",
            "2500",
            "lookup",
            "日",
        ])
        .unwrap();
        let config = engine_config(&cli, EngineConfig::default());
        assert!(config.dryrun);
        assert_eq!(
            config.timeouts.for_task(TaskKind::Recognize),
            Duration::from_millis(2500)
        );
        assert!(matches!(cli.command, Command::Lookup { ref character } if character == "日"));
    }

    #[test]
    fn handle_parses_endpoint_names() {
        let cli = Cli::try_parse_from(["kotoba-rs", "handle", "kanji-image", "--body", "req.json"])
            .unwrap();
        match cli.command {
            Command::Handle(args) => assert_eq!(args.endpoint, Endpoint::KanjiImage),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["kotoba-rs", "handle", "stroke-order"]).is_err());
    }

    #[test]
    fn recognize_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["kotoba-rs", "recognize"]).is_err());
        assert!(Cli::try_parse_from([
            "kotoba-rs",
            "recognize",
            "--strokes",
            "a.json",
            "--image",
            "a.png"
        ])
        .is_err());
    }

    #[test]
    fn strokes_json_replays_into_a_session() {
        let session =
            session_from_strokes_json("[[[10, 10], [10, 90]], [[10, 50], [90, 50]], []]").unwrap();
        assert_eq!(session.strokes().len(), 2);
        assert!(session_from_strokes_json("[]").is_err());
        assert!(session_from_strokes_json("{\"x\": 1}").is_err());
    }

    #[test]
    fn image_files_are_sniffed_not_trusted_by_name() {
        let png_signature = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        assert!(image_data_url(&png_signature)
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(image_data_url(b"GIF89a....").is_err());
    }

    #[test]
    fn data_url_is_decoded_to_file() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("nested").join("image.svg");
        write_data_url("data:image/svg+xml;base64,PHN2Zy8+", &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "<svg/>");
    }
}
