//! Thin CLI over the countick library: generate a sticker or probe encoder support.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use countick::{
    BlockDigitRenderer, GenerateOpts, GeneratePhase, MasterClipTrimmer, StickerSession,
    is_ffmpeg_on_path, probe_capabilities,
};

#[derive(Parser, Debug)]
#[command(name = "countick", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a countdown sticker (requires `ffmpeg` on PATH).
    Generate(GenerateArgs),
    /// Report ffmpeg availability and usable encoding strategies.
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Emit the probe result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Countdown duration in seconds.
    #[arg(long)]
    seconds: u32,

    /// Output WebM path.
    #[arg(long)]
    out: PathBuf,

    /// Pre-rendered master asset enabling the trim fast path.
    #[arg(long)]
    master: Option<PathBuf>,

    /// Size bound in bytes reported on the output (0 disables the check).
    #[arg(long, default_value_t = countick::MAX_STICKER_BYTES)]
    max_bytes: usize,

    /// Preferred encoder strategy name (e.g. "vp9-quality").
    #[arg(long)]
    encoder: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Generate(args) => run_generate(args),
        Command::Probe(args) => run_probe(args),
    }
}

fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let caps = probe_capabilities();
    let opts = GenerateOpts {
        max_output_bytes: (args.max_bytes > 0).then_some(args.max_bytes),
        preferred_encoder: args.encoder,
        ..GenerateOpts::default()
    };

    let mut session = StickerSession::new(Arc::new(BlockDigitRenderer::new()), caps, opts);
    if let Some(master) = args.master {
        session = session.with_trimmer(MasterClipTrimmer::new(master));
    }

    let mut last_phase = None;
    let output = session
        .generate(args.seconds, &mut |p| {
            if last_phase != Some(p.phase) {
                last_phase = Some(p.phase);
                if !matches!(p.phase, GeneratePhase::Done | GeneratePhase::Failed) {
                    eprintln!("{:?} ({:.0}%)", p.phase, p.overall);
                }
            }
        })
        .map_err(|e| anyhow::anyhow!(StickerSession::failure_message(&e)))?;

    std::fs::write(&args.out, &output.clip.bytes)
        .with_context(|| format!("failed to write '{}'", args.out.display()))?;

    println!(
        "wrote {} ({} bytes, {}, source {:?}{})",
        args.out.display(),
        output.clip.size(),
        output.clip.mime,
        output.stats.source,
        if output.within_size_limit {
            ""
        } else {
            ", exceeds size bound"
        }
    );
    Ok(())
}

fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let ffmpeg = is_ffmpeg_on_path();
    let caps = probe_capabilities();
    let strategies = [
        ("vp9-quality", "libvpx-vp9"),
        ("vp9-realtime", "libvpx-vp9"),
        ("vp8", "libvpx"),
    ];

    if args.json {
        let report = serde_json::json!({
            "ffmpeg": ffmpeg,
            "strategies": strategies
                .iter()
                .map(|(name, codec)| (*name, caps.supports(codec)))
                .collect::<std::collections::BTreeMap<_, _>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !ffmpeg {
        println!("ffmpeg: not found on PATH");
        return Ok(());
    }
    println!("ffmpeg: available");
    for (name, codec) in strategies {
        let state = if caps.supports(codec) { "usable" } else { "missing codec" };
        println!("{name}: {state}");
    }
    Ok(())
}
