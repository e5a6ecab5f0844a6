use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use visitpipe::{
    AnthropicClient, AnthropicConfig, AsrConfig, AudioAsset, BillingConfig, DiarizerConfig,
    HttpDiarizer, HttpSpeechToText, HttpVoiceprintMatcher, MemoryStore, Orchestrator,
    PipelineConfig, RetryPolicy, StageCtx, StageId, TranscriptSegment, Visit, VisitSnapshot,
    VisitStore, VoiceprintConfig, extract_billable_items,
};

#[derive(Parser)]
#[command(name = "visitpipe")]
#[command(author, version, about = "Care-visit processing pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a recorded visit
    Run {
        /// Audio file or URL for the visit recording
        #[arg(short, long)]
        audio: String,

        /// Client name
        #[arg(long)]
        client: String,

        /// Caregiver name
        #[arg(long)]
        caregiver: String,

        /// Where to write the visit snapshot (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Skip diarization (and therefore alignment)
        #[arg(long)]
        skip_diarization: bool,

        /// Discard reviewer-adjusted billable items from a previous run
        #[arg(long)]
        force: bool,

        /// Minimum billable block duration in whole minutes
        #[arg(long, default_value = "5")]
        min_block_minutes: u32,

        /// Merge gap between same-category blocks, in seconds
        #[arg(long, default_value = "60")]
        merge_gap_seconds: u64,

        /// Maximum pipeline attempts on bookkeeping failures
        #[arg(long, default_value = "3")]
        max_attempts: u32,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a visit's status and per-stage pipeline state
    Status {
        /// Visit snapshot file (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run the billing rule engine offline over a segments file
    Bill {
        /// JSON file holding an array of transcript segments
        #[arg(short, long)]
        input: PathBuf,

        /// Minimum billable block duration in whole minutes
        #[arg(long, default_value = "5")]
        min_block_minutes: u32,

        /// Merge gap between same-category blocks, in seconds
        #[arg(long, default_value = "60")]
        merge_gap_seconds: u64,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            audio,
            client,
            caregiver,
            output,
            skip_diarization,
            force,
            min_block_minutes,
            merge_gap_seconds,
            max_attempts,
            verbose,
        } => {
            setup_logging(verbose);
            run_pipeline(
                audio,
                client,
                caregiver,
                output,
                skip_diarization,
                force,
                min_block_minutes,
                merge_gap_seconds,
                max_attempts,
            )
            .await
        }
        Commands::Status { input } => {
            setup_logging(false);
            print_status(input)
        }
        Commands::Bill {
            input,
            min_block_minutes,
            merge_gap_seconds,
            verbose,
        } => {
            setup_logging(verbose);
            bill_offline(input, min_block_minutes, merge_gap_seconds)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn run_pipeline(
    audio: String,
    client: String,
    caregiver: String,
    output: PathBuf,
    skip_diarization: bool,
    force: bool,
    min_block_minutes: u32,
    merge_gap_seconds: u64,
    max_attempts: u32,
) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let visit = Visit::new(client, caregiver);
    let visit_id = visit.visit_id.clone();
    store.put_visit(visit)?;
    store.put_audio_asset(AudioAsset::new(&visit_id, &audio))?;

    let ctx = StageCtx {
        store: store.clone(),
        stt: Arc::new(HttpSpeechToText::new(AsrConfig::from_env()?)),
        diarizer: Arc::new(HttpDiarizer::new(DiarizerConfig::from_env()?)),
        voiceprint: Arc::new(HttpVoiceprintMatcher::new(VoiceprintConfig::from_env()?)),
        llm: Arc::new(AnthropicClient::new(AnthropicConfig::from_env()?)),
        roster: Vec::new(),
    };

    let config = PipelineConfig {
        skip_diarization,
        force_rerun: force,
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        },
        billing: BillingConfig {
            min_block_minutes,
            merge_gap_ms: merge_gap_seconds * 1_000,
            ..Default::default()
        },
    };

    let orchestrator = Orchestrator::new(ctx, config);
    let status = orchestrator.run(&visit_id).await?;

    info!(%visit_id, status = ?status.status, "pipeline finished");
    print_stage_table(&status.pipeline_state);

    let items = store.billable_items(&visit_id)?;
    println!();
    println!("Billable items: {}", items.len());
    for item in &items {
        let flag = if item.is_flagged { " [FLAGGED]" } else { "" };
        println!(
            "  {} {} min ({} - {} ms){}",
            item.category, item.billed_minutes(), item.start_ms, item.end_ms, flag
        );
    }

    store.snapshot(&visit_id)?.save(&output)?;
    info!("Snapshot written to {:?}", output);

    Ok(())
}

fn print_status(input: PathBuf) -> Result<()> {
    let snapshot = VisitSnapshot::load(&input)?;

    println!("Visit {}", snapshot.visit.visit_id);
    println!(
        "  client: {}, caregiver: {}",
        snapshot.visit.client_name, snapshot.visit.caregiver_name
    );
    println!("  status: {:?}", snapshot.visit.status);
    println!();
    print_stage_table(&snapshot.pipeline_state);

    Ok(())
}

fn print_stage_table(state: &visitpipe::PipelineState) {
    println!("Pipeline stages");
    println!("---------------");
    for id in StageId::ALL {
        let stage = state.stage(id);
        let mut line = format!("{:<14} {:?}", id.name(), stage.status);
        if let Some(error) = &stage.error {
            line.push_str(&format!(" ({error})"));
        }
        println!("{line}");
    }
}

fn bill_offline(input: PathBuf, min_block_minutes: u32, merge_gap_seconds: u64) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read segments file {:?}", input))?;
    let segments: Vec<TranscriptSegment> =
        serde_json::from_str(&content).context("Failed to parse segments JSON")?;

    let config = BillingConfig {
        min_block_minutes,
        merge_gap_ms: merge_gap_seconds * 1_000,
        ..Default::default()
    };
    let window = visitpipe::models::speech_window(&segments);
    let items = extract_billable_items(&segments, window, &config);

    println!("Billable items: {}", items.len());
    for item in &items {
        println!();
        println!(
            "{} - {} min ({} - {} ms)",
            item.category, item.minutes, item.start_ms, item.end_ms
        );
        if let Some(reason) = &item.flag_reason {
            println!("  flagged: {reason}");
        }
        for ev in &item.evidence {
            println!("  \"{}\" (matched \"{}\")", ev.excerpt, ev.matched_keyword);
        }
    }

    Ok(())
}
