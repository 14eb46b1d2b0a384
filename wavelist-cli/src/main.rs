//! `wavelist` - drives one batch run of the playlist-generation core
//! against a station programming document for a given date (spec §6
//! names this binary's environment variables; CLI wiring itself is an
//! out-of-core ambient concern).

mod subsonic;

use clap::Parser;
use std::path::PathBuf;
use subsonic::SubsonicLibrary;
use tracing_subscriber::EnvFilter;
use wavelist_common::config::{resolve_budget_config, resolve_enrichment_config, BudgetMode, TomlConfig};
use wavelist_common::{UnitRate, Usd};
use wavelist_core::batch::{run_batch, BatchConfig};
use wavelist_core::enrich::{cache_dir_default, LastFmEnrichmentSource, MetadataEnrichmentSource, NoEnrichmentSource};
use wavelist_core::output::write_playlist;
use wavelist_core::selector::llm::{ApproximateTokenCounter, HttpLlmClient};

/// Generate one day's playlists from a station programming document.
#[derive(Parser, Debug)]
#[command(name = "wavelist", version, about)]
struct Cli {
    /// Path to the station programming document (markdown).
    document: PathBuf,

    /// Date to generate playlists for (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    date: Option<chrono::NaiveDate>,

    /// Directory to write `.m3u8`/`.json` playlist files into.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Directory to write the per-playlist JSON-lines decision log into.
    #[arg(long, default_value = "logs/decisions")]
    decision_log_dir: PathBuf,

    /// Directory the metadata enricher caches lookups in. Defaults to the
    /// platform cache directory (spec §4.2).
    #[arg(long)]
    metadata_cache_dir: Option<PathBuf>,
}

/// OpenAI per-token rates, overridable once a real price list is
/// configured; kept as constants here since spec §6 fixes only the
/// `OPENAI_MODEL` name, not its price. `UnitRate`, not `Usd` — both are
/// below `Usd`'s 4-digit precision and would round to zero there.
const DEFAULT_INPUT_RATE: &str = "0.00000015";
const DEFAULT_OUTPUT_RATE: &str = "0.00000060";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let date = cli.date.unwrap_or_else(|| chrono::Local::now().date_naive());

    let subsonic_url = std::env::var("SUBSONIC_URL").expect("SUBSONIC_URL must be set");
    let subsonic_user = std::env::var("SUBSONIC_USER").expect("SUBSONIC_USER must be set");
    let subsonic_password = std::env::var("SUBSONIC_PASSWORD").expect("SUBSONIC_PASSWORD must be set");
    let library = SubsonicLibrary::new(subsonic_url, subsonic_user, subsonic_password);

    let openai_key = std::env::var("OPENAI_KEY").expect("OPENAI_KEY must be set");
    let openai_model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let llm = HttpLlmClient::new(
        openai_key,
        openai_model,
        UnitRate::from_str_strict(DEFAULT_INPUT_RATE).expect("valid input rate literal"),
        UnitRate::from_str_strict(DEFAULT_OUTPUT_RATE).expect("valid output rate literal"),
    );
    let tokens = ApproximateTokenCounter;

    // Downstream AzuraCast sync (AZURACAST_HOST/API_KEY/STATIONID) is an
    // out-of-core collaborator (spec §1); reading it here only so a
    // future sync step has the configuration available without another
    // environment pass.
    let _azuracast_configured = std::env::var("AZURACAST_HOST").is_ok();

    let budget_config = resolve_budget_config(&TomlConfig::default())?;
    tracing::info!(
        mode = ?budget_config.mode,
        strategy = ?budget_config.allocation_strategy,
        "resolved budget configuration"
    );

    let config = BatchConfig {
        document_path: cli.document,
        generation_date: date,
        total_budget: budget_config.total_budget.map(Usd::new),
        budget_mode: budget_config.mode,
        allocation_strategy: budget_config.allocation_strategy,
        decision_log_dir: cli.decision_log_dir,
        metadata_cache_dir: cli.metadata_cache_dir.unwrap_or_else(cache_dir_default),
    };

    let enrichment_config = resolve_enrichment_config(&TomlConfig::default());
    let enrichment_source: Box<dyn MetadataEnrichmentSource> = match enrichment_config.lastfm_api_key {
        Some(key) => Box::new(LastFmEnrichmentSource::new(key)),
        None => {
            tracing::warn!("no LASTFM_API_KEY configured; metadata enrichment limited to cache and audio analysis");
            Box::new(NoEnrichmentSource)
        }
    };

    let playlists = run_batch(&library, &llm, &tokens, enrichment_source.as_ref(), config).await?;

    let mut any_hard_failure = false;
    for playlist in &playlists {
        let basename = playlist.name.replace([' ', '/'], "_").to_lowercase();
        let (m3u8_path, json_path) = write_playlist(&cli.output_dir, &basename, playlist)?;
        tracing::info!(
            playlist = %playlist.name,
            tracks = playlist.tracks.len(),
            status = ?playlist.validation.status,
            cost = %playlist.cost_actual,
            m3u8 = %m3u8_path.display(),
            sidecar = %json_path.display(),
            "wrote playlist"
        );
        if playlist.tracks.is_empty() {
            any_hard_failure = true;
        }
    }

    if any_hard_failure && budget_config.mode == BudgetMode::Hard {
        anyhow::bail!("one or more dayparts produced an empty playlist under hard budget mode");
    }

    Ok(())
}
