use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Days, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use mentionscope::api::create_router;
use mentionscope::config::CONFIG;
use mentionscope::data_models::{AnalysisReport, AnalysisRequest, DateFilter, Page};
use mentionscope::db::{Database, MongoMentionStore};
use mentionscope::fetcher::build_client;
use mentionscope::mentions::CountingMode;
use mentionscope::pipeline::{MentionPipeline, PipelineSettings};
use mentionscope::search::{DuckDuckGoSource, SearchDepth};
use mentionscope::stopwords::{FileStopWords, StopWordCache};
use mentionscope::store::{MemoryStore, MentionStore};

#[derive(Parser)]
#[command(name = "mentionscope", version, about = "Count web mentions of a term group")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search, count mentions and print the report
    Analyze(AnalyzeArgs),
    /// List stored pages mentioning the given terms
    History {
        #[arg(short, long = "term")]
        terms: Vec<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Search term, repeat for a group
    #[arg(short, long = "term", required = true)]
    terms: Vec<String>,
    /// Start of the date range (defaults to 30 days ago)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// End of the date range (defaults to today)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// quick, normal or deep
    #[arg(long, default_value = "normal")]
    depth: String,
    /// exact_phrase, all_words or any_word
    #[arg(long, default_value = "exact_phrase")]
    mode: String,
    /// Only keep results whose URL contains this
    #[arg(long)]
    domain: Option<String>,
    #[arg(long, default_value_t = 30)]
    top: usize,
    #[arg(long, default_value_t = 20)]
    bigrams: usize,
    /// off, strict or keep_undated
    #[arg(long, default_value = "off")]
    date_filter: String,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl AnalyzeArgs {
    fn into_request(self) -> anyhow::Result<AnalysisRequest> {
        let today = Utc::now().date_naive();
        let to = self.to.unwrap_or(today);
        let from = self
            .from
            .unwrap_or_else(|| to.checked_sub_days(Days::new(30)).unwrap_or(to));
        let mut request = AnalysisRequest::new(self.terms, from, to);
        request.depth = SearchDepth::parse_or_default(&self.depth);
        request.mode = CountingMode::parse_or_default(&self.mode);
        request.domain_filter = self.domain;
        request.top_n = self.top;
        request.bigram_top_n = self.bigrams;
        request.date_filter = parse_date_filter(&self.date_filter)?;
        Ok(request)
    }
}

fn parse_date_filter(label: &str) -> anyhow::Result<DateFilter> {
    match label.trim().to_lowercase().as_str() {
        "off" => Ok(DateFilter::Off),
        "strict" => Ok(DateFilter::Strict),
        "keep_undated" | "keep-undated" => Ok(DateFilter::KeepUndated),
        other => anyhow::bail!("unknown date filter: {other}"),
    }
}

async fn open_store() -> Arc<dyn MentionStore> {
    match Database::from_config().await {
        Ok(Some(db)) => {
            info!(db = %CONFIG.mongo_db_name, "using MongoDB store");
            Arc::new(MongoMentionStore::new(&db))
        }
        Ok(None) => {
            info!("MONGO_URI not set, keeping results in memory");
            Arc::new(MemoryStore::new())
        }
        Err(e) => {
            warn!("could not connect to MongoDB, keeping results in memory: {:#}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

async fn build_pipeline() -> anyhow::Result<MentionPipeline> {
    let store = open_store().await;
    let stop_words = match &CONFIG.stop_words_path {
        Some(path) => StopWordCache::new(FileStopWords::new(path.clone())),
        None => StopWordCache::spanish(),
    };
    let client = build_client(
        &CONFIG.user_agent,
        Duration::from_secs(CONFIG.fetch_timeout_secs),
    )?;
    let source = DuckDuckGoSource::new(client, CONFIG.search_endpoint.clone());
    let settings = PipelineSettings {
        max_terms: CONFIG.max_terms,
        min_word_len: CONFIG.min_word_len,
    };
    Ok(MentionPipeline::new(
        Arc::new(source),
        store,
        Arc::new(stop_words),
        settings,
    ))
}

fn print_pages(pages: &[Page]) {
    for (i, page) in pages.iter().enumerate() {
        let per_term: Vec<String> = page
            .mentions()
            .iter()
            .map(|m| format!("{}={}", m.term, m.count))
            .collect();
        let date = page
            .published
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let source = if page.source.is_empty() {
            String::new()
        } else {
            format!(" via {}", page.source)
        };
        println!(
            "{:>3}. [{}] {} ({}) {} {}{}",
            i + 1,
            page.total_mentions(),
            page.title,
            page.domain,
            date,
            per_term.join(" "),
            source
        );
        println!("     {}", page.url);
    }
}

fn print_report(report: &AnalysisReport) {
    let s = &report.summary;
    println!(
        "Terms: {} | {} .. {} | depth {} ({} results) | mode {}",
        s.terms.join(", "),
        s.date_from,
        s.date_to,
        s.depth,
        s.max_results,
        s.counting_mode
    );
    if let Some(domain) = &s.domain_filter {
        println!("Domain filter: {domain}");
    }
    println!(
        "Pages consulted: {} | with mentions: {} | total mentions: {} | mean per page: {:.2}",
        s.pages_consulted, s.pages_with_mentions, s.total_mentions, s.mean_mentions_per_page
    );
    for m in s.mentions_per_term.iter() {
        println!("  {:<30} {}", m.term, m.count);
    }
    if let Some(stats) = &s.date_filter {
        println!(
            "Date filter: {} -> {} pages ({} undated)",
            stats.pages_before, stats.pages_after, stats.undated_pages
        );
    }

    println!("\nPages");
    print_pages(&report.pages);

    println!("\nTop words");
    for w in &report.top_words {
        println!("  {:<30} {}", w.word, w.frequency);
    }
    println!("\nTop bigrams");
    for b in &report.top_bigrams {
        println!("  {:<30} {}", b.word, b.frequency);
    }
    if !s.top_domains.is_empty() {
        println!("\nTop domains");
        for d in &s.top_domains {
            println!("  {:<30} {}", d.domain, d.pages);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Also picks up `log` records through tracing-subscriber's log bridge
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let pipeline = build_pipeline().await?;

    match cli.command {
        Command::Analyze(args) => {
            let json = args.json;
            let request = args.into_request()?;
            request.validate()?;
            let report = pipeline.run(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Command::History {
            terms,
            domain,
            limit,
        } => {
            let pages = pipeline
                .store()
                .find_pages(&terms, domain.as_deref(), Some(limit))
                .await
                .context("reading stored pages")?;
            if pages.is_empty() {
                println!("No stored pages match.");
            }
            print_pages(&pages);
        }
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| CONFIG.bind_addr.clone());
            let app = create_router(Arc::new(pipeline));
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!("listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
