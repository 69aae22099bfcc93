//! `extracta` command-line interface.

use std::error::Error;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use extracta::catalog::SqliteCatalog;
use extracta::config::{load_config, Config};
use extracta::db::catalog_repo::{DataModelRow, FileRow};
use extracta::db::extraction_repo;
use extracta::db::{default_database_path, now_timestamp, Database};
use extracta::jobs::{
    reap_stale, JobStatus, JobStore, NewExtraction, ReaperAction, SqliteJobStore,
};
use extracta::loader::{guess_mime, LoaderRegistry};
use extracta::model::OpenAiCompatibleModel;
use extracta::orchestrator::RunExtraction;
use extracta::queue::{QueueConsumer, QueueMessage};
use extracta::storage::FilesystemBlobStore;
use extracta::telemetry::{self, LogFormat};
use extracta::DocumentExtractor;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Schema-driven structured data extraction from documents.
#[derive(Debug, Parser)]
#[command(name = "extracta")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true, env = "EXTRACTA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config
    #[arg(long, global = true, env = "EXTRACTA_DATABASE")]
    database: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and run migrations
    InitDb,

    /// Store a local file in the blob store and register it
    RegisterFile {
        #[arg(long)]
        user: String,
        path: PathBuf,
        /// MIME type; guessed from the filename when omitted
        #[arg(long)]
        mime: Option<String>,
    },

    /// Register (or replace) a data model from a JSON Schema file
    RegisterModel {
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: String,
        schema: PathBuf,
        /// Existing data model id to replace
        #[arg(long)]
        id: Option<String>,
    },

    /// Queue an extraction job
    Create {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: String,
        #[arg(long)]
        model: String,
        /// Field to pivot on
        #[arg(long)]
        pivot_on: Option<String>,
    },

    /// Run one queued job
    Execute { job_id: String },

    /// Process queue messages read from stdin, one JSON message or job id per line
    Consume {
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
    },

    /// Recover jobs stuck in processing
    Reap {
        #[arg(long, value_enum, default_value = "requeue")]
        action: ReapAction,
        /// Overrides `stale_after_secs` from the config
        #[arg(long)]
        older_than_secs: Option<u64>,
    },

    /// Print a job as JSON
    Show { job_id: String },

    /// Print job counts per status
    Stats,

    /// Print the text a loader extracts from a local file
    Load {
        path: PathBuf,
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReapAction {
    Requeue,
    Fail,
}

impl From<ReapAction> for ReaperAction {
    fn from(action: ReapAction) -> Self {
        match action {
            ReapAction::Requeue => ReaperAction::Requeue,
            ReapAction::Fail => ReaperAction::Fail,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init(cli.log_format) {
        eprintln!("Warning: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct Context {
    config: Option<Config>,
    database_path: PathBuf,
}

impl Context {
    fn new(cli: &Cli) -> CliResult<Self> {
        let config = cli.config.as_deref().map(load_config).transpose()?;
        let database_path = match (&cli.database, &config) {
            (Some(path), _) => path.clone(),
            (None, Some(config)) => config
                .database_path()
                .ok_or("Could not determine the database path")?,
            (None, None) => default_database_path().ok_or("Could not determine home directory")?,
        };
        Ok(Self {
            config,
            database_path,
        })
    }

    fn config(&self) -> CliResult<&Config> {
        self.config
            .as_ref()
            .ok_or_else(|| "This command needs a config file (--config or EXTRACTA_CONFIG)".into())
    }

    fn database(&self) -> CliResult<Database> {
        Ok(Database::open(&self.database_path)?)
    }

    fn blob_store(&self) -> CliResult<FilesystemBlobStore> {
        let root = match &self.config {
            Some(config) => config.storage_root(),
            None => dirs::home_dir().map(|h| h.join(".extracta").join("blobs")),
        }
        .ok_or("Could not determine the storage root")?;
        Ok(FilesystemBlobStore::new(root))
    }

    fn orchestrator(&self, db: &Database) -> CliResult<Arc<RunExtraction>> {
        let config = self.config()?;
        let settings = &config.model;

        let mut model = OpenAiCompatibleModel::new(
            &settings.endpoint,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )?
        .with_max_retries(settings.max_retries)
        .with_backoff(Duration::from_millis(settings.backoff_ms))
        .with_temperature(settings.temperature);
        if let Some(key) = settings.api_key.resolve_optional()? {
            model = model.with_api_key(key);
        }

        let catalog = Arc::new(SqliteCatalog::new(db.clone()));
        let extractor = DocumentExtractor::new(
            catalog.clone(),
            catalog,
            Arc::new(self.blob_store()?),
            Arc::new(model),
        )
        .with_pivot_concurrency(config.pivot_concurrency);

        Ok(Arc::new(
            RunExtraction::new(
                Arc::new(SqliteJobStore::new(db.clone())),
                Arc::new(extractor),
            )
            .with_heartbeat(Duration::from_secs(config.heartbeat_secs)),
        ))
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let ctx = Context::new(&cli)?;

    match cli.command {
        Command::InitDb => {
            ctx.database()?;
            println!("{}", ctx.database_path.display());
        }
        Command::RegisterFile { user, path, mime } => {
            let id = register_file(&ctx, &user, &path, mime).await?;
            println!("{}", id);
        }
        Command::RegisterModel {
            user,
            name,
            schema,
            id,
        } => {
            let id = register_model(&ctx, &user, &name, &schema, id).await?;
            println!("{}", id);
        }
        Command::Create {
            user,
            file,
            model,
            pivot_on,
        } => {
            let store = SqliteJobStore::new(ctx.database()?);
            let mut new = NewExtraction::new(user, file, model);
            new.pivot_on = pivot_on;
            let job = store.create_extraction(new).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Command::Execute { job_id } => {
            let db = ctx.database()?;
            let outcome = ctx.orchestrator(&db)?.execute(&job_id).await?;
            println!("{:?}", outcome);
        }
        Command::Consume { batch_size } => {
            let db = ctx.database()?;
            let consumer = QueueConsumer::new(ctx.orchestrator(&db)?, ctx.config()?.batch_concurrency);
            consume_stdin(&consumer, batch_size.max(1)).await?;
        }
        Command::Reap {
            action,
            older_than_secs,
        } => {
            let older_than = match (older_than_secs, &ctx.config) {
                (Some(secs), _) => secs,
                (None, Some(config)) => config.stale_after_secs,
                (None, None) => extracta::config::DEFAULT_STALE_AFTER_SECS,
            };
            let store = SqliteJobStore::new(ctx.database()?);
            let reaped = reap_stale(&store, Duration::from_secs(older_than), action.into()).await?;
            for id in reaped {
                println!("{}", id);
            }
        }
        Command::Show { job_id } => {
            let store = SqliteJobStore::new(ctx.database()?);
            let job = store
                .get_extraction(&job_id)
                .await?
                .ok_or_else(|| format!("Extraction job '{}' not found", job_id))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Command::Stats => {
            let db = ctx.database()?;
            for status in [
                JobStatus::Queued,
                JobStatus::Processing,
                JobStatus::Completed,
                JobStatus::Failed,
            ] {
                let count = extraction_repo::count_by_status(&db, status.as_str())?;
                println!("{:<10} {}", status.as_str(), count);
            }
        }
        Command::Load { path, mime } => {
            let mime = mime.unwrap_or_else(|| guess_mime(&path.to_string_lossy()));
            let loaded = tokio::task::spawn_blocking(move || LoaderRegistry::new().load(&path, &mime))
                .await??;
            println!("{}", serde_json::to_string_pretty(&loaded)?);
        }
    }

    Ok(())
}

async fn register_file(
    ctx: &Context,
    user: &str,
    path: &Path,
    mime: Option<String>,
) -> CliResult<String> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("File path has no usable filename")?
        .to_string();
    let content = std::fs::read(path)?;

    let id = uuid::Uuid::new_v4().to_string();
    let key = format!("{}/{}/{}", user, id, filename);
    ctx.blob_store()?.put(&key, &content)?;

    let catalog = SqliteCatalog::new(ctx.database()?);
    catalog
        .register_file(FileRow {
            id: id.clone(),
            user_id: user.to_string(),
            mime_type: mime.unwrap_or_else(|| guess_mime(&filename)),
            filename,
            s3_key: key,
            created_at: now_timestamp(),
        })
        .await?;
    Ok(id)
}

async fn register_model(
    ctx: &Context,
    user: &str,
    name: &str,
    schema_path: &Path,
    id: Option<String>,
) -> CliResult<String> {
    let text = std::fs::read_to_string(schema_path)?;
    let schema: serde_json::Value = serde_json::from_str(&text)?;
    extracta::schema::properties(&schema)?;
    jsonschema::validator_for(&schema).map_err(|e| format!("Not a valid JSON Schema: {}", e))?;

    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = now_timestamp();
    SqliteCatalog::new(ctx.database()?)
        .register_data_model(DataModelRow {
            id: id.clone(),
            user_id: user.to_string(),
            name: name.to_string(),
            schema_json: schema.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
        .await?;
    Ok(id)
}

/// Lines are either a full `{"messageId", "body"}` message or a bare body.
fn parse_line(line: &str, line_number: usize) -> QueueMessage {
    serde_json::from_str::<QueueMessage>(line)
        .unwrap_or_else(|_| QueueMessage::new(format!("line-{}", line_number), line))
}

async fn consume_stdin(consumer: &QueueConsumer, batch_size: usize) -> CliResult<()> {
    let stdin = std::io::stdin();
    let mut batch = Vec::with_capacity(batch_size);

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        batch.push(parse_line(line.trim(), index + 1));
        if batch.len() == batch_size {
            let response = consumer.process_batch(std::mem::take(&mut batch)).await;
            println!("{}", serde_json::to_string(&response)?);
        }
    }
    if !batch.is_empty() {
        let response = consumer.process_batch(batch).await;
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}
