use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use crate::config::{APP_NAME, CHUNK_SIZE, MAX_ATTEMPTS, PASSWORD_MIN_LENGTH, QUEUE_CAPACITY, WORKER_COUNT};
use crate::file::{FilterRules, PathFilter, PathSelector};
use crate::secret::Password;
use crate::store::{B2Client, BucketRef, BucketType};
use crate::types::UploadMode;
use crate::ui::progress::Bar;
use crate::ui::prompt::Prompt;
use crate::worker::{Pipeline, PipelineConfig, RetryPolicy};

/// Exactly one of the two must be given.
#[derive(Args, Debug, Default)]
pub struct BucketArgs {
    #[arg(long)]
    bucket_id: Option<String>,

    #[arg(long)]
    bucket_name: Option<String>,
}

impl BucketArgs {
    fn resolve(self) -> Result<BucketRef> {
        Ok(BucketRef::new(self.bucket_id, self.bucket_name)?)
    }
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// File or directory to upload.
    path: PathBuf,

    #[command(flatten)]
    bucket: BucketArgs,

    /// Encrypt every file with a password before sending it.
    #[arg(short, long)]
    encrypt: bool,

    /// Encryption password; prompted for when omitted. Implies --encrypt.
    #[arg(short, long)]
    password: Option<String>,

    /// Only upload paths matching this regular expression (matched from the start).
    #[arg(long)]
    include: Vec<String>,

    /// Skip paths matching this regular expression. Wins over includes.
    #[arg(long)]
    exclude: Vec<String>,

    #[arg(long)]
    include_glob: Vec<String>,

    #[arg(long)]
    exclude_glob: Vec<String>,

    #[arg(short = 'i', long)]
    ignore_case: bool,

    #[arg(long, default_value_t = WORKER_COUNT)]
    workers: usize,

    #[arg(long, default_value_t = QUEUE_CAPACITY)]
    queue: usize,

    #[arg(long, default_value_t = MAX_ATTEMPTS)]
    attempts: u32,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file or a directory tree.
    Upload(UploadArgs),

    /// List the account's buckets.
    Buckets,

    CreateBucket {
        name: String,

        /// allPublic or allPrivate.
        #[arg(long, default_value = "allPrivate")]
        bucket_type: String,
    },

    DeleteBucket {
        #[command(flatten)]
        bucket: BucketArgs,
    },

    UpdateBucket {
        #[command(flatten)]
        bucket: BucketArgs,

        #[arg(long)]
        bucket_type: String,
    },

    /// List file names, or every version with --versions.
    Files {
        #[command(flatten)]
        bucket: BucketArgs,

        #[arg(long)]
        versions: bool,

        #[arg(long)]
        start: Option<String>,
    },

    /// Show metadata of one file, by id or by name.
    Info {
        #[command(flatten)]
        bucket: BucketArgs,

        #[arg(long, conflicts_with = "name")]
        file_id: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },

    Hide {
        #[command(flatten)]
        bucket: BucketArgs,

        file_name: String,
    },

    DeleteVersion {
        file_name: String,
        file_id: String,
    },

    /// Download a file by id or by name. Existing files are kept unless --force.
    Download {
        #[command(flatten)]
        bucket: BucketArgs,

        #[arg(long, conflicts_with = "name")]
        file_id: Option<String>,

        #[arg(long)]
        name: Option<String>,

        destination: PathBuf,

        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Upload files to Backblaze B2, optionally encrypted with OpenSSL-compatible AES-256-CBC.")]
pub struct App {
    #[arg(long, env = "B2_ACCOUNT_ID", global = true)]
    account_id: Option<String>,

    #[arg(long, env = "B2_APPLICATION_KEY", global = true, hide_env_values = true)]
    application_key: Option<String>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl App {
    pub fn init() -> Result<Self> {
        let app = Self::parse();

        let level = if app.verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = tracing_subscriber::fmt().with_file(true).with_line_number(true).with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;

        Ok(app)
    }

    pub async fn execute(self) -> Result<()> {
        let client = self.client()?;

        match self.command {
            Commands::Upload(args) => Self::upload(client, args).await,
            Commands::Buckets => {
                crate::ui::show_buckets(&client.list_buckets().await?);
                Ok(())
            }
            Commands::CreateBucket { name, bucket_type } => {
                let bucket = client.create_bucket(&name, BucketType::parse(&bucket_type)?).await?;
                crate::ui::show_success(&format!("Created bucket {} ({})", bucket.bucket_name, bucket.bucket_id));
                Ok(())
            }
            Commands::DeleteBucket { bucket } => {
                let bucket = client.delete_bucket(&bucket.resolve()?).await?;
                crate::ui::show_success(&format!("Deleted bucket {}", bucket.bucket_name));
                Ok(())
            }
            Commands::UpdateBucket { bucket, bucket_type } => {
                let bucket_type = BucketType::parse(&bucket_type)?;
                let bucket = client.update_bucket(&bucket.resolve()?, bucket_type).await?;
                crate::ui::show_success(&format!("Bucket {} is now {}", bucket.bucket_name, bucket.bucket_type));
                Ok(())
            }
            Commands::Files { bucket, versions, start } => {
                let bucket = bucket.resolve()?;
                let list = if versions { client.list_file_versions(&bucket).await? } else { client.list_file_names(&bucket, start.as_deref()).await? };
                crate::ui::show_files(&list.files);
                Ok(())
            }
            Commands::Info { bucket, file_id, name } => {
                let info = match (file_id, name) {
                    (Some(file_id), _) => client.get_file_info(&file_id).await?,
                    (None, Some(name)) => {
                        client.get_file_info_by_name(&bucket.resolve()?, &name).await?.with_context(|| format!("no file named {name}"))?
                    }
                    (None, None) => bail!("either --file-id or --name is required"),
                };
                crate::ui::show_files(&[info]);
                Ok(())
            }
            Commands::Hide { bucket, file_name } => {
                client.hide_file(&bucket.resolve()?, &file_name).await?;
                crate::ui::show_success(&format!("Hid {file_name}"));
                Ok(())
            }
            Commands::DeleteVersion { file_name, file_id } => {
                client.delete_file_version(&file_name, &file_id).await?;
                crate::ui::show_success(&format!("Deleted version {file_id} of {file_name}"));
                Ok(())
            }
            Commands::Download { bucket, file_id, name, destination, force } => {
                let written = match (file_id, name) {
                    (Some(file_id), _) => client.download_file_by_id(&file_id, &destination, force).await?,
                    (None, Some(name)) => client.download_file_by_name(&bucket.resolve()?, &name, &destination, force).await?,
                    (None, None) => bail!("either --file-id or --name is required"),
                };
                crate::ui::show_success(&format!("Downloaded {} to {}", crate::ui::display::format_bytes(written), destination.display()));
                Ok(())
            }
        }
    }

    fn client(&self) -> Result<B2Client> {
        let Some(account_id) = self.account_id.clone() else {
            bail!("an account id is required (--account-id or B2_ACCOUNT_ID)");
        };
        let Some(key) = self.application_key.clone() else {
            bail!("an application key is required (--application-key or B2_APPLICATION_KEY)");
        };

        Ok(B2Client::new(account_id, Password::from_string(key))?)
    }

    async fn upload(client: B2Client, args: UploadArgs) -> Result<()> {
        let bucket = args.bucket.resolve()?;

        let rules = FilterRules {
            include: args.include,
            exclude: args.exclude,
            include_globs: args.include_glob,
            exclude_globs: args.exclude_glob,
            ignore_case: args.ignore_case,
        };
        let selector = PathSelector::new(&args.path, PathFilter::new(&rules)?)?;

        let mode = match args.password {
            Some(password) => UploadMode::Encrypted(Arc::new(Password::from_string(password))),
            None if args.encrypt => UploadMode::Encrypted(Arc::new(Prompt::new(PASSWORD_MIN_LENGTH).encryption_password()?)),
            None => UploadMode::Plain,
        };

        let config = PipelineConfig {
            workers: args.workers,
            queue_capacity: args.queue,
            retry: RetryPolicy { max_attempts: args.attempts, ..RetryPolicy::default() },
            chunk_size: CHUNK_SIZE,
            mode,
        };

        let progress = Arc::new(Bar::new(config.mode.label()));
        let report = Pipeline::new(Arc::new(client), bucket, config)
            .with_progress(progress)
            .run(selector)
            .await
            .with_context(|| format!("upload of {} failed", args.path.display()))?;

        crate::ui::show_report(&report);
        if !report.is_success() {
            bail!("{} of {} file(s) failed to upload", report.failed.len(), report.submitted);
        }

        Ok(())
    }
}
