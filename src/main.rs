//! S3 Adaptor - command-line object-storage client

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3_adaptor::binder::{OptionValue, Options};
use s3_adaptor::config::Config;
use s3_adaptor::stream::ReaderSource;
use s3_adaptor::{metrics, ObjectClient, TransferBody};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// S3 Adaptor - bucket, object, multipart and presign operations
#[derive(Parser, Debug)]
#[command(name = "s3-adaptor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Print collected metrics to stderr on exit
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List buckets with their regions
    Buckets,
    /// Create a bucket
    Mb {
        bucket: String,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Delete an empty bucket
    Rb { bucket: String },
    /// Print a bucket's region
    Location { bucket: String },
    /// List one page of objects
    Ls {
        bucket: String,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Upload a file, or stdin when the source is `-`
    Put {
        bucket: String,
        key: String,
        source: String,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Download an object to a file, or stdout when no file is given
    Get {
        bucket: String,
        key: String,
        output: Option<PathBuf>,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Delete an object
    Rm {
        bucket: String,
        key: String,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Print object metadata
    Head {
        bucket: String,
        key: String,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Copy an object
    Cp {
        source_bucket: String,
        source_key: String,
        bucket: String,
        key: String,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
    /// Print whether an object exists
    Exists { bucket: String, key: String },
    /// Print a presigned URL
    Presign {
        bucket: String,
        key: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Lifetime in minutes
        #[arg(short, long)]
        expires: Option<i32>,
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, OptionValue)>,
    },
}

fn parse_option(pair: &str) -> Result<(String, OptionValue), String> {
    Options::parse_pair(pair).ok_or_else(|| format!("expected name=value, got '{}'", pair))
}

fn to_options(pairs: Vec<(String, OptionValue)>) -> Options {
    pairs.into_iter().collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting S3 Adaptor v{}", s3_adaptor::VERSION);

    let config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    let client = ObjectClient::from_config(&config).await?;
    let result = run(&client, &config, args.command).await;

    if args.print_metrics {
        eprint!("{}", metrics::gather_text()?);
    }
    result
}

async fn run(client: &ObjectClient, config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Buckets => print_json(&client.list_buckets().await?)?,
        Command::Mb { bucket, options } => {
            client.create_bucket(&bucket, &to_options(options)).await?;
        }
        Command::Rb { bucket } => client.delete_bucket(&bucket).await?,
        Command::Location { bucket } => println!("{}", client.get_bucket_location(&bucket).await?),
        Command::Ls { bucket, options } => {
            print_json(&client.list_objects(&bucket, &to_options(options)).await?)?
        }
        Command::Put {
            bucket,
            key,
            source,
            options,
        } => {
            let options = to_options(options);
            if source == "-" {
                let stdin = ReaderSource::new(tokio::io::stdin(), config.transfer.read_buffer_size);
                client
                    .put_object(&bucket, &key, TransferBody::stream(stdin), &options)
                    .await?;
            } else {
                client
                    .upload_file(&bucket, &key, Path::new(&source), &options)
                    .await?;
            }
        }
        Command::Get {
            bucket,
            key,
            output,
            options,
        } => {
            let mut reader = client.get_object(&bucket, &key, &to_options(options)).await?;
            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("creating {}", path.display()))?;
                    while let Some(chunk) = reader.next_chunk().await? {
                        file.write_all(&chunk).await?;
                    }
                    file.flush().await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    while let Some(chunk) = reader.next_chunk().await? {
                        stdout.write_all(&chunk).await?;
                    }
                    stdout.flush().await?;
                }
            }
        }
        Command::Rm {
            bucket,
            key,
            options,
        } => client.delete_object(&bucket, &key, &to_options(options)).await?,
        Command::Head {
            bucket,
            key,
            options,
        } => print_json(&client.head_object(&bucket, &key, &to_options(options)).await?)?,
        Command::Cp {
            source_bucket,
            source_key,
            bucket,
            key,
            options,
        } => {
            client
                .copy_object(&source_bucket, &source_key, &bucket, &key, &to_options(options))
                .await?
        }
        Command::Exists { bucket, key } => println!("{}", client.object_exists(&bucket, &key).await?),
        Command::Presign {
            bucket,
            key,
            method,
            expires,
            options,
        } => {
            let mut options = to_options(options);
            options.insert("httpMethod", method.as_str());
            if let Some(minutes) = expires {
                options.insert("expirationMinutes", minutes);
            }
            println!("{}", client.presign_with_options(&bucket, &key, &options).await?);
        }
    }
    Ok(())
}
