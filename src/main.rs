use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docgate::api::{Description, Document, Product, SubmitOptions};
use docgate::{ClientConfig, DocumentClient};

/// Submit documents to the registration service under a shared rate limit.
#[derive(Debug, Parser)]
#[command(name = "docgate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "DOCGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Username for the authentication endpoint
    #[arg(long, env = "DOCGATE_USERNAME", requires = "password")]
    username: Option<String>,

    /// Password for the authentication endpoint
    #[arg(long, env = "DOCGATE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Use this bearer token instead of authenticating
    #[arg(long, env = "DOCGATE_TOKEN", hide_env_values = true, conflicts_with = "username")]
    token: Option<String>,

    /// JSON document to submit; a sample document is used when omitted
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Detached signature sent with each document
    #[arg(short, long, default_value = "signature")]
    signature: String,

    /// How many copies of the document to submit concurrently
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting docgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load(args.config.as_deref()).context("loading configuration")?;
    info!(
        url = %config.api.create_document_url,
        requests_per_unit = config.rate_limit.requests_per_unit,
        unit = %config.rate_limit.unit,
        window = ?config.rate_limit.window(),
        "Configuration loaded"
    );

    let document = match &args.document {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => sample_document(),
    };

    let client = DocumentClient::from_config(config)?;

    match (&args.token, &args.username, &args.password) {
        (Some(token), _, _) => client.set_auth_token(token.as_str()),
        (None, Some(username), Some(password)) => {
            client.authenticate(username, password).await?;
        }
        _ => warn!("No credentials given; submissions will be refused"),
    }

    // Ctrl+C cancels submissions still waiting for a slot.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let options = SubmitOptions {
        max_wait: client.config().rate_limit.max_wait(),
    };
    let submissions = (0..args.count).map(|i| {
        let client = &client;
        let document = &document;
        let signature = args.signature.as_str();
        let options = &options;
        let mut shutdown = shutdown_rx.clone();
        async move {
            let cancelled = async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            };
            let outcome = client
                .submit_with(document, signature, options, cancelled)
                .await;
            (i, outcome)
        }
    });

    let mut failures = 0;
    for (i, outcome) in join_all(submissions).await {
        match outcome {
            Ok(receipt) => info!(
                index = i,
                id = %receipt.submission_id,
                status = receipt.status,
                "Document submitted"
            ),
            Err(e) => {
                failures += 1;
                error!(index = i, error = %e, retryable = e.is_retryable(), "Document not submitted");
            }
        }
    }

    client.shutdown().await;
    info!(
        submitted = args.count - failures,
        failed = failures,
        "docgate stopped"
    );

    if failures > 0 {
        anyhow::bail!("{} of {} submissions failed", failures, args.count);
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn sample_document() -> Document {
    let today = chrono::Local::now().date_naive();
    Document {
        description: Some(Description {
            participant_inn: "1234567890".to_string(),
        }),
        doc_id: uuid::Uuid::new_v4().to_string(),
        doc_status: "NEW".to_string(),
        doc_type: "LP_INTRODUCE_GOODS".to_string(),
        import_request: true,
        owner_inn: "0987654321".to_string(),
        participant_inn: "1234567890".to_string(),
        producer_inn: "5678901234".to_string(),
        production_date: Some(today),
        production_type: "OWN_PRODUCTION".to_string(),
        products: vec![Product {
            certificate_document: Some("cert_doc".to_string()),
            certificate_document_date: Some(today),
            certificate_document_number: Some("cert_num".to_string()),
            owner_inn: "0987654321".to_string(),
            producer_inn: "5678901234".to_string(),
            production_date: Some(today),
            tnved_code: "6401100000".to_string(),
            uit_code: Some("uit_code".to_string()),
            uitu_code: None,
        }],
        reg_date: Some(today),
        reg_number: None,
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling waiting submissions");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling waiting submissions");
        }
    }
}
