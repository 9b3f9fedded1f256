use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use vpr_certificates::issue::{IssuingAuthority, SignerProfile};
use vpr_certificates::{extract_metadata, ocsp_responder_uri};
use vpr_core::config::{positive_u64_from_env_value, webhook_secret_from_env_value};
use vpr_core::constants::{
    DEFAULT_DATA_DIR, DEFAULT_OCSP_TIMEOUT, DEFAULT_PUBLIC_BASE_URL, DEFAULT_READ_URL_TTL,
};
use vpr_core::webhook::compute_signature;
use vpr_core::{
    Collaborators, FilesystemBackend, RevalidationPolicy, SigningConfig, SigningService,
    WebhookSecret,
};
use vpr_files::ObjectKey;
use vpr_ocsp::{HttpOcspClient, DEFAULT_MAX_RESPONSE_AGE};

const LOCAL_FILES_KEY: &[u8] = b"vpr-sign-local-links";

#[derive(Parser)]
#[command(name = "vpr-sign")]
#[command(about = "VPR document signing CLI")]
struct Cli {
    /// Directory holding signing records and objects
    #[arg(long, env = "VPR_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Base of callback and read URLs
    #[arg(long, env = "VPR_PUBLIC_BASE_URL", default_value = DEFAULT_PUBLIC_BASE_URL, global = true)]
    base_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an unsigned PDF and create its document record
    Register {
        /// Object key to store it under, e.g. letters/2024/rx-1.pdf
        artifact_key: String,
        /// Path of the PDF to register
        pdf: PathBuf,
    },
    /// Show the signature state of a document
    Status {
        /// Document identifier
        document_id: String,
    },
    /// Compute the SHA-256 digest a signer would be asked to sign
    Request {
        /// Document identifier
        document_id: String,
    },
    /// Print subject, issuer, serial and OCSP responder of a PEM certificate
    CertInfo {
        /// Path of the PEM certificate
        pem: PathBuf,
    },
    /// Compute the X-Signature header for a callback body
    WebhookSignature {
        /// Path of the raw JSON body
        body: PathBuf,
        /// Shared webhook secret
        #[arg(long, env = "VPR_WEBHOOK_SECRET")]
        secret: String,
    },
    /// Check one document's signer certificate over OCSP now
    Revalidate {
        /// Document identifier
        document_id: String,
    },
    /// Run one revalidation batch over stale signed documents
    RevalidateStale {
        /// Maximum number of documents to check
        #[arg(long)]
        batch_size: Option<u64>,
        /// Revalidate certificates checked longer ago than this many days
        #[arg(long)]
        stale_days: Option<u64>,
    },
    /// Issue a professional signing certificate for demos
    IssueCert {
        /// Signer's full name
        name: String,
        /// Registration authority, e.g. GMC
        registration_authority: String,
        /// Professional registration number
        registration_number: String,
        /// OCSP responder to advertise in the signer certificate
        #[arg(long)]
        ocsp_url: Option<String>,
        /// Issue from a generated test CA (also written as ca.pem) instead of self-signing
        #[arg(long)]
        with_ca: bool,
        /// Directory to write signer.pem and signer.key.pem into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn open_service(cli: &Cli) -> anyhow::Result<SigningService> {
    if !cli.data_dir.is_dir() {
        anyhow::bail!("Data directory does not exist: {}", cli.data_dir.display());
    }
    let ocsp_timeout = Duration::from_secs(positive_u64_from_env_value(
        "VPR_OCSP_TIMEOUT_SECS",
        std::env::var("VPR_OCSP_TIMEOUT_SECS").ok(),
        DEFAULT_OCSP_TIMEOUT.as_secs(),
    )?);
    let config = SigningConfig::new(
        cli.base_url.clone(),
        webhook_secret_from_env_value(std::env::var("VPR_WEBHOOK_SECRET").ok()),
        DEFAULT_READ_URL_TTL,
        ocsp_timeout,
    )?;
    let files_key = std::env::var("VPR_FILES_SIGNING_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .map(String::into_bytes)
        .unwrap_or_else(|| LOCAL_FILES_KEY.to_vec());

    let backend = FilesystemBackend::open(
        &cli.data_dir,
        config.public_base_url(),
        config.read_url_ttl(),
        files_key,
        ocsp_timeout,
    )?;
    let ocsp_max_age = Duration::from_secs(positive_u64_from_env_value(
        "VPR_OCSP_MAX_AGE_SECS",
        std::env::var("VPR_OCSP_MAX_AGE_SECS").ok(),
        DEFAULT_MAX_RESPONSE_AGE.as_secs(),
    )?);
    let ocsp = HttpOcspClient::new(ocsp_timeout)?.with_max_response_age(ocsp_max_age);
    Ok(SigningService::new(
        config,
        Collaborators {
            records: backend.records,
            idempotency: backend.idempotency,
            audit: backend.audit,
            artifacts: backend.objects.clone(),
            fetcher: backend.objects,
            ocsp: Arc::new(ocsp),
        },
    ))
}

fn write_pem(dir: &Path, name: &str, pem: &str) -> anyhow::Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, pem)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("vpr_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Register { artifact_key, pdf }) => {
            let service = open_service(&cli)?;
            let key = ObjectKey::parse(artifact_key)?;
            let bytes = std::fs::read(pdf)?;
            match service.register_document(key, bytes).await {
                Ok(document) => println!(
                    "Registered document {} ({})",
                    document.id, document.artifact_key
                ),
                Err(e) => eprintln!("Error registering document: {}", e),
            }
        }
        Some(Commands::Status { document_id }) => {
            let service = open_service(&cli)?;
            match service.status(document_id).await {
                Ok(summary) => {
                    println!("Document:    {}", summary.document_id);
                    println!("Artifact:    {}", summary.artifact_key);
                    println!("Signature:   {:?}", summary.signature_status);
                    if let Some(format) = summary.signature_format {
                        println!("Format:      {}", format.as_str());
                    }
                    if let Some(key) = &summary.signed_artifact_key {
                        println!("Signed file: {}", key);
                    }
                    if let Some(subject) = &summary.signer_cert_subject {
                        println!("Signer:      {}", subject);
                    }
                    println!("Certificate: {:?}", summary.certificate_status);
                    if let Some(at) = summary.certificate_validated_at {
                        println!("Validated:   {}", at.to_rfc3339());
                    }
                }
                Err(e) => eprintln!("Error reading document: {}", e),
            }
        }
        Some(Commands::Request { document_id }) => {
            let service = open_service(&cli)?;
            match service
                .request_signature(document_id, &Default::default())
                .await
            {
                Ok(request) => {
                    println!("{}: {}", request.hash_algorithm.as_str(), request.hash_hex);
                    println!("Callback: {}", request.callback_url);
                }
                Err(e) => eprintln!("Error requesting signature: {}", e),
            }
        }
        Some(Commands::CertInfo { pem }) => {
            let text = std::fs::read_to_string(pem)?;
            let metadata = extract_metadata(&text)?;
            println!("Subject: {}", metadata.subject);
            println!("Issuer:  {}", metadata.issuer);
            println!("Serial:  {}", metadata.serial_number);
            match ocsp_responder_uri(&text) {
                Some(uri) => println!("OCSP:    {}", uri),
                None => println!("OCSP:    (none)"),
            }
        }
        Some(Commands::WebhookSignature { body, secret }) => {
            let raw = std::fs::read(body)?;
            let secret = WebhookSecret::new(secret.as_str())?;
            println!("{}", compute_signature(&secret, &raw)?);
        }
        Some(Commands::Revalidate { document_id }) => {
            let service = open_service(&cli)?;
            match service.revalidate(document_id).await {
                Ok(outcome) => println!(
                    "Certificate status: {:?} (checked {})",
                    outcome.certificate_status,
                    outcome.certificate_validated_at.to_rfc3339()
                ),
                Err(e) => eprintln!("Error revalidating document: {}", e),
            }
        }
        Some(Commands::RevalidateStale {
            batch_size,
            stale_days,
        }) => {
            let service = open_service(&cli)?;
            let defaults = RevalidationPolicy::default();
            let policy = RevalidationPolicy::new(
                defaults.interval(),
                batch_size.map_or(Ok(defaults.batch_size()), usize::try_from)?,
                stale_days.map_or(Ok(defaults.staleness().num_days()), i64::try_from)?,
            )?;
            let report = service.scheduler(policy).run_batch(chrono::Utc::now()).await?;
            println!(
                "Checked {}: {} valid, {} revoked, {} unknown, {} failed",
                report.selected, report.valid, report.revoked, report.unknown, report.failed
            );
        }
        Some(Commands::IssueCert {
            name,
            registration_authority,
            registration_number,
            ocsp_url,
            with_ca,
            out_dir,
        }) => {
            let profile = SignerProfile {
                name,
                registration_authority,
                registration_number,
                ocsp_url: ocsp_url.as_deref(),
            };
            std::fs::create_dir_all(out_dir)?;
            let signer = if *with_ca {
                let ca = IssuingAuthority::new("VPR Test Signing CA", None)?;
                write_pem(out_dir, "ca.pem", &ca.certificate_pem())?;
                ca.issue(&profile)?
            } else {
                profile.self_signed()?
            };
            write_pem(out_dir, "signer.pem", &signer.certificate_pem)?;
            write_pem(out_dir, "signer.key.pem", &signer.private_key_pem)?;
        }
        None => {
            println!("No command given. Use --help for usage.");
        }
    }

    Ok(())
}
