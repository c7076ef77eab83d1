use anyhow::Context;
use clap::Parser;
use everdeen::ca::{CertificateAuthority, DEFAULT_CA_NAME, DEFAULT_CA_ORGANIZATION};
use everdeen::config::{self, Config};
use everdeen::Everdeen;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "everdeen", version, about = "Programmable HTTP/HTTPS intercepting proxy")]
struct Args {
    /// Address the proxy listens on
    #[arg(long, env = "EVERDEEN_PROXY_ADDR", default_value = config::DEFAULT_PROXY_ADDR)]
    proxy_addr: SocketAddr,

    /// Address the control API listens on
    #[arg(long, env = "EVERDEEN_CONTROL_ADDR", default_value = config::DEFAULT_CONTROL_ADDR)]
    control_addr: SocketAddr,

    /// CA certificate (PEM) used to sign intercepted hosts
    #[arg(long, env = "EVERDEEN_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// CA private key (PEM, PKCS#8 or PKCS#1)
    #[arg(long, env = "EVERDEEN_CA_KEY")]
    ca_key: Option<PathBuf>,

    /// Directory recorded requests are written to [default: <tmp>/everdeen]
    #[arg(long, env = "EVERDEEN_REQUEST_STORE_DIR")]
    request_store_dir: Option<PathBuf>,

    /// Generate cert.pem and key.pem in --ca-output-dir, then exit
    #[arg(long)]
    generate_ca_cert: bool,

    #[arg(long, default_value = ".")]
    ca_output_dir: PathBuf,

    /// Validity in days of generated CA and leaf certificates
    #[arg(long, env = "EVERDEEN_CA_VALIDITY_DAYS", default_value_t = config::DEFAULT_CA_VALIDITY_DAYS)]
    ca_validity_days: u32,

    /// Skip certificate verification for HTTPS pass-through
    #[arg(long, env = "EVERDEEN_UPSTREAM_INSECURE")]
    upstream_insecure: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<Config, anyhow::Error> {
        Ok(Config {
            proxy_addr: self.proxy_addr,
            control_addr: self.control_addr,
            ca: Config::ca_source(self.ca_cert, self.ca_key)?,
            ca_validity_days: self.ca_validity_days,
            request_store_dir: self
                .request_store_dir
                .unwrap_or_else(config::default_request_store_dir),
            upstream_insecure: self.upstream_insecure,
        })
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    if args.generate_ca_cert {
        return generate_ca(&args).await;
    }

    let config = args.into_config()?;
    config.validate()?;

    let app = Everdeen::bind(&config).await?;
    info!(
        proxy = %app.proxy_addr(),
        control = %app.control_addr(),
        "Everdeen started"
    );

    tokio::select! {
        result = app.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

async fn generate_ca(args: &Args) -> Result<(), anyhow::Error> {
    if args.ca_validity_days == 0 {
        anyhow::bail!("CA validity must be at least one day");
    }
    let cert_path = args.ca_output_dir.join("cert.pem");
    let key_path = args.ca_output_dir.join("key.pem");
    let validity = time::Duration::days(i64::from(args.ca_validity_days));

    CertificateAuthority::generate_and_save(
        DEFAULT_CA_NAME,
        DEFAULT_CA_ORGANIZATION,
        validity,
        &cert_path,
        &key_path,
    )
    .await
    .context("Failed to generate CA certificate")?;

    info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "Wrote CA certificate and key"
    );
    Ok(())
}
