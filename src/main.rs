use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use imap_server::{
    backend::memory::MemoryBackend,
    server::{config::ImapConfig, Engine},
};

/// An IMAP4rev1 server over the in-memory backend.
#[derive(Debug, Parser)]
#[command(name = "imapd", version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short = 'f', long)]
    config: Option<String>,

    /// Listener address, overriding the configuration.
    #[arg(long)]
    address: Option<String>,

    /// Listener port, overriding the configuration.
    #[arg(long)]
    port: Option<u16>,

    /// Create a user on startup, as LOGIN:PASSWORD. May be repeated.
    #[arg(long = "user")]
    users: Vec<String>,
}

fn load_config(args: &Args) -> anyhow::Result<ImapConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("cannot parse {path}"))?
        }
        None => ImapConfig::default(),
    };

    if let Some(address) = &args.address {
        config.imap_address = address.clone();
    }
    if let Some(port) = args.port {
        config.imap_port = port;
    }

    Ok(config)
}

fn load_tls(config: &ImapConfig) -> anyhow::Result<Option<TlsAcceptor>> {
    if !config.use_tls && config.imaps_port.is_none() {
        return Ok(None);
    }

    let (Some(cert_path), Some(key_path)) = (&config.tls_certificate, &config.tls_private_key)
    else {
        bail!("use-tls requires tls-certificate and tls-private-key");
    };

    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(
        std::fs::File::open(cert_path).with_context(|| format!("cannot read {cert_path}"))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .context("invalid certificate file")?;

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(
        std::fs::File::open(key_path).with_context(|| format!("cannot read {key_path}"))?,
    ))
    .context("invalid key file")?
    .context("no private key found")?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate/key pair")?;

    Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let tls = load_tls(&config)?;

    let backend = Arc::new(MemoryBackend::new());
    for spec in &args.users {
        let Some((login, password)) = spec.split_once(':') else {
            bail!("--user takes LOGIN:PASSWORD, got {spec:?}");
        };
        backend.add_user(login, password);
        info!("created user {login}");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let engine = Engine::new(backend, config.clone(), tls);

    let listener = TcpListener::bind((config.imap_address.as_str(), config.imap_port))
        .await
        .with_context(|| format!("cannot bind {}:{}", config.imap_address, config.imap_port))?;

    if let Some(imaps_port) = config.imaps_port {
        let imaps = TcpListener::bind((config.imap_address.as_str(), imaps_port))
            .await
            .with_context(|| format!("cannot bind {}:{imaps_port}", config.imap_address))?;

        let engine = Arc::clone(&engine);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.serve(imaps, true, shutdown).await {
                log::error!("imaps listener failed: {err}");
            }
        });
    }

    engine.serve(listener, false, shutdown_rx).await?;

    Ok(())
}
