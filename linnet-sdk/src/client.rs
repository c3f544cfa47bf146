//! Async connection driver.
//!
//! Owns the TCP (optionally TLS) connection and the [`Session`] protocol
//! core. The protocol core is synchronous; this module feeds it raw bytes
//! off the socket and flushes its queued outbound lines back, interleaved
//! with consumer commands arriving over an mpsc channel.
//!
//! The SDK does not implement automatic reconnection. Consumers should
//! implement their own reconnect logic with backoff and call
//! [`connect`] again when the run task finishes.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::config::SessionConfig;
use crate::plugin::PluginRegistry;
use crate::session::Session;

/// Commands the consumer can send to a running session.
#[derive(Debug)]
pub enum Command {
    Join(String),
    Privmsg { target: String, text: String },
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn join(&self, channel: &str) -> Result<()> {
        self.cmd_tx.send(Command::Join(channel.to_string())).await?;
        Ok(())
    }

    pub async fn say(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.cmd_tx.send(Command::Raw(line.to_string())).await?;
        Ok(())
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx
            .send(Command::Quit(message.map(|s| s.to_string())))
            .await?;
        Ok(())
    }
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started registration yet.
pub enum Transport {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

/// Establish the TCP (and optionally TLS) connection.
pub async fn establish_connection(config: &SessionConfig) -> Result<Transport> {
    let addr = format!("{}:{}", config.host, config.port);
    let mode = if config.tls { "TLS" } else { "plain" };

    tracing::debug!("Connecting to {addr} ({mode})...");
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| anyhow!("TCP connect to {addr} failed: {e}"))?;
    tracing::debug!("TCP connected to {addr}");

    if config.tls {
        let tls_config = build_tls_config(config.cert.as_deref())?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let dns_name = rustls::pki_types::ServerName::try_from(config.host.clone())?;
        let tls_stream = connector
            .connect(dns_name, tcp)
            .await
            .map_err(|e| anyhow!("TLS handshake with {addr} failed: {e}"))?;
        tracing::debug!("TLS handshake complete");
        Ok(Transport::Tls(tls_stream))
    } else {
        Ok(Transport::Plain(tcp))
    }
}

fn install_crypto_provider() {
    // ring is preferred where aws-lc-rs can't build; aws-lc-rs is the
    // default on desktop.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

/// Webpki roots, plus a client certificate for CertFP identification when
/// one is configured. The cert file is a single PEM carrying both the
/// certificate chain and the private key.
fn build_tls_config(cert: Option<&Path>) -> Result<rustls::ClientConfig> {
    install_crypto_provider();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

    match cert {
        None => Ok(builder.with_no_client_auth()),
        Some(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("reading client cert {}", path.display()))?;
            let certs = rustls_pemfile::certs(&mut pem.as_slice())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("parsing certificates in {}", path.display()))?;
            let key = rustls_pemfile::private_key(&mut pem.as_slice())
                .with_context(|| format!("parsing private key in {}", path.display()))?
                .ok_or_else(|| anyhow!("no private key found in {}", path.display()))?;
            builder
                .with_client_auth_cert(certs, key)
                .context("building TLS client auth config")
        }
    }
}

/// Connect, register, and run the session until the server closes the
/// connection or the consumer quits.
///
/// Returns a command handle and the run task. Connection establishment
/// happens before spawning so connect errors surface here rather than
/// inside the task.
pub async fn connect(
    config: SessionConfig,
    registry: Arc<PluginRegistry>,
) -> Result<(SessionHandle, JoinHandle<Result<()>>)> {
    config.validate()?;
    let transport = establish_connection(&config).await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let handle = SessionHandle {
        cmd_tx: cmd_tx.clone(),
    };

    let task = tokio::spawn(async move {
        let result = match transport {
            Transport::Plain(tcp) => run_session(tcp, config, registry, cmd_rx).await,
            Transport::Tls(tls) => run_session(tls, config, registry, cmd_rx).await,
        };
        if let Err(ref e) = result {
            tracing::error!(error = %e, "session ended with error");
        }
        result
    });

    Ok((handle, task))
}

async fn run_session<S>(
    stream: S,
    config: SessionConfig,
    registry: Arc<PluginRegistry>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let mut session = Session::new(config, registry);
    session.load_startup_plugins();
    session.begin_registration();
    flush_outbound(&mut session, &mut writer).await?;

    // Raw reads, not read_line: servers still emit Latin-1 and the
    // session's decoder handles that per chunk.
    let mut buf = vec![0u8; 4096];
    let result = loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => {
                        tracing::info!("server closed the connection");
                        break Ok(());
                    }
                    Ok(n) => n,
                    Err(e) => break Err(e.into()),
                };
                session.feed(&buf[..n]);
                if let Err(e) = flush_outbound(&mut session, &mut writer).await {
                    break Err(e);
                }
                if !session.is_active() {
                    break Ok(());
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    // All handles dropped; wind the session down.
                    session.quit(None);
                    let _ = flush_outbound(&mut session, &mut writer).await;
                    break Ok(());
                };
                apply_command(&mut session, cmd);
                if let Err(e) = flush_outbound(&mut session, &mut writer).await {
                    break Err(e);
                }
                if !session.is_active() {
                    break Ok(());
                }
            }
        }
    };

    session.shutdown();
    let _ = writer.shutdown().await;
    result
}

fn apply_command(session: &mut Session, cmd: Command) {
    match cmd {
        Command::Join(channel) => session.join(&channel),
        Command::Privmsg { target, text } => session.say(&target, &text),
        Command::Raw(line) => session.send_raw(&line),
        Command::Quit(message) => session.quit(message.as_deref()),
    }
}

async fn flush_outbound<W>(session: &mut Session, writer: &mut W) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    for line in session.take_outbound() {
        tracing::trace!(line = %line, "send");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
    }
    writer.flush().await?;
    Ok(())
}
