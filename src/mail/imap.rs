//! IMAP transport — raw IMAP over rustls, blocking, run in
//! `spawn_blocking` so poll cycles never block the runtime.

use std::collections::HashMap;
use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::error::TransportError;
use crate::mail::{MailTransport, RawMail};
use crate::relay::message::{MessageBody, SourceRef};

/// Connection settings for one IMAP mailbox.
#[derive(Debug, Clone)]
pub struct ImapCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// IMAP-backed inbox transport. Holds credentials for every configured
/// account, keyed by the opaque source handle.
pub struct ImapTransport {
    accounts: HashMap<String, ImapCredentials>,
}

impl ImapTransport {
    pub fn new(accounts: HashMap<String, ImapCredentials>) -> Self {
        Self { accounts }
    }

    fn credentials(&self, source: &SourceRef) -> Result<ImapCredentials, TransportError> {
        self.accounts
            .get(&source.0)
            .cloned()
            .ok_or_else(|| TransportError::Protocol {
                account: source.0.clone(),
                reason: "no credentials registered for source".into(),
            })
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn list_candidates(
        &self,
        source: &SourceRef,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, TransportError> {
        let creds = self.credentials(source)?;
        let account = source.0.clone();
        let search = search_command(query, since);

        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&creds, &account)?;
            let uids = session.search(&search)?;
            session.logout();
            Ok(uids)
        })
        .await
        .map_err(|e| TransportError::Protocol {
            account: source.0.clone(),
            reason: format!("list task panicked: {e}"),
        })?
    }

    async fn fetch_content(
        &self,
        source: &SourceRef,
        transport_id: &str,
    ) -> Result<RawMail, TransportError> {
        let creds = self.credentials(source)?;
        let account = source.0.clone();
        let id = transport_id.to_string();

        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&creds, &account)?;
            let raw = session.fetch(&id)?;
            session.logout();
            parse_mail(&id, raw.as_bytes())
        })
        .await
        .map_err(|e| TransportError::Protocol {
            account: source.0.clone(),
            reason: format!("fetch task panicked: {e}"),
        })?
    }
}

/// Compose the SEARCH command from the account query and the poll cursor.
fn search_command(query: &str, since: Option<DateTime<Utc>>) -> String {
    let query = if query.trim().is_empty() {
        "UNSEEN"
    } else {
        query.trim()
    };
    match since {
        // IMAP SINCE has day granularity; the dedup store absorbs the
        // re-listed overlap.
        Some(ts) => format!("{query} SINCE {}", ts.format("%d-%b-%Y")),
        None => query.to_string(),
    }
}

/// Parse an RFC822 blob into transport-neutral content.
fn parse_mail(id: &str, raw: &[u8]) -> Result<RawMail, TransportError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| TransportError::Extract {
            id: id.to_string(),
            reason: "unparseable RFC822 payload".into(),
        })?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let recipient = parsed
        .to()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let subject = parsed.subject().unwrap_or_default().to_string();

    // Prefer plain text; fall back to HTML for the formatter to strip.
    let body = if let Some(text) = parsed.body_text(0) {
        MessageBody::Plain(text.to_string())
    } else if let Some(html) = parsed.body_html(0) {
        MessageBody::Html(html.to_string())
    } else {
        MessageBody::Unknown
    };

    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Ok(RawMail {
        sender,
        recipient,
        subject,
        body,
        received_at,
    })
}

// ── Blocking IMAP session ───────────────────────────────────────────

struct ImapSession {
    tls: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    account: String,
    host: String,
    tag: u32,
}

impl ImapSession {
    /// Connect, authenticate and select INBOX.
    fn open(creds: &ImapCredentials, account: &str) -> Result<Self, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            host: creds.host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((&*creds.host, creds.port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))
            .map_err(|e| connect_err(e.to_string()))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(creds.host.clone())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self {
            tls,
            account: account.to_string(),
            host: creds.host.clone(),
            tag: 0,
        };

        let _greeting = session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            creds.username, creds.password
        ))?;
        if !login.last().is_some_and(|l| l.contains("OK")) {
            return Err(TransportError::Protocol {
                account: session.account,
                reason: "IMAP login failed".into(),
            });
        }

        session.command("SELECT \"INBOX\"")?;
        Ok(session)
    }

    /// Run SEARCH and collect the returned sequence numbers.
    fn search(&mut self, query: &str) -> Result<Vec<String>, TransportError> {
        let lines = self.command(&format!("SEARCH {query}"))?;
        let mut ids = Vec::new();
        for line in &lines {
            if line.starts_with("* SEARCH") {
                ids.extend(
                    line.split_whitespace()
                        .skip(2)
                        .map(|s| s.trim().to_string()),
                );
            }
        }
        Ok(ids)
    }

    /// Fetch the raw RFC822 payload of one message.
    fn fetch(&mut self, id: &str) -> Result<String, TransportError> {
        let lines = self.command(&format!("FETCH {id} RFC822"))?;
        // Drop the untagged FETCH header and the tagged completion line.
        let raw: String = lines
            .iter()
            .skip(1)
            .take(lines.len().saturating_sub(2))
            .cloned()
            .collect();
        if raw.is_empty() {
            return Err(TransportError::Extract {
                id: id.to_string(),
                reason: "FETCH returned no content".into(),
            });
        }
        Ok(raw)
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }

    fn command(&mut self, cmd: &str) -> Result<Vec<String>, TransportError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");

        IoWrite::write_all(&mut self.tls, full.as_bytes()).map_err(|e| {
            TransportError::Connect {
                host: self.host.clone(),
                reason: e.to_string(),
            }
        })?;
        IoWrite::flush(&mut self.tls).map_err(|e| TransportError::Connect {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.tls, &mut byte) {
                Ok(0) => {
                    return Err(TransportError::Protocol {
                        account: self.account.clone(),
                        reason: "IMAP connection closed".into(),
                    });
                }
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => {
                    return Err(TransportError::Protocol {
                        account: self.account.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
