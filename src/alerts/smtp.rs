use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsStream;
use tracing::debug;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("could not connect: {0}")]
    Connect(#[source] std::io::Error),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls failure: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("timed out waiting for server")]
    Timeout,
    #[error("expected reply {expected}, got: {reply}")]
    UnexpectedReply { expected: u16, reply: String },
    #[error("connection closed by server")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Envelope sender and From header
    pub from_address: String,
}

#[derive(Debug)]
enum SmtpStream {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

impl SmtpStream {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            SmtpStream::Plain(stream) => {
                stream.get_mut().write_all(buf).await?;
                stream.get_mut().flush().await
            }
            SmtpStream::Tls(stream) => {
                stream.get_mut().write_all(buf).await?;
                stream.get_mut().flush().await
            }
        }
    }

    async fn read_line(&mut self, line: &mut String) -> std::io::Result<usize> {
        match self {
            SmtpStream::Plain(stream) => stream.read_line(line).await,
            SmtpStream::Tls(stream) => stream.read_line(line).await,
        }
    }
}

/// SMTP client speaking the wire protocol directly over a socket.
///
/// `connect` walks the session up to an authenticated state: greeting,
/// EHLO, opportunistic STARTTLS upgrade, AUTH LOGIN. Port 465 uses
/// implicit TLS instead of the upgrade.
pub struct SmtpClient {
    settings: SmtpSettings,
}

impl SmtpClient {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    pub async fn connect(&self) -> Result<SmtpSession, SmtpError> {
        let host = self.settings.host.as_str();
        let tcp = timeout(COMMAND_TIMEOUT, TcpStream::connect((host, self.settings.port)))
            .await
            .map_err(|_| SmtpError::Timeout)?
            .map_err(SmtpError::Connect)?;

        let implicit_tls = self.settings.port == IMPLICIT_TLS_PORT;
        let mut stream = if implicit_tls {
            SmtpStream::Tls(Box::new(BufReader::new(tls_connect(host, tcp).await?)))
        } else {
            SmtpStream::Plain(BufReader::new(tcp))
        };

        expect(&mut stream, 220).await?;
        let ehlo = format!("EHLO {}", client_hostname());
        let capabilities = command(&mut stream, &ehlo, 250).await?;

        if !implicit_tls && advertises_starttls(&capabilities) {
            write_line(&mut stream, "STARTTLS").await?;
            let reply = read_reply(&mut stream).await?;
            match reply_code(&reply) {
                Some(220) => {
                    debug!(%host, "upgrading smtp connection to tls");
                    stream = match stream {
                        SmtpStream::Plain(buffered) => {
                            let tcp = buffered.into_inner();
                            SmtpStream::Tls(Box::new(BufReader::new(
                                tls_connect(host, tcp).await?,
                            )))
                        }
                        tls @ SmtpStream::Tls(_) => tls,
                    };
                    command(&mut stream, &ehlo, 250).await?;
                }
                // server declined but keeps the session usable
                Some(250) => {}
                _ => {
                    return Err(SmtpError::UnexpectedReply {
                        expected: 220,
                        reply: reply.trim_end().to_string(),
                    });
                }
            }
        }

        command(&mut stream, "AUTH LOGIN", 334).await?;
        command(&mut stream, &BASE64.encode(&self.settings.username), 334).await?;
        command(&mut stream, &BASE64.encode(&self.settings.password), 235).await?;

        Ok(SmtpSession { stream })
    }
}

/// An authenticated SMTP session ready to transfer messages
#[derive(Debug)]
pub struct SmtpSession {
    stream: SmtpStream,
}

impl SmtpSession {
    pub async fn send_mail(
        &mut self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), SmtpError> {
        command(&mut self.stream, &format!("MAIL FROM:<{from}>"), 250).await?;
        command(&mut self.stream, &format!("RCPT TO:<{to}>"), 250).await?;
        command(&mut self.stream, "DATA", 354).await?;

        let mut message = String::new();
        message.push_str(&format!("From: {from}\r\n"));
        message.push_str(&format!("To: {to}\r\n"));
        message.push_str(&format!("Subject: {subject}\r\n"));
        message.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
        message.push_str("\r\n");
        message.push_str(body);
        // lone dot terminates the DATA block
        message.push_str("\r\n.");

        command(&mut self.stream, &message, 250).await?;
        Ok(())
    }

    pub async fn quit(mut self) -> Result<(), SmtpError> {
        command(&mut self.stream, "QUIT", 221).await?;
        Ok(())
    }
}

async fn tls_connect(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>, SmtpError> {
    let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
    timeout(COMMAND_TIMEOUT, connector.connect(host, tcp))
        .await
        .map_err(|_| SmtpError::Timeout)?
        .map_err(SmtpError::Tls)
}

async fn write_line(stream: &mut SmtpStream, line: &str) -> Result<(), SmtpError> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    Ok(())
}

/// Read one full reply, possibly spanning several lines. A line whose
/// fourth character is a space closes the reply.
async fn read_reply(stream: &mut SmtpStream) -> Result<String, SmtpError> {
    let mut reply = String::new();
    loop {
        let mut line = String::new();
        let read = timeout(COMMAND_TIMEOUT, stream.read_line(&mut line))
            .await
            .map_err(|_| SmtpError::Timeout)??;
        if read == 0 {
            return Err(SmtpError::Closed);
        }
        reply.push_str(&line);
        if line.as_bytes().get(3) == Some(&b' ') {
            break;
        }
    }
    Ok(reply)
}

async fn expect(stream: &mut SmtpStream, expected: u16) -> Result<String, SmtpError> {
    let reply = read_reply(stream).await?;
    if reply_code(&reply) == Some(expected) {
        Ok(reply)
    } else {
        Err(SmtpError::UnexpectedReply {
            expected,
            reply: reply.trim_end().to_string(),
        })
    }
}

async fn command(stream: &mut SmtpStream, line: &str, expected: u16) -> Result<String, SmtpError> {
    write_line(stream, line).await?;
    expect(stream, expected).await
}

fn reply_code(reply: &str) -> Option<u16> {
    reply.get(..3)?.parse().ok()
}

fn advertises_starttls(ehlo_reply: &str) -> bool {
    ehlo_reply
        .lines()
        .any(|line| line.get(4..).is_some_and(|cap| cap.trim().eq_ignore_ascii_case("STARTTLS")))
}

pub(crate) fn client_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
