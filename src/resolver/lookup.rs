//! CNAME queries against the configured nameserver.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::{Name, ParsedName};
use domain::rdata::Cname;
use domain::resolv::stub::conf::{ResolvConf, ServerConf, Transport};
use domain::resolv::StubResolver;
use thiserror::Error;

/// Fixed per-query deadline.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no nameserver configured")]
    NoNameserver,

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid domain name '{0}'")]
    InvalidName(String),

    #[error("query failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed answer: {0}")]
    Malformed(String),
}

/// A single CNAME query: the canonical name `host` points at, if any.
pub trait CnameLookup: Send + Sync {
    fn cname(&self, host: &str)
        -> impl Future<Output = Result<Option<String>, LookupError>> + Send;
}

/// Queries the first nameserver listed in a resolv.conf-style file.
pub struct StubLookup {
    resolver: Option<StubResolver>,
}

impl StubLookup {
    /// Read nameservers from `path`. An unreadable file leaves the lookup
    /// without a server; every query then fails with [`LookupError::NoNameserver`].
    pub fn from_resolv_conf(path: &Path) -> Self {
        let mut conf = ResolvConf::new();
        if let Err(e) = conf.parse_file(path) {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read resolver configuration");
        }
        Self::with_nameserver(conf.servers.first().map(|server| server.addr))
    }

    pub fn with_nameserver(addr: Option<SocketAddr>) -> Self {
        let resolver = addr.map(|addr| {
            let mut conf = ResolvConf::new();
            conf.servers.push(ServerConf::new(addr, Transport::UdpTcp));
            StubResolver::from_conf(conf)
        });
        Self { resolver }
    }
}

impl CnameLookup for StubLookup {
    async fn cname(&self, host: &str) -> Result<Option<String>, LookupError> {
        let resolver = self.resolver.as_ref().ok_or(LookupError::NoNameserver)?;
        let name = Name::<Vec<u8>>::from_str(host)
            .map_err(|_| LookupError::InvalidName(host.to_string()))?;

        let answer = tokio::time::timeout(QUERY_TIMEOUT, resolver.query((name, Rtype::CNAME)))
            .await
            .map_err(|_| LookupError::Timeout(QUERY_TIMEOUT))??;

        let mut records = answer
            .answer()
            .map_err(|e| LookupError::Malformed(e.to_string()))?
            .limit_to::<Cname<ParsedName<Bytes>>>();

        match records.next() {
            Some(record) => {
                let record = record.map_err(|e| LookupError::Malformed(e.to_string()))?;
                let target = record.data().cname().to_string();
                Ok(Some(target.trim_end_matches('.').to_string()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.trim_end_matches('.').split('.') {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    /// Question name and the offset just past the question section.
    fn read_question(packet: &[u8]) -> (String, usize) {
        let mut labels = Vec::new();
        let mut i = 12;
        while packet[i] != 0 {
            let len = packet[i] as usize;
            labels.push(String::from_utf8_lossy(&packet[i + 1..i + 1 + len]).into_owned());
            i += len + 1;
        }
        (labels.join("."), i + 1 + 4)
    }

    /// Minimal UDP nameserver answering CNAME queries from `records`.
    async fn start_nameserver(records: &'static [(&'static str, &'static str)]) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let query = &buf[..len];
                let (qname, question_end) = read_question(query);
                let target = records
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&qname))
                    .map(|(_, target)| *target);

                let mut reply = Vec::new();
                reply.extend_from_slice(&query[0..2]);
                reply.extend_from_slice(&[0x80 | (query[2] & 0x01), 0x80]);
                reply.extend_from_slice(&[0, 1, 0, u8::from(target.is_some()), 0, 0, 0, 0]);
                reply.extend_from_slice(&query[12..question_end]);
                if let Some(target) = target {
                    let rdata = encode_name(target);
                    // Owner is a pointer to the question name; CNAME, IN, TTL 60.
                    reply.extend_from_slice(&[0xC0, 0x0C, 0, 5, 0, 1, 0, 0, 0, 60]);
                    reply.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
                    reply.extend_from_slice(&rdata);
                }
                let _ = socket.send_to(&reply, peer).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_cname_answer_from_nameserver() {
        let addr = start_nameserver(&[("www.example.com", "target.example.net")]).await;
        let lookup = StubLookup::with_nameserver(Some(addr));

        let target = lookup.cname("www.example.com").await.unwrap();
        assert_eq!(target.as_deref(), Some("target.example.net"));
    }

    #[tokio::test]
    async fn test_no_cname_answer_from_nameserver() {
        let addr = start_nameserver(&[("www.example.com", "target.example.net")]).await;
        let lookup = StubLookup::with_nameserver(Some(addr));

        let target = lookup.cname("plain.example.com").await.unwrap();
        assert_eq!(target, None);
    }

    #[tokio::test]
    async fn test_missing_resolv_conf_has_no_nameserver() {
        let lookup = StubLookup::from_resolv_conf(Path::new("/nonexistent/resolv.conf"));
        let err = lookup.cname("example.com").await.unwrap_err();
        assert!(matches!(err, LookupError::NoNameserver));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_query() {
        let lookup = StubLookup::with_nameserver(Some("127.0.0.1:53".parse().unwrap()));
        let err = lookup.cname("bad..name").await.unwrap_err();
        assert!(matches!(err, LookupError::InvalidName(_)));
    }
}
