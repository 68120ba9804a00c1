// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process transport with scripted failures

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{CommandOutput, ConnectError, ConnectivityTransport, Credentials, SessionHandle};

#[derive(Debug, Default)]
struct Record {
    failures: HashMap<IpAddr, u32>,
    attempts: HashMap<IpAddr, usize>,
    delays: HashMap<IpAddr, Duration>,
    dead_probes: Vec<IpAddr>,
}

/// Transport whose nodes refuse a configurable number of attempts
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    record: Mutex<Record>,
    closed: Arc<Mutex<Vec<IpAddr>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` attempts to `ip`
    pub async fn fail_first(&self, ip: IpAddr, count: u32) {
        self.record.lock().await.failures.insert(ip, count);
    }

    /// Every attempt to `ip` takes `delay` before answering
    pub async fn delay_opens(&self, ip: IpAddr, delay: Duration) {
        self.record.lock().await.delays.insert(ip, delay);
    }

    /// Sessions to `ip` open fine but fail every probe
    pub async fn fail_probes(&self, ip: IpAddr) {
        self.record.lock().await.dead_probes.push(ip);
    }

    pub async fn attempts(&self, ip: IpAddr) -> usize {
        self.record.lock().await.attempts.get(&ip).copied().unwrap_or(0)
    }

    /// Addresses of sessions closed so far, in closing order
    pub async fn closed(&self) -> Vec<IpAddr> {
        self.closed.lock().await.clone()
    }
}

#[async_trait]
impl ConnectivityTransport for ScriptedTransport {
    async fn open(
        &self,
        management_ip: IpAddr,
        _credentials: &Credentials,
    ) -> Result<Box<dyn SessionHandle>, ConnectError> {
        let delay = {
            let mut record = self.record.lock().await;
            *record.attempts.entry(management_ip).or_default() += 1;
            record.delays.get(&management_ip).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut record = self.record.lock().await;

        if let Some(remaining) = record.failures.get_mut(&management_ip) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ConnectError::Refused(management_ip));
            }
        }

        Ok(Box::new(ScriptedSession {
            ip: management_ip,
            probe_fails: record.dead_probes.contains(&management_ip),
            files: Mutex::new(HashMap::new()),
            closed: self.closed.clone(),
        }))
    }
}

/// Session that echoes commands and stores uploads in memory
#[derive(Debug)]
pub struct ScriptedSession {
    ip: IpAddr,
    probe_fails: bool,
    files: Mutex<HashMap<String, Vec<u8>>>,
    closed: Arc<Mutex<Vec<IpAddr>>>,
}

#[async_trait]
impl SessionHandle for ScriptedSession {
    fn management_ip(&self) -> IpAddr {
        self.ip
    }

    async fn probe(&self) -> Result<(), ConnectError> {
        if self.probe_fails {
            Err(ConnectError::Closed)
        } else {
            Ok(())
        }
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, ConnectError> {
        Ok(CommandOutput {
            stdout: command.to_string(),
            stderr: String::new(),
            exit_status: 0,
        })
    }

    async fn upload(&self, remote_path: &str, contents: &[u8]) -> Result<(), ConnectError> {
        self.files
            .lock()
            .await
            .insert(remote_path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn download(&self, remote_path: &str) -> Result<Vec<u8>, ConnectError> {
        self.files
            .lock()
            .await
            .get(remote_path)
            .cloned()
            .ok_or_else(|| ConnectError::Io(format!("{remote_path}: no such file")))
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.closed.lock().await.push(self.ip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_upload_then_download() {
        let transport = ScriptedTransport::new();
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7));
        let session = transport
            .open(ip, &Credentials::new("rocky", "/tmp/key"))
            .await
            .unwrap();

        session.upload("/tmp/run.sh", b"echo hi").await.unwrap();
        assert_eq!(session.download("/tmp/run.sh").await.unwrap(), b"echo hi");
        assert!(session.download("/tmp/missing").await.is_err());
    }
}
