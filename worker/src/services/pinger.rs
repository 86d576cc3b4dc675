//! ICMP liveness probe via the system `ping`

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use shared::{process_warn, ProcessId};

use crate::traits::Pinger;

/// Runs one `ping` per check
///
/// When the probe itself cannot run the address is treated as taken, so an
/// unusable `ping` shows up as exhaustion instead of handing out live addresses.
pub struct IcmpPinger {
    program: String,
    timeout: Duration,
}

impl IcmpPinger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "ping".to_string(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for IcmpPinger {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn is_alive(&self, ip: Ipv4Addr) -> bool {
        let wait = self.timeout.as_secs().max(1).to_string();
        let status = Command::new(&self.program)
            .args(["-c", "1", "-W", &wait, &ip.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout + Duration::from_secs(1), status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                process_warn!(ProcessId::current(), "⚠️ {} {} could not run, treating it as in use: {}", self.program, ip, e);
                true
            }
            Err(_) => {
                process_warn!(ProcessId::current(), "⚠️ {} {} did not finish within {:?}", self.program, ip, self.timeout);
                false
            }
        }
    }
}
