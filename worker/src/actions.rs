//! Named actions served to the request-handling front end
//!
//! Every action takes a flat list of string arguments and answers with a JSON
//! value plus the diagnostic lines it produced. `ActionServer` carries them
//! over framed TCP; the worker binary can also run a single action from the
//! command line.

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use shared::driver::{parse_paths, parse_single_vm};
use shared::framing::{read_frame, write_frame};
use shared::{process_debug, process_info, process_warn, ActionOutcome, ActionRequest, ProcessId};

use crate::core::ActionLog;
use crate::error::{ProvisionError, ProvisionResult};
use crate::services::{Collaborators, InventoryExt, Provisioner};
use crate::types::{HistoryEntry, ProvisionRequest};

/// Value reported for a provisioning that did not finish
pub const FAILED_MARKER: &str = "failed!";

/// Most machines a single `vmware.create` may request
pub const MAX_CREATE_COUNT: usize = 20;

/// Width of the user column in history lines
const HISTORY_USER_WIDTH: usize = 31;

pub struct ActionDispatcher {
    provisioner: Provisioner,
    collaborators: Collaborators,
    public_network: String,
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> ProvisionResult<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| ProvisionError::config(format!("missing argument <{name}>")))
}

fn number<T: FromStr>(args: &[String], index: usize, name: &str) -> ProvisionResult<T> {
    let raw = arg(args, index, name)?;
    raw.parse()
        .map_err(|_| ProvisionError::config(format!("<{name}> must be a number, got '{raw}'")))
}

/// `user ts name=value`, user padded to a fixed column
pub fn format_history(entry: &HistoryEntry) -> String {
    let ts = Utc
        .timestamp_opt(entry.ts, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.ts.to_string());
    format!(
        "{:<width$}{} {}={}",
        entry.user,
        ts,
        entry.name,
        entry.value,
        width = HISTORY_USER_WIDTH
    )
}

impl ActionDispatcher {
    pub fn new(provisioner: Provisioner, collaborators: Collaborators, public_network: impl Into<String>) -> Self {
        Self {
            provisioner,
            collaborators,
            public_network: public_network.into(),
        }
    }

    pub async fn dispatch(&self, request: ActionRequest) -> ActionOutcome {
        let log = ActionLog::new();
        let request_id = if request.request_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            request.request_id.clone()
        };

        process_info!(
            ProcessId::current(),
            "▶️ Action {} [{}] {:?}",
            request.action,
            request_id,
            request.args
        );

        let result = self
            .invoke(&request.action, &request.args, request.user.as_deref(), &log)
            .await;

        let (success, value, error) = match result {
            Ok(value) => (true, value, None),
            Err(e) => {
                process_warn!(ProcessId::current(), "⚠️ Action {} failed: {}", request.action, e);
                log.err(e.to_string());
                (false, Value::Null, Some(e.to_string()))
            }
        };

        ActionOutcome {
            request_id,
            success,
            value: value.to_string(),
            output: log.lines(),
            error,
        }
    }

    async fn invoke(&self, action: &str, args: &[String], user: Option<&str>, log: &ActionLog) -> ProvisionResult<Value> {
        let inventory = &self.collaborators.inventory;

        match action {
            "vmware.create" => self.create(args, user, log).await,
            "fix.eth" => {
                let machine = arg(args, 0, "machineId")?;
                let vm = arg(args, 1, "vmPath")?;
                let index: u32 = number(args, 2, "index")?;
                let network = arg(args, 3, "network")?;
                let outcome = self
                    .provisioner
                    .reconciler()
                    .reconcile(machine, vm, index, network, log)
                    .await?;
                Ok(json!(outcome.mac()))
            }
            "fix.publicnetwork" => {
                let machine = arg(args, 0, "machineId")?;
                let vm = self.resolve_vm(machine).await?;
                log.out(format!("Found machine at {vm}"));
                let outcome = self
                    .provisioner
                    .reconciler()
                    .reconcile(machine, &vm, 1, &self.public_network, log)
                    .await?;
                Ok(json!(outcome.mac()))
            }
            "srvdb.get" => {
                let machine = arg(args, 0, "machineId")?;
                let props = inventory.get(machine, args[1..].to_vec()).await?;
                Ok(json!(props))
            }
            "srvdb.search" => {
                if args.is_empty() {
                    return Err(ProvisionError::config("missing argument <query>"));
                }
                Ok(json!(inventory.search(args.to_vec()).await?))
            }
            "srvdb.propsearch" => {
                if args.is_empty() {
                    return Err(ProvisionError::config("missing argument <key=value>"));
                }
                Ok(json!(inventory.property_search(args.to_vec()).await?))
            }
            "srvdb.history" => {
                let mut rest: Vec<&String> = args.iter().collect();
                let flag = rest.iter().take(2).position(|a| a.as_str() == "-c");
                let only_current = match flag {
                    Some(position) => {
                        rest.remove(position);
                        true
                    }
                    None => false,
                };
                let machine = rest
                    .first()
                    .ok_or_else(|| ProvisionError::config("missing argument <machineId>"))?;
                let props = rest[1..].iter().map(|p| p.to_string()).collect();

                let mut entries = inventory.history(machine, only_current, props).await?;
                entries.sort_by(|a, b| b.ts.cmp(&a.ts));
                Ok(json!(entries.iter().map(format_history).collect::<Vec<_>>()))
            }
            "srvdb.freeip" => {
                let network = arg(args, 0, "network")?;
                let ip = self.provisioner.allocator().free_ip(network).await?;
                Ok(json!(ip.to_string()))
            }
            "srvdb.purge" => {
                let machine = arg(args, 0, "machineId")?;
                let output = inventory.purge(machine).await?;
                for line in output.lines() {
                    log.out(line);
                }
                Ok(json!(output))
            }
            other => Err(ProvisionError::config(format!("unknown action '{other}'"))),
        }
    }

    /// `<datacenter> <cores> <memoryGiB> <diskGB> <os> [count] [owner]`
    async fn create(&self, args: &[String], user: Option<&str>, log: &ActionLog) -> ProvisionResult<Value> {
        let request = ProvisionRequest {
            datacenter: arg(args, 0, "datacenter")?.to_string(),
            cores: number(args, 1, "cores")?,
            memory_gib: number(args, 2, "memoryGiB")?,
            disk_gb: number(args, 3, "diskGB")?,
            os: arg(args, 4, "os")?.to_string(),
            owner: args
                .get(6)
                .map(String::as_str)
                .or(user)
                .unwrap_or("unknown")
                .to_string(),
        };
        let count: usize = match args.get(5) {
            Some(_) => number(args, 5, "count")?,
            None => 1,
        };
        if count == 0 {
            return Err(ProvisionError::config("<count> must be at least 1"));
        }
        if count > MAX_CREATE_COUNT {
            return Err(ProvisionError::config(format!(
                "<count> must be at most {MAX_CREATE_COUNT}, got {count}"
            )));
        }

        // Unknown datacenter or OS fails the whole action before anything runs
        let dc = self.provisioner.catalog().datacenter(&request.datacenter)?;
        self.provisioner.catalog().os(dc.os_block(), &request.os)?;

        let reports = join_all((0..count).map(|_| self.provisioner.provision(&request, log))).await;

        let ids: Vec<String> = reports
            .iter()
            .map(|report| {
                if report.succeeded() {
                    report.machine_id.clone().unwrap_or_else(|| FAILED_MARKER.to_string())
                } else {
                    FAILED_MARKER.to_string()
                }
            })
            .collect();

        for report in &reports {
            for warning in report.warnings() {
                log.err(format!(
                    "{}: {} skipped ({})",
                    report.machine_id.as_deref().unwrap_or("?"),
                    warning.step,
                    warning.detail.as_deref().unwrap_or("no detail")
                ));
            }
        }

        Ok(json!(ids))
    }

    /// Inventory path of `machine`: `vm/<machine>` directly, else a name search
    async fn resolve_vm(&self, machine: &str) -> ProvisionResult<String> {
        let driver = &self.collaborators.driver;

        let direct = format!("vm/{machine}");
        let info = driver.run("vm.info", vec!["-json".into(), direct.clone()]).await?;
        if info.success() && parse_single_vm(&info.stdout) {
            return Ok(direct);
        }

        let found = driver
            .run("find", vec!["vm".into(), "-name".into(), machine.to_string()])
            .await?;
        if !found.success() {
            return Err(ProvisionError::driver("find", found.stderr.trim()));
        }

        match parse_paths(&found.stdout).as_slice() {
            [path] => Ok(path.clone()),
            [] => Err(ProvisionError::unavailable(format!("no machine named {machine}"))),
            paths => Err(ProvisionError::unavailable(format!(
                "{} machines named {machine}: {}",
                paths.len(),
                paths.join(", ")
            ))),
        }
    }
}

/// TCP front for the dispatcher; one request at a time per connection
pub struct ActionServer {
    dispatcher: Arc<ActionDispatcher>,
    accept_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ActionServer {
    pub fn new(dispatcher: Arc<ActionDispatcher>) -> Self {
        Self {
            dispatcher,
            accept_task: Mutex::new(None),
        }
    }

    async fn serve_connection(mut stream: TcpStream, dispatcher: Arc<ActionDispatcher>) {
        loop {
            let request: ActionRequest = match read_frame(&mut stream).await {
                Ok(request) => request,
                Err(_) => return,
            };

            let outcome = dispatcher.dispatch(request).await;
            if write_frame(&mut stream, &outcome).await.is_err() {
                return;
            }
        }
    }

    pub async fn start(&self, bind_addr: SocketAddr) -> ProvisionResult<SocketAddr> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let dispatcher = self.dispatcher.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                process_debug!(ProcessId::current(), "🔌 Action connection from {}", peer);
                tokio::spawn(Self::serve_connection(stream, dispatcher.clone()));
            }
        });
        *self.accept_task.lock().await = Some(handle);

        process_info!(ProcessId::current(), "🛰️ Serving actions on {}", local_addr);
        Ok(local_addr)
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }
        process_debug!(ProcessId::current(), "🔌 Action server shut down");
    }
}
