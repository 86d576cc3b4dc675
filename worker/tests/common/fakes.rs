//! Stateful in-memory doubles for the worker's collaborators

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use shared::{CommandOutput, SharedResult, UtilizationProbe, UtilizationSnapshot, VirtualizationDriver};
use worker::{ActionLog, HistoryEntry, InventoryClient, Pinger, Properties, ProvisionResult, RemoteExecutor};

/// `%` matches any run of characters
fn wildcard(pattern: &str, text: &str) -> bool {
    let regex = format!("^{}$", regex::escape(pattern).replace('%', ".*"));
    Regex::new(&regex).map(|r| r.is_match(text)).unwrap_or(false)
}

fn term_matches(term: &str, props: &Properties) -> bool {
    match term.split_once('=') {
        Some((key, value)) => props.iter().any(|(k, v)| wildcard(key, k) && wildcard(value, v)),
        None => props.values().any(|v| v.contains(term)),
    }
}

#[derive(Default)]
struct InventoryState {
    records: BTreeMap<String, Properties>,
    history: Vec<(String, HistoryEntry)>,
    registered: u32,
    calls: Vec<(String, Vec<String>)>,
}

/// Inventory keeping records in memory, including lock read-back semantics
#[derive(Default)]
pub struct FakeInventory {
    state: Mutex<InventoryState>,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, machine: &str, props: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let record = state.records.entry(machine.to_string()).or_default();
            for (key, value) in props {
                record.insert(key.to_string(), value.to_string());
            }
        }
        self
    }

    pub fn with_history(self, machine: &str, user: &str, ts: i64, name: &str, value: &str) -> Self {
        self.state.lock().unwrap().history.push((
            machine.to_string(),
            HistoryEntry {
                user: user.to_string(),
                ts,
                name: name.to_string(),
                value: value.to_string(),
            },
        ));
        self
    }

    pub fn value(&self, machine: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(machine)
            .and_then(|record| record.get(key).cloned())
    }

    pub fn record(&self, machine: &str) -> Properties {
        self.state.lock().unwrap().records.get(machine).cloned().unwrap_or_default()
    }

    /// Every `call` made so far
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl InventoryClient for FakeInventory {
    async fn get(&self, machine: &str, props: Vec<String>) -> ProvisionResult<Properties> {
        let record = self.record(machine);
        if props.is_empty() {
            return Ok(record);
        }
        Ok(record.into_iter().filter(|(key, _)| props.contains(key)).collect())
    }

    async fn set(&self, machine: &str, props: Properties) -> ProvisionResult<()> {
        let mut state = self.state.lock().unwrap();
        for (key, value) in &props {
            state.history.push((
                machine.to_string(),
                HistoryEntry {
                    user: "worker".to_string(),
                    ts: chrono::Utc::now().timestamp(),
                    name: key.clone(),
                    value: value.clone(),
                },
            ));
        }
        state.records.entry(machine.to_string()).or_default().extend(props);
        Ok(())
    }

    async fn del(&self, machine: &str, props: Vec<String>) -> ProvisionResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.records.get_mut(machine) {
            record.retain(|key, _| {
                !props
                    .iter()
                    .any(|group| key == group || key.starts_with(&format!("{group}.")))
            });
        }
        Ok(())
    }

    async fn call(&self, method: &str, args: Vec<String>) -> ProvisionResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((method.to_string(), args.clone()));

        match method {
            "regsrv" => {
                state.registered += 1;
                let id = format!("srv{:06}", state.registered);
                let record = state.records.entry(id.clone()).or_default();
                for (index, mac) in args.iter().enumerate() {
                    record.insert(format!("macs.{index}"), mac.clone());
                }
                Ok(format!("{id}\n"))
            }
            "dyndns" => Ok(format!("removed dns entries of {}", args.first().cloned().unwrap_or_default())),
            other => Ok(format!("{other} done")),
        }
    }

    async fn property_search(&self, filters: Vec<String>) -> ProvisionResult<BTreeMap<String, Properties>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|(_, props)| filters.iter().all(|filter| term_matches(filter, props)))
            .map(|(id, props)| (id.clone(), props.clone()))
            .collect())
    }

    async fn text_search(&self, query: &str) -> ProvisionResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(("textsearch".to_string(), vec![query.to_string()]));
        Ok(state
            .records
            .iter()
            .filter(|(_, props)| query.split_whitespace().all(|term| term_matches(term, props)))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn history(&self, machine: &str, only_current: bool, props: Vec<String>) -> ProvisionResult<Vec<HistoryEntry>> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<HistoryEntry> = state
            .history
            .iter()
            .filter(|(id, entry)| id == machine && (props.is_empty() || props.contains(&entry.name)))
            .map(|(_, entry)| entry.clone())
            .collect();

        if only_current {
            let mut latest: HashMap<String, HistoryEntry> = HashMap::new();
            for entry in entries {
                match latest.get(&entry.name) {
                    Some(existing) if existing.ts > entry.ts => {}
                    _ => {
                        latest.insert(entry.name.clone(), entry);
                    }
                }
            }
            entries = latest.into_values().collect();
        }
        Ok(entries)
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        status: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Driver that records every command and answers from per-command queues
///
/// The last queued answer of a command repeats; commands without answers succeed
/// with empty output.
#[derive(Default)]
pub struct RecordingDriver {
    commands: Mutex<Vec<(String, Vec<String>)>>,
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, command: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn commands(&self) -> Vec<(String, Vec<String>)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.commands().into_iter().map(|(name, _)| name).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|(name, _)| name == command).count()
    }

    /// Arguments of the first `command` run
    pub fn args_of(&self, command: &str) -> Option<Vec<String>> {
        self.commands()
            .into_iter()
            .find(|(name, _)| name == command)
            .map(|(_, args)| args)
    }
}

#[async_trait]
impl VirtualizationDriver for RecordingDriver {
    async fn run(&self, command: &str, args: Vec<String>) -> SharedResult<CommandOutput> {
        self.commands.lock().unwrap().push((command.to_string(), args));

        let mut responses = self.responses.lock().unwrap();
        let output = match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| ok("")))
    }
}

/// Probe returning the same snapshot every time
pub struct StaticProbe(pub UtilizationSnapshot);

#[async_trait]
impl UtilizationProbe for StaticProbe {
    async fn gather(&self) -> SharedResult<UtilizationSnapshot> {
        Ok(self.0.clone())
    }
}

/// Only the listed addresses answer
#[derive(Default)]
pub struct ScriptedPinger {
    alive: HashSet<Ipv4Addr>,
}

impl ScriptedPinger {
    pub fn alive(addresses: &[Ipv4Addr]) -> Self {
        Self {
            alive: addresses.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl Pinger for ScriptedPinger {
    async fn is_alive(&self, ip: Ipv4Addr) -> bool {
        self.alive.contains(&ip)
    }
}

/// Records remote commands; all succeed unless `failing` is set
#[derive(Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<(String, String, String)>>,
    failing: bool,
}

impl RecordingExecutor {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// `(host, user, command)` in execution order
    pub fn executed(&self) -> Vec<(String, String, String)> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn execute(&self, host: &str, user: &str, command: &str, log: &ActionLog) -> ProvisionResult<bool> {
        self.executed
            .lock()
            .unwrap()
            .push((host.to_string(), user.to_string(), command.to_string()));
        log.out(format!("STDOUT: ran {command}"));
        Ok(!self.failing)
    }
}
