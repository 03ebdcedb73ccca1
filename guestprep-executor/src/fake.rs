//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use guestprep_core::{Credentials, SnapshotName};

use crate::error::Operation;
use crate::{DisplayMode, ExecutorError, GuestHandle, HypervisorControl, RemoteShell};

/// One recorded hypervisor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List(PathBuf),
    Snapshot(PathBuf, String),
    Clone { base: PathBuf, target: PathBuf, parent: String },
    Revert(PathBuf, String),
    Start(PathBuf, DisplayMode),
    Address(PathBuf),
}

#[derive(Debug, Default)]
struct State {
    snapshots: BTreeMap<PathBuf, BTreeSet<SnapshotName>>,
    calls: Vec<Call>,
    fail: Option<Operation>,
    address: Option<IpAddr>,
}

/// Hypervisor that keeps snapshot sets in memory and writes clone
/// descriptors to disk so existence checks see them.
#[derive(Debug)]
pub(crate) struct FakeHypervisor {
    tool: PathBuf,
    state: Mutex<State>,
}

impl FakeHypervisor {
    pub(crate) fn new() -> Self {
        Self {
            tool: PathBuf::from("vmrun"),
            state: Mutex::new(State {
                address: Some(IpAddr::from([192, 168, 64, 10])),
                ..State::default()
            }),
        }
    }

    /// Report `tool` as the control tool so preflight can validate it.
    pub(crate) fn with_tool(mut self, tool: &Path) -> Self {
        self.tool = tool.to_owned();
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn with_snapshot(self, guest: &Path, name: &str) -> Self {
        if let Ok(name) = SnapshotName::new(name) {
            self.lock().snapshots.entry(guest.to_owned()).or_default().insert(name);
        }
        self
    }

    pub(crate) fn failing(self, operation: Operation) -> Self {
        self.lock().fail = Some(operation);
        self
    }

    pub(crate) fn without_address(self) -> Self {
        self.lock().address = None;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub(crate) fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::List(_) | Call::Address(_)))
            .collect()
    }

    fn record(&self, call: Call, operation: Operation, guest: &Path) -> Result<(), ExecutorError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.fail == Some(operation) {
            return Err(ExecutorError::provisioning(operation, guest, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl HypervisorControl for FakeHypervisor {
    fn control_tool(&self) -> &Path {
        &self.tool
    }

    async fn list_snapshots(
        &self,
        guest: &GuestHandle,
    ) -> Result<BTreeSet<SnapshotName>, ExecutorError> {
        let path = &guest.image_path;
        self.record(Call::List(path.clone()), Operation::ListSnapshots, path)?;
        Ok(self.lock().snapshots.get(path).cloned().unwrap_or_default())
    }

    async fn create_snapshot(
        &self,
        guest: &GuestHandle,
        name: &SnapshotName,
    ) -> Result<(), ExecutorError> {
        let path = &guest.image_path;
        self.record(
            Call::Snapshot(path.clone(), name.to_string()),
            Operation::CreateSnapshot,
            path,
        )?;
        self.lock().snapshots.entry(path.clone()).or_default().insert(name.clone());
        Ok(())
    }

    async fn linked_clone(
        &self,
        base: &GuestHandle,
        parent: &SnapshotName,
        target: &Path,
        _target_name: &str,
    ) -> Result<GuestHandle, ExecutorError> {
        self.record(
            Call::Clone {
                base: base.image_path.clone(),
                target: target.to_owned(),
                parent: parent.to_string(),
            },
            Operation::Clone,
            &base.image_path,
        )?;
        let has_parent = self
            .lock()
            .snapshots
            .get(&base.image_path)
            .is_some_and(|s| s.contains(parent));
        if !has_parent {
            return Err(ExecutorError::provisioning(
                Operation::Clone,
                &base.image_path,
                "parent snapshot missing",
            ));
        }
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(target, b"linked clone")?;
        Ok(GuestHandle::attach(target))
    }

    async fn revert_to_snapshot(
        &self,
        guest: &GuestHandle,
        name: &SnapshotName,
    ) -> Result<(), ExecutorError> {
        let path = &guest.image_path;
        self.record(Call::Revert(path.clone(), name.to_string()), Operation::Revert, path)
    }

    async fn start(&self, guest: &GuestHandle, mode: DisplayMode) -> Result<(), ExecutorError> {
        let path = &guest.image_path;
        self.record(Call::Start(path.clone(), mode), Operation::Start, path)
    }

    async fn guest_address(&self, guest: &GuestHandle) -> Result<Option<IpAddr>, ExecutorError> {
        let path = &guest.image_path;
        self.record(Call::Address(path.clone()), Operation::GuestAddress, path)?;
        Ok(self.lock().address)
    }
}

/// What one scripted shell attempt returns.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Attempt {
    Exit(i32),
    ConnectError,
}

/// Remote shell that replays a script; once exhausted every attempt exits 255.
#[derive(Debug, Default)]
pub(crate) struct ScriptedShell {
    script: Mutex<VecDeque<Attempt>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub(crate) fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds on attempt `k` after `k - 1` failures.
    pub(crate) fn succeeding_on(k: u32) -> Self {
        let failures = (1..k).map(|_| Attempt::Exit(255));
        Self::new(failures.chain(std::iter::once(Attempt::Exit(0))))
    }

    pub(crate) fn attempts(&self) -> usize {
        self.commands.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn run(
        &self,
        _host: IpAddr,
        _credentials: &Credentials,
        command: &str,
    ) -> Result<i32, ExecutorError> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_owned());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(Attempt::Exit(255));
        match next {
            Attempt::Exit(code) => Ok(code),
            Attempt::ConnectError => Err(ExecutorError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}
