//! In-memory connection for tests.
use std::{
    collections::{HashMap, VecDeque},
    fs,
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;

use super::{BackgroundCommand, Connection};
use crate::error::{TargetError, TargetResult};

#[derive(Default)]
struct State {
    outputs: HashMap<String, VecDeque<String>>,
    background: HashMap<String, Vec<u8>>,
    files: HashMap<String, Vec<(String, String)>>,
    commands: Vec<String>,
}

/// A scripted connection. Clones share state, so a test can keep a handle after
/// moving one into a target.
#[derive(Clone, Default)]
pub(crate) struct FakeConnection {
    state: Arc<Mutex<State>>,
}

impl FakeConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue an output for `command`. Repeated outputs are returned in order; the last
    /// one is repeated once the queue is drained.
    pub(crate) fn with_output(self, command: &str, output: &str) -> Self {
        self.state
            .lock()
            .outputs
            .entry(command.to_string())
            .or_default()
            .push_back(output.to_string());
        self
    }

    pub(crate) fn with_background(self, command: &str, output: &str) -> Self {
        self.state.lock().background.insert(command.to_string(), output.as_bytes().to_vec());
        self
    }

    /// Files written under the destination when `source` is pulled.
    pub(crate) fn with_files(self, source: &str, files: &[(&str, &str)]) -> Self {
        let files = files.iter().map(|(n, c)| (n.to_string(), c.to_string())).collect();
        self.state.lock().files.insert(source.to_string(), files);
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }
}

impl Connection for FakeConnection {
    fn execute(&self, command: &str) -> TargetResult<String> {
        let mut state = self.state.lock();
        state.commands.push(command.to_string());
        let queue = state
            .outputs
            .get_mut(command)
            .ok_or_else(|| TargetError::Transient(format!("unexpected command `{command}`")))?;
        match queue.len() {
            0 => Ok(String::new()),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop_front().unwrap_or_default()),
        }
    }

    fn background(&self, command: &str) -> TargetResult<Box<dyn BackgroundCommand>> {
        let mut state = self.state.lock();
        state.commands.push(command.to_string());
        let output = state.background.get(command).cloned().unwrap_or_default();
        Ok(Box::new(FakeBackground { output }))
    }

    fn pull(&self, source: &str, dest: &Path) -> TargetResult<()> {
        let mut state = self.state.lock();
        state.commands.push(format!("pull {source}"));
        let files = state
            .files
            .get(source)
            .ok_or_else(|| TargetError::Stable(format!("no such path `{source}`")))?;
        fs::create_dir_all(dest)?;
        for (name, contents) in files {
            fs::write(dest.join(name), contents)?;
        }
        Ok(())
    }
}

struct FakeBackground {
    output: Vec<u8>,
}

impl BackgroundCommand for FakeBackground {
    fn is_running(&mut self) -> TargetResult<bool> {
        Ok(true)
    }

    fn terminate(self: Box<Self>) -> TargetResult<Vec<u8>> {
        Ok(self.output)
    }
}
