//! Scripted stand-ins for the sandbox runtime.
//!
//! Every runtime command becomes a tiny `sh -c` script that appends `"<verb> <name>"`
//! to a journal file, so tests drive real child processes and can assert on the
//! order in which commands were issued.
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use fanbench_exec::CommandSpec;
use tokio_util::sync::CancellationToken;

use crate::{
    readiness::Probe,
    runtime::{Mount, SandboxRuntime},
};

#[derive(Clone, Debug)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("journal.log"),
        }
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        let raw = fs::read_to_string(&self.path).unwrap_or_default();
        raw.lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(verb, name)| (verb.to_string(), name.to_string()))
            .collect()
    }

    pub fn verbs_for(&self, name: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(_, n)| n == name)
            .map(|(verb, _)| verb)
            .collect()
    }

    pub fn has(&self, verb: &str, name: &str) -> bool {
        self.entries().iter().any(|(v, n)| v == verb && n == name)
    }

    pub fn count(&self, verb: &str) -> usize {
        self.entries().iter().filter(|(v, _)| v == verb).count()
    }
}

#[derive(Clone, Debug)]
pub struct ScriptedRuntime {
    journal: PathBuf,
    build_exit: i32,
    create_exit: i32,
    destroy_exit: i32,
    logs_exit: i32,
    exec_exit: HashMap<String, i32>,
    exec_sleep: HashMap<String, u64>,
    create_program: Option<String>,
    logs_program: Option<String>,
}

const MISSING_BINARY: &str = "/nonexistent/fanbench-test-runtime";

impl ScriptedRuntime {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.path.clone(),
            build_exit: 0,
            create_exit: 0,
            destroy_exit: 0,
            logs_exit: 0,
            exec_exit: HashMap::new(),
            exec_sleep: HashMap::new(),
            create_program: None,
            logs_program: None,
        }
    }

    pub fn build_exit(mut self, code: i32) -> Self {
        self.build_exit = code;
        self
    }

    pub fn create_exit(mut self, code: i32) -> Self {
        self.create_exit = code;
        self
    }

    pub fn destroy_exit(mut self, code: i32) -> Self {
        self.destroy_exit = code;
        self
    }

    pub fn logs_exit(mut self, code: i32) -> Self {
        self.logs_exit = code;
        self
    }

    pub fn exec_exit(mut self, name: &str, code: i32) -> Self {
        self.exec_exit.insert(name.to_string(), code);
        self
    }

    pub fn exec_sleep(mut self, name: &str, secs: u64) -> Self {
        self.exec_sleep.insert(name.to_string(), secs);
        self
    }

    pub fn missing_create_binary(mut self) -> Self {
        self.create_program = Some(MISSING_BINARY.to_string());
        self
    }

    pub fn missing_logs_binary(mut self) -> Self {
        self.logs_program = Some(MISSING_BINARY.to_string());
        self
    }

    fn record(&self, verb: &str, name: &str, tail: &str) -> CommandSpec {
        sh(&format!(
            "echo '{verb} {name}' >> '{journal}'; {tail}",
            journal = self.journal.display()
        ))
    }
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

impl SandboxRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn build_image(&self, tag: &str, _context: &Path) -> CommandSpec {
        self.record("build", tag, &format!("exit {}", self.build_exit))
    }

    fn create(&self, name: &str, _image: &str, _mount: &Mount, _command: &[String]) -> CommandSpec {
        match &self.create_program {
            Some(program) => CommandSpec::new(program),
            None => self.record("create", name, &format!("exit {}", self.create_exit)),
        }
    }

    fn inspect(&self, name: &str) -> CommandSpec {
        sh(&format!(
            "grep -qxF 'create {name}' '{journal}'",
            journal = self.journal.display()
        ))
        .quiet()
        .kill_on_drop(true)
    }

    fn logs(&self, _name: &str) -> CommandSpec {
        match &self.logs_program {
            Some(program) => CommandSpec::new(program),
            None => sh(&format!("exit {}", self.logs_exit)),
        }
    }

    fn exec(&self, name: &str, _argv: &[String]) -> CommandSpec {
        let code = self.exec_exit.get(name).copied().unwrap_or(0);
        let tail = match self.exec_sleep.get(name) {
            Some(secs) => format!("sleep {secs}; exit {code}"),
            None => format!("exit {code}"),
        };
        self.record("exec", name, &tail)
    }

    fn destroy(&self, name: &str) -> CommandSpec {
        self.record("destroy", name, &format!("exit {}", self.destroy_exit))
    }
}

/// Readiness check that never succeeds and counts calls per sandbox.
#[derive(Default)]
pub struct NeverReady {
    calls: Mutex<HashMap<String, u64>>,
}

impl NeverReady {
    pub fn calls(&self, sandbox: &str) -> u64 {
        self.calls.lock().unwrap().get(sandbox).copied().unwrap_or(0)
    }

    /// Number of distinct sandboxes checked so far.
    pub fn seen(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Probe for NeverReady {
    async fn is_ready(&self, sandbox: &str, _cancel: &CancellationToken) -> bool {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(sandbox.to_string())
            .or_default() += 1;
        false
    }
}
