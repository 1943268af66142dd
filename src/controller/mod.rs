//! Top-level session state machine: ties script selection, descriptor
//! parsing, argument population, and execution together, and resets all of
//! it between runs.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::Config;
use crate::descriptor::{parse_descriptor, ScriptDescriptor};
use crate::error::{EngineError, ParseDiagnostic};
use crate::errorlog::ErrorSink;
use crate::library::ScriptLibrary;
use crate::session::invoke::pwsh_invocation;
use crate::session::stream::{SharedBuffers, StreamBuffers};
use crate::session::{ExecutionSession, ExecutionState, RunHandle};
use crate::store::ArgumentStore;

pub struct SessionController {
    cfg: Config,
    library: Arc<dyn ScriptLibrary>,
    session: Arc<ExecutionSession>,
    buffers: SharedBuffers,
    store: ArgumentStore,
    selected_category: Option<String>,
    scripts: Vec<String>,
    selected_script: Option<String>,
    script_path: Option<PathBuf>,
    descriptor: Option<ScriptDescriptor>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl SessionController {
    pub fn new(
        cfg: Config,
        library: Arc<dyn ScriptLibrary>,
        error_log: Arc<dyn ErrorSink>,
    ) -> Self {
        let buffers: SharedBuffers = Arc::new(Mutex::new(StreamBuffers::default()));
        let session = ExecutionSession::new(
            Arc::clone(&buffers),
            error_log,
            cfg.custom_output_prefix(),
            cfg.cancel_poll(),
        );
        let mut controller = Self {
            cfg,
            library,
            session,
            buffers,
            store: ArgumentStore::new(),
            selected_category: None,
            scripts: Vec::new(),
            selected_script: None,
            script_path: None,
            descriptor: None,
            diagnostics: Vec::new(),
        };
        controller.select_initial_category();
        controller
    }

    /// First category in library order, if any.
    fn select_initial_category(&mut self) {
        if let Some(first) = self.library.categories().first().cloned() {
            self.select_category(&first);
        }
    }

    pub fn categories(&self) -> Vec<String> {
        self.library.categories()
    }

    /// Scripts of the selected category.
    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    pub fn selected_category(&self) -> Option<&str> {
        self.selected_category.as_deref()
    }

    pub fn selected_script(&self) -> Option<&str> {
        self.selected_script.as_deref()
    }

    pub fn is_script_selected(&self) -> bool {
        self.selected_script.is_some()
    }

    pub fn descriptor(&self) -> Option<&ScriptDescriptor> {
        self.descriptor.as_ref()
    }

    /// Parse diagnostics of the selected script's descriptor.
    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }

    pub fn store(&self) -> &ArgumentStore {
        &self.store
    }

    pub fn buffers(&self) -> SharedBuffers {
        Arc::clone(&self.buffers)
    }

    pub fn session(&self) -> Arc<ExecutionSession> {
        Arc::clone(&self.session)
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.session.state()
    }

    /// Selecting a category drops the script selection and every argument.
    pub fn select_category(&mut self, name: &str) {
        self.store.clear_all();
        self.selected_script = None;
        self.script_path = None;
        self.descriptor = None;
        self.diagnostics.clear();
        self.selected_category = Some(name.to_string());
        self.scripts = self.library.scripts(name);
    }

    /// Selecting a script re-parses its descriptor, repopulates the
    /// argument store, and clears any output left over from a previous run.
    pub fn select_script(&mut self, name: &str) -> Result<(), EngineError> {
        let category = self
            .selected_category
            .clone()
            .ok_or_else(|| EngineError::DescriptorUnreadable {
                path: PathBuf::from(name),
                reason: "no category selected".into(),
            })?;

        self.store.clear_all();
        self.selected_script = None;
        self.script_path = None;
        self.descriptor = None;
        self.diagnostics.clear();

        let path = self.library.resolve(&category, name);
        let parsed = parse_descriptor(&path)?;
        for diagnostic in &parsed.diagnostics {
            warn!(script = name, %diagnostic, "descriptor diagnostic");
        }

        self.store.populate(&parsed.descriptor.definitions);
        self.descriptor = Some(parsed.descriptor);
        self.diagnostics = parsed.diagnostics;
        self.selected_script = Some(name.to_string());
        self.script_path = Some(path);

        let mut buffers = self.buffers.lock();
        if buffers.contains_data() {
            buffers.clear();
        }
        Ok(())
    }

    /// Commits a value into the named argument. False for unknown keys and
    /// shape-rejected input.
    pub fn set_argument(&mut self, key: &str, raw: &str) -> bool {
        self.store.set(key, raw)
    }

    /// Base64 wire variant for password values.
    pub fn set_argument_base64(&mut self, key: &str, encoded: &str) -> bool {
        self.store.set_base64(key, encoded)
    }

    /// Recomputed on every call from the latest committed values.
    pub fn readiness(&self) -> bool {
        self.store
            .is_ready_to_execute(self.is_script_selected(), self.session.state())
    }

    /// Starts the run and hands back its record stream. Arguments are
    /// locked while the interpreter is alive.
    pub fn start(&mut self) -> Result<RunHandle, EngineError> {
        if !self.readiness() {
            return Err(EngineError::NotReady);
        }
        let path = self.script_path.clone().ok_or(EngineError::NotReady)?;

        self.store.set_enabled(false);
        let invocation = pwsh_invocation(&self.cfg, &path, &self.store.parameters());
        match self.session.start(invocation) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.store.set_enabled(true);
                Err(e)
            }
        }
    }

    pub fn cancel(&self) {
        self.session.cancel();
    }

    /// Full reset back to the initial state, called after every run. Waits
    /// for the state machine to reach idle so the reset never races the
    /// supervision task over the buffers.
    pub async fn clear_session(&mut self) {
        self.session.wait_idle().await;
        self.buffers.lock().clear();
        self.store.clear_all();
        self.selected_script = None;
        self.script_path = None;
        self.descriptor = None;
        self.diagnostics.clear();
        self.selected_category = None;
        self.select_initial_category();
    }
}
