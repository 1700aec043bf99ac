//! The attach sequence.
//!
//! Order matters here:
//!
//! 1. the host must support retransformation before anything else happens;
//! 2. options are parsed and an offline directory is prepared;
//! 3. the support archive goes on the bootstrap search path, since the
//!    rewritten dispatch classes call into it;
//! 4. offline, loaded classes are archived before any of them is rewritten;
//! 5. the sink is opened and bound, the support runtime linked, and only
//!    then are the dispatch classes rewritten;
//! 6. the flush is registered for shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use crate::config::{self, AgentConfiguration, Destination};
use crate::error::{AttachError, FlushError, LinkError};
use crate::hooks::HookRegistration;
use crate::host::InstrumentationHost;
use crate::injector::SupportInjector;
use crate::installer::{CallSiteRewriter, InstallReport, InterceptionInstaller};
use crate::logging;
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::snapshot::{capture_late, ClassArchive, ClassSnapshotter, SnapshotReport};
use crate::trace::{Recorder, TraceRecorder, TraceSink};

/// Connects the recorder to the support runtime once it is resolvable and
/// hands back the rewriter that targets it.
pub trait SupportLink {
    fn link(&self, recorder: Arc<TraceRecorder>) -> Result<Arc<dyn CallSiteRewriter>, LinkError>;
}

/// Everything an attached agent owns for the rest of the run.
pub struct AgentContext {
    config: AgentConfiguration,
    sink: Arc<TraceSink>,
    recorder: Arc<TraceRecorder>,
    archive: Option<Arc<ClassArchive>>,
    coordinator: ShutdownCoordinator,
    snapshot: Option<SnapshotReport>,
    install: InstallReport,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("config", &self.config)
            .field("archive", &self.archive)
            .field("snapshot", &self.snapshot)
            .field("install", &self.install)
            .finish_non_exhaustive()
    }
}

impl AgentContext {
    pub fn config(&self) -> &AgentConfiguration {
        &self.config
    }

    pub fn sink(&self) -> &Arc<TraceSink> {
        &self.sink
    }

    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }

    pub fn archive(&self) -> Option<&Arc<ClassArchive>> {
        self.archive.as_ref()
    }

    /// `None` online, where no snapshot is taken.
    pub fn snapshot_report(&self) -> Option<&SnapshotReport> {
        self.snapshot.as_ref()
    }

    pub fn install_report(&self) -> &InstallReport {
        &self.install
    }

    pub fn shutdown_state(&self) -> &Arc<ShutdownState> {
        self.coordinator.state()
    }

    /// Flushes and closes the sink. Only the first call does anything.
    pub fn terminate(&self) -> bool {
        self.coordinator.terminate()
    }
}

pub struct AgentBootstrap {
    injector: SupportInjector,
}

impl AgentBootstrap {
    pub fn new(injector: SupportInjector) -> Self {
        AgentBootstrap { injector }
    }

    pub fn from_env() -> Self {
        Self::new(SupportInjector::from_env())
    }

    pub fn attach<H>(
        &self,
        host: &H,
        link: &dyn SupportLink,
        options: &str,
    ) -> Result<AgentContext, AttachError>
    where
        H: InstrumentationHost + ?Sized,
    {
        if !host.can_retransform() {
            return Err(AttachError::RetransformUnsupported);
        }

        let config = AgentConfiguration::parse(options)?;
        logging::set_verbose(config.verbose);
        if let Some(dir) = config.output_dir() {
            config::prepare_directory(dir)?;
        }

        self.injector.inject(host)?;

        let shutdown = ShutdownState::new();
        let recorder = Arc::new(TraceRecorder::new(Arc::clone(&shutdown)));
        recorder.configure_counting(config.count_enabled);
        let sink = Arc::new(TraceSink::new());

        let (archive, snapshot) = match &config.destination {
            Destination::Socket(endpoint) => {
                sink.open_online(endpoint)?;
                recorder.bind_socket(Arc::clone(&sink))?;
                (None, None)
            }
            Destination::Directory(dir) => {
                let archive = ClassArchive::new();
                let report = ClassSnapshotter::snapshot(host, &archive, dir)?;
                sink.open_offline(dir)?;
                recorder.bind_log_file(Arc::clone(&sink))?;
                (Some(archive), Some(report))
            }
        };

        let rewriter = link.link(Arc::clone(&recorder))?;
        let install = InterceptionInstaller::new(rewriter).install(host)?;

        let late = archive.as_ref().map(|archive| capture_late(host.hooks(), archive));

        let coordinator = ShutdownCoordinator::new(shutdown);
        let flush = Flush {
            recorder: Arc::clone(&recorder),
            verbose: config.verbose,
            late: match (late, &archive, config.output_dir()) {
                (Some(registration), Some(archive), Some(dir)) => {
                    Some((registration, Arc::clone(archive), dir.to_path_buf()))
                }
                _ => None,
            },
        };
        coordinator.register_flush(Arc::clone(&sink), move || flush.run());

        info!("attached ({:?} mode)", config.mode());
        Ok(AgentContext { config, sink, recorder, archive, coordinator, snapshot, install })
    }
}

struct Flush {
    recorder: Arc<TraceRecorder>,
    verbose: bool,
    late: Option<(HookRegistration, Arc<ClassArchive>, PathBuf)>,
}

impl Flush {
    fn run(self) -> Result<(), FlushError> {
        let persisted = match self.late {
            Some((registration, archive, dir)) => {
                drop(registration);
                archive
                    .persist_all(&dir)
                    .map(drop)
                    .map_err(|source| FlushError::Archive { dir, source })
            }
            None => Ok(()),
        };
        self.recorder.flush_to_disk(self.verbose)?;
        persisted
    }
}
