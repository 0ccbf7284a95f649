//! The labnet worker: a long-running process which owns a [`Pipeline`], answers [`Request`]s from
//! clients, and reaps expired connections.

#![warn(unreachable_pub, missing_debug_implementations)]

mod protocol;

use std::{
    io::{BufReader, ErrorKind, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use labnet_core::{
    catalog::{CatalogError, Student},
    Catalog, Controller, Error, Handler, MacAddr, Pipeline, PipelineOpts, ValidationError,
};
use labnet_floodlight::{FloodlightController, FloodlightOpts};
use parking_lot::RwLock;
use rmp_serde::decode;

pub use protocol::{send, CatalogEdit, Request, Response};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker options.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct WorkerOpts {
    /// Port to listen on, on all interfaces.
    #[builder(default = 8080)]
    pub port: u16,
    /// The catalog file, re-read on [`Request::Reload`].
    #[builder(setter(into))]
    pub catalog: PathBuf,
    #[builder(default)]
    pub floodlight: FloodlightOpts,
    #[builder(default)]
    pub pipeline: PipelineOpts,
    /// How often expired connections are looked for. Only used when the pipeline has a TTL.
    #[builder(default = Duration::from_secs(60))]
    pub sweep: Duration,
}

/// Starts a worker talking to Floodlight and blocks until it is interrupted.
pub fn start(opts: WorkerOpts) -> anyhow::Result<()> {
    let catalog = labnet_utils::read_catalog(&opts.catalog)
        .with_context(|| format!("failed to read catalog {}", opts.catalog.display()))?;
    let controller = FloodlightController::new(opts.floodlight.clone())
        .with_context(|| "failed to create Floodlight client")?;
    let reaping = opts.pipeline.ttl.is_some();
    let sweep = opts.sweep;
    let pipeline = Pipeline::new(controller, opts.pipeline);
    let daemon = Arc::new(Daemon::new(pipeline, catalog).with_catalog_path(&opts.catalog));

    let d = Arc::clone(&daemon);
    ctrlc::set_handler(move || d.shut_down()).with_context(|| "failed to set interrupt handler")?;

    let addr: SocketAddr = ([0, 0, 0, 0], opts.port).into();
    let listener = TcpListener::bind(addr).with_context(|| "failed to bind listener")?;
    log::info!("listening on {addr}");

    let reaper = reaping.then(|| {
        let d = Arc::clone(&daemon);
        thread::spawn(move || reap(&d, sweep))
    });
    let res = serve(Arc::clone(&daemon), listener);
    // The listener may have failed on its own; the reaper must still stop.
    daemon.shut_down();
    if let Some(reaper) = reaper {
        reaper
            .join()
            .map_err(|_| anyhow::anyhow!("reaper thread panicked"))?;
    }
    res.with_context(|| "error in labnet_worker::serve")
}

/// Accepts clients until the daemon shuts down, answering each on its own thread. Returns once
/// every request already accepted has been answered.
pub fn serve<C>(daemon: Arc<Daemon<C>>, listener: TcpListener) -> anyhow::Result<()>
where
    C: Controller + Send + Sync + 'static,
{
    listener
        .set_nonblocking(true)
        .with_context(|| "failed to set listener as nonblocking")?;
    let mut clients: Vec<JoinHandle<()>> = Vec::new();
    let res = loop {
        if daemon.is_shutting_down() {
            break Ok(());
        }
        clients.retain(|h| !h.is_finished());
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = prepare(&stream) {
                    log::warn!("dropping {peer}: {e}");
                    continue;
                }
                let daemon = Arc::clone(&daemon);
                clients.push(thread::spawn(move || {
                    if let Err(e) = handle_client(&daemon, stream) {
                        log::warn!("failed to answer {peer}: {e:#}");
                    }
                }));
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => break Err(anyhow::Error::from(e)),
        }
    };
    if !clients.is_empty() {
        log::info!("waiting for {} requests in flight", clients.len());
    }
    for client in clients {
        if client.join().is_err() {
            log::error!("a client thread panicked");
        }
    }
    log::info!("listener stopped");
    res
}

fn prepare(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))
}

fn handle_client<C>(daemon: &Daemon<C>, mut stream: TcpStream) -> anyhow::Result<()>
where
    C: Controller + Sync,
{
    let request: Request = decode::from_read(BufReader::new(&stream))?;
    let response = daemon.handle(request);
    let buf = rmp_serde::encode::to_vec(&response)?;
    stream.write_all(&buf)?;
    stream.flush()?;
    Ok(())
}

/// Tears down expired connections every `every` until the daemon shuts down.
pub fn reap<C: Controller + Sync>(daemon: &Daemon<C>, every: Duration) {
    let mut last = Instant::now();
    while !daemon.is_shutting_down() {
        thread::sleep(ACCEPT_POLL.min(every));
        if last.elapsed() >= every {
            daemon.reap(Utc::now());
            last = Instant::now();
        }
    }
}

/// Shared worker state: the pipeline, the current catalog snapshot, and the shutdown flag.
#[derive(Debug)]
pub struct Daemon<C> {
    pipeline: Pipeline<C>,
    catalog: RwLock<Arc<Catalog>>,
    catalog_path: Option<PathBuf>,
    shutdown: AtomicBool,
}

impl<C: Controller + Sync> Daemon<C> {
    pub fn new(pipeline: Pipeline<C>, catalog: Catalog) -> Self {
        Self {
            pipeline,
            catalog: RwLock::new(Arc::new(catalog)),
            catalog_path: None,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Sets the file [`Request::Reload`] reads.
    pub fn with_catalog_path(self, path: impl AsRef<Path>) -> Self {
        Self {
            catalog_path: Some(path.as_ref().to_owned()),
            ..self
        }
    }

    pub fn pipeline(&self) -> &Pipeline<C> {
        &self.pipeline
    }

    /// Returns the current catalog snapshot. Requests in flight keep the snapshot they started
    /// with.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().clone()
    }

    /// Stops the listener and the reaper and cancels teardowns which have not started.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Answers one request.
    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::Connect(req) => {
                let catalog = self.catalog();
                match self.pipeline.connect(&catalog, &req) {
                    Ok(connection) => Response::Connected(connection),
                    Err(e) => failed(&e),
                }
            }
            Request::Disconnect { handler } => {
                let res = handler
                    .parse::<Handler>()
                    .map_err(Error::from)
                    .and_then(|h| self.pipeline.disconnect_until(&h, &self.shutdown));
                match res {
                    Ok(teardown) => Response::Disconnected {
                        handler: teardown.connection.handler,
                        deleted: teardown.deleted,
                    },
                    Err(e) => failed(&e),
                }
            }
            Request::List => Response::Connections(self.pipeline.list()),
            Request::Reload => match self.reload() {
                Ok(catalog) => Response::Reloaded {
                    students: catalog.students().len(),
                    courses: catalog.courses().len(),
                    servers: catalog.servers().len(),
                },
                Err(e) => Response::Failed {
                    kind: "reload".to_owned(),
                    message: format!("{e:#}"),
                },
            },
            Request::Edit(edit) => match self.edit(edit) {
                Ok(catalog) => Response::Edited {
                    students: catalog.students().len(),
                    courses: catalog.courses().len(),
                    servers: catalog.servers().len(),
                },
                Err(e) => Response::Failed {
                    kind: e.kind().to_owned(),
                    message: e.to_string(),
                },
            },
        }
    }

    /// Applies `edit` to a copy of the current catalog, writes the copy to the catalog file if
    /// one is configured, and swaps it in. Nothing changes if any step fails. Edits are
    /// serialized with each other and with reloads.
    pub fn edit(&self, edit: CatalogEdit) -> Result<Arc<Catalog>, EditError> {
        let mut current = self.catalog.write();
        let mut catalog = (**current).clone();
        apply(&mut catalog, &edit)?;
        if let Some(path) = &self.catalog_path {
            labnet_utils::write_catalog(path, &catalog)?;
        }
        let catalog = Arc::new(catalog);
        *current = Arc::clone(&catalog);
        log::info!("catalog edited: {edit:?}");
        Ok(catalog)
    }

    /// Re-reads the catalog file and swaps in the new snapshot. The old snapshot stays in place
    /// if the file cannot be read.
    pub fn reload(&self) -> anyhow::Result<Arc<Catalog>> {
        let path = self
            .catalog_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no catalog file configured"))?;
        let catalog = labnet_utils::read_catalog(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog = Arc::new(catalog);
        *self.catalog.write() = Arc::clone(&catalog);
        log::info!(
            "reloaded catalog {} ({} students, {} courses, {} servers)",
            path.display(),
            catalog.students().len(),
            catalog.courses().len(),
            catalog.servers().len()
        );
        Ok(catalog)
    }

    /// Tears down every connection expired at `now` and returns how many were removed.
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for (handler, res) in self.pipeline.expire(now, &self.shutdown) {
            match res {
                Ok(_) => removed += 1,
                Err(e @ Error::PartialTeardown { .. }) => {
                    removed += 1;
                    log::error!("expired {handler}: {e}");
                }
                Err(e) => log::warn!("failed to expire {handler}: {e}"),
            }
        }
        if removed > 0 {
            log::info!("reaped {removed} expired connections");
        }
        removed
    }
}

fn apply(catalog: &mut Catalog, edit: &CatalogEdit) -> Result<(), EditError> {
    match edit {
        CatalogEdit::AddStudent { code, name, mac } => {
            let mac = mac.parse::<MacAddr>()?;
            catalog.add_student(Student::new(*code, name.clone(), mac))?;
        }
        CatalogEdit::UpdateStudent { code, name, mac } => {
            let mac = mac.as_deref().map(str::parse::<MacAddr>).transpose()?;
            catalog.update_student(*code, name.clone(), mac)?;
        }
        CatalogEdit::RemoveStudent { code } => {
            catalog.remove_student(*code)?;
        }
        CatalogEdit::Enroll { course, student } => catalog.enroll(course, *student)?,
        CatalogEdit::Unenroll { course, student } => catalog.unenroll(course, *student)?,
    }
    Ok(())
}

/// A catalog edit was rejected or could not be saved.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to save catalog: {0}")]
    Persist(#[from] labnet_utils::Error),
}

impl EditError {
    /// A short, stable name for the kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::Invalid(_) => "validation",
            EditError::Catalog(_) => "catalog",
            EditError::Persist(_) => "persist",
        }
    }
}

fn failed(e: &Error) -> Response {
    Response::Failed {
        kind: e.kind().to_owned(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests;
