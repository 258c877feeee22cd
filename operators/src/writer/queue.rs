use super::{Writer, WriterTask};
use crate::error;
use crate::util::{Result, safe_lock_mutex};
use crossbeam_channel::{Receiver, Sender};
use snafu::ResultExt;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// Number of tasks a writer buffers before submitting blocks
const QUEUE_CAPACITY: usize = 256;

/// Routes writer tasks to the writer owning their dataset.
///
/// Each filename is pinned to one writer, assigned round robin on first use, so all
/// tasks of a dataset are handled in submission order by a single writer.
#[derive(Debug)]
pub struct WriterQueue {
    backend: Backend,
    routes: Mutex<HashMap<PathBuf, usize>>,
}

#[derive(Debug)]
enum Backend {
    /// Tasks are handled in the submitting thread
    Inline(Mutex<Writer>),
    Threads {
        senders: Vec<Sender<WriterTask>>,
        handles: Vec<JoinHandle<Result<()>>>,
    },
}

impl WriterQueue {
    pub fn inline() -> Self {
        Self {
            backend: Backend::Inline(Mutex::new(Writer::new())),
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Starts `writers` writer threads, at least one
    pub fn spawn(writers: usize) -> Result<Self> {
        let writers = writers.max(1);
        let mut senders = Vec::with_capacity(writers);
        let mut handles = Vec::with_capacity(writers);

        for index in 0..writers {
            let (sender, receiver) = crossbeam_channel::bounded(QUEUE_CAPACITY);
            let handle = std::thread::Builder::new()
                .name(format!("applier-writer-{index}"))
                .spawn(move || run_writer(index, &receiver))
                .context(error::WriterThread)?;

            senders.push(sender);
            handles.push(handle);
        }

        debug!(writers, "started writer threads");

        Ok(Self {
            backend: Backend::Threads { senders, handles },
            routes: Mutex::new(HashMap::new()),
        })
    }

    pub fn writer_count(&self) -> usize {
        match &self.backend {
            Backend::Inline(_) => 1,
            Backend::Threads { senders, .. } => senders.len(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.backend, Backend::Inline(_))
    }

    /// The writer handling tasks of `filename`
    pub fn route(&self, filename: &Path) -> usize {
        let mut routes = safe_lock_mutex(&self.routes);
        let next = routes.len() % self.writer_count();
        *routes.entry(filename.to_path_buf()).or_insert(next)
    }

    /// Hands `task` to its writer. Tasks without a filename go to every writer.
    pub fn submit(&self, task: WriterTask) -> Result<()> {
        match &self.backend {
            Backend::Inline(writer) => {
                safe_lock_mutex(writer)
                    .handle_task(task)
                    .map_err(|source| error::Error::Writer {
                        writer: 0,
                        source: Box::new(source),
                    })?;
                Ok(())
            }
            Backend::Threads { senders, .. } => match task.filename() {
                Some(filename) => {
                    let writer = self.route(filename);
                    send(senders, writer, task)
                }
                None => {
                    for writer in 0..senders.len() {
                        let task = match &task {
                            WriterTask::CloseAll { write_envi_header } => WriterTask::CloseAll {
                                write_envi_header: *write_envi_header,
                            },
                            _ => WriterTask::Shutdown,
                        };
                        send(senders, writer, task)?;
                    }
                    Ok(())
                }
            },
        }
    }

    /// Closes all outputs, stops the writers and reports the first writer failure
    pub fn finish(self, write_envi_header: bool) -> Result<()> {
        match self.backend {
            Backend::Inline(writer) => {
                let mut writer = match writer.into_inner() {
                    Ok(writer) => writer,
                    Err(poisoned) => poisoned.into_inner(),
                };
                writer
                    .handle_task(WriterTask::CloseAll { write_envi_header })
                    .map_err(|source| error::Error::Writer {
                        writer: 0,
                        source: Box::new(source),
                    })?;
                Ok(())
            }
            Backend::Threads { senders, handles } => {
                for sender in &senders {
                    // a failed send means the writer is gone, joining reports why
                    let _ = sender.send(WriterTask::CloseAll { write_envi_header });
                    let _ = sender.send(WriterTask::Shutdown);
                }
                drop(senders);

                let mut first_error = None;
                for (writer, handle) in handles.into_iter().enumerate() {
                    let result = match handle.join() {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(source)) => Err(error::Error::Writer {
                            writer,
                            source: Box::new(source),
                        }),
                        Err(_) => Err(error::Error::WriterPanicked { writer }),
                    };
                    if let Err(e) = result {
                        first_error.get_or_insert(e);
                    }
                }

                debug!("writer threads stopped");

                first_error.map_or(Ok(()), Err)
            }
        }
    }
}

fn send(senders: &[Sender<WriterTask>], writer: usize, task: WriterTask) -> Result<()> {
    senders[writer]
        .send(task)
        .map_err(|_| error::Error::WriterDisconnected { writer })
}

/// The loop of a writer thread: blocks until a task arrives and handles it.
///
/// A failing task does not stop the loop, the first failure is returned once the
/// writer shuts down.
fn run_writer(index: usize, receiver: &Receiver<WriterTask>) -> Result<()> {
    let mut writer = Writer::new();
    let mut first_error = None;

    for task in receiver {
        match writer.handle_task(task) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => break,
            Err(e) => {
                error!(writer = index, "writer task failed: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    if !writer.state().is_empty() {
        warn!(writer = index, "writer stopped with open outputs, closing them");
        if let Err(e) = writer.handle_task(WriterTask::CloseAll {
            write_envi_header: false,
        }) {
            first_error.get_or_insert(e);
        }
    }

    first_error.map_or(Ok(()), Err)
}
